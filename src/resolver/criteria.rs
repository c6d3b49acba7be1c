// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Match criteria parsing and evaluation
//!
//! Criteria are tokenized with POSIX-like shell rules from the raw text
//! after the Match keyword, then evaluated as a conjunction. `exec` is
//! skipped once an earlier criterion has already failed, so external
//! commands never run needlessly.

use crate::error::ConfigError;
use crate::pattern::match_pattern_list;
use crate::spec::ClientSpec;

use super::tokens::{effective_host, expand_match_exec};
use super::{
    callback_error, remote_user, session_type, PassContext, PassType, ResolveOptions, ResolveState,
};

/// One parsed Match criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Criterion {
    pub(crate) name: String,
    pub(crate) value: String,
    pub(crate) negate: bool,
}

/// Parse failure for a criteria string. Kept clonable so a Match block
/// can cache the parse outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CriteriaError {
    MissingArgument(String),
    Malformed(String),
}

impl CriteriaError {
    pub(crate) fn to_config_error(&self) -> ConfigError {
        match self {
            CriteriaError::MissingArgument(name) => ConfigError::MissingArgument {
                name: name.clone(),
            },
            CriteriaError::Malformed(message) => ConfigError::MatchParse {
                message: message.clone(),
            },
        }
    }
}

/// Criterion names that take no argument.
fn is_bare_keyword(name: &str) -> bool {
    matches!(name, "all" | "canonical" | "final")
}

/// Parse the raw criteria string of a Match block.
pub(crate) fn parse_criteria(raw: &str) -> Result<Vec<Criterion>, CriteriaError> {
    let fields = tokenize(raw)?;
    if fields.is_empty() {
        return Err(CriteriaError::Malformed(
            "Match requires criteria".to_string(),
        ));
    }

    let mut criteria = Vec::with_capacity(fields.len());
    let mut i = 0;
    while i < fields.len() {
        let mut field = fields[i].as_str();
        let negate = field.starts_with('!');
        if negate {
            field = &field[1..];
        }
        let name = field.to_lowercase();
        if is_bare_keyword(&name) {
            criteria.push(Criterion {
                name,
                value: String::new(),
                negate,
            });
            i += 1;
            continue;
        }

        // A name=value token carries its argument inline; otherwise the
        // next token is the argument. '=' is accepted anywhere in the
        // token, a superset of OpenSSH, which only permits it right
        // after the name.
        let (name, value) = match field.split_once('=') {
            Some((name, value)) => (name.to_lowercase(), value.to_string()),
            None => {
                let Some(arg) = fields.get(i + 1) else {
                    return Err(CriteriaError::MissingArgument(name));
                };
                i += 1;
                (name, arg.clone())
            }
        };
        criteria.push(Criterion {
            name,
            value,
            negate,
        });
        i += 1;
    }

    validate_match_all(&criteria)?;
    Ok(criteria)
}

/// `all` may stand alone, or follow a single `canonical` or `final`.
fn validate_match_all(criteria: &[Criterion]) -> Result<(), CriteriaError> {
    for (i, criterion) in criteria.iter().enumerate() {
        if criterion.name != "all" {
            continue;
        }
        if criteria.len() == 1 {
            return Ok(());
        }
        if criteria.len() == 2
            && i == 1
            && matches!(criteria[0].name.as_str(), "canonical" | "final")
        {
            return Ok(());
        }
        return Err(CriteriaError::Malformed(
            "'all' cannot be combined with other attributes".to_string(),
        ));
    }
    Ok(())
}

/// Tokenize a criteria string with shell-like quoting.
///
/// Whitespace separates tokens; double quotes group; a backslash escapes
/// space, tab, quote, and backslash and is otherwise kept literally. An
/// unescaped backslash at end of string is preserved.
fn tokenize(raw: &str) -> Result<Vec<String>, CriteriaError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in raw.chars() {
        if escaped {
            match c {
                ' ' | '\t' | '"' | '\\' => field.push(c),
                _ => {
                    field.push('\\');
                    field.push(c);
                }
            }
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ' ' | '\t' => {
                if in_quotes {
                    field.push(c);
                } else if !field.is_empty() {
                    fields.push(std::mem::take(&mut field));
                }
            }
            _ => field.push(c),
        }
    }

    if escaped {
        field.push('\\');
    }
    if in_quotes {
        return Err(CriteriaError::Malformed(
            "unterminated quoted Match criterion".to_string(),
        ));
    }
    if !field.is_empty() {
        fields.push(field);
    }
    Ok(fields)
}

/// Evaluate parsed criteria as a conjunction for the current pass.
pub(crate) fn eval_match(
    criteria: &[Criterion],
    ctx: &PassContext<'_>,
    pass: PassType,
    options: &ResolveOptions,
    spec: &ClientSpec,
    state: &ResolveState,
) -> Result<bool, ConfigError> {
    let mut result = true;
    for criterion in criteria {
        // exec runs external commands; never invoke it once the block is
        // already known not to match.
        if !result && criterion.name == "exec" {
            continue;
        }
        if !eval_criterion(criterion, ctx, pass, options, spec, state)? {
            result = false;
        }
    }
    Ok(result)
}

fn eval_criterion(
    criterion: &Criterion,
    ctx: &PassContext<'_>,
    pass: PassType,
    options: &ResolveOptions,
    spec: &ClientSpec,
    state: &ResolveState,
) -> Result<bool, ConfigError> {
    let negate = criterion.negate;
    let value = criterion.value.as_str();
    match criterion.name.as_str() {
        "all" => Ok(apply_negation(true, negate)),
        "canonical" => Ok(apply_negation(pass == PassType::Canonical, negate)),
        "final" => Ok(apply_negation(pass == PassType::Final, negate)),
        "host" => {
            let host = effective_host(ctx, state);
            let matched = match_pattern_list(&host, value, true)?;
            Ok(apply_negation(matched, negate))
        }
        "originalhost" => {
            let matched = match_pattern_list(&ctx.original_host, value, true)?;
            Ok(apply_negation(matched, negate))
        }
        "user" => {
            let matched = match_pattern_list(&remote_user(ctx, state), value, false)?;
            Ok(apply_negation(matched, negate))
        }
        "localuser" => {
            let matched = match_pattern_list(&ctx.local_user, value, false)?;
            Ok(apply_negation(matched, negate))
        }
        "version" => {
            let matched = match_pattern_list(&ctx.version, value, false)?;
            Ok(apply_negation(matched, negate))
        }
        "tagged" => {
            let tag = state.first("tag");
            if tag.is_empty() && value.is_empty() {
                return Ok(apply_negation(true, negate));
            }
            let matched = match_pattern_list(tag, value, false)?;
            Ok(apply_negation(matched, negate))
        }
        "command" => {
            if ctx.command.is_empty() && value.is_empty() {
                return Ok(apply_negation(true, negate));
            }
            let matched = match_pattern_list(&ctx.command, value, false)?;
            Ok(apply_negation(matched, negate))
        }
        "sessiontype" => {
            let stype = session_type(ctx, state);
            let matched = match_pattern_list(&stype, value, false)?;
            Ok(apply_negation(matched, negate))
        }
        "localnetwork" => {
            let Some(callback) = ctx.local_network else {
                if options.strict {
                    return Err(ConfigError::MatchCallbackMissing {
                        name: "localnetwork".to_string(),
                    });
                }
                return Ok(false);
            };
            match callback(value) {
                Ok(matched) => Ok(apply_negation(matched, negate)),
                Err(e) if options.strict => Err(callback_error(e)),
                Err(e) => {
                    tracing::debug!("Match localnetwork callback failed: {e:#}");
                    Ok(false)
                }
            }
        }
        "exec" => {
            let command = expand_match_exec(value, ctx, state, spec);
            let Some(callback) = ctx.exec else {
                if options.strict {
                    return Err(ConfigError::MatchCallbackMissing {
                        name: "exec".to_string(),
                    });
                }
                return Ok(false);
            };
            match callback(&command) {
                Ok(matched) => Ok(apply_negation(matched, negate)),
                Err(e) if options.strict => Err(callback_error(e)),
                Err(e) => {
                    tracing::debug!("Match exec callback failed: {e:#}");
                    Ok(false)
                }
            }
        }
        name => {
            if options.strict {
                return Err(ConfigError::UnsupportedMatchAttribute {
                    name: name.to_string(),
                });
            }
            Ok(false)
        }
    }
}

fn apply_negation(value: bool, negate: bool) -> bool {
    if negate {
        !value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criterion(name: &str, value: &str, negate: bool) -> Criterion {
        Criterion {
            name: name.to_string(),
            value: value.to_string(),
            negate,
        }
    }

    #[test]
    fn test_parse_name_equals_value() {
        let criteria = parse_criteria("host=*.example.com").unwrap();
        assert_eq!(criteria, vec![criterion("host", "*.example.com", false)]);
    }

    #[test]
    fn test_parse_name_with_argument_token() {
        let criteria = parse_criteria("host *.example.com user admin,root").unwrap();
        assert_eq!(
            criteria,
            vec![
                criterion("host", "*.example.com", false),
                criterion("user", "admin,root", false),
            ]
        );
    }

    #[test]
    fn test_parse_bare_keywords_and_negation() {
        let criteria = parse_criteria("canonical").unwrap();
        assert_eq!(criteria, vec![criterion("canonical", "", false)]);

        let criteria = parse_criteria("!host=*.prod.example.com").unwrap();
        assert_eq!(criteria, vec![criterion("host", "*.prod.example.com", true)]);

        let criteria = parse_criteria("!final").unwrap();
        assert_eq!(criteria, vec![criterion("final", "", true)]);
    }

    #[test]
    fn test_parse_case_insensitive_names() {
        let criteria = parse_criteria("Host=Foo ALL").unwrap_err();
        // 'all' combined with another attribute is rejected
        assert!(matches!(criteria, CriteriaError::Malformed(_)));

        let criteria = parse_criteria("HOST=Foo").unwrap();
        assert_eq!(criteria[0].name, "host");
        // Value case is preserved; matching decides case-sensitivity.
        assert_eq!(criteria[0].value, "Foo");
    }

    #[test]
    fn test_parse_missing_argument() {
        let err = parse_criteria("host").unwrap_err();
        assert_eq!(err, CriteriaError::MissingArgument("host".to_string()));

        let err = parse_criteria("host=x user").unwrap_err();
        assert_eq!(err, CriteriaError::MissingArgument("user".to_string()));
    }

    #[test]
    fn test_parse_empty_criteria() {
        assert!(matches!(
            parse_criteria(""),
            Err(CriteriaError::Malformed(_))
        ));
        assert!(matches!(
            parse_criteria("   "),
            Err(CriteriaError::Malformed(_))
        ));
    }

    #[test]
    fn test_all_placement() {
        assert!(parse_criteria("all").is_ok());
        assert!(parse_criteria("canonical all").is_ok());
        assert!(parse_criteria("final all").is_ok());
        assert!(parse_criteria("all canonical").is_err());
        assert!(parse_criteria("host=x all").is_err());
        assert!(parse_criteria("canonical final all").is_err());
    }

    #[test]
    fn test_tokenize_quotes_and_escapes() {
        let criteria = parse_criteria("exec \"test -f /tmp/flag\"").unwrap();
        assert_eq!(criteria, vec![criterion("exec", "test -f /tmp/flag", false)]);

        let criteria = parse_criteria("exec echo\\ hi").unwrap();
        assert_eq!(criteria, vec![criterion("exec", "echo hi", false)]);

        // A backslash before an ordinary character stays literal.
        let criteria = parse_criteria("exec echo\\x").unwrap();
        assert_eq!(criteria, vec![criterion("exec", "echo\\x", false)]);

        // A trailing backslash is preserved.
        let criteria = parse_criteria("exec echo\\").unwrap();
        assert_eq!(criteria, vec![criterion("exec", "echo\\", false)]);
    }

    #[test]
    fn test_tokenize_unterminated_quote() {
        assert!(matches!(
            parse_criteria("exec \"echo hi"),
            Err(CriteriaError::Malformed(_))
        ));
    }
}
