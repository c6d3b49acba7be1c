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

//! Pattern matching for SSH host patterns
//!
//! Supports the ssh_config wildcard syntax: '*' matches zero or more
//! characters, '?' matches at most one character, and a leading '!'
//! negates the pattern.

use std::fmt;

use regex::Regex;

use crate::error::ConfigError;
use crate::position::Position;

/// Regex metacharacters that must be escaped when translating a pattern.
/// '*' and '?' are absent since they carry wildcard meaning.
const SPECIAL_BYTES: &[u8] = br"\.+()|[]{}^$";

/// A compiled host pattern from a Host declaration or a pattern list.
///
/// Patterns are read-only values; create one with [`Pattern::new`].
#[derive(Debug, Clone)]
pub struct Pattern {
    text: String,
    regex: Regex,
    negated: bool,
}

impl Pattern {
    /// Compile a pattern. `Pattern::new("*")` matches every host.
    ///
    /// A pattern consists of zero or more non-whitespace characters, '*'
    /// (a wildcard that matches zero or more characters), or '?' (a
    /// wildcard that matches exactly one character). A leading '!'
    /// negates the match.
    pub fn new(text: &str) -> Result<Self, ConfigError> {
        if text.is_empty() {
            return Err(ConfigError::EmptyPattern);
        }
        let mut negated = false;
        let mut body = text;
        if let Some(rest) = body.strip_prefix('!') {
            negated = true;
            body = rest;
        }

        let mut translated = String::with_capacity(body.len() + 8);
        translated.push('^');
        for ch in body.chars() {
            match ch {
                '*' => translated.push_str(".*"),
                '?' => translated.push_str(".?"),
                _ => {
                    if ch.is_ascii() && SPECIAL_BYTES.contains(&(ch as u8)) {
                        translated.push('\\');
                    }
                    translated.push(ch);
                }
            }
        }
        translated.push('$');

        let regex = Regex::new(&translated).map_err(|e| ConfigError::Parse {
            message: format!("invalid pattern '{text}': {e}"),
            position: Position::default(),
        })?;

        Ok(Self {
            text: text.to_string(),
            regex,
            negated,
        })
    }

    /// Whether the pattern matches the full value.
    pub fn matches(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }

    /// True if the pattern source began with '!'.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// The pattern exactly as it appeared in the file, '!' prefix
    /// included, so a rendered document reproduces its input.
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text && self.negated == other.negated
    }
}

/// Match a value against a pattern list separated by commas, spaces, or
/// tabs.
///
/// The list matches when at least one positive pattern matches and no
/// negated pattern does. A matching negated pattern rejects the whole
/// list regardless of any other entry.
pub(crate) fn match_pattern_list(
    value: &str,
    patterns: &str,
    case_insensitive: bool,
) -> Result<bool, ConfigError> {
    let value_to_match = if case_insensitive {
        value.to_lowercase()
    } else {
        value.to_string()
    };

    let mut matched = false;
    for part in split_pattern_list(patterns) {
        let (negate, fragment) = match part.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, part),
        };
        if fragment.is_empty() {
            continue;
        }
        let fragment = if case_insensitive {
            fragment.to_lowercase()
        } else {
            fragment.to_string()
        };
        let pattern = Pattern::new(&fragment)?;
        if pattern.matches(&value_to_match) {
            if negate {
                return Ok(false);
            }
            matched = true;
        }
    }
    Ok(matched)
}

/// Split a pattern list on the separators ssh_config accepts.
pub(crate) fn split_pattern_list(patterns: &str) -> impl Iterator<Item = &str> {
    patterns
        .split([',', ' ', '\t'])
        .filter(|part| !part.is_empty())
}
