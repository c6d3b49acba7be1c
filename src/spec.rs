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

//! Embedded OpenSSH client directive spec
//!
//! The spec is a static description of every client directive: canonical
//! name, aliases, status, value type, multi-valued flag, enum values, and
//! defaults. It is produced offline from the OpenSSH sources and embedded
//! as JSON; at runtime it is a pure data input to the resolver.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::error::ConfigError;

const EMBEDDED_SPEC: &str = include_str!("spec_data.json");

/// Upper bound on alias-chain hops; cycles are caught by a visited-set
/// but a bound keeps pathological spec data from walking far.
const MAX_ALIAS_DEPTH: usize = 8;

static CLIENT_SPEC: Lazy<Result<ClientSpec, ConfigError>> = Lazy::new(ClientSpec::decode_embedded);

/// Publication status of a directive in the current OpenSSH release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveStatus {
    Supported,
    Deprecated,
    Unsupported,
}

/// Value type of a directive, driving strict-mode validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Uint,
    YesNo,
    Enum,
    List,
}

/// A directive default: either one value or an ordered list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    One(String),
    Many(Vec<String>),
}

/// One entry in the client spec. Aliases carry `alias_for` pointing at
/// their canonical directive.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    pub name: String,
    pub canonical: String,
    pub status: DirectiveStatus,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    #[serde(default)]
    pub multi: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
    #[serde(default)]
    pub alias_for: String,
    #[serde(default, rename = "enum")]
    pub enum_values: Vec<String>,
    // Token and environment metadata from the offline generator. Carried
    // for spec fidelity; the resolver core does not read these.
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub tokens_all: bool,
    #[serde(default)]
    pub env: bool,
    #[serde(default)]
    pub env_unix_paths: bool,
}

impl Directive {
    /// Default values with empty entries dropped. Empty result means the
    /// directive has no default.
    pub fn default_values(&self) -> Vec<&str> {
        match &self.default {
            None => Vec::new(),
            Some(DefaultValue::One(v)) => {
                if v.is_empty() {
                    Vec::new()
                } else {
                    vec![v.as_str()]
                }
            }
            Some(DefaultValue::Many(vals)) => {
                vals.iter().filter(|v| !v.is_empty()).map(String::as_str).collect()
            }
        }
    }

    /// The lowercased key the resolver stores values under.
    pub(crate) fn storage_key(&self) -> String {
        if self.alias_for.is_empty() {
            self.canonical.to_lowercase()
        } else {
            self.alias_for.to_lowercase()
        }
    }
}

/// The decoded client spec with a name-keyed directive index.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSpec {
    pub openssh_version: String,
    pub directives: Vec<Directive>,
    #[serde(default)]
    pub match_exec_tokens: Vec<String>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

impl ClientSpec {
    /// The process-wide spec singleton. Decoding happens once; a decode
    /// failure is sticky and reported on every call.
    pub fn get() -> Result<&'static ClientSpec, ConfigError> {
        CLIENT_SPEC.as_ref().map_err(Clone::clone)
    }

    fn decode_embedded() -> Result<ClientSpec, ConfigError> {
        let mut spec: ClientSpec =
            serde_json::from_str(EMBEDDED_SPEC).map_err(|e| ConfigError::SpecCorrupt {
                message: e.to_string(),
            })?;
        spec.by_name = spec
            .directives
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.to_lowercase(), i))
            .collect();
        Ok(spec)
    }

    /// Look up a directive by (case-insensitive) name, aliases included.
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&i| &self.directives[i])
    }

    /// Resolve a possibly-aliased keyword to its canonical supported
    /// entry. Returns `None` for unknown keywords, alias chains that
    /// leave the spec or cycle, and directives that are not supported.
    pub fn supported_directive(&self, keyword: &str) -> Option<&Directive> {
        if keyword.is_empty() {
            return None;
        }
        let name = keyword.to_lowercase();
        let mut visited = HashSet::new();
        visited.insert(name.clone());
        let mut directive = self.directive(&name)?;
        let mut hops = 0;
        while !directive.alias_for.is_empty() {
            hops += 1;
            if hops > MAX_ALIAS_DEPTH {
                return None;
            }
            let next = directive.alias_for.to_lowercase();
            if !visited.insert(next.clone()) {
                return None;
            }
            directive = self.directive(&next)?;
        }
        if directive.status == DirectiveStatus::Supported {
            Some(directive)
        } else {
            None
        }
    }
}

/// Default value for a supported directive from the embedded client
/// spec, or empty string. Keyword matching is case-insensitive and
/// follows aliases.
pub fn default_value(keyword: &str) -> String {
    let Ok(spec) = ClientSpec::get() else {
        return String::new();
    };
    spec.supported_directive(keyword)
        .and_then(|d| d.default_values().first().map(|v| v.to_string()))
        .unwrap_or_default()
}

/// Whether a supported directive accumulates multiple values, based on
/// the embedded client spec. Follows aliases.
pub fn supports_multiple(keyword: &str) -> bool {
    let Ok(spec) = ClientSpec::get() else {
        return false;
    };
    spec.supported_directive(keyword)
        .map(|d| d.multi)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_decodes() {
        let spec = ClientSpec::get().unwrap();
        assert!(!spec.openssh_version.is_empty());
        assert!(!spec.directives.is_empty());
        assert!(!spec.match_exec_tokens.is_empty());
    }

    #[test]
    fn test_spec_invariants() {
        let spec = ClientSpec::get().unwrap();
        for d in &spec.directives {
            if d.name == d.canonical {
                assert!(
                    d.alias_for.is_empty(),
                    "canonical directive '{}' must not carry aliasFor",
                    d.name
                );
            }
            if !d.alias_for.is_empty() {
                assert_eq!(
                    d.status,
                    DirectiveStatus::Deprecated,
                    "alias '{}' must be deprecated",
                    d.name
                );
            }
            if d.value_type == ValueType::Enum {
                assert!(
                    !d.enum_values.is_empty(),
                    "enum directive '{}' must declare its values",
                    d.name
                );
            } else {
                assert!(
                    d.enum_values.is_empty(),
                    "non-enum directive '{}' must not declare enum values",
                    d.name
                );
            }
        }
    }

    #[test]
    fn test_default() {
        assert_eq!(default_value("Port"), "22");
        assert_eq!(default_value("Cipher"), "");
        assert_eq!(default_value("notfound"), "");
        assert_eq!(default_value(""), "");
    }

    #[test]
    fn test_supports_multiple() {
        assert!(supports_multiple("IdentityFile"));
        assert!(supports_multiple("IdentityFile2"));
        assert!(!supports_multiple("Cipher"));
        assert!(!supports_multiple("notfound"));
    }

    #[test]
    fn test_alias_transitivity() {
        let spec = ClientSpec::get().unwrap();
        for d in &spec.directives {
            if d.alias_for.is_empty() {
                continue;
            }
            let Some(target) = spec.supported_directive(&d.name) else {
                continue;
            };
            assert_eq!(default_value(&d.name), default_value(&target.name));
            assert_eq!(supports_multiple(&d.name), supports_multiple(&target.name));
        }
    }

    #[test]
    fn test_alias_resolution() {
        let spec = ClientSpec::get().unwrap();
        let resolved = spec.supported_directive("PubkeyAcceptedKeyTypes").unwrap();
        assert_eq!(resolved.name, "pubkeyacceptedalgorithms");

        // Deprecated without alias does not resolve
        assert!(spec.supported_directive("cipher").is_none());
        // Unsupported does not resolve
        assert!(spec.supported_directive("protocol").is_none());
        assert!(spec.supported_directive("").is_none());
    }

    #[test]
    fn test_storage_key() {
        let spec = ClientSpec::get().unwrap();
        let alias = spec.directive("identityfile2").unwrap();
        assert_eq!(alias.storage_key(), "identityfile");
        let canonical = spec.directive("identityfile").unwrap();
        assert_eq!(canonical.storage_key(), "identityfile");
    }
}
