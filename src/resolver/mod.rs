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

//! OpenSSH-accurate configuration resolution
//!
//! A resolve walks every block of every document in order, honoring
//! first-wins semantics for single-valued directives and accumulation
//! for multi-valued ones, then fills in spec-driven defaults. Up to
//! three passes run: the initial pass, a canonical pass after host
//! canonicalization, and an optional final pass.

pub(crate) mod criteria;
mod tokens;

use std::collections::HashMap;

use crate::document::{BlockRef, Config, Node};
use crate::error::ConfigError;
use crate::pattern::match_pattern_list;
use crate::spec::{ClientSpec, Directive, DirectiveStatus, ValueType};

/// Predicate invoked for `Match exec` and `Match localnetwork`. The
/// argument is the expanded command or the network specification.
pub type MatchCallback = Box<dyn Fn(&str) -> anyhow::Result<bool>>;

/// Host canonicalization hook. Returning `Some(host)` replaces the host
/// argument and triggers the canonical pass; `None` leaves it unchanged.
pub type CanonicalizeCallback = Box<dyn Fn(&str) -> anyhow::Result<Option<String>>>;

/// Caller-supplied inputs for one resolve.
///
/// Only `host_arg` is required. Empty fields are filled from defaults:
/// the original host from the host argument, the local user from the
/// process owner, the version from the embedded spec, and the session
/// type from `"shell"`.
#[derive(Default)]
pub struct Context {
    pub host_arg: String,
    pub original_host: String,
    pub local_user: String,
    pub version: String,
    pub session_type: String,
    pub command: String,
    pub exec: Option<MatchCallback>,
    pub local_network: Option<MatchCallback>,
}

impl Context {
    /// A context resolving the given host argument.
    pub fn for_host(host_arg: impl Into<String>) -> Self {
        Self {
            host_arg: host_arg.into(),
            ..Self::default()
        }
    }
}

/// Options controlling resolve behavior.
#[derive(Default)]
pub struct ResolveOptions {
    strict: bool,
    final_pass: bool,
    canonicalize: Option<CanonicalizeCallback>,
}

impl ResolveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable strict validation against the client spec: unknown,
    /// unsupported, and bare deprecated directives fail, and values are
    /// checked against their declared type.
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Run a final pass in which `Match final` evaluates true.
    pub fn final_pass(mut self) -> Self {
        self.final_pass = true;
        self
    }

    /// Provide a host canonicalization callback, invoked once after the
    /// initial pass.
    pub fn canonicalize<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<Option<String>> + 'static,
    {
        self.canonicalize = Some(Box::new(callback));
        self
    }

    pub(crate) fn is_strict(&self) -> bool {
        self.strict
    }
}

/// Which pass is executing. Observable only through `Match canonical`
/// and `Match final`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassType {
    Initial,
    Canonical,
    Final,
}

/// Effective values resolved for a host, keyed by lowercased canonical
/// directive name.
#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    values: HashMap<String, Vec<String>>,
}

impl ResolveResult {
    /// The effective value for a directive, or empty string. Keys are
    /// matched case-insensitively.
    pub fn get(&self, key: &str) -> &str {
        self.values
            .get(&key.to_lowercase())
            .and_then(|vals| vals.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// All effective values for a directive, in order.
    pub fn get_all(&self, key: &str) -> Vec<String> {
        self.values
            .get(&key.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

/// Context with defaults applied, plus the host argument current for the
/// running pass.
pub(crate) struct PassContext<'a> {
    pub(crate) host_arg: String,
    pub(crate) original_host: String,
    pub(crate) local_user: String,
    pub(crate) version: String,
    pub(crate) session_type: String,
    pub(crate) command: String,
    pub(crate) exec: Option<&'a MatchCallback>,
    pub(crate) local_network: Option<&'a MatchCallback>,
}

impl<'a> PassContext<'a> {
    fn new(context: &'a Context, spec: &ClientSpec) -> Self {
        let host_arg = context.host_arg.clone();
        Self {
            original_host: if context.original_host.is_empty() {
                host_arg.clone()
            } else {
                context.original_host.clone()
            },
            local_user: if context.local_user.is_empty() {
                current_user_name()
            } else {
                context.local_user.clone()
            },
            version: if context.version.is_empty() {
                spec.openssh_version.clone()
            } else {
                context.version.clone()
            },
            session_type: if context.session_type.is_empty() {
                "shell".to_string()
            } else {
                context.session_type.clone()
            },
            command: context.command.clone(),
            exec: context.exec.as_ref(),
            local_network: context.local_network.as_ref(),
            host_arg,
        }
    }
}

/// Per-pass working state. The values map grows monotonically within a
/// pass; a new pass starts from scratch.
#[derive(Debug, Default)]
pub(crate) struct ResolveState {
    values: HashMap<String, Vec<String>>,
    ignore_unknown: String,
}

impl ResolveState {
    /// First value stored for a lowercased canonical key, or "".
    pub(crate) fn first(&self, key: &str) -> &str {
        self.values
            .get(key)
            .and_then(|vals| vals.first())
            .map(String::as_str)
            .unwrap_or("")
    }
}

impl Config {
    /// Resolve the effective configuration for a host with OpenSSH
    /// semantics.
    pub fn resolve(&self, context: &Context) -> Result<ResolveResult, ConfigError> {
        self.resolve_with(context, &ResolveOptions::default())
    }

    /// Resolve with explicit options.
    pub fn resolve_with(
        &self,
        context: &Context,
        options: &ResolveOptions,
    ) -> Result<ResolveResult, ConfigError> {
        resolve_configs(context, options, &[self])
    }
}

/// Resolve one or more documents in order: earlier documents win for
/// single-valued directives, all documents contribute to multi-valued
/// ones.
pub(crate) fn resolve_configs(
    context: &Context,
    options: &ResolveOptions,
    configs: &[&Config],
) -> Result<ResolveResult, ConfigError> {
    if context.host_arg.is_empty() {
        return Err(ConfigError::MissingHost);
    }
    let spec = ClientSpec::get()?;
    let mut pass_ctx = PassContext::new(context, spec);

    let mut result = resolve_pass(&pass_ctx, PassType::Initial, configs, options, spec)?;

    if let Some(canonicalize) = &options.canonicalize {
        let canonical = canonicalize(&pass_ctx.host_arg).map_err(callback_error)?;
        if let Some(host) = canonical {
            if !host.is_empty() {
                tracing::debug!("canonicalized '{}' to '{host}'", pass_ctx.host_arg);
                pass_ctx.host_arg = host;
                result = resolve_pass(&pass_ctx, PassType::Canonical, configs, options, spec)?;
            }
        }
    }

    if options.final_pass {
        result = resolve_pass(&pass_ctx, PassType::Final, configs, options, spec)?;
    }

    Ok(result)
}

fn resolve_pass(
    ctx: &PassContext<'_>,
    pass: PassType,
    configs: &[&Config],
    options: &ResolveOptions,
    spec: &ClientSpec,
) -> Result<ResolveResult, ConfigError> {
    let mut state = ResolveState::default();
    for config in configs {
        walk_config(config, ctx, pass, options, spec, &mut state, false)?;
    }
    apply_defaults(&mut state, ctx, spec);
    Ok(ResolveResult {
        values: state.values,
    })
}

fn walk_config(
    config: &Config,
    ctx: &PassContext<'_>,
    pass: PassType,
    options: &ResolveOptions,
    spec: &ClientSpec,
    state: &mut ResolveState,
    never_match: bool,
) -> Result<(), ConfigError> {
    for block in config.effective_blocks() {
        match block {
            BlockRef::Host(host) => {
                let active = !never_match && host.matches(&ctx.host_arg);
                walk_nodes(&host.nodes, active, ctx, pass, options, spec, state, never_match)?;
            }
            BlockRef::Match(matched) => {
                let active = if never_match {
                    false
                } else {
                    match matched.criteria_parse() {
                        Ok(parsed) => {
                            criteria::eval_match(parsed, ctx, pass, options, spec, state)?
                        }
                        Err(e) if options.is_strict() => return Err(e.to_config_error()),
                        Err(e) => {
                            tracing::debug!(
                                "treating Match block with bad criteria as inactive: {e:?}"
                            );
                            false
                        }
                    }
                };
                walk_nodes(&matched.nodes, active, ctx, pass, options, spec, state, never_match)?;
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn walk_nodes(
    nodes: &[Node],
    active: bool,
    ctx: &PassContext<'_>,
    pass: PassType,
    options: &ResolveOptions,
    spec: &ClientSpec,
    state: &mut ResolveState,
    never_match: bool,
) -> Result<(), ConfigError> {
    for node in nodes {
        match node {
            Node::Empty(_) => continue,
            Node::Kv(kv) => {
                apply_directive(&kv.key, &kv.value, active, options, spec, state)?;
            }
            Node::Include(include) => {
                // Blocks inside an include under an inactive block must
                // never activate, but strict validation still sees them.
                let include_never_match = never_match || !active;
                for path in include.matched_paths() {
                    let Some(sub) = include.file(path) else {
                        continue;
                    };
                    walk_config(sub, ctx, pass, options, spec, state, include_never_match)?;
                }
            }
        }
    }
    Ok(())
}

fn apply_directive(
    key: &str,
    value: &str,
    active: bool,
    options: &ResolveOptions,
    spec: &ClientSpec,
    state: &mut ResolveState,
) -> Result<(), ConfigError> {
    let lkey = key.trim().to_lowercase();
    let Some(directive) = spec.directive(&lkey) else {
        if options.is_strict() {
            if matches_ignore_unknown(&state.ignore_unknown, &lkey) {
                return Ok(());
            }
            return Err(ConfigError::UnknownDirective {
                name: key.to_string(),
            });
        }
        return Ok(());
    };

    match directive.status {
        DirectiveStatus::Unsupported => {
            if options.is_strict() {
                return Err(ConfigError::Unsupported {
                    name: key.to_string(),
                });
            }
            return Ok(());
        }
        DirectiveStatus::Deprecated if directive.alias_for.is_empty() => {
            if options.is_strict() {
                return Err(ConfigError::Deprecated {
                    name: key.to_string(),
                });
            }
            return Ok(());
        }
        _ => {}
    }

    // Validation happens before activation gating so strict errors
    // surface on syntactically invalid configs regardless of match state.
    if options.is_strict() {
        validate_value(directive, value)?;
    }

    if !active {
        return Ok(());
    }

    let canonical = directive.storage_key();
    if canonical == "ignoreunknown" {
        if !state.values.contains_key(&canonical) {
            state.values.insert(canonical, vec![value.to_string()]);
            state.ignore_unknown = value.to_string();
        }
        return Ok(());
    }
    if directive.multi {
        state
            .values
            .entry(canonical)
            .or_default()
            .push(value.to_string());
        return Ok(());
    }
    state
        .values
        .entry(canonical)
        .or_insert_with(|| vec![value.to_string()]);
    Ok(())
}

fn validate_value(directive: &Directive, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    match directive.value_type {
        ValueType::YesNo => {
            let lower = trimmed.to_lowercase();
            if lower != "yes" && lower != "no" {
                return Err(ConfigError::InvalidValue {
                    directive: directive.name.clone(),
                    reason: "must be yes or no".to_string(),
                });
            }
        }
        ValueType::Uint => {
            if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ConfigError::InvalidValue {
                    directive: directive.name.clone(),
                    reason: "must be an unsigned integer".to_string(),
                });
            }
        }
        ValueType::Enum => {
            if directive.enum_values.is_empty() {
                return Ok(());
            }
            let lower = trimmed.to_lowercase();
            if !directive
                .enum_values
                .iter()
                .any(|entry| entry.to_lowercase() == lower)
            {
                return Err(ConfigError::InvalidValue {
                    directive: directive.name.clone(),
                    reason: format!("'{value}' is not an allowed value"),
                });
            }
        }
        ValueType::List => {
            if trimmed.is_empty() {
                return Err(ConfigError::InvalidValue {
                    directive: directive.name.clone(),
                    reason: "must be non-empty".to_string(),
                });
            }
        }
        ValueType::String => {}
    }
    Ok(())
}

/// Spec-driven defaults plus the hostname/user backfill.
fn apply_defaults(state: &mut ResolveState, ctx: &PassContext<'_>, spec: &ClientSpec) {
    for directive in &spec.directives {
        if directive.name != directive.canonical {
            continue;
        }
        if directive.status != DirectiveStatus::Supported {
            continue;
        }
        let key = directive.name.to_lowercase();
        if state.values.contains_key(&key) {
            continue;
        }
        let defaults = directive.default_values();
        if defaults.is_empty() {
            continue;
        }
        let values = if directive.multi {
            defaults.iter().map(|v| v.to_string()).collect()
        } else {
            vec![defaults[0].to_string()]
        };
        state.values.insert(key, values);
    }

    if !state.values.contains_key("hostname") && !ctx.host_arg.is_empty() {
        state
            .values
            .insert("hostname".to_string(), vec![ctx.host_arg.clone()]);
    }
    if !state.values.contains_key("user") && !ctx.local_user.is_empty() {
        state
            .values
            .insert("user".to_string(), vec![ctx.local_user.clone()]);
    }
}

fn matches_ignore_unknown(patterns: &str, key: &str) -> bool {
    if patterns.is_empty() {
        return false;
    }
    match_pattern_list(key, patterns, true).unwrap_or(false)
}

/// The effective remote user: a User set earlier in this pass, else the
/// local user.
pub(crate) fn remote_user(ctx: &PassContext<'_>, state: &ResolveState) -> String {
    let user = state.first("user");
    if user.is_empty() {
        ctx.local_user.clone()
    } else {
        user.to_string()
    }
}

/// The effective session type: an assigned SessionType, else "exec" when
/// a command is present, else the context's session type.
pub(crate) fn session_type(ctx: &PassContext<'_>, state: &ResolveState) -> String {
    let stype = state.first("sessiontype");
    if !stype.is_empty() {
        return stype.to_string();
    }
    if !ctx.command.is_empty() {
        return "exec".to_string();
    }
    ctx.session_type.clone()
}

pub(crate) fn callback_error(err: anyhow::Error) -> ConfigError {
    ConfigError::Callback {
        message: format!("{err:#}"),
    }
}

fn current_user_name() -> String {
    whoami::fallible::username().unwrap_or_default()
}
