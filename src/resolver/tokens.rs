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

//! Percent-token expansion for Match exec commands
//!
//! Tokens are the two-character `%X` sequences ssh accepts in a
//! `Match exec` value. Unknown sequences and a trailing lone '%' pass
//! through unchanged.

use std::collections::HashMap;

use sha1::{Digest, Sha1};

use crate::spec::ClientSpec;

use super::{remote_user, PassContext, ResolveState};

/// The host a Match criterion evaluates against: a HostName set earlier
/// in this pass, with its own tokens expanded, or the host argument.
pub(crate) fn effective_host(ctx: &PassContext<'_>, state: &ResolveState) -> String {
    let hostname = state.first("hostname");
    if hostname.is_empty() {
        ctx.host_arg.clone()
    } else {
        expand_hostname(hostname, &ctx.host_arg)
    }
}

/// Expand the tokens a HostName value accepts: `%h` for the host
/// argument and `%%` for a literal percent.
fn expand_hostname(value: &str, host_arg: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            None => out.push('%'),
            Some('%') => {
                out.push('%');
                chars.next();
            }
            Some('h') => {
                out.push_str(host_arg);
                chars.next();
            }
            Some(&other) => {
                out.push('%');
                out.push(other);
                chars.next();
            }
        }
    }
    out
}

/// Expand a Match exec command value.
pub(crate) fn expand_match_exec(
    value: &str,
    ctx: &PassContext<'_>,
    state: &ResolveState,
    spec: &ClientSpec,
) -> String {
    let local_host = whoami::fallible::hostname().unwrap_or_default();
    let short_host = match local_host.find('.') {
        Some(idx) if idx > 0 => local_host[..idx].to_string(),
        _ => local_host.clone(),
    };
    let port = resolve_port(state, spec);
    let remote = remote_user(ctx, state);
    let mut jump = state.first("proxyjump").to_string();
    if jump.eq_ignore_ascii_case("none") {
        jump.clear();
    }
    let host = effective_host(ctx, state);
    let key_alias = match state.first("hostkeyalias") {
        "" => host.clone(),
        alias => alias.to_string(),
    };
    let home = dirs::home_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let conn_hash = connection_hash(&local_host, &host, &port, &remote, &jump);

    let replacements: HashMap<&str, String> = HashMap::from([
        ("%%", "%".to_string()),
        ("%C", conn_hash),
        ("%L", short_host),
        ("%d", home),
        ("%h", host),
        ("%k", key_alias),
        ("%l", local_host),
        ("%n", ctx.original_host.clone()),
        ("%p", port),
        ("%r", remote),
        ("%u", ctx.local_user.clone()),
        ("%i", current_uid()),
        ("%j", jump),
    ]);
    expand_tokens(value, &replacements)
}

/// Replace known two-character tokens, passing unknown sequences and a
/// trailing '%' through literally.
fn expand_tokens(value: &str, replacements: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            None => out.push('%'),
            Some(&next) => {
                let mut token = String::with_capacity(2);
                token.push('%');
                token.push(next);
                match replacements.get(token.as_str()) {
                    Some(replacement) => out.push_str(replacement),
                    None => out.push_str(&token),
                }
                chars.next();
            }
        }
    }
    out
}

/// SHA-1 hex of the connection identity, matching the `%C` token.
fn connection_hash(local_host: &str, host: &str, port: &str, user: &str, jump: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(local_host.as_bytes());
    hasher.update(host.as_bytes());
    hasher.update(port.as_bytes());
    hasher.update(user.as_bytes());
    hasher.update(jump.as_bytes());
    hex::encode(hasher.finalize())
}

/// The effective port for token expansion: assigned value, spec default,
/// or the standard port.
fn resolve_port(state: &ResolveState, spec: &ClientSpec) -> String {
    let port = state.first("port");
    if !port.is_empty() {
        return port.to_string();
    }
    if let Some(directive) = spec.directive("port") {
        if let Some(default) = directive.default_values().first() {
            return default.to_string();
        }
    }
    "22".to_string()
}

fn current_uid() -> String {
    #[cfg(unix)]
    {
        nix::unistd::getuid().as_raw().to_string()
    }
    #[cfg(not(unix))]
    {
        String::new()
    }
}
