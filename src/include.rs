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

//! Include directive loading
//!
//! Include globs are expanded and their files parsed eagerly at parse
//! time, so subsequent resolves never touch the filesystem. Nesting is
//! bounded to keep a recursive Include from looping forever.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::document::Config;
use crate::error::ConfigError;
use crate::parser;

/// Maximum Include nesting. A deeper chain usually means a file that
/// includes itself.
pub(crate) const MAX_RECURSE_DEPTH: u8 = 5;

/// Whether a config file lives in the system configuration directory.
/// System documents resolve their relative Include globs against
/// `/etc/ssh` instead of the user's `.ssh` directory.
pub(crate) fn is_system_path(path: &Path) -> bool {
    path.starts_with("/etc/ssh")
}

/// Read and parse a configuration file from disk.
pub(crate) fn parse_path(path: &Path, depth: u8) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    parser::parse(&content, is_system_path(path), depth)
}

/// Expand the glob list of an Include directive found at `depth` and
/// parse every matched file.
///
/// Returns the matched paths in first-seen order along with their parsed
/// sub-documents. An empty match set is not an error; a parse failure in
/// any matched file is.
pub(crate) fn load_include(
    directives: &[String],
    system: bool,
    depth: u8,
) -> Result<(Vec<PathBuf>, HashMap<PathBuf, Config>), ConfigError> {
    if depth + 1 > MAX_RECURSE_DEPTH {
        return Err(ConfigError::DepthExceeded);
    }

    let mut matches = Vec::new();
    let mut seen = HashSet::new();
    for directive in directives {
        let search = include_base(directive, system);
        let pattern = search.to_string_lossy();
        let entries = glob::glob(&pattern).map_err(|e| ConfigError::Io {
            path: pattern.to_string(),
            message: format!("invalid glob pattern: {e}"),
        })?;
        for entry in entries {
            match entry {
                Ok(path) => {
                    if seen.insert(path.clone()) {
                        matches.push(path);
                    }
                }
                Err(e) => {
                    tracing::debug!("skipping unreadable glob entry for '{directive}': {e}");
                }
            }
        }
    }

    if matches.is_empty() && !directives.is_empty() {
        tracing::debug!("include globs {directives:?} matched no files");
    }

    let mut files = HashMap::with_capacity(matches.len());
    for path in &matches {
        let sub = parse_path(path, depth + 1)?;
        files.insert(path.clone(), sub);
    }
    Ok((matches, files))
}

/// Anchor a glob: absolute globs are used as-is, relative globs resolve
/// against `/etc/ssh` for system documents and `$HOME/.ssh` otherwise.
fn include_base(directive: &str, system: bool) -> PathBuf {
    let path = Path::new(directive);
    if path.is_absolute() {
        path.to_path_buf()
    } else if system {
        Path::new("/etc/ssh").join(directive)
    } else {
        user_ssh_dir().join(directive)
    }
}

fn user_ssh_dir() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(".ssh"),
        None => {
            tracing::debug!("home directory unavailable, resolving include relative to cwd");
            PathBuf::from(".ssh")
        }
    }
}
