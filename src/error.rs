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

//! Error types for SSH configuration parsing and resolution

use thiserror::Error;

use crate::position::Position;

/// Errors that can occur while parsing or resolving SSH configurations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The lexer or parser rejected the input
    #[error("parse error at line {}, column {}: {message}", position.line, position.col)]
    Parse { message: String, position: Position },

    /// Attempt to compile an empty host pattern
    #[error("empty pattern")]
    EmptyPattern,

    /// Include nesting exceeded the maximum depth, usually a recursive
    /// Include pointing back at the file that contains it
    #[error("max include recursion depth exceeded")]
    DepthExceeded,

    /// Resolve was called without a host argument
    #[error("a host argument is required to resolve")]
    MissingHost,

    /// Strict mode rejected a directive that is not in the client spec
    #[error("unknown directive '{name}'")]
    UnknownDirective { name: String },

    /// Strict mode rejected a directive the client spec marks unsupported
    #[error("unsupported directive '{name}'")]
    Unsupported { name: String },

    /// Strict mode rejected a deprecated directive with no modern alias
    #[error("deprecated directive '{name}'")]
    Deprecated { name: String },

    /// Strict-mode value validation failure
    #[error("invalid value for '{directive}': {reason}")]
    InvalidValue { directive: String, reason: String },

    /// Match criteria could not be tokenized or were structurally invalid
    #[error("invalid Match criteria: {message}")]
    MatchParse { message: String },

    /// Strict mode encountered an unknown Match criterion name
    #[error("unsupported Match attribute '{name}'")]
    UnsupportedMatchAttribute { name: String },

    /// A Match criterion name was not followed by its required argument
    #[error("missing argument for Match '{name}'")]
    MissingArgument { name: String },

    /// Match exec or localnetwork was evaluated in strict mode without a
    /// caller-supplied callback
    #[error("Match {name} requires a caller-supplied callback")]
    MatchCallbackMissing { name: String },

    /// The embedded client spec could not be decoded
    #[error("failed to decode client spec: {message}")]
    SpecCorrupt { message: String },

    /// A caller-supplied callback reported an error
    #[error("callback failed: {message}")]
    Callback { message: String },

    /// A configuration file could not be read
    #[error("failed to read '{path}': {message}")]
    Io { path: String, message: String },
}

impl ConfigError {
    /// Position of the offending input, when known
    pub fn position(&self) -> Option<Position> {
        match self {
            ConfigError::Parse { position, .. } => Some(*position),
            _ => None,
        }
    }
}
