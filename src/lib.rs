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

//! Lossless SSH client configuration parsing and OpenSSH-accurate
//! resolution.
//!
//! The parser preserves comments, indentation, and equals-sign syntax,
//! so a configuration file can be decoded, inspected, mutated, and
//! written back out. The resolver evaluates `Host` and `Match` blocks
//! with OpenSSH precedence rules, driven by an embedded description of
//! every client directive.
//!
//! ```
//! use sshcfg::{Config, Context};
//!
//! let cfg = Config::parse_str("Host *\n  Port 2222\nHost foo\n  Port 2200\n")?;
//! let res = cfg.resolve(&Context::for_host("foo"))?;
//! assert_eq!(res.get("Port"), "2222");
//!
//! // Write the config back out; tabs in indentation become spaces.
//! assert!(cfg.to_string().starts_with("Host *\n"));
//! # Ok::<(), sshcfg::ConfigError>(())
//! ```
//!
//! Discovery of `~/.ssh/config` and `/etc/ssh/ssh_config` goes through
//! [`UserSettings`], which reads the files once and caches them:
//!
//! ```no_run
//! use sshcfg::{Context, UserSettings};
//!
//! let res = UserSettings::shared().resolve(&Context::for_host("example.com"))?;
//! println!("port = {}", res.get("Port"));
//! # Ok::<(), sshcfg::ConfigError>(())
//! ```

mod document;
mod error;
mod include;
mod parser;
mod pattern;
mod position;
mod resolver;
mod settings;
mod spec;

pub use document::{Block, Config, Empty, Host, Include, Kv, MatchBlock, Node};
pub use error::ConfigError;
pub use pattern::Pattern;
pub use position::Position;
pub use resolver::{
    CanonicalizeCallback, Context, MatchCallback, ResolveOptions, ResolveResult,
};
pub use settings::{ConfigFinder, UserSettings};
pub use spec::{
    default_value, supports_multiple, ClientSpec, DefaultValue, Directive, DirectiveStatus,
    ValueType,
};
