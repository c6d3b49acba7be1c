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

//! Document model for SSH configurations
//!
//! A parsed configuration keeps comments, indentation, equals-sign syntax,
//! and ordering, so a decoded document can be inspected, mutated, and
//! rendered back out. Rendering a freshly decoded document reproduces its
//! input, with tab indentation normalized to single spaces.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::{Lazy, OnceCell};

use crate::error::ConfigError;
use crate::include;
use crate::parser;
use crate::pattern::Pattern;
use crate::position::Position;
use crate::resolver::criteria::{CriteriaError, Criterion};

static MATCH_ALL: Lazy<Pattern> = Lazy::new(|| {
    Pattern::new("*").expect("'*' pattern always compiles")
});

/// A parsed SSH configuration file.
///
/// The file begins with an implicit `Host *` block that holds any
/// directives appearing before the first `Host` or `Match` declaration.
///
/// `blocks` is the authoritative block sequence. The legacy `hosts`
/// sequence is kept for callers that predate `Match` support; it is
/// consulted by [`resolve`](Config::resolve) and rendering only when
/// `blocks` is empty.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub blocks: Vec<Block>,
    pub hosts: Vec<Host>,
    pub(crate) has_match: bool,
    pub(crate) depth: u8,
}

impl Config {
    /// An empty configuration holding only the implicit `Host *` block.
    pub fn new() -> Self {
        let implicit = Host {
            patterns: vec![MATCH_ALL.clone()],
            nodes: Vec::new(),
            eol_comment: String::new(),
            space_before_comment: String::new(),
            has_equals: false,
            leading_space: 0,
            implicit: true,
            position: Position::new(1, 1),
        };
        Self {
            blocks: vec![Block::Host(implicit.clone())],
            hosts: vec![implicit],
            has_match: false,
            depth: 0,
        }
    }

    /// Parse a configuration from a string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        parser::parse(content, false, 0)
    }

    /// Parse a configuration from raw bytes, which must be valid UTF-8.
    pub fn parse_bytes(content: &[u8]) -> Result<Self, ConfigError> {
        let text = std::str::from_utf8(content).map_err(|e| ConfigError::Parse {
            message: format!("configuration is not valid UTF-8: {e}"),
            position: Position::default(),
        })?;
        parser::parse(text, false, 0)
    }

    /// Parse a configuration file from disk. Files under `/etc/ssh`
    /// resolve their relative Include globs against `/etc/ssh`; all
    /// others resolve against `$HOME/.ssh`.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        include::parse_path(path.as_ref(), 0)
    }

    /// True when the document contains at least one `Match` block.
    pub fn has_match(&self) -> bool {
        self.has_match
    }

    pub(crate) fn effective_blocks(&self) -> Vec<BlockRef<'_>> {
        if !self.blocks.is_empty() {
            self.blocks
                .iter()
                .map(|block| match block {
                    Block::Host(host) => BlockRef::Host(host),
                    Block::Match(matched) => BlockRef::Match(matched),
                })
                .collect()
        } else {
            self.hosts.iter().map(BlockRef::Host).collect()
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.effective_blocks() {
            match block {
                BlockRef::Host(host) => write!(f, "{host}")?,
                BlockRef::Match(matched) => write!(f, "{matched}")?,
            }
        }
        Ok(())
    }
}

/// A top-level block in a configuration.
#[derive(Debug, Clone)]
pub enum Block {
    Host(Host),
    Match(MatchBlock),
}

impl Block {
    /// Position of the block's declaration in the source file.
    pub fn position(&self) -> Position {
        match self {
            Block::Host(host) => host.position,
            Block::Match(matched) => matched.position,
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Block::Host(host) => write!(f, "{host}"),
            Block::Match(matched) => write!(f, "{matched}"),
        }
    }
}

/// Borrowed view over the effective block sequence.
pub(crate) enum BlockRef<'a> {
    Host(&'a Host),
    Match(&'a MatchBlock),
}

/// A `Host` declaration and the directives that follow it.
#[derive(Debug, Clone)]
pub struct Host {
    /// Host patterns this block applies to.
    pub patterns: Vec<Pattern>,
    /// Child nodes in declaration order.
    pub nodes: Vec<Node>,
    /// Comment terminating the Host line, without the '#'.
    pub eol_comment: String,
    /// Whether the declaration used `Host = patterns` syntax.
    pub has_equals: bool,
    /// Spaces before the Host keyword.
    pub leading_space: usize,
    pub(crate) space_before_comment: String,
    pub(crate) implicit: bool,
    pub(crate) position: Position,
}

impl Host {
    /// A new explicit Host block with the given patterns and no nodes.
    pub fn new(patterns: Vec<Pattern>) -> Self {
        Self {
            patterns,
            nodes: Vec::new(),
            eol_comment: String::new(),
            space_before_comment: String::new(),
            has_equals: false,
            leading_space: 0,
            implicit: false,
            position: Position::default(),
        }
    }

    /// True only for the synthetic `Host *` block that opens a document.
    pub fn is_implicit(&self) -> bool {
        self.implicit
    }

    /// Position of the Host declaration in the source file.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Whether this block applies to the given host alias.
    ///
    /// A negated pattern that matches rejects the block regardless of any
    /// other pattern on the line.
    pub fn matches(&self, alias: &str) -> bool {
        let mut found = false;
        for pattern in &self.patterns {
            if pattern.matches(alias) {
                if pattern.is_negated() {
                    return false;
                }
                found = true;
            }
        }
        found
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.implicit {
            write!(f, "{}Host", " ".repeat(self.leading_space))?;
            f.write_str(if self.has_equals { " = " } else { " " })?;
            for (i, pattern) in self.patterns.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{pattern}")?;
            }
            f.write_str(&self.space_before_comment)?;
            if !self.eol_comment.is_empty() {
                write!(f, "#{}", self.eol_comment)?;
            }
            f.write_str("\n")?;
        }
        for node in &self.nodes {
            writeln!(f, "{node}")?;
        }
        Ok(())
    }
}

/// A `Match` declaration and the directives that follow it.
///
/// The criteria string is retained exactly as typed; it is parsed lazily
/// on first evaluation and the parse is cached per block. Build a new
/// `MatchBlock` rather than editing `criteria` in place after a resolve.
#[derive(Debug, Clone)]
pub struct MatchBlock {
    /// Raw criteria text after the Match keyword.
    pub criteria: String,
    /// Child nodes in declaration order.
    pub nodes: Vec<Node>,
    /// Comment terminating the Match line, without the '#'.
    pub eol_comment: String,
    /// Whether the declaration used `Match = criteria` syntax.
    pub has_equals: bool,
    /// Spaces before the Match keyword.
    pub leading_space: usize,
    pub(crate) space_before_comment: String,
    pub(crate) position: Position,
    pub(crate) parsed_criteria: OnceCell<Result<Vec<Criterion>, CriteriaError>>,
}

impl MatchBlock {
    /// A new Match block with the given raw criteria and no nodes.
    pub fn new(criteria: impl Into<String>) -> Self {
        Self {
            criteria: criteria.into(),
            nodes: Vec::new(),
            eol_comment: String::new(),
            space_before_comment: String::new(),
            has_equals: false,
            leading_space: 0,
            position: Position::default(),
            parsed_criteria: OnceCell::new(),
        }
    }

    /// Position of the Match declaration in the source file.
    pub fn position(&self) -> Position {
        self.position
    }

    pub(crate) fn criteria_parse(&self) -> &Result<Vec<Criterion>, CriteriaError> {
        self.parsed_criteria
            .get_or_init(|| crate::resolver::criteria::parse_criteria(&self.criteria))
    }
}

impl fmt::Display for MatchBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Match", " ".repeat(self.leading_space))?;
        f.write_str(if self.has_equals { " = " } else { " " })?;
        f.write_str(&self.criteria)?;
        f.write_str(&self.space_before_comment)?;
        if !self.eol_comment.is_empty() {
            write!(f, "#{}", self.eol_comment)?;
        }
        f.write_str("\n")?;
        for node in &self.nodes {
            writeln!(f, "{node}")?;
        }
        Ok(())
    }
}

/// A line inside a block.
#[derive(Debug, Clone)]
pub enum Node {
    Kv(Kv),
    Empty(Empty),
    Include(Include),
}

impl Node {
    /// Position of the line in the source file.
    pub fn position(&self) -> Position {
        match self {
            Node::Kv(kv) => kv.position,
            Node::Empty(empty) => empty.position,
            Node::Include(include) => include.position,
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Kv(kv) => write!(f, "{kv}"),
            Node::Empty(empty) => write!(f, "{empty}"),
            Node::Include(include) => write!(f, "{include}"),
        }
    }
}

/// A key/value line, possibly with a trailing comment.
#[derive(Debug, Clone)]
pub struct Kv {
    /// Directive keyword, original case preserved.
    pub key: String,
    /// Raw textual value as written.
    pub value: String,
    /// Comment after the value, without the '#'.
    pub comment: String,
    /// Whether the line used `Key = Value` syntax.
    pub has_equals: bool,
    /// Spaces before the key.
    pub leading_space: usize,
    pub(crate) space_after_value: String,
    pub(crate) position: Position,
}

impl Kv {
    /// A new key/value node, rendered with two spaces of indentation.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            comment: String::new(),
            has_equals: false,
            leading_space: 2,
            space_after_value: String::new(),
            position: Position::default(),
        }
    }
}

impl fmt::Display for Kv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            " ".repeat(self.leading_space),
            self.key,
            if self.has_equals { " = " } else { " " },
            self.value,
            self.space_after_value
        )?;
        if !self.comment.is_empty() {
            write!(f, "#{}", self.comment)?;
        }
        Ok(())
    }
}

/// A blank line or a comment-only line.
#[derive(Debug, Clone, Default)]
pub struct Empty {
    /// Comment text without the '#'; empty for a blank line.
    pub comment: String,
    /// Spaces before the '#'.
    pub leading_space: usize,
    pub(crate) position: Position,
}

impl fmt::Display for Empty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.comment.is_empty() {
            return Ok(());
        }
        write!(f, "{}#{}", " ".repeat(self.leading_space), self.comment)
    }
}

/// The result of an Include directive: the globs as written plus the
/// configuration files parsed for them. At most five levels of Include
/// are followed.
#[derive(Debug, Clone)]
pub struct Include {
    /// Comment at the end of the Include line, without the '#'.
    pub comment: String,
    /// Whether the line used `Include = globs` syntax.
    pub has_equals: bool,
    /// Spaces before the Include keyword.
    pub leading_space: usize,
    pub(crate) directives: Vec<String>,
    pub(crate) matches: Vec<PathBuf>,
    pub(crate) files: HashMap<PathBuf, Config>,
    pub(crate) depth: u8,
    pub(crate) position: Position,
}

impl Include {
    /// The glob list exactly as written in the directive.
    pub fn directives(&self) -> &[String] {
        &self.directives
    }

    /// Paths matched at parse time, ordered and de-duplicated.
    pub fn matched_paths(&self) -> &[PathBuf] {
        &self.matches
    }

    /// The parsed sub-document for a matched path.
    pub fn file(&self, path: &Path) -> Option<&Config> {
        self.files.get(path)
    }
}

impl fmt::Display for Include {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Include{}{}",
            " ".repeat(self.leading_space),
            if self.has_equals { " = " } else { " " },
            self.directives.join(" ")
        )?;
        if !self.comment.is_empty() {
            write!(f, " #{}", self.comment)?;
        }
        Ok(())
    }
}
