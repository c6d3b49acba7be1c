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

//! Line-oriented parser producing the lossless document model
//!
//! Every document begins with an implicit `Host *` block; directives that
//! appear before the first `Host` or `Match` declaration land there.
//! Indentation, comments, and equals-sign syntax are captured per node so
//! that rendering reproduces the input.

use once_cell::sync::OnceCell;

use crate::document::{Block, Config, Empty, Host, Include, Kv, MatchBlock, Node};
use crate::error::ConfigError;
use crate::include;
use crate::pattern::Pattern;
use crate::position::Position;

/// Parse configuration text into a document.
///
/// `system` marks documents under `/etc/ssh`, which anchors relative
/// Include globs; `depth` is the Include nesting level of this document.
pub(crate) fn parse(content: &str, system: bool, depth: u8) -> Result<Config, ConfigError> {
    let mut config = Config::new();
    config.depth = depth;

    for (idx, line) in content.lines().enumerate() {
        let line_number = idx as u32 + 1;
        let rest = line.trim_start_matches([' ', '\t']);
        let leading_space = line.len() - rest.len();
        let position = Position::new(line_number, leading_space as u32 + 1);

        if rest.is_empty() {
            push_node(
                &mut config,
                Node::Empty(Empty {
                    comment: String::new(),
                    leading_space,
                    position,
                }),
            );
            continue;
        }

        if let Some(comment) = rest.strip_prefix('#') {
            push_node(
                &mut config,
                Node::Empty(Empty {
                    comment: comment.to_string(),
                    leading_space,
                    position,
                }),
            );
            continue;
        }

        let key_end = rest
            .find([' ', '\t', '='])
            .unwrap_or(rest.len());
        let keyword = &rest[..key_end];
        let mut after = rest[key_end..].trim_start_matches([' ', '\t']);
        let mut has_equals = false;
        if let Some(stripped) = after.strip_prefix('=') {
            has_equals = true;
            after = stripped.trim_start_matches([' ', '\t']);
        }

        let (value, space_after, comment) = split_value_comment(after);

        match keyword.to_lowercase().as_str() {
            "host" => {
                let mut patterns = Vec::new();
                for part in value.split([' ', '\t']).filter(|p| !p.is_empty()) {
                    let pattern = Pattern::new(part).map_err(|e| ConfigError::Parse {
                        message: e.to_string(),
                        position,
                    })?;
                    patterns.push(pattern);
                }
                if patterns.is_empty() {
                    return Err(ConfigError::Parse {
                        message: "Host directive requires at least one pattern".to_string(),
                        position,
                    });
                }
                config.blocks.push(Block::Host(Host {
                    patterns,
                    nodes: Vec::new(),
                    eol_comment: comment,
                    space_before_comment: space_after,
                    has_equals,
                    leading_space,
                    implicit: false,
                    position,
                }));
            }
            "match" => {
                config.has_match = true;
                config.blocks.push(Block::Match(MatchBlock {
                    criteria: value,
                    nodes: Vec::new(),
                    eol_comment: comment,
                    space_before_comment: space_after,
                    has_equals,
                    leading_space,
                    position,
                    parsed_criteria: OnceCell::new(),
                }));
            }
            "include" => {
                let directives: Vec<String> = value
                    .split([' ', '\t'])
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
                let (matches, files) = include::load_include(&directives, system, depth)?;
                push_node(
                    &mut config,
                    Node::Include(Include {
                        comment,
                        has_equals,
                        leading_space,
                        directives,
                        matches,
                        files,
                        depth: depth + 1,
                        position,
                    }),
                );
            }
            _ => {
                push_node(
                    &mut config,
                    Node::Kv(Kv {
                        key: keyword.to_string(),
                        value,
                        comment,
                        has_equals,
                        leading_space,
                        space_after_value: space_after,
                        position,
                    }),
                );
            }
        }
    }

    config.hosts = config
        .blocks
        .iter()
        .filter_map(|block| match block {
            Block::Host(host) => Some(host.clone()),
            Block::Match(_) => None,
        })
        .collect();

    Ok(config)
}

fn push_node(config: &mut Config, node: Node) {
    match config.blocks.last_mut() {
        Some(Block::Host(host)) => host.nodes.push(node),
        Some(Block::Match(matched)) => matched.nodes.push(node),
        // A document always opens with the implicit Host * block.
        None => {}
    }
}

/// Split the text after a keyword's separator into raw value, trailing
/// whitespace, and comment text.
///
/// A '#' starts the comment only when it is neither backslash-escaped nor
/// inside double quotes. Quotes and escapes stay part of the raw value so
/// the line renders back as written.
fn split_value_comment(input: &str) -> (String, String, String) {
    let mut in_quotes = false;
    let mut escaped = false;
    let mut comment_start = None;
    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '#' if !in_quotes => {
                comment_start = Some(i);
                break;
            }
            _ => {}
        }
    }

    let (value_part, comment) = match comment_start {
        Some(i) => (&input[..i], input[i + 1..].to_string()),
        None => (input, String::new()),
    };
    let value = value_part.trim_end_matches([' ', '\t']);
    let space_after = value_part[value.len()..].to_string();
    (value.to_string(), space_after, comment)
}
