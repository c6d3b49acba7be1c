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

//! Include directive loading and scoping against temporary directories.

use std::fs;

use tempfile::TempDir;

use sshcfg::{Block, Config, ConfigError, Context, Node, ResolveOptions};

#[test]
fn test_include_resolves_directives() {
    let temp_dir = TempDir::new().unwrap();
    let extra = temp_dir.path().join("extra.conf");
    fs::write(&extra, "Host included.example.com\n  Port 4567\n").unwrap();

    let main = format!("Include {}\n", extra.display());
    let cfg = Config::parse_str(&main).unwrap();

    let res = cfg
        .resolve(&Context::for_host("included.example.com"))
        .unwrap();
    assert_eq!(res.get("Port"), "4567");
}

#[test]
fn test_include_glob_loads_files_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("config.d");
    fs::create_dir(&dir).unwrap();
    fs::write(dir.join("01-first.conf"), "Host first\n  Port 1001\n").unwrap();
    fs::write(dir.join("02-second.conf"), "Host first\n  Port 1002\n").unwrap();

    let main = format!("Include {}/*.conf\n", dir.display());
    let cfg = Config::parse_str(&main).unwrap();

    // Both files match "first"; the earlier file wins the single-valued
    // directive.
    let res = cfg.resolve(&Context::for_host("first")).unwrap();
    assert_eq!(res.get("Port"), "1001");

    match &cfg.blocks[0] {
        Block::Host(host) => match &host.nodes[0] {
            Node::Include(include) => {
                assert_eq!(include.matched_paths().len(), 2);
                assert!(include.matched_paths()[0].ends_with("01-first.conf"));
            }
            _ => panic!("expected Include node"),
        },
        _ => panic!("expected implicit Host block"),
    }
}

#[test]
fn test_include_missing_glob_is_not_an_error() {
    let temp_dir = TempDir::new().unwrap();
    let main = format!("Include {}/nonexistent-*.conf\nHost foo\n  Port 22\n", temp_dir.path().display());
    let cfg = Config::parse_str(&main).unwrap();
    let res = cfg.resolve(&Context::for_host("foo")).unwrap();
    assert_eq!(res.get("Port"), "22");
}

#[test]
fn test_recursive_include_exceeds_depth() {
    let temp_dir = TempDir::new().unwrap();
    let looping = temp_dir.path().join("looping.conf");
    fs::write(&looping, format!("Include {}\n", looping.display())).unwrap();

    let err = Config::parse_file(&looping).unwrap_err();
    assert_eq!(err, ConfigError::DepthExceeded);
}

#[test]
fn test_include_chain_within_depth_limit() {
    let temp_dir = TempDir::new().unwrap();
    let leaf = temp_dir.path().join("leaf.conf");
    fs::write(&leaf, "Host deep\n  Port 9999\n").unwrap();
    let mut previous = leaf;
    for i in 0..4 {
        let link = temp_dir.path().join(format!("link{i}.conf"));
        fs::write(&link, format!("Include {}\n", previous.display())).unwrap();
        previous = link;
    }

    let cfg = Config::parse_file(&previous).unwrap();
    let res = cfg.resolve(&Context::for_host("deep")).unwrap();
    assert_eq!(res.get("Port"), "9999");
}

#[test]
fn test_include_under_inactive_block_never_matches() {
    let temp_dir = TempDir::new().unwrap();
    let extra = temp_dir.path().join("scoped.conf");
    fs::write(&extra, "Host *\n  Port 9999\n").unwrap();

    let main = format!("Host gateway.example.com\n  Include {}\n", extra.display());
    let cfg = Config::parse_str(&main).unwrap();

    // The enclosing block does not match, so the included Host * must
    // not activate either.
    let res = cfg.resolve(&Context::for_host("other.example.com")).unwrap();
    assert_eq!(res.get("Port"), "22");

    // When the enclosing block matches, the include applies.
    let res = cfg
        .resolve(&Context::for_host("gateway.example.com"))
        .unwrap();
    assert_eq!(res.get("Port"), "9999");
}

#[test]
fn test_include_under_inactive_block_is_still_validated() {
    let temp_dir = TempDir::new().unwrap();
    let extra = temp_dir.path().join("invalid.conf");
    fs::write(&extra, "Host *\n  Port nope\n").unwrap();

    let main = format!("Host gateway.example.com\n  Include {}\n", extra.display());
    let cfg = Config::parse_str(&main).unwrap();

    let err = cfg
        .resolve_with(
            &Context::for_host("other.example.com"),
            &ResolveOptions::new().strict(),
        )
        .unwrap_err();
    assert!(err.to_string().contains("unsigned integer"));
}

#[test]
fn test_include_parse_error_propagates() {
    let temp_dir = TempDir::new().unwrap();
    let broken = temp_dir.path().join("broken.conf");
    fs::write(&broken, "Host\n").unwrap();

    let main = format!("Include {}\n", broken.display());
    let err = Config::parse_str(&main).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_include_line_renders_as_written() {
    let temp_dir = TempDir::new().unwrap();
    let extra = temp_dir.path().join("extra.conf");
    fs::write(&extra, "Host included\n  Port 4567\n").unwrap();

    let main = format!("Host foo\n  Include {}\n  Port 22\n", extra.display());
    let cfg = Config::parse_str(&main).unwrap();
    // Included sub-documents are not inlined into the rendering.
    assert_eq!(cfg.to_string(), main);
}
