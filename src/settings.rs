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

//! On-disk configuration discovery
//!
//! `UserSettings` locates the user and system config files, parses them
//! exactly once, and resolves against both with the user file taking
//! precedence. A load failure is sticky: unless `ignore_errors` is set,
//! every subsequent resolve reports it.

use std::io;
use std::path::{Path, PathBuf};

use once_cell::sync::{Lazy, OnceCell};

use crate::document::Config;
use crate::error::ConfigError;
use crate::include;
use crate::parser;
use crate::resolver::{self, Context, ResolveOptions, ResolveResult};

/// Locates a configuration file on disk. Returning `None` skips the
/// file.
pub type ConfigFinder = Box<dyn Fn() -> Option<PathBuf> + Send + Sync>;

static DEFAULT_USER_SETTINGS: Lazy<UserSettings> = Lazy::new(UserSettings::new);

/// Checks `$HOME/.ssh/config` and `/etc/ssh/ssh_config` for directives.
/// The config files are parsed and cached the first time resolve is
/// called; later resolves perform no I/O.
#[derive(Default)]
pub struct UserSettings {
    /// When set, a one-time load failure is ignored instead of being
    /// replayed by every resolve.
    pub ignore_errors: bool,
    custom_config_finder: Option<ConfigFinder>,
    user_config_finder: Option<ConfigFinder>,
    system_config_finder: Option<ConfigFinder>,
    loaded: OnceCell<LoadedConfigs>,
}

#[derive(Default)]
struct LoadedConfigs {
    custom: Option<Config>,
    user: Option<Config>,
    system: Option<Config>,
    error: Option<ConfigError>,
}

impl UserSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide settings object backed by the default user and
    /// system locations.
    pub fn shared() -> &'static UserSettings {
        &DEFAULT_USER_SETTINGS
    }

    /// Use a single custom configuration file instead of the user and
    /// system locations. A missing file is an error here, unlike the
    /// default finders: the caller named it, so absence likely means a
    /// mistake.
    ///
    /// Must be installed before the first resolve; afterwards the loaded
    /// set is fixed.
    pub fn config_finder<F>(&mut self, finder: F)
    where
        F: Fn() -> Option<PathBuf> + Send + Sync + 'static,
    {
        if self.loaded.get().is_some() {
            tracing::warn!("config_finder installed after configs were loaded; it has no effect");
        }
        self.custom_config_finder = Some(Box::new(finder));
    }

    /// Replace the user config finder (default: `$HOME/.ssh/config`).
    pub fn user_config_finder<F>(&mut self, finder: F)
    where
        F: Fn() -> Option<PathBuf> + Send + Sync + 'static,
    {
        self.user_config_finder = Some(Box::new(finder));
    }

    /// Replace the system config finder (default:
    /// `/etc/ssh/ssh_config`).
    pub fn system_config_finder<F>(&mut self, finder: F)
    where
        F: Fn() -> Option<PathBuf> + Send + Sync + 'static,
    {
        self.system_config_finder = Some(Box::new(finder));
    }

    /// Resolve the effective configuration for a host from the
    /// discovered files.
    pub fn resolve(&self, context: &Context) -> Result<ResolveResult, ConfigError> {
        self.resolve_with(context, &ResolveOptions::default())
    }

    /// Resolve with explicit options.
    pub fn resolve_with(
        &self,
        context: &Context,
        options: &ResolveOptions,
    ) -> Result<ResolveResult, ConfigError> {
        let loaded = self.load_once();
        if let Some(error) = &loaded.error {
            if !self.ignore_errors {
                return Err(error.clone());
            }
        }
        let mut configs: Vec<&Config> = Vec::with_capacity(2);
        if let Some(custom) = &loaded.custom {
            configs.push(custom);
        } else {
            if let Some(user) = &loaded.user {
                configs.push(user);
            }
            if let Some(system) = &loaded.system {
                configs.push(system);
            }
        }
        resolver::resolve_configs(context, options, &configs)
    }

    fn load_once(&self) -> &LoadedConfigs {
        self.loaded.get_or_init(|| {
            let mut loaded = LoadedConfigs::default();

            if let Some(finder) = &self.custom_config_finder {
                if let Some(path) = finder() {
                    // A custom file must exist; do not swallow NotFound.
                    match include::parse_path(&path, 0) {
                        Ok(config) => loaded.custom = Some(config),
                        Err(e) => loaded.error = Some(e),
                    }
                }
                return loaded;
            }

            let user_path = match &self.user_config_finder {
                Some(finder) => finder(),
                None => default_user_config_path(),
            };
            if let Some(path) = user_path {
                match load_optional(&path) {
                    Ok(config) => loaded.user = config,
                    Err(e) => {
                        loaded.error = Some(e);
                        return loaded;
                    }
                }
            }

            let system_path = match &self.system_config_finder {
                Some(finder) => finder(),
                None => Some(PathBuf::from("/etc/ssh/ssh_config")),
            };
            if let Some(path) = system_path {
                match load_optional(&path) {
                    Ok(config) => loaded.system = config,
                    Err(e) => {
                        loaded.error = Some(e);
                        return loaded;
                    }
                }
            }

            loaded
        })
    }
}

/// Parse a file that is allowed to be absent, as the default user and
/// system locations are on most machines.
fn load_optional(path: &Path) -> Result<Option<Config>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            parser::parse(&content, include::is_system_path(path), 0).map(Some)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        }),
    }
}

fn default_user_config_path() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    Some(home.join(".ssh").join("config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn finder_for(path: PathBuf) -> impl Fn() -> Option<PathBuf> + Send + Sync {
        move || Some(path.clone())
    }

    fn null_finder() -> Option<PathBuf> {
        None
    }

    #[test]
    fn test_user_config_resolution() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config");
        fs::write(&config_path, "Host wap\n  User root\n").unwrap();

        let mut settings = UserSettings::new();
        settings.user_config_finder(finder_for(config_path));
        settings.system_config_finder(null_finder);

        let res = settings.resolve(&Context::for_host("wap")).unwrap();
        assert_eq!(res.get("User"), "root");
        // Unset directives fall back to spec defaults.
        assert_eq!(res.get("Port"), "22");
    }

    #[test]
    fn test_user_config_wins_over_system() {
        let temp_dir = TempDir::new().unwrap();
        let user_path = temp_dir.path().join("user_config");
        let system_path = temp_dir.path().join("system_config");
        fs::write(&user_path, "Host wap\n  Port 1111\n").unwrap();
        fs::write(&system_path, "Host wap\n  Port 2222\n  User sysuser\n").unwrap();

        let mut settings = UserSettings::new();
        settings.user_config_finder(finder_for(user_path));
        settings.system_config_finder(finder_for(system_path));

        let res = settings.resolve(&Context::for_host("wap")).unwrap();
        assert_eq!(res.get("Port"), "1111");
        // The system file still contributes directives the user file
        // does not set.
        assert_eq!(res.get("User"), "sysuser");
    }

    #[test]
    fn test_empty_finders_use_defaults_only() {
        let mut settings = UserSettings::new();
        settings.user_config_finder(null_finder);
        settings.system_config_finder(null_finder);

        let res = settings.resolve(&Context::for_host("wap")).unwrap();
        assert_eq!(res.get("HostName"), "wap");
        assert_eq!(res.get("Port"), "22");
    }

    #[test]
    fn test_missing_default_style_file_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("no-such-config");

        let mut settings = UserSettings::new();
        settings.user_config_finder(finder_for(missing));
        settings.system_config_finder(null_finder);

        let res = settings.resolve(&Context::for_host("wap")).unwrap();
        assert_eq!(res.get("HostName"), "wap");
    }

    #[test]
    fn test_custom_finder() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("custom");
        fs::write(&config_path, "Host wap\n  User root\n").unwrap();

        let mut settings = UserSettings::new();
        settings.config_finder(finder_for(config_path));

        let res = settings.resolve(&Context::for_host("wap")).unwrap();
        assert_eq!(res.get("User"), "root");
    }

    #[test]
    fn test_custom_finder_missing_file_is_sticky_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("no-such-file");

        let mut settings = UserSettings::new();
        settings.config_finder(finder_for(missing));

        let err = settings.resolve(&Context::for_host("wap")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        // The failure is replayed without re-reading the file.
        let err2 = settings.resolve(&Context::for_host("wap")).unwrap_err();
        assert_eq!(err, err2);
    }

    #[test]
    fn test_ignore_errors() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("no-such-file");

        let mut settings = UserSettings::new();
        settings.ignore_errors = true;
        settings.config_finder(finder_for(missing));

        let res = settings.resolve(&Context::for_host("wap")).unwrap();
        assert_eq!(res.get("HostName"), "wap");
    }

    #[test]
    fn test_parse_error_in_user_config_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config");
        fs::write(&config_path, "Host\n").unwrap();

        let mut settings = UserSettings::new();
        settings.user_config_finder(finder_for(config_path));
        settings.system_config_finder(null_finder);

        let err = settings.resolve(&Context::for_host("wap")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
