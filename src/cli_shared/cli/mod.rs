// Copyright 2019-2026 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

mod config;

pub use config::{Config, LogConfig};

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "PRESERVATION_CONFIG";

/// Where the configuration was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigPath {
    Cli(PathBuf),
    Env(PathBuf),
    Project(PathBuf),
}

impl ConfigPath {
    pub fn to_path_buf(&self) -> &PathBuf {
        match self {
            ConfigPath::Cli(path) | ConfigPath::Env(path) | ConfigPath::Project(path) => path,
        }
    }
}

/// Looks for a configuration file given on the command line, then in
/// [`CONFIG_ENV`], then in the user's configuration directory.
pub fn find_config_path(config: Option<&Path>) -> Option<ConfigPath> {
    if let Some(path) = config {
        return Some(ConfigPath::Cli(path.to_owned()));
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(ConfigPath::Env(PathBuf::from(path)));
    }
    if let Some(dir) = ProjectDirs::from("com", "ChainSafe", "Preservation") {
        let path = dir.config_dir().join("config.toml");
        if path.exists() {
            return Some(ConfigPath::Project(path));
        }
    }
    None
}
