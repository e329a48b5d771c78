//! Optional configuration file.
//!
//! ```toml
//! attr_ttl_secs = 5
//! allow_other = true
//! auto_unmount = false
//! fs_name = "gitfs: monorepo"
//! log_filter = "gitfs_kernel=debug"
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::paths;

/// Settings read from `config.toml`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Kernel attribute and entry cache lifetime.
    pub attr_ttl_secs: u64,
    pub allow_other: bool,
    pub auto_unmount: bool,
    /// Overrides the default `gitfs: <repo>/.git` source name.
    pub fs_name: Option<String>,
    /// EnvFilter directive used when neither `-v` nor `RUST_LOG` is given.
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            attr_ttl_secs: 1,
            allow_other: false,
            auto_unmount: false,
            fs_name: None,
            log_filter: None,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields defaults; a missing explicit file is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default = paths::config_file();
                if default.exists() {
                    Self::from_file(&default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn attr_ttl(&self) -> Duration {
        Duration::from_secs(self.attr_ttl_secs)
    }
}
