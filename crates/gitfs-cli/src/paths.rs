//! XDG Base Directory paths for gitfs state.
//!
//! | Purpose | XDG Variable | Default | gitfs Path |
//! |---------|--------------|---------|------------|
//! | Config | `$XDG_CONFIG_HOME` | `~/.config` | `$XDG_CONFIG_HOME/gitfs/config.toml` |
//! | PID files | `$XDG_DATA_HOME` | `~/.local/share` | `$XDG_DATA_HOME/gitfs/pids/*.pid` |
//! | Daemon logs | `$XDG_DATA_HOME` | `~/.local/share` | `$XDG_DATA_HOME/gitfs/logs/*.log` |
//!
//! PID and log files are keyed by mountpoint: `<basename>-<md5(abs path)>`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::BaseDirs;
use md5::{Digest, Md5};

/// Get the data directory for daemon bookkeeping.
///
/// Uses `$XDG_DATA_HOME/gitfs` or falls back to `~/.local/share/gitfs`.
pub fn data_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| dirs_fallback().join(".local").join("share"))
        .join("gitfs")
}

/// Get the config directory.
///
/// Uses `$XDG_CONFIG_HOME/gitfs` or falls back to `~/.config/gitfs`.
pub fn config_dir() -> PathBuf {
    BaseDirs::new()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| dirs_fallback().join(".config"))
        .join("gitfs")
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

pub fn pids_dir() -> PathBuf {
    data_dir().join("pids")
}

/// Absolute form of `path`, without resolving symlinks.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("unable to get absolute path for '{}'", path.display()))
}

/// `<basename>-<md5 of the absolute path>` for an already-absolute mountpoint.
pub fn mount_id(mountpoint: &Path) -> String {
    let hash = Md5::digest(mountpoint.as_os_str().as_encoded_bytes());
    let base = mountpoint
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    format!("{}-{:x}", base, hash)
}

pub fn pid_file(mountpoint: &Path) -> PathBuf {
    pids_dir().join(format!("{}.pid", mount_id(mountpoint)))
}

pub fn log_file(mountpoint: &Path) -> PathBuf {
    logs_dir().join(format!("{}.log", mount_id(mountpoint)))
}

/// Create the logs and pids directories.
pub fn ensure_dirs() -> Result<()> {
    for dir in [logs_dir(), pids_dir()] {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

/// Fallback home directory when BaseDirs fails.
fn dirs_fallback() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
