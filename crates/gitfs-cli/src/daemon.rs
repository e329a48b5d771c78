//! Daemon mode: detaching, PID files and signalling a running mount.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

use crate::paths;

/// Detach from the terminal. Must run before any threads are started.
#[cfg(not(target_os = "macos"))]
pub fn daemonize() -> Result<()> {
    nix::unistd::daemon(false, false).context("unable to run daemon process")
}

#[cfg(target_os = "macos")]
pub fn daemonize() -> Result<()> {
    bail!("daemon mode is not supported on macOS")
}

/// PID file of a running mount; removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Record the current process. Fails if a live process already owns `path`.
    pub fn create(path: &Path) -> Result<Self> {
        match read_pid(path) {
            Ok(pid) if is_running(pid) => bail!(
                "pid file {} belongs to running process {}",
                path.display(),
                pid
            ),
            _ => {}
        }
        std::fs::write(path, format!("{}\n", std::process::id()))
            .with_context(|| format!("failed to write pid file {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to remove pid file");
        }
    }
}

pub fn read_pid(path: &Path) -> Result<i32> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read pid file {}", path.display()))?;
    text.trim()
        .parse()
        .with_context(|| format!("malformed pid file {}", path.display()))
}

fn is_running(pid: i32) -> bool {
    signal::kill(Pid::from_raw(pid), None).is_ok()
}

/// Ask the daemon serving `mountpoint` to unmount (SIGINT).
pub fn signal_unmount(mountpoint: &Path) -> Result<()> {
    let mountpoint = paths::absolute(mountpoint)?;
    let pid_file = paths::pid_file(&mountpoint);
    let pid = match read_pid(&pid_file) {
        Ok(pid) if is_running(pid) => pid,
        _ => bail!(
            "unable to umount '{}': maybe it is not mounted",
            mountpoint.display()
        ),
    };
    signal::kill(Pid::from_raw(pid), Signal::SIGINT)
        .context("unable to interrupt daemon process")?;
    tracing::info!(pid, mountpoint = %mountpoint.display(), "sent SIGINT");
    Ok(())
}
