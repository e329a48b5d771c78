//! Opening the repository to mount: a local path, or a URL cloned into
//! temporary storage for the lifetime of the mount.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use gitfs_kernel::repo::GitRepository;
use tempfile::TempDir;

/// A repository ready to mount.
pub struct OpenedRepository {
    pub repo: Arc<GitRepository>,
    /// Source name shown by `mount`.
    pub fs_name: String,
    /// Last path component of the repository location.
    pub base_name: String,
    // Removed on drop, after the mount is gone.
    clone_dir: Option<TempDir>,
}

impl std::fmt::Debug for OpenedRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedRepository")
            .field("repo", &self.repo)
            .field("fs_name", &self.fs_name)
            .field("cloned", &self.clone_dir.is_some())
            .finish()
    }
}

impl OpenedRepository {
    pub fn is_clone(&self) -> bool {
        self.clone_dir.is_some()
    }
}

fn base_name(location: &str) -> String {
    let trimmed = location.trim_end_matches('/');
    let base = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    base.strip_suffix(".git").unwrap_or(base).to_string()
}

/// Open `location` if it exists on disk, otherwise clone it as a URL.
pub fn open_or_clone(location: &str) -> Result<OpenedRepository> {
    let path = Path::new(location);
    if path.exists() {
        let path: PathBuf = crate::paths::absolute(path)?;
        let repo = GitRepository::open(&path)
            .with_context(|| format!("failed to open repository {}", path.display()))?;
        tracing::info!(path = %path.display(), git_dir = %repo.git_dir().display(), "repository opened");
        return Ok(OpenedRepository {
            repo: Arc::new(repo),
            fs_name: format!("gitfs: {}", path.join(".git").display()),
            base_name: base_name(location),
            clone_dir: None,
        });
    }

    let dir = tempfile::Builder::new()
        .prefix("gitfs-")
        .tempdir()
        .context("failed to create clone directory")?;
    eprintln!("Cloning repository {} into {}", location, dir.path().display());
    let repo = GitRepository::clone_bare(location, dir.path())
        .with_context(|| format!("failed to clone repository {}", location))?;
    tracing::info!(url = location, dir = %dir.path().display(), "repository cloned");
    Ok(OpenedRepository {
        repo: Arc::new(repo),
        fs_name: format!("gitfs: {}", location),
        base_name: base_name(location),
        clone_dir: Some(dir),
    })
}
