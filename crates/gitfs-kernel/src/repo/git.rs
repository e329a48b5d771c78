//! libgit2-backed repository.
//!
//! `git2::Repository` is `Send` but not `Sync`. Each store call checks out a
//! handle of its own from a small pool; the pool lock is only held to pop or
//! push a handle, never across object-database I/O.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use super::traits::{
    Blob, BlobContent, Commit, ContentTree, EntryKind, ObjectId, RefKind, Reference, Repository,
    TreeEntry,
};
use crate::error::{GitfsError, Result};

/// A repository on disk (work tree, `.git` directory or bare clone).
pub struct GitRepository {
    idle: Mutex<Vec<git2::Repository>>,
    path: PathBuf,
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("path", &self.path)
            .finish()
    }
}

impl GitRepository {
    /// Open an existing repository at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let repo = git2::Repository::open(path.as_ref())
            .map_err(|e| classify(format!("open repository {}", path.as_ref().display()), e))?;
        Ok(Self::from_git2(repo))
    }

    /// Clone `url` as a bare repository into `dest`.
    pub fn clone_bare(url: &str, dest: impl AsRef<Path>) -> Result<Self> {
        // Tags that no branch reaches are still listed under `tags/`.
        let mut fetch = git2::FetchOptions::new();
        fetch.download_tags(git2::AutotagOption::All);
        let repo = git2::build::RepoBuilder::new()
            .bare(true)
            .fetch_options(fetch)
            .clone(url, dest.as_ref())
            .map_err(|e| GitfsError::backend(format!("clone {}", url), e))?;
        let created = localize_remote_branches(&repo)
            .map_err(|e| GitfsError::backend(format!("create branches of {}", url), e))?;
        tracing::debug!(url, branches = created, "clone finished");
        Ok(Self::from_git2(repo))
    }

    pub fn from_git2(repo: git2::Repository) -> Self {
        let path = repo.path().to_path_buf();
        Self {
            idle: Mutex::new(vec![repo]),
            path,
        }
    }

    /// Run `f` on a handle no other call is using, opening one from `path`
    /// when the pool is empty.
    fn with_repo<T>(&self, f: impl FnOnce(&git2::Repository) -> Result<T>) -> Result<T> {
        let pooled = self.idle.lock().pop();
        let repo = match pooled {
            Some(repo) => repo,
            None => git2::Repository::open(&self.path).map_err(|e| {
                GitfsError::backend(format!("reopen repository {}", self.path.display()), e)
            })?,
        };
        let out = f(&repo);
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE {
            idle.push(repo);
        }
        out
    }

    #[cfg(test)]
    fn idle_handles(&self) -> usize {
        self.idle.lock().len()
    }

    /// The `.git` directory (or the bare repository itself).
    pub fn git_dir(&self) -> &Path {
        &self.path
    }
}

/// Map a libgit2 error: missing names become `NotFound`, everything else is a
/// backing-store failure.
fn classify(context: impl Into<String>, err: git2::Error) -> GitfsError {
    let context = context.into();
    match err.code() {
        git2::ErrorCode::NotFound
        | git2::ErrorCode::InvalidSpec
        | git2::ErrorCode::Ambiguous
        | git2::ErrorCode::Peel => GitfsError::NotFound(context),
        _ => GitfsError::backend(context, err),
    }
}

const MAX_IDLE: usize = 8;

const REMOTE_BRANCHES: &str = "refs/remotes/origin/";

/// A fresh clone only has the remote's default branch under `refs/heads/`;
/// mirror every remote-tracking branch there. Returns how many were written.
fn localize_remote_branches(repo: &git2::Repository) -> std::result::Result<usize, git2::Error> {
    let mut branches = Vec::new();
    for reference in repo.references_glob(&format!("{}*", REMOTE_BRANCHES))? {
        let reference = reference?;
        let (Some(name), Some(target)) = (reference.name(), reference.target()) else {
            continue;
        };
        match name.strip_prefix(REMOTE_BRANCHES) {
            Some("HEAD") | None => {}
            Some(short) => branches.push((RefKind::Branch.qualify(short), target)),
        }
    }
    for (name, target) in &branches {
        repo.reference(name, *target, true, "gitfs: branch from clone")?;
    }
    Ok(branches.len())
}

fn object_id(oid: git2::Oid) -> ObjectId {
    ObjectId::new(oid.to_string())
}

fn parse_oid(id: &ObjectId) -> Result<git2::Oid> {
    git2::Oid::from_str(id.as_str()).map_err(|e| GitfsError::backend(format!("parse id {}", id), e))
}

fn commit_time(commit: &git2::Commit<'_>) -> SystemTime {
    let secs = commit.committer().when().seconds();
    if secs >= 0 {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        SystemTime::UNIX_EPOCH
            .checked_sub(Duration::from_secs(secs.unsigned_abs()))
            .unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

fn to_commit(commit: &git2::Commit<'_>) -> Commit {
    Commit {
        id: object_id(commit.id()),
        time: commit_time(commit),
        tree: object_id(commit.tree_id()),
    }
}

impl Repository for GitRepository {
    fn list_references(&self, kind: RefKind) -> Result<Vec<Reference>> {
        let glob = format!("{}*", kind.namespace());
        self.with_repo(|repo| {
            let refs = repo
                .references_glob(&glob)
                .map_err(|e| GitfsError::backend(format!("list {}", glob), e))?;

            let mut out = Vec::new();
            for reference in refs {
                let reference =
                    reference.map_err(|e| GitfsError::backend(format!("list {}", glob), e))?;
                let Some(full) = reference.name() else {
                    tracing::debug!("skipping reference with non-UTF-8 name");
                    continue;
                };
                let Some(short) = full.strip_prefix(kind.namespace()) else {
                    continue;
                };
                // Annotated tags point at a tag object; list the commit behind it.
                let target = match reference.peel_to_commit() {
                    Ok(commit) => commit.id(),
                    Err(err) => {
                        tracing::debug!(reference = full, error = %err, "skipping non-commit reference");
                        continue;
                    }
                };
                out.push(Reference {
                    name: short.to_string(),
                    target: object_id(target),
                });
            }
            Ok(out)
        })
    }

    fn resolve_revision(&self, revision: &str) -> Result<Commit> {
        let qualified = [RefKind::Branch, RefKind::Tag]
            .iter()
            .any(|kind| revision.starts_with(kind.namespace()));
        if !qualified && !ObjectId::is_hex_prefix(revision) {
            return Err(GitfsError::not_found(revision));
        }
        self.with_repo(|repo| {
            // Hex names are ids only; a ref named `2024` is not a commit prefix.
            let commit = if qualified {
                repo.find_reference(revision)
                    .and_then(|r| r.peel_to_commit())
                    .map_err(|e| classify(format!("resolve {}", revision), e))?
            } else {
                repo.find_commit_by_prefix(revision)
                    .map_err(|e| classify(format!("commit {}", revision), e))?
            };
            Ok(to_commit(&commit))
        })
    }

    fn list_commits(&self) -> Result<Vec<Commit>> {
        self.with_repo(|repo| {
            let mut walk = repo
                .revwalk()
                .map_err(|e| GitfsError::backend("start history walk", e))?;
            walk.push_glob("refs/*")
                .map_err(|e| GitfsError::backend("walk references", e))?;
            // Unborn or detached-and-missing HEAD is not an error here.
            if let Err(err) = walk.push_head() {
                tracing::debug!(error = %err, "HEAD not included in history walk");
            }

            let mut seen = HashSet::new();
            let mut commits = Vec::new();
            for oid in walk {
                let oid = oid.map_err(|e| GitfsError::backend("walk history", e))?;
                if !seen.insert(oid) {
                    continue;
                }
                let commit = repo
                    .find_commit(oid)
                    .map_err(|e| GitfsError::backend(format!("read commit {}", oid), e))?;
                commits.push(to_commit(&commit));
            }
            Ok(commits)
        })
    }

    fn tree(&self, id: &ObjectId) -> Result<ContentTree> {
        let oid = parse_oid(id)?;
        self.with_repo(|repo| {
            let tree = repo
                .find_tree(oid)
                .map_err(|e| GitfsError::backend(format!("read tree {}", id), e))?;
            let odb = repo
                .odb()
                .map_err(|e| GitfsError::backend("open object database", e))?;

            let mut entries = Vec::with_capacity(tree.len());
            for entry in tree.iter() {
                let Some(name) = entry.name() else {
                    tracing::debug!(tree = %id, "skipping tree entry with non-UTF-8 name");
                    continue;
                };
                let mode = entry.filemode() as u32;
                let (kind, size) = match entry.kind() {
                    Some(git2::ObjectType::Blob) => {
                        let (size, _) = odb.read_header(entry.id()).map_err(|e| {
                            GitfsError::backend(format!("read header of {}", entry.id()), e)
                        })?;
                        (EntryKind::File, size as u64)
                    }
                    // Subtrees, and gitlinks (submodules), whose descent fails later.
                    _ => (EntryKind::Directory, 0),
                };
                entries.push(TreeEntry {
                    name: name.to_string(),
                    kind,
                    id: object_id(entry.id()),
                    size,
                    mode,
                });
            }
            Ok(ContentTree {
                id: id.clone(),
                entries: entries.into(),
            })
        })
    }

    fn open_blob(&self, blob: &Blob) -> Result<BlobContent> {
        let oid = parse_oid(&blob.id)?;
        self.with_repo(|repo| {
            let object = repo
                .find_blob(oid)
                .map_err(|e| GitfsError::backend(format!("read blob {}", blob.id), e))?;
            Ok(BlobContent::Buffered(object.content().to_vec()))
        })
    }
}
