//! Core node traits and types.

use std::time::SystemTime;

use super::VirtualNode;
use crate::error::{GitfsError, Result};
use crate::handle::FileHandle;

/// Permission bits of every directory in the mount.
pub const DIR_PERM: u16 = 0o555;

/// Kind of node or directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirEntryKind {
    File,
    Directory,
}

/// A directory entry as returned by [`NodeOps::readdir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name of the entry (not full path).
    pub name: String,
    pub kind: DirEntryKind,
}

impl DirEntry {
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DirEntryKind::Directory,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: DirEntryKind::File,
        }
    }
}

/// Attributes of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub kind: DirEntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Unix permission bits (e.g. 0o644).
    pub perm: u16,
    /// Commit time for revision-derived nodes; `None` for synthetic
    /// directories, which report the mount time instead.
    pub mtime: Option<SystemTime>,
}

impl NodeAttr {
    /// A directory not derived from any commit.
    pub fn synthetic_dir() -> Self {
        Self {
            kind: DirEntryKind::Directory,
            size: 0,
            perm: DIR_PERM,
            mtime: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == DirEntryKind::Directory
    }
}

/// What every virtual node can do.
///
/// Directory operations default to `NotADirectory` and `open` defaults to
/// `IsADirectory`, so each node only implements the half that applies to it.
/// Nodes are immutable; every call re-derives its answer from the repository.
pub trait NodeOps {
    fn attr(&self) -> NodeAttr;

    /// Resolve one path component below this node into a new node.
    fn lookup(&self, name: &str) -> Result<VirtualNode> {
        let _ = name;
        Err(GitfsError::NotADirectory)
    }

    /// List this directory. Entries are distinct by name.
    fn readdir(&self) -> Result<Vec<DirEntry>> {
        Err(GitfsError::NotADirectory)
    }

    /// Open this node's content for reading.
    fn open(&self) -> Result<FileHandle> {
        Err(GitfsError::IsADirectory)
    }
}
