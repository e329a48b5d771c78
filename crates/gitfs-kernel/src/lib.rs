//! gitfs-kernel: a git repository as a read-only directory tree.
//!
//! This crate provides:
//!
//! - **segment**: splits hierarchical reference names (`release/1.0`) into
//!   directory levels
//! - **repo**: the [`Repository`](repo::Repository) interface with a libgit2
//!   backend and an in-memory backend
//! - **vfs**: lazily-resolved virtual nodes for `branches/`, `tags/` and
//!   `commits/` and the commit content below them
//! - **handle**: per-open file buffers
//! - **fuse**: the `fuser` adapter and mount entry point (feature `native`)
//!
//! ```text
//! /branches/<ref-name-with-nested-segments>/...content...
//! /tags/<ref-name-with-nested-segments>/...content...
//! /commits/<commit-id>/...content...
//! ```

pub mod error;
#[cfg(feature = "native")]
pub mod fuse;
pub mod handle;
pub mod repo;
pub mod segment;
pub mod vfs;

pub use error::{GitfsError, Result};
#[cfg(feature = "native")]
pub use fuse::{GitFs, MountOptions, MountStats, StatsSnapshot, spawn_mount};
pub use handle::FileHandle;
pub use repo::{MemoryFile, MemoryRepository, Repository, SharedRepository};
pub use vfs::{NodeOps, VirtualNode, mount_root};
