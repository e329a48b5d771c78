//! Repository backends.
//!
//! The node layer sees a repository only through the [`Repository`] trait:
//!
//! - **GitRepository**: libgit2 over a work tree, `.git` directory or bare clone
//! - **MemoryRepository**: in-memory objects with random-access blobs (tests, embedding)

#[cfg(feature = "native")]
mod git;
mod memory;
mod traits;

#[cfg(feature = "native")]
pub use git::GitRepository;
pub use memory::{MemoryFile, MemoryRepository};
pub use traits::{
    Blob, BlobContent, Commit, ContentTree, EntryKind, ObjectId, RefKind, Reference, Repository,
    SharedRepository, TreeEntry, TreeItem,
};
