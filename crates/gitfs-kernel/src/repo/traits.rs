//! Repository types and the object-store interface the node layer consumes.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::error::{GitfsError, Result};

/// Hex-encoded object id (commit, tree or blob).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `s` looks like a full or abbreviated hex object id.
    pub fn is_hex_prefix(s: &str) -> bool {
        (4..=64).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which reference namespace to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Branch,
    Tag,
}

impl RefKind {
    /// Namespace prefix of fully-qualified reference names.
    pub fn namespace(self) -> &'static str {
        match self {
            RefKind::Branch => "refs/heads/",
            RefKind::Tag => "refs/tags/",
        }
    }

    /// Fully-qualified reference name for a short name.
    pub fn qualify(self, short: &str) -> String {
        format!("{}{}", self.namespace(), short)
    }

    /// Name of the top-level directory listing this kind.
    pub fn dir_name(self) -> &'static str {
        match self {
            RefKind::Branch => "branches",
            RefKind::Tag => "tags",
        }
    }
}

/// A named pointer into the revision graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Short name, without the `refs/heads/` or `refs/tags/` namespace.
    pub name: String,
    pub target: ObjectId,
}

/// A resolved revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub id: ObjectId,
    /// Committer time; the mtime of every node derived from this commit.
    pub time: SystemTime,
    /// Root tree id.
    pub tree: ObjectId,
}

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// One named entry of a content tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    pub kind: EntryKind,
    pub id: ObjectId,
    /// Blob size in bytes; 0 for directories.
    pub size: u64,
    /// Mode recorded on the tree entry (e.g. `0o100644`).
    pub mode: u32,
}

/// A loaded tree: its id plus its entries in repository order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTree {
    pub id: ObjectId,
    pub entries: Arc<[TreeEntry]>,
}

impl ContentTree {
    pub fn find(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// A file within a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub id: ObjectId,
    pub name: String,
    pub size: u64,
    pub mode: u32,
}

impl Blob {
    fn from_entry(entry: &TreeEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            size: entry.size,
            mode: entry.mode,
        }
    }
}

/// Result of descending one level into a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeItem {
    Tree(ContentTree),
    Blob(Blob),
}

/// Bytes of a blob as handed out by a backend.
#[derive(Debug, Clone)]
pub enum BlobContent {
    /// Fully materialized copy owned by the caller.
    Buffered(Vec<u8>),
    /// Random-access bytes the store already holds; wrapped, not copied.
    Shared(Arc<[u8]>),
}

impl BlobContent {
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            BlobContent::Buffered(data) => data,
            BlobContent::Shared(data) => data,
        }
    }
}

/// Read-only access to a repository's references and object graph.
///
/// Every enumeration is re-derived from the store on each call; nothing is
/// cached between calls, so reference changes show up on the next listing.
/// Implementations must tolerate concurrent use from many requests.
pub trait Repository: fmt::Debug + Send + Sync {
    /// All references of one kind, by short name.
    fn list_references(&self, kind: RefKind) -> Result<Vec<Reference>>;

    /// Resolve a fully-qualified reference name or a full or abbreviated
    /// commit id. Other revision expressions are `NotFound`.
    fn resolve_revision(&self, revision: &str) -> Result<Commit>;

    /// Every commit reachable from any reference.
    fn list_commits(&self) -> Result<Vec<Commit>>;

    /// Load a tree by id.
    fn tree(&self, id: &ObjectId) -> Result<ContentTree>;

    /// Fetch a blob's content.
    fn open_blob(&self, blob: &Blob) -> Result<BlobContent>;

    /// Root content tree of a commit.
    fn root_tree(&self, commit: &Commit) -> Result<ContentTree> {
        self.tree(&commit.tree)
    }

    /// Exact-name lookup one level below `tree`.
    fn descend(&self, tree: &ContentTree, name: &str) -> Result<TreeItem> {
        let entry = tree
            .find(name)
            .ok_or_else(|| GitfsError::not_found(format!("{} in tree {}", name, tree.id)))?;
        match entry.kind {
            EntryKind::Directory => Ok(TreeItem::Tree(self.tree(&entry.id)?)),
            EntryKind::File => Ok(TreeItem::Blob(Blob::from_entry(entry))),
        }
    }

    /// Entries of a tree, in repository order. Restartable.
    fn entries<'a>(&self, tree: &'a ContentTree) -> &'a [TreeEntry] {
        &tree.entries
    }
}

/// Repository handle shared by every node of one mount.
pub type SharedRepository = Arc<dyn Repository>;
