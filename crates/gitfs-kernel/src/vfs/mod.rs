//! Virtual node layer.
//!
//! Every inode the kernel knows about is backed by one [`VirtualNode`]. Nodes
//! are created lazily by [`NodeOps::lookup`] on their parent; nothing below the
//! root exists until the kernel asks for it.
//!
//! ```text
//! /
//! ├── branches/          RevisionGroupNode(Branch)
//! │   └── release/       RevisionSegmentNode("release/")
//! │       └── 1.0/       ContentTreeNode (commit's root tree)
//! │           └── a.txt  ContentFileNode
//! ├── tags/              RevisionGroupNode(Tag)
//! └── commits/           CommitsNode
//!     └── <hex id>/      ContentTreeNode
//! ```

mod commits;
mod file;
mod refs;
mod root;
mod traits;
mod tree;

pub use commits::CommitsNode;
pub use file::ContentFileNode;
pub use refs::{RevisionGroupNode, RevisionSegmentNode};
pub use root::{RootNode, mount_root};
pub use traits::{DIR_PERM, DirEntry, DirEntryKind, NodeAttr, NodeOps};
pub use tree::ContentTreeNode;

use crate::error::Result;
use crate::handle::FileHandle;

/// One node of the mounted tree.
#[derive(Debug, Clone)]
pub enum VirtualNode {
    Root(RootNode),
    RevisionGroup(RevisionGroupNode),
    RevisionSegment(RevisionSegmentNode),
    Commits(CommitsNode),
    ContentTree(ContentTreeNode),
    ContentFile(ContentFileNode),
}

impl VirtualNode {
    fn ops(&self) -> &dyn NodeOps {
        match self {
            VirtualNode::Root(n) => n,
            VirtualNode::RevisionGroup(n) => n,
            VirtualNode::RevisionSegment(n) => n,
            VirtualNode::Commits(n) => n,
            VirtualNode::ContentTree(n) => n,
            VirtualNode::ContentFile(n) => n,
        }
    }

    /// Short label for log events.
    pub fn kind_name(&self) -> &'static str {
        match self {
            VirtualNode::Root(_) => "root",
            VirtualNode::RevisionGroup(_) => "revision-group",
            VirtualNode::RevisionSegment(_) => "revision-segment",
            VirtualNode::Commits(_) => "commits",
            VirtualNode::ContentTree(_) => "content-tree",
            VirtualNode::ContentFile(_) => "content-file",
        }
    }

    pub fn is_dir(&self) -> bool {
        !matches!(self, VirtualNode::ContentFile(_))
    }
}

impl NodeOps for VirtualNode {
    fn attr(&self) -> NodeAttr {
        self.ops().attr()
    }

    fn lookup(&self, name: &str) -> Result<VirtualNode> {
        self.ops().lookup(name)
    }

    fn readdir(&self) -> Result<Vec<DirEntry>> {
        self.ops().readdir()
    }

    fn open(&self) -> Result<FileHandle> {
        self.ops().open()
    }
}
