//! The mount root: `branches`, `commits` and `tags`.

use super::traits::{DirEntry, NodeAttr, NodeOps};
use super::{CommitsNode, RevisionGroupNode, VirtualNode};
use crate::error::{GitfsError, Result};
use crate::repo::{RefKind, SharedRepository};

const COMMITS_DIR: &str = "commits";

/// Root of a mount.
#[derive(Debug, Clone)]
pub struct RootNode {
    repo: SharedRepository,
}

/// Build the root node of a mount over `repo`.
///
/// This is the only entry point front ends need; every other node is reached
/// through lookups from here.
pub fn mount_root(repo: SharedRepository) -> VirtualNode {
    VirtualNode::Root(RootNode { repo })
}

impl NodeOps for RootNode {
    fn attr(&self) -> NodeAttr {
        NodeAttr::synthetic_dir()
    }

    fn lookup(&self, name: &str) -> Result<VirtualNode> {
        let node = match name {
            n if n == RefKind::Branch.dir_name() => {
                VirtualNode::RevisionGroup(RevisionGroupNode::new(self.repo.clone(), RefKind::Branch))
            }
            n if n == RefKind::Tag.dir_name() => {
                VirtualNode::RevisionGroup(RevisionGroupNode::new(self.repo.clone(), RefKind::Tag))
            }
            COMMITS_DIR => VirtualNode::Commits(CommitsNode::new(self.repo.clone())),
            _ => return Err(GitfsError::not_found(format!("/{}", name))),
        };
        tracing::debug!(name, "root lookup");
        Ok(node)
    }

    fn readdir(&self) -> Result<Vec<DirEntry>> {
        Ok(vec![
            DirEntry::directory(RefKind::Branch.dir_name()),
            DirEntry::directory(COMMITS_DIR),
            DirEntry::directory(RefKind::Tag.dir_name()),
        ])
    }
}
