//! Directories inside a commit's content.

use super::traits::{DIR_PERM, DirEntry, DirEntryKind, NodeAttr, NodeOps};
use super::{ContentFileNode, VirtualNode};
use crate::error::Result;
use crate::repo::{Commit, ContentTree, EntryKind, SharedRepository, TreeItem};

/// A tree of a resolved commit: the commit's root tree or any subtree.
#[derive(Debug, Clone)]
pub struct ContentTreeNode {
    repo: SharedRepository,
    commit: Commit,
    tree: ContentTree,
}

impl ContentTreeNode {
    /// Node for the root tree of `commit`.
    pub fn from_commit(repo: SharedRepository, commit: Commit) -> Result<Self> {
        let tree = repo.root_tree(&commit)?;
        Ok(Self { repo, commit, tree })
    }

    pub fn commit(&self) -> &Commit {
        &self.commit
    }

    pub fn tree(&self) -> &ContentTree {
        &self.tree
    }
}

impl NodeOps for ContentTreeNode {
    fn attr(&self) -> NodeAttr {
        NodeAttr {
            kind: DirEntryKind::Directory,
            size: 0,
            perm: DIR_PERM,
            mtime: Some(self.commit.time),
        }
    }

    fn lookup(&self, name: &str) -> Result<VirtualNode> {
        let node = match self.repo.descend(&self.tree, name)? {
            TreeItem::Tree(tree) => VirtualNode::ContentTree(ContentTreeNode {
                repo: self.repo.clone(),
                commit: self.commit.clone(),
                tree,
            }),
            TreeItem::Blob(blob) => VirtualNode::ContentFile(ContentFileNode::new(
                self.repo.clone(),
                self.commit.clone(),
                blob,
            )),
        };
        tracing::debug!(tree = %self.tree.id, name, kind = node.kind_name(), "tree lookup");
        Ok(node)
    }

    fn readdir(&self) -> Result<Vec<DirEntry>> {
        Ok(self
            .repo
            .entries(&self.tree)
            .iter()
            .map(|entry| match entry.kind {
                EntryKind::Directory => DirEntry::directory(&entry.name),
                EntryKind::File => DirEntry::file(&entry.name),
            })
            .collect())
    }
}
