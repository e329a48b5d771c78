//! `commits/`: one directory per reachable commit, named by its full id.

use std::collections::BTreeSet;

use super::traits::{DirEntry, NodeAttr, NodeOps};
use super::{ContentTreeNode, VirtualNode};
use crate::error::{GitfsError, Result};
use crate::repo::{ObjectId, SharedRepository};

#[derive(Debug, Clone)]
pub struct CommitsNode {
    repo: SharedRepository,
}

impl CommitsNode {
    pub fn new(repo: SharedRepository) -> Self {
        Self { repo }
    }
}

impl NodeOps for CommitsNode {
    fn attr(&self) -> NodeAttr {
        NodeAttr::synthetic_dir()
    }

    /// Only hex ids (full or abbreviated) resolve here; `HEAD`, `master~2`
    /// and other revision expressions do not.
    fn lookup(&self, name: &str) -> Result<VirtualNode> {
        if !ObjectId::is_hex_prefix(name) {
            return Err(GitfsError::not_found(format!("commit {}", name)));
        }
        let commit = self.repo.resolve_revision(name)?;
        tracing::debug!(requested = name, commit = %commit.id, "commit resolved");
        Ok(VirtualNode::ContentTree(ContentTreeNode::from_commit(
            self.repo.clone(),
            commit,
        )?))
    }

    fn readdir(&self) -> Result<Vec<DirEntry>> {
        let ids: BTreeSet<ObjectId> = self
            .repo
            .list_commits()
            .inspect_err(|e| tracing::warn!(error = %e, "commit listing aborted"))?
            .into_iter()
            .map(|c| c.id)
            .collect();
        Ok(ids
            .into_iter()
            .map(|id| DirEntry::directory(id.as_str()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{MemoryFile, MemoryRepository};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn history() -> (Arc<MemoryRepository>, ObjectId, ObjectId) {
        let repo = Arc::new(MemoryRepository::new());
        let c1 = repo.commit(&[], at(1), [("a", MemoryFile::regular("1"))]);
        let c2 = repo.commit(&[&c1], at(2), [("a", MemoryFile::regular("2"))]);
        repo.set_branch("master", &c2);
        repo.set_tag("v1", &c2);
        repo.set_tag("v0", &c1);
        (repo, c1, c2)
    }

    #[test]
    fn one_entry_per_reachable_commit() {
        let (repo, c1, c2) = history();
        let names: Vec<_> = CommitsNode::new(repo)
            .readdir()
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        let mut expected = vec![c1.to_string(), c2.to_string()];
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn full_and_abbreviated_ids_resolve() {
        let (repo, c1, _) = history();
        let node = CommitsNode::new(repo);
        for name in [c1.as_str(), &c1.as_str()[..7]] {
            let VirtualNode::ContentTree(tree) = node.lookup(name).unwrap() else {
                panic!("{name} should resolve to a content tree");
            };
            assert_eq!(tree.commit().id, c1);
        }
    }

    #[test]
    fn non_hex_names_are_not_found() {
        let (repo, _, _) = history();
        let node = CommitsNode::new(repo);
        for name in ["master", "HEAD", "v1", "abc", "0000000000"] {
            assert!(
                matches!(node.lookup(name), Err(GitfsError::NotFound(_))),
                "{name} should not resolve"
            );
        }
    }

    #[test]
    fn broken_history_aborts_listing() {
        let (repo, c1, _) = history();
        repo.drop_object(&c1);
        let err = CommitsNode::new(repo).readdir().unwrap_err();
        assert!(err.is_backend_failure());
    }
}
