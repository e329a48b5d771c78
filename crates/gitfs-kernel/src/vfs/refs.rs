//! `branches/` and `tags/`, with reference names split at `/` into nested
//! directories.

use super::traits::{DirEntry, NodeAttr, NodeOps};
use super::{ContentTreeNode, VirtualNode};
use crate::error::{GitfsError, Result};
use crate::repo::{RefKind, SharedRepository};
use crate::segment::{self, Resolution};

/// Top-level directory of one reference kind.
#[derive(Debug, Clone)]
pub struct RevisionGroupNode {
    repo: SharedRepository,
    kind: RefKind,
}

/// An intermediate directory inside a hierarchical reference name.
///
/// `prefix` is the accumulated name so far, ending in `/` (e.g. `release/`).
#[derive(Debug, Clone)]
pub struct RevisionSegmentNode {
    repo: SharedRepository,
    kind: RefKind,
    prefix: String,
}

impl RevisionGroupNode {
    pub fn new(repo: SharedRepository, kind: RefKind) -> Self {
        Self { repo, kind }
    }

    pub fn kind(&self) -> RefKind {
        self.kind
    }
}

impl RevisionSegmentNode {
    pub fn new(repo: SharedRepository, kind: RefKind, prefix: impl Into<String>) -> Self {
        Self {
            repo,
            kind,
            prefix: prefix.into(),
        }
    }

    pub fn kind(&self) -> RefKind {
        self.kind
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn reference_names(repo: &SharedRepository, kind: RefKind) -> Result<Vec<String>> {
    Ok(repo
        .list_references(kind)?
        .into_iter()
        .map(|r| r.name)
        .collect())
}

/// Resolve `prefix + name` against the current references of `kind`.
fn lookup_reference(
    repo: &SharedRepository,
    kind: RefKind,
    prefix: &str,
    name: &str,
) -> Result<VirtualNode> {
    let candidate = segment::join(prefix, name);
    let names = reference_names(repo, kind)?;
    match segment::resolve(&names, &candidate) {
        Resolution::ExactMatch => {
            let commit = repo.resolve_revision(&kind.qualify(&candidate))?;
            tracing::debug!(reference = %candidate, commit = %commit.id, "reference resolved");
            Ok(VirtualNode::ContentTree(ContentTreeNode::from_commit(
                repo.clone(),
                commit,
            )?))
        }
        Resolution::ProperPrefix => {
            tracing::debug!(prefix = %candidate, "reference segment");
            Ok(VirtualNode::RevisionSegment(RevisionSegmentNode::new(
                repo.clone(),
                kind,
                segment::child_prefix(&candidate),
            )))
        }
        Resolution::NotFound => Err(GitfsError::not_found(kind.qualify(&candidate))),
    }
}

fn list_segments(repo: &SharedRepository, kind: RefKind, prefix: &str) -> Result<Vec<DirEntry>> {
    let names = reference_names(repo, kind)?;
    Ok(segment::first_segments(&names, prefix)
        .into_iter()
        .map(DirEntry::directory)
        .collect())
}

impl NodeOps for RevisionGroupNode {
    fn attr(&self) -> NodeAttr {
        NodeAttr::synthetic_dir()
    }

    fn lookup(&self, name: &str) -> Result<VirtualNode> {
        lookup_reference(&self.repo, self.kind, "", name)
    }

    fn readdir(&self) -> Result<Vec<DirEntry>> {
        list_segments(&self.repo, self.kind, "")
    }
}

impl NodeOps for RevisionSegmentNode {
    fn attr(&self) -> NodeAttr {
        NodeAttr::synthetic_dir()
    }

    fn lookup(&self, name: &str) -> Result<VirtualNode> {
        lookup_reference(&self.repo, self.kind, &self.prefix, name)
    }

    fn readdir(&self) -> Result<Vec<DirEntry>> {
        list_segments(&self.repo, self.kind, &self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::{MemoryFile, MemoryRepository, ObjectId};
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn fixture() -> (Arc<MemoryRepository>, ObjectId) {
        let repo = Arc::new(MemoryRepository::new());
        let c = repo.commit(
            &[],
            SystemTime::UNIX_EPOCH + Duration::from_secs(100),
            [("a.txt", MemoryFile::regular("x"))],
        );
        for name in ["master", "release/1.0", "release/2.0", "feature/x/y"] {
            repo.set_branch(name, &c);
        }
        (repo, c)
    }

    fn names(entries: Vec<DirEntry>) -> Vec<String> {
        entries.into_iter().map(|e| e.name).collect()
    }

    #[test]
    fn group_lists_first_segments() {
        let (repo, _) = fixture();
        let group = RevisionGroupNode::new(repo, RefKind::Branch);
        assert_eq!(
            names(group.readdir().unwrap()),
            vec!["feature", "master", "release"]
        );
    }

    #[test]
    fn group_resolves_leaf_and_prefix() {
        let (repo, c) = fixture();
        let group = RevisionGroupNode::new(repo, RefKind::Branch);

        let VirtualNode::ContentTree(tree) = group.lookup("master").unwrap() else {
            panic!("master should resolve to a content tree");
        };
        assert_eq!(tree.commit().id, c);

        let VirtualNode::RevisionSegment(seg) = group.lookup("release").unwrap() else {
            panic!("release should be a segment");
        };
        assert_eq!(seg.prefix(), "release/");
        assert_eq!(names(seg.readdir().unwrap()), vec!["1.0", "2.0"]);
        assert!(matches!(
            seg.lookup("1.0").unwrap(),
            VirtualNode::ContentTree(_)
        ));
    }

    #[test]
    fn segments_nest() {
        let (repo, _) = fixture();
        let group = RevisionGroupNode::new(repo, RefKind::Branch);
        let VirtualNode::RevisionSegment(feature) = group.lookup("feature").unwrap() else {
            panic!("feature should be a segment");
        };
        let VirtualNode::RevisionSegment(x) = feature.lookup("x").unwrap() else {
            panic!("feature/x should be a segment");
        };
        assert_eq!(x.prefix(), "feature/x/");
        assert!(matches!(x.lookup("y").unwrap(), VirtualNode::ContentTree(_)));
        assert!(matches!(x.lookup("z"), Err(GitfsError::NotFound(_))));
    }

    #[test]
    fn unknown_and_partial_names_are_not_found() {
        let (repo, _) = fixture();
        let group = RevisionGroupNode::new(repo, RefKind::Branch);
        assert!(matches!(group.lookup("nope"), Err(GitfsError::NotFound(_))));
        assert!(matches!(group.lookup("mast"), Err(GitfsError::NotFound(_))));
    }

    #[test]
    fn kinds_do_not_mix() {
        let (repo, _) = fixture();
        let tags = RevisionGroupNode::new(repo, RefKind::Tag);
        assert!(tags.readdir().unwrap().is_empty());
        assert!(matches!(tags.lookup("master"), Err(GitfsError::NotFound(_))));
    }

    #[test]
    fn references_are_read_on_every_call() {
        let (repo, c) = fixture();
        let group = RevisionGroupNode::new(repo.clone(), RefKind::Branch);
        assert!(group.lookup("hotfix").is_err());

        repo.set_branch("hotfix", &c);
        assert!(group.lookup("hotfix").is_ok());
        assert!(names(group.readdir().unwrap()).contains(&"hotfix".to_string()));

        repo.remove_branch("hotfix");
        assert!(matches!(group.lookup("hotfix"), Err(GitfsError::NotFound(_))));
    }

    #[test]
    fn dangling_reference_is_a_backend_failure() {
        let (repo, _) = fixture();
        let orphan = ObjectId::new("0123456789abcdef0123456789abcdef01234567");
        repo.set_branch("broken", &orphan);
        let group = RevisionGroupNode::new(repo, RefKind::Branch);
        assert!(group.lookup("broken").unwrap_err().is_backend_failure());
    }
}
