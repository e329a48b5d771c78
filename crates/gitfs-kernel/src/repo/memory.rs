//! In-memory repository.
//!
//! Used for tests and for embedding gitfs over synthesized history. Objects are
//! content-addressed with SHA-1 the way git hashes them, so blob ids match the
//! ids git would assign. References can be changed at any time; the mounted
//! tree picks the change up on the next lookup or listing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use sha1::{Digest, Sha1};

use super::traits::{
    Blob, BlobContent, Commit, ContentTree, EntryKind, ObjectId, RefKind, Reference, Repository,
    TreeEntry,
};
use crate::error::{GitfsError, Result};

const MODE_TREE: u32 = 0o040000;
const MODE_FILE: u32 = 0o100644;
const MODE_EXECUTABLE: u32 = 0o100755;
const MODE_SYMLINK: u32 = 0o120000;

/// File content plus the mode recorded on its tree entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFile {
    data: Vec<u8>,
    mode: u32,
}

impl MemoryFile {
    pub fn regular(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            mode: MODE_FILE,
        }
    }

    pub fn executable(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            mode: MODE_EXECUTABLE,
        }
    }

    /// A symbolic link; the content is the link target.
    pub fn symlink(target: impl Into<Vec<u8>>) -> Self {
        Self {
            data: target.into(),
            mode: MODE_SYMLINK,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredCommit {
    commit: Commit,
    parents: Vec<ObjectId>,
}

/// Directory layout of one commit while it's being written.
enum Staged {
    File(MemoryFile),
    Dir(BTreeMap<String, Staged>),
}

#[derive(Debug, Default)]
struct State {
    blobs: HashMap<ObjectId, Arc<[u8]>>,
    trees: HashMap<ObjectId, Arc<[TreeEntry]>>,
    commits: HashMap<ObjectId, StoredCommit>,
    branches: BTreeMap<String, ObjectId>,
    tags: BTreeMap<String, ObjectId>,
}

/// In-memory repository.
///
/// Thread-safe via an internal `RwLock`. All data is lost when dropped.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    state: RwLock<State>,
}

impl MemoryRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a commit whose tree holds exactly `files`.
    ///
    /// Paths use `/` to create nested directories.
    pub fn commit<'a, I>(&self, parents: &[&ObjectId], time: SystemTime, files: I) -> ObjectId
    where
        I: IntoIterator<Item = (&'a str, MemoryFile)>,
    {
        let mut root = BTreeMap::new();
        for (path, file) in files {
            stage(&mut root, path, file);
        }

        let mut state = self.state.write();
        let tree = state.write_tree(root);

        let mut body = format!("tree {}\n", tree);
        for parent in parents {
            body.push_str(&format!("parent {}\n", parent));
        }
        let secs = time
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        body.push_str(&format!("committer gitfs <gitfs@localhost> {} +0000\n", secs));
        let id = hash_object("commit", body.as_bytes());

        state.commits.insert(
            id.clone(),
            StoredCommit {
                commit: Commit {
                    id: id.clone(),
                    time,
                    tree,
                },
                parents: parents.iter().map(|p| (*p).clone()).collect(),
            },
        );
        id
    }

    /// Create or move a branch.
    pub fn set_branch(&self, name: &str, target: &ObjectId) {
        self.state
            .write()
            .branches
            .insert(name.to_string(), target.clone());
    }

    /// Create or move a tag.
    pub fn set_tag(&self, name: &str, target: &ObjectId) {
        self.state.write().tags.insert(name.to_string(), target.clone());
    }

    pub fn remove_branch(&self, name: &str) -> bool {
        self.state.write().branches.remove(name).is_some()
    }

    pub fn remove_tag(&self, name: &str) -> bool {
        self.state.write().tags.remove(name).is_some()
    }

    /// Drop an object from the store, leaving dangling references to it.
    ///
    /// Reading through such a reference is a backing-store failure, the same
    /// as a missing pack object in a real repository.
    pub fn drop_object(&self, id: &ObjectId) -> bool {
        let mut state = self.state.write();
        state.blobs.remove(id).is_some()
            || state.trees.remove(id).is_some()
            || state.commits.remove(id).is_some()
    }
}

impl State {
    fn write_tree(&mut self, dir: BTreeMap<String, Staged>) -> ObjectId {
        let mut entries = Vec::with_capacity(dir.len());
        for (name, staged) in dir {
            let entry = match staged {
                Staged::File(file) => {
                    let id = hash_object("blob", &file.data);
                    let size = file.data.len() as u64;
                    self.blobs.insert(id.clone(), Arc::from(file.data));
                    TreeEntry {
                        name,
                        kind: EntryKind::File,
                        id,
                        size,
                        mode: file.mode,
                    }
                }
                Staged::Dir(children) => TreeEntry {
                    name,
                    kind: EntryKind::Directory,
                    id: self.write_tree(children),
                    size: 0,
                    mode: MODE_TREE,
                },
            };
            entries.push(entry);
        }

        let mut body = String::new();
        for entry in &entries {
            body.push_str(&format!("{:o} {}\0{}\n", entry.mode, entry.name, entry.id));
        }
        let id = hash_object("tree", body.as_bytes());
        self.trees.insert(id.clone(), Arc::from(entries));
        id
    }

    fn refs(&self, kind: RefKind) -> &BTreeMap<String, ObjectId> {
        match kind {
            RefKind::Branch => &self.branches,
            RefKind::Tag => &self.tags,
        }
    }

    fn commit(&self, id: &ObjectId) -> Result<&StoredCommit> {
        self.commits.get(id).ok_or_else(|| {
            GitfsError::backend(
                format!("read commit {}", id),
                std::io::Error::other("object missing from store"),
            )
        })
    }

    fn commit_by_prefix(&self, prefix: &str) -> Result<&StoredCommit> {
        let prefix = prefix.to_ascii_lowercase();
        let mut found = self
            .commits
            .iter()
            .filter(|(id, _)| id.as_str().starts_with(&prefix))
            .map(|(_, c)| c);
        match (found.next(), found.next()) {
            (Some(commit), None) => Ok(commit),
            (Some(_), Some(_)) => Err(GitfsError::not_found(format!(
                "ambiguous commit prefix {}",
                prefix
            ))),
            (None, _) => Err(GitfsError::not_found(format!("commit {}", prefix))),
        }
    }
}

fn stage(dir: &mut BTreeMap<String, Staged>, path: &str, file: MemoryFile) {
    let path = path.trim_matches('/');
    match path.split_once('/') {
        None => {
            dir.insert(path.to_string(), Staged::File(file));
        }
        Some((head, rest)) => {
            let child = dir
                .entry(head.to_string())
                .or_insert_with(|| Staged::Dir(BTreeMap::new()));
            if let Staged::File(_) = child {
                *child = Staged::Dir(BTreeMap::new());
            }
            if let Staged::Dir(children) = child {
                stage(children, rest, file);
            }
        }
    }
}

fn hash_object(kind: &str, body: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(format!("{} {}\0", kind, body.len()).as_bytes());
    hasher.update(body);
    ObjectId::new(format!("{:x}", hasher.finalize()))
}

impl Repository for MemoryRepository {
    fn list_references(&self, kind: RefKind) -> Result<Vec<Reference>> {
        let state = self.state.read();
        Ok(state
            .refs(kind)
            .iter()
            .map(|(name, target)| Reference {
                name: name.clone(),
                target: target.clone(),
            })
            .collect())
    }

    fn resolve_revision(&self, revision: &str) -> Result<Commit> {
        let state = self.state.read();
        for kind in [RefKind::Branch, RefKind::Tag] {
            if let Some(short) = revision.strip_prefix(kind.namespace()) {
                let target = state
                    .refs(kind)
                    .get(short)
                    .ok_or_else(|| GitfsError::not_found(revision))?;
                return Ok(state.commit(target)?.commit.clone());
            }
        }
        if ObjectId::is_hex_prefix(revision) {
            return Ok(state.commit_by_prefix(revision)?.commit.clone());
        }
        Err(GitfsError::not_found(revision))
    }

    fn list_commits(&self) -> Result<Vec<Commit>> {
        let state = self.state.read();
        let mut pending: Vec<ObjectId> = state
            .branches
            .values()
            .chain(state.tags.values())
            .cloned()
            .collect();
        let mut seen = HashSet::new();
        let mut commits = Vec::new();
        while let Some(id) = pending.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let stored = state.commit(&id)?;
            pending.extend(stored.parents.iter().cloned());
            commits.push(stored.commit.clone());
        }
        Ok(commits)
    }

    fn tree(&self, id: &ObjectId) -> Result<ContentTree> {
        let state = self.state.read();
        let entries = state.trees.get(id).cloned().ok_or_else(|| {
            GitfsError::backend(
                format!("read tree {}", id),
                std::io::Error::other("object missing from store"),
            )
        })?;
        Ok(ContentTree {
            id: id.clone(),
            entries,
        })
    }

    fn open_blob(&self, blob: &Blob) -> Result<BlobContent> {
        let state = self.state.read();
        state
            .blobs
            .get(&blob.id)
            .map(|data| BlobContent::Shared(Arc::clone(data)))
            .ok_or_else(|| {
                GitfsError::backend(
                    format!("read blob {}", blob.id),
                    std::io::Error::other("object missing from store"),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::TreeItem;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn blob_ids_match_git() {
        // `printf 'x' | git hash-object --stdin`
        let repo = MemoryRepository::new();
        let c = repo.commit(&[], at(1), [("a.txt", MemoryFile::regular("x"))]);
        let commit = repo.resolve_revision(c.as_str()).unwrap();
        let tree = repo.root_tree(&commit).unwrap();
        assert_eq!(
            tree.find("a.txt").unwrap().id.as_str(),
            "c1b0730e0133447badcfd47fd144e254807b06e1"
        );
    }

    #[test]
    fn nested_paths_become_subtrees() {
        let repo = MemoryRepository::new();
        let c = repo.commit(
            &[],
            at(1),
            [
                ("top.txt", MemoryFile::regular("top")),
                ("dir/inner.txt", MemoryFile::regular("inner")),
                ("dir/deeper/leaf.sh", MemoryFile::executable("#!/bin/sh\n")),
            ],
        );
        let commit = repo.resolve_revision(c.as_str()).unwrap();
        let root = repo.root_tree(&commit).unwrap();
        let names: Vec<_> = repo.entries(&root).iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["dir", "top.txt"]);

        let TreeItem::Tree(dir) = repo.descend(&root, "dir").unwrap() else {
            panic!("dir should be a tree");
        };
        let TreeItem::Tree(deeper) = repo.descend(&dir, "deeper").unwrap() else {
            panic!("deeper should be a tree");
        };
        let TreeItem::Blob(leaf) = repo.descend(&deeper, "leaf.sh").unwrap() else {
            panic!("leaf.sh should be a blob");
        };
        assert_eq!(leaf.mode, MODE_EXECUTABLE);
        assert_eq!(leaf.size, 10);
    }

    #[test]
    fn descend_is_exact_name_only() {
        let repo = MemoryRepository::new();
        let c = repo.commit(&[], at(1), [("readme.md", MemoryFile::regular("hi"))]);
        let commit = repo.resolve_revision(c.as_str()).unwrap();
        let root = repo.root_tree(&commit).unwrap();
        assert!(matches!(
            repo.descend(&root, "readme"),
            Err(GitfsError::NotFound(_))
        ));
    }

    #[test]
    fn resolves_refs_and_prefixes() {
        let repo = MemoryRepository::new();
        let c1 = repo.commit(&[], at(10), [("a", MemoryFile::regular("1"))]);
        let c2 = repo.commit(&[&c1], at(20), [("a", MemoryFile::regular("2"))]);
        repo.set_branch("release/1.0", &c1);
        repo.set_tag("v1", &c2);

        assert_eq!(repo.resolve_revision("refs/heads/release/1.0").unwrap().id, c1);
        assert_eq!(repo.resolve_revision("refs/tags/v1").unwrap().time, at(20));
        assert_eq!(repo.resolve_revision(&c2.as_str()[..12]).unwrap().id, c2);
        assert!(matches!(
            repo.resolve_revision("refs/heads/v1"),
            Err(GitfsError::NotFound(_))
        ));
        assert!(matches!(
            repo.resolve_revision("master"),
            Err(GitfsError::NotFound(_))
        ));
    }

    #[test]
    fn list_commits_walks_parents_once() {
        let repo = MemoryRepository::new();
        let c1 = repo.commit(&[], at(1), [("f", MemoryFile::regular("1"))]);
        let c2 = repo.commit(&[&c1], at(2), [("f", MemoryFile::regular("2"))]);
        let c3 = repo.commit(&[&c1], at(3), [("f", MemoryFile::regular("3"))]);
        let orphan = repo.commit(&[], at(4), [("f", MemoryFile::regular("4"))]);
        repo.set_branch("a", &c2);
        repo.set_branch("b", &c3);
        repo.set_tag("also-b", &c3);

        let mut ids: Vec<_> = repo.list_commits().unwrap().into_iter().map(|c| c.id).collect();
        ids.sort();
        let mut expected = vec![c1, c2, c3];
        expected.sort();
        assert_eq!(ids, expected);
        assert!(!repo.list_commits().unwrap().iter().any(|c| c.id == orphan));
    }

    #[test]
    fn dropped_objects_are_backend_failures() {
        let repo = MemoryRepository::new();
        let c = repo.commit(&[], at(1), [("a.txt", MemoryFile::regular("x"))]);
        repo.set_branch("main", &c);
        let commit = repo.resolve_revision("refs/heads/main").unwrap();
        assert!(repo.drop_object(&commit.tree));
        let err = repo.root_tree(&commit).unwrap_err();
        assert!(err.is_backend_failure());

        assert!(repo.drop_object(&c));
        assert!(repo.list_commits().unwrap_err().is_backend_failure());
    }

    #[test]
    fn references_are_live() {
        let repo = MemoryRepository::new();
        let c = repo.commit(&[], at(1), [("a", MemoryFile::regular("a"))]);
        assert!(repo.list_references(RefKind::Branch).unwrap().is_empty());
        repo.set_branch("main", &c);
        assert_eq!(repo.list_references(RefKind::Branch).unwrap().len(), 1);
        assert!(repo.remove_branch("main"));
        assert!(repo.list_references(RefKind::Branch).unwrap().is_empty());
    }
}
