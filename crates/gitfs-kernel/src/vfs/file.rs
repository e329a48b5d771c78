//! Files inside a commit's content.

use super::traits::{DirEntryKind, NodeAttr, NodeOps};
use crate::error::Result;
use crate::handle::FileHandle;
use crate::repo::{Blob, Commit, SharedRepository};

const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;
/// Symbolic links are served as plain files holding the link target.
const LINK_PERM: u16 = 0o644;

fn file_perm(mode: u32) -> u16 {
    if mode & S_IFMT == S_IFREG {
        (mode & 0o7777) as u16
    } else {
        LINK_PERM
    }
}

/// A blob of a resolved commit.
#[derive(Debug, Clone)]
pub struct ContentFileNode {
    repo: SharedRepository,
    commit: Commit,
    blob: Blob,
}

impl ContentFileNode {
    pub fn new(repo: SharedRepository, commit: Commit, blob: Blob) -> Self {
        Self { repo, commit, blob }
    }

    pub fn blob(&self) -> &Blob {
        &self.blob
    }
}

impl NodeOps for ContentFileNode {
    fn attr(&self) -> NodeAttr {
        NodeAttr {
            kind: DirEntryKind::File,
            size: self.blob.size,
            perm: file_perm(self.blob.mode),
            mtime: Some(self.commit.time),
        }
    }

    fn open(&self) -> Result<FileHandle> {
        let content = self.repo.open_blob(&self.blob).inspect_err(|e| {
            tracing::error!(file = %self.blob.name, blob = %self.blob.id, error = %e, "open failed");
        })?;
        tracing::info!(file = %self.blob.name, size = self.blob.size, "file opened");
        Ok(FileHandle::new(self.blob.name.clone(), content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GitfsError;
    use crate::repo::{MemoryFile, MemoryRepository, Repository, TreeItem};
    use crate::vfs::VirtualNode;
    use std::sync::Arc;
    use std::time::{Duration, SystemTime};

    fn file(repo: &Arc<MemoryRepository>, data: &str) -> ContentFileNode {
        let id = repo.commit(
            &[],
            SystemTime::UNIX_EPOCH + Duration::from_secs(42),
            [("notes.txt", MemoryFile::regular(data))],
        );
        let commit = repo.resolve_revision(id.as_str()).unwrap();
        let root = repo.root_tree(&commit).unwrap();
        let TreeItem::Blob(blob) = repo.descend(&root, "notes.txt").unwrap() else {
            panic!("notes.txt should be a blob");
        };
        ContentFileNode::new(repo.clone(), commit, blob)
    }

    #[test]
    fn attributes_come_from_blob_and_commit() {
        let repo = Arc::new(MemoryRepository::new());
        let attr = file(&repo, "hello world").attr();
        assert_eq!(attr.kind, DirEntryKind::File);
        assert_eq!(attr.size, 11);
        assert_eq!(attr.perm, 0o644);
        assert_eq!(
            attr.mtime,
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(42))
        );
    }

    #[test]
    fn open_reads_blob_bytes() {
        let repo = Arc::new(MemoryRepository::new());
        let handle = file(&repo, "hello world").open().unwrap();
        assert_eq!(handle.read(6, 100).unwrap(), b"world");
    }

    #[test]
    fn directory_operations_fail() {
        let repo = Arc::new(MemoryRepository::new());
        let node = VirtualNode::ContentFile(file(&repo, "x"));
        assert!(!node.is_dir());
        assert!(matches!(node.lookup("a"), Err(GitfsError::NotADirectory)));
        assert!(matches!(node.readdir(), Err(GitfsError::NotADirectory)));
    }

    #[test]
    fn symlinks_read_as_their_target() {
        let repo = Arc::new(MemoryRepository::new());
        let id = repo.commit(
            &[],
            SystemTime::UNIX_EPOCH,
            [("latest", MemoryFile::symlink("releases/1.0"))],
        );
        let commit = repo.resolve_revision(id.as_str()).unwrap();
        let root = repo.root_tree(&commit).unwrap();
        let TreeItem::Blob(blob) = repo.descend(&root, "latest").unwrap() else {
            panic!("latest should be a blob");
        };
        let node = ContentFileNode::new(repo.clone(), commit, blob);
        assert_eq!(node.attr().perm, 0o644);
        assert_eq!(node.open().unwrap().read(0, 64).unwrap(), b"releases/1.0");
    }

    #[test]
    fn missing_blob_fails_open() {
        let repo = Arc::new(MemoryRepository::new());
        let node = file(&repo, "gone");
        repo.drop_object(&node.blob().id);
        assert!(node.open().unwrap_err().is_backend_failure());
    }
}
