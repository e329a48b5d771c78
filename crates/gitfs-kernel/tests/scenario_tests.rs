//! End-to-end node tests over the in-memory backend.
//!
//! Paths are walked one component at a time exactly as the kernel would, so
//! these exercise the whole lookup chain from the mount root.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use gitfs_kernel::repo::ObjectId;
use gitfs_kernel::vfs::{DirEntryKind, VirtualNode};
use gitfs_kernel::{GitfsError, MemoryFile, MemoryRepository, NodeOps, mount_root};
use rstest::{fixture, rstest};

fn at(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

fn walk(root: &VirtualNode, path: &str) -> Result<VirtualNode, GitfsError> {
    let mut node = root.clone();
    for name in path.split('/').filter(|s| !s.is_empty()) {
        node = node.lookup(name)?;
    }
    Ok(node)
}

fn names(root: &VirtualNode, path: &str) -> Vec<String> {
    walk(root, path)
        .unwrap()
        .readdir()
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect()
}

fn read_all(root: &VirtualNode, path: &str) -> Vec<u8> {
    let node = walk(root, path).unwrap();
    let handle = node.open().unwrap();
    let data = handle.read(0, usize::MAX).unwrap();
    handle.release();
    data
}

struct Release {
    repo: Arc<MemoryRepository>,
    root: VirtualNode,
    c1: ObjectId,
    c2: ObjectId,
}

/// `release/1.0` → C1 (`a.txt = "x"`), tag `v1` → C2 (adds `b.txt = "y"`).
#[fixture]
fn release() -> Release {
    let repo = Arc::new(MemoryRepository::new());
    let c1 = repo.commit(&[], at(100), [("a.txt", MemoryFile::regular("x"))]);
    let c2 = repo.commit(
        &[&c1],
        at(200),
        [
            ("a.txt", MemoryFile::regular("x")),
            ("b.txt", MemoryFile::regular("y")),
        ],
    );
    repo.set_branch("release/1.0", &c1);
    repo.set_tag("v1", &c2);
    let root = mount_root(repo.clone());
    Release { repo, root, c1, c2 }
}

#[rstest]
fn release_branch_is_segmented(release: Release) {
    assert_eq!(names(&release.root, "branches"), vec!["release"]);
    assert_eq!(names(&release.root, "branches/release"), vec!["1.0"]);
    assert_eq!(names(&release.root, "branches/release/1.0"), vec!["a.txt"]);
    assert_eq!(read_all(&release.root, "branches/release/1.0/a.txt"), b"x");
}

#[rstest]
fn tag_shows_second_commit(release: Release) {
    assert_eq!(names(&release.root, "tags"), vec!["v1"]);
    assert_eq!(names(&release.root, "tags/v1"), vec!["a.txt", "b.txt"]);
    assert_eq!(read_all(&release.root, "tags/v1/b.txt"), b"y");
}

#[rstest]
fn commits_lists_both(release: Release) {
    let mut expected = vec![release.c1.to_string(), release.c2.to_string()];
    expected.sort();
    assert_eq!(names(&release.root, "commits"), expected);

    let c1 = format!("commits/{}", release.c1);
    assert_eq!(names(&release.root, &c1), vec!["a.txt"]);
    let c2 = format!("commits/{}", release.c2);
    assert_eq!(names(&release.root, &c2), vec!["a.txt", "b.txt"]);
}

#[rstest]
fn concurrent_walks_share_one_tree(release: Release) {
    let mut expected = vec![release.c1.to_string(), release.c2.to_string()];
    expected.sort();
    let root = &release.root;
    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..50 {
                    assert_eq!(read_all(root, "tags/v1/b.txt"), b"y");
                    assert_eq!(names(root, "commits"), expected);
                    assert_eq!(names(root, "branches/release"), vec!["1.0"]);
                }
            });
        }
    });
}

#[rstest]
fn mtimes_follow_commit_time(release: Release) {
    let branch = walk(&release.root, "branches/release/1.0").unwrap();
    assert_eq!(branch.attr().mtime, Some(at(100)));
    let file = walk(&release.root, "tags/v1/b.txt").unwrap();
    assert_eq!(file.attr().mtime, Some(at(200)));
    assert_eq!(file.attr().size, 1);
    assert_eq!(file.attr().kind, DirEntryKind::File);

    let segment = walk(&release.root, "branches/release").unwrap();
    assert_eq!(segment.attr().mtime, None);
}

#[rstest]
#[case::top_level("nope")]
#[case::branch("branches/nope")]
#[case::partial_segment("branches/rel")]
#[case::segment_leaf("branches/release/2.0")]
#[case::tag("tags/v2")]
#[case::commit("commits/deadbeef")]
#[case::commit_not_hex("commits/release")]
#[case::content("branches/release/1.0/b.txt")]
fn missing_paths_are_not_found(release: Release, #[case] path: &str) {
    assert!(
        matches!(walk(&release.root, path), Err(GitfsError::NotFound(_))),
        "{path} should be NotFound"
    );
}

#[rstest]
fn reference_changes_show_up_live(release: Release) {
    assert!(walk(&release.root, "branches/release/2.0").is_err());
    release.repo.set_branch("release/2.0", &release.c2);
    assert_eq!(names(&release.root, "branches/release"), vec!["1.0", "2.0"]);
    assert_eq!(read_all(&release.root, "branches/release/2.0/b.txt"), b"y");

    release.repo.remove_tag("v1");
    assert!(names(&release.root, "tags").is_empty());
}

#[rstest]
fn repeated_lookups_are_equivalent(release: Release) {
    let a = walk(&release.root, "tags/v1/a.txt").unwrap();
    let b = walk(&release.root, "tags/v1/a.txt").unwrap();
    assert_eq!(a.attr(), b.attr());
    assert_eq!(
        a.open().unwrap().read(0, 16).unwrap(),
        b.open().unwrap().read(0, 16).unwrap()
    );
}

#[test]
fn exact_match_shadows_longer_reference() {
    let repo = Arc::new(MemoryRepository::new());
    let c = repo.commit(&[], at(1), [("f", MemoryFile::regular("foo"))]);
    let d = repo.commit(&[], at(2), [("g", MemoryFile::regular("bar"))]);
    repo.set_branch("foo", &c);
    repo.set_branch("foo/bar", &d);
    let root = mount_root(repo);

    assert_eq!(names(&root, "branches"), vec!["foo"]);
    let foo = walk(&root, "branches/foo").unwrap();
    assert!(matches!(foo, VirtualNode::ContentTree(_)));
    assert_eq!(names(&root, "branches/foo"), vec!["f"]);
    assert!(matches!(
        walk(&root, "branches/foo/bar"),
        Err(GitfsError::NotFound(_))
    ));
}

#[test]
fn nested_content_is_reachable_from_every_view() {
    let repo = Arc::new(MemoryRepository::new());
    let c = repo.commit(
        &[],
        at(5),
        [
            ("src/lib.rs", MemoryFile::regular("pub fn f() {}\n")),
            ("src/bin/tool.rs", MemoryFile::regular("fn main() {}\n")),
            ("scripts/build.sh", MemoryFile::executable("#!/bin/sh\n")),
        ],
    );
    repo.set_branch("feature/deep/nesting", &c);
    repo.set_tag("releases/2024/q1", &c);
    let root = mount_root(repo);

    for base in [
        "branches/feature/deep/nesting".to_string(),
        "tags/releases/2024/q1".to_string(),
        format!("commits/{}", c),
    ] {
        assert_eq!(names(&root, &base), vec!["scripts", "src"]);
        assert_eq!(names(&root, &format!("{base}/src")), vec!["bin", "lib.rs"]);
        assert_eq!(
            read_all(&root, &format!("{base}/src/bin/tool.rs")),
            b"fn main() {}\n"
        );
        let script = walk(&root, &format!("{base}/scripts/build.sh")).unwrap();
        assert_eq!(script.attr().perm, 0o755);
    }
}

#[test]
fn handle_outlives_reference_removal() {
    let repo = Arc::new(MemoryRepository::new());
    let c = repo.commit(&[], at(1), [("data", MemoryFile::regular("0123456789"))]);
    repo.set_branch("tmp", &c);
    let root = mount_root(repo.clone());

    let handle = walk(&root, "branches/tmp/data").unwrap().open().unwrap();
    repo.remove_branch("tmp");
    assert_eq!(handle.read(4, 3).unwrap(), b"456");
    assert!(walk(&root, "branches/tmp").is_err());
}
