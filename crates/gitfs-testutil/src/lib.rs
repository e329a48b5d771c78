//! Test utilities for gitfs.
//!
//! Builds real git repositories in temporary directories with libgit2, with
//! fixed signatures and timestamps so commit ids are reproducible:
//!
//! - [`FixtureBuilder`]: commits, branches and tags one call at a time
//! - [`history_fixture`]: four linear commits with nested branch and tag names
//! - [`release_fixture`]: `release/1.0` branch plus a `v1` tag on a second commit

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use git2::{FileMode, Oid, Repository, Signature, Time};
use tempfile::TempDir;

pub type Result<T> = std::result::Result<T, git2::Error>;

/// Committer time of the first fixture commit; later commits add a minute each.
pub const BASE_TIME: i64 = 1_700_000_000;

/// A file to put into a fixture commit.
#[derive(Debug, Clone)]
pub struct FixtureFile {
    pub path: String,
    pub data: Vec<u8>,
    pub executable: bool,
}

impl FixtureFile {
    pub fn new(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            data: data.into(),
            executable: false,
        }
    }

    pub fn executable(path: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            executable: true,
            ..Self::new(path, data)
        }
    }
}

enum Staged<'a> {
    File(&'a FixtureFile),
    Dir(BTreeMap<String, Staged<'a>>),
}

/// A fixture repository. The directory is removed on drop.
pub struct FixtureRepo {
    dir: TempDir,
    path: PathBuf,
}

impl FixtureRepo {
    /// Path to open with `git2::Repository::open` (work tree or bare dir).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn temp_dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Step-by-step fixture construction.
pub struct FixtureBuilder {
    dir: TempDir,
    repo: Repository,
    commits: usize,
}

impl FixtureBuilder {
    /// Empty non-bare repository.
    pub fn new() -> Result<Self> {
        Self::init(false)
    }

    /// Empty bare repository.
    pub fn bare() -> Result<Self> {
        Self::init(true)
    }

    fn init(bare: bool) -> Result<Self> {
        let dir = TempDir::new().map_err(|e| git2::Error::from_str(&e.to_string()))?;
        let repo = if bare {
            Repository::init_bare(dir.path())?
        } else {
            Repository::init(dir.path())?
        };
        Ok(Self {
            dir,
            repo,
            commits: 0,
        })
    }

    /// Time of the next commit, in seconds since the epoch.
    pub fn next_time(&self) -> i64 {
        BASE_TIME + 60 * self.commits as i64
    }

    /// Write a commit (not attached to any reference) and return its id.
    pub fn commit(&mut self, parents: &[&str], files: &[FixtureFile]) -> Result<String> {
        let mut root = BTreeMap::new();
        for file in files {
            stage(&mut root, &file.path, file);
        }
        let tree_id = self.write_tree(&root)?;
        let tree = self.repo.find_tree(tree_id)?;

        let parents = parents
            .iter()
            .map(|p| self.repo.find_commit(Oid::from_str(p)?))
            .collect::<Result<Vec<_>>>()?;
        let parent_refs: Vec<_> = parents.iter().collect();

        let sig = Signature::new("gitfs", "gitfs@localhost", &Time::new(self.next_time(), 0))?;
        let message = format!("commit {}", self.commits + 1);
        let oid = self
            .repo
            .commit(None, &sig, &sig, &message, &tree, &parent_refs)?;
        self.commits += 1;
        Ok(oid.to_string())
    }

    fn write_tree(&self, dir: &BTreeMap<String, Staged<'_>>) -> Result<Oid> {
        let mut builder = self.repo.treebuilder(None)?;
        for (name, staged) in dir {
            match staged {
                Staged::File(file) => {
                    let blob = self.repo.blob(&file.data)?;
                    let mode = if file.executable {
                        FileMode::BlobExecutable
                    } else {
                        FileMode::Blob
                    };
                    builder.insert(name.as_str(), blob, mode.into())?;
                }
                Staged::Dir(children) => {
                    let tree = self.write_tree(children)?;
                    builder.insert(name.as_str(), tree, FileMode::Tree.into())?;
                }
            }
        }
        builder.write()
    }

    pub fn branch(&self, name: &str, commit: &str) -> Result<&Self> {
        let commit = self.repo.find_commit(Oid::from_str(commit)?)?;
        self.repo.branch(name, &commit, true)?;
        Ok(self)
    }

    pub fn tag(&self, name: &str, commit: &str) -> Result<&Self> {
        let object = self.repo.find_object(Oid::from_str(commit)?, None)?;
        self.repo.tag_lightweight(name, &object, true)?;
        Ok(self)
    }

    /// Annotated tag: the reference points at a tag object, not the commit.
    pub fn annotated_tag(&self, name: &str, commit: &str) -> Result<&Self> {
        let object = self.repo.find_object(Oid::from_str(commit)?, None)?;
        let sig = Signature::new("gitfs", "gitfs@localhost", &Time::new(BASE_TIME, 0))?;
        self.repo
            .tag(name, &object, &sig, &format!("release {}", name), true)?;
        Ok(self)
    }

    /// Point HEAD at a branch.
    pub fn head(&self, branch: &str) -> Result<&Self> {
        self.repo.set_head(&format!("refs/heads/{}", branch))?;
        Ok(self)
    }

    pub fn finish(self) -> FixtureRepo {
        let path = if self.repo.is_bare() {
            self.dir.path().to_path_buf()
        } else {
            self.dir.path().join(".git")
        };
        FixtureRepo {
            dir: self.dir,
            path,
        }
    }
}

fn stage<'a>(dir: &mut BTreeMap<String, Staged<'a>>, path: &str, file: &'a FixtureFile) {
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

/// Four linear commits, each adding a file.
///
/// | ref                        | commit |
/// |----------------------------|--------|
/// | `branches/test`            | 0      |
/// | `branches/master` (HEAD)   | 1      |
/// | `branches/nested/test`     | 2      |
/// | `branches/nested/dir/test` | 3      |
/// | `tags/v1.0.0` (annotated)  | 0      |
/// | `tags/v1.0.1`              | 1      |
/// | `tags/nested/v1.0.2`       | 2      |
pub struct HistoryFixture {
    pub repo: FixtureRepo,
    pub commits: [String; 4],
}

/// Files present at each commit of [`history_fixture`].
pub fn history_files(commit: usize) -> Vec<FixtureFile> {
    let mut files = vec![FixtureFile::new("testfile1", "testfile1 content\n")];
    if commit >= 1 {
        files.push(FixtureFile::new("testfile2", "testfile2 content\n"));
    }
    if commit >= 2 {
        files.push(FixtureFile::new("testfile3", "testfile3 content\n"));
    }
    if commit >= 3 {
        files.push(FixtureFile::new("testdir/testfile4", "content of testfile4\n"));
        files.push(FixtureFile::executable("testdir/run.sh", "#!/bin/sh\necho hi\n"));
    }
    files
}

pub fn history_fixture() -> Result<HistoryFixture> {
    let mut b = FixtureBuilder::new()?;
    let c0 = b.commit(&[], &history_files(0))?;
    let c1 = b.commit(&[&c0], &history_files(1))?;
    let c2 = b.commit(&[&c1], &history_files(2))?;
    let c3 = b.commit(&[&c2], &history_files(3))?;

    b.branch("test", &c0)?
        .branch("master", &c1)?
        .branch("nested/test", &c2)?
        .branch("nested/dir/test", &c3)?
        .annotated_tag("v1.0.0", &c0)?
        .tag("v1.0.1", &c1)?
        .tag("nested/v1.0.2", &c2)?
        .head("master")?;

    Ok(HistoryFixture {
        repo: b.finish(),
        commits: [c0, c1, c2, c3],
    })
}

/// Branch `release/1.0` with `a.txt = "x"`; tag `v1` on a child commit that
/// adds `b.txt = "y"`.
pub struct ReleaseFixture {
    pub repo: FixtureRepo,
    pub c1: String,
    pub c2: String,
}

pub fn release_fixture() -> Result<ReleaseFixture> {
    let mut b = FixtureBuilder::bare()?;
    let c1 = b.commit(&[], &[FixtureFile::new("a.txt", "x")])?;
    let c2 = b.commit(
        &[&c1],
        &[FixtureFile::new("a.txt", "x"), FixtureFile::new("b.txt", "y")],
    )?;
    b.branch("release/1.0", &c1)?.tag("v1", &c2)?;
    Ok(ReleaseFixture {
        repo: b.finish(),
        c1,
        c2,
    })
}
