//! FUSE adapter.
//!
//! [`GitFs`] owns the inode table (inode → node) and the handle table
//! (fh → open file or directory snapshot) and translates between kernel
//! requests and [`NodeOps`]. All resolution logic lives in the nodes; this
//! module only allocates numbers, builds attributes and maps errors.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use fuser::{
    FUSE_ROOT_ID, FileAttr, FileType, Filesystem, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::{EBADF, EINVAL, ENOENT, EPERM};
use parking_lot::{Mutex, RwLock};

use crate::error::GitfsError;
use crate::handle::FileHandle;
use crate::vfs::{DirEntryKind, NodeAttr, NodeOps, VirtualNode};

const BLOCK_SIZE: u32 = 4096;

/// How the filesystem is presented to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountOptions {
    /// How long the kernel may cache attributes and entries.
    pub ttl: Duration,
    pub allow_other: bool,
    pub auto_unmount: bool,
    /// Source name shown by `mount` (e.g. `gitfs: /src/repo/.git`).
    pub fs_name: String,
    /// macOS Finder volume name.
    pub volume_name: Option<String>,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(1),
            allow_other: false,
            auto_unmount: false,
            fs_name: "gitfs".to_string(),
            volume_name: None,
        }
    }
}

impl MountOptions {
    /// Options passed to the kernel. The mount is always read-only.
    pub fn fuse_options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::RO,
            MountOption::FSName(self.fs_name.clone()),
            MountOption::Subtype("gitfs".to_string()),
        ];
        if self.allow_other {
            options.push(MountOption::AllowOther);
        }
        if self.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if let Some(volume) = &self.volume_name {
            options.push(MountOption::CUSTOM(format!("volname={}", volume)));
        }
        options
    }
}

/// Live counters of one mount.
#[derive(Debug, Default)]
pub struct MountStats {
    nodes: AtomicU64,
    open_files: AtomicU64,
    open_dirs: AtomicU64,
    lookups: AtomicU64,
    reads: AtomicU64,
    bytes_read: AtomicU64,
}

/// Point-in-time copy of [`MountStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub nodes: u64,
    pub open_files: u64,
    pub open_dirs: u64,
    pub lookups: u64,
    pub reads: u64,
    pub bytes_read: u64,
}

impl MountStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            nodes: self.nodes.load(Ordering::Relaxed),
            open_files: self.open_files.load(Ordering::Relaxed),
            open_dirs: self.open_dirs.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nodes={} open_files={} open_dirs={} lookups={} reads={} bytes_read={}",
            self.nodes, self.open_files, self.open_dirs, self.lookups, self.reads, self.bytes_read
        )
    }
}

struct InodeEntry {
    node: Arc<VirtualNode>,
    /// Inode the node was looked up from.
    parent: u64,
    lookups: u64,
}

/// Every lookup gets a fresh inode; the kernel's `forget` drops it again.
struct InodeTable {
    next_inode: AtomicU64,
    nodes: RwLock<HashMap<u64, InodeEntry>>,
}

impl InodeTable {
    fn new(root: VirtualNode) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            FUSE_ROOT_ID,
            InodeEntry {
                node: Arc::new(root),
                parent: FUSE_ROOT_ID,
                lookups: 1,
            },
        );
        Self {
            next_inode: AtomicU64::new(FUSE_ROOT_ID + 1),
            nodes: RwLock::new(nodes),
        }
    }

    fn get(&self, ino: u64) -> Option<Arc<VirtualNode>> {
        self.nodes.read().get(&ino).map(|e| Arc::clone(&e.node))
    }

    /// Parent of `ino`, or the root once the parent has been forgotten.
    fn parent(&self, ino: u64) -> u64 {
        let nodes = self.nodes.read();
        nodes
            .get(&ino)
            .map(|e| e.parent)
            .filter(|parent| nodes.contains_key(parent))
            .unwrap_or(FUSE_ROOT_ID)
    }

    fn insert(&self, node: VirtualNode, parent: u64) -> u64 {
        let ino = self.next_inode.fetch_add(1, Ordering::Relaxed);
        self.nodes.write().insert(
            ino,
            InodeEntry {
                node: Arc::new(node),
                parent,
                lookups: 1,
            },
        );
        ino
    }

    /// Drop `nlookup` references; returns true if the inode was removed.
    fn forget(&self, ino: u64, nlookup: u64) -> bool {
        if ino == FUSE_ROOT_ID {
            return false;
        }
        let mut nodes = self.nodes.write();
        let Some(entry) = nodes.get_mut(&ino) else {
            return false;
        };
        entry.lookups = entry.lookups.saturating_sub(nlookup);
        if entry.lookups == 0 {
            nodes.remove(&ino);
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.nodes.read().len()
    }
}

/// One entry of a directory snapshot: `(ino, kind, name)`.
type SnapshotEntry = (u64, FileType, String);

enum OpenHandle {
    File(Arc<FileHandle>),
    Dir(Arc<[SnapshotEntry]>),
}

struct HandleTable {
    next_fh: AtomicU64,
    handles: Mutex<HashMap<u64, OpenHandle>>,
}

impl HandleTable {
    fn new() -> Self {
        Self {
            next_fh: AtomicU64::new(1),
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn insert(&self, handle: OpenHandle) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.handles.lock().insert(fh, handle);
        fh
    }

    fn file(&self, fh: u64) -> Option<Arc<FileHandle>> {
        match self.handles.lock().get(&fh)? {
            OpenHandle::File(handle) => Some(Arc::clone(handle)),
            OpenHandle::Dir(_) => None,
        }
    }

    fn dir(&self, fh: u64) -> Option<Arc<[SnapshotEntry]>> {
        match self.handles.lock().get(&fh)? {
            OpenHandle::Dir(entries) => Some(Arc::clone(entries)),
            OpenHandle::File(_) => None,
        }
    }

    fn remove(&self, fh: u64) -> Option<OpenHandle> {
        self.handles.lock().remove(&fh)
    }

    fn drain(&self) -> Vec<OpenHandle> {
        self.handles.lock().drain().map(|(_, h)| h).collect()
    }
}

fn file_type(kind: DirEntryKind) -> FileType {
    match kind {
        DirEntryKind::Directory => FileType::Directory,
        DirEntryKind::File => FileType::RegularFile,
    }
}

/// Inode number reported by `readdir` for an entry that has not been looked
/// up. The kernel treats it as advisory; lookups allocate the real one.
fn listing_ino(dir: u64, name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    dir.hash(&mut hasher);
    name.hash(&mut hasher);
    hasher.finish() | (1 << 63)
}

/// A read-only git repository served over FUSE.
pub struct GitFs {
    inodes: InodeTable,
    handles: HandleTable,
    options: MountOptions,
    mounted_at: SystemTime,
    uid: u32,
    gid: u32,
    stats: Arc<MountStats>,
}

impl GitFs {
    pub fn new(root: VirtualNode, options: MountOptions) -> Self {
        let stats = Arc::new(MountStats::default());
        stats.nodes.store(1, Ordering::Relaxed);
        Self {
            inodes: InodeTable::new(root),
            handles: HandleTable::new(),
            options,
            mounted_at: SystemTime::now(),
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            stats,
        }
    }

    /// Counters shared with whoever wants to report on this mount.
    pub fn stats(&self) -> Arc<MountStats> {
        Arc::clone(&self.stats)
    }

    fn node(&self, ino: u64) -> Result<Arc<VirtualNode>, i32> {
        self.inodes.get(ino).ok_or(ENOENT)
    }

    /// Log an error at the level it deserves and turn it into an errno.
    fn errno(&self, op: &'static str, ino: u64, err: &GitfsError) -> i32 {
        if err.is_backend_failure() {
            tracing::error!(op, ino, error = %err, "repository failure");
        } else {
            tracing::debug!(op, ino, error = %err, "request failed");
        }
        err.errno()
    }

    fn build_attr(&self, ino: u64, attr: &NodeAttr) -> FileAttr {
        let mtime = attr.mtime.unwrap_or(self.mounted_at);
        FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(512),
            atime: mtime,
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind: file_type(attr.kind),
            perm: attr.perm,
            nlink: if attr.is_dir() { 2 } else { 1 },
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }

    pub(crate) fn lookup_entry(&self, parent: u64, name: &str) -> Result<FileAttr, i32> {
        let node = self.node(parent)?;
        let child = node
            .lookup(name)
            .map_err(|e| self.errno("lookup", parent, &e))?;
        let attr = child.attr();
        let ino = self.inodes.insert(child, parent);
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);
        self.stats.nodes.fetch_add(1, Ordering::Relaxed);
        Ok(self.build_attr(ino, &attr))
    }

    pub(crate) fn getattr_entry(&self, ino: u64) -> Result<FileAttr, i32> {
        let node = self.node(ino)?;
        Ok(self.build_attr(ino, &node.attr()))
    }

    pub(crate) fn forget_entry(&self, ino: u64, nlookup: u64) {
        if self.inodes.forget(ino, nlookup) {
            self.stats.nodes.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Snapshot the listing of `ino` into a new directory handle.
    pub(crate) fn opendir_entries(&self, ino: u64) -> Result<u64, i32> {
        let node = self.node(ino)?;
        let listing = node
            .readdir()
            .map_err(|e| self.errno("opendir", ino, &e))?;
        let mut entries = Vec::with_capacity(listing.len() + 2);
        entries.push((ino, FileType::Directory, ".".to_string()));
        entries.push((self.inodes.parent(ino), FileType::Directory, "..".to_string()));
        entries.extend(
            listing
                .into_iter()
                .map(|e| (listing_ino(ino, &e.name), file_type(e.kind), e.name)),
        );
        let fh = self.handles.insert(OpenHandle::Dir(entries.into()));
        self.stats.open_dirs.fetch_add(1, Ordering::Relaxed);
        Ok(fh)
    }

    /// Entries after `offset`, each with the offset of the entry following it.
    pub(crate) fn readdir_entries(
        &self,
        fh: u64,
        offset: i64,
    ) -> Result<Vec<(u64, FileType, String, i64)>, i32> {
        let snapshot = self.handles.dir(fh).ok_or(EBADF)?;
        let skip = usize::try_from(offset).map_err(|_| EINVAL)?;
        Ok(snapshot
            .iter()
            .enumerate()
            .skip(skip)
            .map(|(idx, (ino, kind, name))| (*ino, *kind, name.clone(), idx as i64 + 1))
            .collect())
    }

    pub(crate) fn releasedir_handle(&self, fh: u64) -> Result<(), i32> {
        match self.handles.remove(fh) {
            Some(OpenHandle::Dir(_)) => {
                self.stats.open_dirs.fetch_sub(1, Ordering::Relaxed);
                Ok(())
            }
            Some(handle @ OpenHandle::File(_)) => {
                // Wrong kind; put it back untouched.
                self.handles.handles.lock().insert(fh, handle);
                Err(EBADF)
            }
            None => Err(EBADF),
        }
    }

    pub(crate) fn open_file(&self, ino: u64, flags: i32) -> Result<u64, i32> {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            return Err(EPERM);
        }
        let node = self.node(ino)?;
        let handle = node.open().map_err(|e| self.errno("open", ino, &e))?;
        let fh = self.handles.insert(OpenHandle::File(Arc::new(handle)));
        self.stats.open_files.fetch_add(1, Ordering::Relaxed);
        Ok(fh)
    }

    pub(crate) fn read_handle(&self, fh: u64, offset: i64, size: u32) -> Result<Vec<u8>, i32> {
        let handle = self.handles.file(fh).ok_or(EBADF)?;
        let offset = u64::try_from(offset).map_err(|_| EINVAL)?;
        let data = handle
            .read(offset, size as usize)
            .map_err(|e| self.errno("read", fh, &e))?;
        self.stats.reads.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_read
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(data)
    }

    pub(crate) fn release_handle(&self, fh: u64) -> Result<(), i32> {
        match self.handles.remove(fh) {
            Some(OpenHandle::File(handle)) => {
                handle.release();
                self.stats.open_files.fetch_sub(1, Ordering::Relaxed);
                Ok(())
            }
            Some(handle @ OpenHandle::Dir(_)) => {
                self.handles.handles.lock().insert(fh, handle);
                Err(EBADF)
            }
            None => Err(EBADF),
        }
    }

    fn release_all(&self) {
        for handle in self.handles.drain() {
            match handle {
                OpenHandle::File(file) => {
                    file.release();
                    self.stats.open_files.fetch_sub(1, Ordering::Relaxed);
                }
                OpenHandle::Dir(_) => {
                    self.stats.open_dirs.fetch_sub(1, Ordering::Relaxed);
                }
            }
        }
    }
}

impl Filesystem for GitFs {
    fn destroy(&mut self) {
        self.release_all();
        tracing::info!(stats = %self.stats.snapshot(), "filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(ENOENT);
            return;
        };
        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&self.options.ttl, &attr, 0),
            Err(code) => reply.error(code),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.forget_entry(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.getattr_entry(ino) {
            Ok(attr) => reply.attr(&self.options.ttl, &attr),
            Err(code) => reply.error(code),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.opendir_entries(ino) {
            Ok(fh) => reply.opened(fh, 0),
            Err(code) => reply.error(code),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        match self.readdir_entries(fh, offset) {
            Ok(entries) => {
                for (ino, kind, name, next_offset) in entries {
                    if reply.add(ino, next_offset, kind, name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(code) => reply.error(code),
        }
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        match self.releasedir_handle(fh) {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.open_file(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(code) => reply.error(code),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        match self.read_handle(fh, offset, size) {
            Ok(data) => reply.data(&data),
            Err(code) => reply.error(code),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.release_handle(fh) {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        reply.error(EPERM);
    }

    fn mknod(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        reply.error(EPERM);
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        reply.error(EPERM);
    }

    fn unlink(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(EPERM);
    }

    fn rmdir(&mut self, _req: &Request<'_>, _parent: u64, _name: &OsStr, reply: ReplyEmpty) {
        reply.error(EPERM);
    }

    fn symlink(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _link_name: &OsStr,
        _target: &Path,
        reply: ReplyEntry,
    ) {
        reply.error(EPERM);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        reply.error(EPERM);
    }

    fn link(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: ReplyEntry,
    ) {
        reply.error(EPERM);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        reply.error(EPERM);
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        reply.error(EPERM);
    }
}

/// Mount `fs` at `mountpoint` on a background thread.
///
/// The filesystem stays mounted until the returned session is dropped.
pub fn spawn_mount(
    fs: GitFs,
    mountpoint: impl AsRef<Path>,
    options: &MountOptions,
) -> io::Result<fuser::BackgroundSession> {
    let mountpoint = mountpoint.as_ref();
    tracing::info!(mountpoint = %mountpoint.display(), fs_name = %options.fs_name, "mounting");
    fuser::spawn_mount2(fs, mountpoint, &options.fuse_options())
}
