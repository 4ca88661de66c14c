//! Host FUSE adapter: binds a portable filesystem to the kernel.
//!
//! The kernel side speaks inode numbers and file handles; the portable
//! side speaks slash-separated names. [`Bridge`] owns the translation
//! tables, the dense open-handle table, the hierarchical path locks, and
//! the directory streams, and implements the FUSE operation vtable over
//! them. Structured errors are converted to host errnos at this boundary
//! and the originals logged; anything unclassified surfaces as `EIO`.

#![cfg(unix)]

pub mod attach;
pub mod handles;
pub mod inodes;
pub mod pathlock;

#[cfg(test)]
mod tests;

use std::ffi::OsStr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyDirectoryPlus, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs,
    ReplyWrite, Request, TimeOrNow,
};
use tracing::{debug, trace};

use crate::error::{Error, Kind, Result};
use crate::fsys::{EntryKind, FileInfo, FileSystem, FsDirEntry, FsFile};

pub use attach::{Host, HostAttacher, MountConfig, Mounted};
pub use handles::{HandleTable, ERROR_HANDLE};
pub use inodes::{InodeTable, ROOT_INO};
pub use pathlock::{OpClass, PathGuard, PathLocks};

/// Synthetic inode of the mount-readiness marker.
const MARKER_INO: u64 = u64::MAX - 1;

/// Stable placeholder inode for plain `readdir` entries the kernel has not
/// looked up; the number is advisory there.
fn advisory_ino(name: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish() | (1 << 63)
}

/// Entry batch requested from filesystems that do not stream.
const DIR_BATCH: usize = 16;

/// Attribute validity window handed to the kernel.
const TTL: Duration = Duration::from_secs(1);

/// An open kernel handle: either a file or a directory stream.
enum Handle {
    File(Box<dyn FsFile>),
    Dir(DirHandle),
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handle::File(_) => f.write_str("Handle::File(..)"),
            Handle::Dir(_) => f.write_str("Handle::Dir(..)"),
        }
    }
}

/// One `opendir` session. Entries stream in from the producer and are
/// cached so the kernel can re-read earlier offsets.
struct DirHandle {
    file: Option<Box<dyn FsFile>>,
    stream: Receiver<Result<FsDirEntry>>,
    cache: Vec<FsDirEntry>,
    ended: bool,
    failed: bool,
    /// Caller identity captured at `opendir`; `readdir` is not guaranteed
    /// a populated caller context, so entry attributes inherit these.
    uid: u32,
    gid: u32,
}

impl DirHandle {
    /// Ensures at least `index + 1` entries are cached, or the stream has
    /// ended. Returns `false` after a stream error.
    fn fill_to(&mut self, index: usize) -> bool {
        while !self.ended && self.cache.len() <= index {
            match self.stream.recv() {
                Ok(Ok(entry)) => self.cache.push(entry),
                Ok(Err(err)) => {
                    debug!(%err, "directory stream failed");
                    self.ended = true;
                    self.failed = true;
                }
                Err(_) => self.ended = true,
            }
        }
        !self.failed
    }
}

/// The FUSE operation vtable over a portable filesystem.
pub struct Bridge {
    fs: Arc<dyn FileSystem>,
    inodes: InodeTable,
    handles: HandleTable<Handle>,
    locks: PathLocks,
    /// Well-known name whose `getattr` succeeding signals mount readiness.
    marker: String,
    uid: u32,
    gid: u32,
}

impl Bridge {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        marker: String,
        uid: u32,
        gid: u32,
        handle_max: usize,
    ) -> Bridge {
        Bridge {
            fs,
            inodes: InodeTable::new(),
            handles: HandleTable::new(handle_max),
            locks: PathLocks::new(),
            marker,
            uid,
            gid,
        }
    }

    /// Joins a parent name and one component into a portable name.
    /// Component names with separators or nul bytes are malformed.
    fn join_name(parent: &str, child: &OsStr) -> Result<String> {
        let child = child
            .to_str()
            .ok_or_else(|| Error::msg(Kind::InvalidItem, "name is not valid unicode"))?;
        if child.is_empty() || child.contains('/') || child.contains('\0') {
            return Err(Error::msg(Kind::InvalidItem, format!("bad name: {child:?}")));
        }
        Ok(match parent {
            "." => child.to_string(),
            _ => format!("{parent}/{child}"),
        })
    }

    fn errno(err: &Error, op: &str) -> i32 {
        debug!(op, %err, "host operation failed");
        err.kind().host_errno()
    }

    fn attr_for(&self, ino: u64, info: &FileInfo, uid: u32, gid: u32) -> FileAttr {
        let kind = match info.kind {
            EntryKind::Directory => FileType::Directory,
            EntryKind::Symlink => FileType::Symlink,
            EntryKind::File => FileType::RegularFile,
        };
        FileAttr {
            ino,
            size: info.size,
            blocks: info.size.div_ceil(512),
            atime: info.atime.unwrap_or(info.mtime),
            mtime: info.mtime,
            ctime: info.ctime.unwrap_or(info.mtime),
            crtime: info.btime.unwrap_or(info.mtime),
            kind,
            perm: info.perm as u16,
            nlink: 1,
            uid: info.uid.unwrap_or(uid),
            gid: info.gid.unwrap_or(gid),
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    fn marker_attr(&self) -> FileAttr {
        FileAttr {
            ino: MARKER_INO,
            size: 0,
            blocks: 0,
            atime: SystemTime::UNIX_EPOCH,
            mtime: SystemTime::UNIX_EPOCH,
            ctime: SystemTime::UNIX_EPOCH,
            crtime: SystemTime::UNIX_EPOCH,
            kind: FileType::RegularFile,
            perm: 0o444,
            nlink: 1,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }

    /// Opens a directory and wires up its entry stream: the filesystem's
    /// own stream when offered, otherwise a producer thread batching
    /// `read_dir` calls into a channel.
    fn open_dir_stream(&self, name: &str, uid: u32, gid: u32) -> Result<DirHandle> {
        let mut file = self.fs.open(name)?;
        if let Some(stream) = file.stream_dir() {
            return Ok(DirHandle {
                file: Some(file),
                stream,
                cache: Vec::new(),
                ended: false,
                failed: false,
                uid,
                gid,
            });
        }

        let (tx, rx) = std::sync::mpsc::sync_channel(DIR_BATCH);
        std::thread::spawn(move || {
            loop {
                match file.read_dir(DIR_BATCH) {
                    Ok(batch) => {
                        if batch.is_empty() {
                            break;
                        }
                        for entry in batch {
                            if tx.send(Ok(entry)).is_err() {
                                // Receiver dropped: the consumer canceled.
                                let _ = file.close();
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = tx.send(Err(err));
                        break;
                    }
                }
            }
            let _ = file.close();
        });
        Ok(DirHandle { file: None, stream: rx, cache: Vec::new(), ended: false, failed: false, uid, gid })
    }

    /// Per-entry stat used by readdir-plus: prefers metadata the listing
    /// already carried, falling back to a stat call.
    fn dir_stat(&self, dir_name: &str, entry: &FsDirEntry, uid: u32, gid: u32) -> Result<FileAttr> {
        let name = Self::join_name(dir_name, OsStr::new(&entry.name))?;
        let ino = self.inodes.assign(&name);
        let info = match &entry.info {
            Some(info) => info.clone(),
            None => self.fs.stat(&name)?,
        };
        Ok(self.attr_for(ino, &info, uid, gid))
    }

    /// The file-or-stream release sequence: fetch the handle, close its
    /// contents, then drop the slot; the slot is dropped even when close
    /// errors or panics, and the close failure is the one reported.
    fn release_handle(&self, fh: u64) -> Result<()> {
        let handle = self.handles.get(fh)?;
        let close_result = catch_unwind(AssertUnwindSafe(|| {
            let mut handle = handle.lock();
            match &mut *handle {
                Handle::File(file) => file.close(),
                Handle::Dir(dir) => match dir.file.as_mut() {
                    Some(file) => file.close(),
                    None => Ok(()),
                },
            }
        }));
        drop(handle);
        self.handles.remove(fh)?;
        match close_result {
            Ok(result) => result,
            Err(_) => Err(Error::msg(Kind::Io, "close panicked")),
        }
    }
}

impl Filesystem for Bridge {
    fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> std::result::Result<(), libc::c_int> {
        trace!("fuse session initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        trace!("fuse session destroyed");
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        if parent == ROOT_INO && name.to_str() == Some(self.marker.as_str()) {
            reply.entry(&TTL, &self.marker_attr(), 0);
            return;
        }
        let parent_name = match self.inodes.name_of(parent) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "lookup")),
        };
        let name = match Self::join_name(&parent_name, name) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "lookup")),
        };
        let _guard = self.locks.lock(&name, OpClass::Access);
        match self.fs.stat(&name) {
            Ok(info) => {
                let ino = self.inodes.assign(&name);
                reply.entry(&TTL, &self.attr_for(ino, &info, self.uid, self.gid), 0);
            }
            Err(err) => reply.error(Self::errno(&err, "lookup")),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        if ino == MARKER_INO {
            reply.attr(&TTL, &self.marker_attr());
            return;
        }
        let name = match self.inodes.name_of(ino) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "getattr")),
        };
        let _guard = self.locks.lock(&name, OpClass::Access);
        match self.fs.stat(&name) {
            Ok(info) => reply.attr(&TTL, &self.attr_for(ino, &info, self.uid, self.gid)),
            Err(err) => reply.error(Self::errno(&err, "getattr")),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
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
        let name = match self.inodes.name_of(ino) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "setattr")),
        };
        if let Some(size) = size {
            let _guard = self.locks.lock(&name, OpClass::Modify);
            if let Err(err) = self.fs.truncate(&name, size) {
                return reply.error(Self::errno(&err, "setattr"));
            }
        }
        let _guard = self.locks.lock(&name, OpClass::Access);
        match self.fs.stat(&name) {
            Ok(info) => reply.attr(&TTL, &self.attr_for(ino, &info, self.uid, self.gid)),
            Err(err) => reply.error(Self::errno(&err, "setattr")),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let name = match self.inodes.name_of(ino) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "readlink")),
        };
        let _guard = self.locks.lock(&name, OpClass::Access);
        match self.fs.readlink(&name) {
            Ok(target) => reply.data(target.as_bytes()),
            Err(err) => reply.error(Self::errno(&err, "readlink")),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let parent_name = match self.inodes.name_of(parent) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "unlink")),
        };
        let name = match Self::join_name(&parent_name, name) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "unlink")),
        };
        let _guard = self.locks.lock(&name, OpClass::CreateOrDelete);
        match self.fs.remove(&name) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(Self::errno(&err, "unlink")),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        self.unlink(_req, parent, name, reply)
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let old = self
            .inodes
            .name_of(parent)
            .and_then(|parent_name| Self::join_name(&parent_name, name));
        let new = self
            .inodes
            .name_of(newparent)
            .and_then(|parent_name| Self::join_name(&parent_name, newname));
        let (old, new) = match (old, new) {
            (Ok(old), Ok(new)) => (old, new),
            (Err(err), _) | (_, Err(err)) => return reply.error(Self::errno(&err, "rename")),
        };
        let _guard = self.locks.lock_rename(&old, &new);
        match self.fs.rename(&old, &new) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(Self::errno(&err, "rename")),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let name = match self.inodes.name_of(ino) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "open")),
        };
        let _guard = self.locks.lock(&name, OpClass::Access);
        match self.fs.open(&name) {
            Ok(file) => match self.handles.add(Handle::File(file)) {
                Some(fh) => reply.opened(fh, 0),
                None => {
                    debug!(%name, "handle table exhausted");
                    reply.error(libc::EMFILE);
                }
            },
            Err(err) => reply.error(Self::errno(&err, "open")),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        if fh == ERROR_HANDLE {
            return reply.error(libc::EBADF);
        }
        let name = match self.inodes.name_of(ino) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "read")),
        };
        let _guard = self.locks.lock(&name, OpClass::Access);
        let handle = match self.handles.get(fh) {
            Ok(handle) => handle,
            Err(err) => return reply.error(Self::errno(&err, "read")),
        };
        let mut handle = handle.lock();
        let Handle::File(file) = &mut *handle else {
            return reply.error(libc::EISDIR);
        };
        let mut buf = vec![0u8; size as usize];
        match file.read_at(offset.max(0) as u64, &mut buf) {
            Ok(n) => reply.data(&buf[..n]),
            Err(err) => reply.error(Self::errno(&err, "read")),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        if fh == ERROR_HANDLE {
            return reply.error(libc::EBADF);
        }
        let name = match self.inodes.name_of(ino) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "write")),
        };
        let _guard = self.locks.lock(&name, OpClass::Modify);
        let handle = match self.handles.get(fh) {
            Ok(handle) => handle,
            Err(err) => return reply.error(Self::errno(&err, "write")),
        };
        let mut handle = handle.lock();
        let Handle::File(file) = &mut *handle else {
            return reply.error(libc::EISDIR);
        };
        match file.write_at(offset.max(0) as u64, data) {
            Ok(n) => reply.written(n as u32),
            Err(err) => reply.error(Self::errno(&err, "write")),
        }
    }

    fn release(
        &mut self,
        _req: &Request,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if fh == ERROR_HANDLE {
            return reply.error(libc::EBADF);
        }
        match self.release_handle(fh) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(Self::errno(&err, "release")),
        }
    }

    fn opendir(&mut self, req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let name = match self.inodes.name_of(ino) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "opendir")),
        };
        let _guard = self.locks.lock(&name, OpClass::Access);
        match self.open_dir_stream(&name, req.uid(), req.gid()) {
            Ok(dir) => match self.handles.add(Handle::Dir(dir)) {
                Some(fh) => reply.opened(fh, 0),
                None => {
                    debug!(%name, "handle table exhausted");
                    reply.error(libc::EMFILE);
                }
            },
            Err(err) => reply.error(Self::errno(&err, "opendir")),
        }
    }

    fn readdir(&mut self, _req: &Request, ino: u64, fh: u64, offset: i64, mut reply: ReplyDirectory) {
        if fh == ERROR_HANDLE {
            return reply.error(libc::EBADF);
        }
        let name = match self.inodes.name_of(ino) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "readdir")),
        };
        let _guard = self.locks.lock(&name, OpClass::Access);
        let handle = match self.handles.get(fh) {
            Ok(handle) => handle,
            Err(err) => return reply.error(Self::errno(&err, "readdir")),
        };
        let mut handle = handle.lock();
        let Handle::Dir(dir) = &mut *handle else {
            return reply.error(libc::ENOTDIR);
        };

        // Logical entries: ".", "..", then the stream.
        let mut index = offset.max(0) as usize;
        loop {
            let full = match index {
                0 => reply.add(ino, 1, FileType::Directory, "."),
                1 => reply.add(ROOT_INO, 2, FileType::Directory, ".."),
                _ => {
                    let entry_index = index - 2;
                    if !dir.fill_to(entry_index) {
                        return reply.error(libc::EIO);
                    }
                    let Some(entry) = dir.cache.get(entry_index) else {
                        break;
                    };
                    let child_ino = match Self::join_name(&name, OsStr::new(&entry.name)) {
                        Ok(child) => {
                            self.inodes.peek(&child).unwrap_or_else(|| advisory_ino(&child))
                        }
                        Err(_) => advisory_ino(&entry.name),
                    };
                    let kind = match entry.info.as_ref().map(|info| info.kind) {
                        Some(EntryKind::Directory) => FileType::Directory,
                        Some(EntryKind::Symlink) => FileType::Symlink,
                        _ => FileType::RegularFile,
                    };
                    reply.add(child_ino, (index + 1) as i64, kind, &entry.name)
                }
            };
            if full {
                break;
            }
            index += 1;
        }
        reply.ok();
    }

    fn readdirplus(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        mut reply: ReplyDirectoryPlus,
    ) {
        if fh == ERROR_HANDLE {
            return reply.error(libc::EBADF);
        }
        let name = match self.inodes.name_of(ino) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "readdirplus")),
        };
        let _guard = self.locks.lock(&name, OpClass::Access);
        let handle = match self.handles.get(fh) {
            Ok(handle) => handle,
            Err(err) => return reply.error(Self::errno(&err, "readdirplus")),
        };
        let mut handle = handle.lock();
        let Handle::Dir(dir) = &mut *handle else {
            return reply.error(libc::ENOTDIR);
        };
        let (uid, gid) = (dir.uid, dir.gid);

        let mut index = offset.max(0) as usize;
        loop {
            let entry_index = match index {
                // The kernel stats dot entries itself; skip them here and
                // keep offsets aligned with plain readdir.
                0 | 1 => {
                    index += 1;
                    continue;
                }
                _ => index - 2,
            };
            if !dir.fill_to(entry_index) {
                return reply.error(libc::EIO);
            }
            let Some(entry) = dir.cache.get(entry_index) else {
                break;
            };
            let attr = match self.dir_stat(&name, entry, uid, gid) {
                Ok(attr) => attr,
                Err(err) => {
                    debug!(entry = %entry.name, err = %err, "skipping unlistable entry");
                    break;
                }
            };
            if reply.add(attr.ino, (index + 1) as i64, &entry.name, &TTL, &attr, 0) {
                break;
            }
            index += 1;
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        if fh == ERROR_HANDLE {
            return reply.error(libc::EBADF);
        }
        match self.release_handle(fh) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(Self::errno(&err, "releasedir")),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(0, 0, 0, 0, 0, 512, 255, 512);
    }

    fn access(&mut self, _req: &Request, _ino: u64, _mask: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let parent_name = match self.inodes.name_of(parent) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "create")),
        };
        let name = match Self::join_name(&parent_name, name) {
            Ok(name) => name,
            Err(err) => return reply.error(Self::errno(&err, "create")),
        };
        let _guard = self.locks.lock(&name, OpClass::CreateOrDelete);
        let file = match self.fs.create(&name, mode & 0o7777) {
            Ok(file) => file,
            Err(err) => return reply.error(Self::errno(&err, "create")),
        };
        let info = match file.info() {
            Ok(info) => info,
            Err(err) => return reply.error(Self::errno(&err, "create")),
        };
        let ino = self.inodes.assign(&name);
        let attr = self.attr_for(ino, &info, self.uid, self.gid);
        match self.handles.add(Handle::File(file)) {
            Some(fh) => reply.created(&TTL, &attr, 0, fh, flags as u32),
            None => reply.error(libc::EMFILE),
        }
    }
}
