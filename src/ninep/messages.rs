//! Typed request and response messages.
//!
//! Requests (`T` messages) arrive from the transport and are dispatched into
//! node operations; responses (`R` messages) travel back. Field names follow
//! the protocol documents.

use super::{Dirent, Qid, TimeSpec};

/// File attributes as carried by `Rgetattr`, minus the qid (which travels
/// beside the validity mask).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u64,
    pub rdev: u64,
    pub size: u64,
    pub blksize: u64,
    pub blocks: u64,
    pub atime: TimeSpec,
    pub mtime: TimeSpec,
    pub ctime: TimeSpec,
    pub btime: TimeSpec,
    pub gen: u64,
    pub data_version: u64,
}

/// Attribute updates requested by `Tsetattr`; the companion validity mask
/// decides which fields apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetAttr {
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: TimeSpec,
    pub mtime: TimeSpec,
}

/// Filesystem figures for `Rstatfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatFs {
    pub typ: u32,
    pub bsize: u32,
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub fsid: u64,
    pub namelen: u32,
}

/// Lock description carried by `Tlock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flock {
    pub typ: u8,
    pub flags: u32,
    pub start: u64,
    pub length: u64,
    pub proc_id: u32,
    pub client_id: String,
}

/// Lock query carried by `Tgetlock` and echoed by `Rgetlock`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetFlock {
    pub typ: u8,
    pub start: u64,
    pub length: u64,
    pub proc_id: u32,
    pub client_id: String,
}

/// Every request the server understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tmessage {
    Version { msize: u32, version: String },
    Auth { afid: u32, uname: String, aname: String, n_uname: u32 },
    Attach { fid: u32, afid: u32, uname: String, aname: String, n_uname: u32 },
    Flush { oldtag: u16 },
    Walk { fid: u32, newfid: u32, wnames: Vec<String> },
    Open { fid: u32, flags: u32 },
    Create { fid: u32, name: String, flags: u32, mode: u32, gid: u32 },
    Symlink { fid: u32, name: String, symtgt: String, gid: u32 },
    Mknod { dfid: u32, name: String, mode: u32, major: u32, minor: u32, gid: u32 },
    Rename { fid: u32, dfid: u32, name: String },
    Readlink { fid: u32 },
    GetAttr { fid: u32, request_mask: u64 },
    SetAttr { fid: u32, valid: u32, attr: SetAttr },
    XattrWalk { fid: u32, newfid: u32, name: String },
    XattrCreate { fid: u32, name: String, attr_size: u64, flags: u32 },
    ReadDir { fid: u32, offset: u64, count: u32 },
    Fsync { fid: u32, datasync: u32 },
    Lock { fid: u32, lock: Flock },
    GetLock { fid: u32, lock: GetFlock },
    Link { dfid: u32, fid: u32, name: String },
    Mkdir { dfid: u32, name: String, mode: u32, gid: u32 },
    RenameAt { olddirfid: u32, oldname: String, newdirfid: u32, newname: String },
    UnlinkAt { dirfd: u32, name: String, flags: u32 },
    StatFs { fid: u32 },
    Read { fid: u32, offset: u64, count: u32 },
    Write { fid: u32, offset: u64, data: Vec<u8> },
    Clunk { fid: u32 },
    Remove { fid: u32 },
}

/// Every response the server can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rmessage {
    LError { ecode: u32 },
    Version { msize: u32, version: String },
    Auth { aqid: Qid },
    Attach { qid: Qid },
    Flush,
    Walk { wqids: Vec<Qid> },
    Open { qid: Qid, iounit: u32 },
    Create { qid: Qid, iounit: u32 },
    Symlink { qid: Qid },
    Mknod { qid: Qid },
    Rename,
    Readlink { target: String },
    GetAttr { valid: u64, qid: Qid, stat: Stat },
    SetAttr,
    XattrWalk { size: u64 },
    XattrCreate,
    ReadDir { entries: Vec<Dirent> },
    Fsync,
    Lock { status: u8 },
    GetLock { lock: GetFlock },
    Link,
    Mkdir { qid: Qid },
    RenameAt,
    UnlinkAt,
    StatFs { stat: StatFs },
    Read { data: Vec<u8> },
    Write { count: u32 },
    Clunk,
    Remove,
}
