//! 9P2000.L wire protocol definitions.
//!
//! This module holds the protocol constants, the typed message set, and the
//! parsing/serialization routines for both directions of the exchange. All
//! multibyte values travel in little-endian order, and every message is
//! framed as `size[4] type[1] tag[2] body`, where `size` counts the whole
//! frame including itself.

pub mod messages;
pub mod parser;
pub mod serializer;

#[cfg(test)]
mod tests;

use num_derive::FromPrimitive;

/// Protocol version this server speaks.
pub const VERSION: &str = "9P2000.L";

/// Version string reported when negotiation fails.
pub const VERSION_UNKNOWN: &str = "unknown";

/// The reserved "no fid" value.
pub const NOFID: u32 = u32::MAX;

/// The reserved "no numeric uname" value in `Tattach`/`Tauth`.
pub const NONUNAME: u32 = u32::MAX;

/// Largest message size this server negotiates.
pub const MAX_MSIZE: u32 = 128 * 1024;

/// Smallest message size this server accepts from a client.
pub const MIN_MSIZE: u32 = 4096;

/// Per-message overhead of a read/write exchange (`size type tag fid offset
/// count`), subtracted from `msize` to produce the advertised `iounit`.
pub const IOHDRSZ: u32 = 24;

/// Frame header length: `size[4] type[1] tag[2]`.
pub const HEADERSZ: usize = 7;

/// Qid type bit for directories.
pub const QTDIR: u8 = 0x80;
/// Qid type for plain files.
pub const QTFILE: u8 = 0x00;

/// POSIX file type mask and the two types this tree contains.
pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;

/// Permission-bit subset stripped from `mkdir`/`mknod`/`create` requests.
pub const UMASK_STRIP: u32 = 0o022; // S_IWGRP | S_IWOTH

/// `d_type` values used in directory entries.
pub const DT_DIR: u8 = 4;
pub const DT_REG: u8 = 8;

/// Open access-mode mask and flags (Linux numbering, as 9P2000.L requires).
pub const O_ACCMODE: u32 = 0o3;
pub const O_RDONLY: u32 = 0o0;
pub const O_WRONLY: u32 = 0o1;
pub const O_RDWR: u32 = 0o2;
pub const O_TRUNC: u32 = 0o1000;

/// `Tunlinkat` flag requesting directory removal.
pub const AT_REMOVEDIR: u32 = 0x200;

/// `Tgetattr` request/validity mask bits.
pub mod getattr {
    pub const MODE: u64 = 0x0000_0001;
    pub const NLINK: u64 = 0x0000_0002;
    pub const UID: u64 = 0x0000_0004;
    pub const GID: u64 = 0x0000_0008;
    pub const RDEV: u64 = 0x0000_0010;
    pub const ATIME: u64 = 0x0000_0020;
    pub const MTIME: u64 = 0x0000_0040;
    pub const CTIME: u64 = 0x0000_0080;
    pub const INO: u64 = 0x0000_0100;
    pub const SIZE: u64 = 0x0000_0200;
    pub const BLOCKS: u64 = 0x0000_0400;
    pub const BTIME: u64 = 0x0000_0800;
    pub const GEN: u64 = 0x0000_1000;
    pub const DATA_VERSION: u64 = 0x0000_2000;
    pub const BASIC: u64 = 0x0000_07ff;
    pub const ALL: u64 = 0x0000_3fff;
}

/// `Tsetattr` validity mask bits.
pub mod setattr {
    pub const MODE: u32 = 0x0000_0001;
    pub const UID: u32 = 0x0000_0002;
    pub const GID: u32 = 0x0000_0004;
    pub const SIZE: u32 = 0x0000_0008;
    pub const ATIME: u32 = 0x0000_0010;
    pub const MTIME: u32 = 0x0000_0020;
    pub const CTIME: u32 = 0x0000_0040;
    /// When present together with `ATIME`, the client supplied the time;
    /// absent, the server substitutes its wall clock.
    pub const ATIME_SET: u32 = 0x0000_0080;
    pub const MTIME_SET: u32 = 0x0000_0100;
}

/// Message type codes, shared by the parser and serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum MsgType {
    Rlerror = 7,
    Tstatfs = 8,
    Rstatfs = 9,
    Tlopen = 12,
    Rlopen = 13,
    Tlcreate = 14,
    Rlcreate = 15,
    Tsymlink = 16,
    Rsymlink = 17,
    Tmknod = 18,
    Rmknod = 19,
    Trename = 20,
    Rrename = 21,
    Treadlink = 22,
    Rreadlink = 23,
    Tgetattr = 24,
    Rgetattr = 25,
    Tsetattr = 26,
    Rsetattr = 27,
    Txattrwalk = 30,
    Rxattrwalk = 31,
    Txattrcreate = 32,
    Rxattrcreate = 33,
    Treaddir = 40,
    Rreaddir = 41,
    Tfsync = 50,
    Rfsync = 51,
    Tlock = 52,
    Rlock = 53,
    Tgetlock = 54,
    Rgetlock = 55,
    Tlink = 56,
    Rlink = 57,
    Tmkdir = 72,
    Rmkdir = 73,
    Trenameat = 74,
    Rrenameat = 75,
    Tunlinkat = 76,
    Runlinkat = 77,
    Tversion = 100,
    Rversion = 101,
    Tauth = 102,
    Rauth = 103,
    Tattach = 104,
    Rattach = 105,
    Tflush = 108,
    Rflush = 109,
    Twalk = 110,
    Rwalk = 111,
    Tread = 116,
    Rread = 117,
    Twrite = 118,
    Rwrite = 119,
    Tclunk = 120,
    Rclunk = 121,
    Tremove = 122,
    Rremove = 123,
}

/// A 9P object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Qid {
    pub typ: u8,
    pub version: u32,
    pub path: u64,
}

impl Qid {
    pub const WIRE_SIZE: usize = 13;

    pub fn is_dir(&self) -> bool {
        self.typ & QTDIR != 0
    }
}

/// A `(seconds, nanoseconds)` timestamp as carried by `Rgetattr`/`Tsetattr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeSpec {
    pub sec: u64,
    pub nsec: u64,
}

impl TimeSpec {
    pub fn now() -> TimeSpec {
        match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => TimeSpec { sec: d.as_secs(), nsec: u64::from(d.subsec_nanos()) },
            Err(_) => TimeSpec::default(),
        }
    }
}

/// One entry in an `Rreaddir` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dirent {
    pub qid: Qid,
    pub offset: u64,
    pub typ: u8,
    pub name: String,
}

impl Dirent {
    /// Bytes this entry occupies on the wire: `qid[13] offset[8] type[1]
    /// name[s]`.
    pub fn wire_size(&self) -> usize {
        Qid::WIRE_SIZE + 8 + 1 + 2 + self.name.len()
    }
}
