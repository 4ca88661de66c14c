//! Portable, read-oriented filesystem interface and the content-addressed
//! implementations behind the mount controllers.
//!
//! The host adapter consumes [`FileSystem`]/[`FsFile`]; the content
//! resolvers in this module produce them. Optional capabilities default to
//! `InvalidOperation` so consumers can detect absence instead of failing
//! hard.

pub mod client;
pub mod ipfs;
pub mod ipns;
pub mod keyfs;
pub mod pinfs;

#[cfg(test)]
mod tests;

use std::fmt;
use std::str::FromStr;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::SystemTime;

use num_derive::{FromPrimitive, ToPrimitive};

use crate::error::{Error, Kind, Result};

pub use client::ApiClient;
pub use ipfs::IpfsFs;
pub use ipns::IpnsFs;
pub use keyfs::KeyFs;
pub use pinfs::PinFs;

/// Identifier of a content-addressed filesystem family. The numeric value
/// doubles as the `RDev` tag on FSID directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum FsId {
    Ipfs = 1,
    Ipns = 2,
    PinFs = 3,
    KeyFs = 4,
}

impl FsId {
    pub fn rdev(self) -> u64 {
        self as u64
    }
}

impl fmt::Display for FsId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FsId::Ipfs => "ipfs",
            FsId::Ipns => "ipns",
            FsId::PinFs => "pinfs",
            FsId::KeyFs => "keyfs",
        };
        f.write_str(name)
    }
}

impl FromStr for FsId {
    type Err = Error;

    fn from_str(s: &str) -> Result<FsId> {
        match s {
            "ipfs" => Ok(FsId::Ipfs),
            "ipns" => Ok(FsId::Ipns),
            "pinfs" => Ok(FsId::PinFs),
            "keyfs" => Ok(FsId::KeyFs),
            other => Err(Error::msg(Kind::InvalidItem, format!("unknown filesystem ID: {other}"))),
        }
    }
}

/// What a directory entry or stat call reveals about an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
}

/// Portable file metadata.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub kind: EntryKind,
    /// Permission bits only; the type travels in `kind`.
    pub perm: u32,
    pub mtime: SystemTime,
    pub atime: Option<SystemTime>,
    pub ctime: Option<SystemTime>,
    pub btime: Option<SystemTime>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

impl FileInfo {
    /// Metadata for a synthetic directory such as a namespace root.
    pub fn synthetic_dir(name: &str) -> FileInfo {
        FileInfo {
            name: name.to_string(),
            size: 0,
            kind: EntryKind::Directory,
            perm: 0o555,
            mtime: SystemTime::UNIX_EPOCH,
            atime: None,
            ctime: None,
            btime: None,
            uid: None,
            gid: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// One directory entry. `info` is populated when the filesystem can supply
/// it cheaply, enabling readdir-plus in the host adapter.
#[derive(Debug, Clone)]
pub struct FsDirEntry {
    pub name: String,
    pub info: Option<FileInfo>,
}

/// An open file or directory.
pub trait FsFile: Send {
    fn info(&self) -> Result<FileInfo>;

    fn read_at(&mut self, _offset: u64, _buf: &mut [u8]) -> Result<usize> {
        Err(Error::new(Kind::InvalidOperation))
    }

    fn write_at(&mut self, _offset: u64, _data: &[u8]) -> Result<usize> {
        Err(Error::new(Kind::InvalidOperation))
    }

    /// Next batch of directory entries, at most `count`; an empty vector
    /// means end of directory.
    fn read_dir(&mut self, _count: usize) -> Result<Vec<FsDirEntry>> {
        Err(Error::new(Kind::InvalidOperation))
    }

    /// Hands the remaining entries over as a channel for unbounded
    /// streaming. Directories that do not stream return `None` and are
    /// drained through `read_dir` instead.
    fn stream_dir(&mut self) -> Option<Receiver<Result<FsDirEntry>>> {
        None
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A mounted-side filesystem. Names are relative, `.` is the root, and
/// separators are forward slashes; the host adapter performs the
/// translation from host paths.
pub trait FileSystem: Send + Sync {
    fn stat(&self, name: &str) -> Result<FileInfo>;

    fn open(&self, name: &str) -> Result<Box<dyn FsFile>>;

    fn readlink(&self, _name: &str) -> Result<String> {
        Err(Error::new(Kind::InvalidOperation))
    }

    fn remove(&self, _name: &str) -> Result<()> {
        Err(Error::new(Kind::InvalidOperation))
    }

    fn rename(&self, _old: &str, _new: &str) -> Result<()> {
        Err(Error::new(Kind::InvalidOperation))
    }

    fn truncate(&self, _name: &str, _size: u64) -> Result<()> {
        Err(Error::new(Kind::InvalidOperation))
    }

    fn create(&self, _name: &str, _perm: u32) -> Result<Box<dyn FsFile>> {
        Err(Error::new(Kind::InvalidOperation))
    }
}

/// Builds the content filesystem for `fsid` over an already-dialed API
/// client.
pub fn construct(client: Arc<ApiClient>, fsid: FsId) -> Arc<dyn FileSystem> {
    match fsid {
        FsId::Ipfs => Arc::new(IpfsFs::new(client)),
        FsId::Ipns => Arc::new(IpnsFs::new(client)),
        FsId::PinFs => Arc::new(PinFs::new(client)),
        FsId::KeyFs => Arc::new(KeyFs::new(client)),
    }
}

/// An eagerly collected directory listing served batch by batch.
pub struct ListDir {
    info: FileInfo,
    entries: std::vec::IntoIter<FsDirEntry>,
    streaming: bool,
}

impl ListDir {
    pub fn new(info: FileInfo, entries: Vec<FsDirEntry>) -> ListDir {
        ListDir { info, entries: entries.into_iter(), streaming: false }
    }

    /// A listing that also offers the channel-based streaming interface.
    pub fn streaming(info: FileInfo, entries: Vec<FsDirEntry>) -> ListDir {
        ListDir { info, entries: entries.into_iter(), streaming: true }
    }
}

impl FsFile for ListDir {
    fn info(&self) -> Result<FileInfo> {
        Ok(self.info.clone())
    }

    fn read_dir(&mut self, count: usize) -> Result<Vec<FsDirEntry>> {
        Ok(self.entries.by_ref().take(count).collect())
    }

    fn stream_dir(&mut self) -> Option<Receiver<Result<FsDirEntry>>> {
        if !self.streaming {
            return None;
        }
        let remaining: Vec<FsDirEntry> = self.entries.by_ref().collect();
        let (tx, rx) = std::sync::mpsc::sync_channel(16);
        std::thread::spawn(move || {
            for entry in remaining {
                // A dropped receiver cancels the producer.
                if tx.send(Ok(entry)).is_err() {
                    break;
                }
            }
        });
        Some(rx)
    }
}
