//! The IPFS namespace filesystem.
//!
//! The root is the whole content-addressed namespace: it cannot be
//! enumerated, but any `<cid>/<path...>` below it resolves. Content is
//! immutable, which makes metadata an ideal cache entry.

use std::sync::Arc;
use std::time::SystemTime;

use moka::sync::Cache;

use crate::error::{Error, Kind, Result};

use super::client::{ApiClient, LsLink};
use super::{EntryKind, FileInfo, FileSystem, FsDirEntry, FsFile, ListDir};

/// Cached stat entries; content addressing makes these immutable.
const STAT_CACHE_CAPACITY: u64 = 4096;

pub struct IpfsFs {
    client: Arc<ApiClient>,
    stats: Cache<String, FileInfo>,
}

impl IpfsFs {
    pub fn new(client: Arc<ApiClient>) -> IpfsFs {
        IpfsFs { client, stats: Cache::new(STAT_CACHE_CAPACITY) }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    fn content_path(name: &str) -> String {
        format!("/ipfs/{name}")
    }

    /// Stat through the cache. Only successful lookups are cached;
    /// negative results stay uncached so newly added content appears.
    fn stat_cached(&self, name: &str) -> Result<FileInfo> {
        if let Some(info) = self.stats.get(name) {
            return Ok(info);
        }
        let response = self.client.files_stat(&Self::content_path(name))?;
        let kind = match response.typ.as_str() {
            "directory" => EntryKind::Directory,
            _ => EntryKind::File,
        };
        let info = FileInfo {
            name: base_name(name),
            size: response.size,
            kind,
            perm: if kind == EntryKind::Directory { 0o555 } else { 0o444 },
            mtime: SystemTime::UNIX_EPOCH,
            atime: None,
            ctime: None,
            btime: None,
            uid: None,
            gid: None,
        };
        self.stats.insert(name.to_string(), info.clone());
        Ok(info)
    }

    fn open_dir(&self, name: &str, info: FileInfo) -> Result<Box<dyn FsFile>> {
        let links = self.client.ls(&Self::content_path(name))?;
        Ok(Box::new(ListDir::new(info, links.into_iter().map(link_entry).collect())))
    }
}

impl FileSystem for IpfsFs {
    fn stat(&self, name: &str) -> Result<FileInfo> {
        if name == "." {
            return Ok(FileInfo::synthetic_dir("."));
        }
        self.stat_cached(name)
    }

    fn open(&self, name: &str) -> Result<Box<dyn FsFile>> {
        if name == "." {
            // The namespace root lists nothing; entries resolve on demand.
            return Ok(Box::new(ListDir::new(FileInfo::synthetic_dir("."), Vec::new())));
        }
        let info = self.stat_cached(name)?;
        if info.is_dir() {
            self.open_dir(name, info)
        } else {
            Ok(Box::new(IpfsFile {
                client: Arc::clone(&self.client),
                path: Self::content_path(name),
                info,
            }))
        }
    }
}

/// Converts a unixfs link into a portable directory entry, carrying the
/// metadata the listing already paid for.
pub(super) fn link_entry(link: LsLink) -> FsDirEntry {
    let kind = match link.typ {
        1 | 5 => EntryKind::Directory,
        4 => EntryKind::Symlink,
        _ => EntryKind::File,
    };
    let info = FileInfo {
        name: link.name.clone(),
        size: link.size,
        kind,
        perm: if kind == EntryKind::Directory { 0o555 } else { 0o444 },
        mtime: SystemTime::UNIX_EPOCH,
        atime: None,
        ctime: None,
        btime: None,
        uid: None,
        gid: None,
    };
    FsDirEntry { name: link.name, info: Some(info) }
}

pub(super) fn base_name(name: &str) -> String {
    name.rsplit('/').next().unwrap_or(name).to_string()
}

struct IpfsFile {
    client: Arc<ApiClient>,
    path: String,
    info: FileInfo,
}

impl FsFile for IpfsFile {
    fn info(&self) -> Result<FileInfo> {
        Ok(self.info.clone())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= self.info.size || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min((self.info.size - offset) as usize);
        let data = self.client.cat(&self.path, offset, want)?;
        if data.len() > buf.len() {
            return Err(Error::msg(Kind::Io, "cat returned more data than requested"));
        }
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }
}
