//! The IPNS namespace filesystem.
//!
//! Like the IPFS root, the IPNS root cannot be enumerated. The first path
//! component is an IPNS name; it resolves to an `/ipfs/...` path and the
//! remainder of the lookup proceeds with IPFS semantics. Resolutions are
//! mutable, so they are cached only briefly.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::error::{Error, Kind, Result};

use super::client::ApiClient;
use super::{FileInfo, FileSystem, FsFile, IpfsFs, ListDir};

const RESOLVE_CACHE_CAPACITY: u64 = 256;
const RESOLVE_TTL: Duration = Duration::from_secs(30);

pub struct IpnsFs {
    ipfs: IpfsFs,
    resolved: Cache<String, String>,
}

impl IpnsFs {
    pub fn new(client: Arc<ApiClient>) -> IpnsFs {
        IpnsFs {
            ipfs: IpfsFs::new(client),
            resolved: Cache::builder()
                .max_capacity(RESOLVE_CACHE_CAPACITY)
                .time_to_live(RESOLVE_TTL)
                .build(),
        }
    }

    /// Rewrites `<ipns-name>/<rest...>` into the equivalent IPFS name.
    pub(super) fn to_ipfs_name(&self, name: &str) -> Result<String> {
        let (first, rest) = match name.split_once('/') {
            Some((first, rest)) => (first, Some(rest)),
            None => (name, None),
        };
        if first.is_empty() {
            return Err(Error::msg(Kind::InvalidItem, format!("bad ipns name: {name:?}")));
        }

        let root = match self.resolved.get(first) {
            Some(root) => root,
            None => {
                let path = self.ipfs.client().name_resolve(&format!("/ipns/{first}"))?;
                let root = path
                    .strip_prefix("/ipfs/")
                    .ok_or_else(|| {
                        Error::msg(Kind::Io, format!("unexpected resolve target: {path}"))
                    })?
                    .to_string();
                self.resolved.insert(first.to_string(), root.clone());
                root
            }
        };

        Ok(match rest {
            Some(rest) => format!("{root}/{rest}"),
            None => root,
        })
    }
}

impl FileSystem for IpnsFs {
    fn stat(&self, name: &str) -> Result<FileInfo> {
        if name == "." {
            return Ok(FileInfo::synthetic_dir("."));
        }
        let mut info = self.ipfs.stat(&self.to_ipfs_name(name)?)?;
        info.name = super::ipfs::base_name(name);
        Ok(info)
    }

    fn open(&self, name: &str) -> Result<Box<dyn FsFile>> {
        if name == "." {
            return Ok(Box::new(ListDir::new(FileInfo::synthetic_dir("."), Vec::new())));
        }
        self.ipfs.open(&self.to_ipfs_name(name)?)
    }
}
