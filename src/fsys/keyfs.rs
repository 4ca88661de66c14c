//! The key-listing filesystem.
//!
//! The root enumerates the node's IPNS keys by name; a key name maps to
//! its IPNS identity and everything below it follows IPNS semantics.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::error::{Error, Kind, Result};

use super::client::ApiClient;
use super::{FileInfo, FileSystem, FsDirEntry, FsFile, IpnsFs, ListDir};

const KEY_CACHE_CAPACITY: u64 = 256;
const KEY_TTL: Duration = Duration::from_secs(30);

pub struct KeyFs {
    client: Arc<ApiClient>,
    ipns: IpnsFs,
    /// Key name to IPNS identity.
    keys: Cache<String, String>,
}

impl KeyFs {
    pub fn new(client: Arc<ApiClient>) -> KeyFs {
        KeyFs {
            ipns: IpnsFs::new(Arc::clone(&client)),
            client,
            keys: Cache::builder().max_capacity(KEY_CACHE_CAPACITY).time_to_live(KEY_TTL).build(),
        }
    }

    /// Refreshes the key table and returns the identity for `name`.
    fn key_id(&self, name: &str) -> Result<String> {
        if let Some(id) = self.keys.get(name) {
            return Ok(id);
        }
        for key in self.client.key_list()? {
            self.keys.insert(key.name.clone(), key.id.clone());
        }
        self.keys.get(name).ok_or_else(|| Error::msg(Kind::NotExist, name))
    }

    /// Rewrites `<key-name>/<rest...>` into the equivalent IPNS name.
    fn to_ipns_name(&self, name: &str) -> Result<String> {
        let (first, rest) = match name.split_once('/') {
            Some((first, rest)) => (first, Some(rest)),
            None => (name, None),
        };
        let id = self.key_id(first)?;
        Ok(match rest {
            Some(rest) => format!("{id}/{rest}"),
            None => id,
        })
    }
}

impl FileSystem for KeyFs {
    fn stat(&self, name: &str) -> Result<FileInfo> {
        if name == "." {
            return Ok(FileInfo::synthetic_dir("."));
        }
        let mut info = self.ipns.stat(&self.to_ipns_name(name)?)?;
        info.name = super::ipfs::base_name(name);
        Ok(info)
    }

    fn open(&self, name: &str) -> Result<Box<dyn FsFile>> {
        if name == "." {
            let keys = self.client.key_list()?;
            let entries = keys
                .into_iter()
                .map(|key| {
                    self.keys.insert(key.name.clone(), key.id);
                    FsDirEntry { name: key.name, info: None }
                })
                .collect();
            return Ok(Box::new(ListDir::streaming(FileInfo::synthetic_dir("."), entries)));
        }
        self.ipns.open(&self.to_ipns_name(name)?)
    }
}
