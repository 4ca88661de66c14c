//! The pin-listing filesystem.
//!
//! The root enumerates the node's recursive pins; everything below the
//! root is plain IPFS. Pin sets can be large, so the root directory offers
//! the streaming listing interface.

use std::sync::Arc;

use crate::error::Result;

use super::client::ApiClient;
use super::{FileInfo, FileSystem, FsDirEntry, FsFile, IpfsFs, ListDir};

pub struct PinFs {
    ipfs: IpfsFs,
}

impl PinFs {
    pub fn new(client: Arc<ApiClient>) -> PinFs {
        PinFs { ipfs: IpfsFs::new(client) }
    }

    fn pin_entries(&self) -> Result<Vec<FsDirEntry>> {
        let pins = self.ipfs.client().pin_ls()?;
        // Pins are bare identifiers; whether each one is a file or a
        // directory is only known after a stat, so entries carry no info.
        Ok(pins.into_iter().map(|cid| FsDirEntry { name: cid, info: None }).collect())
    }
}

impl FileSystem for PinFs {
    fn stat(&self, name: &str) -> Result<FileInfo> {
        if name == "." {
            return Ok(FileInfo::synthetic_dir("."));
        }
        self.ipfs.stat(name)
    }

    fn open(&self, name: &str) -> Result<Box<dyn FsFile>> {
        if name == "." {
            return Ok(Box::new(ListDir::streaming(
                FileInfo::synthetic_dir("."),
                self.pin_entries()?,
            )));
        }
        self.ipfs.open(name)
    }
}
