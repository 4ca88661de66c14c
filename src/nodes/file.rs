//! In-memory regular files.

use std::sync::{Arc, Weak};
use std::sync::atomic::AtomicU64;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::ninep::messages::SetAttr;
use crate::ninep::{setattr, QTFILE, S_IFREG, UMASK_STRIP};

use super::meta::{Attr, Meta};
use super::{Ident, Node, OpenFlags};

/// A byte-buffer file. Reads and writes accept arbitrary offsets; writes
/// past the end zero-fill the gap.
pub struct RegularFile {
    meta: Meta,
    content: Mutex<Vec<u8>>,
}

impl RegularFile {
    pub fn new(
        counter: Arc<AtomicU64>,
        parent: Weak<dyn Node>,
        mode: u32,
        ident: Ident,
    ) -> Arc<RegularFile> {
        let mode = S_IFREG | (mode & 0o7777 & !UMASK_STRIP);
        Arc::new(RegularFile {
            meta: Meta::new(
                Some(counter),
                QTFILE,
                Some(parent),
                Attr::new(mode, ident.uid, ident.gid),
            ),
            content: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Node for RegularFile {
    fn meta(&self) -> &Meta {
        &self.meta
    }

    async fn open(&self, flags: OpenFlags) -> Result<()> {
        if flags.writable() && flags.truncate() {
            self.content.lock().clear();
            self.meta.set_size(0);
        }
        Ok(())
    }

    async fn read_at(&self, offset: u64, count: u32) -> Result<Vec<u8>> {
        let content = self.content.lock();
        let start = (offset as usize).min(content.len());
        let end = (start + count as usize).min(content.len());
        Ok(content[start..end].to_vec())
    }

    async fn write_at(&self, offset: u64, data: &[u8]) -> Result<u32> {
        let mut content = self.content.lock();
        let offset = offset as usize;
        let end = offset + data.len();
        if content.len() < end {
            content.resize(end, 0);
        }
        content[offset..end].copy_from_slice(data);
        self.meta.set_size(content.len() as u64);
        self.meta.touch_mtime();
        Ok(data.len() as u32)
    }

    fn set_attr(&self, valid: u32, update: &SetAttr) -> Result<()> {
        if valid & setattr::SIZE != 0 {
            let mut content = self.content.lock();
            content.resize(update.size as usize, 0);
        }
        self.meta.set_attr(valid, update)
    }
}
