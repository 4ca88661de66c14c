//! Inode-number to portable-path translation.
//!
//! The kernel speaks inode numbers; the portable filesystem interface
//! speaks slash-separated names with `.` as the root. This table owns the
//! mapping and the kernel's lookup counts: an entry lives until the kernel
//! has forgotten it as many times as it looked it up.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Error, Kind, Result};

/// The kernel's fixed root inode.
pub const ROOT_INO: u64 = 1;

struct InodeEntry {
    name: String,
    lookups: u64,
}

struct Inner {
    by_ino: HashMap<u64, InodeEntry>,
    by_name: HashMap<String, u64>,
    next: u64,
}

pub struct InodeTable {
    inner: RwLock<Inner>,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> InodeTable {
        let mut by_ino = HashMap::new();
        let mut by_name = HashMap::new();
        by_ino.insert(ROOT_INO, InodeEntry { name: ".".to_string(), lookups: 1 });
        by_name.insert(".".to_string(), ROOT_INO);
        InodeTable { inner: RwLock::new(Inner { by_ino, by_name, next: ROOT_INO + 1 }) }
    }

    /// Portable name for a live inode.
    pub fn name_of(&self, ino: u64) -> Result<String> {
        let inner = self.inner.read();
        inner
            .by_ino
            .get(&ino)
            .map(|entry| entry.name.clone())
            .ok_or_else(|| Error::msg(Kind::Closed, format!("unknown inode {ino}")))
    }

    /// Returns the inode for `name`, allocating one if needed, and counts
    /// one kernel lookup against it.
    pub fn assign(&self, name: &str) -> u64 {
        let mut inner = self.inner.write();
        if let Some(&ino) = inner.by_name.get(name) {
            if let Some(entry) = inner.by_ino.get_mut(&ino) {
                entry.lookups += 1;
            }
            return ino;
        }
        let ino = inner.next;
        inner.next += 1;
        inner.by_ino.insert(ino, InodeEntry { name: name.to_string(), lookups: 1 });
        inner.by_name.insert(name.to_string(), ino);
        ino
    }

    /// Inode for `name` without touching lookup counts; used by plain
    /// directory listings, where the number is advisory.
    pub fn peek(&self, name: &str) -> Option<u64> {
        self.inner.read().by_name.get(name).copied()
    }

    /// Applies `forget(n)` from the kernel; the entry dies at zero.
    pub fn forget(&self, ino: u64, count: u64) {
        if ino == ROOT_INO {
            return;
        }
        let mut inner = self.inner.write();
        let remove = match inner.by_ino.get_mut(&ino) {
            Some(entry) => {
                entry.lookups = entry.lookups.saturating_sub(count);
                entry.lookups == 0
            }
            None => false,
        };
        if remove {
            if let Some(entry) = inner.by_ino.remove(&ino) {
                inner.by_name.remove(&entry.name);
            }
        }
    }

    pub fn live(&self) -> usize {
        self.inner.read().by_ino.len()
    }
}
