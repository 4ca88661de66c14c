//! Per-directory child table.
//!
//! Name-sorted, exclusive-insert, with listing offsets laid out so a caller
//! can feed the last offset it saw back in to resume: entry `i` of a window
//! starting at `offset` is reported at `offset + i + 1`.

use parking_lot::RwLock;
use std::collections::BTreeMap;

use crate::error::{Error, Kind, Result};
use crate::ninep::{Dirent, AT_REMOVEDIR, DT_DIR, DT_REG};

use super::NodeRef;

/// Ordered name-to-node map with reader/writer locking.
pub struct FileTable {
    inner: RwLock<BTreeMap<String, NodeRef>>,
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTable {
    pub fn new() -> FileTable {
        FileTable { inner: RwLock::new(BTreeMap::new()) }
    }

    /// Exclusive insert: exactly one of two racing callers with the same
    /// name wins, the loser sees `Exist`.
    pub fn link(&self, name: &str, node: NodeRef) -> Result<()> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(Error::msg(Kind::InvalidItem, format!("bad entry name: {name:?}")));
        }
        let mut table = self.inner.write();
        if table.contains_key(name) {
            return Err(Error::msg(Kind::Exist, name));
        }
        table.insert(name.to_string(), node);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<NodeRef> {
        self.inner.read().get(name).cloned().ok_or_else(|| Error::msg(Kind::NotExist, name))
    }

    /// Removes `name` after validating it against the unlink flags:
    /// directory removal requires an empty directory, plain removal
    /// requires a non-directory. Returns the removed node and whether the
    /// table is now empty, both decided under one write lock.
    pub fn delete(&self, name: &str, flags: u32) -> Result<(NodeRef, bool)> {
        let mut table = self.inner.write();
        let node = table.get(name).cloned().ok_or_else(|| Error::msg(Kind::NotExist, name))?;
        if flags & AT_REMOVEDIR != 0 {
            match node.dir_len() {
                Some(0) => {}
                Some(_) => return Err(Error::msg(Kind::NotEmpty, name)),
                None => return Err(Error::msg(Kind::NotDir, name)),
            }
        } else if node.qid().is_dir() {
            return Err(Error::msg(Kind::IsDir, name));
        }
        table.remove(name);
        Ok((node, table.is_empty()))
    }

    /// Looks up the entry holding exactly this node.
    pub fn name_of(&self, node: &NodeRef) -> Option<String> {
        self.inner
            .read()
            .iter()
            .find(|(_, candidate)| std::sync::Arc::ptr_eq(candidate, node))
            .map(|(name, _)| name.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Name-sorted window of at most `count` entries starting at `offset`.
    /// The snapshot is taken under the read lock; mutations racing with the
    /// listing show up in the next call.
    pub fn read_dir(&self, offset: u64, count: usize) -> Vec<Dirent> {
        let table = self.inner.read();
        table
            .iter()
            .skip(offset as usize)
            .take(count)
            .enumerate()
            .map(|(i, (name, node))| {
                let qid = node.qid();
                Dirent {
                    qid,
                    offset: offset + i as u64 + 1,
                    typ: if qid.is_dir() { DT_DIR } else { DT_REG },
                    name: name.clone(),
                }
            })
            .collect()
    }
}
