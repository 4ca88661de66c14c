//! The polymorphic node tree served over 9P.
//!
//! Nodes share one capability surface, [`Node`]; variants implement the
//! subset that makes sense for them and inherit failing defaults for the
//! rest. A fid holds a [`NodeRef`] plus its own opened flag, so cloning a
//! fid through walk shares every piece of node state except openness.

pub mod control;
pub mod directory;
pub mod endpoint;
pub mod ephemeral;
pub mod file;
pub mod meta;
pub mod mounter;
pub mod table;
pub mod walk;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Kind, Result};
use crate::ninep::messages::{SetAttr, Stat};
use crate::ninep::{Dirent, Qid, O_ACCMODE, O_RDONLY, O_RDWR, O_TRUNC, O_WRONLY};

pub use control::{Attacher, Detach, MountData, MountFile};
pub use directory::Directory;
pub use endpoint::Endpoint;
pub use ephemeral::EphemeralDir;
pub use file::RegularFile;
pub use meta::{Attr, Meta};
pub use mounter::{FsidDir, FuseDir, Mounter};
pub use table::FileTable;

/// Shared handle to a node.
pub type NodeRef = Arc<dyn Node>;

impl std::fmt::Debug for dyn Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node").field("qid", &self.qid()).finish()
    }
}

/// Identity stamped onto newly created nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ident {
    pub uid: u32,
    pub gid: u32,
}

/// 9P2000.L open flags, reduced to what the tree cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags(u32);

impl OpenFlags {
    pub fn new(flags: u32) -> OpenFlags {
        OpenFlags(flags)
    }

    pub fn readable(self) -> bool {
        matches!(self.0 & O_ACCMODE, O_RDONLY | O_RDWR)
    }

    pub fn writable(self) -> bool {
        matches!(self.0 & O_ACCMODE, O_WRONLY | O_RDWR)
    }

    pub fn truncate(self) -> bool {
        self.0 & O_TRUNC != 0
    }
}

/// The capability set every 9P node exposes.
///
/// Defaults fail with the kind a capability-less node should report:
/// directory operations on non-directories report `NotDir`, content I/O on
/// directories reports `IsDir`, and everything else reports
/// `InvalidOperation`.
#[async_trait]
pub trait Node: Send + Sync {
    fn meta(&self) -> &Meta;

    fn qid(&self) -> Qid {
        self.meta().qid()
    }

    fn parent(&self) -> Option<NodeRef> {
        self.meta().parent()
    }

    /// Resolves `name` in this node's child table.
    fn child(&self, _name: &str) -> Result<NodeRef> {
        Err(Error::new(Kind::NotDir))
    }

    /// Reverse lookup used by `Tremove`, which names a node, not an entry.
    fn name_of(&self, _child: &NodeRef) -> Option<String> {
        None
    }

    /// Child count for directories, `None` otherwise.
    fn dir_len(&self) -> Option<usize> {
        None
    }

    async fn open(&self, _flags: OpenFlags) -> Result<()> {
        Ok(())
    }

    /// Called when an opened fid is clunked.
    async fn close(&self, _flags: OpenFlags) -> Result<()> {
        Ok(())
    }

    async fn read_at(&self, _offset: u64, _count: u32) -> Result<Vec<u8>> {
        Err(content_error(self.qid()))
    }

    async fn write_at(&self, _offset: u64, _data: &[u8]) -> Result<u32> {
        Err(content_error(self.qid()))
    }

    /// Sorted directory listing starting at `offset`, at most `count`
    /// entries.
    fn read_dir(&self, _offset: u64, _count: usize) -> Result<Vec<Dirent>> {
        Err(Error::new(Kind::NotDir))
    }

    async fn create(
        &self,
        _name: &str,
        _flags: OpenFlags,
        _mode: u32,
        _ident: Ident,
    ) -> Result<NodeRef> {
        Err(Error::new(Kind::InvalidOperation))
    }

    async fn mkdir(&self, _name: &str, _mode: u32, _ident: Ident) -> Result<NodeRef> {
        Err(Error::new(Kind::InvalidOperation))
    }

    async fn mknod(&self, _name: &str, _mode: u32, _ident: Ident) -> Result<NodeRef> {
        Err(Error::new(Kind::InvalidOperation))
    }

    /// Atomically inserts an existing node under `name`.
    fn link(&self, _name: &str, _node: NodeRef) -> Result<()> {
        Err(Error::new(Kind::NotDir))
    }

    /// Removes the entry `name`, running the removed node's teardown.
    async fn unlink_at(&self, _name: &str, _flags: u32) -> Result<()> {
        Err(Error::new(Kind::NotDir))
    }

    /// Teardown hook invoked by the parent after this node left its table.
    async fn unlinked(&self) -> Result<()> {
        Ok(())
    }

    fn get_attr(&self, mask: u64) -> (u64, Stat) {
        self.meta().get_attr(mask)
    }

    fn set_attr(&self, valid: u32, update: &SetAttr) -> Result<()> {
        self.meta().set_attr(valid, update)
    }
}

fn content_error(qid: Qid) -> Error {
    if qid.is_dir() {
        Error::new(Kind::IsDir)
    } else {
        Error::new(Kind::InvalidOperation)
    }
}
