//! Plain directories and the shared directory core.
//!
//! Every directory-shaped variant embeds a [`DirCore`]: metadata, the child
//! table, and a weak self-reference handed to children as their parent
//! edge. Variants differ only in what `mkdir`/`create`/`mknod` produce.

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::error::{Error, Kind, Result};
use crate::ninep::{Dirent, QTDIR, S_IFDIR, UMASK_STRIP};

use super::file::RegularFile;
use super::meta::{Attr, Meta};
use super::table::FileTable;
use super::{Ident, Node, NodeRef, OpenFlags};

/// Strips the umask-like permission subset and stamps the directory type.
pub(super) fn dir_mode(requested: u32) -> u32 {
    S_IFDIR | (requested & 0o7777 & !UMASK_STRIP)
}

/// State shared by all directory variants.
pub struct DirCore {
    pub meta: Meta,
    pub table: FileTable,
    me: Weak<dyn Node>,
}

impl DirCore {
    /// Builds the core inside an `Arc::new_cyclic` closure so children can
    /// be given a parent edge pointing back at the enclosing node.
    pub fn new(parent: Option<&NodeRef>, me: Weak<dyn Node>, mode: u32, ident: Ident) -> DirCore {
        Self::with_attr(parent, me, Attr::new(dir_mode(mode), ident.uid, ident.gid))
    }

    pub fn with_attr(parent: Option<&NodeRef>, me: Weak<dyn Node>, attr: Attr) -> DirCore {
        let counter = parent.map(|p| p.meta().counter());
        let parent = parent.map(Arc::downgrade);
        DirCore { meta: Meta::new(counter, QTDIR, parent, attr), table: FileTable::new(), me }
    }

    /// Parent edge for children of this directory.
    pub fn as_parent(&self) -> Weak<dyn Node> {
        self.me.clone()
    }

    pub async fn unlink_at(&self, name: &str, flags: u32) -> Result<bool> {
        let (node, now_empty) = self.table.delete(name, flags)?;
        node.unlinked().await?;
        Ok(now_empty)
    }
}

/// A plain directory: children are whatever callers put in it.
pub struct Directory {
    core: DirCore,
}

impl Directory {
    /// A new tree root with its own path counter.
    pub fn root(ident: Ident) -> Arc<Directory> {
        Self::build(None, 0o755, ident)
    }

    pub fn new(parent: &NodeRef, mode: u32, ident: Ident) -> Arc<Directory> {
        Self::build(Some(parent), mode, ident)
    }

    fn build(parent: Option<&NodeRef>, mode: u32, ident: Ident) -> Arc<Directory> {
        Arc::new_cyclic(|me: &Weak<Directory>| {
            let me: Weak<dyn Node> = me.clone();
            Directory { core: DirCore::new(parent, me, mode, ident) }
        })
    }

    pub fn core(&self) -> &DirCore {
        &self.core
    }
}

#[async_trait]
impl Node for Directory {
    fn meta(&self) -> &Meta {
        &self.core.meta
    }

    fn child(&self, name: &str) -> Result<NodeRef> {
        self.core.table.get(name)
    }

    fn name_of(&self, child: &NodeRef) -> Option<String> {
        self.core.table.name_of(child)
    }

    fn dir_len(&self) -> Option<usize> {
        Some(self.core.table.len())
    }

    fn read_dir(&self, offset: u64, count: usize) -> Result<Vec<Dirent>> {
        Ok(self.core.table.read_dir(offset, count))
    }

    async fn mkdir(&self, name: &str, mode: u32, ident: Ident) -> Result<NodeRef> {
        let me: NodeRef =
            self.core.as_parent().upgrade().ok_or_else(|| Error::new(Kind::Closed))?;
        let child = Directory::new(&me, mode, ident);
        self.core.table.link(name, child.clone())?;
        self.core.meta.touch_mtime();
        Ok(child)
    }

    async fn create(
        &self,
        name: &str,
        _flags: OpenFlags,
        mode: u32,
        ident: Ident,
    ) -> Result<NodeRef> {
        let file = RegularFile::new(self.core.meta.counter(), self.core.as_parent(), mode, ident);
        self.core.table.link(name, file.clone())?;
        self.core.meta.touch_mtime();
        Ok(file)
    }

    fn link(&self, name: &str, node: NodeRef) -> Result<()> {
        self.core.table.link(name, node)?;
        self.core.meta.touch_mtime();
        Ok(())
    }

    async fn unlink_at(&self, name: &str, flags: u32) -> Result<()> {
        self.core.unlink_at(name, flags).await?;
        self.core.meta.touch_mtime();
        Ok(())
    }
}
