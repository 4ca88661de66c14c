//! The mount subtree: `/mounts`, its host-API directories, and the
//! filesystem-ID directories that hand out controllers.
//!
//! `mkdir` under `/mounts` selects a host API (only `fuse` is defined),
//! `mkdir` under a host-API directory selects a filesystem ID, and
//! `create`/`mknod` inside an FSID directory allocates a fresh mount
//! controller wired to the host adapter.

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::error::{Error, Kind, Result};
use crate::fsys::FsId;
use crate::ninep::Dirent;

use super::control::{Attacher, MountFile};
use super::directory::DirCore;
use super::meta::{Attr, Meta};
use super::{Ident, Node, NodeRef, OpenFlags};

/// `/mounts`: host APIs are selected by `mkdir` underneath it.
pub struct Mounter {
    core: DirCore,
    attacher: Arc<dyn Attacher>,
}

impl Mounter {
    pub fn new(parent: &NodeRef, attacher: Arc<dyn Attacher>, ident: Ident) -> Arc<Mounter> {
        Arc::new_cyclic(|me: &Weak<Mounter>| {
            let me: Weak<dyn Node> = me.clone();
            Mounter { core: DirCore::new(Some(parent), me, 0o755, ident), attacher }
        })
    }
}

#[async_trait]
impl Node for Mounter {
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

    async fn unlink_at(&self, name: &str, flags: u32) -> Result<()> {
        self.core.unlink_at(name, flags).await?;
        self.core.meta.touch_mtime();
        Ok(())
    }

    async fn mkdir(&self, name: &str, mode: u32, ident: Ident) -> Result<NodeRef> {
        if name != "fuse" {
            return Err(Error::msg(Kind::InvalidItem, format!("unknown host API: {name}")));
        }
        let me: NodeRef =
            self.core.as_parent().upgrade().ok_or_else(|| Error::new(Kind::Closed))?;
        let child = FuseDir::new(&me, Arc::clone(&self.attacher), mode, ident);
        self.core.table.link(name, child.clone())?;
        self.core.meta.touch_mtime();
        Ok(child)
    }
}

/// `/mounts/fuse`: filesystem IDs are selected by `mkdir` underneath it.
pub struct FuseDir {
    core: DirCore,
    attacher: Arc<dyn Attacher>,
}

impl FuseDir {
    pub fn new(
        parent: &NodeRef,
        attacher: Arc<dyn Attacher>,
        mode: u32,
        ident: Ident,
    ) -> Arc<FuseDir> {
        Arc::new_cyclic(|me: &Weak<FuseDir>| {
            let me: Weak<dyn Node> = me.clone();
            FuseDir { core: DirCore::new(Some(parent), me, mode, ident), attacher }
        })
    }
}

#[async_trait]
impl Node for FuseDir {
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

    async fn unlink_at(&self, name: &str, flags: u32) -> Result<()> {
        self.core.unlink_at(name, flags).await?;
        self.core.meta.touch_mtime();
        Ok(())
    }

    async fn mkdir(&self, name: &str, mode: u32, ident: Ident) -> Result<NodeRef> {
        let fsid: FsId = name.parse()?;
        let me: NodeRef =
            self.core.as_parent().upgrade().ok_or_else(|| Error::new(Kind::Closed))?;
        let child = FsidDir::new(&me, fsid, Arc::clone(&self.attacher), mode, ident);
        self.core.table.link(name, child.clone())?;
        self.core.meta.touch_mtime();
        Ok(child)
    }
}

/// `/mounts/fuse/<fsid>`: controllers are allocated by `create`/`mknod`.
/// The directory's `RDev` metadata carries the numeric filesystem ID so
/// host adapters can tell which content filesystem to construct.
pub struct FsidDir {
    core: DirCore,
    fsid: FsId,
    attacher: Arc<dyn Attacher>,
}

impl FsidDir {
    pub fn new(
        parent: &NodeRef,
        fsid: FsId,
        attacher: Arc<dyn Attacher>,
        mode: u32,
        ident: Ident,
    ) -> Arc<FsidDir> {
        Arc::new_cyclic(|me: &Weak<FsidDir>| {
            let me: Weak<dyn Node> = me.clone();
            let attr = Attr::new(super::directory::dir_mode(mode), ident.uid, ident.gid)
                .with_rdev(fsid.rdev());
            FsidDir { core: DirCore::with_attr(Some(parent), me, attr), fsid, attacher }
        })
    }

    pub fn fsid(&self) -> FsId {
        self.fsid
    }

    fn new_controller(&self, name: &str, mode: u32, ident: Ident) -> Result<NodeRef> {
        let me: NodeRef =
            self.core.as_parent().upgrade().ok_or_else(|| Error::new(Kind::Closed))?;
        let controller =
            MountFile::new(&me, name, self.fsid, Arc::clone(&self.attacher), mode, ident);
        self.core.table.link(name, controller.clone())?;
        self.core.meta.touch_mtime();
        Ok(controller)
    }
}

#[async_trait]
impl Node for FsidDir {
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

    async fn unlink_at(&self, name: &str, flags: u32) -> Result<()> {
        self.core.unlink_at(name, flags).await?;
        self.core.meta.touch_mtime();
        Ok(())
    }

    async fn create(
        &self,
        name: &str,
        _flags: OpenFlags,
        mode: u32,
        ident: Ident,
    ) -> Result<NodeRef> {
        self.new_controller(name, mode, ident)
    }

    async fn mknod(&self, name: &str, mode: u32, ident: Ident) -> Result<NodeRef> {
        self.new_controller(name, mode, ident)
    }
}
