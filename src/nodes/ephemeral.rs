//! Directories that remove themselves once their last entry is unlinked.
//!
//! The listener tree is built from these: unlinking the final socket file
//! collapses the now-empty protocol directories upward, so the namespace
//! never accumulates dead branches.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Error, Kind, Result};
use crate::ninep::{Dirent, AT_REMOVEDIR};

use super::directory::DirCore;
use super::meta::Meta;
use super::{Ident, Node, NodeRef};

/// A directory holding a back-reference to its parent and its own name;
/// when `unlink_at` empties it, it asks the parent to unlink it in turn.
pub struct EphemeralDir {
    core: DirCore,
    name: String,
}

impl EphemeralDir {
    pub fn new(parent: &NodeRef, name: &str, mode: u32, ident: Ident) -> Arc<EphemeralDir> {
        Arc::new_cyclic(|me: &Weak<EphemeralDir>| {
            let me: Weak<dyn Node> = me.clone();
            EphemeralDir {
                core: DirCore::new(Some(parent), me, mode, ident),
                name: name.to_string(),
            }
        })
    }

    pub fn core(&self) -> &DirCore {
        &self.core
    }

    /// Requests removal from the parent. A racing collapse may already have
    /// removed this directory; that is not an error.
    async fn collapse(&self) -> Result<()> {
        let Some(parent) = self.core.meta.parent() else {
            return Ok(());
        };
        debug!(name = %self.name, "collapsing emptied directory");
        match parent.unlink_at(&self.name, AT_REMOVEDIR).await {
            Ok(()) => Ok(()),
            Err(err) if matches!(err.kind(), Kind::NotExist | Kind::NotEmpty) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl Node for EphemeralDir {
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
        let child = EphemeralDir::new(&me, name, mode, ident);
        self.core.table.link(name, child.clone())?;
        self.core.meta.touch_mtime();
        Ok(child)
    }

    fn link(&self, name: &str, node: NodeRef) -> Result<()> {
        self.core.table.link(name, node)?;
        self.core.meta.touch_mtime();
        Ok(())
    }

    async fn unlink_at(&self, name: &str, flags: u32) -> Result<()> {
        let now_empty = self.core.unlink_at(name, flags).await?;
        self.core.meta.touch_mtime();
        if now_empty {
            self.collapse().await?;
        }
        Ok(())
    }
}
