//! Node metadata and the shared path allocator.
//!
//! Every node owns a [`Meta`]: its qid, a handle on the tree-wide path
//! counter, a weak edge to its parent, and the mutable attribute block.
//! Path identifiers come from one atomic counter per tree; a node built
//! without a counter allocates a fresh one and becomes a tree root.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::error::Result;
use crate::ninep::messages::{SetAttr, Stat};
use crate::ninep::{getattr, setattr, Qid, TimeSpec, S_IFMT};

use super::{Node, NodeRef};

/// Mutable attribute block.
#[derive(Debug, Clone, Copy)]
pub struct Attr {
    /// Type and permission bits together, POSIX layout.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Opaque device tag; filesystem-ID directories carry their ID here.
    pub rdev: u64,
    pub size: u64,
    pub atime: TimeSpec,
    pub mtime: TimeSpec,
    pub ctime: TimeSpec,
    pub btime: TimeSpec,
}

impl Attr {
    /// A fresh attribute block with all timestamps at the current wall
    /// clock.
    pub fn new(mode: u32, uid: u32, gid: u32) -> Attr {
        let now = TimeSpec::now();
        Attr { mode, uid, gid, rdev: 0, size: 0, atime: now, mtime: now, ctime: now, btime: now }
    }

    pub fn with_rdev(mut self, rdev: u64) -> Attr {
        self.rdev = rdev;
        self
    }
}

/// Shared metadata every node variant embeds.
pub struct Meta {
    qid: Qid,
    counter: Arc<AtomicU64>,
    parent: Weak<dyn Node>,
    attr: Mutex<Attr>,
}

impl Meta {
    /// Builds the metadata block, drawing the next path identifier from
    /// `counter` (or from a brand-new counter when `counter` is `None`).
    pub fn new(
        counter: Option<Arc<AtomicU64>>,
        qid_type: u8,
        parent: Option<Weak<dyn Node>>,
        attr: Attr,
    ) -> Meta {
        let counter = counter.unwrap_or_default();
        let path = counter.fetch_add(1, Ordering::Relaxed) + 1;
        Meta {
            qid: Qid { typ: qid_type, version: 0, path },
            counter,
            parent: parent.unwrap_or_else(empty_parent),
            attr: Mutex::new(attr),
        }
    }

    pub fn qid(&self) -> Qid {
        self.qid
    }

    pub fn is_dir(&self) -> bool {
        self.qid.is_dir()
    }

    /// The tree-wide path counter, for stamping descendants.
    pub fn counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.counter)
    }

    pub fn parent(&self) -> Option<NodeRef> {
        self.parent.upgrade()
    }

    pub fn size(&self) -> u64 {
        self.attr.lock().size
    }

    pub fn set_size(&self, size: u64) {
        self.attr.lock().size = size;
    }

    pub fn touch_mtime(&self) {
        let now = TimeSpec::now();
        let mut attr = self.attr.lock();
        attr.mtime = now;
        attr.ctime = now;
    }

    /// Returns the attribute subset requested by `mask` that this node can
    /// fill, together with the validity mask describing it. Size is only
    /// valid for non-directories.
    pub fn get_attr(&self, mask: u64) -> (u64, Stat) {
        let attr = *self.attr.lock();
        let mut supported = getattr::MODE
            | getattr::NLINK
            | getattr::UID
            | getattr::GID
            | getattr::RDEV
            | getattr::ATIME
            | getattr::MTIME
            | getattr::CTIME
            | getattr::INO
            | getattr::BTIME;
        if !self.is_dir() {
            supported |= getattr::SIZE;
        }
        let stat = Stat {
            mode: attr.mode,
            uid: attr.uid,
            gid: attr.gid,
            nlink: 1,
            rdev: attr.rdev,
            size: attr.size,
            blksize: 4096,
            atime: attr.atime,
            mtime: attr.mtime,
            ctime: attr.ctime,
            btime: attr.btime,
            ..Default::default()
        };
        (mask & supported, stat)
    }

    /// Applies the fields selected by `valid`. For each of atime/mtime the
    /// wall clock is substituted unless the matching `*_SET` flag says the
    /// client supplied a time; a requested ctime update always takes the
    /// wall clock.
    pub fn set_attr(&self, valid: u32, update: &SetAttr) -> Result<()> {
        let now = TimeSpec::now();
        let mut attr = self.attr.lock();
        if valid & setattr::MODE != 0 {
            attr.mode = (attr.mode & S_IFMT) | (update.mode & !S_IFMT);
        }
        if valid & setattr::UID != 0 {
            attr.uid = update.uid;
        }
        if valid & setattr::GID != 0 {
            attr.gid = update.gid;
        }
        if valid & setattr::SIZE != 0 {
            attr.size = update.size;
        }
        if valid & setattr::ATIME != 0 {
            attr.atime = if valid & setattr::ATIME_SET != 0 { update.atime } else { now };
        }
        if valid & setattr::MTIME != 0 {
            attr.mtime = if valid & setattr::MTIME_SET != 0 { update.mtime } else { now };
        }
        if valid & setattr::CTIME != 0 {
            attr.ctime = now;
        }
        Ok(())
    }
}

fn empty_parent() -> Weak<dyn Node> {
    // A Weak with no referent, built through a sized placeholder because
    // `Weak::new` cannot produce an unsized Weak directly.
    let none: Weak<super::directory::Directory> = Weak::new();
    none
}
