//! Per-connection request dispatch.
//!
//! The dispatch task owns the connection's fid table and processes
//! requests in arrival order, translating each message into node
//! operations and each outcome into a reply frame. Fid state is the
//! walk/open machine: a fid that has never been opened can walk and
//! clone; once opened it can only do I/O and clunk.

use std::collections::HashMap;

use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{Error, Kind, Result};
use crate::ninep::messages::{Rmessage, StatFs, Tmessage};
use crate::ninep::{
    serializer, Dirent, AT_REMOVEDIR, IOHDRSZ, MAX_MSIZE, NONUNAME, VERSION, VERSION_UNKNOWN,
};
use crate::nodes::{walk, Ident, NodeRef, OpenFlags};

use super::read_task::Incoming;

/// Magic constant reported by `statfs`, matching the kernel's 9P
/// filesystem type.
const V9FS_MAGIC: u32 = 0x0102_1997;

struct FidState {
    node: NodeRef,
    open: Option<OpenFlags>,
}

/// The dispatch task for one connection.
pub struct Dispatcher {
    root: NodeRef,
    fids: HashMap<u32, FidState>,
    msize: u32,
    ident: Ident,
    requests: Receiver<Incoming>,
    replies: Sender<Vec<u8>>,
}

impl Dispatcher {
    pub fn spawn(
        root: NodeRef,
        ident: Ident,
        requests: Receiver<Incoming>,
        replies: Sender<Vec<u8>>,
    ) -> JoinHandle<()> {
        tokio::spawn(
            Self { root, fids: HashMap::new(), msize: MAX_MSIZE, ident, requests, replies }.run(),
        )
    }

    async fn run(mut self) {
        while let Some(incoming) = self.requests.recv().await {
            let (tag, reply) = match incoming {
                Incoming::Request { tag, msg } => {
                    trace!(tag, ?msg, "request");
                    let reply = self
                        .handle(msg)
                        .await
                        .unwrap_or_else(|err| Rmessage::LError { ecode: err.kind().wire_errno() });
                    (tag, reply)
                }
                Incoming::Malformed { tag, err } => {
                    debug!(tag, %err, "malformed request");
                    (tag, Rmessage::LError { ecode: err.kind().wire_errno() })
                }
            };
            if self.replies.send(serializer::r_message(tag, &reply)).await.is_err() {
                return;
            }
        }
    }

    fn fid(&self, fid: u32) -> Result<&FidState> {
        self.fids.get(&fid).ok_or_else(|| Error::msg(Kind::Closed, format!("unknown fid {fid}")))
    }

    /// The payload budget advertised as `iounit` and enforced on replies.
    fn iounit(&self) -> u32 {
        self.msize.saturating_sub(IOHDRSZ).max(512)
    }

    async fn handle(&mut self, msg: Tmessage) -> Result<Rmessage> {
        match msg {
            Tmessage::Version { msize, version } => {
                // A version request resets the session.
                self.fids.clear();
                self.msize = msize.min(MAX_MSIZE);
                let version = if version == VERSION { version } else { VERSION_UNKNOWN.to_string() };
                Ok(Rmessage::Version { msize: self.msize, version })
            }

            Tmessage::Auth { .. } => {
                Err(Error::msg(Kind::InvalidOperation, "authentication is not required"))
            }

            Tmessage::Attach { fid, afid: _, uname: _, aname: _, n_uname } => {
                if self.fids.contains_key(&fid) {
                    return Err(Error::msg(Kind::Exist, format!("fid {fid} in use")));
                }
                if n_uname != NONUNAME {
                    self.ident.uid = n_uname;
                }
                let qid = self.root.qid();
                self.fids.insert(fid, FidState { node: self.root.clone(), open: None });
                Ok(Rmessage::Attach { qid })
            }

            Tmessage::Flush { .. } => Ok(Rmessage::Flush),

            Tmessage::Walk { fid, newfid, wnames } => {
                let state = self.fid(fid)?;
                if state.open.is_some() {
                    return Err(Error::msg(Kind::InvalidOperation, "cannot walk an open fid"));
                }
                if newfid != fid && self.fids.contains_key(&newfid) {
                    return Err(Error::msg(Kind::Exist, format!("fid {newfid} in use")));
                }
                let walked = walk::walk(&self.fid(fid)?.node, &wnames);
                match walked.end {
                    Ok(node) => {
                        self.fids.insert(newfid, FidState { node, open: None });
                        Ok(Rmessage::Walk { wqids: walked.wqids })
                    }
                    // A partial walk reports the qids gathered so far; only
                    // a first-step failure is an error reply.
                    Err(err) if walked.wqids.is_empty() => Err(err),
                    Err(_) => Ok(Rmessage::Walk { wqids: walked.wqids }),
                }
            }

            Tmessage::Open { fid, flags } => {
                let state = self.fid(fid)?;
                if state.open.is_some() {
                    return Err(Error::msg(Kind::InvalidOperation, "fid is already open"));
                }
                let node = state.node.clone();
                let flags = OpenFlags::new(flags);
                node.open(flags).await?;
                if let Some(state) = self.fids.get_mut(&fid) {
                    state.open = Some(flags);
                }
                Ok(Rmessage::Open { qid: node.qid(), iounit: self.iounit() })
            }

            Tmessage::Create { fid, name, flags, mode, gid } => {
                let state = self.fid(fid)?;
                if state.open.is_some() {
                    return Err(Error::msg(Kind::InvalidOperation, "fid is already open"));
                }
                let parent = state.node.clone();
                let flags = OpenFlags::new(flags);
                let ident = Ident { uid: self.ident.uid, gid };
                let node = parent.create(&name, flags, mode, ident).await?;
                node.open(flags).await?;
                let qid = node.qid();
                self.fids.insert(fid, FidState { node, open: Some(flags) });
                Ok(Rmessage::Create { qid, iounit: self.iounit() })
            }

            Tmessage::Mkdir { dfid, name, mode, gid } => {
                let parent = self.fid(dfid)?.node.clone();
                let ident = Ident { uid: self.ident.uid, gid };
                let node = parent.mkdir(&name, mode, ident).await?;
                Ok(Rmessage::Mkdir { qid: node.qid() })
            }

            Tmessage::Mknod { dfid, name, mode, major: _, minor: _, gid } => {
                let parent = self.fid(dfid)?.node.clone();
                let ident = Ident { uid: self.ident.uid, gid };
                let node = parent.mknod(&name, mode, ident).await?;
                Ok(Rmessage::Mknod { qid: node.qid() })
            }

            Tmessage::Link { dfid, fid, name } => {
                let dir = self.fid(dfid)?.node.clone();
                let node = self.fid(fid)?.node.clone();
                dir.link(&name, node)?;
                Ok(Rmessage::Link)
            }

            Tmessage::Read { fid, offset, count } => {
                let state = self.fid(fid)?;
                match state.open {
                    Some(flags) if flags.readable() => {}
                    Some(_) => return Err(Error::msg(Kind::Permission, "fid not open for read")),
                    None => return Err(Error::msg(Kind::Closed, "fid not open")),
                }
                let node = state.node.clone();
                let count = count.min(self.iounit());
                let data = node.read_at(offset, count).await?;
                Ok(Rmessage::Read { data })
            }

            Tmessage::Write { fid, offset, data } => {
                let state = self.fid(fid)?;
                match state.open {
                    Some(flags) if flags.writable() => {}
                    Some(_) => return Err(Error::msg(Kind::Permission, "fid not open for write")),
                    None => return Err(Error::msg(Kind::Closed, "fid not open")),
                }
                let node = state.node.clone();
                let count = node.write_at(offset, &data).await?;
                Ok(Rmessage::Write { count })
            }

            Tmessage::ReadDir { fid, offset, count } => {
                let state = self.fid(fid)?;
                if state.open.is_none() {
                    return Err(Error::msg(Kind::Closed, "fid not open"));
                }
                let node = state.node.clone();
                let budget = count.min(self.iounit()) as usize;
                // Smallest possible entry is ~26 bytes; fetch enough to
                // fill the budget and pack until it runs out.
                let max_entries = budget / 26 + 1;
                let entries = node.read_dir(offset, max_entries)?;
                let mut packed: Vec<Dirent> = Vec::new();
                let mut used = 0usize;
                for entry in entries {
                    let size = entry.wire_size();
                    if used + size > budget {
                        break;
                    }
                    used += size;
                    packed.push(entry);
                }
                Ok(Rmessage::ReadDir { entries: packed })
            }

            Tmessage::Clunk { fid } => {
                let state = self
                    .fids
                    .remove(&fid)
                    .ok_or_else(|| Error::msg(Kind::Closed, format!("unknown fid {fid}")))?;
                if let Some(flags) = state.open {
                    state.node.close(flags).await?;
                }
                Ok(Rmessage::Clunk)
            }

            Tmessage::Remove { fid } => {
                // Remove clunks the fid no matter how the removal goes.
                let state = self
                    .fids
                    .remove(&fid)
                    .ok_or_else(|| Error::msg(Kind::Closed, format!("unknown fid {fid}")))?;
                let node = state.node;
                let parent = node
                    .parent()
                    .ok_or_else(|| Error::msg(Kind::Permission, "cannot remove the root"))?;
                let name = parent
                    .name_of(&node)
                    .ok_or_else(|| Error::msg(Kind::NotExist, "node is no longer linked"))?;
                let flags = if node.qid().is_dir() { AT_REMOVEDIR } else { 0 };
                parent.unlink_at(&name, flags).await?;
                Ok(Rmessage::Remove)
            }

            Tmessage::UnlinkAt { dirfd, name, flags } => {
                let dir = self.fid(dirfd)?.node.clone();
                dir.unlink_at(&name, flags).await?;
                Ok(Rmessage::UnlinkAt)
            }

            Tmessage::GetAttr { fid, request_mask } => {
                let node = &self.fid(fid)?.node;
                let (valid, stat) = node.get_attr(request_mask);
                Ok(Rmessage::GetAttr { valid, qid: node.qid(), stat })
            }

            Tmessage::SetAttr { fid, valid, attr } => {
                self.fid(fid)?.node.set_attr(valid, &attr)?;
                Ok(Rmessage::SetAttr)
            }

            Tmessage::StatFs { fid } => {
                self.fid(fid)?;
                Ok(Rmessage::StatFs {
                    stat: StatFs {
                        typ: V9FS_MAGIC,
                        bsize: 4096,
                        namelen: 255,
                        ..Default::default()
                    },
                })
            }

            Tmessage::Fsync { fid, datasync: _ } => {
                self.fid(fid)?;
                Ok(Rmessage::Fsync)
            }

            // No symlinks, renames, xattrs, or byte-range locks exist in
            // this tree; report the capability as absent.
            Tmessage::Symlink { .. }
            | Tmessage::Readlink { .. }
            | Tmessage::Rename { .. }
            | Tmessage::RenameAt { .. }
            | Tmessage::XattrWalk { .. }
            | Tmessage::XattrCreate { .. }
            | Tmessage::Lock { .. }
            | Tmessage::GetLock { .. } => Err(Error::new(Kind::InvalidOperation)),
        }
    }
}
