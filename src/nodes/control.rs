//! Mount controller files.
//!
//! A controller is a regular-looking file whose lifecycle drives a host
//! mount: writing JSON into it stages the mount data, clunking the written
//! fid commits the data and performs the mount, and unlinking the file
//! detaches the mount. All fids over one controller share the same state,
//! so a mount created through one fid can be torn down through another.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Kind, Result};
use crate::fsys::FsId;
use crate::ninep::{QTFILE, S_IFREG, UMASK_STRIP};

use super::meta::{Attr, Meta};
use super::{Ident, Node, OpenFlags};

/// The controller's on-wire configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountData {
    /// Multiaddr of the content resolver's API endpoint.
    #[serde(rename = "ApiMaddr")]
    pub api_maddr: String,
    /// Host path the filesystem should appear under.
    #[serde(rename = "Target")]
    pub target: String,
}

/// Unmount callback; callable exactly once per mount cycle.
pub type Detach = Box<dyn FnOnce() -> Result<()> + Send>;

/// The seam between controllers and the host adapter. The production
/// implementation dials the resolver, constructs the content filesystem for
/// the ID, and mounts it; tests substitute recorders.
#[async_trait]
pub trait Attacher: Send + Sync {
    async fn attach(&self, fsid: FsId, data: &MountData) -> Result<Detach>;
}

#[derive(Default)]
struct ControlState {
    /// Bytes staged by contiguous writes, consumed at close.
    buffer: Vec<u8>,
    /// Lazily encoded read view of `data`; dropped when new data commits.
    snapshot: Option<Vec<u8>>,
    data: MountData,
    detach: Option<Detach>,
}

/// A mount controller file.
pub struct MountFile {
    meta: Meta,
    name: String,
    fsid: FsId,
    attacher: Arc<dyn Attacher>,
    state: Mutex<ControlState>,
}

impl MountFile {
    pub fn new(
        parent: &super::NodeRef,
        name: &str,
        fsid: FsId,
        attacher: Arc<dyn Attacher>,
        mode: u32,
        ident: Ident,
    ) -> Arc<MountFile> {
        let mode = S_IFREG | (mode & 0o7777 & !UMASK_STRIP);
        Arc::new(MountFile {
            meta: Meta::new(
                Some(parent.meta().counter()),
                QTFILE,
                Some(Arc::downgrade(parent)),
                Attr::new(mode, ident.uid, ident.gid),
            ),
            name: name.to_string(),
            fsid,
            attacher,
            state: Mutex::new(ControlState::default()),
        })
    }

    pub fn fsid(&self) -> FsId {
        self.fsid
    }

    /// Best-effort removal of this controller from its parent after a
    /// failed mount. Failure to self-unlink is logged and swallowed; the
    /// mount error stays the primary result.
    async fn remove_self(&self) {
        let Some(parent) = self.meta.parent() else {
            return;
        };
        if let Err(err) = parent.unlink_at(&self.name, 0).await {
            warn!(name = %self.name, %err, "could not unlink controller after mount failure");
        }
    }

    /// Calls the stored detach callback on a blocking worker, since
    /// unmounting performs syscalls that may stall.
    async fn run_detach(detach: Detach) -> Result<()> {
        tokio::task::spawn_blocking(detach)
            .await
            .map_err(|err| Error::wrap(Kind::Io, "detach worker failed", err))?
    }
}

#[async_trait]
impl Node for MountFile {
    fn meta(&self) -> &Meta {
        &self.meta
    }

    async fn open(&self, flags: OpenFlags) -> Result<()> {
        if flags.writable() && flags.truncate() {
            let mut state = self.state.lock().await;
            state.buffer.clear();
        }
        Ok(())
    }

    /// Serves the JSON view of the committed mount data, not the write
    /// buffer.
    async fn read_at(&self, offset: u64, count: u32) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        if state.snapshot.is_none() {
            let encoded = serde_json::to_vec(&state.data)
                .map_err(|err| Error::wrap(Kind::Io, "could not encode mount data", err))?;
            self.meta.set_size(encoded.len() as u64);
            state.snapshot = Some(encoded);
        }
        let snapshot = state.snapshot.as_deref().unwrap_or_default();
        let start = (offset as usize).min(snapshot.len());
        let end = (start + count as usize).min(snapshot.len());
        Ok(snapshot[start..end].to_vec())
    }

    /// Accepts only contiguous appends: `offset` must equal the bytes
    /// already staged.
    async fn write_at(&self, offset: u64, data: &[u8]) -> Result<u32> {
        let mut state = self.state.lock().await;
        if offset != state.buffer.len() as u64 {
            return Err(Error::msg(
                Kind::InvalidItem,
                format!("write at {offset} but {} bytes staged", state.buffer.len()),
            ));
        }
        state.buffer.extend_from_slice(data);
        self.meta.set_size(state.buffer.len() as u64);
        Ok(data.len() as u32)
    }

    /// Commit point: a non-empty buffer is parsed as JSON, the read
    /// snapshot is invalidated, and the mount is attempted. The buffer is
    /// consumed whether or not any of that succeeds.
    async fn close(&self, _flags: OpenFlags) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.buffer.is_empty() {
            return Ok(());
        }
        let raw = std::mem::take(&mut state.buffer);

        let data: MountData = match serde_json::from_slice(&raw) {
            Ok(data) => data,
            Err(err) => {
                return Err(Error::wrap(Kind::InvalidItem, "mount data is not valid JSON", err))
            }
        };
        state.data = data;
        state.snapshot = None;

        // A previous mount cycle ends before the next begins.
        if let Some(detach) = state.detach.take() {
            if let Err(err) = Self::run_detach(detach).await {
                warn!(name = %self.name, %err, "detach of previous mount failed");
            }
        }

        info!(name = %self.name, fsid = %self.fsid, mountpoint = %state.data.target, "mounting");
        match self.attacher.attach(self.fsid, &state.data).await {
            Ok(detach) => {
                state.detach = Some(detach);
                Ok(())
            }
            Err(err) => {
                drop(state);
                self.remove_self().await;
                Err(Error::wrap(Kind::Io, "mount failed", err))
            }
        }
    }

    /// Unlink tears down the active mount, if any, and reports the detach
    /// error to the unlinking client.
    async fn unlinked(&self) -> Result<()> {
        let detach = self.state.lock().await.detach.take();
        match detach {
            Some(detach) => {
                info!(name = %self.name, fsid = %self.fsid, "unmounting");
                Self::run_detach(detach).await
            }
            None => Ok(()),
        }
    }
}
