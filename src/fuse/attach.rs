//! Mounting and unmounting against the host kernel.
//!
//! [`Host`] drives the FUSE library: it assembles mount options, spawns
//! the session, probes the mountpoint until the kernel actually serves it,
//! and hands back a detach handle. [`HostAttacher`] is the production
//! implementation of the controller-side [`Attacher`] seam: dial the
//! resolver, construct the content filesystem for the ID, mount it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use fuser::{BackgroundSession, MountOption};
use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{Error, Kind, Result};
use crate::fsys::{self, ApiClient, FileSystem, FsId};
use crate::maddr::Multiaddr;
use crate::nodes::{Attacher, Detach, MountData};

use super::Bridge;

/// Alphabet for the readiness marker: base58, so the name is short and
/// never needs escaping.
const MARKER_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Default deadline for the readiness probe.
pub const PROBE_DEADLINE: Duration = Duration::from_secs(16);

/// Probe backoff bounds.
const PROBE_START: Duration = Duration::from_micros(1);
const PROBE_CAP: Duration = Duration::from_millis(500);

/// Some kernels release a mountpoint asynchronously after unmount; a
/// mount issued immediately afterwards can race that release.
const REMOUNT_DELAY: Duration = Duration::from_millis(128);

/// Per-mount parameters.
#[derive(Debug, Clone)]
pub struct MountConfig {
    pub uid: u32,
    pub gid: u32,
    /// Filesystem name reported to the kernel.
    pub fs_name: Option<String>,
    /// When set, these raw options are used verbatim instead of the
    /// assembled defaults.
    pub options: Option<Vec<String>>,
    pub probe_deadline: Duration,
    /// Bound on the per-mount open-handle table.
    pub handle_max: usize,
}

impl Default for MountConfig {
    fn default() -> Self {
        MountConfig {
            uid: 0,
            gid: 0,
            fs_name: None,
            options: None,
            probe_deadline: PROBE_DEADLINE,
            handle_max: super::handles::HANDLE_MAX,
        }
    }
}

/// Host-side mount state shared across mounts: remembers the last unmount
/// so back-to-back cycles do not race the kernel.
pub struct Host {
    last_unmount: Arc<Mutex<Option<Instant>>>,
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl Host {
    pub fn new() -> Host {
        Host { last_unmount: Arc::new(Mutex::new(None)) }
    }

    /// Mounts `fs` at `target` and blocks until the kernel serves it (or
    /// the probe deadline passes, in which case the session is torn down
    /// and the timeout surfaced).
    pub fn mount(
        &self,
        fs: Arc<dyn FileSystem>,
        target: &Path,
        cfg: &MountConfig,
    ) -> Result<Mounted> {
        self.remount_delay();

        let marker = probe_marker();
        let bridge = Bridge::new(fs, marker.clone(), cfg.uid, cfg.gid, cfg.handle_max);
        let options = mount_options(cfg);
        debug!(mountpoint = %target.display(), ?options, "mounting");

        let session = match catch_unwind(AssertUnwindSafe(|| {
            fuser::spawn_mount2(bridge, target, &options)
        })) {
            Ok(Ok(session)) => session,
            Ok(Err(err)) => return Err(classify_mount_error(err)),
            Err(panic) => return Err(classify_mount_panic(panic)),
        };

        if let Err(err) = probe(target, &marker, cfg.probe_deadline) {
            warn!(mountpoint = %target.display(), %err, "mount probe failed, tearing down");
            drop(session);
            note_unmount(&self.last_unmount);
            return Err(err);
        }

        info!(mountpoint = %target.display(), "mounted");
        Ok(Mounted {
            session: Some(session),
            target: target.to_path_buf(),
            last_unmount: Arc::clone(&self.last_unmount),
        })
    }

    fn remount_delay(&self) {
        let since = (*self.last_unmount.lock()).map(|at| at.elapsed());
        if let Some(since) = since {
            if since < REMOUNT_DELAY {
                std::thread::sleep(REMOUNT_DELAY - since);
            }
        }
    }
}

fn note_unmount(last_unmount: &Mutex<Option<Instant>>) {
    *last_unmount.lock() = Some(Instant::now());
}

/// An active mount. Detaching (or dropping) unmounts.
pub struct Mounted {
    session: Option<BackgroundSession>,
    target: PathBuf,
    last_unmount: Arc<Mutex<Option<Instant>>>,
}

impl Mounted {
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Unmounts. The FUSE library performs the unmount as the session is
    /// dropped; failures there are logged by the library rather than
    /// returned, so the observable contract is that the session has ended.
    pub fn detach(mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            info!(mountpoint = %self.target.display(), "unmounting");
            drop(session);
            note_unmount(&self.last_unmount);
        }
        Ok(())
    }
}

impl Drop for Mounted {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            drop(session);
            note_unmount(&self.last_unmount);
        }
    }
}

/// The production attacher: dial, construct, mount.
pub struct HostAttacher {
    host: Arc<Host>,
    api_timeout: Duration,
    config: MountConfig,
}

impl HostAttacher {
    pub fn new(api_timeout: Duration, config: MountConfig) -> HostAttacher {
        HostAttacher { host: Arc::new(Host::new()), api_timeout, config }
    }
}

#[async_trait]
impl Attacher for HostAttacher {
    async fn attach(&self, fsid: FsId, data: &MountData) -> Result<Detach> {
        if data.target.is_empty() {
            return Err(Error::msg(Kind::InvalidItem, "mount target is empty"));
        }
        let maddr: Multiaddr = data.api_maddr.parse()?;
        let target = PathBuf::from(&data.target);
        let host = Arc::clone(&self.host);
        let api_timeout = self.api_timeout;
        let mut config = self.config.clone();
        if config.fs_name.is_none() {
            config.fs_name = Some(fsid.to_string());
        }

        let mounted = tokio::task::spawn_blocking(move || -> Result<Mounted> {
            let client = Arc::new(ApiClient::dial(&maddr, api_timeout)?);
            // One round-trip up front so an unreachable resolver fails the
            // mount instead of the first kernel operation.
            client.version()?;
            let fs = fsys::construct(client, fsid);
            host.mount(fs, &target, &config)
        })
        .await
        .map_err(|err| Error::wrap(Kind::Io, "mount worker failed", err))??;

        Ok(Box::new(move || mounted.detach()))
    }
}

/// Short random marker name in the base58 alphabet.
fn probe_marker() -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(8..=9);
    (0..len).map(|_| MARKER_ALPHABET[rng.gen_range(0..MARKER_ALPHABET.len())] as char).collect()
}

/// Polls the marker path until the kernel answers, backing off
/// exponentially with jitter up to the cap.
fn probe(target: &Path, marker: &str, deadline: Duration) -> Result<()> {
    let started = Instant::now();
    let mut wait = PROBE_START;
    let path = target.join(marker);
    loop {
        if std::fs::symlink_metadata(&path).is_ok() {
            return Ok(());
        }
        if started.elapsed() >= deadline {
            // The mount may still complete later; the operator decides
            // what to do with the mountpoint.
            return Err(Error::msg(
                Kind::Io,
                format!("mount of {} not ready within {deadline:?}", target.display()),
            ));
        }
        std::thread::sleep(jittered(wait));
        wait = (wait * 2).min(PROBE_CAP);
    }
}

/// Applies ±10% jitter.
fn jittered(wait: Duration) -> Duration {
    let nanos = wait.as_nanos().max(1) as u64;
    let spread = (nanos / 10).max(1);
    let offset = rand::thread_rng().gen_range(0..=spread * 2);
    Duration::from_nanos(nanos - spread + offset)
}

/// Assembles the option vector: explicit raw options win outright,
/// otherwise ownership overrides plus the filesystem name.
fn mount_options(cfg: &MountConfig) -> Vec<MountOption> {
    if let Some(raw) = &cfg.options {
        return raw.iter().map(|option| MountOption::CUSTOM(option.clone())).collect();
    }
    let mut options = vec![
        MountOption::CUSTOM(format!("uid={}", cfg.uid)),
        MountOption::CUSTOM(format!("gid={}", cfg.gid)),
    ];
    if let Some(name) = &cfg.fs_name {
        options.push(MountOption::FSName(name.clone()));
        options.push(MountOption::Subtype(name.clone()));
    }
    options
}

/// Distinguishes "the FUSE backend is not installed" from other mount
/// failures, with an operator-directed message for the former.
fn classify_mount_error(err: std::io::Error) -> Error {
    let text = err.to_string();
    if err.kind() == std::io::ErrorKind::NotFound
        || text.contains("fusermount")
        || text.contains("cannot find FUSE")
        || text.contains("macfuse")
        || text.contains("osxfuse")
    {
        Error::wrap(
            Kind::InvalidOperation,
            "the host FUSE backend is unavailable; install it and retry the mount",
            err,
        )
    } else {
        Error::wrap(Kind::Io, "mount failed", err)
    }
}

fn classify_mount_panic(panic: Box<dyn std::any::Any + Send>) -> Error {
    let text = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "opaque panic payload".to_string());
    if text.contains("cannot find FUSE") || text.contains("winfsp") {
        Error::msg(
            Kind::InvalidOperation,
            "the host FUSE backend is unavailable; install it and retry the mount",
        )
    } else {
        Error::msg(Kind::Io, format!("mount panicked: {text}"))
    }
}
