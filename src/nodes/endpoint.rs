//! Listener endpoint files.
//!
//! One file per active network listener; reading it yields the listener's
//! multiaddr. Teardown funnels through a swap-once close cell so that the
//! unlink path and server shutdown cannot double-close the listener.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::error::Result;
use crate::ninep::{QTFILE, S_IFREG};

use super::meta::{Attr, Meta};
use super::{Ident, Node};

/// Callback that closes the underlying listener.
pub type CloseFn = Box<dyn FnOnce() + Send>;

/// A read-only file representing one live listener.
pub struct Endpoint {
    meta: Meta,
    address: String,
    closed: Arc<AtomicBool>,
    close: Mutex<Option<CloseFn>>,
}

impl Endpoint {
    pub fn new(
        counter: Arc<AtomicU64>,
        parent: Weak<dyn Node>,
        ident: Ident,
        address: String,
        closed: Arc<AtomicBool>,
        close: CloseFn,
    ) -> Arc<Endpoint> {
        let mut attr = Attr::new(S_IFREG | 0o444, ident.uid, ident.gid);
        attr.size = address.len() as u64;
        Arc::new(Endpoint {
            meta: Meta::new(Some(counter), QTFILE, Some(parent), attr),
            address,
            closed,
            close: Mutex::new(Some(close)),
        })
    }

    /// Marks the listener closed and runs the close callback, exactly once.
    pub fn close_endpoint(&self) {
        let callback = self.close.lock().take();
        if let Some(callback) = callback {
            self.closed.store(true, Ordering::SeqCst);
            info!(address = %self.address, "closing listener");
            callback();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Node for Endpoint {
    fn meta(&self) -> &Meta {
        &self.meta
    }

    async fn read_at(&self, offset: u64, count: u32) -> Result<Vec<u8>> {
        let bytes = self.address.as_bytes();
        let start = (offset as usize).min(bytes.len());
        let end = (start + count as usize).min(bytes.len());
        Ok(bytes[start..end].to_vec())
    }

    async fn unlinked(&self) -> Result<()> {
        self.close_endpoint();
        Ok(())
    }
}
