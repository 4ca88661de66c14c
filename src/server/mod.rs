//! The 9P server: listeners, connections, and the tree they serve.
//!
//! A [`Server`] owns one node tree with `listeners/` and `mounts/` at the
//! root. Each `listen` call binds a multiaddr, registers an endpoint file
//! under `listeners/` (with ephemeral directories for the address
//! components), and starts an accept loop; each accepted connection runs
//! the read/dispatch/write task pipeline. `serve` returns once every
//! listener has closed and every connection handler has finished.

mod dispatch;
mod read_task;
mod stream_writer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, UnixListener};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info};

use crate::error::{Error, Kind, Result};
use crate::maddr::Multiaddr;
use crate::nodes::{
    Attacher, Directory, Endpoint, EphemeralDir, Ident, Mounter, NodeRef,
};

pub use dispatch::Dispatcher;
pub use read_task::{Incoming, ReadTask};
pub use stream_writer::StreamWriter;

/// Queue depth between the connection tasks.
const CHANNEL_DEPTH: usize = 32;

/// The server and its tree.
pub struct Server {
    root: NodeRef,
    listeners_dir: NodeRef,
    ident: Ident,
    accept_tasks: Mutex<Vec<JoinHandle<()>>>,
    endpoints: parking_lot::Mutex<Vec<Arc<Endpoint>>>,
}

impl Server {
    /// Builds the tree: `/`, `/listeners`, and `/mounts` wired to the
    /// given host adapter.
    pub fn new(attacher: Arc<dyn Attacher>, ident: Ident) -> Server {
        let root: NodeRef = Directory::root(ident);
        let listeners_dir: NodeRef = Directory::new(&root, 0o755, ident);
        let mounts: NodeRef = Mounter::new(&root, attacher, ident);
        // The tree is empty at this point; the links cannot collide.
        let _ = root.link("listeners", listeners_dir.clone());
        let _ = root.link("mounts", mounts);
        Server {
            root,
            listeners_dir,
            ident,
            accept_tasks: Mutex::new(Vec::new()),
            endpoints: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> NodeRef {
        self.root.clone()
    }

    /// Binds `maddr`, registers its endpoint file, and starts accepting.
    /// Returns the effective address (with the bound port filled in).
    pub async fn listen(&self, maddr: &Multiaddr) -> Result<Multiaddr> {
        let (listener, effective) = Listener::bind(maddr).await?;

        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());
        let endpoint = self.register_endpoint(&effective, closed.clone(), {
            let closed = closed.clone();
            let shutdown = shutdown.clone();
            let socket_path = effective.unix_path().map(|p| p.to_path_buf());
            Box::new(move || {
                closed.store(true, Ordering::SeqCst);
                // notify_one stores a permit, so a close that lands before
                // the accept loop first waits is not lost.
                shutdown.notify_one();
                if let Some(path) = socket_path {
                    let _ = std::fs::remove_file(path);
                }
            })
        })?;
        self.endpoints.lock().push(endpoint);

        info!(address = %effective, "listening");
        let root = self.root.clone();
        let ident = self.ident;
        let handle = tokio::spawn(accept_loop(listener, root, ident, closed, shutdown));
        self.accept_tasks.lock().await.push(handle);
        Ok(effective)
    }

    /// Waits for every accept loop (and through them, every connection
    /// handler) to finish.
    pub async fn serve(&self) -> Result<()> {
        loop {
            let handle = self.accept_tasks.lock().await.pop();
            match handle {
                Some(handle) => {
                    handle.await.map_err(|err| Error::wrap(Kind::Io, "accept task failed", err))?
                }
                None => return Ok(()),
            }
        }
    }

    /// Closes every registered endpoint; `serve` then drains.
    pub fn shutdown(&self) {
        for endpoint in self.endpoints.lock().drain(..) {
            endpoint.close_endpoint();
        }
    }

    /// Creates `listeners/<component>/.../<leaf>` for the address, with
    /// ephemeral directories on the way so teardown collapses them.
    fn register_endpoint(
        &self,
        maddr: &Multiaddr,
        closed: Arc<AtomicBool>,
        close: Box<dyn FnOnce() + Send>,
    ) -> Result<Arc<Endpoint>> {
        let components = maddr.components();
        let (leaf, dirs) = components
            .split_last()
            .ok_or_else(|| Error::msg(Kind::InvalidItem, "empty listener address"))?;

        let mut node: NodeRef = self.listeners_dir.clone();
        for component in dirs {
            node = match node.child(component) {
                Ok(child) => child,
                Err(err) if err.kind() == Kind::NotExist => {
                    let dir = EphemeralDir::new(&node, component, 0o755, self.ident);
                    match node.link(component, dir.clone()) {
                        Ok(()) => dir,
                        // A concurrent registration created it first.
                        Err(err) if err.kind() == Kind::Exist => node.child(component)?,
                        Err(err) => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            };
        }

        let endpoint = Endpoint::new(
            node.meta().counter(),
            Arc::downgrade(&node),
            self.ident,
            maddr.to_string(),
            closed,
            close,
        );
        node.link(leaf, endpoint.clone())?;
        Ok(endpoint)
    }
}

enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

impl Listener {
    async fn bind(maddr: &Multiaddr) -> Result<(Listener, Multiaddr)> {
        if let Some(path) = maddr.unix_path() {
            let listener = UnixListener::bind(path)
                .map_err(|err| Error::wrap(Kind::Io, format!("cannot bind {maddr}"), err))?;
            return Ok((Listener::Unix(listener), maddr.clone()));
        }
        let (host, port) = maddr
            .tcp_endpoint()
            .ok_or_else(|| Error::msg(Kind::InvalidItem, format!("cannot listen on {maddr}")))?;
        let listener = TcpListener::bind((host.trim_matches(&['[', ']'][..]), port))
            .await
            .map_err(|err| Error::wrap(Kind::Io, format!("cannot bind {maddr}"), err))?;
        let effective = match listener.local_addr() {
            Ok(addr) => maddr.with_tcp_port(addr.port()),
            Err(_) => maddr.clone(),
        };
        Ok((Listener::Tcp(listener), effective))
    }

    async fn accept(
        &self,
    ) -> std::io::Result<(
        Box<dyn AsyncRead + Send + Unpin>,
        Box<dyn AsyncWrite + Send + Unpin>,
    )> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, _) = listener.accept().await?;
                stream.set_nodelay(true)?;
                let (read, write) = stream.into_split();
                Ok((Box::new(read), Box::new(write)))
            }
            Listener::Unix(listener) => {
                let (stream, _) = listener.accept().await?;
                let (read, write) = stream.into_split();
                Ok((Box::new(read), Box::new(write)))
            }
        }
    }
}

/// Accepts connections until the endpoint closes, then waits for the
/// connection handlers it spawned.
async fn accept_loop(
    listener: Listener,
    root: NodeRef,
    ident: Ident,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    let mut handlers = JoinSet::new();
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            accepted = listener.accept() => match accepted {
                Ok((read, write)) => {
                    handlers.spawn(handle_connection(read, write, root.clone(), ident));
                }
                Err(err) => {
                    // An intentional close surfaces as an accept error on
                    // some platforms; anything else is a handler error.
                    if !closed.load(Ordering::SeqCst) {
                        error!(%err, "accept failed");
                    }
                    break;
                }
            },
        }
    }
    drop(listener);
    while handlers.join_next().await.is_some() {}
}

/// Wires one connection's task pipeline and waits for it to drain.
async fn handle_connection(
    read: Box<dyn AsyncRead + Send + Unpin>,
    write: Box<dyn AsyncWrite + Send + Unpin>,
    root: NodeRef,
    ident: Ident,
) {
    let (request_tx, request_rx) = mpsc::channel(CHANNEL_DEPTH);
    let (reply_tx, reply_rx) = mpsc::channel(CHANNEL_DEPTH);

    let reader = ReadTask::spawn(read, request_tx);
    let dispatcher = Dispatcher::spawn(root, ident, request_rx, reply_tx);
    let writer = StreamWriter::spawn(write, reply_rx);

    let _ = reader.await;
    let _ = dispatcher.await;
    let _ = writer.await;
}
