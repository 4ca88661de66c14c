//! mount9, a 9P2000.L file server whose tree is a mount control plane.
//!
//! Clients navigate the served tree with ordinary file operations:
//! `mkdir` under `/mounts` selects a host API and a filesystem ID,
//! `create`+`write`+`close` on a controller file performs a host FUSE
//! mount of the described content-addressed filesystem, and `unlink`
//! tears it down. Active listeners appear under `/listeners`, one file
//! per endpoint.

pub mod config;
pub mod error;
pub mod fsys;
pub mod maddr;
pub mod ninep;
pub mod nodes;
pub mod server;

#[cfg(unix)]
pub mod fuse;

#[cfg(unix)]
use std::sync::Arc;

pub use config::Settings;
pub use error::{Error, Kind, Result};
pub use server::Server;

/// Builds a server whose controllers mount through the host FUSE adapter.
#[cfg(unix)]
pub fn host_server(settings: &Settings) -> Server {
    let attacher = Arc::new(fuse::HostAttacher::new(
        settings.timeout(),
        fuse::MountConfig {
            uid: settings.uid,
            gid: settings.gid,
            fs_name: None,
            options: settings.mount_options.clone(),
            probe_deadline: settings.probe_timeout(),
            handle_max: settings.handle_max,
        },
    ));
    Server::new(attacher, settings.ident())
}
