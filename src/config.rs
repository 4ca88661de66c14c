//! Server settings.
//!
//! Deserialized from TOML with per-field defaults; the demo binary layers
//! command-line flags on top. The library itself never reads files unless
//! asked to.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Kind, Result};
use crate::nodes::Ident;

/// Default multiaddr of the content resolver's API.
pub const DEFAULT_API: &str = "/ip4/127.0.0.1/tcp/5001";

/// Default deadline for one remote call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for the mount readiness probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(16);

/// Default bound on each mount's open-handle table.
pub const DEFAULT_HANDLE_MAX: usize = 4096;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Multiaddrs to serve 9P on.
    pub listen: Vec<String>,
    /// Default content-resolver API multiaddr (controllers may override
    /// it per mount).
    pub api: String,
    /// Deadline for one remote call, in seconds.
    pub timeout_secs: u64,
    /// Deadline for the mount readiness probe, in seconds.
    pub probe_timeout_secs: u64,
    /// Identity stamped on created nodes and host mounts.
    pub uid: u32,
    pub gid: u32,
    /// Raw mount options, used verbatim when set.
    pub mount_options: Option<Vec<String>>,
    /// Bound on each mount's open-handle table.
    pub handle_max: usize,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            listen: vec!["/ip4/127.0.0.1/tcp/564".to_string()],
            api: DEFAULT_API.to_string(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            probe_timeout_secs: DEFAULT_PROBE_TIMEOUT.as_secs(),
            uid: default_uid(),
            gid: default_gid(),
            mount_options: None,
            handle_max: DEFAULT_HANDLE_MAX,
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file.
    pub fn load(path: &Path) -> Result<Settings> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::wrap(Kind::Io, format!("cannot read {}", path.display()), err))?;
        toml::from_str(&text)
            .map_err(|err| Error::wrap(Kind::InvalidItem, format!("bad config {}", path.display()), err))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn ident(&self) -> Ident {
        Ident { uid: self.uid, gid: self.gid }
    }
}

#[cfg(unix)]
fn default_uid() -> u32 {
    // SAFETY: geteuid has no failure modes or preconditions.
    unsafe { libc::geteuid() }
}

#[cfg(unix)]
fn default_gid() -> u32 {
    // SAFETY: getegid has no failure modes or preconditions.
    unsafe { libc::getegid() }
}

#[cfg(not(unix))]
fn default_uid() -> u32 {
    0
}

#[cfg(not(unix))]
fn default_gid() -> u32 {
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_missing_fields() {
        let settings: Settings = toml::from_str("listen = [\"/ip4/0.0.0.0/tcp/9999\"]").unwrap();
        assert_eq!(settings.listen, vec!["/ip4/0.0.0.0/tcp/9999"]);
        assert_eq!(settings.api, DEFAULT_API);
        assert_eq!(settings.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(settings.handle_max, DEFAULT_HANDLE_MAX);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(toml::from_str::<Settings>("listne = []").is_err());
    }
}
