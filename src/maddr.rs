//! Multiaddr parsing for listener endpoints and API addresses.
//!
//! Only the component set this server actually dials is implemented:
//! `ip4`, `ip6`, `dns`, `dns4`, `dns6`, `tcp`, and `unix`.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Kind, Result};

/// One protocol component of a multiaddr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    Ip4(Ipv4Addr),
    Ip6(Ipv6Addr),
    Dns(String),
    Dns4(String),
    Dns6(String),
    Tcp(u16),
    /// The value is the socket path, without the leading component name.
    Unix(PathBuf),
}

impl Protocol {
    fn name(&self) -> &'static str {
        match self {
            Protocol::Ip4(_) => "ip4",
            Protocol::Ip6(_) => "ip6",
            Protocol::Dns(_) => "dns",
            Protocol::Dns4(_) => "dns4",
            Protocol::Dns6(_) => "dns6",
            Protocol::Tcp(_) => "tcp",
            Protocol::Unix(_) => "unix",
        }
    }

    fn value(&self) -> String {
        match self {
            Protocol::Ip4(a) => a.to_string(),
            Protocol::Ip6(a) => a.to_string(),
            Protocol::Dns(h) | Protocol::Dns4(h) | Protocol::Dns6(h) => h.clone(),
            Protocol::Tcp(p) => p.to_string(),
            Protocol::Unix(p) => p.to_string_lossy().into_owned(),
        }
    }
}

/// A parsed multiaddr: an ordered list of protocol components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multiaddr {
    parts: Vec<Protocol>,
}

impl Multiaddr {
    pub fn parts(&self) -> &[Protocol] {
        &self.parts
    }

    /// Flattens the address into path components, one per protocol name and
    /// one per value. `/ip4/127.0.0.1/tcp/564` becomes
    /// `["ip4", "127.0.0.1", "tcp", "564"]`.
    pub fn components(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.parts.len() * 2);
        for part in &self.parts {
            out.push(part.name().to_string());
            match part {
                // Socket paths contribute one component per path element so
                // the listener tree stays navigable.
                Protocol::Unix(path) => {
                    for piece in path.to_string_lossy().split('/').filter(|p| !p.is_empty()) {
                        out.push(piece.to_string());
                    }
                }
                other => out.push(other.value()),
            }
        }
        out
    }

    /// Host/port pair for TCP-reachable addresses.
    pub fn tcp_endpoint(&self) -> Option<(String, u16)> {
        let mut host = None;
        let mut port = None;
        for part in &self.parts {
            match part {
                Protocol::Ip4(a) => host = Some(a.to_string()),
                Protocol::Ip6(a) => host = Some(format!("[{a}]")),
                Protocol::Dns(h) | Protocol::Dns4(h) | Protocol::Dns6(h) => host = Some(h.clone()),
                Protocol::Tcp(p) => port = Some(*p),
                Protocol::Unix(_) => return None,
            }
        }
        Some((host?, port?))
    }

    /// Socket path for `unix`-scheme addresses.
    pub fn unix_path(&self) -> Option<&Path> {
        self.parts.iter().find_map(|part| match part {
            Protocol::Unix(path) => Some(path.as_path()),
            _ => None,
        })
    }

    /// Rewrites the TCP port, used to report the effective port after
    /// binding to port 0.
    pub fn with_tcp_port(&self, port: u16) -> Multiaddr {
        let parts = self
            .parts
            .iter()
            .map(|part| match part {
                Protocol::Tcp(_) => Protocol::Tcp(port),
                other => other.clone(),
            })
            .collect();
        Multiaddr { parts }
    }
}

impl FromStr for Multiaddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Multiaddr> {
        let rest = s
            .strip_prefix('/')
            .ok_or_else(|| Error::msg(Kind::InvalidItem, format!("multiaddr must start with '/': {s}")))?;

        let mut pieces = rest.split('/');
        let mut parts = Vec::new();
        while let Some(name) = pieces.next() {
            if name.is_empty() {
                continue;
            }
            let part = match name {
                "ip4" => {
                    let v = value_of(&mut pieces, name)?;
                    Protocol::Ip4(v.parse().map_err(|_| bad_value("ip4", v))?)
                }
                "ip6" => {
                    let v = value_of(&mut pieces, name)?;
                    Protocol::Ip6(v.parse().map_err(|_| bad_value("ip6", v))?)
                }
                "dns" => Protocol::Dns(value_of(&mut pieces, name)?.to_string()),
                "dns4" => Protocol::Dns4(value_of(&mut pieces, name)?.to_string()),
                "dns6" => Protocol::Dns6(value_of(&mut pieces, name)?.to_string()),
                "tcp" => {
                    let v = value_of(&mut pieces, name)?;
                    Protocol::Tcp(v.parse().map_err(|_| bad_value("tcp", v))?)
                }
                // Everything after /unix/ is the socket path.
                "unix" => {
                    let path: Vec<&str> = pieces.by_ref().collect();
                    if path.is_empty() {
                        return Err(Error::msg(Kind::InvalidItem, "unix component missing path"));
                    }
                    Protocol::Unix(PathBuf::from(format!("/{}", path.join("/"))))
                }
                other => {
                    return Err(Error::msg(
                        Kind::InvalidItem,
                        format!("unsupported multiaddr component: {other}"),
                    ))
                }
            };
            parts.push(part);
        }

        if parts.is_empty() {
            return Err(Error::msg(Kind::InvalidItem, "empty multiaddr"));
        }
        Ok(Multiaddr { parts })
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in &self.parts {
            match part {
                Protocol::Unix(path) => write!(f, "/unix{}", path.display())?,
                other => write!(f, "/{}/{}", other.name(), other.value())?,
            }
        }
        Ok(())
    }
}

fn value_of<'a>(pieces: &mut std::str::Split<'a, char>, name: &str) -> Result<&'a str> {
    pieces.next().filter(|v| !v.is_empty()).ok_or_else(|| {
        Error::msg(Kind::InvalidItem, format!("multiaddr component {name} missing value"))
    })
}

fn bad_value(component: &str, value: &str) -> Error {
    Error::msg(Kind::InvalidItem, format!("bad {component} value: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_address() {
        let maddr: Multiaddr = "/ip4/127.0.0.1/tcp/564".parse().unwrap();
        assert_eq!(maddr.tcp_endpoint(), Some(("127.0.0.1".to_string(), 564)));
        assert_eq!(maddr.components(), vec!["ip4", "127.0.0.1", "tcp", "564"]);
        assert_eq!(maddr.to_string(), "/ip4/127.0.0.1/tcp/564");
    }

    #[test]
    fn parses_unix_address() {
        let maddr: Multiaddr = "/unix/tmp/api.sock".parse().unwrap();
        assert_eq!(maddr.unix_path(), Some(Path::new("/tmp/api.sock")));
        assert_eq!(maddr.components(), vec!["unix", "tmp", "api.sock"]);
        assert!(maddr.tcp_endpoint().is_none());
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in ["ip4/1.2.3.4", "/ip4", "/ip4/999.0.0.1/tcp/1", "/tcp/banana", "/quic/1"] {
            assert!(bad.parse::<Multiaddr>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn rewrites_bound_port() {
        let maddr: Multiaddr = "/ip4/0.0.0.0/tcp/0".parse().unwrap();
        let bound = maddr.with_tcp_port(49152);
        assert_eq!(bound.tcp_endpoint(), Some(("0.0.0.0".to_string(), 49152)));
    }
}
