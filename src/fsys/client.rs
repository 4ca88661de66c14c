//! IPFS HTTP API client.
//!
//! The API is reached through a multiaddr: TCP- and DNS-addressed
//! endpoints go through `ureq`, `unix`-scheme endpoints speak HTTP/1.1
//! over an `AF_UNIX` stream with a synthetic host header. Every call is
//! bounded by the configured operation timeout. All API endpoints are
//! POST, per the API's convention.

use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Kind, Result};
use crate::maddr::Multiaddr;

/// Largest response body the client will buffer.
const MAX_BODY: usize = 64 * 1024 * 1024;

enum Endpoint {
    Http { agent: ureq::Agent, base: String },
    Unix { path: PathBuf },
}

/// A dialed API endpoint.
pub struct ApiClient {
    endpoint: Endpoint,
    timeout: Duration,
}

impl ApiClient {
    /// Resolves the multiaddr into a reachable endpoint. DNS-capable
    /// components are left to the HTTP layer to resolve at request time.
    pub fn dial(maddr: &Multiaddr, timeout: Duration) -> Result<ApiClient> {
        if let Some(path) = maddr.unix_path() {
            return Ok(ApiClient {
                endpoint: Endpoint::Unix { path: path.to_path_buf() },
                timeout,
            });
        }
        let (host, port) = maddr.tcp_endpoint().ok_or_else(|| {
            Error::msg(Kind::InvalidItem, format!("cannot dial API multiaddr: {maddr}"))
        })?;
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Ok(ApiClient { endpoint: Endpoint::Http { agent, base: format!("http://{host}:{port}") }, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Issues one API call and returns the raw response body.
    fn call(&self, api_path: &str, args: &[(&str, String)]) -> Result<Vec<u8>> {
        debug!(api_path, "api call");
        match &self.endpoint {
            Endpoint::Http { agent, base } => {
                let mut request = agent.post(&format!("{base}{api_path}"));
                for (key, value) in args {
                    request = request.query(key, value);
                }
                match request.call() {
                    Ok(response) => read_body(response.into_reader()),
                    Err(ureq::Error::Status(code, response)) => {
                        let body = read_body(response.into_reader()).unwrap_or_default();
                        Err(api_error(code, &body))
                    }
                    Err(ureq::Error::Transport(err)) => {
                        Err(Error::wrap(Kind::Io, "api transport failure", err))
                    }
                }
            }
            Endpoint::Unix { path } => unix_post(path, api_path, args, self.timeout),
        }
    }

    fn call_json<T: DeserializeOwned>(&self, api_path: &str, args: &[(&str, String)]) -> Result<T> {
        let body = self.call(api_path, args)?;
        serde_json::from_slice(&body)
            .map_err(|err| Error::wrap(Kind::Io, format!("bad response from {api_path}"), err))
    }

    /// One cheap round-trip to verify the endpoint answers.
    pub fn version(&self) -> Result<String> {
        let response: VersionResponse = self.call_json("/api/v0/version", &[])?;
        Ok(response.version)
    }

    /// `files/stat` over an absolute content path such as `/ipfs/<cid>/a`.
    pub fn files_stat(&self, content_path: &str) -> Result<StatResponse> {
        self.call_json("/api/v0/files/stat", &[("arg", content_path.to_string())])
    }

    /// `ls` links of a directory-like content path.
    pub fn ls(&self, content_path: &str) -> Result<Vec<LsLink>> {
        let response: LsResponse = self.call_json(
            "/api/v0/ls",
            &[("arg", content_path.to_string()), ("resolve-type", "false".to_string())],
        )?;
        Ok(response.objects.into_iter().flat_map(|object| object.links).collect())
    }

    /// `cat` a byte range of a file-like content path.
    pub fn cat(&self, content_path: &str, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.call(
            "/api/v0/cat",
            &[
                ("arg", content_path.to_string()),
                ("offset", offset.to_string()),
                ("length", length.to_string()),
            ],
        )
    }

    /// Resolves an IPNS name to its current `/ipfs/...` path.
    pub fn name_resolve(&self, name: &str) -> Result<String> {
        let response: NameResolveResponse =
            self.call_json("/api/v0/name/resolve", &[("arg", name.to_string())])?;
        Ok(response.path)
    }

    /// Recursive pins, by content identifier.
    pub fn pin_ls(&self) -> Result<Vec<String>> {
        let response: PinLsResponse =
            self.call_json("/api/v0/pin/ls", &[("type", "recursive".to_string())])?;
        Ok(response.keys.into_keys().collect())
    }

    /// The node's keys: name and IPNS identity pairs.
    pub fn key_list(&self) -> Result<Vec<KeyInfo>> {
        let response: KeyListResponse = self.call_json("/api/v0/key/list", &[])?;
        Ok(response.keys)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatResponse {
    pub hash: String,
    pub size: u64,
    #[serde(default)]
    pub cumulative_size: u64,
    #[serde(rename = "Type")]
    pub typ: String,
    #[serde(default)]
    pub blocks: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsResponse {
    #[serde(default)]
    objects: Vec<LsObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LsObject {
    #[serde(default)]
    links: Vec<LsLink>,
}

/// One link out of a unixfs directory. `typ` follows the unixfs type
/// numbering: 1 and 5 are directory shapes, 4 is a symlink.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LsLink {
    pub name: String,
    pub hash: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "Type")]
    pub typ: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NameResolveResponse {
    path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PinLsResponse {
    #[serde(default)]
    keys: BTreeMap<String, PinInfo>,
}

/// Pin metadata is irrelevant here; the entry's presence is the datum.
#[derive(Debug, Deserialize)]
struct PinInfo {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyListResponse {
    #[serde(default)]
    keys: Vec<KeyInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyInfo {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Maps an API error payload onto the error taxonomy. The API reports
/// missing content with 500s, so classification leans on the message.
fn api_error(code: u16, body: &[u8]) -> Error {
    let message = serde_json::from_slice::<ApiError>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned());
    let kind = if message.contains("does not exist")
        || message.contains("no link named")
        || message.contains("not found")
        || message.contains("could not resolve")
    {
        Kind::NotExist
    } else if code == 403 {
        Kind::Permission
    } else {
        Kind::Io
    };
    Error::msg(kind, format!("api error {code}: {message}"))
}

fn read_body(reader: impl Read) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    reader
        .take(MAX_BODY as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|err| Error::wrap(Kind::Io, "could not read api response", err))?;
    if body.len() > MAX_BODY {
        return Err(Error::msg(Kind::Io, "api response exceeds body limit"));
    }
    Ok(body)
}

/// Minimal HTTP/1.1 POST over an `AF_UNIX` stream. `ureq` has no unix
/// transport, and the API surface needed here is one request shape.
#[cfg(unix)]
fn unix_post(
    socket: &std::path::Path,
    api_path: &str,
    args: &[(&str, String)],
    timeout: Duration,
) -> Result<Vec<u8>> {
    use std::os::unix::net::UnixStream;

    let mut query = String::new();
    for (key, value) in args {
        query.push(if query.is_empty() { '?' } else { '&' });
        query.push_str(key);
        query.push('=');
        query.push_str(&urlencode(value));
    }

    let stream = UnixStream::connect(socket)
        .map_err(|err| Error::wrap(Kind::Io, "could not dial api socket", err))?;
    stream.set_read_timeout(Some(timeout)).ok();
    stream.set_write_timeout(Some(timeout)).ok();

    let mut writer = stream
        .try_clone()
        .map_err(|err| Error::wrap(Kind::Io, "could not clone api socket", err))?;
    write!(
        writer,
        "POST {api_path}{query} HTTP/1.1\r\nHost: unix\r\nConnection: close\r\nContent-Length: 0\r\n\r\n"
    )
    .map_err(|err| Error::wrap(Kind::Io, "could not send api request", err))?;

    let mut reader = BufReader::new(stream);
    let mut status_line = String::new();
    reader
        .read_line(&mut status_line)
        .map_err(|err| Error::wrap(Kind::Io, "could not read api status", err))?;
    let code: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| Error::msg(Kind::Io, format!("bad api status line: {status_line:?}")))?;

    let mut content_length = None;
    let mut chunked = false;
    loop {
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .map_err(|err| Error::wrap(Kind::Io, "could not read api headers", err))?;
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.parse::<usize>().ok();
            } else if name.eq_ignore_ascii_case("transfer-encoding") {
                chunked = value.eq_ignore_ascii_case("chunked");
            }
        }
    }

    let body = if chunked {
        read_chunked(&mut reader)?
    } else if let Some(length) = content_length {
        if length > MAX_BODY {
            return Err(Error::msg(Kind::Io, "api response exceeds body limit"));
        }
        let mut body = vec![0u8; length];
        reader
            .read_exact(&mut body)
            .map_err(|err| Error::wrap(Kind::Io, "could not read api body", err))?;
        body
    } else {
        read_body(reader)?
    };

    if code >= 400 {
        return Err(api_error(code, &body));
    }
    Ok(body)
}

#[cfg(not(unix))]
fn unix_post(
    _socket: &std::path::Path,
    _api_path: &str,
    _args: &[(&str, String)],
    _timeout: Duration,
) -> Result<Vec<u8>> {
    Err(Error::msg(Kind::InvalidOperation, "unix sockets are not available on this platform"))
}

/// Decodes a chunked transfer encoding body.
fn read_chunked(reader: &mut impl BufRead) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    loop {
        let mut size_line = String::new();
        reader
            .read_line(&mut size_line)
            .map_err(|err| Error::wrap(Kind::Io, "could not read chunk size", err))?;
        let size = usize::from_str_radix(size_line.trim().split(';').next().unwrap_or(""), 16)
            .map_err(|_| Error::msg(Kind::Io, format!("bad chunk size: {size_line:?}")))?;
        if body.len() + size > MAX_BODY {
            return Err(Error::msg(Kind::Io, "api response exceeds body limit"));
        }
        let mut chunk = vec![0u8; size + 2];
        reader
            .read_exact(&mut chunk)
            .map_err(|err| Error::wrap(Kind::Io, "could not read chunk", err))?;
        if size == 0 {
            break;
        }
        chunk.truncate(size);
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn urlencode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}
