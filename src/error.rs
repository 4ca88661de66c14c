//! Structured errors shared by the node tree, the 9P dispatch layer, and the
//! host mount adapter.
//!
//! Every fallible operation in this crate reports an [`Error`] carrying a
//! [`Kind`]. The kind maps onto two errno tables: the value sent to 9P
//! clients in `Rlerror` (Linux numbering, which is what 9P2000.L peers
//! expect regardless of the server's host) and the value handed back to the
//! local kernel through FUSE (host numbering).

use std::error;
use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of every error the server can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A path or name is malformed.
    InvalidItem,
    /// The target does not implement the requested capability.
    InvalidOperation,
    /// Name not found.
    NotExist,
    /// Name already present.
    Exist,
    /// A directory was expected.
    NotDir,
    /// A non-directory was expected.
    IsDir,
    /// Directory not empty on unlink.
    NotEmpty,
    /// Access denied.
    Permission,
    /// Underlying I/O failure.
    Io,
    /// Operation on a closed resource.
    Closed,
}

impl Kind {
    /// Errno value for the 9P wire, in Linux numbering.
    pub fn wire_errno(self) -> u32 {
        match self {
            Kind::InvalidItem => 22,      // EINVAL
            Kind::InvalidOperation => 38, // ENOSYS
            Kind::NotExist => 2,          // ENOENT
            Kind::Exist => 17,            // EEXIST
            Kind::NotDir => 20,           // ENOTDIR
            Kind::IsDir => 21,            // EISDIR
            Kind::NotEmpty => 39,         // ENOTEMPTY
            Kind::Permission => 13,       // EACCES
            Kind::Io => 5,                // EIO
            Kind::Closed => 9,            // EBADF
        }
    }

    /// Errno value for FUSE replies, in host numbering.
    #[cfg(unix)]
    pub fn host_errno(self) -> i32 {
        match self {
            Kind::InvalidItem => libc::EINVAL,
            Kind::InvalidOperation => libc::ENOSYS,
            Kind::NotExist => libc::ENOENT,
            Kind::Exist => libc::EEXIST,
            Kind::NotDir => libc::ENOTDIR,
            Kind::IsDir => libc::EISDIR,
            Kind::NotEmpty => libc::ENOTEMPTY,
            Kind::Permission => libc::EACCES,
            Kind::Io => libc::EIO,
            Kind::Closed => libc::EBADF,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Kind::InvalidItem => "invalid item",
            Kind::InvalidOperation => "operation not supported",
            Kind::NotExist => "does not exist",
            Kind::Exist => "already exists",
            Kind::NotDir => "not a directory",
            Kind::IsDir => "is a directory",
            Kind::NotEmpty => "directory not empty",
            Kind::Permission => "permission denied",
            Kind::Io => "i/o failure",
            Kind::Closed => "resource is closed",
        }
    }
}

/// An error with a [`Kind`], an optional message, and an optional source.
#[derive(Debug)]
pub struct Error {
    kind: Kind,
    message: Option<String>,
    source: Option<Box<dyn error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(kind: Kind) -> Self {
        Self { kind, message: None, source: None }
    }

    pub fn msg(kind: Kind, message: impl Into<String>) -> Self {
        Self { kind, message: Some(message.into()), source: None }
    }

    pub fn wrap(
        kind: Kind,
        message: impl Into<String>,
        source: impl error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { kind, message: Some(message.into()), source: Some(Box::new(source)) }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind.as_str(), message),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source.as_ref().map(|source| {
            let source: &(dyn error::Error + 'static) = source.as_ref();
            source
        })
    }
}

impl From<Kind> for Error {
    fn from(kind: Kind) -> Self {
        Error::new(kind)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => Kind::NotExist,
            io::ErrorKind::AlreadyExists => Kind::Exist,
            io::ErrorKind::PermissionDenied => Kind::Permission,
            io::ErrorKind::InvalidInput => Kind::InvalidItem,
            _ => Kind::Io,
        };
        Error { kind, message: Some(err.to_string()), source: Some(Box::new(err)) }
    }
}
