//! Error taxonomy shared by the catalogs, the filesystem tree and capture sessions.
//!
//! Every variant maps onto an errno so the FUSE layer can reply without
//! inspecting error messages.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FsError>;

#[derive(Debug, Error)]
pub enum FsError {
    /// Bad path segment, or a process / descriptor / socket that vanished
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed connection-table row, address, port or socket marker
    #[error("parse error: {0}")]
    Parse(String),

    /// Socket transport that cannot be captured (unix, netlink, uncorrelated)
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// Interface unusable or capture filter rejected
    #[error("capture failure: {0}")]
    Capture(String),

    /// Read cancelled or session released while waiting
    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl FsError {
    pub fn not_found(what: impl Into<String>) -> Self {
        FsError::NotFound(what.into())
    }

    pub fn parse(what: impl Into<String>) -> Self {
        FsError::Parse(what.into())
    }

    /// errno reported to the kernel for this error
    pub fn errno(&self) -> libc::c_int {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::Parse(_) => libc::EIO,
            FsError::UnsupportedTransport(_) => libc::EPROTONOSUPPORT,
            FsError::Capture(_) => libc::EIO,
            FsError::Interrupted => libc::EINTR,
            FsError::Io(e) => match e.kind() {
                io::ErrorKind::NotFound => libc::ENOENT,
                io::ErrorKind::PermissionDenied => libc::EACCES,
                _ => e.raw_os_error().unwrap_or(libc::EIO),
            },
        }
    }

    /// True for the vanished-object class, including io errors of kind NotFound
    pub fn is_not_found(&self) -> bool {
        match self {
            FsError::NotFound(_) => true,
            FsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
