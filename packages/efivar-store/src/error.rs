//! Error types for variable access.
//!
//! Operating system failures are classified exactly once, where the failing
//! call is made. Everything above the backend only matches on [`ErrorKind`].

use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configured path is not backed by efivarfs.
    #[error("no efivarfs magic found at {}, is it mounted?", path.display())]
    NotMounted { path: PathBuf },

    /// No such variable, or the variable is a zero-length tombstone.
    #[error("variable does not exist")]
    VariableNotFound,

    /// The caller lacks the privileges for the operation. Never retried.
    #[error("permission denied")]
    PermissionDenied,

    /// The variable file became immutable again under us, most likely
    /// because another writer raced with this one.
    #[error("retry needed")]
    RetryNeeded,

    /// A combined `Name-GUID` identifier could not be split or parsed.
    #[error("invalid variable identifier {identifier:?}: {message}")]
    InvalidIdentifier { identifier: String, message: String },

    /// Any other I/O failure, passed through unchanged.
    #[error("{0}")]
    Io(#[from] io::Error),
}

/// The discriminant of an [`Error`], for matching without caring about
/// payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotMounted,
    VariableNotFound,
    PermissionDenied,
    RetryNeeded,
    InvalidIdentifier,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotMounted { .. } => ErrorKind::NotMounted,
            Error::VariableNotFound => ErrorKind::VariableNotFound,
            Error::PermissionDenied => ErrorKind::PermissionDenied,
            Error::RetryNeeded => ErrorKind::RetryNeeded,
            Error::InvalidIdentifier { .. } => ErrorKind::InvalidIdentifier,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether repeating the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::RetryNeeded
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// True for `EACCES`: the caller is not allowed to touch the file.
pub(crate) fn is_access_denied(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EACCES)
}

/// True for `EACCES` or `EPERM`.
pub(crate) fn is_permission(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
        || matches!(err.raw_os_error(), Some(libc::EACCES) | Some(libc::EPERM))
}

/// True for `EPERM` alone, which efivarfs returns for immutable inodes.
pub(crate) fn is_operation_not_permitted(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EPERM)
}
