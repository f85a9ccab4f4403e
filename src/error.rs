//! Crate-wide error type.
//!
//! Every layer's public operation returns either a value or one of these
//! variants; there is no panic-on-expected-failure anywhere in non-test
//! code. This mirrors the flat, explicit error enum the teacher uses
//! throughout its own filesystem layer (`KernelError`), down to the
//! `errno()`-style mapping method used at the process boundary.

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, CandyError>;

/// Every way a CandyFS operation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandyError {
    /// No such file, directory, inum, or path-table handle.
    NotFound,
    /// Operation undefined for this inode kind (wrong-way chmod on a
    /// symlink, `read` on a directory, etc).
    InvalidArgument,
    /// Expected a directory, got something else.
    NotADirectory,
    /// Expected a non-directory, got a directory.
    IsADirectory,
    /// A permission check failed.
    AccessDenied,
    /// The operation is forbidden outright regardless of permission bits
    /// (hard-linking a directory, non-root chown).
    OperationNotPermitted,
    /// A name component already exists where a fresh one was required.
    AlreadyExists,
    /// A directory being removed or renamed-over is not empty.
    NotEmpty,
    /// A path component, or a symlink target, exceeded its length limit.
    NameTooLong,
    /// More than 8 nested symlinks while resolving a path.
    TooManyLinks,
    /// Block or inum allocation failed with nothing at all committed.
    NoSpace,
    /// The open-path table has no free slot.
    OutOfMemory,
    /// A conflicting open-path entry exists and blocking was not allowed.
    WouldBlock,
    /// The underlying block device rejected a read or write.
    Io,
    /// An on-disk structure failed a consistency check (bad magic, a
    /// dangling ilist slot, …). The payload names what was inconsistent.
    Corrupt(&'static str),
}

impl CandyError {
    /// Maps this error onto the negative errno value the FUSE bridge and
    /// the bridge operation table (spec §6/§7) expect.
    pub fn errno(self) -> i32 {
        match self {
            CandyError::NotFound => libc::ENOENT,
            CandyError::InvalidArgument => libc::EINVAL,
            CandyError::NotADirectory => libc::ENOTDIR,
            CandyError::IsADirectory => libc::EISDIR,
            CandyError::AccessDenied => libc::EACCES,
            CandyError::OperationNotPermitted => libc::EPERM,
            CandyError::AlreadyExists => libc::EEXIST,
            CandyError::NotEmpty => libc::ENOTEMPTY,
            CandyError::NameTooLong => libc::ENAMETOOLONG,
            CandyError::TooManyLinks => libc::ELOOP,
            CandyError::NoSpace => libc::ENOSPC,
            CandyError::OutOfMemory => libc::ENOMEM,
            CandyError::WouldBlock => libc::EWOULDBLOCK,
            CandyError::Io => libc::EIO,
            CandyError::Corrupt(_) => libc::EIO,
        }
    }
}

impl fmt::Display for CandyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandyError::NotFound => write!(f, "no such file or directory"),
            CandyError::InvalidArgument => write!(f, "invalid argument"),
            CandyError::NotADirectory => write!(f, "not a directory"),
            CandyError::IsADirectory => write!(f, "is a directory"),
            CandyError::AccessDenied => write!(f, "permission denied"),
            CandyError::OperationNotPermitted => write!(f, "operation not permitted"),
            CandyError::AlreadyExists => write!(f, "file exists"),
            CandyError::NotEmpty => write!(f, "directory not empty"),
            CandyError::NameTooLong => write!(f, "name too long"),
            CandyError::TooManyLinks => write!(f, "too many levels of symbolic links"),
            CandyError::NoSpace => write!(f, "no space left on device"),
            CandyError::OutOfMemory => write!(f, "open-path table exhausted"),
            CandyError::WouldBlock => write!(f, "operation would block"),
            CandyError::Io => write!(f, "block device I/O error"),
            CandyError::Corrupt(what) => write!(f, "filesystem corrupted: {what}"),
        }
    }
}

impl std::error::Error for CandyError {}
