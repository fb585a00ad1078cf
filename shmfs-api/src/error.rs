//! The error type shared by every filesystem layer.
//!
//! A `thiserror`-derived enum with `#[from]` conversions for the IO and
//! serialization errors that bubble up out of the region, plus an `anyhow`
//! catch-all for one-off failures that do not deserve their own variant.
//! The POSIX-flavored variants below are the ones spec.md §6 and §7 name;
//! [`FsError::errno`] maps each one to the numeric code an
//! operation-surface caller (e.g. a FUSE bridge, out of scope for this
//! crate) would want to hand back to the kernel.

use std::io;
use thiserror::Error;

/// Errors produced by any layer of the filesystem.
///
/// A single enum is used across all layers (allocator, inode store, file
/// data, operation surface) rather than one wrapper enum per layer. A
/// separate error type per layer would only pay for itself if the layers
/// were independently versioned or swappable; here they are one finished
/// implementation, so the indirection buys nothing and is dropped.
#[derive(Error, Debug)]
pub enum FsError {
    /// IO failure while mapping or flushing the backing file.
    #[error("IO error in the region layer")]
    Io(#[from] io::Error),

    /// (De)serialization failure reading or writing an on-region record.
    #[error("Serialization error in the region layer")]
    Serialize(#[from] bincode::Error),

    /// The region is too small to hold a superblock, or its magic value
    /// does not correspond to a previously initialized filesystem when one
    /// was expected. Maps to `EFAULT`.
    #[error("Region is not a valid filesystem: {0}")]
    RegionBad(&'static str),

    /// No inode exists at the resolved path. Maps to `ENOENT`.
    #[error("No such file or directory: {0}")]
    NotFound(String),

    /// The target of a create or link operation already exists. Maps to
    /// `EEXIST`.
    #[error("Already exists: {0}")]
    Exists(String),

    /// A path component exceeded 255 bytes. Maps to `ENAMETOOLONG`.
    #[error("Name too long: {0}")]
    NameTooLong(String),

    /// An operation that requires a regular file was given a directory.
    /// Maps to `EISDIR`.
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// An operation that requires a directory was given a regular file.
    /// Maps to `ENOTDIR`.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// `rmdir` was called on a non-empty directory. Maps to `ENOTEMPTY`.
    #[error("Directory not empty: {0}")]
    NotEmpty(String),

    /// The allocator has no block large enough to satisfy the request.
    /// Maps to `ENOMEM`.
    #[error("Out of space in the region")]
    OutOfMemory,

    /// Malformed call arguments that are not any of the above (empty path,
    /// removing `/`, trailing slash on a non-root path, and so on). Maps to
    /// `EINVAL`.
    #[error("Invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Catch-all for errors that do not deserve their own variant.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FsError {
    /// The POSIX-compatible numeric error code spec.md §6 specifies for
    /// this error, for callers (e.g. a FUSE bridge) that need a raw status
    /// rather than a typed error.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::Io(_) | FsError::RegionBad(_) => 14,     // EFAULT
            FsError::Serialize(_) => 14,                      // EFAULT
            FsError::NotFound(_) => 2,                        // ENOENT
            FsError::Exists(_) => 17,                         // EEXIST
            FsError::NameTooLong(_) => 36,                    // ENAMETOOLONG
            FsError::IsADirectory(_) => 21,                   // EISDIR
            FsError::NotADirectory(_) => 20,                  // ENOTDIR
            FsError::NotEmpty(_) => 39,                        // ENOTEMPTY
            FsError::OutOfMemory => 12,                        // ENOMEM
            FsError::InvalidArgument(_) => 22,                 // EINVAL
            FsError::Other(_) => 5,                            // EIO
        }
    }
}

/// Shorthand for a `Result` with the error type [`FsError`].
pub type Result<T> = std::result::Result<T, FsError>;
