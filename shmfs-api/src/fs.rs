//! Trait contracts implemented by the layered filesystem types in
//! `shmfs_core`.
//!
//! Four supertraits, each one layer wider than the last:
//! `AllocatorSupport → InodeStoreSupport → FileDataSupport →
//! OperationSupport`. Every concrete type in `shmfs_core` implements one
//! trait's worth of new behavior by wrapping the layer below it and
//! delegating everything it does not add itself. Four layers is enough
//! here because the allocator already sub-allocates by byte range (no
//! separate block-bitmap layer is needed) and path resolution has no
//! current-working-directory state to track separately from directory
//! lookup.

use crate::error::Result;
use crate::types::{FileKind, Stat, StatFs};

/// Sub-allocates byte ranges from a mounted region, by offset.
///
/// This is the allocator spec.md §4.2 describes: a first-fit, offset-sorted,
/// coalescing free list. Every other layer allocates and frees through this
/// trait and never touches the free list directly.
pub trait AllocatorSupport: Sized {
    /// Allocate a payload of at least `n` bytes. Returns the payload's
    /// offset, or `Err(FsError::OutOfMemory)` if no free span is large
    /// enough.
    fn allocate(&mut self, n: u64) -> Result<u64>;

    /// Free the payload at `payload_offset`, coalescing with adjacent free
    /// spans. `payload_offset == 0` is a no-op (nothing was ever allocated
    /// there).
    fn free(&mut self, payload_offset: u64) -> Result<()>;

    /// Resize the payload at `payload_offset` to `n` bytes, preserving
    /// `min(old_size, n)` bytes of its contents. `n == 0` is equivalent to
    /// [`AllocatorSupport::free`] and returns `0`. `payload_offset == 0`
    /// returns `0` without allocating (no implicit allocate-from-nothing).
    fn reallocate(&mut self, payload_offset: u64, n: u64) -> Result<u64>;

    /// Total bytes currently free across the whole free list.
    fn free_size(&self) -> u64;

    /// Size of the single largest free span, header included. Used to
    /// pre-flight an allocation before starting a mutating sequence that
    /// must be all-or-nothing.
    fn max_free_block(&self) -> u64;

    /// Usable bytes in the mounted region, i.e. the sum of
    /// [`AllocatorSupport::free_size`] and all currently allocated spans.
    fn usable_size(&self) -> u64;
}

/// Resolves paths to inodes and maintains the directory tree.
///
/// This is the inode/directory store spec.md §4.3 describes: path
/// resolution by linear search through a directory's inline children array,
/// and mutation of that array (append, swap-remove) to create, rename and
/// delete entries.
pub trait InodeStoreSupport: AllocatorSupport {
    /// Resolve `path` to the handle of the inode it names. Lazily creates
    /// the root directory on the very first call, per spec.md §4.3. Errors
    /// with `NotFound` if any intermediate component does not exist, or
    /// `NotADirectory` if an intermediate component is a regular file.
    fn resolve(&mut self, path: &str) -> Result<u64>;

    /// `getattr`: the POSIX metadata of the inode at `path`.
    fn getattr(&mut self, path: &str, uid: u32, gid: u32) -> Result<Stat>;

    /// `readdir`: the names of `path`'s children, in unspecified order.
    /// Errors with `NotADirectory` if `path` names a regular file.
    fn readdir(&mut self, path: &str) -> Result<Vec<String>>;

    /// Create an empty regular file or empty directory at `path`. Errors
    /// with `Exists` if `path` already names something, or `NotFound` if
    /// `path`'s parent does not exist.
    fn create(&mut self, path: &str, kind: FileKind) -> Result<u64>;

    /// Remove the regular file at `path`, freeing its content chain.
    /// Errors with `IsADirectory` if `path` names a directory.
    fn unlink(&mut self, path: &str) -> Result<()>;

    /// Remove the empty directory at `path`. Errors with `NotEmpty` if it
    /// has children, or `InvalidArgument` if `path` is `/`.
    fn rmdir(&mut self, path: &str) -> Result<()>;

    /// Move or rename the inode at `from` to `to`. A no-op if the two paths
    /// are the same. Pre-flights the destination-directory growth before
    /// mutating the source, so a failure leaves both directories intact.
    fn rename(&mut self, from: &str, to: &str) -> Result<()>;

    /// Update the access and modification times of the inode at `path`.
    fn utimens(&mut self, path: &str, atime_ns: i64, mtime_ns: i64) -> Result<()>;
}

/// Reads, writes and truncates regular file content chains.
///
/// This is the file data layer spec.md §4.4 describes.
pub trait FileDataSupport: InodeStoreSupport {
    /// Read up to `n` bytes from `path` starting at `offset` into `buf`
    /// (which must be at least `n` bytes long). Returns the number of
    /// bytes actually copied, `0` at or past EOF. Errors with
    /// `IsADirectory` if `path` names a directory.
    fn read(&mut self, path: &str, offset: u64, n: u64, buf: &mut [u8]) -> Result<u64>;

    /// Write `data` to `path` starting at `offset`. Returns `0` without
    /// writing anything if `offset` is past the current end of file (no
    /// sparse hole creation on write, per spec.md §4.4) or `data` is empty.
    /// Errors with `IsADirectory` if `path` names a directory.
    fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<u64>;

    /// Set the length of the regular file at `path` to `new_size`,
    /// zero-filling any newly introduced bytes on growth and freeing any
    /// now-unreachable blocks on shrink. Errors with `IsADirectory` if
    /// `path` names a directory.
    fn truncate(&mut self, path: &str, new_size: u64) -> Result<()>;
}

/// The public ~13-operation POSIX-ish surface spec.md §4.5 describes, built
/// on the layers above.
pub trait OperationSupport: FileDataSupport {
    /// Existence check; the POSIX `open` call's only externally visible
    /// effect in this design (there is no file-descriptor table to
    /// populate, since every other operation is already path-addressed).
    fn open(&mut self, path: &str) -> Result<()>;

    /// Filesystem-wide usage summary.
    fn statfs(&self) -> Result<StatFs>;
}
