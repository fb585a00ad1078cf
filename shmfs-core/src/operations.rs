//! The public operation surface: the ~13-call POSIX-ish API spec.md §4.5
//! describes, built on the three layers below.
//!
//! [`Filesystem`] wraps a [`FileDataFs`] and adds nothing but `open`/
//! `statfs` and the top-level mount/unmount entry points
//! ([`Filesystem::mount_anonymous`]/[`Filesystem::mount_file`] taking a
//! [`Region`]); every other operation is already present on the layer below
//! and is exposed here only by the blanket [`OperationSupport`]-over-
//! [`FileDataSupport`] relationship.

use crate::file_data::FileDataFs;
use crate::inode_store::InodeStoreFs;
use crate::allocator::AllocatorFs;
use shmfs_api::error::Result;
use shmfs_api::fs::{AllocatorSupport, FileDataSupport, InodeStoreSupport, OperationSupport};
use shmfs_api::region::Region;
use shmfs_api::types::{FileKind, Stat, StatFs, MAX_NAME_LEN, STATFS_BLOCK_SIZE};
use std::path::Path;

/// A mounted filesystem, ready to serve the operation surface spec.md §4.5
/// describes.
///
/// Holds no file-descriptor table and no path cache: every operation is
/// addressed by path and resolved fresh, per spec.md §1's single-writer,
/// no-caching model.
pub struct Filesystem {
    data: FileDataFs,
}

impl Filesystem {
    /// Mount a fresh, anonymous (non-persistent) region of `size` bytes.
    /// Useful for tests and for purely in-memory use.
    pub fn mount_anonymous(size: u64) -> Result<Filesystem> {
        let region = Region::new_anonymous(size)?;
        Self::mount_region(region)
    }

    /// Create and mount a new `size`-byte region backed by the file at
    /// `path`, which must not already exist.
    pub fn mount_file<P: AsRef<Path>>(path: P, size: u64) -> Result<Filesystem> {
        let region = Region::create(path, size)?;
        Self::mount_region(region)
    }

    /// Mount an existing `size`-byte region backed by the file at `path`.
    /// `size` must match the file's length exactly, and the image must have
    /// previously been through a clean unmount (spec.md's Non-goals exclude
    /// crash consistency, so anything else has unspecified contents).
    pub fn mount_existing_file<P: AsRef<Path>>(path: P, size: u64) -> Result<Filesystem> {
        let region = Region::open(path, size)?;
        Self::mount_region(region)
    }

    /// Mount a caller-constructed region directly. Idempotent: a region
    /// that was already mounted before is recognized and loaded as-is
    /// rather than reinitialized, per spec.md §4.1.
    pub fn mount_region(region: Region) -> Result<Filesystem> {
        let allocator = AllocatorFs::mount(region)?;
        let inodes = InodeStoreFs::new(allocator);
        let data = FileDataFs::new(inodes);
        Ok(Filesystem { data })
    }

    /// Unmount, consuming this handle and handing back the underlying
    /// region (flushed to its backing file first, if any).
    pub fn unmount(self) -> Region {
        self.data.unmount()
    }

    /// Convenience wrapper over [`InodeStoreSupport::create`] for a regular
    /// file, matching the POSIX `mknod` call spec.md §4.5 names.
    pub fn mknod(&mut self, path: &str) -> Result<u64> {
        self.data.create(path, FileKind::RegularFile)
    }

    /// Convenience wrapper over [`InodeStoreSupport::create`] for a
    /// directory, matching the POSIX `mkdir` call spec.md §4.5 names.
    pub fn mkdir(&mut self, path: &str) -> Result<u64> {
        self.data.create(path, FileKind::Directory)
    }
}

impl AllocatorSupport for Filesystem {
    fn allocate(&mut self, n: u64) -> Result<u64> {
        self.data.allocate(n)
    }

    fn free(&mut self, payload_offset: u64) -> Result<()> {
        self.data.free(payload_offset)
    }

    fn reallocate(&mut self, payload_offset: u64, n: u64) -> Result<u64> {
        self.data.reallocate(payload_offset, n)
    }

    fn free_size(&self) -> u64 {
        self.data.free_size()
    }

    fn max_free_block(&self) -> u64 {
        self.data.max_free_block()
    }

    fn usable_size(&self) -> u64 {
        self.data.usable_size()
    }
}

impl InodeStoreSupport for Filesystem {
    fn resolve(&mut self, path: &str) -> Result<u64> {
        self.data.resolve(path)
    }

    fn getattr(&mut self, path: &str, uid: u32, gid: u32) -> Result<Stat> {
        self.data.getattr(path, uid, gid)
    }

    fn readdir(&mut self, path: &str) -> Result<Vec<String>> {
        self.data.readdir(path)
    }

    fn create(&mut self, path: &str, kind: FileKind) -> Result<u64> {
        self.data.create(path, kind)
    }

    fn unlink(&mut self, path: &str) -> Result<()> {
        self.data.unlink(path)
    }

    fn rmdir(&mut self, path: &str) -> Result<()> {
        self.data.rmdir(path)
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.data.rename(from, to)
    }

    fn utimens(&mut self, path: &str, atime_ns: i64, mtime_ns: i64) -> Result<()> {
        self.data.utimens(path, atime_ns, mtime_ns)
    }
}

impl FileDataSupport for Filesystem {
    fn read(&mut self, path: &str, offset: u64, n: u64, buf: &mut [u8]) -> Result<u64> {
        self.data.read(path, offset, n, buf)
    }

    fn write(&mut self, path: &str, offset: u64, data: &[u8]) -> Result<u64> {
        self.data.write(path, offset, data)
    }

    fn truncate(&mut self, path: &str, new_size: u64) -> Result<()> {
        self.data.truncate(path, new_size)
    }
}

impl OperationSupport for Filesystem {
    fn open(&mut self, path: &str) -> Result<()> {
        self.resolve(path).map(|_| ())
    }

    fn statfs(&self) -> Result<StatFs> {
        Ok(StatFs {
            block_size: STATFS_BLOCK_SIZE,
            blocks_total: self.usable_size() / STATFS_BLOCK_SIZE,
            blocks_free: self.free_size() / STATFS_BLOCK_SIZE,
            name_max: MAX_NAME_LEN as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_mount_statfs_matches_region_size() {
        let fs = Filesystem::mount_anonymous(1 << 16).unwrap();
        let stats = fs.statfs().unwrap();
        assert_eq!(stats.block_size, STATFS_BLOCK_SIZE);
        assert_eq!(stats.blocks_free, stats.blocks_total);
        assert_eq!(stats.name_max, MAX_NAME_LEN as u64);
    }

    #[test]
    fn open_resolves_existing_path_and_errors_on_missing() {
        let mut fs = Filesystem::mount_anonymous(1 << 16).unwrap();
        fs.mknod("/a").unwrap();
        assert!(fs.open("/a").is_ok());
        assert!(fs.open("/missing").is_err());
    }

    #[test]
    fn mkdir_then_mknod_inside_it() {
        let mut fs = Filesystem::mount_anonymous(1 << 16).unwrap();
        fs.mkdir("/dir").unwrap();
        fs.mknod("/dir/file").unwrap();
        assert_eq!(fs.readdir("/dir").unwrap(), vec!["file".to_string()]);
    }

    #[test]
    fn getattr_reports_sizes_and_kinds() {
        let mut fs = Filesystem::mount_anonymous(1 << 16).unwrap();
        fs.mkdir("/dir").unwrap();
        fs.mknod("/dir/file").unwrap();
        fs.write("/dir/file", 0, b"hi").unwrap();
        let dir_stat = fs.getattr("/dir", 1000, 1000).unwrap();
        assert_eq!(dir_stat.kind, FileKind::Directory);
        assert_eq!(dir_stat.nlink, 3);
        let file_stat = fs.getattr("/dir/file", 1000, 1000).unwrap();
        assert_eq!(file_stat.kind, FileKind::RegularFile);
        assert_eq!(file_stat.size, 2);
        assert_eq!(file_stat.uid, 1000);
    }

    #[test]
    fn mount_unmount_round_trip_persists_to_a_file() {
        let path = crate::test_util::region_path("roundtrip_operations");

        let mut fs = Filesystem::mount_file(&path, 1 << 16).unwrap();
        fs.mkdir("/persisted").unwrap();
        fs.mknod("/persisted/f").unwrap();
        fs.write("/persisted/f", 0, b"durable").unwrap();
        drop(fs.unmount());

        let mut reopened = Filesystem::mount_existing_file(&path, 1 << 16).unwrap();
        assert_eq!(
            reopened.readdir("/persisted").unwrap(),
            vec!["f".to_string()]
        );
        let mut buf = [0u8; 7];
        reopened.read("/persisted/f", 0, 7, &mut buf).unwrap();
        assert_eq!(&buf, b"durable");
        drop(reopened.unmount());

        crate::test_util::region_unprep(&path);
    }
}
