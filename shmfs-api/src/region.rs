//! The memory region a filesystem is mounted on.
//!
//! A [`Region`] hands out raw byte ranges addressed by an
//! [`crate::types::Offset`], rather than fixed-size blocks addressed by
//! block number, because the allocator sub-allocates the region itself
//! instead of delegating to fixed-size disk blocks.
//!
//! A region is backed by an anonymous `mmap` or by a `mmap`ed file, and
//! distinguishes a fresh image from an existing one at construction time.
//! When file-backed, [`Drop`] flushes the mapping so that a clean unmount
//! persists the filesystem, per spec.md §1 and §5.

use crate::error::{FsError, Result};
use memmap::{MmapMut, MmapOptions};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Where a region's bytes come from.
enum Backing {
    /// Backed by anonymous memory; contents vanish when the region is
    /// dropped.
    Anonymous,
    /// Backed by a file at the given path; dropping the region flushes the
    /// mapping back to it.
    File(PathBuf),
}

/// A contiguous range of bytes a filesystem is mounted on.
///
/// This is the sole storage medium spec.md §1 describes: every
/// cross-structure reference inside a mounted filesystem is an
/// [`crate::types::Offset`] into this range, never an absolute address, so
/// that the same bytes remount identically regardless of where the `mmap`
/// lands in the process's address space.
pub struct Region {
    backing: Backing,
    contents: MmapMut,
}

impl Region {
    /// Create a new region backed by anonymous memory, `size` bytes long,
    /// initialized to all zero.
    ///
    /// An anonymous region cannot be persisted across a process restart; it
    /// exists only for the lifetime of this value.
    pub fn new_anonymous(size: u64) -> Result<Region> {
        let contents = MmapOptions::new().len(size as usize).map_anon()?;
        Ok(Region {
            backing: Backing::Anonymous,
            contents,
        })
    }

    /// Create a new region of `size` bytes backed by the file at `path`,
    /// which must not already exist. The file is extended to `size` bytes,
    /// zero-filled, and memory-mapped.
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> Result<Region> {
        let path = path.as_ref();
        if path.exists() {
            return Err(FsError::InvalidArgument(
                "tried to create a region at a path that already exists",
            ));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        file.set_len(size)?;
        let contents = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(Region {
            backing: Backing::File(path.to_path_buf()),
            contents,
        })
    }

    /// Open an existing region backed by the file at `path`, which must
    /// already exist and be exactly `size` bytes long.
    pub fn open<P: AsRef<Path>>(path: P, size: u64) -> Result<Region> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(FsError::InvalidArgument(
                "tried to open a region at a path that does not exist",
            ));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        if file.metadata()?.len() != size {
            return Err(FsError::RegionBad(
                "backing file size does not match the requested region size",
            ));
        }
        let contents = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(Region {
            backing: Backing::File(path.to_path_buf()),
            contents,
        })
    }

    /// Size of this region in bytes.
    pub fn len(&self) -> u64 {
        self.contents.len() as u64
    }

    /// Whether this region has zero length. A region is never created with
    /// zero length in practice, but the method is provided for parity with
    /// the standard slice API.
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Read `buf.len()` bytes starting at `offset`. Errors if the read would
    /// run past the end of the region.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset
            .checked_add(buf.len() as u64)
            .ok_or(FsError::RegionBad("offset overflow on read"))?;
        if end > self.len() {
            return Err(FsError::RegionBad("read past the end of the region"));
        }
        let start = offset as usize;
        buf.copy_from_slice(&self.contents[start..start + buf.len()]);
        Ok(())
    }

    /// Write `data` starting at `offset`. Errors if the write would run past
    /// the end of the region.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(FsError::RegionBad("offset overflow on write"))?;
        if end > self.len() {
            return Err(FsError::RegionBad("write past the end of the region"));
        }
        let start = offset as usize;
        self.contents[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Zero-fill `len` bytes starting at `offset`.
    pub fn zero(&mut self, offset: u64, len: u64) -> Result<()> {
        let end = offset
            .checked_add(len)
            .ok_or(FsError::RegionBad("offset overflow on zero"))?;
        if end > self.len() {
            return Err(FsError::RegionBad("zero past the end of the region"));
        }
        let start = offset as usize;
        for b in &mut self.contents[start..start + len as usize] {
            *b = 0;
        }
        Ok(())
    }

    /// Deserialize a `T` from `offset`.
    pub fn read_record<T: serde::de::DeserializeOwned>(&self, offset: u64) -> Result<T> {
        if offset > self.len() {
            return Err(FsError::RegionBad("record offset past the end of the region"));
        }
        let start = offset as usize;
        Ok(bincode::deserialize(&self.contents[start..])?)
    }

    /// Serialize `value` into the region at `offset`.
    pub fn write_record<T: serde::Serialize>(&mut self, offset: u64, value: &T) -> Result<()> {
        let encoded = bincode::serialize(value)?;
        self.write(offset, &encoded)
    }

    /// Flush any pending writes to the backing file. A no-op for anonymous
    /// regions.
    pub fn flush(&self) -> Result<()> {
        if let Backing::File(_) = &self.backing {
            self.contents.flush()?;
        }
        Ok(())
    }
}

impl Drop for Region {
    /// Persist the region if it is file-backed, so that a clean unmount
    /// leaves a remountable image, per spec.md §1.
    fn drop(&mut self) {
        if let Backing::File(_) = &self.backing {
            let _ = self.contents.flush();
        }
    }
}
