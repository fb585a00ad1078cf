//! On-region record layout.
//!
//! Fixed-size, `Serialize`/`Deserialize` structs written into the region
//! with `bincode`, each paired with a size computed once at startup via
//! `lazy_static`, since `bincode`'s wire size for a struct built only from
//! fixed arrays and primitive integers never depends on the values stored
//! in it.
//!
//! Everything in this module refers to other records only through
//! [`Offset`], per spec.md §3's invariant that no absolute address is ever
//! stored in the region.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// A byte distance from the start of the mounted [`crate::region::Region`].
/// The only form in which one on-region record may refer to another.
pub type Offset = u64;

/// The reserved offset meaning "no target". Offset zero can never be a valid
/// target because the region's first bytes hold the superblock.
pub const NULL_OFFSET: Offset = 0;

/// Maximum length of a path component, in bytes, not counting the NUL
/// terminator.
pub const MAX_NAME_LEN: usize = 255;

/// Size of the fixed name field inside an [`InodeRecord`]: 255 bytes plus a
/// terminator.
pub const NAME_FIELD_LEN: usize = MAX_NAME_LEN + 1;

/// Sentinel value distinguishing an initialized region from a fresh one.
/// A freshly zeroed region reads as `0` here, which can never be a valid
/// magic value, so first-mount detection is a single integer comparison.
pub const SUPERBLOCK_MAGIC: u32 = 1;

/// The fixed-offset header at the start of every mounted region.
///
/// Lives at region offset `0`. `magic == 0` means the region has never been
/// mounted; `magic == SUPERBLOCK_MAGIC` means it has, and the rest of the
/// fields are meaningful.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlockRecord {
    /// `0` on a fresh region, [`SUPERBLOCK_MAGIC`] once initialized.
    pub magic: u32,
    /// Usable bytes after this header.
    pub size: u64,
    /// Offset of the first free allocator block, or [`NULL_OFFSET`] if the
    /// region is entirely allocated (never true right after `mkfs`, since
    /// the whole usable region starts out as one free block).
    pub free_memory: Offset,
    /// Offset of the root inode, or [`NULL_OFFSET`] before the first path
    /// resolution has lazily created it.
    pub root_dir: Offset,
}

lazy_static! {
    /// Size of [`SuperBlockRecord`] as written to the region, in bytes.
    pub static ref SUPERBLOCK_SIZE: u64 =
        bincode::serialize(&SuperBlockRecord::default()).unwrap().len() as u64;
}

/// Header present at the start of every free span in the region, and
/// (construction-time only) at the start of every allocated span too: an
/// allocation is just a free-list header whose `next` has been set to
/// [`NULL_OFFSET`] and whose payload has been handed to the caller.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FreeBlockHeader {
    /// Total bytes of this span, header included.
    pub size: u64,
    /// Offset of the next free span in ascending-offset order, or
    /// [`NULL_OFFSET`] if this is the tail (or the span is allocated).
    pub next: Offset,
}

lazy_static! {
    /// Size of [`FreeBlockHeader`] as written to the region, in bytes.
    pub static ref FREE_BLOCK_HEADER_SIZE: u64 =
        bincode::serialize(&FreeBlockHeader::default()).unwrap().len() as u64;
}

/// The type of file an inode represents.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    /// A directory: a file whose contents are an inline array of child
    /// inodes.
    #[default]
    Directory,
    /// A regular file: a file whose contents are a chain of file blocks.
    RegularFile,
}

/// Fixed-size metadata record for a single file or directory.
///
/// Stored inline inside a directory's children array (see
/// `InodeStoreFs::append_child`/`remove_child` in `shmfs_core`), never
/// referenced by offset from outside its parent array, per spec.md §3
/// invariant 5. The two variant payloads (`num_children`/`children` for a
/// directory, `size`/`first_block` for a regular file) are folded into the
/// same two fields (`meta`, `target`) so every inode has the same wire
/// size regardless of its kind, rather than needing an enum with
/// differently-shaped variants whose wire size would depend on which
/// variant is stored.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeRecord {
    /// NUL-padded name, valid UTF-8 up to the first NUL byte.
    pub name: [u8; NAME_FIELD_LEN],
    /// Last modification time, nanoseconds since the Unix epoch.
    pub mod_time: i64,
    /// Last access time, nanoseconds since the Unix epoch.
    pub acc_time: i64,
    /// Whether this inode is a directory or a regular file.
    pub kind: InodeKind,
    /// Directory: `num_children`. Regular file: `size` in bytes.
    pub meta: u64,
    /// Directory: offset of the contiguous children array, or
    /// [`NULL_OFFSET`] when empty. Regular file: offset of the first file
    /// block, or [`NULL_OFFSET`] when empty.
    pub target: Offset,
}

impl Default for InodeRecord {
    fn default() -> Self {
        InodeRecord {
            name: [0; NAME_FIELD_LEN],
            mod_time: 0,
            acc_time: 0,
            kind: InodeKind::default(),
            meta: 0,
            target: NULL_OFFSET,
        }
    }
}

impl InodeRecord {
    /// Build an inode record for `name`, timestamped `now` (nanoseconds
    /// since the Unix epoch), of the given kind, with no contents yet.
    /// Returns `None` if `name` cannot be encoded into the fixed name
    /// field (the caller is expected to have already checked its length).
    pub fn new(name: &str, now: i64, kind: InodeKind) -> Option<InodeRecord> {
        let mut record = InodeRecord {
            mod_time: now,
            acc_time: now,
            kind,
            ..InodeRecord::default()
        };
        record.set_name(name)?;
        Some(record)
    }

    /// Decode this record's name as a `String`, stopping at the first NUL
    /// byte.
    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    /// Encode `name` into this record's fixed name field. Returns `None` if
    /// `name` is empty, longer than [`MAX_NAME_LEN`] bytes, or contains `/`
    /// or a NUL byte.
    pub fn set_name(&mut self, name: &str) -> Option<()> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return None;
        }
        if name.bytes().any(|b| b == b'/' || b == 0) {
            return None;
        }
        self.name = [0; NAME_FIELD_LEN];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
        Some(())
    }
}

lazy_static! {
    /// Size of [`InodeRecord`] as written to the region, in bytes. Also the
    /// stride of a directory's children array.
    pub static ref INODE_RECORD_SIZE: u64 =
        bincode::serialize(&InodeRecord::default()).unwrap().len() as u64;
}

/// One link in a regular file's content chain.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileBlockHeader {
    /// Payload bytes in the buffer at `data`.
    pub block_size: u64,
    /// Offset of the next file block in the chain, or [`NULL_OFFSET`] if
    /// this is the last one.
    pub next_file_block: Offset,
    /// Offset of this block's raw payload buffer, or [`NULL_OFFSET`] if
    /// `block_size` is `0`.
    pub data: Offset,
}

lazy_static! {
    /// Size of [`FileBlockHeader`] as written to the region, in bytes.
    pub static ref FILE_BLOCK_HEADER_SIZE: u64 =
        bincode::serialize(&FileBlockHeader::default()).unwrap().len() as u64;
}

/// Advertised `statfs` block size, in bytes. A reporting convention per
/// spec.md §6, not the allocator's allocation granularity.
pub const STATFS_BLOCK_SIZE: u64 = 1024;

/// The kind of file a [`Stat`] or a public inode handle describes. A public
/// mirror of [`InodeKind`] so callers outside this crate's internals are
/// not coupled to the on-region encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// A directory.
    Directory,
    /// A regular file.
    RegularFile,
}

impl From<InodeKind> for FileKind {
    fn from(kind: InodeKind) -> Self {
        match kind {
            InodeKind::Directory => FileKind::Directory,
            InodeKind::RegularFile => FileKind::RegularFile,
        }
    }
}

/// `getattr` result: the subset of POSIX `stat(2)` fields spec.md §4.5
/// names. Mode bits, uid and gid are accepted and echoed by the operation
/// surface but never enforced, per spec.md §1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    /// What kind of file this is.
    pub kind: FileKind,
    /// POSIX permission bits, fixed at `0o755` regardless of what was
    /// requested at creation time (access control is out of scope).
    pub mode: u32,
    /// Echoed back verbatim; never checked against a caller's identity.
    pub uid: u32,
    /// Echoed back verbatim; never checked against a caller's identity.
    pub gid: u32,
    /// Link count: `children + 2` for a directory (itself plus the would-be
    /// "." and ".." this design does not materialize as entries, kept only
    /// in the count for `stat`-compatibility), `1` for a regular file.
    pub nlink: u64,
    /// File size in bytes. Always `0` for a directory.
    pub size: u64,
    /// Last access time, nanoseconds since the Unix epoch.
    pub atime_ns: i64,
    /// Last modification time, nanoseconds since the Unix epoch.
    pub mtime_ns: i64,
}

/// `statfs` result: the subset of POSIX `statvfs(2)` fields spec.md §4.5
/// and §6 name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    /// Reporting block size, always [`STATFS_BLOCK_SIZE`].
    pub block_size: u64,
    /// Total blocks in the region, `region_size / block_size`.
    pub blocks_total: u64,
    /// Free blocks, `free_size() / block_size`.
    pub blocks_free: u64,
    /// Maximum path component length, [`MAX_NAME_LEN`].
    pub name_max: u64,
}
