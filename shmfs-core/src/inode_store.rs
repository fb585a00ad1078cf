//! The inode store layer: path resolution and the directory tree.
//!
//! Inode bookkeeping and directory bookkeeping share one layer here because
//! spec.md's directories hold their children inline (no separate
//! directory-entry block to address), so there is no seam between the two.
//! [`InodeStoreFs`] wraps an [`AllocatorFs`] and allocates through it for
//! every inode and children-array it creates or resizes.

use crate::allocator::{now_ns, AllocatorFs};
use shmfs_api::error::{FsError, Result};
use shmfs_api::fs::{AllocatorSupport, InodeStoreSupport};
use shmfs_api::region::Region;
use shmfs_api::types::{
    FileBlockHeader, FileKind, InodeKind, InodeRecord, Offset, Stat, FREE_BLOCK_HEADER_SIZE,
    INODE_RECORD_SIZE, MAX_NAME_LEN, NULL_OFFSET,
};

/// An allocator-backed region, with inode store support layered on top.
pub struct InodeStoreFs {
    alloc: AllocatorFs,
}

impl InodeStoreFs {
    /// Wrap an already-mounted allocator layer.
    pub fn new(alloc: AllocatorFs) -> InodeStoreFs {
        InodeStoreFs { alloc }
    }

    /// Consume this handle and hand back the underlying region.
    pub fn unmount(self) -> Region {
        self.alloc.unmount()
    }

    pub(crate) fn alloc(&self) -> &AllocatorFs {
        &self.alloc
    }

    pub(crate) fn alloc_mut(&mut self) -> &mut AllocatorFs {
        &mut self.alloc
    }

    pub(crate) fn read_inode(&self, offset: Offset) -> Result<InodeRecord> {
        self.alloc.region().read_record(offset)
    }

    pub(crate) fn write_inode(&mut self, offset: Offset, record: &InodeRecord) -> Result<()> {
        self.alloc.region_mut().write_record(offset, record)
    }

    fn root_offset(&mut self) -> Result<Offset> {
        let existing = self.alloc.superblock().root_dir;
        if existing != NULL_OFFSET {
            return Ok(existing);
        }
        let now = now_ns();
        let record = InodeRecord {
            name: [0; shmfs_api::types::NAME_FIELD_LEN],
            mod_time: now,
            acc_time: now,
            kind: InodeKind::Directory,
            meta: 0,
            target: NULL_OFFSET,
        };
        let offset = self.alloc.allocate(*INODE_RECORD_SIZE)?;
        self.write_inode(offset, &record)?;
        self.alloc.set_root_dir(offset)?;
        Ok(offset)
    }

    fn find_child(
        &self,
        parent: &InodeRecord,
        name: &str,
    ) -> Result<Option<(u64, Offset, InodeRecord)>> {
        for i in 0..parent.meta {
            let offset = parent.target + i * *INODE_RECORD_SIZE;
            let child = self.read_inode(offset)?;
            if child.name_str() == name {
                return Ok(Some((i, offset, child)));
            }
        }
        Ok(None)
    }

    fn read_children(&self, parent: &InodeRecord) -> Result<Vec<InodeRecord>> {
        let mut out = Vec::with_capacity(parent.meta as usize);
        for i in 0..parent.meta {
            out.push(self.read_inode(parent.target + i * *INODE_RECORD_SIZE)?);
        }
        Ok(out)
    }

    /// Swap-remove the child at `index`/`child_offset` out of `parent`'s
    /// children array, per spec.md §4.3: the last child is moved into the
    /// vacated slot and the array is shrunk by one record, rather than
    /// shifting everything after it down. Mutates `parent` in place but does
    /// not persist it; the caller writes it back once.
    fn remove_child(
        &mut self,
        parent: &mut InodeRecord,
        index: u64,
        child_offset: Offset,
    ) -> Result<()> {
        let last_index = parent.meta - 1;
        if index != last_index {
            let last_offset = parent.target + last_index * *INODE_RECORD_SIZE;
            let last_record = self.read_inode(last_offset)?;
            self.write_inode(child_offset, &last_record)?;
        }
        let new_count = parent.meta - 1;
        parent.target = if new_count == 0 {
            self.alloc.free(parent.target)?;
            NULL_OFFSET
        } else {
            self.alloc.reallocate(parent.target, *INODE_RECORD_SIZE * new_count)?
        };
        parent.meta = new_count;
        Ok(())
    }

    /// Pre-flight check used before a mutating sequence that must be
    /// all-or-nothing: errors with `OutOfMemory` up front if no single free
    /// span could possibly satisfy a `payload_len`-byte allocation, rather
    /// than discovering that partway through a multi-step mutation.
    pub(crate) fn ensure_capacity(&self, payload_len: u64) -> Result<()> {
        if self.alloc.max_free_block() < payload_len + *FREE_BLOCK_HEADER_SIZE {
            return Err(FsError::OutOfMemory);
        }
        Ok(())
    }

    /// Append a freshly built child record onto `parent`'s children array.
    /// Grows the array before touching `parent` itself, so a failure here
    /// (out of memory) leaves `parent` unmodified.
    fn append_child(&mut self, parent: &mut InodeRecord, child: &InodeRecord) -> Result<Offset> {
        self.ensure_capacity(*INODE_RECORD_SIZE * (parent.meta + 1))?;
        let new_count = parent.meta + 1;
        let new_array_offset = if parent.meta == 0 {
            self.alloc.allocate(*INODE_RECORD_SIZE * new_count)?
        } else {
            self.alloc.reallocate(parent.target, *INODE_RECORD_SIZE * new_count)?
        };
        let child_offset = new_array_offset + (new_count - 1) * *INODE_RECORD_SIZE;
        self.write_inode(child_offset, child)?;
        parent.meta = new_count;
        parent.target = new_array_offset;
        Ok(child_offset)
    }

    /// Free a regular file's content chain: walk it releasing each payload
    /// buffer and then the header itself. Grounded directly on spec.md §4.4's
    /// chain layout; does not need read/write semantics, only traversal, so
    /// it lives here rather than in the file data layer above.
    fn free_chain(&mut self, first: Offset) -> Result<()> {
        let mut current = first;
        while current != NULL_OFFSET {
            let header: FileBlockHeader = self.alloc.region().read_record(current)?;
            if header.data != NULL_OFFSET {
                self.alloc.free(header.data)?;
            }
            let next = header.next_file_block;
            self.alloc.free(current)?;
            current = next;
        }
        Ok(())
    }
}

fn normalize_components(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(FsError::InvalidArgument("path must be absolute"));
    }
    Ok(path.split('/').filter(|c| !c.is_empty()).collect())
}

fn split_parent(path: &str) -> Result<(String, String)> {
    let comps = normalize_components(path)?;
    if comps.is_empty() {
        return Err(FsError::InvalidArgument("root has no parent"));
    }
    let name = comps[comps.len() - 1].to_string();
    let parent = if comps.len() == 1 {
        "/".to_string()
    } else {
        format!("/{}", comps[..comps.len() - 1].join("/"))
    };
    Ok((parent, name))
}

impl AllocatorSupport for InodeStoreFs {
    fn allocate(&mut self, n: u64) -> Result<u64> {
        self.alloc.allocate(n)
    }

    fn free(&mut self, payload_offset: u64) -> Result<()> {
        self.alloc.free(payload_offset)
    }

    fn reallocate(&mut self, payload_offset: u64, n: u64) -> Result<u64> {
        self.alloc.reallocate(payload_offset, n)
    }

    fn free_size(&self) -> u64 {
        self.alloc.free_size()
    }

    fn max_free_block(&self) -> u64 {
        self.alloc.max_free_block()
    }

    fn usable_size(&self) -> u64 {
        self.alloc.usable_size()
    }
}

impl InodeStoreSupport for InodeStoreFs {
    fn resolve(&mut self, path: &str) -> Result<Offset> {
        let mut current = self.root_offset()?;
        for comp in normalize_components(path)? {
            let record = self.read_inode(current)?;
            if record.kind != InodeKind::Directory {
                return Err(FsError::NotADirectory(path.to_string()));
            }
            match self.find_child(&record, comp)? {
                Some((_, offset, _)) => current = offset,
                None => return Err(FsError::NotFound(path.to_string())),
            }
        }
        Ok(current)
    }

    fn getattr(&mut self, path: &str, uid: u32, gid: u32) -> Result<Stat> {
        const S_IFDIR: u32 = 0o040000;
        const S_IFREG: u32 = 0o100000;

        let offset = self.resolve(path)?;
        let record = self.read_inode(offset)?;
        let (nlink, size, type_bits) = match record.kind {
            InodeKind::Directory => (record.meta + 2, 0, S_IFDIR),
            InodeKind::RegularFile => (1, record.meta, S_IFREG),
        };
        Ok(Stat {
            kind: FileKind::from(record.kind),
            mode: type_bits | 0o755,
            uid,
            gid,
            nlink,
            size,
            atime_ns: record.acc_time,
            mtime_ns: record.mod_time,
        })
    }

    fn readdir(&mut self, path: &str) -> Result<Vec<String>> {
        let offset = self.resolve(path)?;
        let record = self.read_inode(offset)?;
        if record.kind != InodeKind::Directory {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        Ok(self
            .read_children(&record)?
            .into_iter()
            .map(|child| child.name_str())
            .collect())
    }

    fn create(&mut self, path: &str, kind: FileKind) -> Result<u64> {
        let (parent_path, name) = split_parent(path)?;
        if name.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong(name));
        }
        let parent_offset = self.resolve(&parent_path)?;
        let mut parent_record = self.read_inode(parent_offset)?;
        if parent_record.kind != InodeKind::Directory {
            return Err(FsError::NotADirectory(parent_path));
        }
        if self.find_child(&parent_record, &name)?.is_some() {
            return Err(FsError::Exists(path.to_string()));
        }
        let inode_kind = match kind {
            FileKind::Directory => InodeKind::Directory,
            FileKind::RegularFile => InodeKind::RegularFile,
        };
        let child = InodeRecord::new(&name, now_ns(), inode_kind)
            .ok_or(FsError::InvalidArgument("invalid file name"))?;
        let child_offset = self.append_child(&mut parent_record, &child)?;
        self.write_inode(parent_offset, &parent_record)?;
        Ok(child_offset)
    }

    fn unlink(&mut self, path: &str) -> Result<()> {
        let (parent_path, name) = split_parent(path)?;
        let parent_offset = self.resolve(&parent_path)?;
        let mut parent_record = self.read_inode(parent_offset)?;
        let (index, child_offset, child) = self
            .find_child(&parent_record, &name)?
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        if child.kind != InodeKind::RegularFile {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        self.remove_child(&mut parent_record, index, child_offset)?;
        self.write_inode(parent_offset, &parent_record)?;
        if child.target != NULL_OFFSET {
            self.free_chain(child.target)?;
        }
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> Result<()> {
        if normalize_components(path)?.is_empty() {
            return Err(FsError::InvalidArgument("cannot remove the root directory"));
        }
        let (parent_path, name) = split_parent(path)?;
        let parent_offset = self.resolve(&parent_path)?;
        let mut parent_record = self.read_inode(parent_offset)?;
        let (index, child_offset, child) = self
            .find_child(&parent_record, &name)?
            .ok_or_else(|| FsError::NotFound(path.to_string()))?;
        if child.kind != InodeKind::Directory {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        if child.meta != 0 {
            return Err(FsError::NotEmpty(path.to_string()));
        }
        self.remove_child(&mut parent_record, index, child_offset)?;
        self.write_inode(parent_offset, &parent_record)?;
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        if from == to {
            return Ok(());
        }
        let (from_parent_path, from_name) = split_parent(from)?;
        let (to_parent_path, to_name) = split_parent(to)?;
        if to_name.len() > MAX_NAME_LEN {
            return Err(FsError::NameTooLong(to_name));
        }

        let from_parent_offset = self.resolve(&from_parent_path)?;
        let mut from_parent_record = self.read_inode(from_parent_offset)?;
        let (from_index, from_child_offset, mut moved) = self
            .find_child(&from_parent_record, &from_name)?
            .ok_or_else(|| FsError::NotFound(from.to_string()))?;

        if from_parent_path == to_parent_path {
            if let Some((idx, _, _)) = self.find_child(&from_parent_record, &to_name)? {
                if idx != from_index {
                    return Err(FsError::Exists(to.to_string()));
                }
            }
            moved
                .set_name(&to_name)
                .ok_or(FsError::InvalidArgument("invalid file name"))?;
            self.write_inode(from_child_offset, &moved)?;
            return Ok(());
        }

        let to_parent_offset = self.resolve(&to_parent_path)?;
        let mut to_parent_record = self.read_inode(to_parent_offset)?;
        if to_parent_record.kind != InodeKind::Directory {
            return Err(FsError::NotADirectory(to_parent_path));
        }
        if self.find_child(&to_parent_record, &to_name)?.is_some() {
            return Err(FsError::Exists(to.to_string()));
        }
        moved
            .set_name(&to_name)
            .ok_or(FsError::InvalidArgument("invalid file name"))?;

        // Insert at the destination before removing from the source, so an
        // out-of-memory failure here leaves both directories untouched.
        self.append_child(&mut to_parent_record, &moved)?;
        self.write_inode(to_parent_offset, &to_parent_record)?;

        self.remove_child(&mut from_parent_record, from_index, from_child_offset)?;
        self.write_inode(from_parent_offset, &from_parent_record)?;
        Ok(())
    }

    fn utimens(&mut self, path: &str, atime_ns: i64, mtime_ns: i64) -> Result<()> {
        let offset = self.resolve(path)?;
        let mut record = self.read_inode(offset)?;
        record.acc_time = atime_ns;
        record.mod_time = mtime_ns;
        self.write_inode(offset, &record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shmfs_api::region::Region;

    fn fresh(size: u64) -> InodeStoreFs {
        InodeStoreFs::new(AllocatorFs::mount(Region::new_anonymous(size).unwrap()).unwrap())
    }

    #[test]
    fn root_is_created_lazily_and_idempotently() {
        let mut fs = fresh(1 << 16);
        let a = fs.resolve("/").unwrap();
        let b = fs.resolve("/").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn create_then_readdir_then_unlink() {
        let mut fs = fresh(1 << 16);
        fs.create("/foo.txt", FileKind::RegularFile).unwrap();
        assert_eq!(fs.readdir("/").unwrap(), vec!["foo.txt".to_string()]);
        fs.unlink("/foo.txt").unwrap();
        assert!(fs.readdir("/").unwrap().is_empty());
    }

    #[test]
    fn create_duplicate_name_errors() {
        let mut fs = fresh(1 << 16);
        fs.create("/a", FileKind::Directory).unwrap();
        let err = fs.create("/a", FileKind::RegularFile);
        assert!(matches!(err, Err(FsError::Exists(_))));
    }

    #[test]
    fn rmdir_non_empty_errors() {
        let mut fs = fresh(1 << 16);
        fs.create("/dir", FileKind::Directory).unwrap();
        fs.create("/dir/child", FileKind::RegularFile).unwrap();
        assert!(matches!(fs.rmdir("/dir"), Err(FsError::NotEmpty(_))));
        fs.unlink("/dir/child").unwrap();
        fs.rmdir("/dir").unwrap();
    }

    #[test]
    fn rmdir_root_is_rejected() {
        let mut fs = fresh(1 << 16);
        assert!(matches!(fs.rmdir("/"), Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn rename_across_directories() {
        let mut fs = fresh(1 << 16);
        fs.create("/src", FileKind::Directory).unwrap();
        fs.create("/dst", FileKind::Directory).unwrap();
        fs.create("/src/f", FileKind::RegularFile).unwrap();
        fs.rename("/src/f", "/dst/f").unwrap();
        assert!(fs.resolve("/src/f").is_err());
        assert!(fs.resolve("/dst/f").is_ok());
    }

    #[test]
    fn swap_remove_keeps_other_siblings_resolvable() {
        let mut fs = fresh(1 << 16);
        fs.create("/a", FileKind::RegularFile).unwrap();
        fs.create("/b", FileKind::RegularFile).unwrap();
        fs.create("/c", FileKind::RegularFile).unwrap();
        fs.unlink("/a").unwrap();
        let mut names = fs.readdir("/").unwrap();
        names.sort();
        assert_eq!(names, vec!["b".to_string(), "c".to_string()]);
        assert!(fs.resolve("/b").is_ok());
        assert!(fs.resolve("/c").is_ok());
    }
}
