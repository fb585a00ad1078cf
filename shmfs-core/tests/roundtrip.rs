//! Integration test for the mount round-trip law: everything written before
//! a clean unmount is visible, unchanged, after remounting the same image.

use shmfs_core::Filesystem;
use shmfs_api::fs::{FileDataSupport, InodeStoreSupport, OperationSupport};
use shmfs_api::types::FileKind;

fn region_path(test_name: &str) -> std::path::PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!(
        "shmfs_integration_{}_{}.img",
        std::process::id(),
        test_name
    ));
    let _ = std::fs::remove_file(&path);
    path
}

#[test]
fn tree_and_file_contents_survive_a_clean_unmount_remount_cycle() {
    let path = region_path("tree_and_contents");

    {
        let mut fs = Filesystem::mount_file(&path, 1 << 20).unwrap();
        fs.mkdir("/docs").unwrap();
        fs.mkdir("/docs/nested").unwrap();
        fs.create("/docs/readme.txt", FileKind::RegularFile).unwrap();
        fs.write("/docs/readme.txt", 0, b"hello, persistent world").unwrap();
        fs.create("/docs/nested/leaf", FileKind::RegularFile).unwrap();
        fs.write("/docs/nested/leaf", 0, b"leaf contents").unwrap();
        drop(fs.unmount());
    }

    {
        let mut fs = Filesystem::mount_existing_file(&path, 1 << 20).unwrap();

        let mut top_children = fs.readdir("/docs").unwrap();
        top_children.sort();
        assert_eq!(
            top_children,
            vec!["nested".to_string(), "readme.txt".to_string()]
        );

        let mut buf = [0u8; 23];
        let n = fs.read("/docs/readme.txt", 0, 23, &mut buf).unwrap();
        assert_eq!(n, 23);
        assert_eq!(&buf, b"hello, persistent world");

        assert_eq!(fs.readdir("/docs/nested").unwrap(), vec!["leaf".to_string()]);
        let mut leaf_buf = [0u8; 13];
        fs.read("/docs/nested/leaf", 0, 13, &mut leaf_buf).unwrap();
        assert_eq!(&leaf_buf, b"leaf contents");

        let stat = fs.getattr("/docs/readme.txt", 0, 0).unwrap();
        assert_eq!(stat.size, 23);

        drop(fs.unmount());
    }

    let _ = std::fs::remove_file(&path);
}

#[test]
fn statfs_reflects_allocations_and_frees_across_a_remount() {
    let path = region_path("statfs_across_remount");
    let region_size = 1 << 18;

    let free_before_writes;
    {
        let fs = Filesystem::mount_file(&path, region_size).unwrap();
        free_before_writes = fs.statfs().unwrap().blocks_free;
        drop(fs.unmount());
    }

    {
        let mut fs = Filesystem::mount_existing_file(&path, region_size).unwrap();
        fs.create("/big", FileKind::RegularFile).unwrap();
        fs.write("/big", 0, &vec![7u8; 4096]).unwrap();
        let after = fs.statfs().unwrap();
        assert!(after.blocks_free < free_before_writes);
        drop(fs.unmount());
    }

    {
        let mut fs = Filesystem::mount_existing_file(&path, region_size).unwrap();
        fs.unlink("/big").unwrap();
        let restored = fs.statfs().unwrap();
        assert_eq!(restored.blocks_free, free_before_writes);
        drop(fs.unmount());
    }

    let _ = std::fs::remove_file(&path);
}
