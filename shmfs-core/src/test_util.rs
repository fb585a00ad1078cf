//! Test-only helpers for working with file-backed regions.
//!
//! Every test that wants a file-backed image picks a name unique to itself
//! so that tests run in parallel without colliding on the same path.

use std::path::PathBuf;

/// A path under the system temp directory unique to `test_name`, suitable
/// for a throwaway region image. Removes any stale file left over from a
/// previous run that panicked before cleaning up.
pub(crate) fn region_path(test_name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("shmfs_test_{}_{}.img", std::process::id(), test_name));
    let _ = std::fs::remove_file(&path);
    path
}

/// Remove a region image created by [`region_path`]. Safe to call even if
/// the file was never created.
pub(crate) fn region_unprep(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
}
