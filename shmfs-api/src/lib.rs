//! Types and trait contracts shared by the filesystem layers in `shmfs_core`.
//!
//! This crate owns the things that do not change as you climb the layer
//! stack: the mmap-backed [`region::Region`], the on-region record layout
//! in [`types`], the error type in [`error`], and the trait contracts each
//! layer in `shmfs_core` implements, in [`fs`].
//!
//! Start reading at [`fs::AllocatorSupport`] and work your way down through
//! [`fs::InodeStoreSupport`], [`fs::FileDataSupport`] and
//! [`fs::OperationSupport`].

#![deny(missing_docs)]

pub mod error;
pub mod fs;
pub mod region;
pub mod types;
