//! CandyFS: a POSIX-style filesystem persisted on a fixed-size block
//! device, exposed to the host kernel over FUSE.
//!
//! The module layout mirrors the four layered subsystems plus their
//! collaborators, lowest layer first:
//!
//! ```text
//! fuse_bridge  — userspace-filesystem callback surface (src/bin/mount.rs)
//! fs           — Filesystem façade: owns the device + both open tables
//! path         — namei, open-path table, link/unlink/mkdir/rmdir/rename
//! dir / file / symlink / perm — directory codec and kind-guarded helpers
//! refs         — open-inode table, late-delete reconciliation
//! inode        — per-file metadata block + indirect-pointer tree
//! block        — superblock, ilist, free-block/free-inum lists
//! device       — the block device seam (in-memory or file-backed)
//! error, types — crate-wide result type and on-disk primitive types
//! ```

pub mod block;
pub mod device;
pub mod dir;
pub mod error;
pub mod file;
pub mod fs;
pub mod fuse_bridge;
pub mod inode;
pub mod path;
pub mod perm;
pub mod refs;
pub mod symlink;
pub mod types;

pub use error::{CandyError, Result};
pub use fs::Filesystem;
