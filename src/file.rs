//! Regular-file helpers (spec §4.5): thin kind-guarded façades over the
//! inode layer. These exist only to reject wrong-kind operations before
//! the generic inode machinery ever runs — exactly the role the teacher's
//! typed `RegularFile`/`Directory` split plays over its own shared
//! `Inode` (`examples/casys-kaist-KeOS/keos-projects/keos-project5::fs::fs_objects`),
//! generalized here to a plain function-per-operation style since CandyFS
//! has no trait-object file-table to dispatch through.

use crate::device::BlockDevice;
use crate::error::{CandyError, Result};
use crate::inode::{self, InodeMeta};
use crate::types::{mode_bits, FileKind, Inum};

fn require_regular(dev: &dyn BlockDevice, inum: Inum) -> Result<InodeMeta> {
    let meta = inode::inode_getinfo(dev, inum)?;
    match FileKind::from_mode(meta.mode) {
        Some(FileKind::Directory) => Err(CandyError::IsADirectory),
        Some(FileKind::Regular) => Ok(meta),
        _ => Err(CandyError::InvalidArgument),
    }
}

/// Allocates a fresh regular-file inode (mode `S_IFREG | 0777`, unlinked).
/// Matches the original's two-step allocate-then-chmod sequence (spec
/// supplement, `file_create` in `original_source/`) rather than folding
/// the type bit into `inode_allocate` itself.
pub fn create(dev: &dyn BlockDevice) -> Result<Inum> {
    let inum = inode::inode_allocate(dev)?;
    inode::inode_chmod(dev, inum, mode_bits::S_IFREG | 0o777)?;
    Ok(inum)
}

/// Reads up to `buf.len()` bytes at `pos`. `EISDIR` if `inum` is a
/// directory.
pub fn read(dev: &dyn BlockDevice, inum: Inum, pos: i64, buf: &mut [u8]) -> Result<i64> {
    require_regular(dev, inum)?;
    inode::inode_read(dev, inum, pos, buf)
}

/// Writes `data` at `pos` (or appends if `pos == -1`).
pub fn write(dev: &dyn BlockDevice, inum: Inum, pos: i64, data: &[u8]) -> Result<i64> {
    require_regular(dev, inum)?;
    inode::inode_write(dev, inum, pos, data)
}

/// Truncates (or extends, zero-filling) to exactly `size` bytes.
pub fn truncate(dev: &dyn BlockDevice, inum: Inum, size: i64) -> Result<i64> {
    require_regular(dev, inum)?;
    inode::inode_truncate(dev, inum, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::mkfs_storage;
    use crate::device::MemoryDevice;

    fn fresh(nblocks: u64) -> MemoryDevice {
        let dev = MemoryDevice::new(nblocks, 512);
        mkfs_storage(&dev, 2).unwrap();
        dev
    }

    #[test]
    fn create_gives_regular_mode() {
        let dev = fresh(256);
        let inum = create(&dev).unwrap();
        let meta = inode::inode_getinfo(&dev, inum).unwrap();
        assert_eq!(FileKind::from_mode(meta.mode), Some(FileKind::Regular));
    }

    #[test]
    fn read_on_a_directory_is_rejected() {
        let dev = fresh(256);
        let parent = inode::inode_allocate(&dev).unwrap();
        let d = crate::dir::create(&dev, parent).unwrap();
        let mut buf = [0u8; 4];
        assert!(matches!(read(&dev, d, 0, &mut buf), Err(CandyError::IsADirectory)));
    }
}
