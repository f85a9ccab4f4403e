//! Symlink helpers (spec §4.5): a regular inode with the symlink mode bit
//! set, whose data is the bare target string (no trailing NUL). See
//! `file.rs` for the analogous regular-file façade this mirrors.

use crate::device::BlockDevice;
use crate::error::{CandyError, Result};
use crate::inode::{self};
use crate::types::{mode_bits, FileKind, Inum};

/// `PATH_MAX` minus one (spec §4.5): the longest symlink target this
/// filesystem will store.
pub const MAX_TARGET_LEN: usize = 4095;

/// Allocates a fresh symlink inode (mode `S_IFLNK | 0777`) and writes
/// `target` as its data.
pub fn create(dev: &dyn BlockDevice, target: &str) -> Result<Inum> {
    if target.len() > MAX_TARGET_LEN {
        return Err(CandyError::NameTooLong);
    }
    let inum = inode::inode_allocate(dev)?;
    inode::inode_chmod(dev, inum, mode_bits::S_IFLNK | 0o777)?;
    inode::inode_write(dev, inum, 0, target.as_bytes())?;
    Ok(inum)
}

/// Reads up to `maxsize` bytes of the link target.
pub fn read(dev: &dyn BlockDevice, inum: Inum, maxsize: usize) -> Result<String> {
    let meta = inode::inode_getinfo(dev, inum)?;
    if FileKind::from_mode(meta.mode) != Some(FileKind::Symlink) {
        return Err(CandyError::InvalidArgument);
    }
    let n = (meta.size as usize).min(maxsize);
    let mut buf = vec![0u8; n];
    let read = inode::inode_read(dev, inum, 0, &mut buf)? as usize;
    buf.truncate(read);
    Ok(String::from_utf8_lossy(&buf).into_owned())
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
    fn create_then_read_roundtrips() {
        let dev = fresh(256);
        let inum = create(&dev, "/etc/passwd").unwrap();
        assert_eq!(read(&dev, inum, 4096).unwrap(), "/etc/passwd");
    }

    #[test]
    fn read_clips_to_maxsize() {
        let dev = fresh(256);
        let inum = create(&dev, "abcdef").unwrap();
        assert_eq!(read(&dev, inum, 3).unwrap(), "abc");
    }

    #[test]
    fn overlong_target_rejected() {
        let dev = fresh(256);
        let target = "x".repeat(MAX_TARGET_LEN + 1);
        assert!(matches!(create(&dev, &target), Err(crate::error::CandyError::NameTooLong)));
    }
}
