//! The block device seam.
//!
//! Spec.md treats "read/write a numbered fixed-size block" as an external
//! collaborator whose interface merely *appears* in the external-interfaces
//! section — the core never depends on how a block actually reaches disk.
//! [`BlockDevice`] is that interface. [`MemoryDevice`] is the in-memory
//! emulation the spec explicitly keeps in scope (the default volume
//! `mount.candyfs` creates); [`FileDevice`] is the thin wrapper needed to
//! run `mkfs.candyfs`/`mount.candyfs` against a real file or block special.

use crate::error::{CandyError, Result};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

/// Default on-device block size in bytes (spec §6).
pub const BLOCK_SIZE: usize = 512;

/// A fixed-size, numbered block store.
///
/// Implementors need not be `Sync` themselves; CandyFS is single-threaded
/// per §5, so a `Mutex`-wrapped handle (as both implementations here use)
/// is sufficient and simple.
pub trait BlockDevice {
    /// Size in bytes of one block.
    fn block_size(&self) -> usize;
    /// Total number of addressable blocks.
    fn num_blocks(&self) -> u64;
    /// Reads block `blockno` into `buf`, which must be exactly
    /// `block_size()` bytes.
    fn read_block(&self, blockno: i64, buf: &mut [u8]) -> Result<()>;
    /// Writes `buf` (exactly `block_size()` bytes) to block `blockno`.
    fn write_block(&self, blockno: i64, buf: &[u8]) -> Result<()>;
}

/// An in-memory block device, the "512 MiB in-memory volume" of spec §6.
pub struct MemoryDevice {
    block_size: usize,
    blocks: Mutex<Vec<u8>>,
}

impl MemoryDevice {
    /// Creates a zero-filled volume of `num_blocks` blocks of `block_size`
    /// bytes each.
    pub fn new(num_blocks: u64, block_size: usize) -> Self {
        Self {
            block_size,
            blocks: Mutex::new(vec![0u8; num_blocks as usize * block_size]),
        }
    }
}

impl BlockDevice for MemoryDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> u64 {
        let guard = self.blocks.lock().unwrap();
        (guard.len() / self.block_size) as u64
    }

    fn read_block(&self, blockno: i64, buf: &mut [u8]) -> Result<()> {
        let guard = self.blocks.lock().unwrap();
        let start = checked_offset(blockno, self.block_size, guard.len())?;
        buf.copy_from_slice(&guard[start..start + self.block_size]);
        Ok(())
    }

    fn write_block(&self, blockno: i64, buf: &[u8]) -> Result<()> {
        let mut guard = self.blocks.lock().unwrap();
        let start = checked_offset(blockno, self.block_size, guard.len())?;
        guard[start..start + self.block_size].copy_from_slice(buf);
        Ok(())
    }
}

/// A block device backed by a regular file (or a block special file).
pub struct FileDevice {
    block_size: usize,
    num_blocks: u64,
    file: Mutex<File>,
}

impl FileDevice {
    /// Opens `path` for read-write access and treats it as `num_blocks`
    /// blocks of `block_size` bytes. The caller is responsible for having
    /// sized the file appropriately (`mkfs.candyfs` does this).
    pub fn open(file: File, num_blocks: u64, block_size: usize) -> Self {
        Self {
            block_size,
            num_blocks,
            file: Mutex::new(file),
        }
    }
}

impl BlockDevice for FileDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn num_blocks(&self) -> u64 {
        self.num_blocks
    }

    fn read_block(&self, blockno: i64, buf: &mut [u8]) -> Result<()> {
        if blockno < 0 || blockno as u64 >= self.num_blocks {
            return Err(CandyError::Io);
        }
        let mut guard = self.file.lock().unwrap();
        guard
            .seek(SeekFrom::Start(blockno as u64 * self.block_size as u64))
            .map_err(|_| CandyError::Io)?;
        guard.read_exact(buf).map_err(|_| CandyError::Io)
    }

    fn write_block(&self, blockno: i64, buf: &[u8]) -> Result<()> {
        if blockno < 0 || blockno as u64 >= self.num_blocks {
            return Err(CandyError::Io);
        }
        let mut guard = self.file.lock().unwrap();
        guard
            .seek(SeekFrom::Start(blockno as u64 * self.block_size as u64))
            .map_err(|_| CandyError::Io)?;
        guard.write_all(buf).map_err(|_| CandyError::Io)
    }
}

fn checked_offset(blockno: i64, block_size: usize, len: usize) -> Result<usize> {
    if blockno < 0 {
        return Err(CandyError::Io);
    }
    let start = blockno as usize * block_size;
    if start + block_size > len {
        return Err(CandyError::Io);
    }
    Ok(start)
}
