//! Directory layer (spec §4.4): the `(numbers[], names[])` block format and
//! insert/remove/lookup/enumerate/reparent over it.
//!
//! No module in the teacher's FFS packs two parallel arrays into one block
//! this way (its directories are themselves regular files holding fixed
//! 64-byte dirents — see `fs_objects::Directory` in
//! `examples/casys-kaist-KeOS/keos-projects/keos-project5`); this codec is
//! grounded directly on spec.md §3/§4.4/§6 instead. What *is* carried over
//! from the teacher is the habit of treating a directory as "just another
//! inode's byte stream", read and written through the same `inode_read`/
//! `inode_write` primitives as a regular file — exactly how the teacher's
//! `Directory` type is built as a thin wrapper over its `Inode`.

use crate::block::{read_i64, write_i64};
use crate::device::BlockDevice;
use crate::error::{CandyError, Result};
use crate::inode::{inode_getinfo, inode_read, inode_truncate, inode_write};
use crate::types::{mode_bits, FileKind, Inum, EOF};

/// Maximum length of one path component (spec §7).
pub const MAX_NAME_LEN: usize = 255;

/// Number of `numbers[]` slots per directory block: spec §6 fixes this at
/// `block_size / 4` bytes of numbers, i.e. `block_size / 32` `i64` slots.
fn k_slots(block_size: usize) -> usize {
    block_size / 32
}

/// Size in bytes of the trailing name area (the remaining ~¾ of the block).
fn names_area_len(block_size: usize) -> usize {
    block_size - k_slots(block_size) * 8
}

/// Parses one directory block into its dense prefix of `(inum, name)`
/// pairs, stopping at the first `EOF` slot (or after `K` entries if the
/// block is completely full). Also returns the number of name-area bytes
/// consumed, needed by `insert`'s best-fit scan.
fn parse_block(buf: &[u8], block_size: usize) -> (Vec<i64>, Vec<String>, usize) {
    let k = k_slots(block_size);
    let names_off = k * 8;
    let mut numbers = Vec::new();
    let mut names = Vec::new();
    let mut nameoff = 0usize;
    for i in 0..k {
        let v = read_i64(buf, i * 8);
        if v == EOF {
            break;
        }
        numbers.push(v);
        let start = names_off + nameoff;
        let mut end = start;
        while end < buf.len() && buf[end] != 0 {
            end += 1;
        }
        names.push(String::from_utf8_lossy(&buf[start..end]).into_owned());
        nameoff += (end - start) + 1;
    }
    (numbers, names, nameoff)
}

/// Serializes `numbers`/`names` (already known to fit) into one block's
/// worth of bytes, zero-padding everything after the last used byte in
/// both areas (the compaction invariant: no holes before EOF).
fn build_block(block_size: usize, numbers: &[i64], names: &[String]) -> Vec<u8> {
    let k = k_slots(block_size);
    let names_off = k * 8;
    let mut buf = vec![0u8; block_size];
    for i in 0..k {
        let v = if i < numbers.len() { numbers[i] } else { EOF };
        write_i64(&mut buf, i * 8, v);
    }
    let mut off = names_off;
    for name in names {
        let bytes = name.as_bytes();
        buf[off..off + bytes.len()].copy_from_slice(bytes);
        off += bytes.len();
        buf[off] = 0;
        off += 1;
    }
    buf
}

fn check_name_len(name: &str) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        Err(CandyError::NameTooLong)
    } else {
        Ok(())
    }
}

/// Creates a fresh, empty directory inode (mode `S_IFDIR | 0755`, not yet
/// linked into any parent's entry list) whose first block already holds
/// `.` and `..`. The caller (`path_mkdir`) is responsible for `chown`,
/// `chmod`-ing to the caller's requested mode, and linking it in.
pub fn create(dev: &dyn BlockDevice, parent: Inum) -> Result<Inum> {
    let inum = crate::inode::inode_allocate(dev)?;
    crate::inode::inode_chmod(dev, inum, mode_bits::S_IFDIR | 0o755)?;
    let block_size = dev.block_size();
    let numbers = [parent.0, inum.0];
    let names = [String::from(".."), String::from(".")];
    let buf = build_block(block_size, &numbers, &names);
    inode_write(dev, inum, 0, &buf)?;
    Ok(inum)
}

/// Validates that `dir` is an empty directory (invariant 6): its only
/// block has `numbers[2] == EOF`, and — the extra guard the original
/// carries over (`dir.c`'s `dir_free`) — its size fits in exactly one
/// block.
pub fn destroy(dev: &dyn BlockDevice, dir: Inum) -> Result<()> {
    let meta = inode_getinfo(dev, dir)?;
    if FileKind::from_mode(meta.mode) != Some(FileKind::Directory) {
        return Err(CandyError::NotADirectory);
    }
    let block_size = dev.block_size() as i64;
    if meta.size > block_size {
        return Err(CandyError::NotEmpty);
    }
    let mut buf = vec![0u8; block_size as usize];
    let n = inode_read(dev, dir, 0, &mut buf)?;
    if n == 0 {
        return Err(CandyError::Corrupt("directory missing its first block"));
    }
    let (numbers, _, _) = parse_block(&buf, block_size as usize);
    if numbers.len() > 2 {
        return Err(CandyError::NotEmpty);
    }
    Ok(())
}

/// Overwrites `numbers[0]` (the `..` entry) of `dir`'s first block, used
/// by `path_rename` when a directory moves to a new parent.
pub fn reparent(dev: &dyn BlockDevice, dir: Inum, new_parent: Inum) -> Result<()> {
    let block_size = dev.block_size();
    let mut buf = vec![0u8; block_size];
    inode_read(dev, dir, 0, &mut buf)?;
    write_i64(&mut buf, 0, new_parent.0);
    inode_write(dev, dir, 0, &buf)?;
    Ok(())
}

/// Looks up `name` in `dir`, scanning blocks in order.
pub fn lookup(dev: &dyn BlockDevice, dir: Inum, name: &str) -> Result<Inum> {
    check_name_len(name)?;
    let block_size = dev.block_size();
    let meta = inode_getinfo(dev, dir)?;
    let nblocks = meta.size / block_size as i64;
    let mut buf = vec![0u8; block_size];
    for b in 0..nblocks {
        let n = inode_read(dev, dir, b * block_size as i64, &mut buf)?;
        if n == 0 {
            break;
        }
        let (numbers, names, _) = parse_block(&buf, block_size);
        if let Some(i) = names.iter().position(|n| n == name) {
            return Ok(Inum(numbers[i]));
        }
    }
    Err(CandyError::NotFound)
}

/// Inserts `(name, target)` into `dir`. Fails with `EEXIST` if `name`
/// already appears anywhere in the directory. Picks the fullest existing
/// block with room for both the numbers slot and the name bytes; failing
/// that, appends a fresh trailing block.
pub fn insert(dev: &dyn BlockDevice, dir: Inum, name: &str, target: Inum) -> Result<()> {
    check_name_len(name)?;
    let block_size = dev.block_size();
    let k = k_slots(block_size);
    let names_cap = names_area_len(block_size);
    let meta = inode_getinfo(dev, dir)?;
    let nblocks = meta.size / block_size as i64;

    let mut best: Option<(i64, Vec<i64>, Vec<String>)> = None;
    let mut best_used = -1i64;

    let mut buf = vec![0u8; block_size];
    for b in 0..nblocks {
        inode_read(dev, dir, b * block_size as i64, &mut buf)?;
        let (numbers, names, name_bytes) = parse_block(&buf, block_size);
        if names.iter().any(|n| n == name) {
            return Err(CandyError::AlreadyExists);
        }
        let has_number_room = numbers.len() < k;
        let has_name_room = name_bytes + name.len() + 1 <= names_cap;
        if has_number_room && has_name_room {
            let used = numbers.len() as i64 * 8 + name_bytes as i64;
            if used > best_used {
                best_used = used;
                best = Some((b, numbers, names));
            }
        }
    }

    if let Some((b, mut numbers, mut names)) = best {
        numbers.push(target.0);
        names.push(name.to_string());
        let newbuf = build_block(block_size, &numbers, &names);
        inode_write(dev, dir, b * block_size as i64, &newbuf)?;
    } else {
        let numbers = [target.0];
        let names = [name.to_string()];
        let newbuf = build_block(block_size, &numbers, &names);
        inode_write(dev, dir, -1, &newbuf)?;
    }
    Ok(())
}

/// Removes `name` from `dir`, compacting the holding block (or truncating
/// it away entirely if it was that block's sole occupant and the block is
/// the directory's last).
///
/// Tracks `empty_count`, the number of completely-empty blocks immediately
/// preceding the one currently being scanned, the same way the original's
/// `dir_remove` does: a block whose sole entry is removed but which is not
/// yet the last block is written back all-`EOF` rather than dropped (its
/// predecessor blocks may still be non-empty, so the file can't shrink
/// yet). Once the *last* block's sole entry is removed, the truncation
/// collapses it and every all-`EOF` block `empty_count` names immediately
/// before it in one step, so a run of now-empty trailing blocks never
/// lingers on disk just because they weren't the last one removed.
pub fn remove(dev: &dyn BlockDevice, dir: Inum, name: &str) -> Result<()> {
    if name == "." || name == ".." {
        return Err(CandyError::OperationNotPermitted);
    }
    check_name_len(name)?;
    let block_size = dev.block_size();
    let meta = inode_getinfo(dev, dir)?;
    let nblocks = meta.size / block_size as i64;
    let mut buf = vec![0u8; block_size];
    let mut empty_count = 0i64;
    for b in 0..nblocks {
        inode_read(dev, dir, b * block_size as i64, &mut buf)?;
        let (mut numbers, mut names, _) = parse_block(&buf, block_size);
        if let Some(idx) = names.iter().position(|n| n == name) {
            numbers.remove(idx);
            names.remove(idx);
            if numbers.is_empty() && b == nblocks - 1 {
                let newsize = (b - empty_count) * block_size as i64;
                inode_truncate(dev, dir, newsize)?;
            } else {
                let newbuf = build_block(block_size, &numbers, &names);
                inode_write(dev, dir, b * block_size as i64, &newbuf)?;
            }
            return Ok(());
        }
        empty_count = if numbers.is_empty() { empty_count + 1 } else { 0 };
    }
    Err(CandyError::NotFound)
}

/// Stateless enumeration over an opaque 64-bit offset (spec §4.4):
/// `offset == 0` both starts the scan and signals completion. Returns
/// `None` once a block fails to read (i.e. the directory is exhausted).
pub fn enumerate(dev: &dyn BlockDevice, dir: Inum, offset: u64) -> Result<Option<(Inum, String, u64)>> {
    let block_size = dev.block_size();
    let k = k_slots(block_size) as u64;
    let (mut block_idx, mut entry_idx) = if offset == 0 {
        (0u64, 0u64)
    } else {
        let raw = offset - 1;
        (raw / k, raw % k)
    };

    let mut buf = vec![0u8; block_size];
    loop {
        let n = inode_read(dev, dir, (block_idx * block_size as u64) as i64, &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        let (numbers, names, _) = parse_block(&buf, block_size);
        if (entry_idx as usize) >= numbers.len() {
            block_idx += 1;
            entry_idx = 0;
            continue;
        }
        let inum = Inum(numbers[entry_idx as usize]);
        let name = names[entry_idx as usize].clone();
        let mut next_entry = entry_idx + 1;
        let mut next_block = block_idx;
        if next_entry >= k {
            next_block += 1;
            next_entry = 0;
        }
        return Ok(Some((inum, name, next_block * k + next_entry + 1)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::mkfs_storage;
    use crate::device::MemoryDevice;

    fn fresh(nblocks: u64) -> MemoryDevice {
        let dev = MemoryDevice::new(nblocks, 512);
        mkfs_storage(&dev, 4).unwrap();
        dev
    }

    #[test]
    fn create_has_dot_and_dotdot() {
        let dev = fresh(256);
        let root = crate::inode::inode_allocate(&dev).unwrap();
        let d = create(&dev, root).unwrap();
        assert_eq!(lookup(&dev, d, ".").unwrap(), d);
        assert_eq!(lookup(&dev, d, "..").unwrap(), root);
    }

    #[test]
    fn insert_then_lookup_then_remove() {
        let dev = fresh(256);
        let root = crate::inode::inode_allocate(&dev).unwrap();
        let d = create(&dev, root).unwrap();
        let target = crate::inode::inode_allocate(&dev).unwrap();
        insert(&dev, d, "hello", target).unwrap();
        assert_eq!(lookup(&dev, d, "hello").unwrap(), target);
        remove(&dev, d, "hello").unwrap();
        assert!(matches!(lookup(&dev, d, "hello"), Err(CandyError::NotFound)));
    }

    #[test]
    fn duplicate_insert_rejected() {
        let dev = fresh(256);
        let root = crate::inode::inode_allocate(&dev).unwrap();
        let d = create(&dev, root).unwrap();
        let a = crate::inode::inode_allocate(&dev).unwrap();
        let b = crate::inode::inode_allocate(&dev).unwrap();
        insert(&dev, d, "x", a).unwrap();
        assert!(matches!(insert(&dev, d, "x", b), Err(CandyError::AlreadyExists)));
    }

    #[test]
    fn cannot_remove_dot_entries() {
        let dev = fresh(256);
        let root = crate::inode::inode_allocate(&dev).unwrap();
        let d = create(&dev, root).unwrap();
        assert!(matches!(remove(&dev, d, "."), Err(CandyError::OperationNotPermitted)));
        assert!(matches!(remove(&dev, d, ".."), Err(CandyError::OperationNotPermitted)));
    }

    #[test]
    fn enumerate_visits_every_entry_once() {
        let dev = fresh(256);
        let root = crate::inode::inode_allocate(&dev).unwrap();
        let d = create(&dev, root).unwrap();
        let mut created = Vec::new();
        for i in 0..20 {
            let t = crate::inode::inode_allocate(&dev).unwrap();
            let name = format!("f{i}");
            insert(&dev, d, &name, t).unwrap();
            created.push(name);
        }

        let mut seen = Vec::new();
        let mut offset = 0u64;
        loop {
            match enumerate(&dev, d, offset).unwrap() {
                None => break,
                Some((_, name, next)) => {
                    seen.push(name);
                    offset = next;
                }
            }
        }
        assert!(seen.contains(&".".to_string()));
        assert!(seen.contains(&"..".to_string()));
        for name in &created {
            assert!(seen.contains(name), "missing {name}");
        }
        assert_eq!(seen.len(), created.len() + 2);
    }

    #[test]
    fn destroy_rejects_nonempty() {
        let dev = fresh(256);
        let root = crate::inode::inode_allocate(&dev).unwrap();
        let d = create(&dev, root).unwrap();
        let t = crate::inode::inode_allocate(&dev).unwrap();
        insert(&dev, d, "x", t).unwrap();
        assert!(matches!(destroy(&dev, d), Err(CandyError::NotEmpty)));
        remove(&dev, d, "x").unwrap();
        destroy(&dev, d).unwrap();
    }
}
