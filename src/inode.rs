//! Inode layer: per-file metadata and the direct/indirect block tree.
//!
//! The block-pointer slots at the tail of an inode block are laid out
//! exactly like the original design's `blocks[]` array: some number of
//! direct slots, then one single-indirect slot, one double-indirect, one
//! triple-indirect. How many direct slots fit is a function of the
//! mount's block size, so (like `block.rs`) everything here is computed
//! from `dev.block_size()` through a [`Layout`] rather than baked in as a
//! compile-time constant.

use crate::block::{block_allocate, block_free, ino_free as ilist_free, ino_get, ino_set};
use crate::block::{ino_allocate as ilist_allocate, read_i64, read_u32, write_i64, write_u32};
use crate::device::BlockDevice;
use crate::error::{CandyError, Result};
use crate::types::{BlockNo, Inum, EOF};

/// Inode-block magic, spec §6.
pub const INODE_MAGIC: u32 = 0xCA41_40DE;

/// `tv_nsec` sentinel: use the current time (matches Linux's `UTIME_NOW`).
pub const UTIME_NOW: i64 = (1 << 30) - 1;
/// `tv_nsec` sentinel: leave this timestamp untouched (`UTIME_OMIT`).
pub const UTIME_OMIT: i64 = (1 << 30) - 2;

/// `chown`'s "leave unchanged" sentinel for a `u32` uid/gid argument.
pub const ID_NO_CHANGE: u32 = u32::MAX;

const HEADER_LEN: usize = 4 + 4 * 4 + 8 + 8 * 8;

/// A POSIX `timespec`, seconds and nanoseconds since the epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i64,
}

fn now_timespec() -> Timespec {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    Timespec {
        sec: dur.as_secs() as i64,
        nsec: dur.subsec_nanos() as i64,
    }
}

/// The fixed-size fields of an inode: everything but the block-pointer
/// slots. This is what `inode_getinfo` hands back to callers.
#[derive(Clone, Copy, Debug)]
pub struct InodeMeta {
    pub mode: u32,
    pub owner: u32,
    pub group: u32,
    pub nlinks: u32,
    pub size: i64,
    pub created: Timespec,
    pub atime: Timespec,
    pub mtime: Timespec,
    pub ctime: Timespec,
}

struct InodeBlock {
    meta: InodeMeta,
    slots: Vec<i64>,
}

impl InodeBlock {
    fn load(dev: &dyn BlockDevice, blockno: i64, layout: &Layout) -> Result<Self> {
        let mut buf = vec![0u8; dev.block_size()];
        dev.read_block(blockno, &mut buf)?;
        if read_u32(&buf, 0) != INODE_MAGIC {
            return Err(CandyError::Corrupt("bad inode magic"));
        }
        let meta = InodeMeta {
            mode: read_u32(&buf, 4),
            owner: read_u32(&buf, 8),
            group: read_u32(&buf, 12),
            nlinks: read_u32(&buf, 16),
            size: read_i64(&buf, 20),
            created: read_timespec(&buf, 28),
            atime: read_timespec(&buf, 44),
            mtime: read_timespec(&buf, 60),
            ctime: read_timespec(&buf, 76),
        };
        let mut slots = Vec::with_capacity(layout.num_block_slots as usize);
        for i in 0..layout.num_block_slots {
            slots.push(read_i64(&buf, HEADER_LEN + (i as usize) * 8));
        }
        Ok(InodeBlock { meta, slots })
    }

    fn store(&self, dev: &dyn BlockDevice, blockno: i64) -> Result<()> {
        let mut buf = vec![0u8; dev.block_size()];
        write_u32(&mut buf, 0, INODE_MAGIC);
        write_u32(&mut buf, 4, self.meta.mode);
        write_u32(&mut buf, 8, self.meta.owner);
        write_u32(&mut buf, 12, self.meta.group);
        write_u32(&mut buf, 16, self.meta.nlinks);
        write_i64(&mut buf, 20, self.meta.size);
        write_timespec(&mut buf, 28, self.meta.created);
        write_timespec(&mut buf, 44, self.meta.atime);
        write_timespec(&mut buf, 60, self.meta.mtime);
        write_timespec(&mut buf, 76, self.meta.ctime);
        for (i, slot) in self.slots.iter().enumerate() {
            write_i64(&mut buf, HEADER_LEN + i * 8, *slot);
        }
        dev.write_block(blockno, &buf)
    }
}

fn read_timespec(buf: &[u8], off: usize) -> Timespec {
    Timespec {
        sec: read_i64(buf, off),
        nsec: read_i64(buf, off + 8),
    }
}

fn write_timespec(buf: &mut [u8], off: usize, ts: Timespec) {
    write_i64(buf, off, ts.sec);
    write_i64(buf, off + 8, ts.nsec);
}

/// Block-pointer slot arithmetic, all derived from the mount's block size.
///
/// Mirrors the original layer's `SINGLE/DOUBLE/TRIPLE_INDIRECT_COUNT` and
/// its offset/indirection/slot-index helpers, but as methods on a value
/// computed once per call instead of preprocessor constants.
struct Layout {
    block_size: i64,
    num_block_slots: i64,
    single_count: i64,
    double_count: i64,
    triple_count: i64,
    first_single_slot: i64,
    first_double_slot: i64,
    first_triple_slot: i64,
    first_single_block: i64,
    first_double_block: i64,
    first_triple_block: i64,
    first_unreachable_block: i64,
}

impl Layout {
    fn new(dev: &dyn BlockDevice) -> Self {
        let block_size = dev.block_size() as i64;
        let num_block_slots = (block_size - HEADER_LEN as i64) / 8;
        let single_count = block_size / 8;
        let double_count = single_count * single_count;
        let triple_count = double_count * single_count;

        let first_single_slot = num_block_slots - 3;
        let first_double_slot = first_single_slot + 1;
        let first_triple_slot = first_double_slot + 1;

        let first_single_block = first_single_slot;
        let first_double_block = first_single_block + single_count;
        let first_triple_block = first_double_block + double_count;
        let first_unreachable_block = first_triple_block + triple_count;

        Layout {
            block_size,
            num_block_slots,
            single_count,
            double_count,
            triple_count,
            first_single_slot,
            first_double_slot,
            first_triple_slot,
            first_single_block,
            first_double_block,
            first_triple_block,
            first_unreachable_block,
        }
    }

    fn max_filesize(&self) -> i64 {
        self.first_unreachable_block * self.block_size
    }

    fn offset2blockidx(&self, off: i64) -> i64 {
        off / self.block_size
    }

    /// 0 = direct, 1/2/3 = single/double/triple indirect, -1 = unreachable.
    fn indirection_level(&self, blockidx: i64) -> i32 {
        if blockidx < self.first_single_block {
            0
        } else if blockidx < self.first_double_block {
            1
        } else if blockidx < self.first_triple_block {
            2
        } else if blockidx < self.first_unreachable_block {
            3
        } else {
            -1
        }
    }

    fn blockslot_indirection_level(&self, slot: i64) -> i32 {
        if slot < self.first_single_slot {
            0
        } else if slot < self.first_double_slot {
            1
        } else if slot < self.first_triple_slot {
            2
        } else if slot < self.num_block_slots {
            3
        } else {
            -1
        }
    }

    fn indirect_count(&self, level: i32) -> i64 {
        match level {
            0 => 1,
            1 => self.single_count,
            2 => self.double_count,
            3 => self.triple_count,
            _ => 0,
        }
    }

    fn blockidx2blockslot(&self, blockidx: i64) -> i64 {
        match self.indirection_level(blockidx) {
            0 => blockidx,
            1 => self.first_single_slot + (blockidx - self.first_single_block) / self.single_count,
            2 => self.first_double_slot + (blockidx - self.first_double_block) / self.double_count,
            3 => self.first_triple_slot + (blockidx - self.first_triple_block) / self.triple_count,
            _ => EOF,
        }
    }

    fn blockslot2firstblockidx(&self, slot: i64) -> i64 {
        match self.blockslot_indirection_level(slot) {
            0 => slot,
            1 => self.first_single_block + (slot - self.first_single_slot) * self.single_count,
            2 => self.first_double_block + (slot - self.first_double_slot) * self.double_count,
            3 => self.first_triple_block + (slot - self.first_triple_slot) * self.triple_count,
            _ => EOF,
        }
    }
}

fn load_indirect(dev: &dyn BlockDevice, blockno: i64) -> Result<Vec<i64>> {
    let mut buf = vec![0u8; dev.block_size()];
    dev.read_block(blockno, &mut buf)?;
    let n = dev.block_size() / 8;
    Ok((0..n).map(|i| read_i64(&buf, i * 8)).collect())
}

fn store_indirect(dev: &dyn BlockDevice, blockno: i64, data: &[i64]) -> Result<()> {
    let mut buf = vec![0u8; dev.block_size()];
    for (i, v) in data.iter().enumerate() {
        write_i64(&mut buf, i * 8, *v);
    }
    dev.write_block(blockno, &buf)
}

/// Grows the subtree rooted at `*dest` (a direct slot, or an entry inside
/// an indirect block one level up) so it covers file-block range
/// `[old_blockcount, new_blockcount)` intersected with the subtree's own
/// range starting at `curblock`. Returns `(committed, blocks_added)`:
/// `committed` is `false` the moment an allocation hits `ENOSPC`, at which
/// point the caller stops growing — kept separate from a genuine I/O
/// error, which still propagates via `?`.
#[allow(clippy::too_many_arguments)]
fn indirect_grow(
    dev: &dyn BlockDevice,
    dest: &mut i64,
    curblock: i64,
    indirection: i32,
    old_blockcount: i64,
    new_blockcount: i64,
    layout: &Layout,
) -> Result<(bool, i64)> {
    let mut blockno = *dest;
    let freshly_allocated = blockno == EOF;
    if freshly_allocated {
        blockno = match block_allocate(dev) {
            Ok(b) => b.0,
            Err(CandyError::NoSpace) => return Ok((false, 0)),
            Err(e) => return Err(e),
        };
        *dest = blockno;
    }

    if indirection == 0 {
        return Ok((true, 1));
    }

    let mut data = if freshly_allocated {
        vec![EOF; layout.single_count as usize]
    } else {
        load_indirect(dev, blockno)?
    };

    let sub_count = layout.indirect_count(indirection - 1);
    let endblock = curblock + layout.single_count * sub_count;
    let mut start_idx = 0i64;
    let mut end_idx = layout.single_count - 1;
    if curblock < old_blockcount {
        start_idx += (old_blockcount - curblock) / sub_count;
    }
    if endblock > new_blockcount {
        end_idx -= (endblock - new_blockcount) / sub_count;
    }

    let mut success = true;
    let mut sum = 0i64;
    let mut i = start_idx;
    while i <= end_idx && success {
        let mut child = data[i as usize];
        let (s, added) = indirect_grow(
            dev,
            &mut child,
            curblock + sub_count * i,
            indirection - 1,
            old_blockcount,
            new_blockcount,
            layout,
        )?;
        data[i as usize] = child;
        success = s;
        sum += added;
        i += 1;
    }

    // Edge case: we allocated this indirect block to grow into it, but the
    // very first child allocation inside it failed — it ended up with no
    // children at all. Free it rather than leave a childless indirect
    // block hanging off the tree.
    if !success && start_idx == 0 && sum == 0 {
        block_free(dev, BlockNo(blockno))?;
        *dest = EOF;
        return Ok((false, 0));
    }

    store_indirect(dev, blockno, &data)?;
    Ok((success, sum))
}

/// Shrinks the subtree rooted at `*dest`, freeing every block whose
/// file-block index falls in `[new_blockcount, old_blockcount)`. Returns
/// the number of blocks freed.
#[allow(clippy::too_many_arguments)]
fn indirect_shrink(
    dev: &dyn BlockDevice,
    dest: &mut i64,
    curblock: i64,
    indirection: i32,
    old_blockcount: i64,
    new_blockcount: i64,
    layout: &Layout,
) -> Result<i64> {
    let blockno = *dest;
    if blockno == EOF {
        return Err(CandyError::Corrupt("shrinking an unallocated block slot"));
    }

    if indirection == 0 {
        block_free(dev, BlockNo(blockno))?;
        *dest = EOF;
        return Ok(1);
    }

    let mut data = load_indirect(dev, blockno)?;
    let sub_count = layout.indirect_count(indirection - 1);
    let endblock = curblock + layout.single_count * sub_count;
    let mut start_idx = 0i64;
    let mut end_idx = layout.single_count - 1;
    if curblock < new_blockcount {
        start_idx += (new_blockcount - curblock) / sub_count;
    }
    if endblock > old_blockcount {
        end_idx -= (endblock - old_blockcount) / sub_count;
    }

    let mut sum = 0i64;
    for i in start_idx..=end_idx {
        let mut child = data[i as usize];
        let removed = indirect_shrink(
            dev,
            &mut child,
            curblock + sub_count * i,
            indirection - 1,
            old_blockcount,
            new_blockcount,
            layout,
        )?;
        data[i as usize] = child;
        sum += removed;
    }

    if data.iter().all(|v| *v == EOF) {
        block_free(dev, BlockNo(blockno))?;
        *dest = EOF;
    } else {
        store_indirect(dev, blockno, &data)?;
    }
    Ok(sum)
}

/// Clips a leaf data block's overlap with `[pos, endpos)` to
/// `(block_delta, data_delta, copy_size)`: how far into the block to
/// start, how far into the caller's buffer to start, and how many bytes
/// to move.
fn leaf_window(block_size: i64, curblock: i64, pos: i64, endpos: i64) -> (i64, i64, i64) {
    let blockpos = curblock * block_size;
    let (block_delta, data_delta) = if blockpos < pos {
        (pos - blockpos, 0)
    } else {
        (0, blockpos - pos)
    };
    let mut copy_size = block_size - block_delta;
    if endpos < blockpos + block_size {
        copy_size -= (blockpos + block_size) - endpos;
    }
    (block_delta, data_delta, copy_size)
}

/// Reads the overlap of `[pos, endpos)` with the subtree rooted at
/// `blockno` into `out`, which is indexed as if `out[0]` were absolute
/// offset `pos`. Returns the number of bytes read.
#[allow(clippy::too_many_arguments)]
fn indirect_read(
    dev: &dyn BlockDevice,
    blockno: i64,
    curblock: i64,
    indirection: i32,
    pos: i64,
    endpos: i64,
    out: &mut [u8],
    layout: &Layout,
) -> Result<i64> {
    if indirection == 0 {
        let (block_delta, data_delta, copy_size) = leaf_window(layout.block_size, curblock, pos, endpos);
        let mut block = vec![0u8; dev.block_size()];
        dev.read_block(blockno, &mut block)?;
        let (bd, dd, cs) = (block_delta as usize, data_delta as usize, copy_size as usize);
        out[dd..dd + cs].copy_from_slice(&block[bd..bd + cs]);
        return Ok(copy_size);
    }

    let data = load_indirect(dev, blockno)?;
    let sub_count = layout.indirect_count(indirection - 1);
    let endblock = curblock + layout.single_count * sub_count;
    let first_block = pos / layout.block_size;
    let last_block = (endpos - 1) / layout.block_size;
    let mut start_idx = 0i64;
    let mut end_idx = layout.single_count - 1;
    if curblock < first_block {
        start_idx += (first_block - curblock) / sub_count;
    }
    if endblock - 1 > last_block {
        end_idx -= (endblock - 1 - last_block) / sub_count;
    }

    let mut total = 0i64;
    for i in start_idx..=end_idx {
        total += indirect_read(
            dev,
            data[i as usize],
            curblock + sub_count * i,
            indirection - 1,
            pos,
            endpos,
            out,
            layout,
        )?;
    }
    Ok(total)
}

/// Writes the overlap of `[pos, endpos)` into the subtree rooted at
/// `blockno`. `data == None` zero-fills instead of copying; otherwise
/// `data[0]` is absolute offset `pos`. Returns bytes written.
#[allow(clippy::too_many_arguments)]
fn indirect_write(
    dev: &dyn BlockDevice,
    blockno: i64,
    curblock: i64,
    indirection: i32,
    pos: i64,
    endpos: i64,
    data: Option<&[u8]>,
    layout: &Layout,
) -> Result<i64> {
    if indirection == 0 {
        let (block_delta, data_delta, copy_size) = leaf_window(layout.block_size, curblock, pos, endpos);
        let (bd, dd, cs) = (block_delta as usize, data_delta as usize, copy_size as usize);
        let mut block = vec![0u8; dev.block_size()];
        if copy_size != layout.block_size {
            dev.read_block(blockno, &mut block)?;
        }
        match data {
            Some(src) => block[bd..bd + cs].copy_from_slice(&src[dd..dd + cs]),
            None => block[bd..bd + cs].iter_mut().for_each(|b| *b = 0),
        }
        dev.write_block(blockno, &block)?;
        return Ok(copy_size);
    }

    let data_blk = load_indirect(dev, blockno)?;
    let sub_count = layout.indirect_count(indirection - 1);
    let endblock = curblock + layout.single_count * sub_count;
    let first_block = pos / layout.block_size;
    let last_block = (endpos - 1) / layout.block_size;
    let mut start_idx = 0i64;
    let mut end_idx = layout.single_count - 1;
    if curblock < first_block {
        start_idx += (first_block - curblock) / sub_count;
    }
    if endblock - 1 > last_block {
        end_idx -= (endblock - 1 - last_block) / sub_count;
    }

    let mut total = 0i64;
    for i in start_idx..=end_idx {
        total += indirect_write(
            dev,
            data_blk[i as usize],
            curblock + sub_count * i,
            indirection - 1,
            pos,
            endpos,
            data,
            layout,
        )?;
    }
    Ok(total)
}

fn load_inode(dev: &dyn BlockDevice, inum: Inum, layout: &Layout) -> Result<(i64, InodeBlock)> {
    let blockno = ino_get(dev, inum)?;
    if blockno.is_eof() {
        return Err(CandyError::NotFound);
    }
    let ib = InodeBlock::load(dev, blockno.0, layout)?;
    Ok((blockno.0, ib))
}

/// Allocates a fresh, zero-length inode with mode `0o777` and no links.
/// Callers (`file_create`, `path_mkdir`, …) are expected to `chmod`/`chown`
/// it to taste before linking it into a directory.
pub fn inode_allocate(dev: &dyn BlockDevice) -> Result<Inum> {
    let layout = Layout::new(dev);
    let now = now_timespec();
    let ib = InodeBlock {
        meta: InodeMeta {
            mode: 0o777,
            owner: 0,
            group: 0,
            nlinks: 0,
            size: 0,
            created: now,
            atime: now,
            mtime: now,
            ctime: now,
        },
        slots: vec![EOF; layout.num_block_slots as usize],
    };

    let inum = ilist_allocate(dev)?;
    let blockno = match block_allocate(dev) {
        Ok(b) => b,
        Err(e) => {
            ilist_free(dev, inum)?;
            return Err(e);
        }
    };
    ino_set(dev, inum, blockno)?;
    ib.store(dev, blockno.0)?;
    Ok(inum)
}

/// Frees an inode with zero links: truncates it to empty, then returns
/// its inode block and inum to their respective free lists.
pub fn inode_free(dev: &dyn BlockDevice, inum: Inum) -> Result<()> {
    let layout = Layout::new(dev);
    let (blockno, ib) = load_inode(dev, inum, &layout)?;
    if ib.meta.nlinks != 0 {
        return Err(CandyError::Corrupt("freeing an inode with nonzero nlinks"));
    }
    inode_setsize(dev, inum, 0)?;
    ilist_free(dev, inum)?;
    block_free(dev, BlockNo(blockno))?;
    Ok(())
}

/// Returns a copy of an inode's fixed-size metadata.
pub fn inode_getinfo(dev: &dyn BlockDevice, inum: Inum) -> Result<InodeMeta> {
    let layout = Layout::new(dev);
    let (_, ib) = load_inode(dev, inum, &layout)?;
    Ok(ib.meta)
}

/// Grows or shrinks an inode to exactly `size` bytes, allocating or
/// freeing whole blocks as needed and clamping to the layout's maximum
/// file size. Returns the size actually committed (which can be short of
/// `size` if growth ran out of space partway through).
pub fn inode_setsize(dev: &dyn BlockDevice, inum: Inum, mut size: i64) -> Result<i64> {
    let layout = Layout::new(dev);
    let (blockno, mut ib) = load_inode(dev, inum, &layout)?;

    if size > layout.max_filesize() {
        size = layout.max_filesize();
    }
    let block_size = layout.block_size;
    let new_blockcount = layout.offset2blockidx(size) + if size % block_size != 0 { 1 } else { 0 };
    let old_blockcount =
        layout.offset2blockidx(ib.meta.size) + if ib.meta.size % block_size != 0 { 1 } else { 0 };

    let mut blockcount = old_blockcount;
    let mut success = true;
    while blockcount < new_blockcount && success {
        let blockidx = blockcount;
        let indirection = layout.indirection_level(blockidx);
        let slot = layout.blockidx2blockslot(blockidx);
        let curblock = layout.blockslot2firstblockidx(slot);
        let (s, added) = indirect_grow(
            dev,
            &mut ib.slots[slot as usize],
            curblock,
            indirection,
            old_blockcount,
            new_blockcount,
            &layout,
        )?;
        success = s;
        blockcount += added;
    }
    while blockcount > new_blockcount {
        let blockidx = blockcount - 1;
        let indirection = layout.indirection_level(blockidx);
        let slot = layout.blockidx2blockslot(blockidx);
        let curblock = layout.blockslot2firstblockidx(slot);
        let freed = indirect_shrink(
            dev,
            &mut ib.slots[slot as usize],
            curblock,
            indirection,
            old_blockcount,
            new_blockcount,
            &layout,
        )?;
        blockcount -= freed;
    }

    let oldsize = ib.meta.size;
    ib.meta.size = if blockcount == new_blockcount {
        size
    } else {
        blockcount * block_size
    };
    if ib.meta.size != oldsize {
        let now = now_timespec();
        ib.meta.ctime = now;
        ib.meta.mtime = now;
    }
    ib.store(dev, blockno)?;
    Ok(ib.meta.size)
}

fn inode_write_impl(dev: &dyn BlockDevice, inum: Inum, pos: i64, data: Option<&[u8]>, size: i64) -> Result<i64> {
    let layout = Layout::new(dev);
    let (blockno, mut ib) = load_inode(dev, inum, &layout)?;

    let mut pos = if pos == -1 { ib.meta.size } else { pos };
    let mut endpos = pos + size;
    let mut zero_endpos = pos;

    if endpos > ib.meta.size {
        if pos > ib.meta.size {
            zero_endpos = pos;
            pos = ib.meta.size;
        }
        inode_setsize(dev, inum, endpos)?;
        let (_, reloaded) = load_inode(dev, inum, &layout)?;
        ib = reloaded;
        if endpos > ib.meta.size {
            endpos = ib.meta.size;
            if zero_endpos < ib.meta.size {
                zero_endpos = ib.meta.size;
            }
        }
    }

    if endpos <= pos {
        return Ok(0);
    }

    let mut curpos = pos;
    while curpos < endpos {
        let blockidx = layout.offset2blockidx(curpos);
        let indirection = layout.indirection_level(blockidx);
        let slot = layout.blockidx2blockslot(blockidx);
        let curblock = layout.blockslot2firstblockidx(slot);
        let slotval = ib.slots[slot as usize];

        let n = if curpos < zero_endpos {
            indirect_write(dev, slotval, curblock, indirection, pos, zero_endpos, None, &layout)?
        } else {
            indirect_write(dev, slotval, curblock, indirection, zero_endpos, endpos, data, &layout)?
        };
        curpos += n;
    }

    ib.meta.mtime = now_timespec();
    ib.store(dev, blockno)?;
    Ok(endpos - zero_endpos)
}

fn inode_write_zero(dev: &dyn BlockDevice, inum: Inum, pos: i64, size: i64) -> Result<i64> {
    inode_write_impl(dev, inum, pos, None, size)
}

/// Writes `data` at `pos` (or appends, if `pos == -1`), extending the
/// inode and zero-filling any gap between the old size and `pos` first.
/// Returns the number of bytes actually written, which is short of
/// `data.len()` only if growth ran out of space partway through.
pub fn inode_write(dev: &dyn BlockDevice, inum: Inum, pos: i64, data: &[u8]) -> Result<i64> {
    inode_write_impl(dev, inum, pos, Some(data), data.len() as i64)
}

/// Reads up to `buf.len()` bytes starting at `pos`, clipped to the
/// inode's current size. Updates the access time. Returns bytes read.
pub fn inode_read(dev: &dyn BlockDevice, inum: Inum, pos: i64, buf: &mut [u8]) -> Result<i64> {
    let layout = Layout::new(dev);
    let (blockno, mut ib) = load_inode(dev, inum, &layout)?;

    let mut endpos = pos + buf.len() as i64;
    if endpos > ib.meta.size {
        endpos = ib.meta.size;
    }
    if endpos <= pos {
        return Ok(0);
    }

    let mut curpos = pos;
    while curpos < endpos {
        let blockidx = layout.offset2blockidx(curpos);
        let indirection = layout.indirection_level(blockidx);
        let slot = layout.blockidx2blockslot(blockidx);
        let curblock = layout.blockslot2firstblockidx(slot);
        let slotval = ib.slots[slot as usize];
        curpos += indirect_read(dev, slotval, curblock, indirection, pos, endpos, buf, &layout)?;
    }

    ib.meta.atime = now_timespec();
    ib.store(dev, blockno)?;
    Ok(endpos - pos)
}

/// Sets the inode's size, zero-filling any newly exposed bytes when
/// growing. Returns the size actually committed.
pub fn inode_truncate(dev: &dyn BlockDevice, inum: Inum, size: i64) -> Result<i64> {
    let layout = Layout::new(dev);
    let (_, ib) = load_inode(dev, inum, &layout)?;
    let oldsize = ib.meta.size;
    let newsize = inode_setsize(dev, inum, size)?;
    if newsize > oldsize {
        inode_write_zero(dev, inum, oldsize, newsize - oldsize)?;
    }
    Ok(newsize)
}

/// Sets the mode bits (not the file-type bits, which callers must
/// preserve themselves by only ever passing back what `inode_getinfo`
/// returned, masked).
pub fn inode_chmod(dev: &dyn BlockDevice, inum: Inum, mode: u32) -> Result<()> {
    let layout = Layout::new(dev);
    let (blockno, mut ib) = load_inode(dev, inum, &layout)?;
    ib.meta.mode = mode;
    ib.meta.ctime = now_timespec();
    ib.store(dev, blockno)
}

/// Sets owner and/or group; `ID_NO_CHANGE` leaves the respective field
/// untouched.
pub fn inode_chown(dev: &dyn BlockDevice, inum: Inum, owner: u32, group: u32) -> Result<()> {
    let layout = Layout::new(dev);
    let (blockno, mut ib) = load_inode(dev, inum, &layout)?;
    if owner != ID_NO_CHANGE {
        ib.meta.owner = owner;
    }
    if group != ID_NO_CHANGE {
        ib.meta.group = group;
    }
    ib.meta.ctime = now_timespec();
    ib.store(dev, blockno)
}

/// Sets access and/or modification time. `None` means "now"
/// (`UTIME_NOW`); `Some(ts)` with `ts.nsec == UTIME_OMIT` leaves that
/// timestamp untouched; any other `Some(ts)` sets it exactly.
pub fn inode_utime(dev: &dyn BlockDevice, inum: Inum, atime: Option<Timespec>, mtime: Option<Timespec>) -> Result<()> {
    let layout = Layout::new(dev);
    let (blockno, mut ib) = load_inode(dev, inum, &layout)?;
    let now = now_timespec();

    match atime {
        None => ib.meta.atime = now,
        Some(ts) if ts.nsec == UTIME_NOW => ib.meta.atime = now,
        Some(ts) if ts.nsec == UTIME_OMIT => {}
        Some(ts) => ib.meta.atime = ts,
    }
    match mtime {
        None => ib.meta.mtime = now,
        Some(ts) if ts.nsec == UTIME_NOW => ib.meta.mtime = now,
        Some(ts) if ts.nsec == UTIME_OMIT => {}
        Some(ts) => ib.meta.mtime = ts,
    }
    ib.meta.ctime = now;
    ib.store(dev, blockno)
}

/// Increments the link count, returning the new value.
pub fn inode_link(dev: &dyn BlockDevice, inum: Inum) -> Result<u32> {
    let layout = Layout::new(dev);
    let (blockno, mut ib) = load_inode(dev, inum, &layout)?;
    ib.meta.nlinks += 1;
    ib.meta.ctime = now_timespec();
    ib.store(dev, blockno)?;
    Ok(ib.meta.nlinks)
}

/// Decrements the link count, returning the new value. Does not free the
/// inode even if the result is zero — that is the caller's decision
/// (`refs.rs` ties it to the open-reference count).
pub fn inode_unlink(dev: &dyn BlockDevice, inum: Inum) -> Result<u32> {
    let layout = Layout::new(dev);
    let (blockno, mut ib) = load_inode(dev, inum, &layout)?;
    ib.meta.nlinks -= 1;
    ib.meta.ctime = now_timespec();
    ib.store(dev, blockno)?;
    Ok(ib.meta.nlinks)
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
    fn allocate_free_roundtrip() {
        let dev = fresh(256);
        let inum = inode_allocate(&dev).unwrap();
        let info = inode_getinfo(&dev, inum).unwrap();
        assert_eq!(info.size, 0);
        assert_eq!(info.nlinks, 0);
        inode_free(&dev, inum).unwrap();
        assert!(inode_getinfo(&dev, inum).is_err());
    }

    #[test]
    fn write_then_read_small() {
        let dev = fresh(256);
        let inum = inode_allocate(&dev).unwrap();
        inode_link(&dev, inum).unwrap();
        let payload = b"hello, candyfs";
        let n = inode_write(&dev, inum, 0, payload).unwrap();
        assert_eq!(n as usize, payload.len());

        let mut buf = vec![0u8; payload.len()];
        let r = inode_read(&dev, inum, 0, &mut buf).unwrap();
        assert_eq!(r as usize, payload.len());
        assert_eq!(&buf, payload);
    }

    #[test]
    fn sparse_write_zero_fills_gap() {
        let dev = fresh(256);
        let inum = inode_allocate(&dev).unwrap();
        inode_link(&dev, inum).unwrap();
        inode_write(&dev, inum, 1000, b"tail").unwrap();

        let mut buf = vec![0xffu8; 10];
        inode_read(&dev, inum, 500, &mut buf).unwrap();
        assert_eq!(buf, vec![0u8; 10]);

        let mut tail = vec![0u8; 4];
        inode_read(&dev, inum, 1000, &mut tail).unwrap();
        assert_eq!(&tail, b"tail");
    }

    #[test]
    fn append_crosses_into_single_indirect() {
        let dev = fresh(4096);
        let inum = inode_allocate(&dev).unwrap();
        inode_link(&dev, inum).unwrap();
        let chunk = vec![7u8; 512];
        // Enough appended 512-byte chunks to exceed however many direct
        // slots this block size affords and spill into the single
        // indirect block.
        for _ in 0..40 {
            inode_write(&dev, inum, -1, &chunk).unwrap();
        }
        let info = inode_getinfo(&dev, inum).unwrap();
        assert_eq!(info.size, 40 * 512);

        let mut buf = vec![0u8; 512];
        inode_read(&dev, inum, 39 * 512, &mut buf).unwrap();
        assert_eq!(buf, chunk);
    }

    #[test]
    fn truncate_to_zero_frees_all_blocks() {
        let dev = fresh(4096);
        let inum = inode_allocate(&dev).unwrap();
        inode_link(&dev, inum).unwrap();
        let chunk = vec![3u8; 512];
        for _ in 0..20 {
            inode_write(&dev, inum, -1, &chunk).unwrap();
        }
        inode_truncate(&dev, inum, 0).unwrap();
        let info = inode_getinfo(&dev, inum).unwrap();
        assert_eq!(info.size, 0);

        // All the blocks freed by the truncate must be re-allocatable.
        let mut reacquired = 0;
        while block_allocate(&dev).is_ok() {
            reacquired += 1;
            if reacquired > 10_000 {
                break;
            }
        }
        assert!(reacquired >= 20);
    }

    #[test]
    fn chmod_chown_utime_sentinels() {
        let dev = fresh(256);
        let inum = inode_allocate(&dev).unwrap();
        inode_chmod(&dev, inum, 0o644).unwrap();
        inode_chown(&dev, inum, 42, ID_NO_CHANGE).unwrap();
        let info = inode_getinfo(&dev, inum).unwrap();
        assert_eq!(info.mode, 0o644);
        assert_eq!(info.owner, 42);
        assert_eq!(info.group, 0);

        let fixed = Timespec { sec: 123, nsec: 456 };
        inode_utime(&dev, inum, Some(fixed), Some(Timespec { sec: 0, nsec: UTIME_OMIT })).unwrap();
        let info = inode_getinfo(&dev, inum).unwrap();
        assert_eq!(info.atime, fixed);
        assert_ne!(info.mtime, Timespec { sec: 0, nsec: UTIME_OMIT });
    }
}
