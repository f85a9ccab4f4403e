//! Top-level filesystem façade (spec §9 "global mutable tables ... process-
//! wide in the source — encapsulate them inside an owned *Filesystem*
//! object threaded through every operation"): owns the block device plus
//! both in-memory tables ([`RefTable`], [`PathTable`]) and exposes one
//! method per bridge operation (spec §6), composing the lower layers the
//! same way `examples/casys-kaist-KeOS`'s `FastFileSystemInner` composes
//! its own inode cache, journal, and disk handle behind a single struct
//! that every filesystem call goes through.

use std::collections::HashMap;

use crate::device::BlockDevice;
use crate::error::{CandyError, Result};
use crate::inode::{self, InodeMeta, Timespec};
use crate::path::{self, NameiOutcome, PathTable, NOBLOCK_FAIL};
use crate::perm::{self, Perm};
use crate::refs::RefTable;
use crate::symlink;
use crate::types::{mode_bits, FileKind, Inum, ROOT_INUM};
use crate::{dir, file};

/// Credentials a bridge call acts under (`fuser::Request::uid()/gid()`).
#[derive(Clone, Copy, Debug)]
pub struct Caller {
    pub uid: u32,
    pub gid: u32,
}

/// What an open file handle refers to. `open`/`create` store `File`;
/// `opendir` stores `Dir`. Both hold the inum's open reference alive until
/// `release`/`releasedir`.
#[derive(Clone, Copy)]
enum Handle {
    File(Inum),
    Dir(Inum),
}

/// The mounted filesystem: one block device, its open-inode table, and its
/// open-path table, plus the bridge's numeric file-handle table.
pub struct Filesystem {
    dev: Box<dyn BlockDevice>,
    refs: RefTable,
    paths: PathTable,
    handles: HashMap<u64, Handle>,
    next_fh: u64,
}

impl Filesystem {
    /// Mounts an already-formatted device.
    pub fn new(dev: Box<dyn BlockDevice>) -> Self {
        Self {
            dev,
            refs: RefTable::new(),
            paths: PathTable::new(),
            handles: HashMap::new(),
            next_fh: 1,
        }
    }

    fn resolve(&mut self, path: &str, deref: bool, caller: Caller) -> Result<Inum> {
        path::path_resolve(&*self.dev, &mut self.refs, ROOT_INUM, ROOT_INUM, path, deref, caller.uid, caller.gid)
    }

    fn open_handle(&mut self, path: &str, caller: Caller, noblock: i32) -> Result<path::PathHandle> {
        self.paths.open(&*self.dev, &mut self.refs, ROOT_INUM, ROOT_INUM, path, caller.uid, caller.gid, noblock)
    }

    fn alloc_fh(&mut self) -> u64 {
        let fh = self.next_fh;
        self.next_fh += 1;
        fh
    }

    fn handle_inum(&self, fh: u64) -> Result<Inum> {
        match self.handles.get(&fh) {
            Some(Handle::File(i)) | Some(Handle::Dir(i)) => Ok(*i),
            None => Err(CandyError::InvalidArgument),
        }
    }

    // -- getattr / fgetattr --------------------------------------------

    pub fn getattr(&mut self, path: &str, caller: Caller) -> Result<InodeMeta> {
        let inum = self.resolve(path, true, caller)?;
        let meta = inode::inode_getinfo(&*self.dev, inum);
        self.refs.close(&*self.dev, inum)?;
        meta
    }

    pub fn fgetattr(&self, fh: u64) -> Result<InodeMeta> {
        inode::inode_getinfo(&*self.dev, self.handle_inum(fh)?)
    }

    /// `getattr` by ino for the bridge's own path cache, which already
    /// knows the inum and has no path-walk left to do.
    pub fn fgetattr_or_stat(&self, inum: Inum) -> Result<InodeMeta> {
        inode::inode_getinfo(&*self.dev, inum)
    }

    /// Read-only device access for the bridge's `readdir`, which needs each
    /// entry's kind without opening a fresh reference per entry.
    pub fn device(&self) -> &dyn BlockDevice {
        &*self.dev
    }

    /// Block size of the mounted device, for `statfs` and stat-struct
    /// filling at the bridge.
    pub fn block_size(&self) -> usize {
        self.dev.block_size()
    }

    /// FUSE's `lookup`: resolves `parent_path/name` and keeps one open
    /// reference alive on behalf of the kernel's dentry cache, to be
    /// released in matching `forget` calls (spec §4.3's `refs_open`
    /// contract maps directly onto FUSE's lookup/forget protocol).
    pub fn lookup(&mut self, parent_path: &str, name: &str, caller: Caller) -> Result<(Inum, InodeMeta)> {
        let full = if parent_path == "/" {
            format!("/{name}")
        } else {
            format!("{parent_path}/{name}")
        };
        let inum = self.resolve(&full, true, caller)?;
        match inode::inode_getinfo(&*self.dev, inum) {
            Ok(meta) => Ok((inum, meta)),
            Err(e) => {
                let _ = self.refs.close(&*self.dev, inum);
                Err(e)
            }
        }
    }

    /// FUSE's `forget`: releases `nlookup` references accumulated by past
    /// `lookup` calls on this inum.
    pub fn forget(&mut self, inum: Inum, nlookup: u64) {
        for _ in 0..nlookup {
            let _ = self.refs.close(&*self.dev, inum);
        }
    }

    // -- symlink ----------------------------------------------------------

    pub fn readlink(&mut self, path: &str, caller: Caller) -> Result<String> {
        let inum = self.resolve(path, false, caller)?;
        let target = symlink::read(&*self.dev, inum, symlink::MAX_TARGET_LEN);
        self.refs.close(&*self.dev, inum)?;
        target
    }

    pub fn symlink(&mut self, target: &str, linkpath: &str, caller: Caller) -> Result<(Inum, InodeMeta)> {
        let inum = symlink::create(&*self.dev, target)?;
        self.refs.open(&*self.dev, inum)?;
        let linked = self.link_new_inode(linkpath, inum, caller);
        match linked {
            Ok(()) => {
                let meta = inode::inode_getinfo(&*self.dev, inum);
                self.refs.close(&*self.dev, inum)?;
                meta.map(|m| (inum, m))
            }
            Err(e) => {
                let _ = self.refs.close(&*self.dev, inum);
                Err(e)
            }
        }
    }

    /// Bare reference-table passthroughs for the bridge's own dentry-cache
    /// bookkeeping (FUSE's lookup/forget protocol, kept separate from any
    /// file-handle reference an `open`/`create` call also holds).
    pub fn ref_open(&mut self, inum: Inum) -> Result<()> {
        self.refs.open(&*self.dev, inum)
    }

    pub fn ref_close(&mut self, inum: Inum) -> Result<()> {
        self.refs.close(&*self.dev, inum)
    }

    fn link_new_inode(&mut self, linkpath: &str, inum: Inum, caller: Caller) -> Result<()> {
        let handle = self.open_handle(linkpath, caller, 0)?;
        let result = path::path_link(&*self.dev, &mut self.refs, &self.paths, handle, inum, caller.uid, caller.gid);
        self.paths.close(&*self.dev, &mut self.refs, handle)?;
        result
    }

    // -- hard links ---------------------------------------------------

    pub fn link(&mut self, oldpath: &str, newpath: &str, caller: Caller) -> Result<(Inum, InodeMeta)> {
        let inum = self.resolve(oldpath, false, caller)?;
        let result = self.link_new_inode(newpath, inum, caller);
        match result {
            Ok(()) => {
                let meta = inode::inode_getinfo(&*self.dev, inum);
                self.refs.close(&*self.dev, inum)?;
                meta.map(|m| (inum, m))
            }
            Err(e) => {
                let _ = self.refs.close(&*self.dev, inum);
                Err(e)
            }
        }
    }

    pub fn unlink(&mut self, path: &str, caller: Caller) -> Result<()> {
        let handle = self.open_handle(path, caller, 0)?;
        let result = path::path_unlink(&*self.dev, &mut self.refs, &self.paths, handle, caller.uid, caller.gid);
        self.paths.close(&*self.dev, &mut self.refs, handle)?;
        result
    }

    // -- directories ----------------------------------------------------

    pub fn mkdir(&mut self, path: &str, mode: u32, caller: Caller) -> Result<(Inum, InodeMeta)> {
        let handle = self.open_handle(path, caller, 0)?;
        let result = path::path_mkdir(&*self.dev, &mut self.refs, &self.paths, handle, mode, caller.uid, caller.gid);
        self.paths.close(&*self.dev, &mut self.refs, handle)?;
        let inum = result?;
        inode::inode_getinfo(&*self.dev, inum).map(|m| (inum, m))
    }

    pub fn rmdir(&mut self, path: &str, caller: Caller) -> Result<()> {
        let handle = self.open_handle(path, caller, 0)?;
        let result = path::path_rmdir(&*self.dev, &mut self.refs, &self.paths, handle, caller.uid, caller.gid);
        self.paths.close(&*self.dev, &mut self.refs, handle)?;
        result
    }

    /// `readdir`: one `dir_enumerate` step. The bridge loops until `None`.
    pub fn readdir(&self, fh: u64, offset: u64) -> Result<Option<(Inum, String, u64)>> {
        let inum = self.handle_inum(fh)?;
        dir::enumerate(&*self.dev, inum, offset)
    }

    // -- rename -----------------------------------------------------------

    /// Implements the rename self-path shortcut of spec §9: opening the
    /// source with `noblock = -2` after the destination is already open
    /// turns "same (parent, basename) as an existing entry" into an
    /// immediate `WouldBlock`, which here just means "renaming onto
    /// itself" and is treated as a successful no-op.
    pub fn rename(&mut self, oldpath: &str, newpath: &str, caller: Caller) -> Result<()> {
        let dst = self.open_handle(newpath, caller, 0)?;
        let src = match self.open_handle(oldpath, caller, NOBLOCK_FAIL) {
            Ok(h) => h,
            Err(CandyError::WouldBlock) => {
                self.paths.close(&*self.dev, &mut self.refs, dst)?;
                return Ok(());
            }
            Err(e) => {
                let _ = self.paths.close(&*self.dev, &mut self.refs, dst);
                return Err(e);
            }
        };
        let result = path::path_rename(&*self.dev, &mut self.refs, &self.paths, dst, src, caller.uid, caller.gid);
        let _ = self.paths.close(&*self.dev, &mut self.refs, src);
        let _ = self.paths.close(&*self.dev, &mut self.refs, dst);
        result
    }

    // -- permission / attributes -------------------------------------

    pub fn chmod(&mut self, path: &str, mode: u32, caller: Caller) -> Result<()> {
        let inum = self.resolve(path, true, caller)?;
        let result = self.chmod_inum(inum, mode, caller);
        self.refs.close(&*self.dev, inum)?;
        result
    }

    fn chmod_inum(&self, inum: Inum, mode: u32, caller: Caller) -> Result<()> {
        let meta = inode::inode_getinfo(&*self.dev, inum)?;
        if !perm::can_chmod(&meta, caller.uid) {
            return Err(CandyError::AccessDenied);
        }
        let kind_bits = meta.mode & mode_bits::S_IFMT;
        inode::inode_chmod(&*self.dev, inum, (mode & perm::CHMOD_MASK) | kind_bits)
    }

    pub fn chown(&mut self, path: &str, owner: u32, group: u32, caller: Caller) -> Result<()> {
        let inum = self.resolve(path, true, caller)?;
        let result = if perm::can_chown(caller.uid) {
            inode::inode_chown(&*self.dev, inum, owner, group)
        } else {
            Err(CandyError::AccessDenied)
        };
        self.refs.close(&*self.dev, inum)?;
        result
    }

    pub fn utimens(&mut self, path: &str, atime: Option<Timespec>, mtime: Option<Timespec>, caller: Caller) -> Result<()> {
        let inum = self.resolve(path, true, caller)?;
        let result = (|| {
            let meta = inode::inode_getinfo(&*self.dev, inum)?;
            if !perm::check_utime(&meta, caller.uid, caller.gid) {
                return Err(CandyError::AccessDenied);
            }
            inode::inode_utime(&*self.dev, inum, atime, mtime)
        })();
        self.refs.close(&*self.dev, inum)?;
        result
    }

    pub fn access(&mut self, path: &str, want: Perm, caller: Caller) -> Result<()> {
        let inum = self.resolve(path, true, caller)?;
        let meta = inode::inode_getinfo(&*self.dev, inum);
        self.refs.close(&*self.dev, inum)?;
        let meta = meta?;
        if want.is_empty() || perm::check(&meta, caller.uid, caller.gid, want) {
            Ok(())
        } else {
            Err(CandyError::AccessDenied)
        }
    }

    // -- regular files ----------------------------------------------------

    /// `create`: `file_create` + `chown` + `chmod` + `path_link`, leaving
    /// the new inode open under the returned handle (FUSE's `create`
    /// doubles as an implicit `open`).
    pub fn create(&mut self, path: &str, mode: u32, caller: Caller) -> Result<(Inum, InodeMeta, u64)> {
        let inum = file::create(&*self.dev)?;
        let setup: Result<()> = (|| {
            inode::inode_chown(&*self.dev, inum, caller.uid, caller.gid)?;
            inode::inode_chmod(&*self.dev, inum, (mode & perm::CHMOD_MASK) | mode_bits::S_IFREG)
        })();
        if let Err(e) = setup {
            let _ = inode::inode_free(&*self.dev, inum);
            return Err(e);
        }

        self.refs.open(&*self.dev, inum)?;
        if let Err(e) = self.link_new_inode(path, inum, caller) {
            let _ = self.refs.close(&*self.dev, inum);
            return Err(e);
        }

        let fh = self.alloc_fh();
        self.handles.insert(fh, Handle::File(inum));
        let meta = inode::inode_getinfo(&*self.dev, inum)?;
        Ok((inum, meta, fh))
    }

    pub fn open(&mut self, path: &str, want: Perm, caller: Caller) -> Result<u64> {
        let inum = self.resolve(path, true, caller)?;
        let meta = inode::inode_getinfo(&*self.dev, inum);
        let result: Result<()> = (|| {
            let meta = meta?;
            if FileKind::from_mode(meta.mode) == Some(FileKind::Directory) {
                return Err(CandyError::IsADirectory);
            }
            if !want.is_empty() && !perm::check(&meta, caller.uid, caller.gid, want) {
                return Err(CandyError::AccessDenied);
            }
            Ok(())
        })();
        if let Err(e) = result {
            let _ = self.refs.close(&*self.dev, inum);
            return Err(e);
        }
        let fh = self.alloc_fh();
        self.handles.insert(fh, Handle::File(inum));
        Ok(fh)
    }

    pub fn opendir(&mut self, path: &str, caller: Caller) -> Result<u64> {
        let inum = self.resolve(path, true, caller)?;
        let meta = inode::inode_getinfo(&*self.dev, inum);
        match meta {
            Ok(m) if FileKind::from_mode(m.mode) == Some(FileKind::Directory) => {}
            Ok(_) => {
                let _ = self.refs.close(&*self.dev, inum);
                return Err(CandyError::NotADirectory);
            }
            Err(e) => {
                let _ = self.refs.close(&*self.dev, inum);
                return Err(e);
            }
        }
        let fh = self.alloc_fh();
        self.handles.insert(fh, Handle::Dir(inum));
        Ok(fh)
    }

    pub fn release(&mut self, fh: u64) -> Result<()> {
        if let Some(Handle::File(inum)) = self.handles.remove(&fh) {
            self.refs.close(&*self.dev, inum)
        } else {
            Err(CandyError::InvalidArgument)
        }
    }

    pub fn releasedir(&mut self, fh: u64) -> Result<()> {
        if let Some(Handle::Dir(inum)) = self.handles.remove(&fh) {
            self.refs.close(&*self.dev, inum)
        } else {
            Err(CandyError::InvalidArgument)
        }
    }

    pub fn read(&self, fh: u64, pos: i64, buf: &mut [u8]) -> Result<i64> {
        file::read(&*self.dev, self.handle_inum(fh)?, pos, buf)
    }

    pub fn write(&mut self, fh: u64, pos: i64, data: &[u8]) -> Result<i64> {
        file::write(&*self.dev, self.handle_inum(fh)?, pos, data)
    }

    pub fn truncate(&mut self, path: &str, size: i64, caller: Caller) -> Result<i64> {
        let inum = self.resolve(path, true, caller)?;
        let result = file::truncate(&*self.dev, inum, size);
        self.refs.close(&*self.dev, inum)?;
        result
    }

    pub fn ftruncate(&mut self, fh: u64, size: i64) -> Result<i64> {
        file::truncate(&*self.dev, self.handle_inum(fh)?, size)
    }

    /// `statfs`: total blocks from the device, free blocks by walking the
    /// freelist chain (same traversal `block_allocate`/`block_free` use,
    /// just read-only and to completion).
    pub fn statfs(&self) -> Result<(u64, u64)> {
        let total = self.dev.num_blocks();
        let free = crate::block::count_free_blocks(&*self.dev)?;
        Ok((total, free))
    }
}

/// Formats a fresh device and creates its root directory (spec §4.7
/// `mkfs_path`, invoked by `mkfs.candyfs`).
pub fn mkfs(dev: &dyn BlockDevice, ilist_block_count: u32, owner: u32, group: u32) -> Result<()> {
    crate::block::mkfs_storage(dev, ilist_block_count)?;
    let mut refs = RefTable::new();
    path::mkfs_path(dev, &mut refs, owner, group)
}

/// Resolves a path with no symlink dereferencing, used by the open-path
/// table's "validate the parent chain" step when the source spells out
/// `deref=true` for anything that is not the final component. Re-exported
/// for binaries that want to sanity-check a path before mounting.
pub fn exists(dev: &dyn BlockDevice, path: &str) -> Result<bool> {
    let mut refs = RefTable::new();
    match path::namei(dev, &mut refs, ROOT_INUM, ROOT_INUM, path, true, 0, 0)? {
        NameiOutcome::Found(inum) => {
            refs.close(dev, inum)?;
            Ok(true)
        }
        NameiOutcome::MissingLast { parent, .. } => {
            refs.close(dev, parent)?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryDevice;

    fn mounted(nblocks: u64, ilist: u32) -> Filesystem {
        let dev = MemoryDevice::new(nblocks, 512);
        mkfs(&dev, ilist, 0, 0).unwrap();
        Filesystem::new(Box::new(dev))
    }

    fn root() -> Caller {
        Caller { uid: 0, gid: 0 }
    }

    #[test]
    fn scenario_create_write_read_unlink() {
        let mut fs = mounted(2048, 50);
        let (_, _, fh) = fs.create("/a", 0o644, root()).unwrap();
        assert_eq!(fs.write(fh, 0, b"Hello").unwrap(), 5);
        let mut buf = [0u8; 5];
        assert_eq!(fs.read(fh, 0, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"Hello");
        fs.release(fh).unwrap();
        fs.unlink("/a", root()).unwrap();
        assert!(matches!(fs.getattr("/a", root()), Err(CandyError::NotFound)));
    }

    #[test]
    fn scenario_mkdir_rmdir_requires_empty() {
        let mut fs = mounted(2048, 50);
        fs.mkdir("/d", 0o755, root()).unwrap();
        let (_, _, fh) = fs.create("/d/x", 0o644, root()).unwrap();
        fs.release(fh).unwrap();
        assert!(matches!(fs.rmdir("/d", root()), Err(CandyError::NotEmpty)));
        fs.unlink("/d/x", root()).unwrap();
        fs.rmdir("/d", root()).unwrap();
    }

    #[test]
    fn scenario_symlink_follows_to_target() {
        let mut fs = mounted(2048, 50);
        let (_, _, fh) = fs.create("/tgt", 0o644, root()).unwrap();
        fs.release(fh).unwrap();
        fs.symlink("/tgt", "/l", root()).unwrap();
        assert_eq!(fs.readlink("/l", root()).unwrap(), "/tgt");

        let fh = fs.open("/l", Perm::WRITE, root()).unwrap();
        fs.write(fh, 0, b"via-link").unwrap();
        fs.release(fh).unwrap();

        let fh = fs.open("/tgt", Perm::READ, root()).unwrap();
        let mut buf = [0u8; 8];
        fs.read(fh, 0, &mut buf).unwrap();
        fs.release(fh).unwrap();
        assert_eq!(&buf, b"via-link");
    }

    #[test]
    fn scenario_sparse_write_zero_fills() {
        let mut fs = mounted(4096, 50);
        let (_, _, fh) = fs.create("/a", 0o644, root()).unwrap();
        fs.write(fh, 1_000_000, &vec![7u8; 100_000]).unwrap();
        let meta = fs.fgetattr(fh).unwrap();
        assert_eq!(meta.size, 1_100_000);

        let mut buf = vec![0u8; 500_000];
        fs.read(fh, 500_000, &mut buf).unwrap();
        assert!(buf[..499_000].iter().all(|&b| b == 0));
        fs.release(fh).unwrap();
    }

    #[test]
    fn scenario_hardlink_survives_unlink_while_open() {
        let mut fs = mounted(2048, 50);
        let (_, _, fh) = fs.create("/a", 0o644, root()).unwrap();
        fs.link("/a", "/b", root()).unwrap();
        assert_eq!(fs.getattr("/a", root()).unwrap().nlinks, 2);
        fs.unlink("/a", root()).unwrap();
        assert_eq!(fs.getattr("/b", root()).unwrap().nlinks, 1);
        fs.write(fh, 0, b"still alive").unwrap();
        fs.release(fh).unwrap();
    }

    #[test]
    fn scenario_rename_self_is_noop_and_nonempty_dst_rejected() {
        let mut fs = mounted(2048, 50);
        let (_, _, fh) = fs.create("/a", 0o644, root()).unwrap();
        fs.release(fh).unwrap();
        fs.rename("/a", "/a", root()).unwrap();
        assert!(fs.getattr("/a", root()).is_ok());

        fs.mkdir("/dir_nonempty", 0o755, root()).unwrap();
        let (_, _, fh) = fs.create("/dir_nonempty/x", 0o644, root()).unwrap();
        fs.release(fh).unwrap();
        fs.mkdir("/other", 0o755, root()).unwrap();
        let (_, _, fh) = fs.create("/other/y", 0o644, root()).unwrap();
        fs.release(fh).unwrap();
        assert!(matches!(fs.rename("/dir_nonempty", "/other", root()), Err(CandyError::NotEmpty)));
    }

    #[test]
    fn permission_denied_for_non_owner_write() {
        let mut fs = mounted(2048, 50);
        let (_, _, fh) = fs.create("/a", 0o600, root()).unwrap();
        fs.release(fh).unwrap();
        let other = Caller { uid: 1000, gid: 1000 };
        assert!(matches!(fs.open("/a", Perm::WRITE, other), Err(CandyError::AccessDenied)));
    }
}
