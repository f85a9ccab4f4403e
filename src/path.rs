//! Path layer (spec §4.7): `namei`, the open-path table, and every
//! structural operation (`link`/`unlink`/`mkdir`/`rmdir`/`rename`) built on
//! top of it.
//!
//! The "global mutable tables are process-wide in the source" design note
//! (spec §9) is why [`PathTable`] here is a plain owned struct rather than
//! a static: it gets threaded through every call the same way the
//! teacher's `FastFileSystemInner` threads its own inode cache through
//! every `allocate_inode`/`get_inode` call in
//! `examples/casys-kaist-KeOS/keos-projects/keos-project5::ffs`. The
//! reference-counted "hold one ref, swap it out on every reassignment"
//! discipline `namei` has to honor is the direct analogue of that
//! teacher's `TrackedInode`/`Arc` refcounting, just spelled out by hand
//! since CandyFS's inums aren't `Arc`-backed.

use crate::dir;
use crate::error::{CandyError, Result};
use crate::inode::{self, InodeMeta};
use crate::perm::{self, Perm};
use crate::refs::RefTable;
use crate::types::{FileKind, Inum, ROOT_INUM};
use crate::{device::BlockDevice, symlink};

/// Hard cap on nested symlink resolution (spec §4.7/§7).
const MAX_SYMLINK_DEPTH: u32 = 8;

/// `path_open`'s `noblock` sentinel meaning "don't wait, fail instead".
pub const NOBLOCK_FAIL: i32 = -2;

/// Outcome of a full `namei` resolution. Both variants hand back exactly
/// one open reference that the caller must eventually `refs_close`.
pub enum NameiOutcome {
    /// The path resolved fully; holds one reference on the result.
    Found(Inum),
    /// Every component but the last exists; `parent` is a directory
    /// (referenced) and `name` is the component that was not found.
    MissingLast { parent: Inum, name: String },
}

fn split_components(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn require_directory(meta: &InodeMeta) -> Result<()> {
    if FileKind::from_mode(meta.mode) == Some(FileKind::Directory) {
        Ok(())
    } else {
        Err(CandyError::NotADirectory)
    }
}

/// Resolves `path` starting from `start` (which must already hold one open
/// reference — consumed by this call). An absolute path resets the walk
/// to `rootdir` first. Trailing symlinks are followed only when `deref`
/// is set; intermediate ones always are.
pub fn namei(
    dev: &dyn BlockDevice,
    refs: &mut RefTable,
    rootdir: Inum,
    start: Inum,
    path: &str,
    deref: bool,
    uid: u32,
    gid: u32,
) -> Result<NameiOutcome> {
    namei_depth(dev, refs, rootdir, start, path, deref, uid, gid, 0)
}

fn namei_depth(
    dev: &dyn BlockDevice,
    refs: &mut RefTable,
    rootdir: Inum,
    start: Inum,
    path: &str,
    deref: bool,
    uid: u32,
    gid: u32,
    mut depth: u32,
) -> Result<NameiOutcome> {
    let mut cur = if path.starts_with('/') {
        refs.close(dev, start)?;
        refs.open(dev, rootdir)?;
        rootdir
    } else {
        start
    };

    let comps = split_components(path);
    if comps.is_empty() {
        return Ok(NameiOutcome::Found(cur));
    }

    for (i, name) in comps.iter().enumerate() {
        let is_last = i + 1 == comps.len();

        let dir_meta = match inode::inode_getinfo(dev, cur) {
            Ok(m) => m,
            Err(e) => {
                let _ = refs.close(dev, cur);
                return Err(e);
            }
        };
        if let Err(e) = require_directory(&dir_meta) {
            let _ = refs.close(dev, cur);
            return Err(e);
        }
        if !perm::check(&dir_meta, uid, gid, Perm::EXEC) {
            let _ = refs.close(dev, cur);
            return Err(CandyError::AccessDenied);
        }

        let lookup_dir = cur;
        let next = match dir::lookup(dev, lookup_dir, name) {
            Ok(n) => n,
            Err(CandyError::NotFound) if is_last => {
                return Ok(NameiOutcome::MissingLast { parent: lookup_dir, name: (*name).to_string() });
            }
            Err(e) => {
                let _ = refs.close(dev, lookup_dir);
                return Err(e);
            }
        };
        if let Err(e) = refs.open(dev, next) {
            let _ = refs.close(dev, lookup_dir);
            return Err(e);
        }

        let should_deref = if is_last { deref } else { true };
        let mut resolved = next;
        if should_deref {
            loop {
                let meta = match inode::inode_getinfo(dev, resolved) {
                    Ok(m) => m,
                    Err(e) => {
                        let _ = refs.close(dev, resolved);
                        let _ = refs.close(dev, lookup_dir);
                        return Err(e);
                    }
                };
                if FileKind::from_mode(meta.mode) != Some(FileKind::Symlink) {
                    break;
                }
                depth += 1;
                if depth > MAX_SYMLINK_DEPTH {
                    let _ = refs.close(dev, resolved);
                    let _ = refs.close(dev, lookup_dir);
                    return Err(CandyError::TooManyLinks);
                }
                let target = match symlink::read(dev, resolved, symlink::MAX_TARGET_LEN) {
                    Ok(t) => t,
                    Err(e) => {
                        let _ = refs.close(dev, resolved);
                        let _ = refs.close(dev, lookup_dir);
                        return Err(e);
                    }
                };
                let _ = refs.close(dev, resolved);
                // A relative symlink target resolves against the directory
                // that contained the link, not the caller's original cwd.
                if let Err(e) = refs.open(dev, lookup_dir) {
                    let _ = refs.close(dev, lookup_dir);
                    return Err(e);
                }
                match namei_depth(dev, refs, rootdir, lookup_dir, &target, true, uid, gid, depth) {
                    Ok(NameiOutcome::Found(r)) => resolved = r,
                    Ok(NameiOutcome::MissingLast { parent, .. }) => {
                        let _ = refs.close(dev, parent);
                        let _ = refs.close(dev, lookup_dir);
                        return Err(CandyError::NotFound);
                    }
                    Err(e) => {
                        let _ = refs.close(dev, lookup_dir);
                        return Err(e);
                    }
                }
            }
        }

        if let Err(e) = refs.close(dev, lookup_dir) {
            let _ = refs.close(dev, resolved);
            return Err(e);
        }
        cur = resolved;

        if !is_last {
            let meta = match inode::inode_getinfo(dev, cur) {
                Ok(m) => m,
                Err(e) => {
                    let _ = refs.close(dev, cur);
                    return Err(e);
                }
            };
            if let Err(e) = require_directory(&meta) {
                let _ = refs.close(dev, cur);
                return Err(e);
            }
        }
    }

    Ok(NameiOutcome::Found(cur))
}

/// Resolves `path` fully; a missing final component is reported as
/// `ENOENT` rather than the raw `MissingLast` variant (spec §4.7
/// "`path_resolve`: shorthand for the common resolve, EOF → ENOENT
/// pattern").
pub fn path_resolve(
    dev: &dyn BlockDevice,
    refs: &mut RefTable,
    rootdir: Inum,
    cwd: Inum,
    path: &str,
    deref: bool,
    uid: u32,
    gid: u32,
) -> Result<Inum> {
    refs.open(dev, cwd)?;
    match namei(dev, refs, rootdir, cwd, path, deref, uid, gid)? {
        NameiOutcome::Found(inum) => Ok(inum),
        NameiOutcome::MissingLast { parent, .. } => {
            refs.close(dev, parent)?;
            Err(CandyError::NotFound)
        }
    }
}

fn split_parent_and_name(path: &str) -> (String, String) {
    let comps = split_components(path);
    match comps.split_last() {
        None => ("/".to_string(), ".".to_string()),
        Some((last, rest)) => {
            let dirpath = if path.starts_with('/') { "/".to_string() } else { String::new() } + &rest.join("/");
            (dirpath, (*last).to_string())
        }
    }
}

fn resolve_parent_dir(
    dev: &dyn BlockDevice,
    refs: &mut RefTable,
    rootdir: Inum,
    cwd: Inum,
    dirpath: &str,
    uid: u32,
    gid: u32,
) -> Result<Inum> {
    refs.open(dev, cwd)?;
    let parent = match namei(dev, refs, rootdir, cwd, dirpath, true, uid, gid)? {
        NameiOutcome::Found(inum) => inum,
        NameiOutcome::MissingLast { parent, .. } => {
            refs.close(dev, parent)?;
            return Err(CandyError::NotFound);
        }
    };
    let meta = match inode::inode_getinfo(dev, parent) {
        Ok(m) => m,
        Err(e) => {
            let _ = refs.close(dev, parent);
            return Err(e);
        }
    };
    if require_directory(&meta).is_err() {
        let _ = refs.close(dev, parent);
        return Err(CandyError::NotADirectory);
    }
    Ok(parent)
}

struct PathEntry {
    refcount: u32,
    parent: Inum,
    basename: String,
}

/// Opaque handle into the open-path table; index-based rather than a raw
/// pointer, the natural translation of the teacher's habit of using plain
/// indices/arena handles instead of pinned pointers wherever a C API would
/// hand back one (see `Arena`/`ArenaRc` in `kernel-rs-lib::arena`).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PathHandle(usize);

/// The open-path table (spec §4.7/§3): a fixed-capacity pool of live
/// `(parent, basename)` handles, serializing concurrent structural
/// mutation of the same name.
pub struct PathTable {
    entries: Vec<Option<PathEntry>>,
}

impl PathTable {
    /// Spec §9 / original `MAX_OPEN_PATHS`.
    pub const CAPACITY: usize = 1024;

    pub fn new() -> Self {
        let mut entries = Vec::with_capacity(Self::CAPACITY);
        entries.resize_with(Self::CAPACITY, || None);
        Self { entries }
    }

    fn find_conflict(&self, parent: Inum, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| {
            e.as_ref()
                .map(|e| e.parent == parent && e.basename == name)
                .unwrap_or(false)
        })
    }

    /// Opens a handle on `(dirname(path), basename(path))`, validating
    /// every directory up to (and including) the parent but allowing the
    /// final component to be absent.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        &mut self,
        dev: &dyn BlockDevice,
        refs: &mut RefTable,
        rootdir: Inum,
        cwd: Inum,
        path: &str,
        uid: u32,
        gid: u32,
        noblock: i32,
    ) -> Result<PathHandle> {
        let (dirpath, mut basename) = split_parent_and_name(path);
        if basename.is_empty() {
            basename = ".".to_string();
        }
        if basename.len() > dir::MAX_NAME_LEN {
            return Err(CandyError::NameTooLong);
        }

        let parent = resolve_parent_dir(dev, refs, rootdir, cwd, &dirpath, uid, gid)?;

        if let Some(existing) = self.find_conflict(parent, &basename) {
            let _ = refs.close(dev, parent);
            if noblock == NOBLOCK_FAIL || noblock as usize == existing {
                return Err(CandyError::WouldBlock);
            }
            // Single-threaded design: a non-excused collision here can
            // only mean two concurrent callers raced on one name, which
            // cannot happen under the cooperative-scheduling model this
            // crate assumes (spec §5). Matches the teacher's habit of
            // panicking on a broken protocol invariant rather than
            // returning a recoverable error (see the write-guard `Drop`
            // impls in `keos-project5::ffs::access_control`).
            panic!("path_open: blocking not supported in the single-threaded driver");
        }

        let slot = match self.entries.iter().position(|e| e.is_none()) {
            Some(i) => i,
            None => {
                let _ = refs.close(dev, parent);
                return Err(CandyError::OutOfMemory);
            }
        };
        self.entries[slot] = Some(PathEntry { refcount: 1, parent, basename });
        Ok(PathHandle(slot))
    }

    /// Releases one reference on `handle`; at zero, releases the parent
    /// directory reference the handle was holding.
    pub fn close(&mut self, dev: &dyn BlockDevice, refs: &mut RefTable, handle: PathHandle) -> Result<()> {
        let done = {
            let entry = self.entries[handle.0]
                .as_mut()
                .ok_or(CandyError::Corrupt("path_close on an unopened handle"))?;
            entry.refcount -= 1;
            entry.refcount == 0
        };
        if done {
            let entry = self.entries[handle.0].take().unwrap();
            refs.close(dev, entry.parent)?;
        }
        Ok(())
    }

    fn entry(&self, handle: PathHandle) -> Result<&PathEntry> {
        self.entries[handle.0]
            .as_ref()
            .ok_or(CandyError::Corrupt("use of a closed path handle"))
    }

    pub fn parent(&self, handle: PathHandle) -> Result<Inum> {
        Ok(self.entry(handle)?.parent)
    }

    pub fn basename(&self, handle: PathHandle) -> Result<String> {
        Ok(self.entry(handle)?.basename.clone())
    }

    /// Atomic lookup-and-open of the basename pinned by `handle`.
    pub fn get(&self, dev: &dyn BlockDevice, refs: &mut RefTable, handle: PathHandle) -> Result<Inum> {
        let e = self.entry(handle)?;
        let inum = dir::lookup(dev, e.parent, &e.basename)?;
        refs.open(dev, inum)?;
        Ok(inum)
    }
}

impl Default for PathTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Links `inum` into the directory/name pinned by `handle`.
pub fn path_link(
    dev: &dyn BlockDevice,
    refs: &mut RefTable,
    table: &PathTable,
    handle: PathHandle,
    inum: Inum,
    uid: u32,
    gid: u32,
) -> Result<()> {
    let meta = inode::inode_getinfo(dev, inum)?;
    if FileKind::from_mode(meta.mode) == Some(FileKind::Directory) {
        return Err(CandyError::OperationNotPermitted);
    }
    let parent = table.parent(handle)?;
    let name = table.basename(handle)?;
    let parent_meta = inode::inode_getinfo(dev, parent)?;
    if !perm::check(&parent_meta, uid, gid, Perm::WRITE) {
        return Err(CandyError::AccessDenied);
    }
    dir::insert(dev, parent, &name, inum)?;
    refs.link(dev, inum)?;
    Ok(())
}

/// Unlinks the name pinned by `handle`.
pub fn path_unlink(
    dev: &dyn BlockDevice,
    refs: &mut RefTable,
    table: &PathTable,
    handle: PathHandle,
    uid: u32,
    gid: u32,
) -> Result<()> {
    let parent = table.parent(handle)?;
    let name = table.basename(handle)?;
    let parent_meta = inode::inode_getinfo(dev, parent)?;
    if !perm::check(&parent_meta, uid, gid, Perm::WRITE) {
        return Err(CandyError::AccessDenied);
    }
    let target = dir::lookup(dev, parent, &name)?;
    let target_meta = inode::inode_getinfo(dev, target)?;
    if FileKind::from_mode(target_meta.mode) == Some(FileKind::Directory) {
        return Err(CandyError::IsADirectory);
    }
    dir::remove(dev, parent, &name)?;
    refs.unlink(dev, target)?;
    refs.close(dev, target)?;
    Ok(())
}

/// Creates a directory at the name pinned by `handle`.
pub fn path_mkdir(
    dev: &dyn BlockDevice,
    refs: &mut RefTable,
    table: &PathTable,
    handle: PathHandle,
    mode: u32,
    uid: u32,
    gid: u32,
) -> Result<Inum> {
    let parent = table.parent(handle)?;
    let name = table.basename(handle)?;
    let parent_meta = inode::inode_getinfo(dev, parent)?;
    if !perm::check(&parent_meta, uid, gid, Perm::WRITE) {
        return Err(CandyError::AccessDenied);
    }

    let new_dir = dir::create(dev, parent)?;
    refs.open(dev, new_dir)?;

    let result: Result<()> = (|| {
        inode::inode_chown(dev, new_dir, uid, gid)?;
        inode::inode_chmod(dev, new_dir, (mode & crate::perm::CHMOD_MASK) | crate::types::mode_bits::S_IFDIR)?;
        dir::insert(dev, parent, &name, new_dir)?;
        refs.link(dev, new_dir)?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            refs.close(dev, new_dir)?;
            Ok(new_dir)
        }
        Err(e) => {
            // Never linked in: releasing the construction reference frees it.
            let _ = refs.close(dev, new_dir);
            Err(e)
        }
    }
}

/// Removes the (empty) directory named by `handle`.
pub fn path_rmdir(
    dev: &dyn BlockDevice,
    refs: &mut RefTable,
    table: &PathTable,
    handle: PathHandle,
    uid: u32,
    gid: u32,
) -> Result<()> {
    let parent = table.parent(handle)?;
    let name = table.basename(handle)?;
    let parent_meta = inode::inode_getinfo(dev, parent)?;
    if !perm::check(&parent_meta, uid, gid, Perm::WRITE) {
        return Err(CandyError::AccessDenied);
    }

    let target = dir::lookup(dev, parent, &name)?;
    refs.open(dev, target)?;
    let result = dir::destroy(dev, target).and_then(|()| dir::remove(dev, parent, &name));
    match result {
        Ok(()) => {
            refs.unlink(dev, target)?;
            refs.close(dev, target)?;
            Ok(())
        }
        Err(e) => {
            let _ = refs.close(dev, target);
            Err(e)
        }
    }
}

/// Renames `src` onto `dst`, both pinned open-path handles. Directory
/// renames reparent the moved directory's `..` entry.
pub fn path_rename(
    dev: &dyn BlockDevice,
    refs: &mut RefTable,
    table: &PathTable,
    dst: PathHandle,
    src: PathHandle,
    uid: u32,
    gid: u32,
) -> Result<()> {
    let dst_parent = table.parent(dst)?;
    let dst_name = table.basename(dst)?;
    let src_parent = table.parent(src)?;
    let src_name = table.basename(src)?;

    let dst_parent_meta = inode::inode_getinfo(dev, dst_parent)?;
    let src_parent_meta = inode::inode_getinfo(dev, src_parent)?;
    if !perm::check(&dst_parent_meta, uid, gid, Perm::WRITE) || !perm::check(&src_parent_meta, uid, gid, Perm::WRITE) {
        return Err(CandyError::AccessDenied);
    }

    let src_inum = dir::lookup(dev, src_parent, &src_name)?;
    let src_is_dir = FileKind::from_mode(inode::inode_getinfo(dev, src_inum)?.mode) == Some(FileKind::Directory);

    match dir::lookup(dev, dst_parent, &dst_name) {
        Ok(dst_inum) => {
            let dst_is_dir = FileKind::from_mode(inode::inode_getinfo(dev, dst_inum)?.mode) == Some(FileKind::Directory);
            if dst_is_dir != src_is_dir {
                return Err(if dst_is_dir { CandyError::IsADirectory } else { CandyError::NotADirectory });
            }
            if dst_is_dir {
                dir::destroy(dev, dst_inum)?;
            }
            dir::remove(dev, dst_parent, &dst_name)?;
            refs.unlink(dev, dst_inum)?;
            refs.open(dev, dst_inum)?;
            refs.close(dev, dst_inum)?;
        }
        Err(CandyError::NotFound) => {}
        Err(e) => return Err(e),
    }

    dir::insert(dev, dst_parent, &dst_name, src_inum)?;
    dir::remove(dev, src_parent, &src_name)?;
    if src_is_dir {
        dir::reparent(dev, src_inum, dst_parent)?;
    }
    Ok(())
}

/// Bootstraps the path layer on a freshly `mkfs`ed volume: creates the
/// root directory at inum 0, links it once so it is never garbage
/// collected, and applies the requested owner/mode.
pub fn mkfs_path(dev: &dyn BlockDevice, refs: &mut RefTable, owner: u32, group: u32) -> Result<()> {
    let root = dir::create(dev, ROOT_INUM)?;
    if root != ROOT_INUM {
        return Err(CandyError::Corrupt("root directory did not land at inum 0"));
    }
    refs.open(dev, root)?;
    refs.link(dev, root)?;
    inode::inode_chown(dev, root, owner, group)?;
    inode::inode_chmod(dev, root, 0o755 | crate::types::mode_bits::S_IFDIR)?;
    refs.close(dev, root)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::mkfs_storage;
    use crate::device::MemoryDevice;

    fn fresh(nblocks: u64) -> (MemoryDevice, RefTable) {
        let dev = MemoryDevice::new(nblocks, 512);
        mkfs_storage(&dev, 4).unwrap();
        let mut refs = RefTable::new();
        mkfs_path(&dev, &mut refs, 0, 0).unwrap();
        (dev, refs)
    }

    #[test]
    fn resolve_root() {
        let (dev, mut refs) = fresh(512);
        let inum = path_resolve(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/", true, 0, 0).unwrap();
        assert_eq!(inum, ROOT_INUM);
        refs.close(&dev, inum).unwrap();
    }

    #[test]
    fn mkdir_then_resolve_then_rmdir() {
        let (dev, mut refs) = fresh(512);
        let mut table = PathTable::new();
        let h = table.open(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/sub", 0, 0, 0).unwrap();
        let sub = path_mkdir(&dev, &mut refs, &table, h, 0o755, 0, 0).unwrap();
        table.close(&dev, &mut refs, h).unwrap();

        let resolved = path_resolve(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/sub", true, 0, 0).unwrap();
        assert_eq!(resolved, sub);
        refs.close(&dev, resolved).unwrap();

        let h2 = table.open(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/sub", 0, 0, 0).unwrap();
        path_rmdir(&dev, &mut refs, &table, h2, 0, 0).unwrap();
        table.close(&dev, &mut refs, h2).unwrap();

        assert!(matches!(
            path_resolve(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/sub", true, 0, 0),
            Err(CandyError::NotFound)
        ));
    }

    #[test]
    fn create_link_unlink_roundtrip() {
        let (dev, mut refs) = fresh(512);
        let mut table = PathTable::new();
        let h = table.open(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/a", 0, 0, 0).unwrap();
        let file = crate::file::create(&dev).unwrap();
        refs.open(&dev, file).unwrap();
        path_link(&dev, &mut refs, &table, h, file, 0, 0).unwrap();
        table.close(&dev, &mut refs, h).unwrap();

        let h2 = table.open(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/b", 0, 0, 0).unwrap();
        path_link(&dev, &mut refs, &table, h2, file, 0, 0).unwrap();
        table.close(&dev, &mut refs, h2).unwrap();

        let info = inode::inode_getinfo(&dev, file).unwrap();
        assert_eq!(info.nlinks, 2);

        let h3 = table.open(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/a", 0, 0, 0).unwrap();
        path_unlink(&dev, &mut refs, &table, h3, 0, 0).unwrap();
        table.close(&dev, &mut refs, h3).unwrap();

        let info = inode::inode_getinfo(&dev, file).unwrap();
        assert_eq!(info.nlinks, 1);
        refs.close(&dev, file).unwrap();
    }

    #[test]
    fn conflicting_open_path_would_block() {
        let (dev, mut refs) = fresh(512);
        let mut table = PathTable::new();
        let h1 = table.open(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/x", 0, 0, 0).unwrap();
        let result = table.open(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/x", 0, 0, NOBLOCK_FAIL);
        assert!(matches!(result, Err(CandyError::WouldBlock)));
        table.close(&dev, &mut refs, h1).unwrap();
    }

    #[test]
    fn rename_moves_entry() {
        let (dev, mut refs) = fresh(512);
        let mut table = PathTable::new();
        let h = table.open(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/a", 0, 0, 0).unwrap();
        let file = crate::file::create(&dev).unwrap();
        refs.open(&dev, file).unwrap();
        path_link(&dev, &mut refs, &table, h, file, 0, 0).unwrap();
        table.close(&dev, &mut refs, h).unwrap();
        refs.close(&dev, file).unwrap();

        let src = table.open(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/a", 0, 0, 0).unwrap();
        let dst = table.open(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/b", 0, 0, 0).unwrap();
        path_rename(&dev, &mut refs, &table, dst, src, 0, 0).unwrap();
        table.close(&dev, &mut refs, src).unwrap();
        table.close(&dev, &mut refs, dst).unwrap();

        assert!(matches!(
            path_resolve(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/a", true, 0, 0),
            Err(CandyError::NotFound)
        ));
        let resolved = path_resolve(&dev, &mut refs, ROOT_INUM, ROOT_INUM, "/b", true, 0, 0).unwrap();
        assert_eq!(resolved, file);
        refs.close(&dev, resolved).unwrap();
    }
}
