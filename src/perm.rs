//! Permission layer (spec §4.6): the classic UNIX rwx/owner/group model.
//!
//! Every structural or data operation in the path/inode layers asks this
//! module a yes/no question before touching disk. The teacher's FFS has no
//! equivalent — permission bits never mattered inside a single-user grading
//! kernel — so this module is grounded directly on spec.md §4.6/§7 rather
//! than on any teacher file; its shape (a bitflags-based mask plus a single
//! `check` entry point) follows the teacher's general habit of modeling a
//! closed set of related bits with `bitflags!` (see `keos::fs` open-flags
//! usage in the pack) rather than hand-rolled constants.

use crate::inode::InodeMeta;

bitflags::bitflags! {
    /// One rwx triple's worth of requested access.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct Perm: u32 {
        const READ = 4;
        const WRITE = 2;
        const EXEC = 1;
    }
}

/// `chmod`'s caller-visible mode mask: type bits are never accepted from a
/// `chmod` caller, only the low 12 bits (permission bits plus setuid/
/// setgid/sticky).
pub const CHMOD_MASK: u32 = 0o7777;

/// Whether `uid` may read/write/execute `inode` per the requested `perm`.
///
/// Root (`uid == 0`) bypasses every check. Otherwise the owner class is
/// tested if `uid` owns the inode, the group class if `gid` matches, else
/// the other class — exactly POSIX's three-tier selection.
pub fn check(inode: &InodeMeta, uid: u32, gid: u32, perm: Perm) -> bool {
    if uid == 0 {
        return true;
    }
    let shift = if uid == inode.owner {
        6
    } else if gid == inode.group {
        3
    } else {
        0
    };
    let bits = (inode.mode >> shift) & 0o7;
    (bits & perm.bits()) == perm.bits()
}

/// `utimens`' access rule (spec §4.6): the owner may always retime; anyone
/// else needs write permission of their class.
pub fn check_utime(inode: &InodeMeta, uid: u32, gid: u32) -> bool {
    if uid == 0 || uid == inode.owner {
        return true;
    }
    check(inode, uid, gid, Perm::WRITE)
}

/// `chmod` requires root or ownership.
pub fn can_chmod(inode: &InodeMeta, uid: u32) -> bool {
    uid == 0 || uid == inode.owner
}

/// `chown` requires root, full stop — this design never lets an owner
/// change their own file's group (spec §9 Open Question; kept as-is).
pub fn can_chown(uid: u32) -> bool {
    uid == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inode::Timespec;

    fn meta(mode: u32, owner: u32, group: u32) -> InodeMeta {
        InodeMeta {
            mode,
            owner,
            group,
            nlinks: 1,
            size: 0,
            created: Timespec::default(),
            atime: Timespec::default(),
            mtime: Timespec::default(),
            ctime: Timespec::default(),
        }
    }

    #[test]
    fn root_bypasses_everything() {
        let m = meta(0o000, 1, 1);
        assert!(check(&m, 0, 0, Perm::READ | Perm::WRITE | Perm::EXEC));
    }

    #[test]
    fn owner_class_applies_to_owner() {
        let m = meta(0o600, 42, 42);
        assert!(check(&m, 42, 42, Perm::READ | Perm::WRITE));
        assert!(!check(&m, 7, 7, Perm::READ));
    }

    #[test]
    fn group_class_applies_when_not_owner() {
        let m = meta(0o640, 1, 2);
        assert!(check(&m, 3, 2, Perm::READ));
        assert!(!check(&m, 3, 2, Perm::WRITE));
    }

    #[test]
    fn other_user_cannot_write_0600() {
        let m = meta(0o600, 1, 1);
        assert!(!check(&m, 9, 9, Perm::WRITE));
    }

    #[test]
    fn chmod_requires_root_or_owner() {
        let m = meta(0o644, 5, 5);
        assert!(can_chmod(&m, 5));
        assert!(can_chmod(&m, 0));
        assert!(!can_chmod(&m, 6));
    }

    #[test]
    fn chown_is_root_only() {
        assert!(can_chown(0));
        assert!(!can_chown(5));
    }
}
