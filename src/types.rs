//! Small newtypes shared by every layer.
//!
//! Unlike the teacher's `LogicalBlockAddress` (a `NonZeroU64` wrapper, since
//! its bitmap-based FFS never needs a negative block number), CandyFS packs
//! "next free inum" links into the same signed slot as a block number
//! (§3/§6), so both newtypes here wrap a plain `i64` and expose the sentinel
//! directly rather than hiding it behind `Option`.

use std::fmt;

/// The most-negative `i64`; "no block" or "no inum" depending on context.
pub const EOF: i64 = i64::MIN;

macro_rules! sentinel_newtype {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// The EOF sentinel value for this type.
            pub const EOF: $name = $name(EOF);

            /// Whether this value is the EOF sentinel.
            #[inline]
            pub fn is_eof(self) -> bool {
                self.0 == EOF
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_eof() {
                    write!(f, "{}(EOF)", stringify!($name))
                } else {
                    write!(f, "{}({})", stringify!($name), self.0)
                }
            }
        }
    };
}

sentinel_newtype!(BlockNo, "A data/metadata block number, or `EOF`.");
sentinel_newtype!(Inum, "An inode number, or `EOF`.");

/// The inode number of the root directory (spec §9 `mkfs_path`).
pub const ROOT_INUM: Inum = Inum(0);

/// The kind of on-disk object an inode represents, projected from its mode
/// bits. The teacher generalizes "branch on mode" into a typed variant this
/// same way (`FileType` in `keos-project5::ffs::types`); CandyFS adds the
/// symlink kind the teacher's FFS never needed.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FileKind {
    Regular,
    Directory,
    Symlink,
}

/// File-type mode bits, POSIX `S_IFMT` values.
pub mod mode_bits {
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFLNK: u32 = 0o120000;
    pub const S_IFMT: u32 = 0o170000;
}

impl FileKind {
    /// Classifies a raw mode field. Returns `None` for a mode with no
    /// recognized type bits (a corrupt or foreign inode).
    pub fn from_mode(mode: u32) -> Option<FileKind> {
        match mode & mode_bits::S_IFMT {
            mode_bits::S_IFREG => Some(FileKind::Regular),
            mode_bits::S_IFDIR => Some(FileKind::Directory),
            mode_bits::S_IFLNK => Some(FileKind::Symlink),
            _ => None,
        }
    }

    /// The `S_IFMT` bits for this kind.
    pub fn mode_bit(self) -> u32 {
        match self {
            FileKind::Regular => mode_bits::S_IFREG,
            FileKind::Directory => mode_bits::S_IFDIR,
            FileKind::Symlink => mode_bits::S_IFLNK,
        }
    }
}
