//! End-to-end scenarios against a freshly formatted in-memory volume,
//! exercised entirely through the [`candyfs::Filesystem`] façade (the same
//! surface the FUSE bridge drives).

use candyfs::device::MemoryDevice;
use candyfs::error::CandyError;
use candyfs::fs::{self, Caller, Filesystem};
use candyfs::perm::Perm;

fn mounted(nblocks: u64, ilist: u32) -> Filesystem {
    let dev = MemoryDevice::new(nblocks, 512);
    fs::mkfs(&dev, ilist, 0, 0).unwrap();
    Filesystem::new(Box::new(dev))
}

fn root() -> Caller {
    Caller { uid: 0, gid: 0 }
}

#[test]
fn directory_tree_survives_a_walk() {
    let mut fs = mounted(4096, 64);
    fs.mkdir("/usr", 0o755, root()).unwrap();
    fs.mkdir("/usr/bin", 0o755, root()).unwrap();
    let (_, _, fh) = fs.create("/usr/bin/sh", 0o755, root()).unwrap();
    fs.write(fh, 0, b"#!/bin/sh\n").unwrap();
    fs.release(fh).unwrap();

    let meta = fs.getattr("/usr/bin/sh", root()).unwrap();
    assert_eq!(meta.size, 10);

    let dh = fs.opendir("/usr/bin", root()).unwrap();
    let mut names = Vec::new();
    let mut offset = 0u64;
    while let Some((_, name, next)) = fs.readdir(dh, offset).unwrap() {
        names.push(name);
        offset = next;
    }
    fs.releasedir(dh).unwrap();
    assert!(names.contains(&"sh".to_string()));
    assert!(names.contains(&".".to_string()));
    assert!(names.contains(&"..".to_string()));
}

#[test]
fn deeply_nested_path_resolves() {
    let mut fs = mounted(4096, 64);
    let mut path = String::new();
    for i in 0..10 {
        path.push_str(&format!("/d{i}"));
        fs.mkdir(&path, 0o755, root()).unwrap();
    }
    path.push_str("/leaf");
    let (_, _, fh) = fs.create(&path, 0o644, root()).unwrap();
    fs.release(fh).unwrap();
    assert!(fs.getattr(&path, root()).is_ok());
}

#[test]
fn relative_symlink_resolves_against_its_own_directory() {
    let mut fs = mounted(4096, 64);
    fs.mkdir("/a", 0o755, root()).unwrap();
    fs.mkdir("/a/b", 0o755, root()).unwrap();
    let (_, _, fh) = fs.create("/a/target", 0o644, root()).unwrap();
    fs.write(fh, 0, b"payload").unwrap();
    fs.release(fh).unwrap();

    // "../target" from /a/b/link should land on /a/target.
    fs.symlink("../target", "/a/b/link", root()).unwrap();
    let fh = fs.open("/a/b/link", Perm::READ, root()).unwrap();
    let mut buf = [0u8; 7];
    fs.read(fh, 0, &mut buf).unwrap();
    fs.release(fh).unwrap();
    assert_eq!(&buf, b"payload");
}

#[test]
fn symlink_chain_deeper_than_cap_is_rejected() {
    let mut fs = mounted(4096, 64);
    let (_, _, fh) = fs.create("/real", 0o644, root()).unwrap();
    fs.release(fh).unwrap();

    fs.symlink("/real", "/l0", root()).unwrap();
    for i in 1..10 {
        fs.symlink(&format!("/l{}", i - 1), &format!("/l{i}"), root()).unwrap();
    }
    assert!(matches!(fs.getattr("/l9", root()), Err(CandyError::TooManyLinks)));
}

#[test]
fn rename_across_directories_moves_the_entry() {
    let mut fs = mounted(4096, 64);
    fs.mkdir("/src", 0o755, root()).unwrap();
    fs.mkdir("/dst", 0o755, root()).unwrap();
    let (_, _, fh) = fs.create("/src/file", 0o644, root()).unwrap();
    fs.release(fh).unwrap();

    fs.rename("/src/file", "/dst/file", root()).unwrap();
    assert!(matches!(fs.getattr("/src/file", root()), Err(CandyError::NotFound)));
    assert!(fs.getattr("/dst/file", root()).is_ok());
}

#[test]
fn permission_checks_gate_traversal_and_writes() {
    let mut fs = mounted(4096, 64);
    fs.mkdir("/locked", 0o700, root()).unwrap();
    let (_, _, fh) = fs.create("/locked/secret", 0o600, root()).unwrap();
    fs.release(fh).unwrap();

    let stranger = Caller { uid: 42, gid: 42 };
    assert!(matches!(fs.getattr("/locked/secret", stranger), Err(CandyError::AccessDenied)));
    assert!(matches!(fs.mkdir("/locked/nope", 0o755, stranger), Err(CandyError::AccessDenied)));
}

#[test]
fn statfs_reports_shrinking_free_space_as_blocks_are_used() {
    let mut fs = mounted(2048, 50);
    let (total_before, free_before) = fs.statfs().unwrap();
    let (_, _, fh) = fs.create("/big", 0o644, root()).unwrap();
    fs.write(fh, 0, &vec![1u8; 100_000]).unwrap();
    fs.release(fh).unwrap();
    let (total_after, free_after) = fs.statfs().unwrap();
    assert_eq!(total_before, total_after);
    assert!(free_after < free_before);
}
