//! `mount.candyfs`: mounts a CandyFS volume over FUSE.
//!
//! With a device argument, opens and validates it (superblock magic must
//! already be in place, i.e. `mkfs.candyfs` must have run first). With none,
//! creates a throwaway 512 MiB in-memory volume and formats it on the spot —
//! handy for trying CandyFS out without a real block device.

use std::fs::OpenOptions;

use anyhow::{Context, Result};
use clap::Parser;
use fuser::MountOption;

use candyfs::device::{BlockDevice, FileDevice, MemoryDevice, BLOCK_SIZE};
use candyfs::fs::{self, Filesystem};
use candyfs::fuse_bridge::CandyFuse;

/// In-memory scratch volume size when no device is given.
const SCRATCH_VOLUME_BYTES: u64 = 512 * 1024 * 1024;
const SCRATCH_ILIST_BLOCKS: u32 = 1024;

/// Mount a CandyFS volume at a mountpoint.
#[derive(Parser, Debug)]
#[command(name = "mount.candyfs")]
struct Args {
    /// Block device or backing file. Omit to mount a throwaway in-memory
    /// volume.
    device: Option<String>,

    /// Directory to mount the filesystem at.
    mountpoint: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let (dev, fsname): (Box<dyn BlockDevice>, String) = match &args.device {
        Some(path) => {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .with_context(|| format!("opening {path}"))?;
            let num_blocks = file.metadata().with_context(|| format!("stat {path}"))?.len() / BLOCK_SIZE as u64;
            let dev = FileDevice::open(file, num_blocks, BLOCK_SIZE);
            candyfs::block::Superblock::load(&dev)
                .with_context(|| format!("{path} has no CandyFS superblock — run mkfs.candyfs first"))?;
            (Box::new(dev), path.clone())
        }
        None => {
            let num_blocks = SCRATCH_VOLUME_BYTES / BLOCK_SIZE as u64;
            let dev = MemoryDevice::new(num_blocks, BLOCK_SIZE);
            fs::mkfs(&dev, SCRATCH_ILIST_BLOCKS, 0, 0).context("formatting scratch volume")?;
            (Box::new(dev), "candyfs-scratch".to_string())
        }
    };

    let mut options = vec![
        MountOption::FSName(fsname.clone()),
        MountOption::CUSTOM("hard_remove".to_string()),
        MountOption::CUSTOM("use_ino".to_string()),
        MountOption::AllowOther,
    ];
    if args.device.is_some() {
        options.push(MountOption::CUSTOM("blkdev".to_string()));
    }

    let fs = Filesystem::new(dev);
    log::info!("mounting {} at {}", fsname, args.mountpoint);
    fuser::mount2(CandyFuse::new(fs), &args.mountpoint, &options).with_context(|| format!("mounting at {}", args.mountpoint))?;
    Ok(())
}
