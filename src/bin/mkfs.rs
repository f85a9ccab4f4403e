//! `mkfs.candyfs`: formats a block device (or a plain file standing in for
//! one) with a fresh, empty CandyFS volume.

use std::fs::OpenOptions;

use anyhow::{Context, Result};
use clap::Parser;
use candyfs::device::{FileDevice, BLOCK_SIZE};
use candyfs::fs;

/// Format a device for CandyFS.
#[derive(Parser, Debug)]
#[command(name = "mkfs.candyfs")]
struct Args {
    /// Block device or file to format.
    device: String,

    /// Own the root directory as the invoking user instead of root.
    #[arg(long)]
    user: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&args.device)
        .with_context(|| format!("opening {}", args.device))?;
    let len = file.metadata().with_context(|| format!("stat {}", args.device))?.len();
    let num_blocks = len / BLOCK_SIZE as u64;
    if num_blocks < 16 {
        anyhow::bail!("{} is too small for a CandyFS volume ({} blocks)", args.device, num_blocks);
    }

    let (owner, group) = if args.user {
        unsafe { (libc::getuid(), libc::getgid()) }
    } else {
        (0, 0)
    };

    let ilist_block_count = (num_blocks / 256).max(1) as u32;
    let dev = FileDevice::open(file, num_blocks, BLOCK_SIZE);
    fs::mkfs(&dev, ilist_block_count, owner, group).with_context(|| format!("formatting {}", args.device))?;

    log::info!(
        "formatted {} ({} blocks, {} ilist blocks, owner {}:{})",
        args.device,
        num_blocks,
        ilist_block_count,
        owner,
        group
    );
    Ok(())
}
