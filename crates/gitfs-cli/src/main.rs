//! gitfs entry point.
//!
//! ```bash
//! gitfs mount ~/src/project /mnt/project
//! gitfs mount -d https://github.com/rust-lang/log /mnt/log
//! gitfs umount /mnt/log
//! ```

use clap::Parser;

fn main() -> anyhow::Result<()> {
    gitfs_cli::run(gitfs_cli::Cli::parse())
}
