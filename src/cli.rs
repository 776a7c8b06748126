use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Snapshot retention and replication for a copy-on-write storage pool.
#[derive(Parser)]
#[command(name = "zfs-retain", version, about)]
pub struct Cli {
    /// Print the commands that would run instead of executing them.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Snapshot every pool and apply the retention policy to every filesystem.
    Snapshot {
        /// Path to the keyed TOML configuration. Falls back to the built-in default policy.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Replicate today's backup snapshot of each configured filesystem to TARGET_POOL.
    Backup {
        /// Path to the TOML backup configuration (filesystems + backup-prefix).
        #[arg(short, long)]
        config: Option<PathBuf>,
        target_pool: String,
    },
}
