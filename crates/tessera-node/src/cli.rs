use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tessera - Rotating committee membership for BFT sealers
#[derive(Parser)]
#[command(name = "tessera")]
#[command(about = "Tessera membership node and utilities")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the membership scheduler
    Run {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// Block number to start from
        #[arg(long, default_value = "0")]
        start_block: u64,
    },

    /// Initialize a new node configuration
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,

        /// Number of sealers to generate
        #[arg(long, default_value = "7")]
        sealers: usize,
    },

    /// Generate a new node key
    Keygen {
        /// Output file for secret key
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the committee and leader schedule for a block range
    Plan {
        /// Path to configuration file
        #[arg(short, long, default_value = "config.json")]
        config: PathBuf,

        /// First block number
        #[arg(long, default_value = "0")]
        from: u64,

        /// Last block number (inclusive)
        #[arg(long, default_value = "30")]
        to: u64,

        /// View used for leader selection
        #[arg(long, default_value = "0")]
        view: u64,
    },
}
