use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Prepare and submit storm-surge ensemble batches
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print how an ensemble would be split into submission chunks
    Plan {
        /// Number of storms in the ensemble
        #[arg(short, long)]
        total: usize,

        /// Maximum jobs per chunk
        #[arg(short, long, default_value_t = 500)]
        quota: usize,
    },

    /// Write every perturbed ensemble member as a storm file
    Generate {
        /// Batch configuration (TOML)
        config: PathBuf,
    },

    /// Lay out, serialize and submit the ensemble in chunks
    Submit {
        /// Batch configuration (TOML)
        config: PathBuf,

        /// Resume from existing checkpoints instead of starting fresh
        #[arg(long)]
        restart: bool,

        /// Write every directory and script but do not call the submit command
        #[arg(long)]
        dry_run: bool,

        /// First storm index to submit
        #[arg(long)]
        first: Option<usize>,

        /// One past the last storm index to submit
        #[arg(long)]
        last: Option<usize>,
    },

    /// Extract the maximum surge per gauge from a finished run
    MaxSurge {
        output_dir: PathBuf,
        base_path: PathBuf,
        job_name: String,
        prefix: String,

        /// Number of gauges to read
        #[arg(short, long, default_value_t = 1)]
        gauges: u32,
    },
}

pub fn get_args() -> Args {
    Args::parse()
}
