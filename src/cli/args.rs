//! CLI argument definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stress query runner diagnostics
#[derive(Parser, Debug)]
#[command(name = "stressrunner")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Digest a result set stored as a JSON array of rows
    Digest {
        /// Path to the JSON file, e.g. `[[1, null], [2, 3.14]]`
        #[arg(long)]
        rows: PathBuf,

        /// Expected digest; a mismatch exits non-zero
        #[arg(long)]
        baseline: Option<u64>,
    },

    /// Classify an engine error message
    Classify {
        /// Error text as reported by the engine
        message: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
