//! CLI error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path} is not a JSON array of rows: {source}")]
    Rows {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("digest {actual} does not match baseline {expected}")]
    Mismatch { expected: u64, actual: u64 },
}

impl CliError {
    pub fn code(&self) -> &'static str {
        match self {
            CliError::Read { .. } => "STRESS_CLI_READ",
            CliError::Rows { .. } => "STRESS_CLI_ROWS",
            CliError::Mismatch { .. } => "STRESS_CLI_MISMATCH",
        }
    }
}

/// Result type for CLI commands
pub type CliResult<T> = Result<T, CliError>;
