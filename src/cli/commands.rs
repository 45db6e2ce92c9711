//! CLI command implementations
//!
//! Each command returns its output line so it can be tested without a
//! process; `run` prints it.

use std::fs;
use std::path::Path;

use serde_json::json;

use crate::classify::classify_message;
use crate::digest::digest_rows;
use crate::session::Row;

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Parse arguments, run the command and print its output
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    let output = run_command(cli.command)?;
    println!("{}", output);
    Ok(())
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<String> {
    match cmd {
        Command::Digest { rows, baseline } => digest(&rows, baseline),
        Command::Classify { message } => Ok(classify(&message)),
    }
}

/// Digest the rows stored at `path`
///
/// Prints `{"digest":..,"rows":..}` and fails if `baseline` differs.
pub fn digest(path: &Path, baseline: Option<u64>) -> CliResult<String> {
    let text = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rows: Vec<Row> = serde_json::from_str(&text).map_err(|source| CliError::Rows {
        path: path.to_path_buf(),
        source,
    })?;

    let actual = digest_rows(&rows);
    if let Some(expected) = baseline {
        if expected != actual {
            return Err(CliError::Mismatch { expected, actual });
        }
    }
    Ok(json!({ "digest": actual, "rows": rows.len() }).to_string())
}

/// Name the failure class of `message`
pub fn classify(message: &str) -> String {
    classify_message(message).to_string()
}
