//! Diagnostic command line
//!
//! - `stressrunner digest --rows <path> [--baseline N]`: order-independent
//!   digest of a JSON array of rows
//! - `stressrunner classify <message>`: failure class of an engine error

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{classify, digest, run, run_command};
pub use errors::{CliError, CliResult};
