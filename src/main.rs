//! stressrunner CLI entry point
//!
//! Parses arguments, dispatches to the CLI module and exits non-zero on
//! failure.

use stressrunner::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}: {}", e.code(), e);
        std::process::exit(1);
    }
}
