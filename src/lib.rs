//! stressrunner - query execution and verification engine for stress testing
//!
//! Drives one SQL query at a time against a remote query-serving engine,
//! bounds it by a wall-clock deadline, digests its result set so runs can be
//! compared across configurations, and classifies failures into memory
//! exhaustion, admission-control rejection or timeout, and everything else.

pub mod classify;
pub mod cli;
pub mod config;
pub mod deadline;
pub mod digest;
pub mod errors;
pub mod observability;
pub mod query;
pub mod report;
pub mod runner;
pub mod session;

pub use config::{RunOptions, RunnerConfig};
pub use errors::{ExecutionError, RunnerError, SessionError};
pub use query::{Query, QueryType};
pub use report::{Outcome, QueryReport};
pub use runner::QueryRunner;
pub use session::{CoordinatorAdmin, Session};
