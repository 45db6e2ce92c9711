//! Error types for the query runner
//!
//! Error codes:
//! - STRESS_SESSION_* for failures reported by the session capability
//! - STRESS_DIGEST_* for failures while hashing a result set
//! - STRESS_EXECUTION_FAILED for unclassified run failures
//! - STRESS_NOT_CONNECTED for usage errors

use std::io;

use thiserror::Error;

/// Failures reported by a session or the coordinator's admin channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The engine reported an error for the operation. The text is what gets classified.
    #[error("{0}")]
    Query(String),

    /// The connection to the engine is broken
    #[error("connection error: {0}")]
    Connection(String),

    /// No operation has been submitted on this session
    #[error("no active operation")]
    NoOperation,

    /// Another unit of work holds the session
    #[error("session is busy")]
    Busy,
}

impl SessionError {
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Query(_) => "STRESS_SESSION_QUERY",
            SessionError::Connection(_) => "STRESS_SESSION_CONNECTION",
            SessionError::NoOperation => "STRESS_SESSION_NO_OPERATION",
            SessionError::Busy => "STRESS_SESSION_BUSY",
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Failures of the result digest computation
#[derive(Debug, Error)]
pub enum DigestError {
    /// The deadline passed before all rows were hashed
    #[error("result digest did not complete before the deadline")]
    DeadlineExceeded,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("result trace log: {0}")]
    Io(#[from] io::Error),

    /// The worker went away without reporting a result
    #[error("digest worker exited without a result")]
    WorkerLost,

    /// The worker observed the stop flag
    #[error("digest stopped")]
    Stopped,
}

impl DigestError {
    pub fn code(&self) -> &'static str {
        match self {
            DigestError::DeadlineExceeded => "STRESS_DIGEST_DEADLINE_EXCEEDED",
            DigestError::Session(e) => e.code(),
            DigestError::Io(_) => "STRESS_DIGEST_IO",
            DigestError::WorkerLost => "STRESS_DIGEST_WORKER_LOST",
            DigestError::Stopped => "STRESS_DIGEST_STOPPED",
        }
    }
}

/// Any failure of a run that ends up in a report as `other_error`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("{0}")]
    Digest(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl ExecutionError {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionError::Session(e) => e.code(),
            ExecutionError::Digest(_) => "STRESS_DIGEST_FAILED",
            ExecutionError::Io(_) => "STRESS_EXECUTION_IO",
        }
    }
}

impl From<DigestError> for ExecutionError {
    fn from(error: DigestError) -> Self {
        match error {
            DigestError::Session(e) => ExecutionError::Session(e),
            DigestError::Io(e) => ExecutionError::Io(e.to_string()),
            other => ExecutionError::Digest(other.to_string()),
        }
    }
}

impl From<io::Error> for ExecutionError {
    fn from(error: io::Error) -> Self {
        ExecutionError::Io(error.to_string())
    }
}

/// Errors returned by the runner itself rather than stored in a report
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("connect() must first be called")]
    NotConnected,
}

impl RunnerError {
    pub fn code(&self) -> &'static str {
        match self {
            RunnerError::NotConnected => "STRESS_NOT_CONNECTED",
        }
    }
}

/// Result type for runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;
