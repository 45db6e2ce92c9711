//! Lifecycle events emitted while running a query
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events in a query run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Session preparation
    /// Switched to the query's database
    DatabaseSelected,
    /// Set-up SQL executed before the main query
    SetUpExecuted,
    /// Query options applied
    OptionsApplied,

    // Lifecycle
    /// Query accepted by the engine
    QuerySubmitted,
    /// Query left the PENDING/INITIALIZED states
    QueryStartedRunning,
    /// Still polling for a fetchable state
    QueryWaiting,
    /// Deadline elapsed before completion
    QueryTimedOut,
    /// Deadline elapsed while another unit of work held the session
    SessionUnavailable,
    /// Query failed with an engine error
    QueryFailed,
    /// Query finished and the report is complete
    QueryCompleted,

    // Cancellation
    /// Session-level cancel sent
    CancelRequested,
    /// Session-level cancel failed
    CancelFailed,
    /// Out-of-band cancel sent to the coordinator
    AdminCancelRequested,
    /// Out-of-band cancel failed
    AdminCancelFailed,

    // Digest
    /// Fetching a batch of result rows
    DigestBatch,
    /// All rows consumed
    DigestComplete,
    /// Digest worker told to stop
    DigestAbandoned,
    /// Digest differs from the baseline
    DigestMismatch,
    /// Trace log could not be removed
    TraceCleanupFailed,

    // Diagnostics
    /// Profile retrieval failed
    ProfileFetchFailed,
    /// Profile written to disk
    ProfileWritten,
}

impl Event {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::DatabaseSelected => "DATABASE_SELECTED",
            Event::SetUpExecuted => "SET_UP_EXECUTED",
            Event::OptionsApplied => "OPTIONS_APPLIED",
            Event::QuerySubmitted => "QUERY_SUBMITTED",
            Event::QueryStartedRunning => "QUERY_STARTED_RUNNING",
            Event::QueryWaiting => "QUERY_WAITING",
            Event::QueryTimedOut => "QUERY_TIMED_OUT",
            Event::SessionUnavailable => "SESSION_UNAVAILABLE",
            Event::QueryFailed => "QUERY_FAILED",
            Event::QueryCompleted => "QUERY_COMPLETED",
            Event::CancelRequested => "CANCEL_REQUESTED",
            Event::CancelFailed => "CANCEL_FAILED",
            Event::AdminCancelRequested => "ADMIN_CANCEL_REQUESTED",
            Event::AdminCancelFailed => "ADMIN_CANCEL_FAILED",
            Event::DigestBatch => "DIGEST_BATCH",
            Event::DigestComplete => "DIGEST_COMPLETE",
            Event::DigestAbandoned => "DIGEST_ABANDONED",
            Event::DigestMismatch => "DIGEST_MISMATCH",
            Event::TraceCleanupFailed => "TRACE_CLEANUP_FAILED",
            Event::ProfileFetchFailed => "PROFILE_FETCH_FAILED",
            Event::ProfileWritten => "PROFILE_WRITTEN",
        }
    }

    /// Default severity for this event
    pub fn severity(&self) -> Severity {
        match self {
            Event::QueryTimedOut
            | Event::SessionUnavailable
            | Event::DigestMismatch
            | Event::AdminCancelFailed
            | Event::TraceCleanupFailed => Severity::Warn,
            Event::QuerySubmitted | Event::QueryCompleted | Event::QueryFailed => Severity::Info,
            _ => Severity::Debug,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
