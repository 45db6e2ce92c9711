//! Session capability used to drive a remote query engine
//!
//! Connection management and authentication live outside this crate; a
//! runner only needs something that can start one asynchronous query at a
//! time and hand back its results.
//!
//! # Concurrency
//!
//! A session is owned by one runner. While a SELECT is digested, the runner's
//! digest worker holds the session for one batch at a time; the runner itself
//! stops polling before the worker starts.

mod stub;
mod types;

pub use stub::{RecordingAdmin, ScriptedSession, SessionJournal};
pub use types::{OperationHandle, OperationState, QueryId, Row, Value};

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::errors::SessionResult;

/// A connected session against one coordinator
pub trait Session: Send {
    /// Run a statement synchronously, e.g. `USE db` or `SET opt=val`
    fn execute(&mut self, sql: &str) -> SessionResult<()>;

    /// Start `sql` without waiting for it to finish
    fn submit_async(&mut self, sql: &str) -> SessionResult<()>;

    /// Current state of the submitted operation
    fn poll_status(&mut self) -> SessionResult<OperationState>;

    /// Up to `max_rows` rows. An empty batch means the results are exhausted.
    fn fetch_batch(&mut self, max_rows: usize) -> SessionResult<Vec<Row>>;

    /// Block until the operation finishes; errors if it ended in error
    fn wait_to_finish(&mut self) -> SessionResult<()>;

    /// Ask the engine to cancel the current operation
    fn cancel_operation(&mut self) -> SessionResult<()>;

    /// Runtime profile of the current operation. Expensive; callers memoize.
    fn profile(&mut self) -> SessionResult<String>;

    /// Handle of the current operation, if one was submitted
    fn operation_handle(&self) -> Option<OperationHandle>;

    /// Whether the current operation ended in failure
    fn execution_failed(&mut self) -> SessionResult<bool>;

    /// Query id of the current operation
    fn query_id(&self) -> Option<QueryId> {
        self.operation_handle().map(|handle| handle.query_id())
    }
}

/// Out-of-band administrative channel to the coordinator, e.g. its web server
pub trait CoordinatorAdmin: Send + Sync {
    /// Cancel a query by id without going through its session
    fn cancel_query(&self, query_id: &QueryId) -> SessionResult<()>;
}

/// Lock a shared session, recovering it if a previous holder panicked
///
/// A panic in the digest worker leaves the session usable for cancellation
/// and profile retrieval.
pub fn lock_session<S: ?Sized>(session: &Mutex<S>) -> MutexGuard<'_, S> {
    session.lock().unwrap_or_else(PoisonError::into_inner)
}
