//! Scripted in-memory session
//!
//! Plays back a fixed sequence of states and result batches without a
//! remote engine. Used by the test suite and for dry runs of a runner setup.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use uuid::Uuid;

use super::types::{OperationHandle, OperationState, QueryId, Row};
use super::{CoordinatorAdmin, Session};
use crate::errors::{SessionError, SessionResult};

#[derive(Debug, Default)]
struct JournalInner {
    statements: Vec<String>,
    submitted: Vec<String>,
    polls: usize,
    fetches: usize,
    waits: usize,
    cancel_requests: usize,
    profile_requests: usize,
}

/// Record of every call made against a [`ScriptedSession`]
///
/// Clones share the same record, so a test can keep one after handing the
/// session to a runner.
#[derive(Debug, Clone, Default)]
pub struct SessionJournal {
    inner: Arc<Mutex<JournalInner>>,
}

impl SessionJournal {
    fn lock(&self) -> MutexGuard<'_, JournalInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Synchronous statements in execution order
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    /// SQL passed to `submit_async`
    pub fn submitted(&self) -> Vec<String> {
        self.lock().submitted.clone()
    }

    pub fn polls(&self) -> usize {
        self.lock().polls
    }

    pub fn fetches(&self) -> usize {
        self.lock().fetches
    }

    pub fn waits(&self) -> usize {
        self.lock().waits
    }

    pub fn cancel_requests(&self) -> usize {
        self.lock().cancel_requests
    }

    pub fn profile_requests(&self) -> usize {
        self.lock().profile_requests
    }
}

/// A session that plays back a script
#[derive(Debug)]
pub struct ScriptedSession {
    states: VecDeque<OperationState>,
    batches: VecDeque<Vec<Row>>,
    submit_error: Option<SessionError>,
    fetch_error: Option<SessionError>,
    wait_error: Option<SessionError>,
    cancel_error: Option<SessionError>,
    profile: Option<String>,
    execution_failed: bool,
    fetch_delay: Duration,
    handle: Option<OperationHandle>,
    journal: SessionJournal,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSession {
    /// A session whose query finishes immediately with no rows
    pub fn new() -> Self {
        Self {
            states: VecDeque::from([OperationState::Finished]),
            batches: VecDeque::new(),
            submit_error: None,
            fetch_error: None,
            wait_error: None,
            cancel_error: None,
            profile: None,
            execution_failed: false,
            fetch_delay: Duration::ZERO,
            handle: None,
            journal: SessionJournal::default(),
        }
    }

    /// States returned by successive polls. The last one repeats forever.
    pub fn with_states(mut self, states: impl IntoIterator<Item = OperationState>) -> Self {
        self.states = states.into_iter().collect();
        if self.states.is_empty() {
            self.states.push_back(OperationState::Finished);
        }
        self
    }

    /// Queue one batch of rows
    pub fn with_batch(mut self, rows: Vec<Row>) -> Self {
        self.batches.push_back(rows);
        self
    }

    /// Fail `submit_async` after the handle has been assigned
    pub fn failing_submit(mut self, error: SessionError) -> Self {
        self.submit_error = Some(error);
        self
    }

    /// Fail the fetch that follows the queued batches
    pub fn failing_fetch(mut self, error: SessionError) -> Self {
        self.fetch_error = Some(error);
        self
    }

    pub fn failing_wait(mut self, error: SessionError) -> Self {
        self.wait_error = Some(error);
        self
    }

    pub fn failing_cancel(mut self, error: SessionError) -> Self {
        self.cancel_error = Some(error);
        self
    }

    /// Profile text; without one, profile requests fail
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }

    pub fn with_execution_failed(mut self, failed: bool) -> Self {
        self.execution_failed = failed;
        self
    }

    /// Sleep inside every fetch, holding the session
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = delay;
        self
    }

    /// Shared record of calls made against this session
    pub fn journal(&self) -> SessionJournal {
        self.journal.clone()
    }

    fn require_operation(&self) -> SessionResult<()> {
        match self.handle {
            Some(_) => Ok(()),
            None => Err(SessionError::NoOperation),
        }
    }
}

impl Session for ScriptedSession {
    fn execute(&mut self, sql: &str) -> SessionResult<()> {
        self.journal.lock().statements.push(sql.to_string());
        Ok(())
    }

    fn submit_async(&mut self, sql: &str) -> SessionResult<()> {
        self.journal.lock().submitted.push(sql.to_string());
        let (hi, lo) = split_u128(Uuid::new_v4().as_u128());
        self.handle = Some(OperationHandle::new(hi, lo));
        match self.submit_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn poll_status(&mut self) -> SessionResult<OperationState> {
        self.require_operation()?;
        self.journal.lock().polls += 1;
        let state = if self.states.len() > 1 {
            self.states.pop_front()
        } else {
            self.states.front().cloned()
        };
        Ok(state.unwrap_or(OperationState::Finished))
    }

    fn fetch_batch(&mut self, max_rows: usize) -> SessionResult<Vec<Row>> {
        self.require_operation()?;
        self.journal.lock().fetches += 1;
        if !self.fetch_delay.is_zero() {
            thread::sleep(self.fetch_delay);
        }
        match self.batches.pop_front() {
            Some(mut rows) => {
                if rows.len() > max_rows {
                    let rest = rows.split_off(max_rows);
                    self.batches.push_front(rest);
                }
                Ok(rows)
            }
            None => match self.fetch_error.take() {
                Some(error) => Err(error),
                None => Ok(Vec::new()),
            },
        }
    }

    fn wait_to_finish(&mut self) -> SessionResult<()> {
        self.require_operation()?;
        self.journal.lock().waits += 1;
        match self.wait_error.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn cancel_operation(&mut self) -> SessionResult<()> {
        self.require_operation()?;
        self.journal.lock().cancel_requests += 1;
        match self.cancel_error.clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn profile(&mut self) -> SessionResult<String> {
        self.journal.lock().profile_requests += 1;
        self.require_operation()?;
        self.profile
            .clone()
            .ok_or_else(|| SessionError::Query("profile unavailable".into()))
    }

    fn operation_handle(&self) -> Option<OperationHandle> {
        self.handle
    }

    fn execution_failed(&mut self) -> SessionResult<bool> {
        Ok(self.execution_failed)
    }
}

fn split_u128(value: u128) -> (u64, u64) {
    ((value >> 64) as u64, value as u64)
}

/// Admin channel that records the ids it was asked to cancel
#[derive(Debug, Clone, Default)]
pub struct RecordingAdmin {
    cancelled: Arc<Mutex<Vec<QueryId>>>,
    fail: bool,
}

impl RecordingAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every cancellation attempt fails, still recorded
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Ids passed to `cancel_query`, in order
    pub fn cancelled(&self) -> Vec<QueryId> {
        match self.cancelled.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CoordinatorAdmin for RecordingAdmin {
    fn cancel_query(&self, query_id: &QueryId) -> SessionResult<()> {
        match self.cancelled.lock() {
            Ok(mut guard) => guard.push(query_id.clone()),
            Err(poisoned) => poisoned.into_inner().push(query_id.clone()),
        }
        if self.fail {
            return Err(SessionError::Connection("coordinator unreachable".into()));
        }
        Ok(())
    }
}
