//! Best-effort two-tier cancellation
//!
//! 1. Ask the session to cancel its own operation.
//! 2. If that fails, or a digest worker is holding the session mid-fetch,
//!    ask the coordinator to cancel the query by id.
//!
//! Neither failure reaches the caller; `timed_out` already records the intent.

use std::sync::{Mutex, TryLockError};

use crate::errors::SessionError;
use crate::observability::{log_event_with_fields, Event};
use crate::report::QueryReport;
use crate::session::{CoordinatorAdmin, Session};

/// Cancel the report's query and mark the report timed out
pub fn cancel_query<S: Session>(
    session: &Mutex<S>,
    admin: &dyn CoordinatorAdmin,
    report: &mut QueryReport,
) {
    report.timed_out = true;

    let Some(query_id) = report.query_id.clone() else {
        return;
    };
    let id = query_id.to_string();

    log_event_with_fields(Event::CancelRequested, &[("query_id", &id)]);
    let attempt = match session.try_lock() {
        Ok(mut guard) => guard.cancel_operation(),
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().cancel_operation(),
        Err(TryLockError::WouldBlock) => Err(SessionError::Busy),
    };
    let Err(error) = attempt else {
        return;
    };

    log_event_with_fields(
        Event::CancelFailed,
        &[("query_id", &id), ("error", &error.to_string())],
    );
    log_event_with_fields(Event::AdminCancelRequested, &[("query_id", &id)]);
    if let Err(error) = admin.cancel_query(&query_id) {
        log_event_with_fields(
            Event::AdminCancelFailed,
            &[("query_id", &id), ("error", &error.to_string())],
        );
    }
}
