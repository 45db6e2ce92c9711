//! Runtime profile retrieval and inspection

use std::sync::LazyLock;

use regex::Regex;

use super::QueryReport;
use crate::observability::{log_event_with_fields, Event};
use crate::session::Session;

/// Marker the engine writes into a profile when a query hit its memory limit
const MEMORY_EXCEEDED_MARKER: &str = "Memory limit exceeded";

/// An operator ran with spilling enabled and used it
static SPILLED_EXEC_OPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"ExecOption:.*Spilled").expect("valid spill pattern"));

/// A sort or join wrote at least one run to disk
static SPILLED_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"SpilledRuns: [^0]").expect("valid spill pattern"));

/// Fetch the profile into `report` unless it already has one
///
/// Producing a profile is expensive for the engine, so this runs at most once
/// per report. Failures are logged and dropped: a missing profile must never
/// replace the error that prompted the fetch.
pub fn fetch_profile_once<S: Session + ?Sized>(report: &mut QueryReport, session: &mut S) {
    if report.profile.is_some() || session.operation_handle().is_none() {
        return;
    }
    match session.profile() {
        Ok(profile) => report.profile = Some(profile),
        Err(e) => {
            let query_id = report
                .query_id
                .as_ref()
                .map(|id| id.to_string())
                .unwrap_or_default();
            log_event_with_fields(
                Event::ProfileFetchFailed,
                &[("query_id", &query_id), ("error", &e.to_string())],
            );
        }
    }
}

/// Any operator in the profile spilled to disk
pub fn profile_shows_spilling(profile: &str) -> bool {
    SPILLED_EXEC_OPTION.is_match(profile) || SPILLED_RUNS.is_match(profile)
}

/// The profile records a memory-limit failure
pub fn profile_shows_memory_exceeded(profile: &str) -> bool {
    profile.contains(MEMORY_EXCEEDED_MARKER)
}
