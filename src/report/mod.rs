//! Outcome of a single query run
//!
//! A report is created when a run starts, mutated only by that run, and
//! handed to the caller by value when the run returns.
//!
//! # Root cause
//!
//! At most one of `not_enough_memory`, `ac_rejected`, `ac_timedout` and
//! `other_error` is set by classification. `timed_out` and `was_cancelled`
//! describe the deadline path and are independent of the root cause.
//! `mem_was_spilled` may accompany a successful run.

mod profile;

pub use profile::{fetch_profile_once, profile_shows_memory_exceeded, profile_shows_spilling};

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::errors::ExecutionError;
use crate::observability::{log_event_with_fields, Event};
use crate::query::Query;
use crate::session::QueryId;

/// How a run ended, in the order a caller should check for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    MemoryExhaustion,
    AdmissionRejected,
    AdmissionTimedOut,
    DeadlineExceeded,
    Unclassified,
}

/// Holds information about a single query run
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    #[serde(skip)]
    pub query: Query,
    pub logical_query_id: String,
    /// Assigned by the engine once submission completes
    pub query_id: Option<QueryId>,
    /// When the engine accepted the query
    pub submitted_at: Option<DateTime<Utc>>,
    /// Order-independent digest, SELECT queries only
    pub result_hash: Option<u64>,
    pub runtime_secs: Option<f64>,
    pub mem_was_spilled: bool,
    /// Memory limit hit, or admission control refused for lack of memory
    pub not_enough_memory: bool,
    pub ac_rejected: bool,
    pub ac_timedout: bool,
    #[serde(serialize_with = "serialize_error")]
    pub other_error: Option<ExecutionError>,
    pub timed_out: bool,
    pub was_cancelled: bool,
    #[serde(skip)]
    pub profile: Option<String>,
}

fn serialize_error<S: Serializer>(
    error: &Option<ExecutionError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

impl QueryReport {
    pub fn new(query: &Query) -> Self {
        Self {
            query: query.clone(),
            logical_query_id: query.logical_query_id.clone(),
            query_id: None,
            submitted_at: None,
            result_hash: None,
            runtime_secs: None,
            mem_was_spilled: false,
            not_enough_memory: false,
            ac_rejected: false,
            ac_timedout: false,
            other_error: None,
            timed_out: false,
            was_cancelled: false,
            profile: None,
        }
    }

    /// Whether the query reported any kind of error, as opposed to running to
    /// completion, timing out, or being cancelled
    pub fn has_query_error(&self) -> bool {
        self.not_enough_memory || self.ac_rejected || self.ac_timedout || self.other_error.is_some()
    }

    /// Digest computed and different from the query's baseline
    pub fn result_mismatch(&self) -> bool {
        match (self.result_hash, self.query.result_hash) {
            (Some(actual), Some(expected)) => actual != expected,
            _ => false,
        }
    }

    pub fn outcome(&self) -> Outcome {
        if self.not_enough_memory {
            Outcome::MemoryExhaustion
        } else if self.ac_rejected {
            Outcome::AdmissionRejected
        } else if self.ac_timedout {
            Outcome::AdmissionTimedOut
        } else if self.other_error.is_some() {
            Outcome::Unclassified
        } else if self.timed_out {
            Outcome::DeadlineExceeded
        } else {
            Outcome::Completed
        }
    }

    /// Report as a JSON object, without the profile
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// File name for this report's profile, e.g.
    /// `nightly_tpcds_q21_00000001a38c8331_0000000000000000_profile.txt`
    pub fn profile_file_name(&self, prefix: Option<&str>) -> Option<String> {
        let query_id = self.query_id.as_ref()?;
        let mut file_name = String::new();
        if let Some(prefix) = prefix {
            file_name.push_str(prefix);
            file_name.push('_');
        }
        file_name.push_str(&self.logical_query_id);
        file_name.push('_');
        file_name.push_str(&query_id.file_safe());
        file_name.push_str("_profile.txt");
        Some(file_name)
    }

    /// Write the profile into `directory`
    ///
    /// Does nothing unless both a profile and a query id are present.
    /// Returns the path written.
    pub fn write_query_profile(
        &self,
        directory: &Path,
        prefix: Option<&str>,
    ) -> io::Result<Option<PathBuf>> {
        let (Some(profile), Some(file_name)) = (&self.profile, self.profile_file_name(prefix)) else {
            return Ok(None);
        };
        let path = directory.join(file_name);
        fs::write(&path, profile)?;
        log_event_with_fields(
            Event::ProfileWritten,
            &[("path", &path.display().to_string())],
        );
        Ok(Some(path))
    }
}

fn display_opt<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "None".to_string(),
    }
}

impl fmt::Display for QueryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "<QueryReport")?;
        writeln!(f, "result_hash: {}", display_opt(&self.result_hash))?;
        writeln!(f, "runtime_secs: {}", display_opt(&self.runtime_secs))?;
        writeln!(f, "mem_was_spilled: {}", self.mem_was_spilled)?;
        writeln!(f, "not_enough_memory: {}", self.not_enough_memory)?;
        writeln!(f, "ac_rejected: {}", self.ac_rejected)?;
        writeln!(f, "ac_timedout: {}", self.ac_timedout)?;
        writeln!(f, "other_error: {}", display_opt(&self.other_error))?;
        writeln!(f, "timed_out: {}", self.timed_out)?;
        writeln!(f, "was_cancelled: {}", self.was_cancelled)?;
        writeln!(f, "query_id: {}", display_opt(&self.query_id))?;
        write!(f, ">")
    }
}
