//! Failure classification from engine error text
//!
//! The engine exposes no structured error codes, so failures are sorted by
//! substring rules over the lower-cased, trimmed message. The rules are
//! evaluated in a fixed order and the first match wins. Memory exhaustion is
//! checked before admission control because admission control performs some
//! memory checks itself, so a message can match both.
//!
//! These strings are coupled to the engine's wording; the tests pin them.

use std::fmt;

use serde::Serialize;

use crate::errors::ExecutionError;
use crate::report::QueryReport;

/// Phrases that mean the query ran out of memory
pub const MEMORY_EXCEEDED_PATTERNS: [&str; 5] = [
    "memory limit exceeded",
    "repartitioning did not reduce the size of a spilled partition",
    "failed to get minimum memory reservation",
    "minimum memory reservation is greater than",
    "minimum memory reservation needed is greater than",
];

/// Phrase for an admission-control rejection
pub const ADMISSION_REJECTED_PATTERN: &str = "rejected query from pool";

/// Phrase for a query that waited too long in the admission queue
pub const ADMISSION_TIMED_OUT_PATTERN: &str = "admission for query exceeded timeout";

/// Root cause of a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    MemoryExhaustion,
    AdmissionRejected,
    AdmissionTimedOut,
    Unclassified,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::MemoryExhaustion => "MEMORY_EXHAUSTION",
            ErrorClass::AdmissionRejected => "ADMISSION_REJECTED",
            ErrorClass::AdmissionTimedOut => "ADMISSION_TIMED_OUT",
            ErrorClass::Unclassified => "UNCLASSIFIED",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a raw error message
pub fn classify_message(message: &str) -> ErrorClass {
    let message = message.trim().to_lowercase();

    if MEMORY_EXCEEDED_PATTERNS
        .iter()
        .any(|pattern| message.contains(pattern))
    {
        return ErrorClass::MemoryExhaustion;
    }
    if message.contains(ADMISSION_REJECTED_PATTERN) {
        return ErrorClass::AdmissionRejected;
    }
    if message.contains(ADMISSION_TIMED_OUT_PATTERN) {
        return ErrorClass::AdmissionTimedOut;
    }
    ErrorClass::Unclassified
}

/// Record `error` on `report` as exactly one root cause
///
/// Unclassified errors are kept verbatim as `other_error`.
pub fn classify_failure(report: &mut QueryReport, error: ExecutionError) -> ErrorClass {
    let class = classify_message(&error.to_string());
    match class {
        ErrorClass::MemoryExhaustion => report.not_enough_memory = true,
        ErrorClass::AdmissionRejected => report.ac_rejected = true,
        ErrorClass::AdmissionTimedOut => report.ac_timedout = true,
        ErrorClass::Unclassified => report.other_error = Some(error),
    }
    class
}
