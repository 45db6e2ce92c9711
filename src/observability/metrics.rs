//! Metrics registry shared between query runners and their supervisor
//!
//! - Counters only, monotonic increase
//! - Per-counter atomicity, no compound transactions
//! - Snapshots never block writers

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::report::QueryReport;

const METRIC_COUNT: usize = 10;

/// The fixed set of counters maintained for a query runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    /// Queries taken off the work queue
    QueriesDequeued,
    /// Queries handed to a runner
    QueriesSubmitted,
    /// Queries that got past admission control, or were cancelled, or failed
    QueriesStartedRunningOrCancelled,
    /// Reports recorded
    QueriesFinished,
    /// Reports with a memory-exhaustion root cause
    QueriesExceededMemLimit,
    /// Reports rejected by admission control
    QueriesAcRejected,
    /// Reports timed out in the admission queue
    QueriesAcTimedOut,
    /// Reports cancelled on request
    QueriesCancelled,
    /// Digests differing from the baseline
    ResultMismatches,
    /// Reports with an unclassified error
    OtherErrors,
}

impl Metric {
    /// Every counter, in snapshot order
    pub const ALL: [Metric; METRIC_COUNT] = [
        Metric::QueriesDequeued,
        Metric::QueriesSubmitted,
        Metric::QueriesStartedRunningOrCancelled,
        Metric::QueriesFinished,
        Metric::QueriesExceededMemLimit,
        Metric::QueriesAcRejected,
        Metric::QueriesAcTimedOut,
        Metric::QueriesCancelled,
        Metric::ResultMismatches,
        Metric::OtherErrors,
    ];

    /// Stable counter name
    pub fn name(&self) -> &'static str {
        match self {
            Metric::QueriesDequeued => "num_queries_dequeued",
            Metric::QueriesSubmitted => "num_queries_submitted",
            Metric::QueriesStartedRunningOrCancelled => "num_queries_started_running_or_cancelled",
            Metric::QueriesFinished => "num_queries_finished",
            Metric::QueriesExceededMemLimit => "num_queries_exceeded_mem_limit",
            Metric::QueriesAcRejected => "num_queries_ac_rejected",
            Metric::QueriesAcTimedOut => "num_queries_ac_timedout",
            Metric::QueriesCancelled => "num_queries_cancelled",
            Metric::ResultMismatches => "num_result_mismatches",
            Metric::OtherErrors => "num_other_errors",
        }
    }

    /// Look a counter up by its stable name
    pub fn from_name(name: &str) -> Option<Metric> {
        Metric::ALL.iter().copied().find(|m| m.name() == name)
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Metrics registry containing all runner counters
///
/// Relaxed ordering throughout; readers only need per-counter atomicity.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: [AtomicU64; METRIC_COUNT],
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one to `metric`
    pub fn increment(&self, metric: Metric) {
        self.counters[metric.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Current value of `metric`
    pub fn get(&self, metric: Metric) -> u64 {
        self.counters[metric.index()].load(Ordering::Relaxed)
    }

    /// Point-in-time values of every counter as `(name, value)` pairs
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        Metric::ALL
            .iter()
            .map(|metric| (metric.name(), self.get(*metric)))
            .collect()
    }

    /// Snapshot rendered as a JSON object
    pub fn to_json(&self) -> String {
        let map: serde_json::Map<String, serde_json::Value> = self
            .snapshot()
            .into_iter()
            .map(|(name, value)| (name.to_string(), value.into()))
            .collect();
        serde_json::Value::Object(map).to_string()
    }

    /// Apply a finished report to the outcome counters
    pub fn record_report(&self, report: &QueryReport) {
        self.increment(Metric::QueriesFinished);
        if report.not_enough_memory {
            self.increment(Metric::QueriesExceededMemLimit);
        }
        if report.ac_rejected {
            self.increment(Metric::QueriesAcRejected);
        }
        if report.ac_timedout {
            self.increment(Metric::QueriesAcTimedOut);
        }
        if report.was_cancelled {
            self.increment(Metric::QueriesCancelled);
        }
        if report.other_error.is_some() {
            self.increment(Metric::OtherErrors);
        }
        if report.result_mismatch() {
            self.increment(Metric::ResultMismatches);
        }
    }
}
