//! Observability for query runs
//!
//! - Structured logging (JSON lines on stderr)
//! - Typed lifecycle events
//! - Atomic counters shared with a supervisor
//!
//! # Usage
//!
//! ```ignore
//! use stressrunner::observability::{log_event_with_fields, Event, Metric, MetricsRegistry};
//!
//! log_event_with_fields(Event::QuerySubmitted, &[("query_id", "1:2")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment(Metric::QueriesSubmitted);
//! ```

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{Metric, MetricsRegistry};

/// Log a lifecycle event with fields at its default severity
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        // Verifies no panic
        log_event_with_fields(Event::QueryCompleted, &[]);
        log_event_with_fields(Event::CancelFailed, &[("query_id", "a:b")]);
    }
}
