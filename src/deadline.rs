//! Wall-clock deadline for a run

use std::time::{Duration, Instant};

/// A point in time after which a run must stop waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// `timeout` from now; None never expires
    pub fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    pub fn at(instant: Instant) -> Self {
        Self { at: Some(instant) }
    }

    pub fn is_expired(&self) -> bool {
        match self.at {
            Some(at) => Instant::now() > at,
            None => false,
        }
    }

    /// Time left, zero once expired; None when unbounded
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbounded_deadline() {
        let deadline = Deadline::after(None);
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), None);
    }

    #[test]
    fn test_expired_deadline_has_zero_remaining() {
        let deadline = Deadline::at(Instant::now());
        std::thread::sleep(Duration::from_millis(2));
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_future_deadline() {
        let deadline = Deadline::after(Some(Duration::from_secs(60)));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining().unwrap() > Duration::from_secs(59));
    }

    #[test]
    fn test_huge_timeout_does_not_overflow() {
        let deadline = Deadline::after(Some(Duration::MAX));
        assert!(!deadline.is_expired());
    }
}
