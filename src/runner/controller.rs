//! Query lifecycle controller
//!
//! Run flow (strict order):
//! 1. Prepare the session: database, set-up SQL, options, memory limit
//! 2. Submit the annotated query asynchronously and record its id
//! 3. Poll until the query is fetchable or the deadline passes
//! 4. SELECT: digest the results under the remaining budget;
//!    otherwise wait for the statement to finish
//! 5. Classify any failure from steps 2-4
//! 6. Stop if the report carries an error
//! 7. Record runtime; inspect the profile for spilling when asked to

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;

use super::cancel::cancel_query;
use crate::classify::classify_failure;
use crate::config::{RunOptions, RunnerConfig};
use crate::deadline::Deadline;
use crate::digest::{spawn_digest, DigestJob};
use crate::errors::{DigestError, ExecutionError, RunnerError, RunnerResult};
use crate::observability::{log_event_with_fields, Event, Logger, Metric, MetricsRegistry};
use crate::query::Query;
use crate::report::{
    fetch_profile_once, profile_shows_memory_exceeded, profile_shows_spilling, QueryReport,
};
use crate::session::{lock_session, CoordinatorAdmin, QueryId, Session};

/// How often a long wait is logged while polling
const WAIT_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Runs queries on one session and reports how each run went
///
/// One runner drives one in-flight query at a time. Run several runners to
/// load a cluster concurrently; they can share a [`MetricsRegistry`].
pub struct QueryRunner<S: Session + 'static> {
    config: RunnerConfig,
    admin: Arc<dyn CoordinatorAdmin>,
    metrics: Arc<MetricsRegistry>,
    session: Option<Arc<Mutex<S>>>,
}

impl<S: Session + 'static> QueryRunner<S> {
    /// Create a runner; the configured log level applies process-wide
    pub fn new(config: RunnerConfig, admin: Arc<dyn CoordinatorAdmin>) -> Self {
        Logger::set_min_severity(config.log_level);
        Self {
            config,
            admin,
            metrics: Arc::new(MetricsRegistry::new()),
            session: None,
        }
    }

    /// Report into a registry shared with other runners
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Bind the session every subsequent run uses
    pub fn connect(&mut self, session: S) {
        self.session = Some(Arc::new(Mutex::new(session)));
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        Arc::clone(&self.metrics)
    }

    /// Run `query` and return its report
    ///
    /// Every failure of the query itself ends up in the report. The only
    /// error returned is [`RunnerError::NotConnected`].
    pub fn run_query(&self, query: &Query, options: &RunOptions) -> RunnerResult<QueryReport> {
        let session = self.session.as_ref().ok_or(RunnerError::NotConnected)?;
        self.metrics.increment(Metric::QueriesDequeued);

        let mut run = QueryRun {
            runner: self,
            shared: session,
            session: session.as_ref(),
            query,
            options,
            deadline: Deadline::after(options.timeout),
            counted_start: false,
        };
        let mut report = QueryReport::new(query);

        // Connection-level failures outside the classified section
        if let Err(error) = run.run(&mut report) {
            report.other_error = Some(error);
        }
        run.count_started();
        self.metrics.record_report(&report);

        log_event_with_fields(
            Event::QueryCompleted,
            &[
                ("logical_query_id", &query.logical_query_id),
                ("query_id", &query_id_field(&report)),
                ("outcome", &format!("{:?}", report.outcome())),
            ],
        );
        Ok(report)
    }

    fn annotate(&self, query: &Query, options: &RunOptions) -> String {
        format!(
            "/* Mem: {} MB. Coordinator: {}. */\n{}",
            options.mem_limit_mb, self.config.coordinator_host, query.sql
        )
    }
}

fn query_id_field(report: &QueryReport) -> String {
    report
        .query_id
        .as_ref()
        .map(QueryId::to_string)
        .unwrap_or_default()
}

/// State of a single `run_query` call
struct QueryRun<'r, S: Session + 'static> {
    runner: &'r QueryRunner<S>,
    shared: &'r Arc<Mutex<S>>,
    session: &'r Mutex<S>,
    query: &'r Query,
    options: &'r RunOptions,
    deadline: Deadline,
    counted_start: bool,
}

impl<'r, S: Session + 'static> QueryRun<'r, S> {
    /// Count this run as started-running-or-cancelled, once
    fn count_started(&mut self) {
        if !self.counted_start {
            self.counted_start = true;
            self.runner
                .metrics
                .increment(Metric::QueriesStartedRunningOrCancelled);
        }
    }

    fn run(&mut self, report: &mut QueryReport) -> Result<(), ExecutionError> {
        {
            let Some(mut session) = self.acquire_session() else {
                self.session_unavailable(report);
                return Ok(());
            };
            self.prepare_session(&mut *session)?;
        }

        let accepted_at = match self.execute(report) {
            Ok(Some(accepted_at)) => accepted_at,
            // Deadline path; the report is complete
            Ok(None) => return Ok(()),
            Err(error) => {
                self.record_failure(report, error);
                return Ok(());
            }
        };
        if report.has_query_error() {
            return Ok(());
        }

        report.runtime_secs = Some(accepted_at.elapsed().as_secs_f64());
        let mut session = lock_session(self.session);
        if session.execution_failed()? || self.runner.config.check_if_mem_was_spilled {
            fetch_profile_once(report, &mut *session);
            if let Some(profile) = &report.profile {
                report.mem_was_spilled = profile_shows_spilling(profile);
                report.not_enough_memory |= profile_shows_memory_exceeded(profile);
            }
        }
        Ok(())
    }

    /// Lock the session without waiting
    fn try_session(&self) -> Option<MutexGuard<'r, S>> {
        let session: &'r Mutex<S> = self.session;
        match session.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Lock the session, giving up once the deadline passes
    ///
    /// A digest worker abandoned by an earlier run keeps the session for the
    /// rest of its in-flight fetch. Without a deadline this blocks.
    fn acquire_session(&self) -> Option<MutexGuard<'r, S>> {
        if self.deadline.remaining().is_none() {
            return Some(lock_session(self.session));
        }
        let poll_interval = self.runner.config.poll_interval();
        loop {
            if let Some(guard) = self.try_session() {
                return Some(guard);
            }
            match self.deadline.remaining() {
                Some(remaining) if !remaining.is_zero() => {
                    thread::sleep(poll_interval.min(remaining))
                }
                _ => return None,
            }
        }
    }

    /// The deadline passed before the query could be submitted
    fn session_unavailable(&self, report: &mut QueryReport) {
        log_event_with_fields(
            Event::SessionUnavailable,
            &[("logical_query_id", &self.query.logical_query_id)],
        );
        report.timed_out = true;
    }

    /// Select the database and apply set-up and options
    fn prepare_session(&self, session: &mut S) -> Result<(), ExecutionError> {
        let config = &self.runner.config;

        if let Some(db_name) = &self.query.db_name {
            log_event_with_fields(Event::DatabaseSelected, &[("db", db_name)]);
            session.execute(&format!("USE {}", db_name))?;
        }
        if self.options.run_set_up {
            if let Some(set_up_sql) = &self.query.set_up_sql {
                log_event_with_fields(Event::SetUpExecuted, &[("sql", set_up_sql)]);
                session.execute(set_up_sql)?;
            }
        }
        // Query options come last so they override the common ones
        for (name, value) in config
            .common_query_options
            .iter()
            .chain(self.query.options.iter())
        {
            session.execute(&format!("SET {}={}", name, value))?;
        }
        session.execute("SET ABORT_ON_ERROR=1")?;

        let mem_limit = self.options.mem_limit_mb.to_string();
        if config.test_admission_control {
            // Admission control decides how much memory the query gets
            log_event_with_fields(
                Event::OptionsApplied,
                &[("coordinator", &config.coordinator_host), ("mem_limit_mb", "none")],
            );
        } else {
            session.execute(&format!("SET MEM_LIMIT={}M", self.options.mem_limit_mb))?;
            log_event_with_fields(
                Event::OptionsApplied,
                &[("coordinator", &config.coordinator_host), ("mem_limit_mb", &mem_limit)],
            );
        }
        Ok(())
    }

    /// Submit, wait, and consume the query
    ///
    /// Returns when the engine accepted it, or None if the deadline passed.
    fn execute(&mut self, report: &mut QueryReport) -> Result<Option<Instant>, ExecutionError> {
        let sql = self.runner.annotate(self.query, self.options);
        {
            let Some(mut session) = self.acquire_session() else {
                self.session_unavailable(report);
                return Ok(None);
            };
            let submitted = session.submit_async(&sql);
            // Keep the id even when submission fails
            report.query_id = session.query_id();
            self.runner.metrics.increment(Metric::QueriesSubmitted);
            submitted?;
        }
        let accepted_at = Instant::now();
        report.submitted_at = Some(Utc::now());
        log_event_with_fields(
            Event::QuerySubmitted,
            &[
                ("logical_query_id", &self.query.logical_query_id),
                ("query_id", &query_id_field(report)),
            ],
        );

        if !self.wait_until_fetchable(report)? {
            return Ok(None);
        }

        if self.query.query_type.is_select() {
            if !self.digest_results(report)? {
                return Ok(None);
            }
        } else {
            // Raises if the statement ended in error
            lock_session(self.session).wait_to_finish()?;
        }
        Ok(Some(accepted_at))
    }

    /// Poll until the results can be fetched or the query reached another
    /// terminal state. On deadline the query is cancelled and this returns false.
    fn wait_until_fetchable(&mut self, report: &mut QueryReport) -> Result<bool, ExecutionError> {
        let poll_interval = self.runner.config.poll_interval();
        let mut since_log = Duration::ZERO;

        loop {
            // A busy session counts as a poll without progress
            let state = match self.try_session() {
                Some(mut session) => Some(session.poll_status()?),
                None => None,
            };
            let state_name = state
                .as_ref()
                .map_or_else(|| "UNKNOWN".to_string(), ToString::to_string);
            if let Some(state) = &state {
                if !self.counted_start && !state.is_not_started() {
                    self.count_started();
                    log_event_with_fields(
                        Event::QueryStartedRunning,
                        &[("query_id", &query_id_field(report)), ("state", &state_name)],
                    );
                }
                if state.is_fetchable() {
                    return Ok(true);
                }
            }

            if self.deadline.is_expired() {
                log_event_with_fields(
                    Event::QueryTimedOut,
                    &[("query_id", &query_id_field(report)), ("state", &state_name)],
                );
                // An expected cancellation needs no postmortem
                if !self.options.should_cancel {
                    if let Some(mut session) = self.try_session() {
                        fetch_profile_once(report, &mut *session);
                    }
                }
                cancel_query(self.session, self.runner.admin.as_ref(), report);
                report.was_cancelled = self.options.should_cancel;
                self.count_started();
                return Ok(false);
            }

            if since_log >= WAIT_LOG_INTERVAL {
                since_log = Duration::ZERO;
                log_event_with_fields(
                    Event::QueryWaiting,
                    &[("query_id", &query_id_field(report)), ("state", &state_name)],
                );
            }
            thread::sleep(poll_interval);
            since_log += poll_interval;
        }
    }

    /// Digest the result set under the remaining budget
    ///
    /// Returns false if the deadline passed and the query was cancelled.
    fn digest_results(&mut self, report: &mut QueryReport) -> Result<bool, ExecutionError> {
        let job = DigestJob {
            query: self.query.clone(),
            query_id: report
                .query_id
                .clone()
                .unwrap_or_else(|| QueryId::new("unknown")),
            batch_size: self.runner.config.fetch_batch_size,
            results_dir: self.runner.config.results_dir.clone(),
        };

        let digest =
            spawn_digest(Arc::clone(self.shared), job).and_then(|task| task.wait(self.deadline));
        match digest {
            Ok(hash) => {
                report.result_hash = Some(hash);
                let mismatch = report.result_mismatch();
                if mismatch {
                    log_event_with_fields(
                        Event::DigestMismatch,
                        &[
                            ("query_id", &query_id_field(report)),
                            ("expected", &format!("{:?}", self.query.result_hash)),
                            ("actual", &hash.to_string()),
                        ],
                    );
                }
                if self.options.retain_profile || mismatch {
                    fetch_profile_once(report, &mut *lock_session(self.session));
                }
                Ok(true)
            }
            Err(DigestError::DeadlineExceeded) => {
                // The worker may still hold the session; cancellation copes with that
                // A late failure, so never counted as an expected cancellation
                cancel_query(self.session, self.runner.admin.as_ref(), report);
                Ok(false)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Attach the profile and classify a failure of the query itself
    fn record_failure(&mut self, report: &mut QueryReport, error: ExecutionError) {
        {
            let mut session = lock_session(self.session);
            if let Some(query_id) = session.query_id() {
                report.query_id = Some(query_id);
            }
            log_event_with_fields(
                Event::QueryFailed,
                &[("query_id", &query_id_field(report)), ("error", &error.to_string())],
            );
            fetch_profile_once(report, &mut *session);
        }
        classify_failure(report, error);
        self.count_started();
    }
}
