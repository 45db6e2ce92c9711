//! Cancellable digest worker
//!
//! The digest runs on its own thread so a stalled fetch cannot hold the
//! runner past its deadline. The runner waits for at most the remaining
//! budget; on timeout it raises the stop flag and walks away. The worker
//! checks the flag before every batch and its late result, if any, is
//! dropped with the channel.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;

use super::hash::{normalize, ResultDigest};
use crate::deadline::Deadline;
use crate::errors::DigestError;
use crate::observability::{log_event_with_fields, Event};
use crate::query::Query;
use crate::session::{lock_session, QueryId, Session};

/// Subdirectory of the results directory holding trace logs
pub const RESULT_HASHES_DIR: &str = "result_hashes";

/// What the worker needs to hash one query's results
#[derive(Debug, Clone)]
pub struct DigestJob {
    pub query: Query,
    pub query_id: QueryId,
    pub batch_size: usize,
    /// Write a per-value trace under `<results_dir>/result_hashes/`
    pub results_dir: Option<PathBuf>,
}

/// Trace file name: `{logical id}_{query id}[_initial]_results.txt`
///
/// `_initial` marks runs of queries without a baseline digest yet.
pub fn trace_file_name(query: &Query, query_id: &QueryId) -> String {
    let mut name = format!("{}_{}", query.logical_query_id, query_id.file_safe());
    if query.result_hash.is_none() {
        name.push_str("_initial");
    }
    name.push_str("_results.txt");
    name
}

struct TraceLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl TraceLog {
    fn create(results_dir: &Path, job: &DigestJob) -> io::Result<Self> {
        let dir = results_dir.join(RESULT_HASHES_DIR);
        fs::create_dir_all(&dir)?;
        let path = dir.join(trace_file_name(&job.query, &job.query_id));
        let mut writer = BufWriter::new(File::create(&path)?);
        writeln!(writer, "{}", job.query.sql)?;
        Ok(Self { path, writer })
    }

    fn record(&mut self, value: &str, digest: u64) -> io::Result<()> {
        writeln!(self.writer, "{}\t{}", value, digest)
    }

    /// Flush and close; drop the file when the digest matched the baseline
    fn close(mut self, digest: Option<u64>, baseline: Option<u64>) -> io::Result<()> {
        self.writer.flush()?;
        drop(self.writer);
        if digest.is_some() && digest == baseline {
            if let Err(e) = fs::remove_file(&self.path) {
                log_event_with_fields(
                    Event::TraceCleanupFailed,
                    &[
                        ("path", &self.path.display().to_string()),
                        ("error", &e.to_string()),
                    ],
                );
            }
        }
        Ok(())
    }
}

fn consume<S: Session>(
    session: &Mutex<S>,
    job: &DigestJob,
    stop: &AtomicBool,
    digest: &mut ResultDigest,
    trace: &mut Option<TraceLog>,
) -> Result<u64, DigestError> {
    let query_id = job.query_id.to_string();
    loop {
        if stop.load(Ordering::Acquire) {
            return Err(DigestError::Stopped);
        }
        log_event_with_fields(Event::DigestBatch, &[("query_id", &query_id)]);
        // Held for one batch only, so the runner can try to cancel in between
        let rows = lock_session(session).fetch_batch(job.batch_size)?;
        if rows.is_empty() {
            log_event_with_fields(Event::DigestComplete, &[("query_id", &query_id)]);
            return Ok(digest.value());
        }
        for row in &rows {
            for (column, value) in row.iter().enumerate() {
                let running = digest.add(column, value);
                if let Some(log) = trace.as_mut() {
                    log.record(&normalize(value).to_string(), running)?;
                }
            }
        }
    }
}

/// Hash every remaining row of the session's current operation
///
/// Runs on the calling thread; [`spawn_digest`] wraps it in a worker.
pub fn hash_results<S: Session>(
    session: &Mutex<S>,
    job: &DigestJob,
    stop: &AtomicBool,
) -> Result<u64, DigestError> {
    let mut trace = match &job.results_dir {
        Some(dir) => Some(TraceLog::create(dir, job)?),
        None => None,
    };
    let mut digest = ResultDigest::new();
    let outcome = consume(session, job, stop, &mut digest, &mut trace);

    // Close before surfacing a streaming error so the trace is complete on disk
    if let Some(log) = trace {
        let closed = log.close(outcome.as_ref().ok().copied(), job.query.result_hash);
        if outcome.is_ok() {
            closed?;
        }
    }
    outcome
}

/// Handle on a running digest worker
pub struct DigestTask {
    receiver: Receiver<Result<u64, DigestError>>,
    stop: Arc<AtomicBool>,
    query_id: QueryId,
}

impl DigestTask {
    /// Wait for the digest until `deadline`
    ///
    /// On timeout the worker is told to stop and abandoned; this returns
    /// [`DigestError::DeadlineExceeded`] without waiting for it.
    pub fn wait(self, deadline: Deadline) -> Result<u64, DigestError> {
        let received = match deadline.remaining() {
            None => self.receiver.recv().map_err(|_| DigestError::WorkerLost),
            Some(remaining) => match self.receiver.recv_timeout(remaining) {
                Ok(result) => Ok(result),
                Err(RecvTimeoutError::Timeout) => {
                    self.stop.store(true, Ordering::Release);
                    log_event_with_fields(
                        Event::DigestAbandoned,
                        &[("query_id", self.query_id.as_str())],
                    );
                    return Err(DigestError::DeadlineExceeded);
                }
                Err(RecvTimeoutError::Disconnected) => Err(DigestError::WorkerLost),
            },
        };
        received?
    }
}

/// Start hashing on a new thread
pub fn spawn_digest<S>(session: Arc<Mutex<S>>, job: DigestJob) -> Result<DigestTask, DigestError>
where
    S: Session + 'static,
{
    let (sender, receiver) = mpsc::channel();
    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);
    let query_id = job.query_id.clone();

    thread::Builder::new()
        .name(format!("fetch-results-{}", job.query_id))
        .spawn(move || {
            let result = hash_results(&*session, &job, &worker_stop);
            // The runner may have given up on us already
            let _ = sender.send(result);
        })?;

    Ok(DigestTask {
        receiver,
        stop,
        query_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::digest_rows;
    use crate::errors::SessionError;
    use crate::query::QueryType;
    use crate::session::{ScriptedSession, Value};
    use std::time::{Duration, Instant};

    fn job(query: Query, results_dir: Option<PathBuf>) -> DigestJob {
        DigestJob {
            query,
            query_id: QueryId::new("aa:bb"),
            batch_size: 2,
            results_dir,
        }
    }

    fn rows() -> Vec<Vec<Value>> {
        vec![
            vec![Value::Int(1), Value::Null],
            vec![Value::Int(2), Value::Float(3.14159265)],
            vec![Value::Int(3), Value::Text("c".into())],
        ]
    }

    fn session_with_rows() -> Mutex<ScriptedSession> {
        let mut session = ScriptedSession::new().with_batch(rows());
        session.submit_async("SELECT 1").unwrap();
        Mutex::new(session)
    }

    #[test]
    fn test_trace_file_name() {
        let query = Query::new("q7", "SELECT 1", QueryType::Select);
        let id = QueryId::new("aa:bb");
        assert_eq!(trace_file_name(&query, &id), "q7_aa_bb_initial_results.txt");
        let query = query.with_result_hash(3);
        assert_eq!(trace_file_name(&query, &id), "q7_aa_bb_results.txt");
    }

    #[test]
    fn test_hash_results_matches_in_memory_digest() {
        let session = session_with_rows();
        let stop = AtomicBool::new(false);
        let query = Query::new("q7", "SELECT 1", QueryType::Select);

        let digest = hash_results(&session, &job(query, None), &stop).unwrap();
        assert_eq!(digest, digest_rows(&rows()));
    }

    #[test]
    fn test_trace_written_without_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_rows();
        let stop = AtomicBool::new(false);
        let query = Query::new("q7", "SELECT a, b FROM t", QueryType::Select);

        let digest =
            hash_results(&session, &job(query, Some(dir.path().to_path_buf())), &stop).unwrap();

        let path = dir
            .path()
            .join(RESULT_HASHES_DIR)
            .join("q7_aa_bb_initial_results.txt");
        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "SELECT a, b FROM t");
        assert_eq!(lines.len(), 1 + 6);
        assert_eq!(lines[2], format!("38463209\t{}", 2 + 2 * 38463209u64));
        assert_eq!(lines[4], format!("3.14159\t{}", {
            let mut d = ResultDigest::new();
            d.add_row(&rows()[0]);
            d.add_row(&rows()[1])
        }));
        assert!(lines[6].ends_with(&format!("\t{}", digest)));
    }

    #[test]
    fn test_trace_removed_when_baseline_matches() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_rows();
        let stop = AtomicBool::new(false);
        let query =
            Query::new("q7", "SELECT 1", QueryType::Select).with_result_hash(digest_rows(&rows()));

        hash_results(&session, &job(query, Some(dir.path().to_path_buf())), &stop).unwrap();

        let path = dir.path().join(RESULT_HASHES_DIR).join("q7_aa_bb_results.txt");
        assert!(!path.exists());
    }

    #[test]
    fn test_trace_kept_when_baseline_differs() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_rows();
        let stop = AtomicBool::new(false);
        let query = Query::new("q7", "SELECT 1", QueryType::Select).with_result_hash(1);

        hash_results(&session, &job(query, Some(dir.path().to_path_buf())), &stop).unwrap();

        let path = dir.path().join(RESULT_HASHES_DIR).join("q7_aa_bb_results.txt");
        assert!(path.exists());
    }

    #[test]
    fn test_fetch_error_surfaces_after_trace_closed() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ScriptedSession::new()
            .with_batch(rows())
            .failing_fetch(SessionError::Query("Memory limit exceeded".into()));
        session.submit_async("SELECT 1").unwrap();
        let session = Mutex::new(session);
        let stop = AtomicBool::new(false);
        let query = Query::new("q7", "SELECT 1", QueryType::Select);

        let err = hash_results(&session, &job(query, Some(dir.path().to_path_buf())), &stop)
            .unwrap_err();
        assert!(matches!(err, DigestError::Session(SessionError::Query(_))));

        let path = dir
            .path()
            .join(RESULT_HASHES_DIR)
            .join("q7_aa_bb_initial_results.txt");
        assert_eq!(fs::read_to_string(path).unwrap().lines().count(), 1 + 6);
    }

    #[test]
    fn test_stop_flag_checked_before_batch() {
        let session = session_with_rows();
        let stop = AtomicBool::new(true);
        let query = Query::new("q7", "SELECT 1", QueryType::Select);

        let err = hash_results(&session, &job(query, None), &stop).unwrap_err();
        assert!(matches!(err, DigestError::Stopped));
        assert_eq!(lock_session(&session).journal().fetches(), 0);
    }

    #[test]
    fn test_spawned_task_returns_digest() {
        let session = Arc::new(session_with_rows());
        let query = Query::new("q7", "SELECT 1", QueryType::Select);

        let task = spawn_digest(session, job(query, None)).unwrap();
        let digest = task.wait(Deadline::after(Some(Duration::from_secs(10)))).unwrap();
        assert_eq!(digest, digest_rows(&rows()));
    }

    #[test]
    fn test_spawned_task_abandoned_at_deadline() {
        let mut session = ScriptedSession::new()
            .with_batch(rows())
            .with_fetch_delay(Duration::from_secs(2));
        session.submit_async("SELECT 1").unwrap();
        let session = Arc::new(Mutex::new(session));
        let query = Query::new("q7", "SELECT 1", QueryType::Select);

        let started = Instant::now();
        let task = spawn_digest(Arc::clone(&session), job(query, None)).unwrap();
        let err = task
            .wait(Deadline::after(Some(Duration::from_millis(100))))
            .unwrap_err();

        assert!(matches!(err, DigestError::DeadlineExceeded));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
