//! The poll loop.
//!
//! A worker runs on its own named thread and owns its source, its backoff
//! and its error streak. What the rest of the system may observe about it
//! lives in a shared [`WorkerContext`]; a liveness guard moved into the
//! thread clears the context's alive flag and the active-worker count on
//! every exit path, unwinding included.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use spanare_core::cancel::CancelToken;
use spanare_core::record::ObservationRecord;
use spanare_core::ring::{RingBuffer, RingError};
use spanare_core::status::StatusBoard;
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::decode::{decode_body, DecodeError};
use crate::source::RecordSource;

/// How long a push waits for ring space before the record is dropped.
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Starting = 0,
    Polling = 1,
    Backoff = 2,
    Terminated = 3,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Starting,
            1 => Self::Polling,
            2 => Self::Backoff,
            _ => Self::Terminated,
        }
    }
}

/// Observable state of one worker incarnation.
#[derive(Debug)]
pub struct WorkerContext {
    index: usize,
    endpoint: String,
    alive: AtomicBool,
    state: AtomicU8,
    consecutive_errors: AtomicU32,
    backoff_ms: AtomicU64,
    last_success: Mutex<Option<Instant>>,
}

impl WorkerContext {
    pub fn new(index: usize, endpoint: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            index,
            endpoint: endpoint.into(),
            alive: AtomicBool::new(false),
            state: AtomicU8::new(WorkerState::Starting as u8),
            consecutive_errors: AtomicU32::new(0),
            backoff_ms: AtomicU64::new(0),
            last_success: Mutex::new(None),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    pub fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Relaxed)
    }

    /// Current backoff delay.
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms.load(Ordering::Relaxed))
    }

    pub fn last_success(&self) -> Option<Instant> {
        *self.last_success.lock()
    }

    /// Whether this incarnation ever got a response from its endpoint.
    pub fn has_succeeded(&self) -> bool {
        self.last_success.lock().is_some()
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Marks a worker live on creation and dead on drop.
///
/// Created before the thread is spawned and moved into it, so a failed
/// spawn releases the count just like a finished thread does.
struct LivenessGuard {
    ctx: Arc<WorkerContext>,
    status: Arc<StatusBoard>,
}

impl LivenessGuard {
    fn engage(ctx: Arc<WorkerContext>, status: Arc<StatusBoard>) -> Self {
        ctx.alive.store(true, Ordering::Release);
        status.worker_started();
        Self { ctx, status }
    }
}

impl Drop for LivenessGuard {
    fn drop(&mut self) {
        self.ctx.set_state(WorkerState::Terminated);
        self.ctx.alive.store(false, Ordering::Release);
        self.status.worker_stopped();
    }
}


/// Everything one worker thread needs.
pub struct PollWorker {
    ctx: Arc<WorkerContext>,
    source: Box<dyn RecordSource>,
    ring: Arc<RingBuffer<ObservationRecord>>,
    status: Arc<StatusBoard>,
    cancel: CancelToken,
    poll_interval: Duration,
    policy: BackoffPolicy,
}

impl PollWorker {
    pub fn new(
        ctx: Arc<WorkerContext>,
        source: Box<dyn RecordSource>,
        ring: Arc<RingBuffer<ObservationRecord>>,
        status: Arc<StatusBoard>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            ctx,
            source,
            ring,
            status,
            cancel,
            poll_interval: Duration::from_millis(spanare_config::DEFAULT_POLL_INTERVAL_MS),
            policy: BackoffPolicy::default(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn context(&self) -> &Arc<WorkerContext> {
        &self.ctx
    }

    /// Starts the worker on a thread named `spanare-poll-<index>`.
    ///
    /// The active-worker count is raised before spawning; if the spawn
    /// fails it is lowered again and the error returned.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        let guard = LivenessGuard::engage(Arc::clone(&self.ctx), Arc::clone(&self.status));
        thread::Builder::new()
            .name(format!("spanare-poll-{}", self.ctx.index))
            .spawn(move || {
                let _guard = guard;
                self.run();
            })
    }

    /// Runs the loop on the current thread until cancelled or evicted.
    pub fn run(mut self) {
        let ctx = Arc::clone(&self.ctx);
        let policy = self.policy;
        let started = Instant::now();
        let mut backoff = policy.for_interval(self.poll_interval);
        let mut errors: u32 = 0;

        ctx.backoff_ms
            .store(backoff.current().as_millis() as u64, Ordering::Relaxed);
        info!(index = ctx.index, endpoint = %ctx.endpoint, "Poll worker started");

        while !self.cancel.is_cancelled() {
            ctx.set_state(WorkerState::Polling);

            match self.source.fetch() {
                Ok(body) => {
                    // Transport success clears the streak before the body is looked at.
                    if errors > 0 {
                        info!(index = ctx.index, errors, "Endpoint recovered");
                    }
                    errors = 0;
                    backoff.reset();
                    *ctx.last_success.lock() = Some(Instant::now());

                    match self.enqueue(&body) {
                        Ok(stored) => debug!(index = ctx.index, stored, "Poll cycle complete"),
                        Err(e) => {
                            errors = 1;
                            warn!(index = ctx.index, endpoint = %ctx.endpoint, error = %e, "Unparseable response");
                        }
                    }
                }
                Err(e) => {
                    self.status.record_request_failed();
                    errors = errors.saturating_add(1);
                    warn!(index = ctx.index, endpoint = %ctx.endpoint, errors, error = %e, "Poll cycle failed");
                }
            }
            ctx.consecutive_errors.store(errors, Ordering::Relaxed);
            ctx.backoff_ms
                .store(backoff.current().as_millis() as u64, Ordering::Relaxed);

            if errors > policy.backoff_after {
                let delay = backoff.advance();
                ctx.backoff_ms
                    .store(delay.as_millis() as u64, Ordering::Relaxed);
                ctx.set_state(WorkerState::Backoff);
                debug!(index = ctx.index, backoff_ms = delay.as_millis() as u64, "Backing off");

                if !self.cancel.sleep(delay, policy.slice) {
                    break;
                }

                let quiet_for = ctx.last_success().unwrap_or(started).elapsed();
                if errors > policy.evict_after && quiet_for > policy.stale_window {
                    warn!(
                        index = ctx.index,
                        endpoint = %ctx.endpoint,
                        errors,
                        quiet_secs = quiet_for.as_secs(),
                        "Worker giving up; watchdog will restart it"
                    );
                    break;
                }
                continue;
            }

            if !self.cancel.sleep(self.poll_interval, policy.slice) {
                break;
            }
        }

        info!(index = ctx.index, "Poll worker exiting");
    }

    /// Decodes a response body and pushes its records. Returns the number
    /// of records stored.
    fn enqueue(&mut self, body: &[u8]) -> Result<usize, DecodeError> {
        let decoded = decode_body(body).inspect_err(|_| {
            self.status.record_error();
        })?;

        let mut stored = 0;
        for item in decoded {
            if self.cancel.is_cancelled() {
                break;
            }
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    self.status.record_error();
                    debug!(index = self.ctx.index, error = %e, "Rejected record");
                    continue;
                }
            };
            match self.ring.push(record, PUSH_TIMEOUT) {
                Ok(()) => {
                    self.status.record_processed();
                    stored += 1;
                }
                Err(RingError::Full) => {
                    self.status.record_buffer_full();
                    debug!(index = self.ctx.index, "Ring full, record dropped");
                }
                Err(_) => break,
            }
        }
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FetchError;
    use tracing_test::traced_test;

    /// Fails once, then stops the worker that owns it.
    struct FailThenCancel(CancelToken);

    impl RecordSource for FailThenCancel {
        fn fetch(&mut self) -> Result<Vec<u8>, FetchError> {
            self.0.cancel();
            Err(FetchError::Status(503))
        }
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            WorkerState::Starting,
            WorkerState::Polling,
            WorkerState::Backoff,
            WorkerState::Terminated,
        ] {
            assert_eq!(WorkerState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn guard_tracks_liveness() {
        let ctx = WorkerContext::new(0, "https://a.example");
        let status = Arc::new(StatusBoard::new());
        assert!(!ctx.is_alive());

        let guard = LivenessGuard::engage(Arc::clone(&ctx), Arc::clone(&status));
        assert!(ctx.is_alive());
        assert_eq!(status.active_workers(), 1);

        drop(guard);
        assert!(!ctx.is_alive());
        assert_eq!(ctx.state(), WorkerState::Terminated);
        assert_eq!(status.active_workers(), 0);
    }

    #[test]
    #[traced_test]
    fn failed_cycle_is_logged_and_counted() {
        let cancel = CancelToken::new();
        let ring = Arc::new(RingBuffer::with_capacity(8).unwrap());
        let status = Arc::new(StatusBoard::new());
        let ctx = WorkerContext::new(3, "https://down.example");

        PollWorker::new(
            Arc::clone(&ctx),
            Box::new(FailThenCancel(cancel.clone())),
            ring,
            Arc::clone(&status),
            cancel,
        )
        .run();

        assert_eq!(ctx.consecutive_errors(), 1);
        assert_eq!(status.snapshot(0).requests_failed, 1);
        assert!(logs_contain("Poll cycle failed"));
        assert!(logs_contain("HTTP 503"));
        assert!(logs_contain("Poll worker exiting"));
    }
}
