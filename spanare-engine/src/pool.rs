//! The worker table.
//!
//! One slot per configured endpoint, in configuration order. A slot keeps
//! its endpoint for life; the worker behind it may be replaced any number of
//! times. All structural changes go through the table mutex, which is never
//! held across a network call.

use std::any::Any;
use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use spanare_core::cancel::CancelToken;
use spanare_core::record::ObservationRecord;
use spanare_core::ring::RingBuffer;
use spanare_core::status::StatusBoard;
use spanare_poller::{BackoffPolicy, PollWorker, SourceFactory, WorkerContext};
use tracing::{debug, error, info, warn};

/// Pacing of watchdog restarts for a worker that keeps dying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Delay before the second consecutive restart; doubles after that.
    pub base: Duration,
    pub max: Duration,
}

impl RestartPolicy {
    /// Minimum wait after the `n`th consecutive restart before the next one.
    pub fn delay_after(&self, n: u32) -> Duration {
        if n == 0 {
            return Duration::ZERO;
        }
        self.base
            .saturating_mul(2u32.saturating_pow(n - 1))
            .min(self.max)
    }
}

struct WorkerSlot {
    endpoint: String,
    ctx: Option<Arc<WorkerContext>>,
    handle: Option<JoinHandle<()>>,
    /// Restarts since this slot's worker last completed a cycle.
    restarts: u32,
    not_before: Option<Instant>,
}

impl WorkerSlot {
    fn new(endpoint: String) -> Self {
        Self {
            endpoint,
            ctx: None,
            handle: None,
            restarts: 0,
            not_before: None,
        }
    }

    fn is_running(&self) -> bool {
        let alive = self.ctx.as_ref().is_some_and(|ctx| ctx.is_alive());
        let finished = self.handle.as_ref().map_or(true, JoinHandle::is_finished);
        alive && !finished
    }

    /// Joins a finished (or finishing) thread and logs a panic payload.
    fn reap(&mut self, index: usize) {
        if let Some(handle) = self.handle.take() {
            if let Err(payload) = handle.join() {
                error!(
                    index,
                    endpoint = %self.endpoint,
                    panic = panic_message(&*payload),
                    "Poll worker panicked"
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

/// Workers and everything they share.
pub struct WorkerPool {
    ring: Arc<RingBuffer<ObservationRecord>>,
    status: Arc<StatusBoard>,
    cancel: CancelToken,
    sources: Arc<dyn SourceFactory>,
    poll_interval: Duration,
    backoff: BackoffPolicy,
    restart: RestartPolicy,
    slots: Mutex<Vec<WorkerSlot>>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endpoints: &[String],
        ring: Arc<RingBuffer<ObservationRecord>>,
        status: Arc<StatusBoard>,
        cancel: CancelToken,
        sources: Arc<dyn SourceFactory>,
        poll_interval: Duration,
        backoff: BackoffPolicy,
        restart: RestartPolicy,
    ) -> Self {
        Self {
            ring,
            status,
            cancel,
            sources,
            poll_interval,
            backoff,
            restart,
            slots: Mutex::new(endpoints.iter().cloned().map(WorkerSlot::new).collect()),
        }
    }

    pub fn ring(&self) -> &Arc<RingBuffer<ObservationRecord>> {
        &self.ring
    }

    pub fn status(&self) -> &Arc<StatusBoard> {
        &self.status
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Contexts of the current worker incarnations, in endpoint order.
    pub fn contexts(&self) -> Vec<Arc<WorkerContext>> {
        self.slots
            .lock()
            .iter()
            .filter_map(|slot| slot.ctx.clone())
            .collect()
    }

    fn spawn_worker(
        &self,
        index: usize,
        endpoint: &str,
    ) -> io::Result<(Arc<WorkerContext>, JoinHandle<()>)> {
        let ctx = WorkerContext::new(index, endpoint);
        let handle = PollWorker::new(
            Arc::clone(&ctx),
            self.sources.create(endpoint),
            Arc::clone(&self.ring),
            Arc::clone(&self.status),
            self.cancel.clone(),
        )
        .with_poll_interval(self.poll_interval)
        .with_policy(self.backoff)
        .spawn()?;
        Ok((ctx, handle))
    }

    /// Spawns the first worker for every slot. Failures are logged and
    /// counted; the watchdog retries those slots on its next tick.
    pub fn start_all(&self) {
        let mut slots = self.slots.lock();
        for (index, slot) in slots.iter_mut().enumerate() {
            match self.spawn_worker(index, &slot.endpoint) {
                Ok((ctx, handle)) => {
                    slot.ctx = Some(ctx);
                    slot.handle = Some(handle);
                }
                Err(e) => {
                    self.status.record_error();
                    error!(index, endpoint = %slot.endpoint, error = %e, "Failed to spawn poll worker");
                }
            }
        }
    }

    /// One watchdog pass: replaces every dead worker whose restart delay
    /// has passed. Returns how many workers were started.
    pub fn supervise(&self) -> usize {
        let mut restarted = 0;
        let mut slots = self.slots.lock();

        for (index, slot) in slots.iter_mut().enumerate() {
            if self.cancel.is_cancelled() {
                break;
            }
            if slot.is_running() {
                continue;
            }

            if slot.ctx.as_ref().is_some_and(|ctx| ctx.has_succeeded()) {
                slot.restarts = 0;
                slot.not_before = None;
            }
            let now = Instant::now();
            if slot.not_before.is_some_and(|at| now < at) {
                debug!(index, restarts = slot.restarts, "Restart deferred");
                continue;
            }

            slot.reap(index);
            match self.spawn_worker(index, &slot.endpoint) {
                Ok((ctx, handle)) => {
                    slot.ctx = Some(ctx);
                    slot.handle = Some(handle);
                    slot.restarts = slot.restarts.saturating_add(1);
                    slot.not_before = Some(now + self.restart.delay_after(slot.restarts));
                    self.status.record_restart();
                    restarted += 1;
                    warn!(index, endpoint = %slot.endpoint, restarts = slot.restarts, "Worker restarted");
                }
                Err(e) => {
                    self.status.record_error();
                    error!(index, endpoint = %slot.endpoint, error = %e, "Failed to respawn poll worker");
                }
            }
        }

        restarted
    }

    /// Joins every worker. Callers cancel the token first.
    pub fn join_all(&self) {
        let mut slots = self.slots.lock();
        for (index, slot) in slots.iter_mut().enumerate() {
            slot.reap(index);
        }
        info!(workers = slots.len(), "Poll workers joined");
    }
}
