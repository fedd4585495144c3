//! ## spanare-core::status
//! **Aggregate pipeline counters**
//!
//! Workers and the watchdog take the write side of a `RwLock` to bump
//! counters; readers take the read side and walk away with a
//! [`StatusSnapshot`] copy, so a reader never sees a half-applied update and
//! never holds a reference into live state.

use parking_lot::RwLock;
use serde::Serialize;

/// Point-in-time copy of the scanner counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Records successfully placed in the ring.
    pub packets_processed: u64,
    /// Transport-level request failures.
    pub requests_failed: u64,
    /// Rejected records, unparseable bodies and spawn failures.
    pub error_count: u64,
    /// Records dropped because the ring stayed full.
    pub buffer_full_count: u64,
    /// Records buffered at snapshot time.
    pub buffer_fill: u64,
    /// Worker threads currently running.
    pub active_workers: u64,
    /// Workers respawned by the watchdog.
    pub worker_restarts: u64,
}

#[derive(Debug, Default)]
struct Counters {
    packets_processed: u64,
    requests_failed: u64,
    error_count: u64,
    buffer_full_count: u64,
    active_workers: u64,
    worker_restarts: u64,
}

/// Shared, lock-guarded counter board.
#[derive(Debug, Default)]
pub struct StatusBoard {
    counters: RwLock<Counters>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_processed(&self) {
        self.counters.write().packets_processed += 1;
    }

    #[inline]
    pub fn record_request_failed(&self) {
        self.counters.write().requests_failed += 1;
    }

    #[inline]
    pub fn record_error(&self) {
        self.counters.write().error_count += 1;
    }

    #[inline]
    pub fn record_buffer_full(&self) {
        self.counters.write().buffer_full_count += 1;
    }

    pub fn worker_started(&self) {
        self.counters.write().active_workers += 1;
    }

    pub fn worker_stopped(&self) {
        let mut counters = self.counters.write();
        counters.active_workers = counters.active_workers.saturating_sub(1);
    }

    pub fn record_restart(&self) {
        self.counters.write().worker_restarts += 1;
    }

    pub fn active_workers(&self) -> u64 {
        self.counters.read().active_workers
    }

    /// Copies every counter under the read lock. `buffer_fill` is supplied
    /// by the caller, who owns the ring.
    pub fn snapshot(&self, buffer_fill: usize) -> StatusSnapshot {
        let c = self.counters.read();
        StatusSnapshot {
            packets_processed: c.packets_processed,
            requests_failed: c.requests_failed,
            error_count: c.error_count,
            buffer_full_count: c.buffer_full_count,
            buffer_fill: buffer_fill as u64,
            active_workers: c.active_workers,
            worker_restarts: c.worker_restarts,
        }
    }
}
