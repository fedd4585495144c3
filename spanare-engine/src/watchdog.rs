//! Supervisor thread.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use spanare_core::cancel::SLEEP_SLICE;
use tracing::{debug, info};

use crate::pool::WorkerPool;

pub(crate) const THREAD_NAME: &str = "spanare-watchdog";

/// Starts the watchdog. It runs one supervision pass per `interval` until
/// the pool's token is cancelled.
pub(crate) fn spawn(pool: Arc<WorkerPool>, interval: Duration) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(THREAD_NAME.into())
        .spawn(move || run(&pool, interval))
}

fn run(pool: &WorkerPool, interval: Duration) {
    info!(interval_ms = interval.as_millis() as u64, "Watchdog started");

    while pool.cancel_token().sleep(interval, SLEEP_SLICE) {
        let restarted = pool.supervise();
        debug!(restarted, active = pool.status().active_workers(), "Watchdog pass");
    }

    info!("Watchdog exiting");
}
