//! # Scanner
//!
//! The consumer-facing handle. A scanner is built from a validated
//! configuration, started once, drained with [`Scanner::pop`] and shut down
//! once; shutdown is idempotent and also runs on drop.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use spanare_config::ScannerConfig;
use spanare_core::cancel::CancelToken;
use spanare_core::record::ObservationRecord;
use spanare_core::ring::RingBuffer;
use spanare_core::status::{StatusBoard, StatusSnapshot};
use spanare_poller::{BackoffPolicy, HttpSourceFactory, SourceFactory, WorkerContext};
use tracing::{info, instrument, warn};

use crate::pool::{RestartPolicy, WorkerPool};
use crate::watchdog;
use crate::ScannerError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Ready,
    Running,
    Stopped,
}

/// Builder for a [`Scanner`] with a non-default transport or backoff.
pub struct ScannerBuilder {
    config: ScannerConfig,
    sources: Option<Arc<dyn SourceFactory>>,
    backoff: BackoffPolicy,
}

impl ScannerBuilder {
    /// Replaces the HTTPS transport.
    pub fn source_factory<F>(mut self, factory: F) -> Self
    where
        F: SourceFactory + 'static,
    {
        self.sources = Some(Arc::new(factory));
        self
    }

    pub fn backoff_policy(mut self, policy: BackoffPolicy) -> Self {
        self.backoff = policy;
        self
    }

    /// Validates the configuration and allocates the ring. Nothing is
    /// spawned until [`Scanner::start`].
    pub fn build(self) -> Result<Scanner, ScannerError> {
        let config = self.config;
        config.check()?;

        let sources = match self.sources {
            Some(sources) => sources,
            None => Arc::new(HttpSourceFactory::new(&config)?),
        };

        let capacity = config.ring_capacity()?;
        let ring = Arc::new(RingBuffer::with_capacity(capacity)?);
        if !ring.is_pinned() {
            warn!(capacity, "Ring buffer memory is not locked; it may be swapped out");
        }

        let pool = WorkerPool::new(
            &config.endpoints,
            ring,
            Arc::new(StatusBoard::new()),
            CancelToken::new(),
            sources,
            config.poll_interval(),
            self.backoff,
            RestartPolicy {
                base: config.watchdog_interval(),
                max: config.max_restart_delay(),
            },
        );

        Ok(Scanner {
            config,
            pool: Arc::new(pool),
            watchdog: Mutex::new(None),
            phase: Mutex::new(Phase::Ready),
        })
    }
}

/// Polls every configured endpoint and buffers what they report.
pub struct Scanner {
    config: ScannerConfig,
    pool: Arc<WorkerPool>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
    phase: Mutex<Phase>,
}

impl Scanner {
    /// Builds a scanner that polls over HTTPS.
    pub fn new(config: ScannerConfig) -> Result<Self, ScannerError> {
        Self::builder(config).build()
    }

    pub fn builder(config: ScannerConfig) -> ScannerBuilder {
        ScannerBuilder {
            config,
            sources: None,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Spawns one worker per endpoint and the watchdog.
    ///
    /// A worker that fails to spawn is left to the watchdog. Failing to
    /// spawn the watchdog itself stops everything and is returned.
    #[instrument(level = "info", name = "scanner_start", skip(self))]
    pub fn start(&self) -> Result<(), ScannerError> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Ready => {}
            Phase::Running => return Err(ScannerError::AlreadyStarted),
            Phase::Stopped => return Err(ScannerError::ShutDown),
        }

        info!(
            endpoints = self.config.endpoints.len(),
            capacity = self.pool.ring().capacity(),
            poll_interval_ms = self.config.poll_interval().as_millis() as u64,
            "Starting scanner"
        );
        self.pool.start_all();

        match watchdog::spawn(Arc::clone(&self.pool), self.config.watchdog_interval()) {
            Ok(handle) => {
                *self.watchdog.lock() = Some(handle);
                *phase = Phase::Running;
                Ok(())
            }
            Err(e) => {
                *phase = Phase::Stopped;
                self.teardown();
                Err(ScannerError::Spawn(e))
            }
        }
    }

    /// Next record, waiting up to `timeout_ms`. Zero or negative never waits.
    pub fn pop(&self, timeout_ms: i64) -> Option<ObservationRecord> {
        let timeout = Duration::from_millis(timeout_ms.max(0) as u64);
        self.pool.ring().pop(timeout)
    }

    pub fn try_pop(&self) -> Option<ObservationRecord> {
        self.pool.ring().try_pop()
    }

    /// Counter snapshot with the live ring fill level.
    pub fn status(&self) -> StatusSnapshot {
        self.pool.status().snapshot(self.pool.ring().len())
    }

    /// Stops and joins every thread, then leaves the ring closed. Items
    /// already buffered can still be popped. Later calls do nothing.
    #[instrument(level = "info", name = "scanner_shutdown", skip(self))]
    pub fn shutdown(&self) {
        let mut phase = self.phase.lock();
        if *phase == Phase::Stopped {
            return;
        }
        *phase = Phase::Stopped;

        info!("Shutting down scanner");
        self.teardown();
        let status = self.status();
        info!(
            packets_processed = status.packets_processed,
            requests_failed = status.requests_failed,
            errors = status.error_count,
            buffer_full = status.buffer_full_count,
            remaining = status.buffer_fill,
            "Scanner stopped"
        );
    }

    fn teardown(&self) {
        self.pool.cancel_token().cancel();
        // Wakes pushers blocked on a full ring.
        self.pool.ring().close();

        if let Some(handle) = self.watchdog.lock().take() {
            if handle.join().is_err() {
                warn!("Watchdog thread panicked");
            }
        }
        self.pool.join_all();
    }

    pub fn is_running(&self) -> bool {
        *self.phase.lock() == Phase::Running
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Ring size in slots.
    pub fn ring_capacity(&self) -> usize {
        self.pool.ring().capacity()
    }

    /// Current worker incarnations, in endpoint order.
    pub fn workers(&self) -> Vec<Arc<WorkerContext>> {
        self.pool.contexts()
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
