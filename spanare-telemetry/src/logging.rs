//! ## spanare-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! The subscriber is installed once by the binary; library crates only emit
//! events. Worker threads are named, so thread names are included in every
//! line.

use spanare_core::status::StatusSnapshot;
use tracing_subscriber::{fmt, EnvFilter};

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global subscriber. `RUST_LOG` wins over `level`.
    pub fn init(level: &str) -> Result<(), InitError> {
        fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
            )
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .try_init()
    }

    /// Emits one structured line carrying every status counter.
    pub fn log_status(snapshot: &StatusSnapshot) {
        tracing::info!(
            packets_processed = snapshot.packets_processed,
            requests_failed = snapshot.requests_failed,
            error_count = snapshot.error_count,
            buffer_full_count = snapshot.buffer_full_count,
            buffer_fill = snapshot.buffer_fill,
            active_workers = snapshot.active_workers,
            worker_restarts = snapshot.worker_restarts,
            "Scanner status"
        );
    }
}
