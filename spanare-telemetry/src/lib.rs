//! # Spanare Telemetry
//!
//! Logging setup and Prometheus export of the scanner status counters.

pub mod logging;
pub mod metrics;

pub use logging::EventLogger;
pub use metrics::MetricsRecorder;
