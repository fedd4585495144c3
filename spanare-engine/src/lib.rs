//! ## spanare-engine
//! **Scanner lifecycle and supervision**
//!
//! Owns the ring, the worker pool and the watchdog, and exposes the
//! consumer-facing API: construct, start, pop, status, shutdown.
//!
//! ```no_run
//! use spanare_config::ScannerConfig;
//! use spanare_engine::Scanner;
//!
//! let config = ScannerConfig::with_endpoints(["https://collector.local/macs"]);
//! let scanner = Scanner::new(config)?;
//! scanner.start()?;
//! while let Some(record) = scanner.pop(1_000) {
//!     println!("{} -> {}", record.src_mac, record.dst_mac);
//! }
//! scanner.shutdown();
//! # Ok::<(), spanare_engine::ScannerError>(())
//! ```

pub mod error;
pub mod pool;
pub mod scanner;
mod watchdog;

pub use error::ScannerError;
pub use pool::RestartPolicy;
pub use scanner::{Scanner, ScannerBuilder};

/// Semantic version of the scanner library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
