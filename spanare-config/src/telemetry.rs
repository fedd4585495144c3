//! Observability configuration: log verbosity and how often the status
//! snapshot is reported.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::validation;

/// Telemetry configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct TelemetryConfig {
    /// Default tracing level; `RUST_LOG` takes precedence when set.
    #[validate(custom(function = validation::validate_log_level))]
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Seconds between status snapshot log lines (0 disables them).
    #[validate(range(max = 86400))]
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".into()
}

fn default_status_interval() -> u64 {
    10
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            status_interval_secs: default_status_interval(),
        }
    }
}
