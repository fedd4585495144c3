//! Scanner configuration: which endpoints to poll, how often, and how much
//! memory the ring may use.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use spanare_core::record::ObservationRecord;
use validator::Validate;

use crate::validation;
use crate::ConfigError;

pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Smallest ring the scanner will build, in records.
pub const MIN_RING_RECORDS: usize = 64;
const DEFAULT_RING_RECORDS: usize = 1 << 12;

/// Bytes one ring slot accounts for when converting a byte budget.
pub const RECORD_SIZE: usize = std::mem::size_of::<ObservationRecord>();

/// Scanner configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ScannerConfig {
    /// Endpoints to poll, one worker each, in order.
    #[validate(length(min = 1, message = "at least one endpoint URL is required"))]
    #[validate(custom(function = validation::validate_endpoints))]
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Delay between successful polls. Clamped to `[100, 60000]`.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Ring memory budget in bytes; accepts sizes like `"4MiB"`.
    #[validate(range(min = 1, max = 1073741824))]
    #[serde(default = "default_buffer_bytes", deserialize_with = "deserialize_size")]
    pub buffer_bytes: usize,

    /// Extra PEM bundle trusted in addition to the system roots.
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,

    /// Total time allowed for one request, connect included.
    #[validate(range(min = 100, max = 120000))]
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// How often the watchdog looks for dead workers.
    #[validate(range(min = 10, max = 3600000))]
    #[serde(default = "default_watchdog_interval")]
    pub watchdog_interval_ms: u64,

    /// Upper bound on the delay between restarts of a worker that keeps dying.
    #[validate(range(min = 10, max = 86400000))]
    #[serde(default = "default_max_restart_delay")]
    pub max_restart_delay_ms: u64,
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_buffer_bytes() -> usize {
    DEFAULT_RING_RECORDS * RECORD_SIZE
}

fn default_request_timeout() -> u64 {
    10_000
}

fn default_watchdog_interval() -> u64 {
    30_000
}

fn default_max_restart_delay() -> u64 {
    300_000
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            poll_interval_ms: default_poll_interval(),
            buffer_bytes: default_buffer_bytes(),
            ca_cert_path: None,
            request_timeout_ms: default_request_timeout(),
            watchdog_interval_ms: default_watchdog_interval(),
            max_restart_delay_ms: default_max_restart_delay(),
        }
    }
}

impl ScannerConfig {
    pub fn with_endpoints<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Poll interval after clamping; zero selects the default.
    pub fn poll_interval(&self) -> Duration {
        let ms = match self.poll_interval_ms {
            0 => DEFAULT_POLL_INTERVAL_MS,
            ms => ms.clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        };
        Duration::from_millis(ms)
    }

    /// Ring size in records: the byte budget divided by the record size,
    /// raised to at least 64. The result must be a power of two.
    pub fn ring_capacity(&self) -> Result<usize, ConfigError> {
        let records = (self.buffer_bytes / RECORD_SIZE).max(MIN_RING_RECORDS);
        if records.is_power_of_two() {
            Ok(records)
        } else {
            Err(ConfigError::RingCapacity {
                bytes: self.buffer_bytes,
                records,
            })
        }
    }

    /// The CA path, if given, must name an existing regular file.
    pub fn validate_ca_cert(&self) -> Result<(), ConfigError> {
        match &self.ca_cert_path {
            Some(path) => match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => Ok(()),
                _ => Err(ConfigError::CaCertificate(path.clone())),
            },
            None => Ok(()),
        }
    }

    /// Field rules plus the derived checks that need the filesystem or
    /// arithmetic.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;
        self.ring_capacity()?;
        self.validate_ca_cert()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn max_restart_delay(&self) -> Duration {
        Duration::from_millis(self.max_restart_delay_ms)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Num(usize),
    Str(String),
}

/// Custom deserializer to allow human‑friendly sizes (e.g. "1MiB") or direct numbers.
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Num(n) => Ok(n),
        SizeValue::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num_part, unit_part) = s.split_at(split);

    let number: f64 = num_part
        .parse()
        .map_err(|e| format!("invalid size '{s}': {e}"))?;
    let multiplier = match unit_part.trim().to_lowercase().as_str() {
        "" | "b" => 1.0,
        "kb" | "kib" => 1024.0,
        "mb" | "mib" => 1024.0 * 1024.0,
        "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        other => return Err(format!("unknown size unit '{other}'")),
    };
    Ok((number * multiplier) as usize)
}
