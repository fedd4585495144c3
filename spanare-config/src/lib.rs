//! # Spanare Configuration System
//!
//! Layered configuration for the ingestion pipeline.
//!
//! ## Features
//! - **Layering**: defaults, then YAML, then `SPANARE_*` environment variables
//! - **Validation**: field rules via `validator` plus derived checks (ring
//!   capacity, CA bundle path) before anything is constructed
//! - **Overrides**: callers can merge extra providers (e.g. CLI flags) before
//!   extraction

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod error;
mod scanner;
mod telemetry;
mod validation;

pub use error::ConfigError;
pub use scanner::{
    ScannerConfig, DEFAULT_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS, MIN_POLL_INTERVAL_MS,
    MIN_RING_RECORDS, RECORD_SIZE,
};
pub use telemetry::TelemetryConfig;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/spanare.yaml";

/// Top‑level configuration container.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct SpanareConfig {
    /// Endpoints, polling cadence and ring sizing.
    #[validate(nested)]
    #[serde(default)]
    pub scanner: ScannerConfig,

    /// Logging and status reporting.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl SpanareConfig {
    /// Builds the provider stack without extracting it.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `path`, or `config/spanare.yaml` when `path` is `None` (skipped if missing)
    /// 3. `config/<SPANARE_ENV>.yaml` when `SPANARE_ENV` is set
    /// 4. `SPANARE_*` environment variables, `__` separating nested keys
    pub fn figment(path: Option<&Path>) -> Result<Figment, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(SpanareConfig::default()));

        match path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            Some(path) => figment = figment.merge(Yaml::file(path)),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                figment = figment.merge(Yaml::file(DEFAULT_CONFIG_PATH));
            }
            None => {}
        }

        if let Ok(env) = std::env::var("SPANARE_ENV") {
            let env_file = PathBuf::from(format!("config/{}.yaml", env));
            if env_file.exists() {
                figment = figment.merge(Yaml::file(env_file));
            }
        }

        Ok(figment.merge(Env::prefixed("SPANARE_").split("__")))
    }

    /// Extracts and fully validates a configuration.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        config.scanner.ring_capacity()?;
        config.scanner.validate_ca_cert()?;
        Ok(config)
    }

    /// Load configuration from default files and environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(None)?)
    }

    /// Load configuration from a specific path.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(Some(path.as_ref()))?)
    }
}
