use spanare_config::ConfigError;
use spanare_core::ring::RingError;
use spanare_poller::FetchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ring buffer error: {0}")]
    Ring(#[from] RingError),

    #[error("HTTP client error: {0}")]
    Transport(FetchError),

    #[error("Failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Scanner already started")]
    AlreadyStarted,

    #[error("Scanner has been shut down")]
    ShutDown,
}

impl From<FetchError> for ScannerError {
    /// A CA bundle that cannot be used is a configuration problem.
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::CaBundle { path, reason } => {
                ScannerError::Config(ConfigError::InvalidCaBundle { path, reason })
            }
            other => ScannerError::Transport(other),
        }
    }
}
