use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to initialise logging: {0}")]
    Logging(String),

    #[error("Failed to install the Ctrl-C handler: {0}")]
    Signal(#[source] std::io::Error),
}
