//! Where a worker's bytes come from.
//!
//! [`RecordSource`] is the seam between the poll loop and the transport. The
//! production implementation is [`HttpSource`], a blocking `reqwest` client
//! shared by every worker through [`HttpSourceFactory`].

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{redirect, tls, Certificate};
use spanare_config::ScannerConfig;
use thiserror::Error;
use tracing::debug;

/// Largest response body a worker will read.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub const MAX_REDIRECTS: usize = 5;

const USER_AGENT: &str = concat!("Spanare/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("CA bundle {}: {reason}", path.display())]
    CaBundle { path: PathBuf, reason: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("endpoint answered HTTP {0}")]
    Status(u16),

    #[error("response body larger than {0} bytes")]
    BodyTooLarge(usize),

    #[error("failed reading response body: {0}")]
    Body(#[from] std::io::Error),
}

/// A fetchable endpoint. Each call returns one complete response body.
pub trait RecordSource: Send {
    fn fetch(&mut self) -> Result<Vec<u8>, FetchError>;
}

/// Builds a fresh source for an endpoint; called at every spawn and respawn.
pub trait SourceFactory: Send + Sync {
    fn create(&self, endpoint: &str) -> Box<dyn RecordSource>;
}

impl<F> SourceFactory for F
where
    F: Fn(&str) -> Box<dyn RecordSource> + Send + Sync,
{
    fn create(&self, endpoint: &str) -> Box<dyn RecordSource> {
        self(endpoint)
    }
}

/// Hands out [`HttpSource`]s that share one connection pool.
#[derive(Clone, Debug)]
pub struct HttpSourceFactory {
    client: Client,
}

impl HttpSourceFactory {
    /// Builds the shared client from the scanner configuration.
    ///
    /// Certificates are always verified. TLS below 1.2 is refused, at most
    /// five redirects are followed and only to `https` targets.
    pub fn new(config: &ScannerConfig) -> Result<Self, FetchError> {
        let mut builder = Client::builder()
            .use_rustls_tls()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout())
            .min_tls_version(tls::Version::TLS_1_2)
            .redirect(redirect_policy());

        if let Some(path) = &config.ca_cert_path {
            for cert in load_ca_bundle(path)? {
                builder = builder.add_root_certificate(cert);
            }
        }

        let client = builder.build().map_err(FetchError::Client)?;
        Ok(Self { client })
    }
}

impl SourceFactory for HttpSourceFactory {
    fn create(&self, endpoint: &str) -> Box<dyn RecordSource> {
        Box::new(HttpSource::new(self.client.clone(), endpoint))
    }
}

fn redirect_policy() -> redirect::Policy {
    redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else if attempt.url().scheme() != "https" {
            attempt.error("refusing redirect to a non-https URL")
        } else {
            attempt.follow()
        }
    })
}

fn load_ca_bundle(path: &Path) -> Result<Vec<Certificate>, FetchError> {
    let ca_error = |reason: String| FetchError::CaBundle {
        path: path.to_path_buf(),
        reason,
    };

    let pem = std::fs::read(path).map_err(|e| ca_error(e.to_string()))?;
    let certs = Certificate::from_pem_bundle(&pem).map_err(|e| ca_error(e.to_string()))?;
    if certs.is_empty() {
        return Err(ca_error("no PEM certificates found".into()));
    }
    debug!(path = %path.display(), count = certs.len(), "Loaded CA bundle");
    Ok(certs)
}

/// One endpoint polled over HTTP(S).
#[derive(Debug)]
pub struct HttpSource {
    client: Client,
    url: String,
}

impl HttpSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

impl RecordSource for HttpSource {
    fn fetch(&mut self) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(&self.url).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let mut body = Vec::new();
        response
            .take(MAX_BODY_BYTES as u64 + 1)
            .read_to_end(&mut body)?;
        if body.len() > MAX_BODY_BYTES {
            return Err(FetchError::BodyTooLarge(MAX_BODY_BYTES));
        }
        Ok(body)
    }
}
