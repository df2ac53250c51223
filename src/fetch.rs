//! HTTP retrieval of remote content.
//!
//! Provides a trait-based abstraction over the transport so that the lock and
//! download phases can be driven by an in-memory stub in tests. The production
//! implementation uses a shared `ureq` agent with a fixed per-request timeout
//! and no retry.

use std::io::Read;
use std::sync::OnceLock;
use std::time::Duration;

/// Per-request timeout for remote fetches.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// A readable response body.
pub type Body = Box<dyn Read + Send>;

/// Trait for opening a byte stream for a URL.
///
/// Implementations must be shareable across worker threads.
///
/// # Examples
///
/// ```
/// use pinfetch::fetch::HttpFetcher;
///
/// let fetcher = HttpFetcher::default();
/// // fetcher.open("https://example.com/tool.tar.gz") in production
/// # let _ = fetcher;
/// ```
#[cfg_attr(test, mockall::automock)]
pub trait Fetcher: Send + Sync {
    /// Opens the body of `url` for reading.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the request fails, times out or
    /// answers with a non-success status.
    fn open(&self, url: &str) -> Result<Body, TransportError>;
}

/// Errors arising from remote retrieval.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server answered with a non-success status.
    #[error("HTTP status {status} for {url}")]
    Status {
        /// The requested URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The request could not be completed.
    #[error("request failed for {url}: {reason}")]
    Request {
        /// The requested URL.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The body stream failed part way through.
    #[error("failed reading response body from {url}: {source}")]
    Body {
        /// The requested URL.
        url: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// HTTP fetcher backed by `ureq`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpFetcher;

impl Fetcher for HttpFetcher {
    fn open(&self, url: &str) -> Result<Body, TransportError> {
        let response = http_agent()
            .get(url)
            .call()
            .map_err(|err| map_ureq_error(url, &err))?;
        Ok(Box::new(response.into_body().into_reader()))
    }
}

/// Shared `ureq` agent with request timeout configuration.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(FETCH_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Map a ureq error to a [`TransportError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> TransportError {
    match err {
        ureq::Error::StatusCode(status) => TransportError::Status {
            url: url.to_owned(),
            status: *status,
        },
        other => TransportError::Request {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
