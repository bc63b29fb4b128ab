use thiserror::Error;
use url::Url;

pub type NetResult<T> = Result<T, NetError>;

/// Errors surfaced by the fetch layer.
#[derive(Debug, Error, Clone)]
pub enum NetError {
    #[error("request timed out: {url}")]
    Timeout { url: Url },

    #[error("HTTP {status} for {url}")]
    HttpStatus { status: u16, url: Url },

    #[error("transport error for {url}: {message}")]
    Transport { url: Url, message: String },

    #[error("cancelled")]
    Cancelled,

    #[error("gave up after {attempts} attempts: {source}")]
    RetryExhausted { attempts: u32, source: Box<Self> },
}

impl NetError {
    /// Whether the worker may retry the request that produced this error.
    ///
    /// Timeouts and transport failures are transient by nature. For HTTP
    /// statuses, 5xx plus 408/429 are retryable; everything else in the 4xx
    /// range is a terminal answer from the origin.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::HttpStatus { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            Self::Cancelled | Self::RetryExhausted { .. } => false,
        }
    }

    /// HTTP status carried by this error, if any (unwraps retry exhaustion).
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::RetryExhausted { source, .. } => source.http_status(),
            _ => None,
        }
    }

    pub(crate) fn from_reqwest(url: &Url, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            return Self::Timeout { url: url.clone() };
        }
        // {:#} includes the source chain ("error sending request: connection refused").
        Self::Transport {
            url: url.clone(),
            message: format!("{error:#}"),
        }
    }
}
