use offcast_core::ItemState;
use offcast_hls::HlsError;
use offcast_net::NetError;
use offcast_store::StoreError;
use thiserror::Error;
use url::Url;

pub type OffcastResult<T> = Result<T, OffcastError>;

/// Errors surfaced at the public API.
#[derive(Debug, Error)]
pub enum OffcastError {
    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("{operation} not allowed while item is {state}")]
    InvalidState {
        operation: &'static str,
        state: ItemState,
    },

    #[error("network timeout: {url}")]
    NetworkTimeout { url: Url },

    #[error("malformed playlist: {0}")]
    MalformedPlaylist(String),

    #[error("unknown playlist type: {0}")]
    UnknownPlaylistType(String),

    #[error("invalid internal state: {0}")]
    InvalidInternalState(String),

    #[error("HTTP failure (status {status:?}): {cause}")]
    HttpFailure { status: Option<u16>, cause: String },

    #[error("persistence failure: {0}")]
    DbFailure(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<NetError> for OffcastError {
    fn from(error: NetError) -> Self {
        match error {
            NetError::Timeout { url } => OffcastError::NetworkTimeout { url },
            NetError::HttpStatus { status, .. } => OffcastError::HttpFailure {
                status: Some(status),
                cause: "unexpected HTTP status".into(),
            },
            other => OffcastError::HttpFailure {
                status: other.http_status(),
                cause: other.to_string(),
            },
        }
    }
}

impl From<HlsError> for OffcastError {
    fn from(error: HlsError) -> Self {
        match error {
            HlsError::UnknownPlaylistType(message) => OffcastError::UnknownPlaylistType(message),
            HlsError::MalformedPlaylist(message)
            | HlsError::InvalidUrl(message)
            | HlsError::NoPlayableVariant(message) => OffcastError::MalformedPlaylist(message),
        }
    }
}
