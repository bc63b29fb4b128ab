use thiserror::Error;

pub type HlsResult<T> = Result<T, HlsError>;

/// Errors from playlist parsing, selection and planning.
#[derive(Debug, Error)]
pub enum HlsError {
    #[error("malformed playlist: {0}")]
    MalformedPlaylist(String),

    #[error("unknown playlist type: {0}")]
    UnknownPlaylistType(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("no playable variant: {0}")]
    NoPlayableVariant(String),
}
