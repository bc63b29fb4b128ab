use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence failures. Any of these surfaces to the caller as the item's
/// `DbFailure` state; the task list on disk is left untouched.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
