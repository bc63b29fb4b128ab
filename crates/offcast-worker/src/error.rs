use offcast_net::NetError;
use offcast_store::StoreError;
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Failures inside the download worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Net(#[from] NetError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a task failure escalates at the item level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Escalation {
    /// Retryable cause exhausted its budget; the item stays resumable.
    Interrupted,
    /// Terminal answer from the origin (HTTP 4xx, malformed content).
    Failed,
    /// The persistence layer failed; the task list is left untouched.
    DbFailure,
}

pub(crate) fn classify(error: &WorkerError) -> Escalation {
    match error {
        WorkerError::Store(_) => Escalation::DbFailure,
        // Local filesystem trouble is transient from the item's view.
        WorkerError::Io(_) => Escalation::Interrupted,
        WorkerError::Net(net) => classify_net(net),
    }
}

fn classify_net(error: &NetError) -> Escalation {
    match error {
        NetError::RetryExhausted { source, .. } => classify_net(source),
        NetError::HttpStatus { .. } if !error.is_retryable() => Escalation::Failed,
        _ => Escalation::Interrupted,
    }
}

#[cfg(test)]
mod tests {
    use url::Url;

    use super::*;

    fn url() -> Url {
        Url::parse("https://cdn.example.com/seg.ts").unwrap()
    }

    #[test]
    fn terminal_http_answers_fail() {
        let e = WorkerError::Net(NetError::HttpStatus {
            status: 404,
            url: url(),
        });
        assert_eq!(classify(&e), Escalation::Failed);
    }

    #[test]
    fn exhausted_retryable_interrupts() {
        let e = WorkerError::Net(NetError::RetryExhausted {
            attempts: 3,
            source: Box::new(NetError::HttpStatus {
                status: 503,
                url: url(),
            }),
        });
        assert_eq!(classify(&e), Escalation::Interrupted);
    }

    #[test]
    fn exhausted_terminal_fails() {
        let e = WorkerError::Net(NetError::RetryExhausted {
            attempts: 3,
            source: Box::new(NetError::HttpStatus {
                status: 403,
                url: url(),
            }),
        });
        assert_eq!(classify(&e), Escalation::Failed);
    }

    #[test]
    fn store_errors_escalate_to_db_failure() {
        let e = WorkerError::Store(StoreError::Io(std::io::Error::other("disk gone")));
        assert_eq!(classify(&e), Escalation::DbFailure);
    }

    #[test]
    fn timeouts_interrupt() {
        let e = WorkerError::Net(NetError::Timeout { url: url() });
        assert_eq!(classify(&e), Escalation::Interrupted);
    }
}
