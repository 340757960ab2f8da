use crate::core::{CodecError, Retryable};
use crate::storage::StoreError;
use thiserror::Error;

/// Errors surfaced by the worker client.
///
/// Polling errors never stop the poll loop; they are logged and passed to the
/// error listener, if one is registered. Errors of reporting calls
/// (`complete`, `handle_failure`, ...) are returned to the handler.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// Network failure or timeout talking to the engine.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// The task is locked by someone else, or the lease already expired.
    #[error("lock conflict: {0}")]
    LockConflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The engine rejected the request as invalid.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The engine failed internally (5xx).
    #[error("engine error: {0}")]
    Engine(String),

    /// The engine's response could not be understood.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// An outgoing variable has no wire form.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A fetched task's variables could not be decoded; the task was skipped.
    #[error("skipping external task {task_id}: {source}")]
    Decode {
        task_id: String,
        #[source]
        source: CodecError,
    },

    /// A terminal call was made on a task this handle already resolved.
    #[error("external task {0} has already been resolved")]
    AlreadyResolved(String),

    /// A handler returned an error or panicked.
    #[error("handler for external task {task_id} failed: {message}")]
    Handler { task_id: String, message: String },

    #[error("invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// True for the benign races of the lease protocol: the task was taken by
    /// someone else, its lease ran out, or it no longer exists.
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, ClientError::LockConflict(_) | ClientError::NotFound(_))
    }
}

impl Retryable for ClientError {
    fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Connectivity(_) | ClientError::Engine(_))
    }
}

impl From<StoreError> for ClientError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::TaskNotFound(_) | StoreError::ProcessInstanceNotFound(_) => {
                ClientError::NotFound(error.to_string())
            }
            StoreError::LockConflict(_) | StoreError::LockExpired { .. } | StoreError::Suspended(_) => {
                ClientError::LockConflict(error.to_string())
            }
            StoreError::InvalidArgument(_) | StoreError::Codec { .. } => {
                ClientError::BadRequest(error.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_benign_conflicts() {
        let expired = ClientError::from(StoreError::LockExpired {
            id: "t".into(),
            worker_id: "w".into(),
        });
        assert!(expired.is_lock_conflict());
        assert!(!expired.is_retryable());

        let missing = ClientError::from(StoreError::TaskNotFound("t".into()));
        assert!(missing.is_lock_conflict());

        let invalid = ClientError::from(StoreError::InvalidArgument("workerId is null".into()));
        assert!(matches!(invalid, ClientError::BadRequest(m) if m == "workerId is null"));
    }

    #[test]
    fn test_transport_errors_are_retryable() {
        assert!(ClientError::Connectivity("refused".into()).is_retryable());
        assert!(ClientError::Engine("500".into()).is_retryable());
        assert!(!ClientError::Protocol("bad json".into()).is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_at_first_permanent_error() {
        use crate::core::{retry_with_policy, RetryPolicy};
        use std::sync::atomic::{AtomicU32, Ordering};

        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_policy(Some(RetryPolicy::STANDARD), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 1 {
                    Err(ClientError::Connectivity("connection refused".into()))
                } else {
                    Err(ClientError::Protocol("bad json".into()))
                }
            }
        })
        .await;
        assert!(matches!(result, Err(ClientError::Protocol(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
