use crate::core::CodecError;
use thiserror::Error;

/// Error type of the lock lease store.
///
/// Messages follow the engine's wording; they are returned verbatim to HTTP
/// clients.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// No external task with this id exists (any more).
    #[error("Cannot find external task with id {0}")]
    TaskNotFound(String),

    #[error("Cannot find process instance with id {0}")]
    ProcessInstanceNotFound(String),

    /// The task is locked by a different worker, or not locked at all.
    #[error("{0}")]
    LockConflict(String),

    /// The reporting worker held the lock, but the lease ran out.
    #[error("Lock of external task {id} held by worker '{worker_id}' has expired")]
    LockExpired { id: String, worker_id: String },

    #[error("ExternalTask with id '{0}' is suspended")]
    Suspended(String),

    /// A request argument failed validation.
    #[error("{0}")]
    InvalidArgument(String),

    /// A variable in the request has no valid wire form.
    #[error("invalid variable '{name}': {source}")]
    Codec {
        name: String,
        #[source]
        source: CodecError,
    },
}

impl StoreError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        StoreError::InvalidArgument(message.into())
    }

    /// Stable discriminator used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            StoreError::TaskNotFound(_) | StoreError::ProcessInstanceNotFound(_) => "NotFound",
            StoreError::LockConflict(_) => "LockConflict",
            StoreError::LockExpired { .. } => "LockExpired",
            StoreError::Suspended(_) => "Suspended",
            StoreError::InvalidArgument(_) => "InvalidArgument",
            StoreError::Codec { .. } => "Codec",
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
