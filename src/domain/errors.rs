//! Domain errors for the launch merge engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur while merging launches.
///
/// Every merge failure is terminal for the call that produced it. The engine
/// never retries internally; callers decide whether to retry with adjusted
/// inputs.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The requested merge strategy has no registered implementation.
    #[error("Unknown merge strategy: {0}")]
    UnknownStrategy(String),

    /// A source or target launch does not exist.
    #[error("Launch not found: {0}")]
    LaunchNotFound(Uuid),

    /// Fewer than two comparable source trees were supplied.
    #[error("Nothing to merge: {0}")]
    NothingToMerge(String),

    /// Applying the merged tree failed; nothing was persisted.
    #[error("Merge commit failed: {0}")]
    MergeCommit(String),

    /// The request is well-formed but violates a merge precondition.
    #[error("Invalid merge request: {0}")]
    InvalidMergeRequest(String),

    /// Input failed structural validation, such as an import document without leaf statuses.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The storage backend reported an error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored or supplied value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result alias used across the domain and service layers.
pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// Wrap any failure raised while applying a merge into [`DomainError::MergeCommit`].
    ///
    /// Errors that already are commit errors pass through unchanged.
    pub fn into_commit_error(self) -> Self {
        match self {
            Self::MergeCommit(_) => self,
            other => Self::MergeCommit(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
