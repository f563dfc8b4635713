//! Error types for store operations.

use thiserror::Error;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        entity: &'static str,
        id: String,
    },

    /// A uniqueness constraint rejected the write.
    ///
    /// For send records this is the at-most-once guarantee firing: the state
    /// the caller wanted to create already holds. Callers in the engine
    /// treat it as success-no-op, not as a failure.
    #[error("uniqueness constraint violated: {0}")]
    Duplicate(String),

    /// Internal error (lock poisoning, invariant breakage).
    #[error("internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("lock poisoned: {e}"))
    }
}
