//! Typed error handling for engine operations.
//!
//! Request-level errors (`NotFound`, `InvalidState`, `NoEligibleRecipients`)
//! abort before any send attempt. Per-recipient transport failures are
//! never represented here — they are recorded as bounced send records and
//! the batch continues. A `Duplicate` rejection from the store is likewise
//! consumed where it is detected (it means the desired at-most-once state
//! already holds) and only reaches this type wrapped in [`EngineError::Store`]
//! if a component failed to handle it, which is a bug.

use courier_store::StoreError;
use thiserror::Error;

/// Top-level engine error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The referenced campaign/sequence/enrollment/recipient is unknown.
    /// Fails the request, no side effect.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The operation is not legal in the entity's current state (sending an
    /// already-sent campaign, advancing a stopped enrollment, enrolling a
    /// recipient without an address). Fails the request, no side effect.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The entire candidate set was empty or suppressed. The campaign stays
    /// in draft.
    #[error("no eligible recipients")]
    NoEligibleRecipients,

    /// The storage collaborator failed.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl EngineError {
    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Returns `true` if the request failed because an entity was unknown.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the request was rejected by a state precondition.
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_found_keeps_its_identity() {
        let store_err = StoreError::NotFound {
            entity: "campaign",
            id: "01ARZ3NDEKTSV4RRFFQ69G5FAV".to_string(),
        };
        let engine_err: EngineError = store_err.into();
        assert!(engine_err.is_not_found());
        assert_eq!(
            engine_err.to_string(),
            "campaign not found: 01ARZ3NDEKTSV4RRFFQ69G5FAV"
        );
    }

    #[test]
    fn duplicate_maps_to_store_wrapper() {
        let engine_err: EngineError = StoreError::Duplicate("key taken".to_string()).into();
        assert!(matches!(engine_err, EngineError::Store(_)));
        assert!(!engine_err.is_not_found());
        assert!(!engine_err.is_invalid_state());
    }
}
