//! The suppression registry.

use std::sync::Arc;

use chrono::Utc;
use courier_common::{EmailAddress, EventId};
use courier_store::{Store, SuppressionEntry, SuppressionReason};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Answers "is this address deliverable?" against unsubscribe and bounce
/// records.
///
/// The registry is the single authority for suppression state shared by the
/// dispatcher, the scheduler, and event ingestion. It reads the store on
/// every check — no cache — so a check made immediately before a provider
/// call observes unsubscribes that arrived mid-batch.
#[derive(Debug, Clone)]
pub struct SuppressionRegistry {
    store: Arc<dyn Store>,
}

impl SuppressionRegistry {
    /// Create a registry over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Whether any suppression entry exists for the address, regardless of
    /// reason.
    pub async fn is_suppressed(&self, address: &EmailAddress) -> Result<bool, EngineError> {
        Ok(!self.store.suppressions_for(address).await?.is_empty())
    }

    /// Record a suppression for the address.
    ///
    /// Idempotent per (address, reason): replaying the same suppression
    /// keeps the original entry.
    pub async fn suppress(
        &self,
        address: &EmailAddress,
        reason: SuppressionReason,
        source_event_id: Option<EventId>,
    ) -> Result<(), EngineError> {
        let entry = SuppressionEntry {
            address: address.clone(),
            reason,
            created_at: Utc::now(),
            source_event_id,
        };
        self.store.insert_suppression(&entry).await?;
        debug!(address = %address, reason = %reason, "address suppressed");
        Ok(())
    }

    /// Administrative removal of every suppression entry for an address.
    ///
    /// This is the only path that deletes suppression state (entries never
    /// auto-expire), so the action is always logged with the count removed.
    pub async fn unsuppress(&self, address: &EmailAddress) -> Result<usize, EngineError> {
        let removed = self.store.remove_suppressions(address).await?;
        warn!(
            address = %address,
            removed,
            "administrative unsuppression"
        );
        Ok(removed)
    }

    /// Every entry currently held for an address.
    pub async fn entries(
        &self,
        address: &EmailAddress,
    ) -> Result<Vec<SuppressionEntry>, EngineError> {
        Ok(self.store.suppressions_for(address).await?)
    }

    /// The full suppression list.
    pub async fn list(&self) -> Result<Vec<SuppressionEntry>, EngineError> {
        Ok(self.store.list_suppressions().await?)
    }
}
