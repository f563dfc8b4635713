//! The delivery recorder.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_common::{CampaignId, ProviderMessageId, SequenceId};
use courier_store::{SendRecord, Store, StoreError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{error::EngineError, events::EventKind};

/// Outcome of appending one attempt row.
#[derive(Debug)]
pub enum RecordOutcome {
    /// The row was written.
    Recorded(SendRecord),
    /// The store's uniqueness constraint rejected the row: the desired
    /// at-most-once state already holds. Not an error.
    DuplicatePrevented,
}

/// Aggregate counters for one campaign, derived from its send records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub attempted: usize,
    pub delivered: usize,
    pub bounced: usize,
    pub opened: usize,
    pub clicked: usize,
}

/// Aggregate counters for one sequence across all of its enrollments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStats {
    pub enrollments: usize,
    pub attempted: usize,
    pub delivered: usize,
    pub bounced: usize,
}

/// Durably persists one row per send attempt and derives aggregate
/// campaign/sequence counters.
///
/// Writes are append-only: event annotation updates flags on an existing
/// row but never deletes or rewrites the original attempt, and aggregates
/// are always recomputed from the rows rather than maintained destructively.
#[derive(Debug, Clone)]
pub struct DeliveryRecorder {
    store: Arc<dyn Store>,
}

impl DeliveryRecorder {
    /// Create a recorder over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append one attempt row.
    ///
    /// A `Duplicate` rejection from the store is converted into
    /// [`RecordOutcome::DuplicatePrevented`] here — it is an expected
    /// outcome of concurrent dispatcher/scheduler invocations, not a
    /// failure to surface.
    pub async fn record(&self, record: SendRecord) -> Result<RecordOutcome, EngineError> {
        match self.store.append_send_record(&record).await {
            Ok(()) => Ok(RecordOutcome::Recorded(record)),
            Err(StoreError::Duplicate(detail)) => {
                debug!(detail, "duplicate send prevented");
                Ok(RecordOutcome::DuplicatePrevented)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Annotate the record matching a provider message id with an event.
    ///
    /// Returns the annotated record, or `None` when no record matches
    /// (the caller decides whether that is worth logging). First-seen
    /// timestamps win for opens and clicks; replays do not move them.
    pub async fn annotate_event(
        &self,
        provider_message_id: &ProviderMessageId,
        kind: EventKind,
        occurred_at: DateTime<Utc>,
        detail: Option<&str>,
    ) -> Result<Option<SendRecord>, EngineError> {
        let Some(mut record) = self
            .store
            .record_by_provider_message_id(provider_message_id)
            .await?
        else {
            return Ok(None);
        };

        match kind {
            EventKind::Open => {
                if record.opened_at.is_none() {
                    record.opened_at = Some(occurred_at);
                }
            }
            EventKind::Click => {
                if record.clicked_at.is_none() {
                    record.clicked_at = Some(occurred_at);
                }
            }
            EventKind::Bounce => {
                record.bounced = true;
                if let Some(reason) = detail {
                    record.bounce_reason = Some(reason.to_string());
                }
            }
            // Unsubscribes only touch the suppression registry.
            EventKind::Unsubscribe => return Ok(Some(record)),
        }

        self.store.update_send_record(&record).await?;
        Ok(Some(record))
    }

    /// Derive aggregate counters for a campaign.
    pub async fn campaign_stats(&self, id: CampaignId) -> Result<CampaignStats, EngineError> {
        let records = self.store.campaign_records(id).await?;
        let mut stats = CampaignStats::default();
        for record in &records {
            stats.attempted += 1;
            if record.is_delivered() {
                stats.delivered += 1;
            } else {
                stats.bounced += 1;
            }
            if record.opened_at.is_some() {
                stats.opened += 1;
            }
            if record.clicked_at.is_some() {
                stats.clicked += 1;
            }
        }
        Ok(stats)
    }

    /// Derive aggregate counters for a sequence across its enrollments.
    pub async fn sequence_stats(&self, id: SequenceId) -> Result<SequenceStats, EngineError> {
        let enrollments = self.store.sequence_enrollments(id).await?;
        let mut stats = SequenceStats {
            enrollments: enrollments.len(),
            ..SequenceStats::default()
        };
        for enrollment in &enrollments {
            for record in self.store.enrollment_records(enrollment.id).await? {
                stats.attempted += 1;
                if record.is_delivered() {
                    stats.delivered += 1;
                } else {
                    stats.bounced += 1;
                }
            }
        }
        Ok(stats)
    }
}
