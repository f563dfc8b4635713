//! Delivery-provider event ingestion.

use chrono::{DateTime, Utc};
use courier_common::{EmailAddress, EventId, ProviderMessageId};
use courier_store::SuppressionReason;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{error::EngineError, recorder::DeliveryRecorder, suppression::SuppressionRegistry};

/// The provider event kinds the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Open,
    Click,
    Bounce,
    Unsubscribe,
}

/// One delivery-provider callback event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub id: EventId,
    /// Absent for unsubscribes arriving from the standalone public form
    /// rather than a tracked link.
    pub provider_message_id: Option<ProviderMessageId>,
    pub kind: EventKind,
    pub address: EmailAddress,
    pub occurred_at: DateTime<Utc>,
    /// Provider-supplied detail, e.g. the bounce reason text.
    pub detail: Option<String>,
}

/// Consumes provider events and feeds them back into send records and the
/// suppression registry.
///
/// Each event kind maps to exactly one side effect; an event that cannot be
/// matched to a send record is logged and dropped, never fatal.
#[derive(Debug, Clone)]
pub struct EventIngestor {
    recorder: DeliveryRecorder,
    suppression: SuppressionRegistry,
}

impl EventIngestor {
    /// Create an ingestor over the shared components.
    #[must_use]
    pub const fn new(recorder: DeliveryRecorder, suppression: SuppressionRegistry) -> Self {
        Self {
            recorder,
            suppression,
        }
    }

    /// Apply one provider event.
    pub async fn ingest(&self, event: ProviderEvent) -> Result<(), EngineError> {
        match event.kind {
            EventKind::Open | EventKind::Click => self.annotate_only(&event).await,
            EventKind::Bounce => self.handle_bounce(&event).await,
            // Unsubscribe requests can arrive from the standalone public
            // form, so the suppression happens whether or not any send
            // record matches.
            EventKind::Unsubscribe => {
                self.suppression
                    .suppress(
                        &event.address,
                        SuppressionReason::Unsubscribed,
                        Some(event.id),
                    )
                    .await
            }
        }
    }

    async fn annotate_only(&self, event: &ProviderEvent) -> Result<(), EngineError> {
        let Some(message_id) = &event.provider_message_id else {
            warn!(event_id = %event.id, kind = ?event.kind, "event without message id, dropping");
            return Ok(());
        };
        match self
            .recorder
            .annotate_event(message_id, event.kind, event.occurred_at, None)
            .await?
        {
            Some(record) => {
                debug!(record_id = %record.id, kind = ?event.kind, "send record annotated");
            }
            None => {
                warn!(
                    provider_message_id = %message_id,
                    kind = ?event.kind,
                    "unknown provider message id, dropping event"
                );
            }
        }
        Ok(())
    }

    async fn handle_bounce(&self, event: &ProviderEvent) -> Result<(), EngineError> {
        let Some(message_id) = &event.provider_message_id else {
            warn!(event_id = %event.id, "bounce event without message id, dropping");
            return Ok(());
        };

        let annotated = self
            .recorder
            .annotate_event(
                message_id,
                EventKind::Bounce,
                event.occurred_at,
                event.detail.as_deref(),
            )
            .await?;

        match annotated {
            Some(record) => {
                // Every bounced record implies a bounced suppression entry.
                // The record's address is authoritative (it is what was
                // actually sent to); a mismatched event address is noted.
                if record.address != event.address {
                    warn!(
                        record_address = %record.address,
                        event_address = %event.address,
                        "bounce event address differs from send record"
                    );
                }
                self.suppression
                    .suppress(&record.address, SuppressionReason::Bounced, Some(event.id))
                    .await
            }
            None => {
                warn!(
                    provider_message_id = %message_id,
                    "bounce for unknown provider message id, dropping event"
                );
                Ok(())
            }
        }
    }
}
