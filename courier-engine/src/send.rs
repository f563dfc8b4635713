//! The shared per-recipient send primitive.
//!
//! Both the campaign dispatcher and the sequence scheduler deliver through
//! this one path so the invariants hold everywhere: the suppression check
//! runs immediately before the provider call (not at batch-build time),
//! every attempt is recorded whether the provider accepted it or not, and
//! a uniqueness rejection from the store is the at-most-once guarantee
//! holding, not a failure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_common::RecipientId;
use courier_store::{SendOrigin, SendRecord};
use tracing::{debug, warn};

use crate::{
    error::EngineError,
    recorder::{DeliveryRecorder, RecordOutcome},
    suppression::SuppressionRegistry,
    transport::{OutboundMessage, Transport},
};

/// What happened to one recipient.
#[derive(Debug)]
pub(crate) enum SendDisposition {
    /// Provider accepted; delivered record written.
    Delivered(SendRecord),
    /// Provider or transport failed; bounced record written, batch
    /// continues.
    Failed(SendRecord),
    /// Address was suppressed at the final pre-send check. No provider
    /// call, no record.
    Suppressed,
    /// A concurrent invocation already produced the record for this
    /// recipient/step. Success-no-op.
    DuplicatePrevented,
}

pub(crate) async fn send_to_recipient(
    transport: &Arc<dyn Transport>,
    suppression: &SuppressionRegistry,
    recorder: &DeliveryRecorder,
    message: OutboundMessage,
    origin: SendOrigin,
    recipient_id: RecipientId,
    now: DateTime<Utc>,
) -> Result<SendDisposition, EngineError> {
    // Final gate: re-checked here rather than trusting any earlier filter,
    // so unsubscribes that land mid-batch are honored (best-effort).
    if suppression.is_suppressed(&message.to).await? {
        debug!(address = %message.to, "suppressed at pre-send check");
        return Ok(SendDisposition::Suppressed);
    }

    let record = match transport.send_message(&message).await {
        Ok(provider_message_id) => SendRecord::delivered(
            origin,
            recipient_id,
            message.to.clone(),
            provider_message_id,
            now,
        ),
        Err(error) => {
            warn!(
                address = %message.to,
                error = %error,
                "outbound send failed, recording and continuing"
            );
            SendRecord::failed(origin, recipient_id, message.to.clone(), error.to_string(), now)
        }
    };

    let delivered = record.is_delivered();
    match recorder.record(record).await? {
        RecordOutcome::Recorded(record) => {
            if delivered {
                Ok(SendDisposition::Delivered(record))
            } else {
                Ok(SendDisposition::Failed(record))
            }
        }
        RecordOutcome::DuplicatePrevented => Ok(SendDisposition::DuplicatePrevented),
    }
}
