//! The campaign dispatcher.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_common::CampaignId;
use courier_store::{CampaignStatus, SendOrigin, Store, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    config::EngineConfig,
    error::EngineError,
    message::build_campaign_message,
    recorder::DeliveryRecorder,
    send::{SendDisposition, send_to_recipient},
    suppression::SuppressionRegistry,
    transport::Transport,
};

/// Errors beyond this many are available via the send records, not the
/// report.
pub const ERROR_SAMPLE_LIMIT: usize = 10;

/// Result of one campaign blast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSendReport {
    /// Eligible recipients after suppression filtering.
    pub total_recipients: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// At most [`ERROR_SAMPLE_LIMIT`] error strings, in encounter order.
    pub errors: Vec<String>,
}

impl CampaignSendReport {
    fn push_error(&mut self, error: String) {
        if self.errors.len() < ERROR_SAMPLE_LIMIT {
            self.errors.push(error);
        }
    }
}

/// Sends one campaign to its full eligible recipient set — a single bounded
/// run, not resumable mid-flight.
///
/// The run is deliberately not transactional: a crash mid-batch leaves the
/// written send records in place and the campaign in draft, and a re-run
/// relies on the delivered-uniqueness constraint to skip recipients who
/// already got the message. This trades exactly-once-under-crash for
/// availability; it is an accepted limitation, not an oversight.
#[derive(Debug, Clone)]
pub struct CampaignDispatcher {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    suppression: SuppressionRegistry,
    recorder: DeliveryRecorder,
    config: EngineConfig,
}

impl CampaignDispatcher {
    /// Create a dispatcher over the shared collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        suppression: SuppressionRegistry,
        recorder: DeliveryRecorder,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            transport,
            suppression,
            recorder,
            config,
        }
    }

    /// Send a draft campaign to every eligible recipient.
    pub async fn send(&self, campaign_id: CampaignId) -> Result<CampaignSendReport, EngineError> {
        self.send_at(campaign_id, Utc::now()).await
    }

    /// Deterministic variant of [`CampaignDispatcher::send`] taking the
    /// current time explicitly.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] if the campaign id is unknown
    /// - [`EngineError::InvalidState`] if the campaign is already sent
    /// - [`EngineError::NoEligibleRecipients`] if filtering leaves nobody;
    ///   the campaign stays in draft
    pub async fn send_at(
        &self,
        campaign_id: CampaignId,
        now: DateTime<Utc>,
    ) -> Result<CampaignSendReport, EngineError> {
        let campaign = self.store.campaign(campaign_id).await?;
        if campaign.status != CampaignStatus::Draft {
            return Err(EngineError::invalid_state(format!(
                "campaign {campaign_id} already sent"
            )));
        }

        // Candidate set: every recipient with a usable address. Segment
        // filtering is a future extension point of this resolution step.
        let candidates: Vec<_> = self
            .store
            .list_recipients()
            .await?
            .into_iter()
            .filter_map(|recipient| {
                let address = recipient.address.clone()?;
                Some((recipient, address))
            })
            .collect();

        let mut eligible = Vec::with_capacity(candidates.len());
        for (recipient, address) in candidates {
            if self.suppression.is_suppressed(&address).await? {
                debug!(address = %address, "excluded suppressed address from blast");
            } else {
                eligible.push((recipient, address));
            }
        }

        if eligible.is_empty() {
            return Err(EngineError::NoEligibleRecipients);
        }

        let mut report = CampaignSendReport {
            total_recipients: eligible.len(),
            ..CampaignSendReport::default()
        };

        for (recipient, address) in eligible {
            // Crash-retry guard: a previous run may already have delivered
            // to this recipient before the campaign flipped to sent.
            if self
                .store
                .delivered_record_exists(campaign_id, recipient.id)
                .await?
            {
                report.success_count += 1;
                continue;
            }

            let message = build_campaign_message(&campaign, &recipient, &address, &self.config);
            let disposition = send_to_recipient(
                &self.transport,
                &self.suppression,
                &self.recorder,
                message,
                SendOrigin::Campaign(campaign_id),
                recipient.id,
                now,
            )
            .await?;

            match disposition {
                SendDisposition::Delivered(_) | SendDisposition::DuplicatePrevented => {
                    report.success_count += 1;
                }
                SendDisposition::Failed(record) => {
                    report.failure_count += 1;
                    let reason = record
                        .bounce_reason
                        .as_deref()
                        .unwrap_or("send failed")
                        .to_string();
                    report.push_error(format!("{address}: {reason}"));
                }
                SendDisposition::Suppressed => {
                    // Suppression landed between the batch filter and the
                    // pre-send check. Nothing was sent and no record is
                    // fabricated for an attempt that never happened.
                    warn!(address = %address, "recipient suppressed mid-run, skipping send");
                    report.failure_count += 1;
                    report.push_error(format!("{address}: suppressed since run began"));
                }
            }
        }

        match self.store.mark_campaign_sent(campaign_id, now).await {
            Ok(()) => {}
            // A concurrent run completed the transition first; the campaign
            // is sent either way.
            Err(StoreError::Duplicate(detail)) => {
                debug!(detail, "campaign already marked sent");
            }
            Err(other) => return Err(other.into()),
        }

        info!(
            campaign_id = %campaign_id,
            total = report.total_recipients,
            success = report.success_count,
            failure = report.failure_count,
            "campaign blast complete"
        );

        Ok(report)
    }
}
