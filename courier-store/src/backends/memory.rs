//! In-memory store implementation.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::{
    CampaignId, EmailAddress, EnrollmentId, ProviderMessageId, RecipientId, SendRecordId,
    SequenceId,
};

use crate::{
    Result, StoreError,
    r#trait::Store,
    types::{
        Campaign, CampaignStatus, Enrollment, EnrollmentStatus, Recipient, SendOrigin, SendRecord,
        Sequence, SuppressionEntry, SuppressionReason,
    },
};

#[derive(Debug, Default)]
struct Inner {
    recipients: HashMap<RecipientId, Recipient>,
    campaigns: HashMap<CampaignId, Campaign>,
    sequences: HashMap<SequenceId, Sequence>,
    enrollments: HashMap<EnrollmentId, Enrollment>,
    send_records: HashMap<SendRecordId, SendRecord>,
    /// Uniqueness index: delivered records per (campaign, recipient).
    delivered_keys: HashSet<(CampaignId, RecipientId)>,
    /// Uniqueness index: any record per (enrollment, step).
    step_keys: HashSet<(EnrollmentId, u32)>,
    suppressions: HashMap<(EmailAddress, SuppressionReason), SuppressionEntry>,
}

/// In-memory [`Store`] backed by a single `RwLock`.
///
/// All tables live under one lock, which makes every check+insert pair a
/// critical section — the memory analogue of the relational uniqueness
/// constraints the engine's at-most-once guarantees rely on.
///
/// # Concurrency
/// Uses an `RwLock` for interior mutability and recovers from poisoning by
/// taking the inner data, matching the behaviour of the other backends'
/// transactional stores.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_recipient(&self, recipient: &Recipient) -> Result<()> {
        self.write()
            .recipients
            .insert(recipient.id, recipient.clone());
        Ok(())
    }

    async fn recipient(&self, id: RecipientId) -> Result<Recipient> {
        self.read()
            .recipients
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("recipient", id))
    }

    async fn list_recipients(&self) -> Result<Vec<Recipient>> {
        let mut recipients: Vec<_> = self.read().recipients.values().cloned().collect();
        // Identifiers are creation-ordered, so this gives a stable listing.
        recipients.sort_by_key(|recipient| recipient.id);
        Ok(recipients)
    }

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.write().campaigns.insert(campaign.id, campaign.clone());
        Ok(())
    }

    async fn campaign(&self, id: CampaignId) -> Result<Campaign> {
        self.read()
            .campaigns
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("campaign", id))
    }

    async fn mark_campaign_sent(&self, id: CampaignId, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.write();
        let campaign = inner
            .campaigns
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("campaign", id))?;

        if campaign.status == CampaignStatus::Sent {
            return Err(StoreError::Duplicate(format!("campaign {id} already sent")));
        }

        campaign.status = CampaignStatus::Sent;
        campaign.sent_at = Some(at);
        Ok(())
    }

    async fn insert_sequence(&self, sequence: &Sequence) -> Result<()> {
        self.write().sequences.insert(sequence.id, sequence.clone());
        Ok(())
    }

    async fn sequence(&self, id: SequenceId) -> Result<Sequence> {
        self.read()
            .sequences
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("sequence", id))
    }

    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        let mut inner = self.write();

        let conflict = inner.enrollments.values().any(|existing| {
            existing.sequence_id == enrollment.sequence_id
                && existing.recipient_id == enrollment.recipient_id
                && existing.status == EnrollmentStatus::Active
        });
        if conflict {
            return Err(StoreError::Duplicate(format!(
                "recipient {} already actively enrolled in sequence {}",
                enrollment.recipient_id, enrollment.sequence_id
            )));
        }

        inner.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(())
    }

    async fn enrollment(&self, id: EnrollmentId) -> Result<Enrollment> {
        self.read()
            .enrollments
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("enrollment", id))
    }

    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<()> {
        let mut inner = self.write();
        if !inner.enrollments.contains_key(&enrollment.id) {
            return Err(StoreError::not_found("enrollment", enrollment.id));
        }
        inner.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(())
    }

    async fn due_enrollments(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Enrollment>> {
        let inner = self.read();
        let mut due: Vec<_> = inner
            .enrollments
            .values()
            .filter(|enrollment| {
                enrollment.status == EnrollmentStatus::Active
                    && enrollment.next_due_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();

        due.sort_by_key(|enrollment| enrollment.next_due_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn sequence_enrollments(&self, id: SequenceId) -> Result<Vec<Enrollment>> {
        let mut enrollments: Vec<_> = self
            .read()
            .enrollments
            .values()
            .filter(|enrollment| enrollment.sequence_id == id)
            .cloned()
            .collect();
        enrollments.sort_by_key(|enrollment| enrollment.id);
        Ok(enrollments)
    }

    async fn append_send_record(&self, record: &SendRecord) -> Result<()> {
        let mut inner = self.write();

        // Constraint check and insert under the same write guard: this is
        // the critical section that turns check-then-act into at-most-once.
        match record.origin {
            SendOrigin::Campaign(campaign_id) => {
                if record.is_delivered() {
                    let key = (campaign_id, record.recipient_id);
                    if inner.delivered_keys.contains(&key) {
                        return Err(StoreError::Duplicate(format!(
                            "delivered record already exists for campaign {campaign_id} \
                             recipient {}",
                            record.recipient_id
                        )));
                    }
                    inner.delivered_keys.insert(key);
                }
            }
            SendOrigin::Step {
                enrollment_id,
                step_order,
            } => {
                let key = (enrollment_id, step_order);
                if inner.step_keys.contains(&key) {
                    return Err(StoreError::Duplicate(format!(
                        "record already exists for enrollment {enrollment_id} step {step_order}"
                    )));
                }
                inner.step_keys.insert(key);
            }
        }

        inner.send_records.insert(record.id, record.clone());
        Ok(())
    }

    async fn step_record_exists(
        &self,
        enrollment_id: EnrollmentId,
        step_order: u32,
    ) -> Result<bool> {
        Ok(self.read().step_keys.contains(&(enrollment_id, step_order)))
    }

    async fn delivered_record_exists(
        &self,
        campaign_id: CampaignId,
        recipient_id: RecipientId,
    ) -> Result<bool> {
        Ok(self
            .read()
            .delivered_keys
            .contains(&(campaign_id, recipient_id)))
    }

    async fn record_by_provider_message_id(
        &self,
        id: &ProviderMessageId,
    ) -> Result<Option<SendRecord>> {
        Ok(self
            .read()
            .send_records
            .values()
            .find(|record| record.provider_message_id.as_ref() == Some(id))
            .cloned())
    }

    async fn update_send_record(&self, record: &SendRecord) -> Result<()> {
        let mut inner = self.write();
        if !inner.send_records.contains_key(&record.id) {
            return Err(StoreError::not_found("send record", record.id));
        }
        inner.send_records.insert(record.id, record.clone());
        Ok(())
    }

    async fn campaign_records(&self, id: CampaignId) -> Result<Vec<SendRecord>> {
        let mut records: Vec<_> = self
            .read()
            .send_records
            .values()
            .filter(|record| record.origin == SendOrigin::Campaign(id))
            .cloned()
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    async fn enrollment_records(&self, id: EnrollmentId) -> Result<Vec<SendRecord>> {
        let mut records: Vec<_> = self
            .read()
            .send_records
            .values()
            .filter(|record| {
                matches!(record.origin, SendOrigin::Step { enrollment_id, .. } if enrollment_id == id)
            })
            .cloned()
            .collect();
        records.sort_by_key(|record| record.id);
        Ok(records)
    }

    async fn insert_suppression(&self, entry: &SuppressionEntry) -> Result<()> {
        self.write()
            .suppressions
            .entry((entry.address.clone(), entry.reason))
            .or_insert_with(|| entry.clone());
        Ok(())
    }

    async fn suppressions_for(&self, address: &EmailAddress) -> Result<Vec<SuppressionEntry>> {
        Ok(self
            .read()
            .suppressions
            .iter()
            .filter(|((addr, _), _)| addr == address)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn list_suppressions(&self) -> Result<Vec<SuppressionEntry>> {
        let mut entries: Vec<_> = self.read().suppressions.values().cloned().collect();
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }

    async fn remove_suppressions(&self, address: &EmailAddress) -> Result<usize> {
        let mut inner = self.write();
        let before = inner.suppressions.len();
        inner.suppressions.retain(|(addr, _), _| addr != address);
        Ok(before - inner.suppressions.len())
    }
}
