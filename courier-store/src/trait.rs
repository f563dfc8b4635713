//! The storage collaborator interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::{
    CampaignId, EmailAddress, EnrollmentId, ProviderMessageId, RecipientId, SequenceId,
};

use crate::{
    Result,
    types::{Campaign, Enrollment, Recipient, SendRecord, Sequence, SuppressionEntry},
};

/// Transactional relational interface consumed by the delivery engine.
///
/// Implementations must make each method atomic with respect to the others;
/// in particular [`Store::append_send_record`] performs its uniqueness check
/// and insert as one critical section, because a bare check-then-act across
/// two calls is the classic double-send race.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    // --- recipients ---

    async fn insert_recipient(&self, recipient: &Recipient) -> Result<()>;

    async fn recipient(&self, id: RecipientId) -> Result<Recipient>;

    async fn list_recipients(&self) -> Result<Vec<Recipient>>;

    // --- campaigns ---

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<()>;

    async fn campaign(&self, id: CampaignId) -> Result<Campaign>;

    /// Transition a campaign from `Draft` to `Sent`, exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`](crate::StoreError::Duplicate) if the
    /// campaign is already `Sent` — the compare-and-set failed because a
    /// concurrent run completed first.
    async fn mark_campaign_sent(&self, id: CampaignId, at: DateTime<Utc>) -> Result<()>;

    // --- sequences ---

    async fn insert_sequence(&self, sequence: &Sequence) -> Result<()>;

    async fn sequence(&self, id: SequenceId) -> Result<Sequence>;

    // --- enrollments ---

    /// Insert a new enrollment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`](crate::StoreError::Duplicate) if an
    /// `Active` enrollment already exists for the same (sequence, recipient)
    /// pair.
    async fn insert_enrollment(&self, enrollment: &Enrollment) -> Result<()>;

    async fn enrollment(&self, id: EnrollmentId) -> Result<Enrollment>;

    async fn update_enrollment(&self, enrollment: &Enrollment) -> Result<()>;

    /// Active enrollments whose `next_due_at` has passed, oldest due first,
    /// capped at `limit`.
    async fn due_enrollments(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Enrollment>>;

    async fn sequence_enrollments(&self, id: SequenceId) -> Result<Vec<Enrollment>>;

    // --- send records ---

    /// Append one attempt row, enforcing the at-most-once constraints:
    /// at most one *delivered* record per `(campaign, recipient)` pair, and
    /// at most one record of any outcome per `(enrollment, step)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`](crate::StoreError::Duplicate) if the
    /// constraint rejected the row.
    async fn append_send_record(&self, record: &SendRecord) -> Result<()>;

    /// Whether any record exists for `(enrollment, step)` — the scheduler's
    /// idempotency guard against overlapping `process_due` invocations.
    async fn step_record_exists(&self, enrollment_id: EnrollmentId, step_order: u32)
    -> Result<bool>;

    /// Whether a delivered (non-bounced) record exists for
    /// `(campaign, recipient)` — the dispatcher's crash-retry guard.
    async fn delivered_record_exists(
        &self,
        campaign_id: CampaignId,
        recipient_id: RecipientId,
    ) -> Result<bool>;

    async fn record_by_provider_message_id(
        &self,
        id: &ProviderMessageId,
    ) -> Result<Option<SendRecord>>;

    /// Overwrite an existing record with annotated flags. Only event
    /// annotation calls this; the attempt fields themselves never change.
    async fn update_send_record(&self, record: &SendRecord) -> Result<()>;

    async fn campaign_records(&self, id: CampaignId) -> Result<Vec<SendRecord>>;

    async fn enrollment_records(&self, id: EnrollmentId) -> Result<Vec<SendRecord>>;

    // --- suppression ---

    /// Insert a suppression entry keyed by (address, reason). Inserting an
    /// already-present key keeps the original entry and succeeds.
    async fn insert_suppression(&self, entry: &SuppressionEntry) -> Result<()>;

    async fn suppressions_for(&self, address: &EmailAddress) -> Result<Vec<SuppressionEntry>>;

    async fn list_suppressions(&self) -> Result<Vec<SuppressionEntry>>;

    /// Remove every suppression entry for an address, returning how many
    /// were removed.
    async fn remove_suppressions(&self, address: &EmailAddress) -> Result<usize>;
}
