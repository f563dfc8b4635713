//! Row types shared between the store and the engine.

use chrono::{DateTime, Duration, Utc};
use courier_common::{
    CampaignId, EmailAddress, EnrollmentId, EventId, ProviderMessageId, RecipientId, SendRecordId,
    SequenceId,
};
use serde::{Deserialize, Serialize};

/// A CRM lead referenced by the delivery engine.
///
/// Secondary fields are display-only; only the address matters for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    /// Missing or unusable addresses exclude the recipient from every send.
    pub address: Option<EmailAddress>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl Recipient {
    /// Create a recipient with a fresh identifier.
    #[must_use]
    pub fn new(address: Option<EmailAddress>) -> Self {
        Self {
            id: RecipientId::generate(),
            address,
            name: None,
            phone: None,
        }
    }
}

/// Why an address is suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuppressionReason {
    Unsubscribed,
    Bounced,
}

impl std::fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsubscribed => f.write_str("unsubscribed"),
            Self::Bounced => f.write_str("bounced"),
        }
    }
}

/// A standing record preventing further sends to an address.
///
/// Keyed by (normalized address, reason); an address may carry both reasons
/// at once. Entries never expire — only an explicit administrative removal
/// deletes them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionEntry {
    pub address: EmailAddress,
    pub reason: SuppressionReason,
    pub created_at: DateTime<Utc>,
    /// The ingested event that created this entry, if any. Entries created
    /// by a direct administrative action carry `None`.
    pub source_event_id: Option<EventId>,
}

/// Campaign lifecycle: `Draft` until the dispatcher completes a run, `Sent`
/// forever after.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    Draft,
    Sent,
}

/// A one-shot blast to every eligible recipient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub subject: String,
    pub body: String,
    pub from: EmailAddress,
    pub reply_to: Option<EmailAddress>,
    pub status: CampaignStatus,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Campaign {
    /// Create a draft campaign with a fresh identifier.
    #[must_use]
    pub fn draft(
        subject: impl Into<String>,
        body: impl Into<String>,
        from: EmailAddress,
        reply_to: Option<EmailAddress>,
    ) -> Self {
        Self {
            id: CampaignId::generate(),
            subject: subject.into(),
            body: body.into(),
            from,
            reply_to,
            status: CampaignStatus::Draft,
            sent_at: None,
        }
    }
}

/// One step of a drip sequence.
///
/// `delay_secs` is measured from the previous step's actual send time (or
/// from enrollment for the first step), never cumulatively from a fixed
/// schedule — this is what lets the scheduler tolerate downtime without
/// burst-sending a mistimed backlog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    /// 1-based position within the sequence.
    pub order: u32,
    pub delay_secs: u64,
    pub subject: String,
    pub body: String,
}

impl SequenceStep {
    /// The step delay as a duration.
    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::seconds(i64::try_from(self.delay_secs).unwrap_or(i64::MAX))
    }
}

/// An ordered multi-step drip sequence.
///
/// Steps are append-only once any enrollment has progressed past them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: SequenceId,
    pub name: String,
    steps: Vec<SequenceStep>,
}

impl Sequence {
    /// Create a sequence with a fresh identifier. Steps are ordered by their
    /// `order` field regardless of input order.
    #[must_use]
    pub fn new(name: impl Into<String>, mut steps: Vec<SequenceStep>) -> Self {
        steps.sort_by_key(|step| step.order);
        Self {
            id: SequenceId::generate(),
            name: name.into(),
            steps,
        }
    }

    /// The ordered steps.
    #[must_use]
    pub fn steps(&self) -> &[SequenceStep] {
        &self.steps
    }

    /// Look up a step by its 1-based order.
    #[must_use]
    pub fn step(&self, order: u32) -> Option<&SequenceStep> {
        self.steps.iter().find(|step| step.order == order)
    }

    /// The step following the given order, if any.
    #[must_use]
    pub fn step_after(&self, order: u32) -> Option<&SequenceStep> {
        self.steps.iter().find(|step| step.order > order)
    }

    /// The order of the final step, or 0 for an empty sequence.
    #[must_use]
    pub fn last_order(&self) -> u32 {
        self.steps.last().map_or(0, |step| step.order)
    }
}

/// Enrollment lifecycle.
///
/// `Stopped` and `Completed` are terminal; every transition outside
/// [`EnrollmentStatus::permits`] is rejected by the scheduler with an
/// invalid-state error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Stopped,
}

impl EnrollmentStatus {
    /// Whether automatic processing is finished for this enrollment.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped)
    }

    /// The exhaustive transition table.
    #[must_use]
    pub const fn permits(self, next: Self) -> bool {
        match (self, next) {
            (Self::Active, Self::Active | Self::Completed | Self::Stopped) => true,
            (Self::Completed | Self::Stopped, _) => false,
        }
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Completed => f.write_str("completed"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// The binding of one recipient to one sequence, tracking progress through
/// its ordered steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrollment {
    pub id: EnrollmentId,
    pub sequence_id: SequenceId,
    pub recipient_id: RecipientId,
    /// The next unsent step while `Active`; frozen at the last handled step
    /// once the enrollment reaches a terminal status. Monotonically
    /// non-decreasing.
    pub current_step: u32,
    pub status: EnrollmentStatus,
    pub enrolled_at: DateTime<Utc>,
    /// When the current step becomes due. `None` in terminal states.
    pub next_due_at: Option<DateTime<Utc>>,
}

impl Enrollment {
    /// Create an active enrollment positioned at step 1.
    #[must_use]
    pub fn new(
        sequence_id: SequenceId,
        recipient_id: RecipientId,
        enrolled_at: DateTime<Utc>,
        first_due_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EnrollmentId::generate(),
            sequence_id,
            recipient_id,
            current_step: 1,
            status: EnrollmentStatus::Active,
            enrolled_at,
            next_due_at: Some(first_due_at),
        }
    }
}

/// What produced a send record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SendOrigin {
    /// A campaign blast.
    Campaign(CampaignId),
    /// One step of an enrollment's sequence.
    Step {
        enrollment_id: EnrollmentId,
        step_order: u32,
    },
}

/// The immutable audit row for one delivery attempt.
///
/// One row per attempt per recipient, append-only: event ingestion may later
/// annotate bounce/open/click flags, but the original attempt is never
/// rewritten or summarized destructively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendRecord {
    pub id: SendRecordId,
    pub origin: SendOrigin,
    pub recipient_id: RecipientId,
    pub address: EmailAddress,
    pub sent_at: DateTime<Utc>,
    pub bounced: bool,
    pub bounce_reason: Option<String>,
    pub provider_message_id: Option<ProviderMessageId>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
}

impl SendRecord {
    /// An attempt the provider accepted.
    #[must_use]
    pub fn delivered(
        origin: SendOrigin,
        recipient_id: RecipientId,
        address: EmailAddress,
        provider_message_id: ProviderMessageId,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SendRecordId::generate(),
            origin,
            recipient_id,
            address,
            sent_at,
            bounced: false,
            bounce_reason: None,
            provider_message_id: Some(provider_message_id),
            opened_at: None,
            clicked_at: None,
        }
    }

    /// An attempt the transport or provider rejected.
    #[must_use]
    pub fn failed(
        origin: SendOrigin,
        recipient_id: RecipientId,
        address: EmailAddress,
        error: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SendRecordId::generate(),
            origin,
            recipient_id,
            address,
            sent_at,
            bounced: true,
            bounce_reason: Some(error.into()),
            provider_message_id: None,
            opened_at: None,
            clicked_at: None,
        }
    }

    /// Whether the provider accepted this attempt.
    #[must_use]
    pub const fn is_delivered(&self) -> bool {
        !self.bounced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enrollment_transition_table() {
        use EnrollmentStatus::{Active, Completed, Stopped};

        assert!(Active.permits(Active));
        assert!(Active.permits(Completed));
        assert!(Active.permits(Stopped));

        for terminal in [Completed, Stopped] {
            assert!(terminal.is_terminal());
            for next in [Active, Completed, Stopped] {
                assert!(!terminal.permits(next));
            }
        }
    }

    #[test]
    fn sequence_orders_steps_on_construction() {
        let sequence = Sequence::new(
            "onboarding",
            vec![
                SequenceStep {
                    order: 2,
                    delay_secs: 86_400,
                    subject: "still there?".into(),
                    body: "…".into(),
                },
                SequenceStep {
                    order: 1,
                    delay_secs: 0,
                    subject: "welcome".into(),
                    body: "…".into(),
                },
            ],
        );

        assert_eq!(sequence.steps()[0].order, 1);
        assert_eq!(sequence.last_order(), 2);
        assert_eq!(sequence.step(2).map(|s| s.delay_secs), Some(86_400));
        assert!(sequence.step(3).is_none());
    }

    #[test]
    fn step_delay_conversion() {
        let step = SequenceStep {
            order: 1,
            delay_secs: 90,
            subject: String::new(),
            body: String::new(),
        };
        assert_eq!(step.delay(), Duration::seconds(90));
    }
}
