//! The sequence scheduler.
//!
//! Owns the enrollment state machine: creates enrollments, computes due
//! steps, advances state one step at a time, and delegates actual sending
//! to the same per-recipient primitive the campaign dispatcher uses.

mod due;
mod process;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use courier_common::{EnrollmentId, RecipientId, SequenceId};
use courier_store::{Enrollment, EnrollmentStatus, Store, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    config::EngineConfig,
    error::EngineError,
    message::build_step_message,
    recorder::DeliveryRecorder,
    send::{SendDisposition, send_to_recipient},
    suppression::SuppressionRegistry,
    transport::Transport,
};

pub use process::DueReport;

/// What happened to one step send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    /// The provider accepted the message and the enrollment advanced.
    Sent,
    /// The transport failed; the attempt is recorded and the enrollment
    /// advanced (the step is never retried — its uniqueness slot is taken).
    Failed(String),
    /// A record already exists for this (enrollment, step): an earlier or
    /// concurrent invocation sent it. Success-no-op.
    AlreadySent,
    /// The recipient is suppressed (or no longer has a usable address);
    /// nothing was sent and the enrollment was stopped so it never lingers
    /// in the due scan.
    Suppressed,
}

/// Drives enrollments through their sequence steps.
#[derive(Debug, Clone)]
pub struct SequenceScheduler {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    suppression: SuppressionRegistry,
    recorder: DeliveryRecorder,
    config: EngineConfig,
}

impl SequenceScheduler {
    /// Create a scheduler over the shared collaborators.
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

    /// Enroll recipients into a sequence.
    pub async fn enroll(
        &self,
        sequence_id: SequenceId,
        recipient_ids: &[RecipientId],
    ) -> Result<Vec<EnrollmentId>, EngineError> {
        self.enroll_at(sequence_id, recipient_ids, Utc::now()).await
    }

    /// Deterministic variant of [`SequenceScheduler::enroll`] taking the
    /// enrollment time explicitly.
    ///
    /// The whole request is validated before any enrollment is created:
    /// every recipient must exist, carry a usable address, and not already
    /// be actively enrolled in the sequence.
    ///
    /// # Errors
    ///
    /// - [`EngineError::NotFound`] for an unknown sequence or recipient
    /// - [`EngineError::InvalidState`] for an empty sequence, a recipient
    ///   without an address, or a recipient already actively enrolled
    pub async fn enroll_at(
        &self,
        sequence_id: SequenceId,
        recipient_ids: &[RecipientId],
        now: DateTime<Utc>,
    ) -> Result<Vec<EnrollmentId>, EngineError> {
        let sequence = self.store.sequence(sequence_id).await?;
        let Some(first_step) = sequence.steps().first() else {
            return Err(EngineError::invalid_state(format!(
                "sequence {sequence_id} has no steps"
            )));
        };

        // Validate the full batch up front so a bad entry rejects the
        // request before any enrollment exists.
        let already_active: Vec<RecipientId> = self
            .store
            .sequence_enrollments(sequence_id)
            .await?
            .into_iter()
            .filter(|enrollment| enrollment.status == EnrollmentStatus::Active)
            .map(|enrollment| enrollment.recipient_id)
            .collect();

        for &recipient_id in recipient_ids {
            let recipient = self.store.recipient(recipient_id).await?;
            if recipient.address.is_none() {
                return Err(EngineError::invalid_state(format!(
                    "recipient {recipient_id} has no usable address"
                )));
            }
            if already_active.contains(&recipient_id) {
                return Err(EngineError::invalid_state(format!(
                    "recipient {recipient_id} already actively enrolled in sequence {sequence_id}"
                )));
            }
        }

        let first_due = due::due_after(now, first_step);
        let mut enrollment_ids = Vec::with_capacity(recipient_ids.len());
        for &recipient_id in recipient_ids {
            let enrollment = Enrollment::new(sequence_id, recipient_id, now, first_due);
            match self.store.insert_enrollment(&enrollment).await {
                Ok(()) => enrollment_ids.push(enrollment.id),
                // A concurrent enroll slipped past the pre-check.
                Err(StoreError::Duplicate(detail)) => {
                    return Err(EngineError::InvalidState(detail));
                }
                Err(other) => return Err(other.into()),
            }
        }

        info!(
            sequence_id = %sequence_id,
            enrolled = enrollment_ids.len(),
            "recipients enrolled"
        );
        Ok(enrollment_ids)
    }

    /// Operator stop: terminal, freezes `current_step`, excludes the
    /// enrollment from future due scans.
    pub async fn stop(&self, enrollment_id: EnrollmentId) -> Result<(), EngineError> {
        let enrollment = self.store.enrollment(enrollment_id).await?;
        self.stop_enrollment(enrollment).await
    }

    /// Manually send a specific step, bypassing the due-time check.
    ///
    /// Intended for operator/test use. The suppression check and the
    /// step-idempotency guard still apply; the enrollment only advances
    /// when the step sent is its current step.
    pub async fn send_step(
        &self,
        enrollment_id: EnrollmentId,
        step_order: u32,
    ) -> Result<StepOutcome, EngineError> {
        self.send_step_at(enrollment_id, step_order, Utc::now())
            .await
    }

    /// Deterministic variant of [`SequenceScheduler::send_step`] taking the
    /// current time explicitly.
    pub async fn send_step_at(
        &self,
        enrollment_id: EnrollmentId,
        step_order: u32,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome, EngineError> {
        let enrollment = self.store.enrollment(enrollment_id).await?;
        self.deliver_step(enrollment, step_order, now).await
    }

    async fn stop_enrollment(&self, mut enrollment: Enrollment) -> Result<(), EngineError> {
        if !enrollment.status.permits(EnrollmentStatus::Stopped) {
            return Err(EngineError::invalid_state(format!(
                "cannot stop {} enrollment {}",
                enrollment.status, enrollment.id
            )));
        }
        enrollment.status = EnrollmentStatus::Stopped;
        enrollment.next_due_at = None;
        self.store.update_enrollment(&enrollment).await?;
        info!(enrollment_id = %enrollment.id, "enrollment stopped");
        Ok(())
    }

    /// Send one step for one enrollment and advance its state machine.
    ///
    /// Shared by the manual path and the due-processing path.
    async fn deliver_step(
        &self,
        enrollment: Enrollment,
        step_order: u32,
        now: DateTime<Utc>,
    ) -> Result<StepOutcome, EngineError> {
        let sequence = self.store.sequence(enrollment.sequence_id).await?;
        let Some(step) = sequence.step(step_order) else {
            return Err(EngineError::NotFound {
                entity: "sequence step",
                id: format!("{}#{step_order}", sequence.id),
            });
        };

        if enrollment.status != EnrollmentStatus::Active {
            return Err(EngineError::invalid_state(format!(
                "cannot send step for {} enrollment {}",
                enrollment.status, enrollment.id
            )));
        }

        // Idempotency guard against overlapping invocations: a step is
        // never sent twice for the same enrollment.
        if self
            .store
            .step_record_exists(enrollment.id, step_order)
            .await?
        {
            self.heal_unadvanced(enrollment, &sequence, step_order)
                .await?;
            return Ok(StepOutcome::AlreadySent);
        }

        let recipient = self.store.recipient(enrollment.recipient_id).await?;
        let Some(address) = recipient.address.clone() else {
            warn!(
                enrollment_id = %enrollment.id,
                recipient_id = %enrollment.recipient_id,
                "recipient lost its address, stopping enrollment"
            );
            self.stop_enrollment(enrollment).await?;
            return Ok(StepOutcome::Suppressed);
        };

        let message = build_step_message(step, enrollment.id, &recipient, &address, &self.config);
        let disposition = send_to_recipient(
            &self.transport,
            &self.suppression,
            &self.recorder,
            message,
            courier_store::SendOrigin::Step {
                enrollment_id: enrollment.id,
                step_order,
            },
            recipient.id,
            now,
        )
        .await?;

        match disposition {
            SendDisposition::Delivered(record) => {
                self.advance_if_current(enrollment, &sequence, step_order, record.sent_at)
                    .await?;
                Ok(StepOutcome::Sent)
            }
            SendDisposition::Failed(record) => {
                let reason = record
                    .bounce_reason
                    .clone()
                    .unwrap_or_else(|| "send failed".to_string());
                self.advance_if_current(enrollment, &sequence, step_order, record.sent_at)
                    .await?;
                Ok(StepOutcome::Failed(reason))
            }
            SendDisposition::Suppressed => {
                // A suppressed recipient must never linger as an active
                // enrollment: the step is permanently skipped.
                warn!(
                    enrollment_id = %enrollment.id,
                    address = %address,
                    "recipient suppressed, stopping enrollment"
                );
                self.stop_enrollment(enrollment).await?;
                Ok(StepOutcome::Suppressed)
            }
            SendDisposition::DuplicatePrevented => Ok(StepOutcome::AlreadySent),
        }
    }

    async fn advance_if_current(
        &self,
        enrollment: Enrollment,
        sequence: &courier_store::Sequence,
        sent_order: u32,
        sent_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if sent_order != enrollment.current_step {
            // Manual send of a non-current step: recorded, but the state
            // machine keeps its position.
            return Ok(());
        }
        let advanced = due::advance_after_send(enrollment, sequence, sent_order, sent_at);
        self.store.update_enrollment(&advanced).await?;
        Ok(())
    }

    /// Recover an enrollment whose step record exists but whose state was
    /// never advanced (a crash between the record write and the enrollment
    /// update). Without this the due scan would return it forever.
    async fn heal_unadvanced(
        &self,
        enrollment: Enrollment,
        sequence: &courier_store::Sequence,
        step_order: u32,
    ) -> Result<(), EngineError> {
        if step_order != enrollment.current_step {
            return Ok(());
        }
        let existing = self
            .store
            .enrollment_records(enrollment.id)
            .await?
            .into_iter()
            .find(|record| {
                matches!(
                    record.origin,
                    courier_store::SendOrigin::Step { step_order: order, .. } if order == step_order
                )
            });
        if let Some(record) = existing {
            warn!(
                enrollment_id = %enrollment.id,
                step_order,
                "advancing enrollment past already-recorded step"
            );
            let advanced = due::advance_after_send(enrollment, sequence, step_order, record.sent_at);
            self.store.update_enrollment(&advanced).await?;
        }
        Ok(())
    }
}
