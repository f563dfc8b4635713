//! Due-enrollment processing, the scheduler's production driver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{SequenceScheduler, StepOutcome};
use crate::error::EngineError;

/// Result of one `process_due` invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DueReport {
    /// Due enrollments evaluated this invocation.
    pub processed: usize,
    /// Enrollments whose step was attempted (a send record was written and
    /// the enrollment advanced), whether or not the provider accepted it.
    pub sent: usize,
    /// Enrollments evaluated but not attempted: already handled by a
    /// concurrent invocation, suppressed and stopped, or errored.
    pub skipped: usize,
}

impl SequenceScheduler {
    /// Advance due enrollments, invoked periodically by cron or an
    /// operator.
    pub async fn process_due(&self) -> Result<DueReport, EngineError> {
        self.process_due_at(Utc::now()).await
    }

    /// Deterministic variant of [`SequenceScheduler::process_due`] taking
    /// the current time explicitly.
    ///
    /// Scans active enrollments whose `next_due_at` has passed, oldest due
    /// first, and advances at most `max_due_per_invocation` of them. Each
    /// enrollment is handled independently: a failure for one is logged and
    /// counted, never propagated, so a stuck enrollment cannot starve the
    /// rest of the scan in later invocations.
    ///
    /// Overlapping invocations are safe: the step-record existence check
    /// plus the store's `(enrollment, step)` uniqueness constraint make a
    /// concurrently handled enrollment a counted no-op here.
    pub async fn process_due_at(&self, now: DateTime<Utc>) -> Result<DueReport, EngineError> {
        let due = self
            .store
            .due_enrollments(now, self.config.max_due_per_invocation)
            .await?;

        let mut report = DueReport::default();
        for enrollment in due {
            report.processed += 1;
            let enrollment_id = enrollment.id;
            let step_order = enrollment.current_step;

            match self.deliver_step(enrollment, step_order, now).await {
                Ok(StepOutcome::Sent | StepOutcome::Failed(_)) => report.sent += 1,
                Ok(StepOutcome::AlreadySent) => {
                    debug!(
                        enrollment_id = %enrollment_id,
                        step_order,
                        "step already handled by another invocation"
                    );
                    report.skipped += 1;
                }
                Ok(StepOutcome::Suppressed) => report.skipped += 1,
                Err(e) => {
                    error!(
                        enrollment_id = %enrollment_id,
                        step_order,
                        error = %e,
                        "failed to process due enrollment"
                    );
                    report.skipped += 1;
                }
            }
        }

        Ok(report)
    }
}
