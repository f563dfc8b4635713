//! Due-time computation and enrollment advancement.

use chrono::{DateTime, Utc};
use courier_store::{Enrollment, EnrollmentStatus, Sequence, SequenceStep};

/// When a step becomes due, measured from its anchor: the previous step's
/// actual send time, or the enrollment time for the first step.
///
/// Delays are per-step, never cumulative from a fixed original schedule, so
/// a scheduler that was down for a while resumes from the last real send
/// instead of burst-sending a mistimed backlog.
pub(crate) fn due_after(anchor: DateTime<Utc>, step: &SequenceStep) -> DateTime<Utc> {
    anchor + step.delay()
}

/// Advance an enrollment past a just-sent step.
///
/// Moves to the next step (recomputing `next_due_at` from the actual send
/// time) or completes the enrollment when the sent step was the last one.
/// Callers verify the enrollment is `Active` before sending; both resulting
/// transitions are in the state machine's table.
pub(crate) fn advance_after_send(
    mut enrollment: Enrollment,
    sequence: &Sequence,
    sent_order: u32,
    sent_at: DateTime<Utc>,
) -> Enrollment {
    if let Some(next) = sequence.step_after(sent_order) {
        enrollment.current_step = next.order;
        enrollment.next_due_at = Some(due_after(sent_at, next));
    } else {
        enrollment.status = EnrollmentStatus::Completed;
        enrollment.next_due_at = None;
    }
    enrollment
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use courier_common::RecipientId;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn two_step_sequence() -> Sequence {
        Sequence::new(
            "drip",
            vec![
                SequenceStep {
                    order: 1,
                    delay_secs: 0,
                    subject: "welcome".into(),
                    body: "…".into(),
                },
                SequenceStep {
                    order: 2,
                    delay_secs: 3 * 86_400,
                    subject: "follow-up".into(),
                    body: "…".into(),
                },
            ],
        )
    }

    #[test]
    fn due_time_is_anchored_on_the_actual_send() {
        let sequence = two_step_sequence();
        let step2 = sequence.step(2).expect("step 2");

        // Step 1 went out a day late; step 2 measures from the real send,
        // not from the originally scheduled time.
        let late_send = t0() + Duration::days(1);
        assert_eq!(due_after(late_send, step2), late_send + Duration::days(3));
    }

    #[test]
    fn advancing_past_a_middle_step_recomputes_due_time() {
        let sequence = two_step_sequence();
        let enrollment = Enrollment::new(sequence.id, RecipientId::generate(), t0(), t0());

        let advanced = advance_after_send(enrollment, &sequence, 1, t0());

        assert_eq!(advanced.status, EnrollmentStatus::Active);
        assert_eq!(advanced.current_step, 2);
        assert_eq!(advanced.next_due_at, Some(t0() + Duration::days(3)));
    }

    #[test]
    fn advancing_past_the_final_step_completes() {
        let sequence = two_step_sequence();
        let mut enrollment = Enrollment::new(sequence.id, RecipientId::generate(), t0(), t0());
        enrollment.current_step = 2;

        let advanced = advance_after_send(enrollment, &sequence, 2, t0() + Duration::days(3));

        assert_eq!(advanced.status, EnrollmentStatus::Completed);
        assert_eq!(advanced.next_due_at, None);
        assert_eq!(advanced.current_step, 2, "current step frozen at the last sent step");
    }

    #[test]
    fn advancement_follows_step_order_not_arithmetic() {
        // Orders need not be contiguous; advancement finds the next higher
        // order.
        let sequence = Sequence::new(
            "gappy",
            vec![
                SequenceStep {
                    order: 1,
                    delay_secs: 0,
                    subject: String::new(),
                    body: String::new(),
                },
                SequenceStep {
                    order: 5,
                    delay_secs: 60,
                    subject: String::new(),
                    body: String::new(),
                },
            ],
        );
        let enrollment = Enrollment::new(sequence.id, RecipientId::generate(), t0(), t0());

        let advanced = advance_after_send(enrollment, &sequence, 1, t0());
        assert_eq!(advanced.current_step, 5);
    }
}
