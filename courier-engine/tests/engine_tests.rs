//! Integration tests driving the delivery core end to end over the
//! in-memory store and the mock transport.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use courier_common::{EmailAddress, EventId};
use courier_engine::{
    Engine, EngineConfig, EngineError, EventKind, MockTransport, ProviderEvent, StepOutcome,
};
use courier_store::{
    Campaign, CampaignStatus, EnrollmentStatus, MemoryStore, Recipient, SendOrigin, SendRecord,
    Sequence, SequenceStep, Store, SuppressionReason,
};

fn addr(s: &str) -> EmailAddress {
    EmailAddress::parse(s).expect("valid test address")
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

struct Harness {
    store: Arc<MemoryStore>,
    transport: Arc<MockTransport>,
    engine: Engine,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(MockTransport::new());
    let engine = Engine::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&transport) as Arc<dyn courier_engine::Transport>,
        EngineConfig::default(),
    );
    Harness {
        store,
        transport,
        engine,
    }
}

impl Harness {
    async fn add_recipient(&self, address: &str) -> Recipient {
        let recipient = Recipient::new(Some(addr(address)));
        self.store
            .insert_recipient(&recipient)
            .await
            .expect("insert recipient");
        recipient
    }

    async fn add_campaign(&self) -> Campaign {
        let campaign = Campaign::draft(
            "Quarterly review",
            "<p>Time to review your coverage.</p>",
            addr("agents@example.com"),
            None,
        );
        self.store
            .insert_campaign(&campaign)
            .await
            .expect("insert campaign");
        campaign
    }

    async fn add_two_step_sequence(&self) -> Sequence {
        let sequence = Sequence::new(
            "new-lead drip",
            vec![
                SequenceStep {
                    order: 1,
                    delay_secs: 0,
                    subject: "Welcome".into(),
                    body: "<p>Thanks for your interest.</p>".into(),
                },
                SequenceStep {
                    order: 2,
                    delay_secs: 3 * 86_400,
                    subject: "Checking in".into(),
                    body: "<p>Any questions?</p>".into(),
                },
            ],
        );
        self.store
            .insert_sequence(&sequence)
            .await
            .expect("insert sequence");
        sequence
    }
}

// --- campaign dispatcher ---

#[tokio::test]
async fn blast_excludes_suppressed_addresses_entirely() {
    let h = harness();
    let campaign = h.add_campaign().await;
    h.add_recipient("a@example.com").await;
    h.add_recipient("b@example.com").await;
    let suppressed = h.add_recipient("gone@example.com").await;

    h.engine
        .suppression
        .suppress(&addr("gone@example.com"), SuppressionReason::Unsubscribed, None)
        .await
        .expect("suppress");

    let report = h.engine.dispatcher.send(campaign.id).await.expect("send");

    assert_eq!(report.total_recipients, 2);
    assert_eq!(report.success_count, 2);
    assert_eq!(report.failure_count, 0);

    // The suppressed address has zero send records of any kind.
    let records = h.store.campaign_records(campaign.id).await.expect("records");
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.recipient_id != suppressed.id));
    assert!(records.iter().all(SendRecord::is_delivered));

    // The campaign flipped to sent exactly once.
    let sent = h.store.campaign(campaign.id).await.expect("campaign");
    assert_eq!(sent.status, CampaignStatus::Sent);
    assert!(sent.sent_at.is_some());
}

#[tokio::test]
async fn one_recipient_failure_never_aborts_the_batch() {
    let h = harness();
    let campaign = h.add_campaign().await;
    h.add_recipient("a@example.com").await;
    let failing = h.add_recipient("b@example.com").await;
    h.add_recipient("c@example.com").await;

    h.transport
        .fail_for(addr("b@example.com"), "450 mailbox busy");

    let report = h.engine.dispatcher.send(campaign.id).await.expect("send");

    assert_eq!(report.total_recipients, 3);
    assert_eq!(report.success_count, 2);
    assert_eq!(report.failure_count, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("450 mailbox busy"));

    let records = h.store.campaign_records(campaign.id).await.expect("records");
    let failed: Vec<_> = records.iter().filter(|r| r.bounced).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].recipient_id, failing.id);
    assert!(
        failed[0]
            .bounce_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("450 mailbox busy"))
    );

    // The campaign still completes.
    let sent = h.store.campaign(campaign.id).await.expect("campaign");
    assert_eq!(sent.status, CampaignStatus::Sent);
}

#[tokio::test]
async fn resend_of_a_sent_campaign_is_rejected() {
    let h = harness();
    let campaign = h.add_campaign().await;
    h.add_recipient("a@example.com").await;

    h.engine.dispatcher.send(campaign.id).await.expect("send");
    let second = h.engine.dispatcher.send(campaign.id).await;

    assert!(matches!(second, Err(EngineError::InvalidState(_))));
    // No extra provider traffic from the rejected attempt.
    assert_eq!(h.transport.sent_count(), 1);
}

#[tokio::test]
async fn fully_suppressed_candidate_set_keeps_campaign_in_draft() {
    let h = harness();
    let campaign = h.add_campaign().await;
    h.add_recipient("a@example.com").await;
    h.engine
        .suppression
        .suppress(&addr("a@example.com"), SuppressionReason::Bounced, None)
        .await
        .expect("suppress");

    let result = h.engine.dispatcher.send(campaign.id).await;
    assert!(matches!(result, Err(EngineError::NoEligibleRecipients)));

    let unchanged = h.store.campaign(campaign.id).await.expect("campaign");
    assert_eq!(unchanged.status, CampaignStatus::Draft);
    assert_eq!(h.transport.sent_count(), 0);
}

#[tokio::test]
async fn crash_retry_skips_already_delivered_recipients() {
    let h = harness();
    let campaign = h.add_campaign().await;
    let delivered = h.add_recipient("a@example.com").await;
    h.add_recipient("b@example.com").await;

    // Simulate a crashed earlier run: recipient A already has a delivered
    // record but the campaign never flipped to sent.
    let prior = SendRecord::delivered(
        SendOrigin::Campaign(campaign.id),
        delivered.id,
        addr("a@example.com"),
        courier_common::ProviderMessageId::new("pm-prior"),
        t0(),
    );
    h.store.append_send_record(&prior).await.expect("prior record");

    let report = h.engine.dispatcher.send(campaign.id).await.expect("retry run");

    assert_eq!(report.total_recipients, 2);
    assert_eq!(report.success_count, 2, "prior delivery counts as success");
    assert_eq!(report.failure_count, 0);

    // Recipient A got no second message; only B went over the wire.
    let outbound = h.transport.sent();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].to, addr("b@example.com"));

    // Still at most one delivered record for the (campaign, recipient) pair.
    let records = h.store.campaign_records(campaign.id).await.expect("records");
    let for_a: Vec<_> = records
        .iter()
        .filter(|r| r.recipient_id == delivered.id && r.is_delivered())
        .collect();
    assert_eq!(for_a.len(), 1);
}

#[tokio::test]
async fn unknown_campaign_is_not_found() {
    let h = harness();
    let result = h
        .engine
        .dispatcher
        .send(courier_common::CampaignId::generate())
        .await;
    assert!(matches!(result, Err(EngineError::NotFound { .. })));
}

// --- sequence scheduler ---

#[tokio::test]
async fn two_step_drip_progression() {
    let h = harness();
    let sequence = h.add_two_step_sequence().await;
    let recipient = h.add_recipient("lead@example.com").await;

    let enrollment_ids = h
        .engine
        .scheduler
        .enroll_at(sequence.id, &[recipient.id], t0())
        .await
        .expect("enroll");
    assert_eq!(enrollment_ids.len(), 1);
    let enrollment_id = enrollment_ids[0];

    // Step 1 has zero delay: due immediately.
    let first = h
        .engine
        .scheduler
        .process_due_at(t0())
        .await
        .expect("first tick");
    assert_eq!((first.processed, first.sent, first.skipped), (1, 1, 0));

    let after_first = h.store.enrollment(enrollment_id).await.expect("enrollment");
    assert_eq!(after_first.status, EnrollmentStatus::Active);
    assert_eq!(after_first.current_step, 2);
    assert_eq!(after_first.next_due_at, Some(t0() + Duration::days(3)));

    // One day in: nothing due.
    let early = h
        .engine
        .scheduler
        .process_due_at(t0() + Duration::days(1))
        .await
        .expect("early tick");
    assert_eq!((early.processed, early.sent, early.skipped), (0, 0, 0));
    let unchanged = h.store.enrollment(enrollment_id).await.expect("enrollment");
    assert_eq!(unchanged.current_step, 2);
    assert_eq!(unchanged.status, EnrollmentStatus::Active);

    // Four days in: step 2 fires and the enrollment completes.
    let second = h
        .engine
        .scheduler
        .process_due_at(t0() + Duration::days(4))
        .await
        .expect("second tick");
    assert_eq!((second.processed, second.sent, second.skipped), (1, 1, 0));

    let done = h.store.enrollment(enrollment_id).await.expect("enrollment");
    assert_eq!(done.status, EnrollmentStatus::Completed);
    assert_eq!(done.next_due_at, None);

    // Completed only after a record exists for every step.
    let records = h.store.enrollment_records(enrollment_id).await.expect("records");
    let mut orders: Vec<u32> = records
        .iter()
        .map(|record| match record.origin {
            SendOrigin::Step { step_order, .. } => step_order,
            SendOrigin::Campaign(_) => unreachable!("sequence records only"),
        })
        .collect();
    orders.sort_unstable();
    assert_eq!(orders, vec![1, 2]);
    assert_eq!(h.transport.sent_count(), 2);
}

#[tokio::test]
async fn a_step_is_never_sent_twice_for_one_enrollment() {
    let h = harness();
    let sequence = h.add_two_step_sequence().await;
    let recipient = h.add_recipient("lead@example.com").await;
    let enrollment_id = h
        .engine
        .scheduler
        .enroll_at(sequence.id, &[recipient.id], t0())
        .await
        .expect("enroll")[0];

    let first = h
        .engine
        .scheduler
        .send_step_at(enrollment_id, 1, t0())
        .await
        .expect("manual send");
    assert_eq!(first, StepOutcome::Sent);

    // The replay is a success-no-op, not a second send.
    let replay = h
        .engine
        .scheduler
        .send_step_at(enrollment_id, 1, t0())
        .await
        .expect("replayed send");
    assert_eq!(replay, StepOutcome::AlreadySent);

    let records = h.store.enrollment_records(enrollment_id).await.expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(h.transport.sent_count(), 1);
}

#[tokio::test]
async fn overlapping_due_processing_cannot_double_send() {
    let h = harness();
    let sequence = h.add_two_step_sequence().await;
    let recipient = h.add_recipient("lead@example.com").await;
    let enrollment_id = h
        .engine
        .scheduler
        .enroll_at(sequence.id, &[recipient.id], t0())
        .await
        .expect("enroll")[0];

    // Two scheduler ticks race over the same due set.
    let (a, b) = tokio::join!(
        h.engine.scheduler.process_due_at(t0()),
        h.engine.scheduler.process_due_at(t0()),
    );
    let a = a.expect("tick a");
    let b = b.expect("tick b");

    // Whichever interleaving happened, exactly one attempt exists.
    assert_eq!(a.sent + b.sent, 1, "exactly one tick sent the step");
    let records = h.store.enrollment_records(enrollment_id).await.expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(h.transport.sent_count(), 1);
}

#[tokio::test]
async fn suppressed_recipient_stops_the_enrollment() {
    let h = harness();
    let sequence = h.add_two_step_sequence().await;
    let recipient = h.add_recipient("lead@example.com").await;
    let enrollment_id = h
        .engine
        .scheduler
        .enroll_at(sequence.id, &[recipient.id], t0())
        .await
        .expect("enroll")[0];

    // The lead unsubscribes after enrollment but before the first step.
    h.engine
        .suppression
        .suppress(&addr("lead@example.com"), SuppressionReason::Unsubscribed, None)
        .await
        .expect("suppress");

    let report = h.engine.scheduler.process_due_at(t0()).await.expect("tick");
    assert_eq!((report.processed, report.sent, report.skipped), (1, 0, 1));

    // The enrollment must not linger active forever.
    let stopped = h.store.enrollment(enrollment_id).await.expect("enrollment");
    assert_eq!(stopped.status, EnrollmentStatus::Stopped);
    assert_eq!(stopped.next_due_at, None);
    assert!(h.store.enrollment_records(enrollment_id).await.expect("records").is_empty());

    // And the due scan no longer returns it.
    let next = h
        .engine
        .scheduler
        .process_due_at(t0() + Duration::days(30))
        .await
        .expect("later tick");
    assert_eq!(next.processed, 0);
}

#[tokio::test]
async fn transport_failure_records_the_attempt_and_advances() {
    let h = harness();
    let sequence = h.add_two_step_sequence().await;
    let recipient = h.add_recipient("lead@example.com").await;
    h.transport.fail_for(addr("lead@example.com"), "timeout");
    let enrollment_id = h
        .engine
        .scheduler
        .enroll_at(sequence.id, &[recipient.id], t0())
        .await
        .expect("enroll")[0];

    let report = h.engine.scheduler.process_due_at(t0()).await.expect("tick");
    assert_eq!(report.sent, 1, "attempted steps count as sent");

    let records = h.store.enrollment_records(enrollment_id).await.expect("records");
    assert_eq!(records.len(), 1);
    assert!(records[0].bounced);

    // The step's uniqueness slot is taken; the enrollment moved on.
    let enrollment = h.store.enrollment(enrollment_id).await.expect("enrollment");
    assert_eq!(enrollment.current_step, 2);
}

#[tokio::test]
async fn enroll_rejects_recipients_without_an_address() {
    let h = harness();
    let sequence = h.add_two_step_sequence().await;
    let bare = Recipient::new(None);
    h.store.insert_recipient(&bare).await.expect("insert");

    let result = h
        .engine
        .scheduler
        .enroll_at(sequence.id, &[bare.id], t0())
        .await;
    assert!(matches!(result, Err(EngineError::InvalidState(_))));
}

#[tokio::test]
async fn re_enrollment_requires_a_terminal_prior_enrollment() {
    let h = harness();
    let sequence = h.add_two_step_sequence().await;
    let recipient = h.add_recipient("lead@example.com").await;

    let first = h
        .engine
        .scheduler
        .enroll_at(sequence.id, &[recipient.id], t0())
        .await
        .expect("enroll")[0];

    let again = h
        .engine
        .scheduler
        .enroll_at(sequence.id, &[recipient.id], t0())
        .await;
    assert!(matches!(again, Err(EngineError::InvalidState(_))));

    // After an operator stop, re-enrollment is allowed.
    h.engine.scheduler.stop(first).await.expect("stop");
    h.engine
        .scheduler
        .enroll_at(sequence.id, &[recipient.id], t0() + Duration::days(1))
        .await
        .expect("re-enroll");
}

#[tokio::test]
async fn stopping_a_terminal_enrollment_is_invalid() {
    let h = harness();
    let sequence = h.add_two_step_sequence().await;
    let recipient = h.add_recipient("lead@example.com").await;
    let enrollment_id = h
        .engine
        .scheduler
        .enroll_at(sequence.id, &[recipient.id], t0())
        .await
        .expect("enroll")[0];

    h.engine.scheduler.stop(enrollment_id).await.expect("stop");
    let again = h.engine.scheduler.stop(enrollment_id).await;
    assert!(matches!(again, Err(EngineError::InvalidState(_))));
}

#[tokio::test]
async fn manual_send_of_a_non_current_step_does_not_advance() {
    let h = harness();
    let sequence = h.add_two_step_sequence().await;
    let recipient = h.add_recipient("lead@example.com").await;
    let enrollment_id = h
        .engine
        .scheduler
        .enroll_at(sequence.id, &[recipient.id], t0())
        .await
        .expect("enroll")[0];

    // Operator fires step 2 ahead of time.
    let outcome = h
        .engine
        .scheduler
        .send_step_at(enrollment_id, 2, t0())
        .await
        .expect("manual send");
    assert_eq!(outcome, StepOutcome::Sent);

    let enrollment = h.store.enrollment(enrollment_id).await.expect("enrollment");
    assert_eq!(enrollment.current_step, 1, "state machine kept its position");
}

// --- event ingestion and suppression feedback ---

#[tokio::test]
async fn bounce_event_suppresses_and_future_blasts_exclude_the_address() {
    let h = harness();
    let campaign = h.add_campaign().await;
    let bouncer = h.add_recipient("bouncy@example.com").await;
    h.add_recipient("solid@example.com").await;

    h.engine.dispatcher.send(campaign.id).await.expect("send");

    let records = h.store.campaign_records(campaign.id).await.expect("records");
    let bounced_record = records
        .iter()
        .find(|r| r.recipient_id == bouncer.id)
        .expect("record for bouncer");
    let message_id = bounced_record
        .provider_message_id
        .clone()
        .expect("delivered record has message id");

    h.engine
        .ingestor
        .ingest(ProviderEvent {
            id: EventId::generate(),
            provider_message_id: Some(message_id),
            kind: EventKind::Bounce,
            address: addr("bouncy@example.com"),
            occurred_at: t0() + Duration::hours(1),
            detail: Some("550 user unknown".into()),
        })
        .await
        .expect("ingest bounce");

    // The record was annotated, not rewritten.
    let records = h.store.campaign_records(campaign.id).await.expect("records");
    let annotated = records
        .iter()
        .find(|r| r.recipient_id == bouncer.id)
        .expect("record for bouncer");
    assert!(annotated.bounced);
    assert_eq!(annotated.bounce_reason.as_deref(), Some("550 user unknown"));

    // The suppression entry exists with reason bounced.
    let entries = h
        .engine
        .suppression
        .entries(&addr("bouncy@example.com"))
        .await
        .expect("entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, SuppressionReason::Bounced);

    // A later blast excludes the bounced address.
    let next_campaign = h.add_campaign().await;
    let report = h
        .engine
        .dispatcher
        .send(next_campaign.id)
        .await
        .expect("second blast");
    assert_eq!(report.total_recipients, 1);
    let next_records = h
        .store
        .campaign_records(next_campaign.id)
        .await
        .expect("records");
    assert!(next_records.iter().all(|r| r.recipient_id != bouncer.id));
}

#[tokio::test]
async fn unsubscribe_without_a_matching_record_still_suppresses() {
    let h = harness();

    h.engine
        .ingestor
        .ingest(ProviderEvent {
            id: EventId::generate(),
            provider_message_id: None,
            kind: EventKind::Unsubscribe,
            address: addr("form@example.com"),
            occurred_at: t0(),
            detail: None,
        })
        .await
        .expect("ingest unsubscribe");

    assert!(
        h.engine
            .suppression
            .is_suppressed(&addr("form@example.com"))
            .await
            .expect("check")
    );
    let entries = h
        .engine
        .suppression
        .entries(&addr("form@example.com"))
        .await
        .expect("entries");
    assert_eq!(entries[0].reason, SuppressionReason::Unsubscribed);
}

#[tokio::test]
async fn open_and_click_annotate_first_seen_timestamps() {
    let h = harness();
    let campaign = h.add_campaign().await;
    h.add_recipient("reader@example.com").await;
    h.engine.dispatcher.send(campaign.id).await.expect("send");

    let record = h.store.campaign_records(campaign.id).await.expect("records")[0].clone();
    let message_id = record.provider_message_id.expect("message id");

    for (kind, at) in [
        (EventKind::Open, t0() + Duration::hours(1)),
        (EventKind::Click, t0() + Duration::hours(2)),
        // Replayed open must not move the first-seen timestamp.
        (EventKind::Open, t0() + Duration::hours(3)),
    ] {
        h.engine
            .ingestor
            .ingest(ProviderEvent {
                id: EventId::generate(),
                provider_message_id: Some(message_id.clone()),
                kind,
                address: addr("reader@example.com"),
                occurred_at: at,
                detail: None,
            })
            .await
            .expect("ingest");
    }

    let annotated = h.store.campaign_records(campaign.id).await.expect("records")[0].clone();
    assert_eq!(annotated.opened_at, Some(t0() + Duration::hours(1)));
    assert_eq!(annotated.clicked_at, Some(t0() + Duration::hours(2)));
    assert!(annotated.is_delivered(), "opens do not change delivery state");
}

#[tokio::test]
async fn events_for_unknown_message_ids_are_dropped_quietly() {
    let h = harness();

    let result = h
        .engine
        .ingestor
        .ingest(ProviderEvent {
            id: EventId::generate(),
            provider_message_id: Some(courier_common::ProviderMessageId::new("never-sent")),
            kind: EventKind::Bounce,
            address: addr("ghost@example.com"),
            occurred_at: t0(),
            detail: None,
        })
        .await;

    assert!(result.is_ok(), "unknown ids are logged and dropped, not fatal");
    assert!(
        !h.engine
            .suppression
            .is_suppressed(&addr("ghost@example.com"))
            .await
            .expect("check")
    );
}

// --- aggregate counters ---

#[tokio::test]
async fn campaign_stats_are_derived_from_the_audit_trail() {
    let h = harness();
    let campaign = h.add_campaign().await;
    h.add_recipient("a@example.com").await;
    h.add_recipient("b@example.com").await;
    h.transport.fail_for(addr("b@example.com"), "rejected");

    h.engine.dispatcher.send(campaign.id).await.expect("send");

    let record = h
        .store
        .campaign_records(campaign.id)
        .await
        .expect("records")
        .into_iter()
        .find(SendRecord::is_delivered)
        .expect("delivered record");
    h.engine
        .ingestor
        .ingest(ProviderEvent {
            id: EventId::generate(),
            provider_message_id: record.provider_message_id.clone(),
            kind: EventKind::Open,
            address: record.address.clone(),
            occurred_at: t0(),
            detail: None,
        })
        .await
        .expect("ingest open");

    let stats = h
        .engine
        .recorder
        .campaign_stats(campaign.id)
        .await
        .expect("stats");
    assert_eq!(stats.attempted, 2);
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.bounced, 1);
    assert_eq!(stats.opened, 1);
    assert_eq!(stats.clicked, 0);
}

#[tokio::test]
async fn sequence_stats_cover_all_enrollments() {
    let h = harness();
    let sequence = h.add_two_step_sequence().await;
    let first = h.add_recipient("one@example.com").await;
    let second = h.add_recipient("two@example.com").await;

    h.engine
        .scheduler
        .enroll_at(sequence.id, &[first.id, second.id], t0())
        .await
        .expect("enroll");

    // Two ticks, one due enrollment each (bounded batch of one).
    for _ in 0..2 {
        h.engine.scheduler.process_due_at(t0()).await.expect("tick");
    }

    let stats = h
        .engine
        .recorder
        .sequence_stats(sequence.id)
        .await
        .expect("stats");
    assert_eq!(stats.enrollments, 2);
    assert_eq!(stats.attempted, 2);
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.bounced, 0);
}
