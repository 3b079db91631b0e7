use uuid::Uuid;

use skyfare_bookings::domain::repository::Clock;
use skyfare_bookings::error::BookingsServiceError;
use skyfare_bookings::usecase::reconciliation::EventOutcome;
use skyfare_domain::actor::ActorType;
use skyfare_domain::booking::BookingStatus;
use skyfare_domain::ledger::{LedgerEntryType, LedgerTotals};
use skyfare_testing::webhook::{
    TEST_WEBHOOK_SECRET, charge_refunded, checkout_completed, checkout_expired, event,
    payment_failed, payment_succeeded, sign_payload,
};

use crate::helpers::{
    FixedClock, MAX_RETRIES, MemoryStore, deliver, intent_id_for, paid_for_booking, processor,
    test_booking,
};

fn totals(store: &MemoryStore, booking_id: Uuid) -> LedgerTotals {
    LedgerTotals::from_entries(
        store
            .ledger_of(booking_id)
            .into_iter()
            .map(|e| (e.entry_type, e.amount)),
    )
}

// ── payment_intent.succeeded ─────────────────────────────────────────────────

#[tokio::test]
async fn should_confirm_pending_booking_and_record_charge() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    let receipt = deliver(&processor, &clock, &payment_succeeded("evt_1", &pi, 12_000))
        .await
        .unwrap();

    assert!(receipt.received);
    assert!(!receipt.duplicate);
    assert_eq!(receipt.event_id, "evt_1");
    assert_eq!(store.booking(booking.id).status, BookingStatus::Confirmed);

    let ledger = store.ledger_of(booking.id);
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].entry_type, LedgerEntryType::Charge);
    assert_eq!(ledger[0].amount, 12_000);
    assert_eq!(ledger[0].currency, "USD");
    assert_eq!(ledger[0].charge_id.as_deref(), Some(format!("ch_{pi}").as_str()));

    let history = store.history_of(booking.id);
    let statuses: Vec<_> = history.iter().map(|r| r.new_status).collect();
    assert_eq!(statuses, vec![BookingStatus::Paid, BookingStatus::Confirmed]);
    assert!(
        history
            .iter()
            .all(|r| r.actor.kind == ActorType::PaymentGateway
                && r.actor.id.as_deref() == Some("evt_1"))
    );

    let stored = store.event("evt_1").unwrap();
    assert!(stored.processed);
    assert!(stored.processed_at.is_some());
}

#[tokio::test]
async fn should_walk_initiated_booking_through_pending_and_paid() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Initiated);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_succeeded("evt_1", &pi, 12_000))
        .await
        .unwrap();

    let statuses: Vec<_> = store
        .history_of(booking.id)
        .iter()
        .map(|r| r.new_status)
        .collect();
    assert_eq!(
        statuses,
        vec![
            BookingStatus::Pending,
            BookingStatus::Paid,
            BookingStatus::Confirmed
        ]
    );
    assert_eq!(store.ledger_of(booking.id).len(), 1);
}

#[tokio::test]
async fn should_acknowledge_duplicate_delivery_without_side_effects() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);
    let payload = payment_succeeded("evt_1", &pi, 12_000);

    deliver(&processor, &clock, &payload).await.unwrap();
    let history_len = store.history_of(booking.id).len();

    for _ in 0..3 {
        let receipt = deliver(&processor, &clock, &payload).await.unwrap();
        assert!(receipt.duplicate);
    }

    assert_eq!(store.ledger_of(booking.id).len(), 1);
    assert_eq!(store.history_of(booking.id).len(), history_len);
    assert_eq!(store.event_count(), 1);
}

#[tokio::test]
async fn should_record_charge_for_cancelled_booking_without_confirming() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Cancelled);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_succeeded("evt_1", &pi, 12_000))
        .await
        .unwrap();

    assert_eq!(store.booking(booking.id).status, BookingStatus::Cancelled);
    let ledger = store.ledger_of(booking.id);
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].entry_type, LedgerEntryType::Charge);

    let history = store.history_of(booking.id);
    assert_eq!(history.len(), 1);
    assert!(!history[0].is_valid_transition);
    assert_eq!(history[0].new_status, BookingStatus::Confirmed);
}

// ── payment_intent.payment_failed ────────────────────────────────────────────

#[tokio::test]
async fn should_mark_pending_booking_payment_failed() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_failed("evt_1", &pi, "card declined"))
        .await
        .unwrap();

    assert_eq!(store.booking(booking.id).status, BookingStatus::PaymentFailed);
    let history = store.history_of(booking.id);
    assert_eq!(history[0].reason.as_deref(), Some("card declined"));
    assert!(store.ledger_of(booking.id).is_empty());
}

#[tokio::test]
async fn should_ignore_failure_arriving_after_success() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_succeeded("evt_ok", &pi, 12_000))
        .await
        .unwrap();
    let receipt = deliver(&processor, &clock, &payment_failed("evt_late", &pi, "declined"))
        .await
        .unwrap();

    assert!(!receipt.duplicate);
    assert_eq!(store.booking(booking.id).status, BookingStatus::Confirmed);
    assert!(store.event("evt_late").unwrap().processed);
    let rejected: Vec<_> = store
        .history_of(booking.id)
        .into_iter()
        .filter(|r| !r.is_valid_transition)
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].new_status, BookingStatus::PaymentFailed);
}

#[tokio::test]
async fn should_confirm_when_success_arrives_after_failure() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_failed("evt_fail", &pi, "declined"))
        .await
        .unwrap();
    deliver(&processor, &clock, &payment_succeeded("evt_ok", &pi, 12_000))
        .await
        .unwrap();

    assert_eq!(store.booking(booking.id).status, BookingStatus::Confirmed);
    assert_eq!(totals(&store, booking.id).charged, 12_000);
}

// ── charge.refunded ──────────────────────────────────────────────────────────

#[tokio::test]
async fn should_keep_status_on_partial_refund_and_refund_remainder() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_succeeded("evt_pay", &pi, 12_000))
        .await
        .unwrap();
    deliver(&processor, &clock, &charge_refunded("evt_r1", &pi, 12_000, &[("re_1", 2_000)]))
        .await
        .unwrap();

    assert_eq!(store.booking(booking.id).status, BookingStatus::Confirmed);
    let ledger = store.ledger_of(booking.id);
    let partial = ledger
        .iter()
        .find(|e| e.entry_type == LedgerEntryType::PartialRefund)
        .unwrap();
    assert_eq!(partial.amount, 2_000);
    assert_eq!(partial.refund_id.as_deref(), Some("re_1"));

    let full = charge_refunded("evt_r2", &pi, 12_000, &[("re_2", 10_000), ("re_1", 2_000)]);
    deliver(&processor, &clock, &full).await.unwrap();

    assert_eq!(store.booking(booking.id).status, BookingStatus::Refunded);
    let refund = store
        .ledger_of(booking.id)
        .into_iter()
        .find(|e| e.entry_type == LedgerEntryType::Refund)
        .unwrap();
    assert_eq!(refund.amount, 10_000);
    assert_eq!(
        totals(&store, booking.id),
        LedgerTotals {
            charged: 12_000,
            refunded: 12_000,
            net: 0
        }
    );
}

#[tokio::test]
async fn should_not_double_count_refund_reported_twice() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_succeeded("evt_pay", &pi, 12_000))
        .await
        .unwrap();
    deliver(&processor, &clock, &charge_refunded("evt_r1", &pi, 12_000, &[("re_1", 3_000)]))
        .await
        .unwrap();
    // A second notification listing the same refund adds nothing.
    let result = deliver(
        &processor,
        &clock,
        &charge_refunded("evt_r1b", &pi, 12_000, &[("re_1", 3_000)]),
    )
    .await;
    assert!(result.is_ok(), "expected stale refund accepted, got {result:?}");

    assert_eq!(totals(&store, booking.id).refunded, 3_000);
    assert!(store.event("evt_r1b").unwrap().processed);
}

#[tokio::test]
async fn should_count_each_refund_once_when_refund_events_race() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_succeeded("evt_pay", &pi, 12_000))
        .await
        .unwrap();
    store.interleave_writes(true);

    let first = charge_refunded("evt_r1", &pi, 12_000, &[("re_1", 3_000)]);
    let second = charge_refunded("evt_r2", &pi, 12_000, &[("re_2", 2_000), ("re_1", 3_000)]);
    let (a, b) = tokio::join!(
        deliver(&processor, &clock, &first),
        deliver(&processor, &clock, &second)
    );
    assert!(a.is_ok(), "expected first refund accepted, got {a:?}");
    assert!(b.is_ok(), "expected second refund accepted, got {b:?}");

    // The provider has refunded 5_000 in total across two refunds.
    assert_eq!(
        totals(&store, booking.id),
        LedgerTotals {
            charged: 12_000,
            refunded: 5_000,
            net: 7_000
        }
    );
    let mut refund_ids: Vec<_> = store
        .ledger_of(booking.id)
        .into_iter()
        .filter_map(|e| e.refund_id)
        .collect();
    refund_ids.sort();
    assert_eq!(refund_ids, vec!["re_1".to_owned(), "re_2".to_owned()]);
    assert_eq!(store.booking(booking.id).status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn should_refund_in_full_when_partial_and_final_refund_events_race() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_succeeded("evt_pay", &pi, 12_000))
        .await
        .unwrap();
    store.interleave_writes(true);

    let partial = charge_refunded("evt_r1", &pi, 12_000, &[("re_1", 3_000)]);
    let rest = charge_refunded("evt_r2", &pi, 12_000, &[("re_2", 9_000), ("re_1", 3_000)]);
    let (a, b) = tokio::join!(
        deliver(&processor, &clock, &rest),
        deliver(&processor, &clock, &partial)
    );
    assert!(a.is_ok(), "expected final refund accepted, got {a:?}");
    assert!(b.is_ok(), "expected partial refund accepted, got {b:?}");

    assert_eq!(store.booking(booking.id).status, BookingStatus::Refunded);
    assert_eq!(totals(&store, booking.id).net, 0);
    let ledger = store.ledger_of(booking.id);
    let final_refund = ledger
        .iter()
        .find(|e| e.refund_id.as_deref() == Some("re_2"))
        .unwrap();
    assert_eq!(final_refund.entry_type, LedgerEntryType::Refund);
    let first_refund = ledger
        .iter()
        .find(|e| e.refund_id.as_deref() == Some("re_1"))
        .unwrap();
    assert_eq!(first_refund.entry_type, LedgerEntryType::PartialRefund);
}

#[tokio::test]
async fn should_apply_refund_events_delivered_out_of_order() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_succeeded("evt_pay", &pi, 12_000))
        .await
        .unwrap();
    let later = charge_refunded("evt_r2", &pi, 12_000, &[("re_2", 2_000), ("re_1", 3_000)]);
    deliver(&processor, &clock, &later).await.unwrap();
    let earlier = charge_refunded("evt_r1", &pi, 12_000, &[("re_1", 3_000)]);
    deliver(&processor, &clock, &earlier).await.unwrap();

    assert_eq!(totals(&store, booking.id).refunded, 5_000);
    assert_eq!(store.ledger_of(booking.id).len(), 3);
    assert!(store.event("evt_r1").unwrap().processed);
}

#[tokio::test]
async fn should_ignore_failed_refunds_listed_on_charge() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_succeeded("evt_pay", &pi, 12_000))
        .await
        .unwrap();
    let mut payload = charge_refunded("evt_r1", &pi, 12_000, &[("re_2", 4_000), ("re_1", 1_000)]);
    payload["data"]["object"]["refunds"]["data"][0]["status"] = "failed".into();
    payload["data"]["object"]["amount_refunded"] = 1_000.into();
    deliver(&processor, &clock, &payload).await.unwrap();

    assert_eq!(totals(&store, booking.id).refunded, 1_000);
    assert_eq!(store.booking(booking.id).status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn should_fail_refund_event_without_refund_details() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    let mut payload = charge_refunded("evt_r1", &pi, 12_000, &[]);
    payload["data"]["object"]["amount_refunded"] = 3_000.into();
    let result = deliver(&processor, &clock, &payload).await;

    assert!(
        matches!(result, Err(BookingsServiceError::EventProcessingFailed { .. })),
        "expected EventProcessingFailed, got {result:?}"
    );
    assert!(store.ledger_of(booking.id).is_empty());
    assert!(!store.event("evt_r1").unwrap().processed);
}

#[tokio::test]
async fn should_record_refund_for_booking_that_cannot_be_refunded() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    // Refund delivered before the payment success.
    deliver(&processor, &clock, &charge_refunded("evt_r1", &pi, 12_000, &[("re_1", 12_000)]))
        .await
        .unwrap();

    assert_eq!(store.booking(booking.id).status, BookingStatus::Pending);
    assert_eq!(totals(&store, booking.id).refunded, 12_000);
    let history = store.history_of(booking.id);
    assert_eq!(history.len(), 1);
    assert!(!history[0].is_valid_transition);
}

// ── checkout.session.* ───────────────────────────────────────────────────────

#[tokio::test]
async fn should_attach_checkout_session_and_move_to_pending() {
    let booking = test_booking(Uuid::new_v4(), BookingStatus::Initiated);
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);
    let pi = intent_id_for(booking.id);

    deliver(
        &processor,
        &clock,
        &checkout_completed("evt_cs", "cs_1", &booking.id.to_string(), &pi),
    )
    .await
    .unwrap();

    let stored = store.booking(booking.id);
    assert_eq!(stored.status, BookingStatus::Pending);
    assert_eq!(stored.payment_intent_id.as_deref(), Some(pi.as_str()));
    assert_eq!(stored.checkout_session_id.as_deref(), Some("cs_1"));

    // The attached intent now routes payment notifications to the booking.
    deliver(&processor, &clock, &payment_succeeded("evt_pay", &pi, 12_000))
        .await
        .unwrap();
    assert_eq!(store.booking(booking.id).status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn should_expire_pending_booking_when_checkout_expires() {
    let booking = test_booking(Uuid::new_v4(), BookingStatus::Pending);
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(
        &processor,
        &clock,
        &checkout_expired("evt_exp", "cs_1", &booking.id.to_string()),
    )
    .await
    .unwrap();

    assert_eq!(store.booking(booking.id).status, BookingStatus::Expired);
}

#[tokio::test]
async fn should_ignore_checkout_expiry_for_confirmed_booking() {
    let booking = test_booking(Uuid::new_v4(), BookingStatus::Confirmed);
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(
        &processor,
        &clock,
        &checkout_expired("evt_exp", "cs_1", &booking.id.to_string()),
    )
    .await
    .unwrap();

    assert_eq!(store.booking(booking.id).status, BookingStatus::Confirmed);
    assert!(store.event("evt_exp").unwrap().processed);
    assert!(store.history_of(booking.id).is_empty());
}

// ── envelope handling ────────────────────────────────────────────────────────

#[tokio::test]
async fn should_mark_unknown_event_type_processed() {
    let store = MemoryStore::new();
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    let receipt = deliver(
        &processor,
        &clock,
        &event("evt_x", "customer.created", serde_json::json!({ "id": "cus_1" })),
    )
    .await
    .unwrap();

    assert!(!receipt.duplicate);
    let stored = store.event("evt_x").unwrap();
    assert!(stored.processed);
    assert_eq!(stored.event_type, "customer.created");
}

#[tokio::test]
async fn should_reject_bad_signature_without_recording() {
    let store = MemoryStore::new();
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);
    let body = serde_json::to_vec(&payment_succeeded("evt_1", "pi_1", 100)).unwrap();

    let forged = sign_payload(&body, "whsec_wrong", clock.now().timestamp());
    let stale = sign_payload(&body, TEST_WEBHOOK_SECRET, clock.now().timestamp() - 3_600);
    let far_past = format!("t={},v1=00", i64::MIN);
    for signature in [
        Some(forged.as_str()),
        Some(stale.as_str()),
        Some(far_past.as_str()),
        None,
    ] {
        let result = processor.handle_webhook(&body, signature).await;
        assert!(
            matches!(result, Err(BookingsServiceError::InvalidSignature)),
            "expected InvalidSignature, got {result:?}"
        );
    }
    assert_eq!(store.event_count(), 0);
}

#[tokio::test]
async fn should_reject_signed_body_that_is_not_an_event() {
    let store = MemoryStore::new();
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);
    let body = b"{\"hello\":\"world\"}";
    let signature = sign_payload(body, TEST_WEBHOOK_SECRET, clock.now().timestamp());

    let result = processor.handle_webhook(body, Some(&signature)).await;
    assert!(
        matches!(result, Err(BookingsServiceError::InvalidPayload(_))),
        "expected InvalidPayload, got {result:?}"
    );
    assert!(!result.unwrap_err().is_retryable());
}

// ── failures and retries ─────────────────────────────────────────────────────

#[tokio::test]
async fn should_keep_failed_event_for_retry_and_recover_in_sweep() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::new();
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    // Notification races ahead of the booking row.
    let result = deliver(&processor, &clock, &payment_succeeded("evt_1", &pi, 12_000)).await;
    match &result {
        Err(e @ BookingsServiceError::EventProcessingFailed { event_id, .. }) => {
            assert_eq!(event_id, "evt_1");
            assert!(e.is_retryable());
        }
        other => panic!("expected EventProcessingFailed, got {other:?}"),
    }
    let stored = store.event("evt_1").unwrap();
    assert!(!stored.processed);
    assert_eq!(stored.retry_count, 1);
    assert!(stored.processing_error.is_some());

    store.put_booking(booking.clone());
    let summary = processor.retry_unprocessed_events().await.unwrap();

    assert_eq!(summary.scanned, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);
    assert!(store.event("evt_1").unwrap().processed);
    assert_eq!(store.booking(booking.id).status, BookingStatus::Confirmed);
    assert_eq!(store.ledger_of(booking.id).len(), 1);
}

#[tokio::test]
async fn should_reprocess_redelivered_unprocessed_event() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::new();
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);
    let payload = payment_succeeded("evt_1", &pi, 12_000);

    assert!(deliver(&processor, &clock, &payload).await.is_err());
    store.put_booking(booking.clone());

    let receipt = deliver(&processor, &clock, &payload).await.unwrap();
    assert!(!receipt.duplicate);
    assert_eq!(store.booking(booking.id).status, BookingStatus::Confirmed);
    assert_eq!(store.event_count(), 1);
}

#[tokio::test]
async fn should_stop_retrying_at_retry_cap() {
    let store = MemoryStore::new();
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    // No booking ever owns this intent.
    let _ = deliver(&processor, &clock, &payment_succeeded("evt_1", "pi_orphan", 100)).await;
    for _ in 1..MAX_RETRIES {
        let summary = processor.retry_unprocessed_events().await.unwrap();
        assert_eq!(summary.failed, 1);
    }
    assert_eq!(store.event("evt_1").unwrap().retry_count, MAX_RETRIES);

    let summary = processor.retry_unprocessed_events().await.unwrap();
    assert_eq!(summary.scanned, 0);
    assert_eq!(summary.exhausted, 1);
    assert_eq!(store.event("evt_1").unwrap().retry_count, MAX_RETRIES);
}

#[tokio::test]
async fn should_process_event_once_under_concurrent_delivery() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);
    let payload = payment_succeeded("evt_1", &pi, 12_000);

    let (a, b) = tokio::join!(
        deliver(&processor, &clock, &payload),
        deliver(&processor, &clock, &payload)
    );

    assert!(a.is_ok() || b.is_ok(), "one delivery must succeed: {a:?} {b:?}");
    assert_eq!(store.ledger_of(booking.id).len(), 1);
    assert_eq!(store.booking(booking.id).status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn should_replay_outcome_when_recorded_event_is_processed_again() {
    let booking = paid_for_booking(Uuid::new_v4(), BookingStatus::Pending);
    let pi = booking.payment_intent_id.clone().unwrap();
    let store = MemoryStore::with_booking(booking.clone());
    let clock = FixedClock::new();
    let processor = processor(&store, &clock);

    deliver(&processor, &clock, &payment_succeeded("evt_1", &pi, 12_000))
        .await
        .unwrap();
    let recorded = store.event("evt_1").unwrap();
    let outcome = processor.process(&recorded).await;

    assert!(
        matches!(outcome, Ok(EventOutcome::Confirmed)),
        "expected replayed Confirmed, got {outcome:?}"
    );
    assert_eq!(store.ledger_of(booking.id).len(), 1);
    assert_eq!(store.history_of(booking.id).len(), 2);
}
