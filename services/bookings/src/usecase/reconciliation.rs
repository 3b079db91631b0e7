//! Payment-provider notification intake and reconciliation.
//!
//! Each notification is authenticated, recorded once by event id, then applied
//! to its booking inside the `provider_webhook` idempotency scope. Failures
//! leave the event unprocessed for the retry sweep.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use skyfare_domain::actor::Actor;
use skyfare_domain::booking::BookingStatus;
use skyfare_domain::idempotency::IdempotencyScope;
use skyfare_domain::ledger::LedgerEntryType;

use crate::domain::repository::{
    BookingRepository, Clock, IdempotencyRepository, LedgerRepository, ProviderEventRepository,
    TransitionLog,
};
use crate::domain::types::{Booking, LedgerEntry, ProviderEvent};
use crate::error::BookingsServiceError;
use crate::usecase::idempotency::{GuardKey, IdempotencyGuard};
use crate::usecase::signature::SignatureVerifier;
use crate::usecase::state_machine::{BookingStateMachine, TransitionOptions, TransitionOutcome};

pub const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const PAYMENT_FAILED: &str = "payment_intent.payment_failed";
pub const CHARGE_REFUNDED: &str = "charge.refunded";
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const CHECKOUT_EXPIRED: &str = "checkout.session.expired";

// ── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
}

#[derive(Deserialize)]
struct PaymentIntentObject {
    id: String,
    #[serde(default)]
    amount: i64,
    amount_received: Option<i64>,
    currency: String,
    latest_charge: Option<String>,
    last_payment_error: Option<PaymentErrorObject>,
}

#[derive(Deserialize)]
struct PaymentErrorObject {
    message: Option<String>,
}

#[derive(Deserialize)]
struct ChargeObject {
    id: String,
    payment_intent: Option<String>,
    amount: i64,
    /// Cumulative over every refund on this charge.
    amount_refunded: i64,
    currency: String,
    refunds: Option<RefundList>,
}

/// Every refund on the charge, newest first.
#[derive(Deserialize)]
struct RefundList {
    #[serde(default)]
    data: Vec<RefundObject>,
}

#[derive(Deserialize)]
struct RefundObject {
    id: String,
    amount: i64,
    created: Option<i64>,
    status: Option<String>,
}

impl RefundObject {
    fn moved_money(&self) -> bool {
        !matches!(self.status.as_deref(), Some("failed" | "canceled"))
    }
}

#[derive(Deserialize)]
struct CheckoutSessionObject {
    id: String,
    client_reference_id: Option<String>,
    payment_intent: Option<String>,
}

// ── Results ──────────────────────────────────────────────────────────────────

/// What processing an event did. Stored as the idempotent response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Confirmed,
    ChargeRecorded,
    PaymentFailed,
    Refunded,
    PartiallyRefunded,
    SessionAttached,
    Expired,
    /// Money moved on a booking whose status could not follow; ledger only.
    UnexpectedState,
    /// Late or out-of-order event that changes nothing.
    Stale,
    AlreadyApplied,
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookReceipt {
    pub received: bool,
    pub duplicate: bool,
    pub event_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetrySummary {
    pub scanned: usize,
    pub processed: usize,
    pub failed: usize,
    /// Unprocessed events at the retry cap, not re-driven.
    pub exhausted: u64,
}

// ── Processor ────────────────────────────────────────────────────────────────

pub struct ReconciliationProcessor<B, H, L, E, I, C>
where
    B: BookingRepository,
    H: TransitionLog,
    L: LedgerRepository,
    E: ProviderEventRepository,
    I: IdempotencyRepository,
    C: Clock,
{
    pub machine: BookingStateMachine<B, H, C>,
    pub ledger: L,
    pub events: E,
    pub guard: IdempotencyGuard<I, C>,
    pub verifier: SignatureVerifier,
    pub retry_batch_size: u64,
    pub max_retries: i32,
}

impl<B, H, L, E, I, C> ReconciliationProcessor<B, H, L, E, I, C>
where
    B: BookingRepository,
    H: TransitionLog,
    L: LedgerRepository,
    E: ProviderEventRepository,
    I: IdempotencyRepository,
    C: Clock,
{
    /// Authenticate, record and process one notification.
    ///
    /// Returns only after the event is durably recorded. A redelivered event that
    /// was never processed is processed again; a processed one is a duplicate.
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookReceipt, BookingsServiceError> {
        let now = self.machine.clock.now();
        if let Err(e) = self.verifier.verify(body, signature, now) {
            warn!("rejected provider notification with invalid signature");
            return Err(e);
        }

        let payload: Value = serde_json::from_slice(body)
            .map_err(|e| BookingsServiceError::InvalidPayload(e.to_string()))?;
        let envelope: EventEnvelope = serde_json::from_value(payload.clone())
            .map_err(|e| BookingsServiceError::InvalidPayload(e.to_string()))?;
        if envelope.id.is_empty() {
            return Err(BookingsServiceError::InvalidPayload(
                "missing event id".to_owned(),
            ));
        }

        let event = ProviderEvent {
            id: envelope.id,
            event_type: envelope.event_type,
            payload,
            processed: false,
            processing_error: None,
            retry_count: 0,
            received_at: now,
            processed_at: None,
        };

        let event = if self.events.insert_if_absent(&event).await? {
            event
        } else {
            match self.events.find(&event.id).await? {
                Some(stored) if stored.processed => {
                    debug!(event_id = %stored.id, "duplicate provider event");
                    return Ok(WebhookReceipt {
                        received: true,
                        duplicate: true,
                        event_id: stored.id,
                    });
                }
                Some(stored) => {
                    info!(event_id = %stored.id, retry_count = stored.retry_count, "redelivered unprocessed provider event");
                    stored
                }
                None => event,
            }
        };

        self.process(&event).await?;
        Ok(WebhookReceipt {
            received: true,
            duplicate: false,
            event_id: event.id,
        })
    }

    /// Re-drive a bounded batch of unprocessed events below the retry cap.
    pub async fn retry_unprocessed_events(&self) -> Result<RetrySummary, BookingsServiceError> {
        let exhausted = self.events.count_exhausted(self.max_retries).await?;
        if exhausted > 0 {
            warn!(
                exhausted,
                max_retries = self.max_retries,
                "provider events reached the retry cap and need manual review"
            );
        }

        let events = self
            .events
            .list_unprocessed(self.retry_batch_size, self.max_retries)
            .await?;
        let mut summary = RetrySummary {
            scanned: events.len(),
            exhausted,
            ..Default::default()
        };
        for event in &events {
            match self.process(event).await {
                Ok(_) => summary.processed += 1,
                Err(_) => summary.failed += 1,
            }
        }

        info!(
            scanned = summary.scanned,
            processed = summary.processed,
            failed = summary.failed,
            "provider event retry sweep finished"
        );
        Ok(summary)
    }

    /// Apply a recorded event and finalize its row.
    pub async fn process(&self, event: &ProviderEvent) -> Result<EventOutcome, BookingsServiceError> {
        let guard = GuardKey::new(IdempotencyScope::ProviderWebhook, &event.id, None);
        let result = self
            .guard
            .with_idempotency(guard, &event.payload, || self.dispatch(event))
            .await;

        match result {
            Ok(outcome) => {
                self.events
                    .mark_processed(&event.id, self.machine.clock.now())
                    .await?;
                info!(event_id = %event.id, event_type = %event.event_type, ?outcome, "provider event processed");
                Ok(outcome)
            }
            // Another worker holds this event; it finalizes the row.
            Err(BookingsServiceError::IdempotencyInProgress) => {
                debug!(event_id = %event.id, "provider event already being processed");
                Err(BookingsServiceError::IdempotencyInProgress)
            }
            Err(e) => {
                let message = describe(&e);
                if let Err(mark_err) = self.events.mark_failed(&event.id, &message).await {
                    error!(event_id = %event.id, error = ?mark_err, "failed to record provider event failure");
                }
                warn!(event_id = %event.id, event_type = %event.event_type, error = %message, "provider event processing failed");
                Err(BookingsServiceError::EventProcessingFailed {
                    event_id: event.id.clone(),
                    message,
                })
            }
        }
    }

    async fn dispatch(&self, event: &ProviderEvent) -> Result<EventOutcome, BookingsServiceError> {
        match event.event_type.as_str() {
            PAYMENT_SUCCEEDED => self.on_payment_succeeded(event, parse_object(event)?).await,
            PAYMENT_FAILED => self.on_payment_failed(event, parse_object(event)?).await,
            CHARGE_REFUNDED => self.on_charge_refunded(event, parse_object(event)?).await,
            CHECKOUT_COMPLETED => self.on_checkout_completed(event, parse_object(event)?).await,
            CHECKOUT_EXPIRED => self.on_checkout_expired(event, parse_object(event)?).await,
            other => {
                info!(event_id = %event.id, event_type = other, "ignoring unhandled provider event type");
                Ok(EventOutcome::Ignored)
            }
        }
    }

    async fn on_payment_succeeded(
        &self,
        event: &ProviderEvent,
        intent: PaymentIntentObject,
    ) -> Result<EventOutcome, BookingsServiceError> {
        use BookingStatus::*;

        let booking = self.booking_for_intent(&intent.id).await?;
        let amount = intent.amount_received.unwrap_or(intent.amount);
        let mut entry = self.ledger_entry(
            &booking,
            event,
            LedgerEntry::charge_key(&intent.id),
            LedgerEntryType::Charge,
            amount,
            &intent.currency,
        );
        entry.payment_intent_id = Some(intent.id.clone());
        entry.charge_id = intent.latest_charge;
        entry.description = Some(format!("payment for booking {}", booking.reference));

        let path: &[BookingStatus] = match booking.status {
            Initiated | PaymentFailed => &[Pending, Paid, Confirmed],
            Pending | Reserved => &[Paid, Confirmed],
            Paid => &[Confirmed],
            Confirmed => {
                // Status already reflects the payment; make sure the charge is on record.
                return Ok(if self.ledger.append(&entry).await? {
                    EventOutcome::ChargeRecorded
                } else {
                    EventOutcome::AlreadyApplied
                });
            }
            status => {
                self.machine
                    .transition(
                        booking.id,
                        &booking.reference,
                        status,
                        Confirmed,
                        self.options(event, "payment succeeded", Some(&intent.id)),
                    )
                    .await?;
                self.ledger.append(&entry).await?;
                warn!(
                    booking_id = %booking.id,
                    %status,
                    amount,
                    "payment captured for a booking that cannot be confirmed"
                );
                return Ok(EventOutcome::UnexpectedState);
            }
        };

        let mut from = booking.status;
        for (i, &to) in path.iter().enumerate() {
            let mut options = self.options(event, "payment succeeded", Some(&intent.id));
            if i + 1 == path.len() {
                options = options.ledger_entry(entry.clone());
            }
            self.machine
                .transition(booking.id, &booking.reference, from, to, options)
                .await?
                .into_result()?;
            from = to;
        }
        Ok(EventOutcome::Confirmed)
    }

    async fn on_payment_failed(
        &self,
        event: &ProviderEvent,
        intent: PaymentIntentObject,
    ) -> Result<EventOutcome, BookingsServiceError> {
        let booking = self.booking_for_intent(&intent.id).await?;
        if booking.status == BookingStatus::PaymentFailed {
            return Ok(EventOutcome::AlreadyApplied);
        }

        let reason = intent
            .last_payment_error
            .and_then(|e| e.message)
            .unwrap_or_else(|| "payment failed".to_owned());
        let outcome = self
            .machine
            .transition(
                booking.id,
                &booking.reference,
                booking.status,
                BookingStatus::PaymentFailed,
                self.options(event, &reason, Some(&intent.id)),
            )
            .await?;

        match outcome {
            TransitionOutcome::Applied => Ok(EventOutcome::PaymentFailed),
            TransitionOutcome::Rejected { .. } => Ok(EventOutcome::Stale),
            TransitionOutcome::Conflict { .. } => Err(BookingsServiceError::BookingConflict),
        }
    }

    /// One ledger entry per provider refund, keyed by the refund id, so events
    /// for the same charge can be applied in any order or concurrently.
    async fn on_charge_refunded(
        &self,
        event: &ProviderEvent,
        charge: ChargeObject,
    ) -> Result<EventOutcome, BookingsServiceError> {
        let payment_intent_id = charge.payment_intent.clone().ok_or_else(|| {
            BookingsServiceError::InvalidPayload("charge without payment intent".to_owned())
        })?;
        let booking = self.booking_for_intent(&payment_intent_id).await?;
        let entries = self.refund_entries(&booking, event, &charge, &payment_intent_id)?;
        let full = charge.amount_refunded >= charge.amount;

        if full && booking.status != BookingStatus::Refunded {
            let options = self
                .options(event, "charge refunded", Some(&payment_intent_id))
                .ledger_entries(entries.iter().cloned());
            let outcome = self
                .machine
                .transition(
                    booking.id,
                    &booking.reference,
                    booking.status,
                    BookingStatus::Refunded,
                    options,
                )
                .await?;
            return match outcome {
                TransitionOutcome::Applied => Ok(EventOutcome::Refunded),
                TransitionOutcome::Rejected { from, .. } => {
                    self.append_all(&entries).await?;
                    warn!(booking_id = %booking.id, status = %from, "refund issued for a booking that cannot be refunded");
                    Ok(EventOutcome::UnexpectedState)
                }
                TransitionOutcome::Conflict { .. } => Err(BookingsServiceError::BookingConflict),
            };
        }

        // Partial refunds never move the booking.
        if self.append_all(&entries).await? == 0 {
            info!(
                event_id = %event.id,
                booking_id = %booking.id,
                amount_refunded = charge.amount_refunded,
                "refunds already reflected in ledger"
            );
            return Ok(EventOutcome::Stale);
        }
        Ok(if full {
            EventOutcome::Refunded
        } else {
            EventOutcome::PartiallyRefunded
        })
    }

    async fn on_checkout_completed(
        &self,
        event: &ProviderEvent,
        session: CheckoutSessionObject,
    ) -> Result<EventOutcome, BookingsServiceError> {
        let payment_intent_id = session.payment_intent.clone().ok_or_else(|| {
            BookingsServiceError::InvalidPayload("checkout session without payment intent".to_owned())
        })?;
        let booking = self.booking_for_session(&session).await?;

        self.machine
            .bookings
            .attach_payment(
                booking.id,
                &payment_intent_id,
                Some(&session.id),
                self.machine.clock.now(),
            )
            .await?;

        if matches!(
            booking.status,
            BookingStatus::Initiated | BookingStatus::PaymentFailed
        ) {
            self.machine
                .transition(
                    booking.id,
                    &booking.reference,
                    booking.status,
                    BookingStatus::Pending,
                    self.options(event, "checkout completed", Some(&payment_intent_id)),
                )
                .await?
                .into_result()?;
        }
        Ok(EventOutcome::SessionAttached)
    }

    async fn on_checkout_expired(
        &self,
        event: &ProviderEvent,
        session: CheckoutSessionObject,
    ) -> Result<EventOutcome, BookingsServiceError> {
        let booking = self.booking_for_session(&session).await?;
        if booking.status != BookingStatus::Pending {
            debug!(booking_id = %booking.id, status = %booking.status, "checkout expiry ignored");
            return Ok(EventOutcome::Ignored);
        }

        self.machine
            .transition(
                booking.id,
                &booking.reference,
                BookingStatus::Pending,
                BookingStatus::Expired,
                self.options(event, "checkout session expired", None),
            )
            .await?
            .into_result()?;
        Ok(EventOutcome::Expired)
    }

    // ── helpers ──────────────────────────────────────────────────────────────

    async fn booking_for_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Booking, BookingsServiceError> {
        self.machine
            .bookings
            .find_by_payment_intent(payment_intent_id)
            .await?
            .ok_or(BookingsServiceError::BookingNotFound)
    }

    async fn booking_for_session(
        &self,
        session: &CheckoutSessionObject,
    ) -> Result<Booking, BookingsServiceError> {
        let by_reference = session
            .client_reference_id
            .as_deref()
            .and_then(|id| id.parse::<Uuid>().ok());
        let booking = match by_reference {
            Some(id) => self.machine.bookings.find_by_id(id).await?,
            None => None,
        };
        let booking = match booking {
            Some(booking) => Some(booking),
            None => {
                self.machine
                    .bookings
                    .find_by_checkout_session(&session.id)
                    .await?
            }
        };
        booking.ok_or(BookingsServiceError::BookingNotFound)
    }

    fn options(
        &self,
        event: &ProviderEvent,
        reason: &str,
        payment_intent_id: Option<&str>,
    ) -> TransitionOptions {
        TransitionOptions::new(Actor::payment_gateway(event.id.clone()))
            .reason(reason)
            .payment_intent(payment_intent_id.map(str::to_owned))
            .metadata(json!({ "event_id": event.id, "event_type": event.event_type }))
    }

    /// Ledger entries for the refunds listed on `charge`, oldest first. The refund
    /// that brings the running total to the charged amount is the full `refund`.
    fn refund_entries(
        &self,
        booking: &Booking,
        event: &ProviderEvent,
        charge: &ChargeObject,
        payment_intent_id: &str,
    ) -> Result<Vec<LedgerEntry>, BookingsServiceError> {
        let mut refunds: Vec<&RefundObject> = charge
            .refunds
            .as_ref()
            .map(|list| list.data.iter().rev().filter(|r| r.moved_money()).collect())
            .unwrap_or_default();
        if refunds.is_empty() {
            return Err(BookingsServiceError::InvalidPayload(
                "charge refunded without refund details".to_owned(),
            ));
        }
        refunds.sort_by_key(|refund| refund.created);

        let mut running = 0;
        let entries = refunds
            .into_iter()
            .map(|refund| {
                running += refund.amount;
                let entry_type = if running >= charge.amount {
                    LedgerEntryType::Refund
                } else {
                    LedgerEntryType::PartialRefund
                };
                let mut entry = self.ledger_entry(
                    booking,
                    event,
                    LedgerEntry::refund_key(&refund.id),
                    entry_type,
                    refund.amount,
                    &charge.currency,
                );
                entry.payment_intent_id = Some(payment_intent_id.to_owned());
                entry.charge_id = Some(charge.id.clone());
                entry.refund_id = Some(refund.id.clone());
                entry.description =
                    Some(format!("{entry_type} for booking {}", booking.reference));
                entry
            })
            .collect();
        Ok(entries)
    }

    /// Number of entries that were not already recorded.
    async fn append_all(&self, entries: &[LedgerEntry]) -> Result<usize, BookingsServiceError> {
        let mut inserted = 0;
        for entry in entries {
            if self.ledger.append(entry).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    fn ledger_entry(
        &self,
        booking: &Booking,
        event: &ProviderEvent,
        entry_key: String,
        entry_type: LedgerEntryType,
        amount: i64,
        currency: &str,
    ) -> LedgerEntry {
        let now = self.machine.clock.now();
        LedgerEntry {
            id: Uuid::now_v7(),
            booking_id: booking.id,
            user_id: booking.user_id,
            entry_type,
            amount,
            currency: currency.to_ascii_uppercase(),
            entry_key,
            provider_event_id: Some(event.id.clone()),
            payment_intent_id: None,
            charge_id: None,
            refund_id: None,
            description: None,
            transaction_at: event_time(event).unwrap_or(now),
            created_at: now,
        }
    }
}

fn parse_object<T: DeserializeOwned>(event: &ProviderEvent) -> Result<T, BookingsServiceError> {
    let object = event
        .payload
        .pointer("/data/object")
        .cloned()
        .unwrap_or(Value::Null);
    serde_json::from_value(object)
        .map_err(|e| BookingsServiceError::InvalidPayload(format!("{}: {e}", event.event_type)))
}

/// When the provider says the money moved.
fn event_time(event: &ProviderEvent) -> Option<DateTime<Utc>> {
    event
        .payload
        .get("created")
        .and_then(Value::as_i64)
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn describe(error: &BookingsServiceError) -> String {
    match error {
        BookingsServiceError::Internal(inner) => format!("{inner:#}"),
        other => other.to_string(),
    }
}
