use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use skyfare_domain::booking::{BookingStatus, is_valid_transition};
use skyfare_domain::idempotency::IdempotencyScope;
use skyfare_domain::ledger::LedgerTotals;

use crate::domain::repository::{
    BookingRepository, Clock, IdempotencyRepository, LedgerRepository, PaymentGateway,
    TransitionLog,
};
use crate::domain::types::{Caller, PaymentIntentRequest, RefundRequest};
use crate::error::BookingsServiceError;
use crate::usecase::booking::find_accessible;
use crate::usecase::idempotency::{GuardKey, IdempotencyGuard};
use crate::usecase::state_machine::{BookingStateMachine, TransitionOptions};

// ── CreatePaymentIntent ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentIntentView {
    pub booking_id: Uuid,
    pub payment_intent_id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

pub struct CreatePaymentIntentUseCase<B, H, I, C, G>
where
    B: BookingRepository,
    H: TransitionLog,
    I: IdempotencyRepository,
    C: Clock,
    G: PaymentGateway,
{
    pub machine: BookingStateMachine<B, H, C>,
    pub guard: IdempotencyGuard<I, C>,
    pub gateway: G,
}

impl<B, H, I, C, G> CreatePaymentIntentUseCase<B, H, I, C, G>
where
    B: BookingRepository,
    H: TransitionLog,
    I: IdempotencyRepository,
    C: Clock,
    G: PaymentGateway,
{
    pub async fn execute(
        &self,
        caller: &Caller,
        idempotency_key: &str,
        booking_id: Uuid,
    ) -> Result<PaymentIntentView, BookingsServiceError> {
        let booking = find_accessible(&self.machine.bookings, caller, booking_id).await?;
        let guard = GuardKey::new(
            IdempotencyScope::PaymentIntentCreate,
            idempotency_key,
            Some(caller.user_id),
        );
        let payload = serde_json::json!({ "booking_id": booking_id });
        let machine = &self.machine;
        let gateway = &self.gateway;

        self.guard
            .with_idempotency(guard, &payload, move || async move {
                // Reserved bookings already await payment and cannot go back to pending.
                let next = match booking.status {
                    BookingStatus::Initiated | BookingStatus::PaymentFailed => {
                        Some(BookingStatus::Pending)
                    }
                    BookingStatus::Pending | BookingStatus::Reserved => None,
                    from => {
                        return Err(BookingsServiceError::InvalidTransition {
                            from,
                            to: BookingStatus::Pending,
                        });
                    }
                };

                let intent = gateway
                    .create_payment_intent(&PaymentIntentRequest {
                        booking_id: booking.id,
                        reference: booking.reference.clone(),
                        amount: booking.total_amount,
                        currency: booking.currency.clone(),
                        idempotency_key: format!("{}:{idempotency_key}", booking.id),
                    })
                    .await?;

                machine
                    .bookings
                    .attach_payment(booking.id, &intent.id, None, machine.clock.now())
                    .await?;

                if let Some(to) = next {
                    let options = TransitionOptions::new(caller.actor())
                        .reason("payment intent created")
                        .payment_intent(Some(intent.id.clone()));
                    machine
                        .transition(booking.id, &booking.reference, booking.status, to, options)
                        .await?
                        .into_result()?;
                }

                info!(booking_id = %booking.id, payment_intent_id = %intent.id, "payment intent created");
                Ok(PaymentIntentView {
                    booking_id: booking.id,
                    payment_intent_id: intent.id,
                    client_secret: intent.client_secret,
                    amount: booking.total_amount,
                    currency: booking.currency,
                    status: intent.status,
                })
            })
            .await
    }
}

// ── RequestRefund ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RequestRefundInput {
    /// Minor units; defaults to everything still refundable.
    pub amount: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundView {
    pub booking_id: Uuid,
    pub refund_id: String,
    pub amount: i64,
    pub status: String,
}

/// Asks the provider for a refund. Status and ledger follow its `charge.refunded`
/// notification.
pub struct RequestRefundUseCase<B, L, I, C, G>
where
    B: BookingRepository,
    L: LedgerRepository,
    I: IdempotencyRepository,
    C: Clock,
    G: PaymentGateway,
{
    pub bookings: B,
    pub ledger: L,
    pub guard: IdempotencyGuard<I, C>,
    pub gateway: G,
}

impl<B, L, I, C, G> RequestRefundUseCase<B, L, I, C, G>
where
    B: BookingRepository,
    L: LedgerRepository,
    I: IdempotencyRepository,
    C: Clock,
    G: PaymentGateway,
{
    pub async fn execute(
        &self,
        caller: &Caller,
        idempotency_key: &str,
        booking_id: Uuid,
        input: RequestRefundInput,
    ) -> Result<RefundView, BookingsServiceError> {
        let booking = find_accessible(&self.bookings, caller, booking_id).await?;
        let guard = GuardKey::new(
            IdempotencyScope::RefundRequest,
            idempotency_key,
            Some(caller.user_id),
        );
        let payload = serde_json::json!({
            "booking_id": booking_id,
            "amount": input.amount,
            "reason": input.reason,
        });
        let ledger = &self.ledger;
        let gateway = &self.gateway;

        self.guard
            .with_idempotency(guard, &payload, move || async move {
                let payment_intent_id = booking.payment_intent_id.clone().ok_or_else(|| {
                    BookingsServiceError::Validation("booking has no payment to refund".to_owned())
                })?;
                if booking.status != BookingStatus::Refunded
                    && !is_valid_transition(booking.status, BookingStatus::Refunded)
                {
                    return Err(BookingsServiceError::InvalidTransition {
                        from: booking.status,
                        to: BookingStatus::Refunded,
                    });
                }

                let entries = ledger.list_by_booking(booking.id).await?;
                let totals = LedgerTotals::from_entries(
                    entries
                        .iter()
                        .filter(|e| e.payment_intent_id.as_deref() == Some(payment_intent_id.as_str()))
                        .map(|e| (e.entry_type, e.amount)),
                );
                let refundable = totals.net;
                if refundable <= 0 {
                    return Err(BookingsServiceError::Validation(
                        "nothing left to refund".to_owned(),
                    ));
                }
                let amount = input.amount.unwrap_or(refundable);
                if amount <= 0 || amount > refundable {
                    return Err(BookingsServiceError::Validation(format!(
                        "refund amount must be between 1 and {refundable}"
                    )));
                }

                let refund = gateway
                    .create_refund(&RefundRequest {
                        payment_intent_id,
                        amount,
                        reason: input.reason,
                        idempotency_key: format!("{}:{idempotency_key}", booking.id),
                    })
                    .await?;

                info!(
                    booking_id = %booking.id,
                    refund_id = %refund.id,
                    amount,
                    partial = amount < refundable,
                    "refund requested"
                );
                Ok(RefundView {
                    booking_id: booking.id,
                    refund_id: refund.id,
                    amount: refund.amount,
                    status: refund.status,
                })
            })
            .await
    }
}
