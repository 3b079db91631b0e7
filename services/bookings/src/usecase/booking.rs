use anyhow::anyhow;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use skyfare_domain::booking::BookingStatus;
use skyfare_domain::idempotency::IdempotencyScope;

use crate::domain::repository::{BookingRepository, Clock, IdempotencyRepository, TransitionLog};
use crate::domain::types::{Booking, Caller, TransitionRecord};
use crate::error::BookingsServiceError;
use crate::usecase::idempotency::{GuardKey, IdempotencyGuard};
use crate::usecase::state_machine::{BookingStateMachine, TransitionOptions};

/// Charset for booking references; no 0/O or 1/I.
const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const REFERENCE_LEN: usize = 8;
const REFERENCE_ATTEMPTS: usize = 5;

/// Human-readable booking reference, e.g. `SKY-7K3QH2WD`.
pub fn generate_reference() -> String {
    let mut rng = rand::rng();
    let code: String = (0..REFERENCE_LEN)
        .map(|_| REFERENCE_CHARSET[rng.random_range(0..REFERENCE_CHARSET.len())] as char)
        .collect();
    format!("SKY-{code}")
}

/// Load a booking the caller may act on: 404 if missing, 403 if not theirs.
pub async fn find_accessible<B: BookingRepository>(
    bookings: &B,
    caller: &Caller,
    booking_id: Uuid,
) -> Result<Booking, BookingsServiceError> {
    let booking = bookings
        .find_by_id(booking_id)
        .await?
        .ok_or(BookingsServiceError::BookingNotFound)?;
    if !caller.can_access(&booking) {
        return Err(BookingsServiceError::Forbidden);
    }
    Ok(booking)
}

// ── CreateBooking ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct CreateBookingInput {
    pub total_amount: i64,
    pub currency: String,
}

impl CreateBookingInput {
    fn validated(self) -> Result<Self, BookingsServiceError> {
        if self.total_amount <= 0 {
            return Err(BookingsServiceError::Validation(
                "total_amount must be positive".to_owned(),
            ));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(BookingsServiceError::Validation(
                "currency must be a three-letter ISO 4217 code".to_owned(),
            ));
        }
        Ok(Self {
            currency: self.currency.to_ascii_uppercase(),
            ..self
        })
    }
}

pub struct CreateBookingUseCase<B, H, I, C>
where
    B: BookingRepository,
    H: TransitionLog,
    I: IdempotencyRepository,
    C: Clock,
{
    pub machine: BookingStateMachine<B, H, C>,
    pub guard: IdempotencyGuard<I, C>,
}

impl<B, H, I, C> CreateBookingUseCase<B, H, I, C>
where
    B: BookingRepository,
    H: TransitionLog,
    I: IdempotencyRepository,
    C: Clock,
{
    pub async fn execute(
        &self,
        caller: &Caller,
        idempotency_key: &str,
        input: CreateBookingInput,
    ) -> Result<Booking, BookingsServiceError> {
        let input = input.validated()?;
        let guard = GuardKey::new(
            IdempotencyScope::BookingCreate,
            idempotency_key,
            Some(caller.user_id),
        );
        let machine = &self.machine;
        let payload = &input;

        self.guard
            .with_idempotency(guard, payload, move || async move {
                let now = machine.clock.now();
                for _ in 0..REFERENCE_ATTEMPTS {
                    let booking = Booking {
                        id: Uuid::now_v7(),
                        reference: generate_reference(),
                        status: BookingStatus::Initiated,
                        user_id: caller.user_id,
                        total_amount: payload.total_amount,
                        currency: payload.currency.clone(),
                        payment_intent_id: None,
                        checkout_session_id: None,
                        created_at: now,
                        updated_at: now,
                    };
                    if machine.bookings.create(&booking).await? {
                        machine.record_creation(&booking, caller.actor()).await;
                        info!(booking_id = %booking.id, reference = %booking.reference, "booking created");
                        return Ok(booking);
                    }
                }
                Err(anyhow!("could not allocate a unique booking reference").into())
            })
            .await
    }
}

// ── CancelBooking ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CancelBookingInput {
    pub reason: Option<String>,
}

pub struct CancelBookingUseCase<B, H, I, C>
where
    B: BookingRepository,
    H: TransitionLog,
    I: IdempotencyRepository,
    C: Clock,
{
    pub machine: BookingStateMachine<B, H, C>,
    pub guard: IdempotencyGuard<I, C>,
}

impl<B, H, I, C> CancelBookingUseCase<B, H, I, C>
where
    B: BookingRepository,
    H: TransitionLog,
    I: IdempotencyRepository,
    C: Clock,
{
    pub async fn execute(
        &self,
        caller: &Caller,
        idempotency_key: &str,
        booking_id: Uuid,
        input: CancelBookingInput,
    ) -> Result<Booking, BookingsServiceError> {
        let booking = find_accessible(&self.machine.bookings, caller, booking_id).await?;
        let guard = GuardKey::new(
            IdempotencyScope::BookingCancel,
            idempotency_key,
            Some(caller.user_id),
        );
        let payload = serde_json::json!({ "booking_id": booking_id, "reason": input.reason });
        let machine = &self.machine;

        self.guard
            .with_idempotency(guard, &payload, move || async move {
                let options = TransitionOptions::new(caller.actor())
                    .reason(input.reason.unwrap_or_else(|| "cancelled by request".to_owned()))
                    .payment_intent(booking.payment_intent_id.clone());
                machine
                    .transition(
                        booking.id,
                        &booking.reference,
                        booking.status,
                        BookingStatus::Cancelled,
                        options,
                    )
                    .await?
                    .into_result()?;
                machine
                    .bookings
                    .find_by_id(booking.id)
                    .await?
                    .ok_or(BookingsServiceError::BookingNotFound)
            })
            .await
    }
}

// ── TransitionBooking (staff) ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionBookingInput {
    pub status: BookingStatus,
    /// Defaults to the booking's current status.
    pub expected_status: Option<BookingStatus>,
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

pub struct TransitionBookingUseCase<B: BookingRepository, H: TransitionLog, C: Clock> {
    pub machine: BookingStateMachine<B, H, C>,
}

impl<B: BookingRepository, H: TransitionLog, C: Clock> TransitionBookingUseCase<B, H, C> {
    pub async fn execute(
        &self,
        caller: &Caller,
        booking_id: Uuid,
        input: TransitionBookingInput,
    ) -> Result<Booking, BookingsServiceError> {
        if !caller.role.can_operate() {
            return Err(BookingsServiceError::Forbidden);
        }
        let booking = self
            .machine
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingsServiceError::BookingNotFound)?;

        let mut options = TransitionOptions::new(caller.actor())
            .payment_intent(booking.payment_intent_id.clone());
        if let Some(reason) = input.reason {
            options = options.reason(reason);
        }
        if let Some(metadata) = input.metadata {
            options = options.metadata(metadata);
        }

        let from = input.expected_status.unwrap_or(booking.status);
        self.machine
            .transition(booking.id, &booking.reference, from, input.status, options)
            .await?
            .into_result()?;

        self.machine
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingsServiceError::BookingNotFound)
    }
}

// ── GetBooking ───────────────────────────────────────────────────────────────

pub struct GetBookingUseCase<B: BookingRepository> {
    pub bookings: B,
}

impl<B: BookingRepository> GetBookingUseCase<B> {
    pub async fn execute(
        &self,
        caller: &Caller,
        booking_id: Uuid,
    ) -> Result<Booking, BookingsServiceError> {
        find_accessible(&self.bookings, caller, booking_id).await
    }
}

// ── GetBookingStatusHistory ──────────────────────────────────────────────────

pub struct GetBookingHistoryUseCase<B: BookingRepository, H: TransitionLog, C: Clock> {
    pub machine: BookingStateMachine<B, H, C>,
}

impl<B: BookingRepository, H: TransitionLog, C: Clock> GetBookingHistoryUseCase<B, H, C> {
    pub async fn execute(
        &self,
        caller: &Caller,
        booking_id: Uuid,
    ) -> Result<Vec<TransitionRecord>, BookingsServiceError> {
        find_accessible(&self.machine.bookings, caller, booking_id).await?;
        self.machine.history(booking_id).await
    }
}
