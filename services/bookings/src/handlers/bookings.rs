use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use skyfare_auth_types::identity::IdentityHeaders;
use skyfare_domain::actor::ActorType;
use skyfare_domain::booking::BookingStatus;
use skyfare_domain::ledger::{LedgerEntryType, LedgerTotals};

use crate::domain::types::{Booking, LedgerEntry, TransitionRecord};
use crate::error::BookingsServiceError;
use crate::handlers::{IdempotencyKey, caller};
use crate::state::AppState;
use crate::usecase::booking::{
    CancelBookingInput, CancelBookingUseCase, CreateBookingInput, CreateBookingUseCase,
    GetBookingHistoryUseCase, GetBookingUseCase, TransitionBookingInput,
    TransitionBookingUseCase,
};
use crate::usecase::ledger::GetLedgerUseCase;

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct BookingResponse {
    pub id: Uuid,
    pub reference: String,
    pub status: BookingStatus,
    pub user_id: Uuid,
    pub total_amount: i64,
    pub currency: String,
    pub payment_intent_id: Option<String>,
    pub checkout_session_id: Option<String>,
    #[serde(serialize_with = "skyfare_core::serde::to_rfc3339_ms")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(serialize_with = "skyfare_core::serde::to_rfc3339_ms")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            id: b.id,
            reference: b.reference,
            status: b.status,
            user_id: b.user_id,
            total_amount: b.total_amount,
            currency: b.currency,
            payment_intent_id: b.payment_intent_id,
            checkout_session_id: b.checkout_session_id,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct TransitionResponse {
    pub id: Uuid,
    pub previous_status: Option<BookingStatus>,
    pub new_status: BookingStatus,
    pub is_valid_transition: bool,
    pub reason: Option<String>,
    pub actor_id: Option<String>,
    pub actor_type: ActorType,
    pub payment_intent_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
    #[serde(serialize_with = "skyfare_core::serde::to_rfc3339_ms")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<TransitionRecord> for TransitionResponse {
    fn from(r: TransitionRecord) -> Self {
        Self {
            id: r.id,
            previous_status: r.previous_status,
            new_status: r.new_status,
            is_valid_transition: r.is_valid_transition,
            reason: r.reason,
            actor_id: r.actor.id,
            actor_type: r.actor.kind,
            payment_intent_id: r.payment_intent_id,
            metadata: r.metadata,
            created_at: r.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct LedgerEntryResponse {
    pub id: Uuid,
    pub entry_type: LedgerEntryType,
    pub amount: i64,
    pub currency: String,
    pub provider_event_id: Option<String>,
    pub payment_intent_id: Option<String>,
    pub charge_id: Option<String>,
    pub refund_id: Option<String>,
    pub description: Option<String>,
    #[serde(serialize_with = "skyfare_core::serde::to_rfc3339_ms")]
    pub transaction_at: chrono::DateTime<chrono::Utc>,
}

impl From<LedgerEntry> for LedgerEntryResponse {
    fn from(e: LedgerEntry) -> Self {
        Self {
            id: e.id,
            entry_type: e.entry_type,
            amount: e.amount,
            currency: e.currency,
            provider_event_id: e.provider_event_id,
            payment_intent_id: e.payment_intent_id,
            charge_id: e.charge_id,
            refund_id: e.refund_id,
            description: e.description,
            transaction_at: e.transaction_at,
        }
    }
}

#[derive(Serialize)]
pub struct LedgerResponse {
    pub booking_id: Uuid,
    pub entries: Vec<LedgerEntryResponse>,
    pub totals: LedgerTotals,
}

// ── POST /bookings ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub total_amount: i64,
    pub currency: String,
}

pub async fn create_booking(
    identity: IdentityHeaders,
    IdempotencyKey(key): IdempotencyKey,
    State(state): State<AppState>,
    Json(body): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), BookingsServiceError> {
    let usecase = CreateBookingUseCase {
        machine: state.state_machine(),
        guard: state.idempotency_guard(),
    };
    let booking = usecase
        .execute(
            &caller(&identity),
            &key,
            CreateBookingInput {
                total_amount: body.total_amount,
                currency: body.currency,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(booking.into())))
}

// ── GET /bookings/{id} ───────────────────────────────────────────────────────

pub async fn get_booking(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<BookingResponse>, BookingsServiceError> {
    let usecase = GetBookingUseCase {
        bookings: state.booking_repo(),
    };
    let booking = usecase.execute(&caller(&identity), booking_id).await?;
    Ok(Json(booking.into()))
}

// ── POST /bookings/{id}/cancel ───────────────────────────────────────────────

pub async fn cancel_booking(
    identity: IdentityHeaders,
    IdempotencyKey(key): IdempotencyKey,
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    body: Option<Json<CancelBookingInput>>,
) -> Result<Json<BookingResponse>, BookingsServiceError> {
    let usecase = CancelBookingUseCase {
        machine: state.state_machine(),
        guard: state.idempotency_guard(),
    };
    let input = body.map(|Json(input)| input).unwrap_or_default();
    let booking = usecase
        .execute(&caller(&identity), &key, booking_id, input)
        .await?;
    Ok(Json(booking.into()))
}

// ── PATCH /bookings/{id}/status ──────────────────────────────────────────────

pub async fn transition_booking(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    Json(body): Json<TransitionBookingInput>,
) -> Result<Json<BookingResponse>, BookingsServiceError> {
    let usecase = TransitionBookingUseCase {
        machine: state.state_machine(),
    };
    let booking = usecase
        .execute(&caller(&identity), booking_id, body)
        .await?;
    Ok(Json(booking.into()))
}

// ── GET /bookings/{id}/history ───────────────────────────────────────────────

pub async fn get_booking_history(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<Vec<TransitionResponse>>, BookingsServiceError> {
    let usecase = GetBookingHistoryUseCase {
        machine: state.state_machine(),
    };
    let records = usecase.execute(&caller(&identity), booking_id).await?;
    Ok(Json(records.into_iter().map(Into::into).collect()))
}

// ── GET /bookings/{id}/ledger ────────────────────────────────────────────────

pub async fn get_booking_ledger(
    identity: IdentityHeaders,
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<Json<LedgerResponse>, BookingsServiceError> {
    let usecase = GetLedgerUseCase {
        bookings: state.booking_repo(),
        ledger: state.ledger_repo(),
    };
    let statement = usecase.execute(&caller(&identity), booking_id).await?;
    Ok(Json(LedgerResponse {
        booking_id,
        entries: statement.entries.into_iter().map(Into::into).collect(),
        totals: statement.totals,
    }))
}
