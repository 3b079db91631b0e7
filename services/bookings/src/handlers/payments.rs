use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use skyfare_auth_types::identity::IdentityHeaders;

use crate::error::BookingsServiceError;
use crate::handlers::{IdempotencyKey, caller};
use crate::state::AppState;
use crate::usecase::payment::{
    CreatePaymentIntentUseCase, PaymentIntentView, RefundView, RequestRefundInput,
    RequestRefundUseCase,
};

// ── POST /bookings/{id}/payment-intent ───────────────────────────────────────

pub async fn create_payment_intent(
    identity: IdentityHeaders,
    IdempotencyKey(key): IdempotencyKey,
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
) -> Result<(StatusCode, Json<PaymentIntentView>), BookingsServiceError> {
    let usecase = CreatePaymentIntentUseCase {
        machine: state.state_machine(),
        guard: state.idempotency_guard(),
        gateway: state.gateway.clone(),
    };
    let intent = usecase
        .execute(&caller(&identity), &key, booking_id)
        .await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

// ── POST /bookings/{id}/refunds ──────────────────────────────────────────────

/// Accepted, not applied: the booking moves once the provider confirms.
pub async fn request_refund(
    identity: IdentityHeaders,
    IdempotencyKey(key): IdempotencyKey,
    State(state): State<AppState>,
    Path(booking_id): Path<Uuid>,
    body: Option<Json<RequestRefundInput>>,
) -> Result<(StatusCode, Json<RefundView>), BookingsServiceError> {
    let usecase = RequestRefundUseCase {
        bookings: state.booking_repo(),
        ledger: state.ledger_repo(),
        guard: state.idempotency_guard(),
        gateway: state.gateway.clone(),
    };
    let input = body.map(|Json(input)| input).unwrap_or_default();
    let refund = usecase
        .execute(&caller(&identity), &key, booking_id, input)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(refund)))
}
