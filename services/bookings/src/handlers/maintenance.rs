use axum::{Json, extract::State};
use serde::Serialize;

use skyfare_auth_types::identity::IdentityHeaders;

use crate::error::BookingsServiceError;
use crate::state::AppState;
use crate::usecase::reconciliation::RetrySummary;

#[derive(Serialize)]
pub struct CleanupResponse {
    pub deleted: u64,
}

// ── POST /internal/sweeps/idempotency-records ────────────────────────────────

pub async fn sweep_idempotency_records(
    identity: IdentityHeaders,
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, BookingsServiceError> {
    if !identity.user_role.can_operate() {
        return Err(BookingsServiceError::Forbidden);
    }
    let deleted = state.idempotency_guard().cleanup_expired().await?;
    tracing::info!(deleted, "expired idempotency records purged");
    Ok(Json(CleanupResponse { deleted }))
}

// ── POST /internal/sweeps/provider-events ────────────────────────────────────

pub async fn sweep_provider_events(
    identity: IdentityHeaders,
    State(state): State<AppState>,
) -> Result<Json<RetrySummary>, BookingsServiceError> {
    if !identity.user_role.can_operate() {
        return Err(BookingsServiceError::Forbidden);
    }
    let summary = state.reconciliation().retry_unprocessed_events().await?;
    Ok(Json(summary))
}
