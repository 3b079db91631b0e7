use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};

use crate::error::BookingsServiceError;
use crate::state::AppState;
use crate::usecase::reconciliation::WebhookReceipt;
use crate::usecase::signature::SIGNATURE_HEADER;

// ── POST /webhooks/payments ──────────────────────────────────────────────────

/// The raw body is needed for signature verification, so it is not parsed by
/// an extractor. Any non-2xx tells the provider to redeliver.
pub async fn receive_payment_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookReceipt>, BookingsServiceError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let receipt = state
        .reconciliation()
        .handle_webhook(&body, signature)
        .await?;
    Ok(Json(receipt))
}
