use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use skyfare_domain::booking::BookingStatus;

/// Bookings service domain error variants.
#[derive(Debug, thiserror::Error)]
pub enum BookingsServiceError {
    #[error("booking not found")]
    BookingNotFound,
    #[error("idempotency key reused with a different payload")]
    IdempotencyConflict,
    #[error("a request with this idempotency key is still in progress")]
    IdempotencyInProgress,
    #[error("booking status changed concurrently")]
    BookingConflict,
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("missing idempotency key")]
    MissingIdempotencyKey,
    #[error("{0}")]
    Validation(String),
    #[error("forbidden")]
    Forbidden,
    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("payment provider rejected the request: {0}")]
    ProviderRejected(String),
    #[error("event {event_id} could not be processed: {message}")]
    EventProcessingFailed { event_id: String, message: String },
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl BookingsServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BookingNotFound => "BOOKING_NOT_FOUND",
            Self::IdempotencyConflict => "IDEMPOTENCY_CONFLICT",
            Self::IdempotencyInProgress => "IDEMPOTENCY_IN_PROGRESS",
            Self::BookingConflict => "BOOKING_CONFLICT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::MissingIdempotencyKey => "MISSING_IDEMPOTENCY_KEY",
            Self::Validation(_) => "VALIDATION",
            Self::Forbidden => "FORBIDDEN",
            Self::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            Self::ProviderRejected(_) => "PROVIDER_REJECTED",
            Self::EventProcessingFailed { .. } => "EVENT_PROCESSING_FAILED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the same request may succeed if sent again later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::IdempotencyInProgress
                | Self::BookingConflict
                | Self::ProviderUnavailable(_)
                | Self::EventProcessingFailed { .. }
                | Self::Internal(_)
        )
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BookingNotFound => StatusCode::NOT_FOUND,
            Self::IdempotencyConflict
            | Self::IdempotencyInProgress
            | Self::BookingConflict
            | Self::InvalidTransition { .. } => StatusCode::CONFLICT,
            Self::InvalidSignature
            | Self::InvalidPayload(_)
            | Self::MissingIdempotencyKey
            | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::ProviderRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::EventProcessingFailed { .. } | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for BookingsServiceError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(e) => tracing::error!(error = ?e, kind = "INTERNAL", "internal error"),
            Self::EventProcessingFailed { event_id, message } => {
                tracing::error!(%event_id, error = %message, "provider event processing failed")
            }
            _ => {}
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        });
        let mut resp = (status, axum::Json(body)).into_response();
        if matches!(self, Self::IdempotencyInProgress) {
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        resp
    }
}
