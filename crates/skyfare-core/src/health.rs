use axum::http::StatusCode;

/// Handler for `GET /healthz`: liveness check.
///
/// Readiness depends on each service's backing stores, so `GET /readyz`
/// is implemented per service.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
