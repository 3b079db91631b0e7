use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::request::Builder as RequestBuilder;
use axum::http::{Request, StatusCode};
use sea_orm::DatabaseConnection;
use serde_json::Value;
use tower::ServiceExt;

use skyfare_bookings::infra::payment_gateway::HttpPaymentGateway;
use skyfare_bookings::router::build_router;
use skyfare_bookings::state::AppState;
use skyfare_bookings::usecase::signature::{SIGNATURE_HEADER, SignatureVerifier};
use skyfare_core::middleware::REQUEST_ID_HEADER;
use skyfare_testing::auth::MockAuth;
use skyfare_testing::webhook::{TEST_WEBHOOK_SECRET, payment_succeeded};

/// Router over a disconnected database: only paths that fail before storage
/// is touched are exercised here.
fn app() -> Router {
    let state = AppState {
        db: DatabaseConnection::default(),
        gateway: HttpPaymentGateway::new("http://127.0.0.1:9", "sk_test").unwrap(),
        verifier: SignatureVerifier::new(TEST_WEBHOOK_SECRET, 300),
        idempotency_ttl: chrono::Duration::hours(24),
        event_retry_batch_size: 10,
        event_max_retries: 3,
    };
    build_router(state)
}

fn with_auth(mut builder: RequestBuilder, auth: &MockAuth) -> RequestBuilder {
    for (name, value) in auth.headers().iter() {
        builder = builder.header(name, value);
    }
    builder
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn should_answer_liveness_and_tag_request_id() {
    let request = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn should_report_not_ready_without_database() {
    let request = Request::builder()
        .uri("/readyz")
        .body(Body::empty())
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn should_return_401_without_identity_headers() {
    let request = Request::builder()
        .method("POST")
        .uri("/bookings")
        .header("content-type", "application/json")
        .header("idempotency-key", "k-1")
        .body(Body::from(r#"{"total_amount":100,"currency":"USD"}"#))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn should_require_idempotency_key_on_create() {
    let request = with_auth(Request::builder(), &MockAuth::customer())
        .method("POST")
        .uri("/bookings")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"total_amount":100,"currency":"USD"}"#))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["kind"], "MISSING_IDEMPOTENCY_KEY");
    assert_eq!(json["retryable"], false);
}

#[tokio::test]
async fn should_reject_unsigned_webhook() {
    let body = serde_json::to_vec(&payment_succeeded("evt_1", "pi_1", 100)).unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/payments")
        .header(SIGNATURE_HEADER, "t=1,v1=deadbeef")
        .body(Body::from(body))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["kind"], "INVALID_SIGNATURE");
}

#[tokio::test]
async fn should_forbid_sweeps_for_customers() {
    for path in [
        "/internal/sweeps/idempotency-records",
        "/internal/sweeps/provider-events",
    ] {
        let request = with_auth(Request::builder(), &MockAuth::customer())
            .method("POST")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{path}");
    }
}
