use axum::{
    Router,
    routing::{get, patch, post},
};

use skyfare_core::health::healthz;
use skyfare_core::middleware::{propagate_request_id_layer, request_id_layer, trace_layer};

use crate::handlers::{
    bookings::{
        cancel_booking, create_booking, get_booking, get_booking_history, get_booking_ledger,
        transition_booking,
    },
    health::readyz,
    maintenance::{sweep_idempotency_records, sweep_provider_events},
    payments::{create_payment_intent, request_refund},
    webhooks::receive_payment_event,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Bookings
        .route("/bookings", post(create_booking))
        .route("/bookings/{id}", get(get_booking))
        .route("/bookings/{id}/cancel", post(cancel_booking))
        .route("/bookings/{id}/status", patch(transition_booking))
        .route("/bookings/{id}/history", get(get_booking_history))
        .route("/bookings/{id}/ledger", get(get_booking_ledger))
        // Payments
        .route("/bookings/{id}/payment-intent", post(create_payment_intent))
        .route("/bookings/{id}/refunds", post(request_refund))
        // Provider notifications
        .route("/webhooks/payments", post(receive_payment_event))
        // Maintenance
        .route(
            "/internal/sweeps/idempotency-records",
            post(sweep_idempotency_records),
        )
        .route("/internal/sweeps/provider-events", post(sweep_provider_events))
        .layer(trace_layer())
        .layer(propagate_request_id_layer())
        .layer(request_id_layer())
        .with_state(state)
}
