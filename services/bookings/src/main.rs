use sea_orm::Database;
use tracing::info;

use skyfare_bookings::config::BookingsConfig;
use skyfare_bookings::infra::payment_gateway::HttpPaymentGateway;
use skyfare_bookings::router::build_router;
use skyfare_bookings::state::AppState;
use skyfare_bookings::sweeper;
use skyfare_bookings::usecase::signature::SignatureVerifier;

#[tokio::main]
async fn main() {
    skyfare_core::tracing::init_tracing();

    let config = BookingsConfig::from_env();

    let db = Database::connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    let gateway = HttpPaymentGateway::new(&config.payment_api_url, &config.payment_api_key)
        .expect("failed to build payment provider client");

    let state = AppState {
        db,
        gateway,
        verifier: SignatureVerifier::new(
            config.webhook_secret.clone(),
            config.webhook_tolerance_secs,
        ),
        idempotency_ttl: chrono::Duration::seconds(config.idempotency_ttl_secs),
        event_retry_batch_size: config.event_retry_batch_size,
        event_max_retries: config.event_max_retries,
    };

    sweeper::spawn(state.clone(), config.sweep_interval_secs);

    let router = build_router(state);
    let http_addr = format!("0.0.0.0:{}", config.bookings_port);
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .expect("failed to bind");

    info!("bookings service listening on {http_addr}");
    axum::serve(listener, router).await.expect("server error");
}
