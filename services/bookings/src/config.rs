/// Bookings service configuration loaded from environment variables.
#[derive(Debug)]
pub struct BookingsConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// TCP port for the HTTP server (default 3114). Env var: `BOOKINGS_PORT`.
    pub bookings_port: u16,
    /// Shared secret the payment provider signs notifications with.
    pub webhook_secret: String,
    /// Maximum accepted age of a signature timestamp, in seconds (default 300).
    pub webhook_tolerance_secs: i64,
    /// Payment provider REST base URL (e.g. "https://api.payments.example").
    pub payment_api_url: String,
    pub payment_api_key: String,
    /// Lifetime of idempotency records, in seconds (default 24h).
    pub idempotency_ttl_secs: i64,
    /// Upper bound on events re-driven per retry sweep (default 50).
    pub event_retry_batch_size: u64,
    /// Events that failed this many times are left to operators (default 10).
    pub event_max_retries: i32,
    /// Period of the in-process sweeper, in seconds. `0` disables it (default 60).
    pub sweep_interval_secs: u64,
}

impl BookingsConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            bookings_port: env_or("BOOKINGS_PORT", 3114),
            webhook_secret: std::env::var("PAYMENT_WEBHOOK_SECRET")
                .expect("PAYMENT_WEBHOOK_SECRET"),
            webhook_tolerance_secs: env_or("PAYMENT_WEBHOOK_TOLERANCE_SECS", 300),
            payment_api_url: std::env::var("PAYMENT_API_URL").expect("PAYMENT_API_URL"),
            payment_api_key: std::env::var("PAYMENT_API_KEY").expect("PAYMENT_API_KEY"),
            idempotency_ttl_secs: env_or("IDEMPOTENCY_TTL_SECS", 86_400),
            event_retry_batch_size: env_or("EVENT_RETRY_BATCH_SIZE", 50),
            event_max_retries: env_or("EVENT_MAX_RETRIES", 10),
            sweep_interval_secs: env_or("SWEEP_INTERVAL_SECS", 60),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
