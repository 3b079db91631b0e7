//! Periodic maintenance: purge expired idempotency records and re-drive
//! unprocessed provider events.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::state::AppState;

/// Spawn the sweeper. Returns `None` when `interval_secs` is `0`.
pub fn spawn(state: AppState, interval_secs: u64) -> Option<JoinHandle<()>> {
    if interval_secs == 0 {
        info!("maintenance sweeper disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_once(&state).await;
        }
    }))
}

/// One pass of both sweeps. Failures are logged and retried next tick.
pub async fn run_once(state: &AppState) {
    match state.idempotency_guard().cleanup_expired().await {
        Ok(0) => {}
        Ok(deleted) => info!(deleted, "expired idempotency records purged"),
        Err(e) => error!(error = ?e, "idempotency record cleanup failed"),
    }

    if let Err(e) = state.reconciliation().retry_unprocessed_events().await {
        error!(error = ?e, "provider event retry sweep failed");
    }
}
