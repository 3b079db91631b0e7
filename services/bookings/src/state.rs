use chrono::Duration;
use sea_orm::DatabaseConnection;

use crate::infra::clock::SystemClock;
use crate::infra::db::{
    DbBookingRepository, DbIdempotencyRepository, DbLedgerRepository,
    DbProviderEventRepository, DbTransitionLog,
};
use crate::infra::payment_gateway::HttpPaymentGateway;
use crate::usecase::idempotency::IdempotencyGuard;
use crate::usecase::reconciliation::ReconciliationProcessor;
use crate::usecase::signature::SignatureVerifier;
use crate::usecase::state_machine::BookingStateMachine;

pub type DbStateMachine = BookingStateMachine<DbBookingRepository, DbTransitionLog, SystemClock>;
pub type DbIdempotencyGuard = IdempotencyGuard<DbIdempotencyRepository, SystemClock>;
pub type DbReconciliationProcessor = ReconciliationProcessor<
    DbBookingRepository,
    DbTransitionLog,
    DbLedgerRepository,
    DbProviderEventRepository,
    DbIdempotencyRepository,
    SystemClock,
>;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub gateway: HttpPaymentGateway,
    pub verifier: SignatureVerifier,
    pub idempotency_ttl: Duration,
    pub event_retry_batch_size: u64,
    pub event_max_retries: i32,
}

impl AppState {
    pub fn booking_repo(&self) -> DbBookingRepository {
        DbBookingRepository {
            db: self.db.clone(),
        }
    }

    pub fn history_repo(&self) -> DbTransitionLog {
        DbTransitionLog {
            db: self.db.clone(),
        }
    }

    pub fn ledger_repo(&self) -> DbLedgerRepository {
        DbLedgerRepository {
            db: self.db.clone(),
        }
    }

    pub fn idempotency_repo(&self) -> DbIdempotencyRepository {
        DbIdempotencyRepository {
            db: self.db.clone(),
        }
    }

    pub fn event_repo(&self) -> DbProviderEventRepository {
        DbProviderEventRepository {
            db: self.db.clone(),
        }
    }

    pub fn state_machine(&self) -> DbStateMachine {
        BookingStateMachine {
            bookings: self.booking_repo(),
            history: self.history_repo(),
            clock: SystemClock,
        }
    }

    pub fn idempotency_guard(&self) -> DbIdempotencyGuard {
        IdempotencyGuard {
            repo: self.idempotency_repo(),
            clock: SystemClock,
            default_ttl: self.idempotency_ttl,
        }
    }

    pub fn reconciliation(&self) -> DbReconciliationProcessor {
        ReconciliationProcessor {
            machine: self.state_machine(),
            ledger: self.ledger_repo(),
            events: self.event_repo(),
            guard: self.idempotency_guard(),
            verifier: self.verifier.clone(),
            retry_batch_size: self.event_retry_batch_size,
            max_retries: self.event_max_retries,
        }
    }
}
