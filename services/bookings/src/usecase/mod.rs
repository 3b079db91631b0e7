pub mod booking;
pub mod idempotency;
pub mod ledger;
pub mod payment;
pub mod reconciliation;
pub mod signature;
pub mod state_machine;
