//! sea-orm entities for the bookings service.

pub mod booking_status_history;
pub mod bookings;
pub mod idempotency_records;
pub mod ledger_entries;
pub mod provider_events;
