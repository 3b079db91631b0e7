use sea_orm_migration::prelude::*;

mod m20261019_000001_create_bookings;
mod m20261019_000002_create_booking_status_history;
mod m20261019_000003_create_idempotency_records;
mod m20261019_000004_create_provider_events;
mod m20261019_000005_create_ledger_entries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261019_000001_create_bookings::Migration),
            Box::new(m20261019_000002_create_booking_status_history::Migration),
            Box::new(m20261019_000003_create_idempotency_records::Migration),
            Box::new(m20261019_000004_create_provider_events::Migration),
            Box::new(m20261019_000005_create_ledger_entries::Migration),
        ]
    }
}
