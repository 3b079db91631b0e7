use sea_orm_migration::prelude::*;

use skyfare_bookings_migration::Migrator;

#[tokio::main]
async fn main() {
    cli::run_cli(Migrator).await;
}
