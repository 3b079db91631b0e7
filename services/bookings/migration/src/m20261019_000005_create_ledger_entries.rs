use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LedgerEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LedgerEntries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LedgerEntries::BookingId).uuid().not_null())
                    .col(ColumnDef::new(LedgerEntries::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(LedgerEntries::EntryType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(LedgerEntries::Amount).big_integer().not_null())
                    .col(ColumnDef::new(LedgerEntries::Currency).string_len(3).not_null())
                    .col(
                        ColumnDef::new(LedgerEntries::EntryKey)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(LedgerEntries::ProviderEventId).string())
                    .col(ColumnDef::new(LedgerEntries::PaymentIntentId).string())
                    .col(ColumnDef::new(LedgerEntries::ChargeId).string())
                    .col(ColumnDef::new(LedgerEntries::RefundId).string())
                    .col(ColumnDef::new(LedgerEntries::Description).text())
                    .col(
                        ColumnDef::new(LedgerEntries::TransactionAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(LedgerEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(LedgerEntries::Table, LedgerEntries::BookingId)
                            .to(Bookings::Table, Bookings::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::BookingId)
                    .col(LedgerEntries::TransactionAt)
                    .name("idx_ledger_entries_booking_id_transaction_at")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(LedgerEntries::Table)
                    .col(LedgerEntries::ProviderEventId)
                    .name("idx_ledger_entries_provider_event_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LedgerEntries::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum LedgerEntries {
    Table,
    Id,
    BookingId,
    UserId,
    EntryType,
    Amount,
    Currency,
    EntryKey,
    ProviderEventId,
    PaymentIntentId,
    ChargeId,
    RefundId,
    Description,
    TransactionAt,
    CreatedAt,
}

#[derive(Iden)]
enum Bookings {
    Table,
    Id,
}
