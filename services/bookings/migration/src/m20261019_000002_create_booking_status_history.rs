use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BookingStatusHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BookingStatusHistory::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(BookingStatusHistory::BookingId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BookingStatusHistory::PreviousStatus).string_len(32))
                    .col(
                        ColumnDef::new(BookingStatusHistory::NewStatus)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BookingStatusHistory::IsValidTransition)
                            .boolean()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BookingStatusHistory::Reason).text())
                    .col(ColumnDef::new(BookingStatusHistory::ActorId).string())
                    .col(
                        ColumnDef::new(BookingStatusHistory::ActorType)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(BookingStatusHistory::PaymentIntentId).string())
                    .col(ColumnDef::new(BookingStatusHistory::Metadata).json_binary())
                    .col(
                        ColumnDef::new(BookingStatusHistory::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(BookingStatusHistory::Table, BookingStatusHistory::BookingId)
                            .to(Bookings::Table, Bookings::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(BookingStatusHistory::Table)
                    .col(BookingStatusHistory::BookingId)
                    .col(BookingStatusHistory::CreatedAt)
                    .name("idx_booking_status_history_booking_id_created_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BookingStatusHistory::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum BookingStatusHistory {
    Table,
    Id,
    BookingId,
    PreviousStatus,
    NewStatus,
    IsValidTransition,
    Reason,
    ActorId,
    ActorType,
    PaymentIntentId,
    Metadata,
    CreatedAt,
}

#[derive(Iden)]
enum Bookings {
    Table,
    Id,
}
