use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Bookings::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Bookings::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Bookings::Reference)
                            .string_len(16)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Bookings::Status).string_len(32).not_null())
                    .col(ColumnDef::new(Bookings::UserId).uuid().not_null())
                    .col(ColumnDef::new(Bookings::TotalAmount).big_integer().not_null())
                    .col(ColumnDef::new(Bookings::Currency).string_len(3).not_null())
                    .col(ColumnDef::new(Bookings::PaymentIntentId).string())
                    .col(ColumnDef::new(Bookings::CheckoutSessionId).string())
                    .col(
                        ColumnDef::new(Bookings::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Bookings::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(Bookings::Table)
                    .col(Bookings::UserId)
                    .name("idx_bookings_user_id")
                    .to_owned(),
            )
            .await?;

        // Webhook handlers resolve bookings by provider references.
        manager
            .create_index(
                Index::create()
                    .table(Bookings::Table)
                    .col(Bookings::PaymentIntentId)
                    .name("idx_bookings_payment_intent_id")
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .table(Bookings::Table)
                    .col(Bookings::CheckoutSessionId)
                    .name("idx_bookings_checkout_session_id")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Bookings::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Bookings {
    Table,
    Id,
    Reference,
    Status,
    UserId,
    TotalAmount,
    Currency,
    PaymentIntentId,
    CheckoutSessionId,
    CreatedAt,
    UpdatedAt,
}
