use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderEvents::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProviderEvents::EventType)
                            .string_len(128)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderEvents::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderEvents::Processed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ProviderEvents::ProcessingError).text())
                    .col(
                        ColumnDef::new(ProviderEvents::RetryCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ProviderEvents::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProviderEvents::ProcessedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Retry sweep scans unprocessed events oldest first.
        manager
            .create_index(
                Index::create()
                    .table(ProviderEvents::Table)
                    .col(ProviderEvents::Processed)
                    .col(ProviderEvents::ReceivedAt)
                    .name("idx_provider_events_processed_received_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProviderEvents::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ProviderEvents {
    Table,
    Id,
    EventType,
    Payload,
    Processed,
    ProcessingError,
    RetryCount,
    ReceivedAt,
    ProcessedAt,
}
