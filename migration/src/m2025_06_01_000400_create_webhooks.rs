//! Migration to create the webhooks table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Webhooks::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Webhooks::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Webhooks::PublicId).text().not_null())
                    .col(ColumnDef::new(Webhooks::UserId).uuid().not_null())
                    .col(ColumnDef::new(Webhooks::Url).text().not_null())
                    .col(ColumnDef::new(Webhooks::Secret).text().not_null())
                    .col(ColumnDef::new(Webhooks::Events).json_binary().not_null())
                    .col(
                        ColumnDef::new(Webhooks::Method)
                            .text()
                            .not_null()
                            .default("POST"),
                    )
                    .col(ColumnDef::new(Webhooks::Headers).json_binary().null())
                    .col(
                        ColumnDef::new(Webhooks::TimeoutSeconds)
                            .integer()
                            .not_null()
                            .default(10),
                    )
                    .col(
                        ColumnDef::new(Webhooks::RetryEnabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Webhooks::RetryMaxAttempts)
                            .integer()
                            .not_null()
                            .default(5),
                    )
                    .col(
                        ColumnDef::new(Webhooks::RetryBackoffMultiplier)
                            .double()
                            .not_null()
                            .default(5.0),
                    )
                    .col(
                        ColumnDef::new(Webhooks::RetryInitialDelaySeconds)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Webhooks::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Webhooks::TotalDeliveries)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Webhooks::SuccessfulDeliveries)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Webhooks::FailedDeliveries)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Webhooks::LastTriggeredAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Webhooks::LastSuccessAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Webhooks::LastFailureAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Webhooks::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Webhooks::CreatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(Webhooks::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Webhooks::UpdatedBy).uuid().null())
                    .col(
                        ColumnDef::new(Webhooks::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Webhooks::DeletedBy).uuid().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhooks_public_id")
                    .table(Webhooks::Table)
                    .col(Webhooks::PublicId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_webhooks_user_id")
                    .table(Webhooks::Table)
                    .col(Webhooks::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_webhooks_public_id").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_webhooks_user_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Webhooks::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Webhooks {
    Table,
    Id,
    PublicId,
    UserId,
    Url,
    Secret,
    Events,
    Method,
    Headers,
    TimeoutSeconds,
    RetryEnabled,
    RetryMaxAttempts,
    RetryBackoffMultiplier,
    RetryInitialDelaySeconds,
    IsActive,
    TotalDeliveries,
    SuccessfulDeliveries,
    FailedDeliveries,
    LastTriggeredAt,
    LastSuccessAt,
    LastFailureAt,
    CreatedAt,
    CreatedBy,
    UpdatedAt,
    UpdatedBy,
    DeletedAt,
    DeletedBy,
}
