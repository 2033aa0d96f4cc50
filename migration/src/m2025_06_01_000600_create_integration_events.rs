//! Migration to create the integration_events table.
//!
//! Append-only log of inbound/outbound integration activity; rows are
//! written once and never mutated.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IntegrationEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IntegrationEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IntegrationEvents::UserId).uuid().not_null())
                    .col(ColumnDef::new(IntegrationEvents::Integration).text().null())
                    .col(
                        ColumnDef::new(IntegrationEvents::EventType)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationEvents::Direction)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(IntegrationEvents::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(IntegrationEvents::Payload)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(IntegrationEvents::Error).text().null())
                    .col(
                        ColumnDef::new(IntegrationEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_integration_events_integration")
                    .table(IntegrationEvents::Table)
                    .col(IntegrationEvents::Integration)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_integration_events_created_at")
                    .table(IntegrationEvents::Table)
                    .col(IntegrationEvents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_integration_events_integration")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_integration_events_created_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(IntegrationEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum IntegrationEvents {
    Table,
    Id,
    UserId,
    Integration,
    EventType,
    Direction,
    Status,
    Payload,
    Error,
    CreatedAt,
}
