//! Migration to create the oauth_apps table.
//!
//! OAuth apps are registered client applications identified by a public
//! client id and authenticated by a hashed client secret.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuthApps::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthApps::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuthApps::PublicId).text().not_null())
                    .col(ColumnDef::new(OAuthApps::UserId).uuid().not_null())
                    .col(ColumnDef::new(OAuthApps::Name).text().not_null())
                    .col(ColumnDef::new(OAuthApps::ClientId).text().not_null())
                    .col(
                        ColumnDef::new(OAuthApps::ClientSecretHash)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthApps::RedirectUris)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuthApps::Scopes).json_binary().not_null())
                    .col(
                        ColumnDef::new(OAuthApps::GrantTypes)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthApps::RatePerMinute)
                            .integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuthApps::RatePerHour).integer().not_null())
                    .col(ColumnDef::new(OAuthApps::RatePerDay).integer().not_null())
                    .col(
                        ColumnDef::new(OAuthApps::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(OAuthApps::IsVerified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuthApps::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(OAuthApps::CreatedBy).uuid().not_null())
                    .col(
                        ColumnDef::new(OAuthApps::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(OAuthApps::UpdatedBy).uuid().null())
                    .col(
                        ColumnDef::new(OAuthApps::DeletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(OAuthApps::DeletedBy).uuid().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_apps_client_id")
                    .table(OAuthApps::Table)
                    .col(OAuthApps::ClientId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_apps_public_id")
                    .table(OAuthApps::Table)
                    .col(OAuthApps::PublicId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_apps_user_id")
                    .table(OAuthApps::Table)
                    .col(OAuthApps::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_oauth_apps_client_id").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_oauth_apps_public_id").to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_oauth_apps_user_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(OAuthApps::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OAuthApps {
    #[sea_orm(iden = "oauth_apps")]
    Table,
    Id,
    PublicId,
    UserId,
    Name,
    ClientId,
    ClientSecretHash,
    RedirectUris,
    Scopes,
    GrantTypes,
    RatePerMinute,
    RatePerHour,
    RatePerDay,
    IsActive,
    IsVerified,
    CreatedAt,
    CreatedBy,
    UpdatedAt,
    UpdatedBy,
    DeletedAt,
    DeletedBy,
}
