//! Migration to create the oauth_tokens table.
//!
//! A single table holds both single-use authorization codes
//! (`token_type = 'code'`) and issued Bearer access/refresh pairs
//! (`token_type = 'Bearer'`). Tokens are stored as SHA-256 digests, so the
//! digest column doubles as the lookup index for presented tokens.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OAuthTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuthTokens::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuthTokens::AppId).uuid().not_null())
                    .col(ColumnDef::new(OAuthTokens::UserId).uuid().not_null())
                    .col(ColumnDef::new(OAuthTokens::TokenType).text().not_null())
                    .col(
                        ColumnDef::new(OAuthTokens::AccessTokenHash)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuthTokens::RefreshTokenHash).text().null())
                    .col(
                        ColumnDef::new(OAuthTokens::Scopes)
                            .json_binary()
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuthTokens::RedirectUri).text().null())
                    .col(ColumnDef::new(OAuthTokens::State).text().null())
                    .col(
                        ColumnDef::new(OAuthTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuthTokens::RefreshTokenExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuthTokens::IsRevoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuthTokens::RevokedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(OAuthTokens::RevokedReason).text().null())
                    .col(
                        ColumnDef::new(OAuthTokens::UsageCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(OAuthTokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(OAuthTokens::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth_tokens_app_id")
                            .from(OAuthTokens::Table, OAuthTokens::AppId)
                            .to(OAuthApps::Table, OAuthApps::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_tokens_access_token_hash")
                    .table(OAuthTokens::Table)
                    .col(OAuthTokens::AccessTokenHash)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_tokens_refresh_token_hash")
                    .table(OAuthTokens::Table)
                    .col(OAuthTokens::RefreshTokenHash)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_tokens_app_id")
                    .table(OAuthTokens::Table)
                    .col(OAuthTokens::AppId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_tokens_access_token_hash")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth_tokens_refresh_token_hash")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_oauth_tokens_app_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(OAuthTokens::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OAuthTokens {
    #[sea_orm(iden = "oauth_tokens")]
    Table,
    Id,
    AppId,
    UserId,
    TokenType,
    AccessTokenHash,
    RefreshTokenHash,
    Scopes,
    RedirectUri,
    State,
    ExpiresAt,
    RefreshTokenExpiresAt,
    IsRevoked,
    RevokedAt,
    RevokedReason,
    UsageCount,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum OAuthApps {
    #[sea_orm(iden = "oauth_apps")]
    Table,
    Id,
}
