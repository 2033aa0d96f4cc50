//! # OAuth Token Repository
//!
//! Database operations for authorization codes and Bearer token pairs.
//! Single-use semantics (code consumption, revocation) are enforced with
//! conditional `update_many` statements: the row flips `is_revoked`
//! exactly once, and only the caller whose update matched proceeds.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::oauth_token::{
    ActiveModel, Column, Entity, Model, TOKEN_TYPE_BEARER, TOKEN_TYPE_CODE,
};

/// Fields accepted when storing an authorization code.
pub struct NewAuthorizationCode {
    pub app_id: Uuid,
    pub user_id: Uuid,
    pub code_hash: String,
    pub scopes: Vec<String>,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub expires_at: DateTime<FixedOffset>,
}

/// Fields accepted when storing an issued Bearer pair.
pub struct NewBearerToken {
    pub app_id: Uuid,
    pub user_id: Uuid,
    pub access_token_hash: String,
    pub refresh_token_hash: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: DateTime<FixedOffset>,
    pub refresh_token_expires_at: Option<DateTime<FixedOffset>>,
}

/// Repository for OAuth token database operations
pub struct OAuthTokenRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthTokenRepository {
    /// Create a new OAuth token repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Store a fresh authorization code row.
    pub async fn create_code(&self, new: NewAuthorizationCode) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        let model = Model {
            id: Uuid::new_v4(),
            app_id: new.app_id,
            user_id: new.user_id,
            token_type: TOKEN_TYPE_CODE.to_string(),
            access_token_hash: new.code_hash,
            refresh_token_hash: None,
            scopes: serde_json::json!(new.scopes),
            redirect_uri: Some(new.redirect_uri),
            state: new.state,
            expires_at: new.expires_at,
            refresh_token_expires_at: None,
            is_revoked: false,
            revoked_at: None,
            revoked_reason: None,
            usage_count: 0,
            created_at: now,
            updated_at: now,
        };

        Entity::insert(ActiveModel::from(model.clone()))
            .exec_without_returning(&*self.db)
            .await?;

        Ok(model)
    }

    /// Store a fresh Bearer access/refresh pair.
    pub async fn create_bearer(&self, new: NewBearerToken) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        let model = Model {
            id: Uuid::new_v4(),
            app_id: new.app_id,
            user_id: new.user_id,
            token_type: TOKEN_TYPE_BEARER.to_string(),
            access_token_hash: new.access_token_hash,
            refresh_token_hash: new.refresh_token_hash,
            scopes: serde_json::json!(new.scopes),
            redirect_uri: None,
            state: None,
            expires_at: new.expires_at,
            refresh_token_expires_at: new.refresh_token_expires_at,
            is_revoked: false,
            revoked_at: None,
            revoked_reason: None,
            usage_count: 0,
            created_at: now,
            updated_at: now,
        };

        Entity::insert(ActiveModel::from(model.clone()))
            .exec_without_returning(&*self.db)
            .await?;

        Ok(model)
    }

    /// Look up an authorization code row by digest.
    pub async fn find_code_by_hash(&self, hash: &str) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::TokenType.eq(TOKEN_TYPE_CODE))
            .filter(Column::AccessTokenHash.eq(hash))
            .one(&*self.db)
            .await
    }

    /// Look up a Bearer row by access token digest.
    pub async fn find_bearer_by_access_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::TokenType.eq(TOKEN_TYPE_BEARER))
            .filter(Column::AccessTokenHash.eq(hash))
            .one(&*self.db)
            .await
    }

    /// Look up a Bearer row by refresh token digest.
    pub async fn find_bearer_by_refresh_hash(
        &self,
        hash: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::TokenType.eq(TOKEN_TYPE_BEARER))
            .filter(Column::RefreshTokenHash.eq(hash))
            .one(&*self.db)
            .await
    }

    /// Consume an authorization code exactly once. Concurrent exchanges race
    /// on the `is_revoked = false` guard; exactly one caller sees `true`.
    pub async fn consume_code(&self, id: Uuid) -> Result<bool, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        let result = Entity::update_many()
            .col_expr(Column::IsRevoked, Expr::value(true))
            .col_expr(Column::RevokedAt, Expr::value(now))
            .col_expr(Column::RevokedReason, Expr::value("exchanged"))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::TokenType.eq(TOKEN_TYPE_CODE))
            .filter(Column::IsRevoked.eq(false))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Record a successful access token validation.
    pub async fn touch_usage(&self, id: Uuid) -> Result<bool, sea_orm::DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::UsageCount, Expr::col(Column::UsageCount).add(1))
            .col_expr(
                Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(Column::Id.eq(id))
            .filter(Column::IsRevoked.eq(false))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Swap in a fresh access token digest on refresh. The refresh token
    /// itself is not rotated; the row keeps its refresh digest and expiry.
    pub async fn rotate_access(
        &self,
        id: Uuid,
        access_token_hash: &str,
        expires_at: DateTime<FixedOffset>,
    ) -> Result<bool, sea_orm::DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::AccessTokenHash, Expr::value(access_token_hash))
            .col_expr(Column::ExpiresAt, Expr::value(expires_at))
            .col_expr(
                Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(Column::Id.eq(id))
            .filter(Column::IsRevoked.eq(false))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Revoke a token row exactly once; repeat revocations return `false`.
    pub async fn revoke(&self, id: Uuid, reason: Option<&str>) -> Result<bool, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        let result = Entity::update_many()
            .col_expr(Column::IsRevoked, Expr::value(true))
            .col_expr(Column::RevokedAt, Expr::value(now))
            .col_expr(Column::RevokedReason, Expr::value(reason))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::IsRevoked.eq(false))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Revoke every live token issued by an app. Returns the count revoked.
    pub async fn revoke_all_for_app(
        &self,
        app_id: Uuid,
        reason: &str,
    ) -> Result<u64, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        let result = Entity::update_many()
            .col_expr(Column::IsRevoked, Expr::value(true))
            .col_expr(Column::RevokedAt, Expr::value(now))
            .col_expr(Column::RevokedReason, Expr::value(reason))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::AppId.eq(app_id))
            .filter(Column::IsRevoked.eq(false))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Delete expired, revoked rows past their retention horizon.
    pub async fn cleanup_expired(
        &self,
        older_than: DateTime<FixedOffset>,
    ) -> Result<u64, sea_orm::DbErr> {
        let result = Entity::delete_many()
            .filter(Column::IsRevoked.eq(true))
            .filter(Column::ExpiresAt.lt(older_than))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
