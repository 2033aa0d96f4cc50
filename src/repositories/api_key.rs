//! # API Key Repository
//!
//! Database operations for API keys. Mutations that must not race
//! (usage accounting, revocation) are expressed as conditional
//! `update_many` statements checked through `rows_affected`.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, Unchanged,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::api_key::{ActiveModel, Column, Entity, Model};
use crate::rate_limit::RateLimitQuota;

/// Fields accepted when creating an API key row.
pub struct NewApiKey {
    pub user_id: Uuid,
    pub name: String,
    pub key_prefix: String,
    pub key_hash: String,
    pub scopes: Vec<String>,
    pub quota: RateLimitQuota,
    pub allowed_ips: Option<Vec<String>>,
    pub expires_at: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub created_by: Uuid,
}

/// Updatable fields of an API key; `None` leaves the column unchanged.
#[derive(Default)]
pub struct ApiKeyChanges {
    pub name: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub quota: Option<RateLimitQuota>,
    pub allowed_ips: Option<Option<Vec<String>>>,
    pub is_active: Option<bool>,
    pub expires_at: Option<Option<chrono::DateTime<chrono::FixedOffset>>>,
}

/// Repository for API key database operations
pub struct ApiKeyRepository {
    db: Arc<DatabaseConnection>,
}

impl ApiKeyRepository {
    /// Create a new API key repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a new API key row.
    pub async fn create(&self, new: NewApiKey) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();
        let id = Uuid::new_v4();

        let model = Model {
            id,
            public_id: format!("ak_{}", id.simple()),
            user_id: new.user_id,
            name: new.name,
            key_prefix: new.key_prefix,
            key_hash: new.key_hash,
            scopes: serde_json::json!(new.scopes),
            rate_per_minute: new.quota.per_minute,
            rate_per_hour: new.quota.per_hour,
            rate_per_day: new.quota.per_day,
            allowed_ips: new.allowed_ips.map(|ips| serde_json::json!(ips)),
            is_active: true,
            expires_at: new.expires_at,
            total_requests: 0,
            total_errors: 0,
            last_used_at: None,
            revoked_at: None,
            revoked_reason: None,
            created_at: now,
            created_by: new.created_by,
            updated_at: now,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        };

        // exec_without_returning sidesteps last-insert-id unpacking on SQLite.
        Entity::insert(ActiveModel::from(model.clone()))
            .exec_without_returning(&*self.db)
            .await?;

        Ok(model)
    }

    /// Find a live key row by its indexed plaintext prefix.
    pub async fn find_by_prefix(&self, prefix: &str) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::KeyPrefix.eq(prefix))
            .filter(Column::DeletedAt.is_null())
            .one(&*self.db)
            .await
    }

    /// Find a key by its external identifier.
    pub async fn find_by_public_id(
        &self,
        public_id: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::PublicId.eq(public_id))
            .filter(Column::DeletedAt.is_null())
            .one(&*self.db)
            .await
    }

    /// List a user's keys, newest first.
    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::DeletedAt.is_null())
            .order_by_desc(Column::CreatedAt)
            .all(&*self.db)
            .await
    }

    /// Atomically record a successful validation: bump `total_requests` and
    /// stamp `last_used_at`, but only while the key is still active. Returns
    /// false if the key was deactivated between lookup and update.
    pub async fn touch_usage(&self, id: Uuid) -> Result<bool, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        let result = Entity::update_many()
            .col_expr(
                Column::TotalRequests,
                Expr::col(Column::TotalRequests).add(1),
            )
            .col_expr(Column::LastUsedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::IsActive.eq(true))
            .filter(Column::DeletedAt.is_null())
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Record an error attributed to this key.
    pub async fn record_error(&self, id: Uuid) -> Result<(), sea_orm::DbErr> {
        Entity::update_many()
            .col_expr(Column::TotalErrors, Expr::col(Column::TotalErrors).add(1))
            .col_expr(
                Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        Ok(())
    }

    /// Revoke a key exactly once. The `revoked_at IS NULL` guard makes
    /// concurrent revocations idempotent: only the first caller sees `true`.
    pub async fn revoke(
        &self,
        id: Uuid,
        reason: Option<&str>,
        revoked_by: Uuid,
    ) -> Result<bool, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        let result = Entity::update_many()
            .col_expr(Column::IsActive, Expr::value(false))
            .col_expr(Column::RevokedAt, Expr::value(now))
            .col_expr(Column::RevokedReason, Expr::value(reason))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .col_expr(Column::UpdatedBy, Expr::value(revoked_by))
            .filter(Column::Id.eq(id))
            .filter(Column::RevokedAt.is_null())
            .filter(Column::DeletedAt.is_null())
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Apply partial updates to a key's mutable settings.
    pub async fn update(
        &self,
        id: Uuid,
        changes: ApiKeyChanges,
        updated_by: Uuid,
    ) -> Result<Model, sea_orm::DbErr> {
        let mut active = ActiveModel {
            id: Unchanged(id),
            updated_at: Set(Utc::now().fixed_offset()),
            updated_by: Set(Some(updated_by)),
            ..Default::default()
        };

        if let Some(name) = changes.name {
            active.name = Set(name);
        }
        if let Some(scopes) = changes.scopes {
            active.scopes = Set(serde_json::json!(scopes));
        }
        if let Some(quota) = changes.quota {
            active.rate_per_minute = Set(quota.per_minute);
            active.rate_per_hour = Set(quota.per_hour);
            active.rate_per_day = Set(quota.per_day);
        }
        if let Some(allowed_ips) = changes.allowed_ips {
            active.allowed_ips = Set(allowed_ips.map(|ips| serde_json::json!(ips)));
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(expires_at) = changes.expires_at {
            active.expires_at = Set(expires_at);
        }

        Entity::update(active).exec(&*self.db).await
    }

    /// Soft-delete a key row.
    pub async fn soft_delete(&self, id: Uuid, deleted_by: Uuid) -> Result<bool, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        let result = Entity::update_many()
            .col_expr(Column::IsActive, Expr::value(false))
            .col_expr(Column::DeletedAt, Expr::value(now))
            .col_expr(Column::DeletedBy, Expr::value(deleted_by))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::DeletedAt.is_null())
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }
}
