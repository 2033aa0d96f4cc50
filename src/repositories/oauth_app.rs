//! # OAuth App Repository
//!
//! Database operations for registered OAuth client applications.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, Unchanged,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::oauth_app::{ActiveModel, Column, Entity, Model};
use crate::rate_limit::RateLimitQuota;

/// Fields accepted when registering an OAuth app.
pub struct NewOAuthApp {
    pub user_id: Uuid,
    pub name: String,
    pub client_id: String,
    pub client_secret_hash: String,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
    pub grant_types: Vec<String>,
    pub quota: RateLimitQuota,
    pub created_by: Uuid,
}

/// Updatable fields of an OAuth app; `None` leaves the column unchanged.
#[derive(Default)]
pub struct OAuthAppChanges {
    pub name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub scopes: Option<Vec<String>>,
    pub grant_types: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub is_verified: Option<bool>,
}

/// Repository for OAuth app database operations
pub struct OAuthAppRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthAppRepository {
    /// Create a new OAuth app repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a new OAuth app row.
    pub async fn create(&self, new: NewOAuthApp) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();
        let id = Uuid::new_v4();

        let model = Model {
            id,
            public_id: format!("oa_{}", id.simple()),
            user_id: new.user_id,
            name: new.name,
            client_id: new.client_id,
            client_secret_hash: new.client_secret_hash,
            redirect_uris: serde_json::json!(new.redirect_uris),
            scopes: serde_json::json!(new.scopes),
            grant_types: serde_json::json!(new.grant_types),
            rate_per_minute: new.quota.per_minute,
            rate_per_hour: new.quota.per_hour,
            rate_per_day: new.quota.per_day,
            is_active: true,
            is_verified: false,
            created_at: now,
            created_by: new.created_by,
            updated_at: now,
            updated_by: None,
            deleted_at: None,
            deleted_by: None,
        };

        Entity::insert(ActiveModel::from(model.clone()))
            .exec_without_returning(&*self.db)
            .await?;

        Ok(model)
    }

    /// Find an app by its public client identifier.
    pub async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::ClientId.eq(client_id))
            .filter(Column::DeletedAt.is_null())
            .one(&*self.db)
            .await
    }

    /// Find an app by its external identifier.
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

    /// Find an app by primary key.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find_by_id(id).one(&*self.db).await
    }

    /// List a user's apps, newest first.
    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::DeletedAt.is_null())
            .order_by_desc(Column::CreatedAt)
            .all(&*self.db)
            .await
    }

    /// Replace the stored client secret digest.
    pub async fn rotate_secret_hash(
        &self,
        id: Uuid,
        client_secret_hash: &str,
        updated_by: Uuid,
    ) -> Result<bool, sea_orm::DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::ClientSecretHash, Expr::value(client_secret_hash))
            .col_expr(
                Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .col_expr(Column::UpdatedBy, Expr::value(updated_by))
            .filter(Column::Id.eq(id))
            .filter(Column::DeletedAt.is_null())
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected > 0)
    }

    /// Apply partial updates to an app's mutable settings.
    pub async fn update(
        &self,
        id: Uuid,
        changes: OAuthAppChanges,
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
        if let Some(redirect_uris) = changes.redirect_uris {
            active.redirect_uris = Set(serde_json::json!(redirect_uris));
        }
        if let Some(scopes) = changes.scopes {
            active.scopes = Set(serde_json::json!(scopes));
        }
        if let Some(grant_types) = changes.grant_types {
            active.grant_types = Set(serde_json::json!(grant_types));
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(is_verified) = changes.is_verified {
            active.is_verified = Set(is_verified);
        }

        Entity::update(active).exec(&*self.db).await
    }

    /// Soft-delete an app row.
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
