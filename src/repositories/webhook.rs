//! # Webhook Repository
//!
//! Database operations for webhook endpoints, including the lifetime
//! delivery counters updated by the delivery engine.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set, Unchanged,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::webhook::{ActiveModel, Column, Entity, Model};

/// Retry policy captured per webhook.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub enabled: bool,
    pub max_attempts: i32,
    pub backoff_multiplier: f64,
    pub initial_delay_seconds: i32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 5,
            backoff_multiplier: 5.0,
            initial_delay_seconds: 1,
        }
    }
}

/// Fields accepted when registering a webhook.
pub struct NewWebhook {
    pub user_id: Uuid,
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
    pub method: String,
    pub headers: Option<serde_json::Value>,
    pub timeout_seconds: i32,
    pub retry: RetryPolicy,
    pub created_by: Uuid,
}

/// Updatable fields of a webhook; `None` leaves the column unchanged.
#[derive(Default)]
pub struct WebhookChanges {
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub headers: Option<Option<serde_json::Value>>,
    pub timeout_seconds: Option<i32>,
    pub retry: Option<RetryPolicy>,
    pub is_active: Option<bool>,
}

/// Repository for webhook database operations
pub struct WebhookRepository {
    db: Arc<DatabaseConnection>,
}

impl WebhookRepository {
    /// Create a new webhook repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a new webhook row.
    pub async fn create(&self, new: NewWebhook) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();
        let id = Uuid::new_v4();

        let model = Model {
            id,
            public_id: format!("wh_{}", id.simple()),
            user_id: new.user_id,
            url: new.url,
            secret: new.secret,
            events: serde_json::json!(new.events),
            method: new.method,
            headers: new.headers,
            timeout_seconds: new.timeout_seconds,
            retry_enabled: new.retry.enabled,
            retry_max_attempts: new.retry.max_attempts,
            retry_backoff_multiplier: new.retry.backoff_multiplier,
            retry_initial_delay_seconds: new.retry.initial_delay_seconds,
            is_active: true,
            total_deliveries: 0,
            successful_deliveries: 0,
            failed_deliveries: 0,
            last_triggered_at: None,
            last_success_at: None,
            last_failure_at: None,
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

    /// Find a webhook by primary key.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find_by_id(id).one(&*self.db).await
    }

    /// Find a webhook by its external identifier.
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

    /// List a user's webhooks, newest first.
    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::DeletedAt.is_null())
            .order_by_desc(Column::CreatedAt)
            .all(&*self.db)
            .await
    }

    /// Active webhooks for a user; event filtering happens in memory since
    /// subscriptions can include the `*` wildcard.
    pub async fn list_active_for_user(&self, user_id: Uuid) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::IsActive.eq(true))
            .filter(Column::DeletedAt.is_null())
            .all(&*self.db)
            .await
    }

    /// Record a newly enqueued delivery.
    pub async fn record_enqueued(&self, id: Uuid) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        Entity::update_many()
            .col_expr(
                Column::TotalDeliveries,
                Expr::col(Column::TotalDeliveries).add(1),
            )
            .col_expr(Column::LastTriggeredAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        Ok(())
    }

    /// Record a delivery that reached `delivered`.
    pub async fn record_success(&self, id: Uuid) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        Entity::update_many()
            .col_expr(
                Column::SuccessfulDeliveries,
                Expr::col(Column::SuccessfulDeliveries).add(1),
            )
            .col_expr(Column::LastSuccessAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        Ok(())
    }

    /// Record a failed attempt that will be retried. Only the failure
    /// timestamp moves; the terminal counter stays untouched.
    pub async fn record_attempt_failure(&self, id: Uuid) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        Entity::update_many()
            .col_expr(Column::LastFailureAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        Ok(())
    }

    /// Record a delivery that exhausted its attempts.
    pub async fn record_terminal_failure(&self, id: Uuid) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        Entity::update_many()
            .col_expr(
                Column::FailedDeliveries,
                Expr::col(Column::FailedDeliveries).add(1),
            )
            .col_expr(Column::LastFailureAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        Ok(())
    }

    /// Apply partial updates to a webhook's mutable settings.
    pub async fn update(
        &self,
        id: Uuid,
        changes: WebhookChanges,
        updated_by: Uuid,
    ) -> Result<Model, sea_orm::DbErr> {
        let mut active = ActiveModel {
            id: Unchanged(id),
            updated_at: Set(Utc::now().fixed_offset()),
            updated_by: Set(Some(updated_by)),
            ..Default::default()
        };

        if let Some(url) = changes.url {
            active.url = Set(url);
        }
        if let Some(events) = changes.events {
            active.events = Set(serde_json::json!(events));
        }
        if let Some(headers) = changes.headers {
            active.headers = Set(headers);
        }
        if let Some(timeout_seconds) = changes.timeout_seconds {
            active.timeout_seconds = Set(timeout_seconds);
        }
        if let Some(retry) = changes.retry {
            active.retry_enabled = Set(retry.enabled);
            active.retry_max_attempts = Set(retry.max_attempts);
            active.retry_backoff_multiplier = Set(retry.backoff_multiplier);
            active.retry_initial_delay_seconds = Set(retry.initial_delay_seconds);
        }
        if let Some(is_active) = changes.is_active {
            active.is_active = Set(is_active);
        }

        Entity::update(active).exec(&*self.db).await
    }

    /// Soft-delete a webhook row.
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
