//! # Webhook Delivery Repository
//!
//! Database operations for delivery rows, including the claim/lease query
//! the retry sweeper uses. Claiming pushes `next_retry_at` forward so a
//! second sweeper (or an overlapping tick) cannot pick up the same row
//! while an attempt is in flight.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::webhook_delivery::{ActiveModel, Column, DeliveryStatus, Entity, Model};

/// Fields accepted when enqueuing a delivery.
pub struct NewDelivery {
    pub webhook_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub signature: String,
    pub max_attempts: i32,
    /// How long the inline first attempt may hold the row before the
    /// sweeper is allowed to claim it.
    pub first_attempt_lease: Duration,
}

/// Outcome fields recorded after an attempt finishes.
pub struct AttemptOutcome {
    pub attempt_number: i32,
    pub status_code: Option<i32>,
    pub response_time_ms: Option<i64>,
    pub error: Option<String>,
}

/// Repository for webhook delivery database operations
pub struct WebhookDeliveryRepository {
    db: Arc<DatabaseConnection>,
}

impl WebhookDeliveryRepository {
    /// Create a new webhook delivery repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert a pending delivery row. `next_retry_at` starts one lease in
    /// the future so the sweeper cannot claim the row while the enqueuer's
    /// inline first attempt is still running; a crash before the outcome
    /// is recorded leaves the row to be picked up once the lease lapses.
    pub async fn create(&self, new: NewDelivery) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();
        let id = Uuid::new_v4();

        let model = Model {
            id,
            public_id: format!("whd_{}", id.simple()),
            webhook_id: new.webhook_id,
            event: new.event,
            payload: new.payload,
            signature: new.signature,
            status: DeliveryStatus::Pending.as_str().to_string(),
            attempt_number: 1,
            max_attempts: new.max_attempts,
            status_code: None,
            response_time_ms: None,
            next_retry_at: Some(now + new.first_attempt_lease),
            error: None,
            created_at: now,
            updated_at: now,
        };

        Entity::insert(ActiveModel::from(model.clone()))
            .exec_without_returning(&*self.db)
            .await?;

        Ok(model)
    }

    /// Find a delivery by primary key.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find_by_id(id).one(&*self.db).await
    }

    /// Find a delivery by its external identifier.
    pub async fn find_by_public_id(
        &self,
        public_id: &str,
    ) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::PublicId.eq(public_id))
            .one(&*self.db)
            .await
    }

    /// List deliveries for a webhook, newest first.
    pub async fn list_by_webhook(
        &self,
        webhook_id: Uuid,
        limit: u64,
    ) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::WebhookId.eq(webhook_id))
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await
    }

    /// Claim up to `limit` due deliveries for the sweeper.
    ///
    /// Each candidate is claimed individually by pushing `next_retry_at`
    /// forward by `lease`; a row whose conditional update matched zero rows
    /// was taken by a competing claimer and is skipped.
    pub async fn claim_due(
        &self,
        limit: u64,
        lease: Duration,
    ) -> Result<Vec<Model>, sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        let candidates = Entity::find()
            .filter(
                Column::Status.is_in([
                    DeliveryStatus::Pending.as_str(),
                    DeliveryStatus::Retrying.as_str(),
                ]),
            )
            .filter(Column::NextRetryAt.lte(now))
            .order_by_asc(Column::NextRetryAt)
            .limit(limit)
            .all(&*self.db)
            .await?;

        let mut claimed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let result = Entity::update_many()
                .col_expr(Column::NextRetryAt, Expr::value(now + lease))
                .col_expr(Column::UpdatedAt, Expr::value(now))
                .filter(Column::Id.eq(candidate.id))
                .filter(Column::NextRetryAt.lte(now))
                .exec(&*self.db)
                .await?;

            if result.rows_affected > 0 {
                claimed.push(candidate);
            }
        }

        Ok(claimed)
    }

    /// Record a successful attempt; the row becomes terminal.
    pub async fn mark_delivered(
        &self,
        id: Uuid,
        outcome: AttemptOutcome,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        Entity::update_many()
            .col_expr(
                Column::Status,
                Expr::value(DeliveryStatus::Delivered.as_str()),
            )
            .col_expr(Column::AttemptNumber, Expr::value(outcome.attempt_number))
            .col_expr(Column::StatusCode, Expr::value(outcome.status_code))
            .col_expr(Column::ResponseTimeMs, Expr::value(outcome.response_time_ms))
            .col_expr(Column::NextRetryAt, Expr::value(Option::<DateTime<FixedOffset>>::None))
            .col_expr(Column::Error, Expr::value(Option::<String>::None))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        Ok(())
    }

    /// Record a failed attempt with retries remaining; the row is
    /// rescheduled for `next_retry_at`.
    pub async fn mark_retrying(
        &self,
        id: Uuid,
        outcome: AttemptOutcome,
        next_retry_at: DateTime<FixedOffset>,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        Entity::update_many()
            .col_expr(
                Column::Status,
                Expr::value(DeliveryStatus::Retrying.as_str()),
            )
            .col_expr(Column::AttemptNumber, Expr::value(outcome.attempt_number))
            .col_expr(Column::StatusCode, Expr::value(outcome.status_code))
            .col_expr(Column::ResponseTimeMs, Expr::value(outcome.response_time_ms))
            .col_expr(Column::NextRetryAt, Expr::value(next_retry_at))
            .col_expr(Column::Error, Expr::value(outcome.error))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        Ok(())
    }

    /// Record an exhausted delivery; the row becomes terminal.
    pub async fn mark_failed(
        &self,
        id: Uuid,
        outcome: AttemptOutcome,
    ) -> Result<(), sea_orm::DbErr> {
        let now = Utc::now().fixed_offset();

        Entity::update_many()
            .col_expr(Column::Status, Expr::value(DeliveryStatus::Failed.as_str()))
            .col_expr(Column::AttemptNumber, Expr::value(outcome.attempt_number))
            .col_expr(Column::StatusCode, Expr::value(outcome.status_code))
            .col_expr(Column::ResponseTimeMs, Expr::value(outcome.response_time_ms))
            .col_expr(Column::NextRetryAt, Expr::value(Option::<DateTime<FixedOffset>>::None))
            .col_expr(Column::Error, Expr::value(outcome.error))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .exec(&*self.db)
            .await?;

        Ok(())
    }

    /// Count non-terminal rows, for health reporting.
    pub async fn count_in_flight(&self) -> Result<u64, sea_orm::DbErr> {
        Entity::find()
            .filter(
                Column::Status.is_in([
                    DeliveryStatus::Pending.as_str(),
                    DeliveryStatus::Retrying.as_str(),
                ]),
            )
            .count(&*self.db)
            .await
    }
}
