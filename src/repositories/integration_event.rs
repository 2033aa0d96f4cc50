//! # Integration Event Repository
//!
//! Append-only writes and windowed reads over the integration event log.

use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::integration_event::{
    ActiveModel, Column, Entity, EventDirection, EventStatus, Model,
};

/// Fields accepted when recording an event.
pub struct NewEvent {
    pub user_id: Uuid,
    pub integration: Option<String>,
    pub event_type: String,
    pub direction: EventDirection,
    pub status: EventStatus,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
}

/// Filters applied when listing events.
#[derive(Default)]
pub struct EventFilter {
    pub user_id: Option<Uuid>,
    pub integration: Option<String>,
    pub event_type: Option<String>,
    pub status: Option<EventStatus>,
    pub since: Option<DateTime<FixedOffset>>,
}

/// Repository for the integration event log
pub struct IntegrationEventRepository {
    db: Arc<DatabaseConnection>,
}

impl IntegrationEventRepository {
    /// Create a new integration event repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Append an event row. Rows are never updated afterwards.
    pub async fn record(&self, new: NewEvent) -> Result<Model, sea_orm::DbErr> {
        let model = Model {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            integration: new.integration,
            event_type: new.event_type,
            direction: new.direction.as_str().to_string(),
            status: new.status.as_str().to_string(),
            payload: new.payload,
            error: new.error,
            created_at: Utc::now().fixed_offset(),
        };

        Entity::insert(ActiveModel::from(model.clone()))
            .exec_without_returning(&*self.db)
            .await?;

        Ok(model)
    }

    /// List events matching the filter, newest first.
    pub async fn list(
        &self,
        filter: EventFilter,
        limit: u64,
    ) -> Result<Vec<Model>, sea_orm::DbErr> {
        let mut query = Entity::find();

        if let Some(user_id) = filter.user_id {
            query = query.filter(Column::UserId.eq(user_id));
        }
        if let Some(integration) = filter.integration {
            query = query.filter(Column::Integration.eq(integration));
        }
        if let Some(event_type) = filter.event_type {
            query = query.filter(Column::EventType.eq(event_type));
        }
        if let Some(status) = filter.status {
            query = query.filter(Column::Status.eq(status.as_str()));
        }
        if let Some(since) = filter.since {
            query = query.filter(Column::CreatedAt.gte(since));
        }

        query
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await
    }

    /// Count events with the given status recorded since `since`.
    pub async fn count_since(
        &self,
        status: EventStatus,
        since: DateTime<FixedOffset>,
    ) -> Result<u64, sea_orm::DbErr> {
        Entity::find()
            .filter(Column::Status.eq(status.as_str()))
            .filter(Column::CreatedAt.gte(since))
            .count(&*self.db)
            .await
    }
}
