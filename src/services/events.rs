//! # Event Service
//!
//! Append-only integration event log and the aggregated health summary
//! derived from it.

use chrono::{Duration, Utc};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::integration_event::{EventDirection, EventStatus, Model as EventModel};
use crate::repositories::integration_event::{EventFilter, IntegrationEventRepository, NewEvent};

/// Errors surfaced by event log operations.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

impl From<EventError> for ApiError {
    fn from(error: EventError) -> Self {
        match error {
            EventError::Validation(message) => ApiError::new(
                axum::http::StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED".to_string(),
                message,
            ),
            EventError::Db(db_err) => db_err.into(),
        }
    }
}

/// Aggregated activity over the trailing 24 hours.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActivitySummary {
    pub window_hours: u32,
    pub successes: u64,
    pub failures: u64,
    pub pending: u64,
    /// successes / (successes + failures); 1.0 when idle
    pub success_rate: f64,
}

/// Service over the integration event log
pub struct EventService {
    events: IntegrationEventRepository,
}

impl EventService {
    /// Create a new event service
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            events: IntegrationEventRepository::new(db),
        }
    }

    /// Append an event row.
    pub async fn record(
        &self,
        user_id: Uuid,
        integration: Option<String>,
        event_type: String,
        direction: EventDirection,
        status: EventStatus,
        payload: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<EventModel, EventError> {
        if event_type.trim().is_empty() {
            return Err(EventError::Validation("event_type must not be empty".into()));
        }

        Ok(self
            .events
            .record(NewEvent {
                user_id,
                integration,
                event_type,
                direction,
                status,
                payload,
                error,
            })
            .await?)
    }

    /// List events matching the filter, newest first.
    pub async fn list(
        &self,
        filter: EventFilter,
        limit: u64,
    ) -> Result<Vec<EventModel>, EventError> {
        Ok(self.events.list(filter, limit.clamp(1, 500)).await?)
    }

    /// Aggregate activity over the trailing 24 hours.
    pub async fn activity_summary(&self) -> Result<ActivitySummary, EventError> {
        let since = Utc::now().fixed_offset() - Duration::hours(24);

        let successes = self.events.count_since(EventStatus::Success, since).await?;
        let failures = self.events.count_since(EventStatus::Failed, since).await?;
        let pending = self.events.count_since(EventStatus::Pending, since).await?;

        let finished = successes + failures;
        let success_rate = if finished == 0 {
            1.0
        } else {
            successes as f64 / finished as f64
        };

        Ok(ActivitySummary {
            window_hours: 24,
            successes,
            failures,
            pending,
            success_rate,
        })
    }
}
