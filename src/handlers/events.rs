//! # Event Log Handlers
//!
//! Endpoints for appending to and querying the integration event log, plus
//! the aggregated activity summary.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{ActorExtension, ActorHeader, OperatorAuth};
use crate::error::ApiError;
use crate::models::integration_event::{EventDirection, EventStatus, Model as EventModel};
use crate::repositories::integration_event::EventFilter;
use crate::server::AppState;
use crate::services::events::ActivitySummary;

/// Request body for recording an event
#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordEventRequest {
    /// Integration the activity relates to, if any
    pub integration: Option<String>,
    /// Dotted event type, e.g. `sync.completed`
    pub event_type: String,
    #[serde(default = "default_direction")]
    pub direction: EventDirection,
    #[serde(default = "default_status")]
    pub status: EventStatus,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
}

fn default_direction() -> EventDirection {
    EventDirection::Outbound
}

fn default_status() -> EventStatus {
    EventStatus::Success
}

/// Query parameters for event listings
#[derive(Debug, Deserialize, IntoParams)]
pub struct EventListQuery {
    pub integration: Option<String>,
    pub event_type: Option<String>,
    pub status: Option<EventStatus>,
    /// Admins may list another user's events
    pub user_id: Option<Uuid>,
    /// Maximum rows to return (default 50, max 500)
    pub limit: Option<u64>,
}

/// Event information for responses
#[derive(Debug, Serialize, ToSchema)]
pub struct EventInfo {
    pub id: Uuid,
    pub user_id: Uuid,
    pub integration: Option<String>,
    pub event_type: String,
    pub direction: String,
    pub status: String,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: String,
}

impl From<EventModel> for EventInfo {
    fn from(model: EventModel) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            integration: model.integration,
            event_type: model.event_type,
            direction: model.direction,
            status: model.status,
            payload: model.payload,
            error: model.error,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Response wrapper for event listings
#[derive(Debug, Serialize, ToSchema)]
pub struct EventsResponse {
    pub events: Vec<EventInfo>,
}

/// Append an event to the log for the acting user
#[utoipa::path(
    post,
    path = "/events",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = RecordEventRequest,
    responses(
        (status = 201, description = "Event recorded", body = EventInfo),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "events"
)]
pub async fn record_event(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Json(request): Json<RecordEventRequest>,
) -> Result<(StatusCode, Json<EventInfo>), ApiError> {
    let event = state
        .events
        .record(
            actor.user_id,
            request.integration,
            request.event_type,
            request.direction,
            request.status,
            request.payload,
            request.error,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(event.into())))
}

/// List events, newest first
#[utoipa::path(
    get,
    path = "/events",
    security(("bearer_auth" = [])),
    params(ActorHeader, EventListQuery),
    responses(
        (status = 200, description = "Matching events", body = EventsResponse),
        (status = 403, description = "Forbidden", body = ApiError)
    ),
    tag = "events"
)]
pub async fn list_events(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Query(query): Query<EventListQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let user_id = match query.user_id {
        Some(other) if other != actor.user_id => {
            if !actor.is_admin {
                return Err(crate::error::forbidden(Some(
                    "resource belongs to another user",
                )));
            }
            other
        }
        _ => actor.user_id,
    };

    let events = state
        .events
        .list(
            EventFilter {
                user_id: Some(user_id),
                integration: query.integration,
                event_type: query.event_type,
                status: query.status,
                since: None,
            },
            query.limit.unwrap_or(50),
        )
        .await?;

    Ok(Json(EventsResponse {
        events: events.into_iter().map(EventInfo::from).collect(),
    }))
}

/// Aggregated activity over the trailing 24 hours
#[utoipa::path(
    get,
    path = "/events/summary",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    responses(
        (status = 200, description = "Activity summary", body = ActivitySummary)
    ),
    tag = "events"
)]
pub async fn activity_summary(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<ActivitySummary>, ApiError> {
    let summary = state.events.activity_summary().await?;
    Ok(Json(summary))
}
