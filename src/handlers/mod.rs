//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the Integrations API.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod api_keys;
pub mod events;
pub mod oauth;
pub mod webhooks;

/// Resources are user-scoped; admins may act across users.
pub(crate) fn ensure_owner(owner: uuid::Uuid, actor: &crate::auth::Actor) -> Result<(), ApiError> {
    if owner == actor.user_id || actor.is_admin {
        Ok(())
    } else {
        Err(crate::error::forbidden(Some(
            "resource belongs to another user",
        )))
    }
}

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Health report for the service and its delivery backlog
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    /// Deliveries currently pending or awaiting retry
    pub deliveries_in_flight: u64,
}

/// Liveness and readiness probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    crate::db::health_check(&state.db).await.map_err(|e| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE".to_string(),
            format!("database unreachable: {e}"),
        )
    })?;

    let in_flight = state.webhooks.deliveries_in_flight().await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        database: "ok".to_string(),
        deliveries_in_flight: in_flight,
    }))
}
