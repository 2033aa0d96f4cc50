//! # Webhook Handlers
//!
//! Endpoints for registering webhooks, triggering event fan-out, sending
//! test deliveries and inspecting delivery history. The signing secret is
//! returned in full exactly once, at registration.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{ActorExtension, ActorHeader, OperatorAuth};
use crate::credentials;
use crate::error::ApiError;
use crate::handlers::ensure_owner;
use crate::models::webhook::Model as WebhookModel;
use crate::models::webhook_delivery::Model as DeliveryModel;
use crate::repositories::webhook::{RetryPolicy, WebhookChanges};
use crate::server::AppState;

/// Retry settings accepted on registration and update
#[derive(Debug, Deserialize, ToSchema)]
pub struct RetryPolicyRequest {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub max_attempts: Option<i32>,
    pub backoff_multiplier: Option<f64>,
    pub initial_delay_seconds: Option<i32>,
}

fn default_true() -> bool {
    true
}

impl From<RetryPolicyRequest> for RetryPolicy {
    fn from(request: RetryPolicyRequest) -> Self {
        let defaults = RetryPolicy::default();
        Self {
            enabled: request.enabled,
            max_attempts: request.max_attempts.unwrap_or(defaults.max_attempts),
            backoff_multiplier: request
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
            initial_delay_seconds: request
                .initial_delay_seconds
                .unwrap_or(defaults.initial_delay_seconds),
        }
    }
}

/// Request body for registering a webhook
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWebhookRequest {
    /// Endpoint URL; must be http or https
    pub url: String,
    /// Subscribed event types; `*` subscribes to everything
    pub events: Vec<String>,
    /// Delivery method, POST (default) or PUT
    pub method: Option<String>,
    /// Extra headers sent with every delivery
    pub headers: Option<serde_json::Value>,
    /// Per-request timeout (default 10s)
    pub timeout_seconds: Option<i32>,
    pub retry: Option<RetryPolicyRequest>,
}

/// Request body for updating a webhook
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateWebhookRequest {
    pub url: Option<String>,
    pub events: Option<Vec<String>>,
    pub headers: Option<Option<serde_json::Value>>,
    pub timeout_seconds: Option<i32>,
    pub retry: Option<RetryPolicyRequest>,
    pub is_active: Option<bool>,
}

/// Request body for triggering an event fan-out
#[derive(Debug, Deserialize, ToSchema)]
pub struct TriggerEventRequest {
    /// Event type, e.g. `content.published`
    pub event: String,
    #[serde(default = "default_payload")]
    pub payload: serde_json::Value,
}

fn default_payload() -> serde_json::Value {
    serde_json::json!({})
}

/// Query parameters for delivery listings
#[derive(Debug, Deserialize, IntoParams)]
pub struct DeliveryListQuery {
    /// Maximum rows to return (default 50, max 500)
    pub limit: Option<u64>,
}

/// Webhook information for responses; the secret appears masked
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookInfo {
    pub id: String,
    pub url: String,
    /// Non-secret display prefix of the signing secret
    pub secret_prefix: String,
    pub events: serde_json::Value,
    pub method: String,
    pub headers: Option<serde_json::Value>,
    pub timeout_seconds: i32,
    pub retry_enabled: bool,
    pub retry_max_attempts: i32,
    pub retry_backoff_multiplier: f64,
    pub retry_initial_delay_seconds: i32,
    pub is_active: bool,
    pub total_deliveries: i64,
    pub successful_deliveries: i64,
    pub failed_deliveries: i64,
    pub last_triggered_at: Option<String>,
    pub last_success_at: Option<String>,
    pub last_failure_at: Option<String>,
    pub created_at: String,
}

impl From<WebhookModel> for WebhookInfo {
    fn from(model: WebhookModel) -> Self {
        Self {
            id: model.public_id,
            url: model.url,
            secret_prefix: credentials::prefix_of(&model.secret),
            events: model.events,
            method: model.method,
            headers: model.headers,
            timeout_seconds: model.timeout_seconds,
            retry_enabled: model.retry_enabled,
            retry_max_attempts: model.retry_max_attempts,
            retry_backoff_multiplier: model.retry_backoff_multiplier,
            retry_initial_delay_seconds: model.retry_initial_delay_seconds,
            is_active: model.is_active,
            total_deliveries: model.total_deliveries,
            successful_deliveries: model.successful_deliveries,
            failed_deliveries: model.failed_deliveries,
            last_triggered_at: model.last_triggered_at.map(|dt| dt.to_rfc3339()),
            last_success_at: model.last_success_at.map(|dt| dt.to_rfc3339()),
            last_failure_at: model.last_failure_at.map(|dt| dt.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Registration response carrying the one-time signing secret
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedWebhookResponse {
    #[serde(flatten)]
    pub info: WebhookInfo,
    /// Full signing secret; shown only in this response
    pub secret: String,
}

/// Response wrapper for webhook listings
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhooksResponse {
    pub webhooks: Vec<WebhookInfo>,
}

/// Delivery information for responses
#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveryInfo {
    pub id: String,
    pub webhook_id: String,
    pub event: String,
    pub status: String,
    pub attempt_number: i32,
    pub max_attempts: i32,
    pub status_code: Option<i32>,
    pub response_time_ms: Option<i64>,
    pub next_retry_at: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DeliveryInfo {
    fn from_model(model: DeliveryModel, webhook_public_id: &str) -> Self {
        Self {
            id: model.public_id,
            webhook_id: webhook_public_id.to_string(),
            event: model.event,
            status: model.status,
            attempt_number: model.attempt_number,
            max_attempts: model.max_attempts,
            status_code: model.status_code,
            response_time_ms: model.response_time_ms,
            next_retry_at: model.next_retry_at.map(|dt| dt.to_rfc3339()),
            error: model.error,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
        }
    }
}

/// Response wrapper for delivery listings
#[derive(Debug, Serialize, ToSchema)]
pub struct DeliveriesResponse {
    pub deliveries: Vec<DeliveryInfo>,
}

/// Register a webhook for the acting user
#[utoipa::path(
    post,
    path = "/webhooks",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = CreateWebhookRequest,
    responses(
        (status = 201, description = "Webhook registered", body = CreatedWebhookResponse),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn create_webhook(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Json(request): Json<CreateWebhookRequest>,
) -> Result<(StatusCode, Json<CreatedWebhookResponse>), ApiError> {
    let created = state
        .webhooks
        .create(
            actor.user_id,
            request.url,
            request.events,
            request.method,
            request.headers,
            request.timeout_seconds,
            request.retry.map(RetryPolicy::from),
            actor.user_id,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedWebhookResponse {
            info: created.webhook.into(),
            secret: created.secret,
        }),
    ))
}

/// List the acting user's webhooks
#[utoipa::path(
    get,
    path = "/webhooks",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    responses(
        (status = 200, description = "List of webhooks", body = WebhooksResponse)
    ),
    tag = "webhooks"
)]
pub async fn list_webhooks(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
) -> Result<Json<WebhooksResponse>, ApiError> {
    let webhooks = state.webhooks.list(actor.user_id).await?;

    Ok(Json(WebhooksResponse {
        webhooks: webhooks.into_iter().map(WebhookInfo::from).collect(),
    }))
}

/// Fetch one webhook
#[utoipa::path(
    get,
    path = "/webhooks/{id}",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "Webhook identifier")),
    responses(
        (status = 200, description = "Webhook", body = WebhookInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn get_webhook(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
) -> Result<Json<WebhookInfo>, ApiError> {
    let webhook = state.webhooks.get(&id).await?;
    ensure_owner(webhook.user_id, &actor)?;

    Ok(Json(webhook.into()))
}

/// Update a webhook's settings
#[utoipa::path(
    patch,
    path = "/webhooks/{id}",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "Webhook identifier")),
    request_body = UpdateWebhookRequest,
    responses(
        (status = 200, description = "Updated webhook", body = WebhookInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn update_webhook(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
    Json(request): Json<UpdateWebhookRequest>,
) -> Result<Json<WebhookInfo>, ApiError> {
    let webhook = state.webhooks.get(&id).await?;
    ensure_owner(webhook.user_id, &actor)?;

    let updated = state
        .webhooks
        .update(
            &id,
            WebhookChanges {
                url: request.url,
                events: request.events,
                headers: request.headers,
                timeout_seconds: request.timeout_seconds,
                retry: request.retry.map(RetryPolicy::from),
                is_active: request.is_active,
            },
            actor.user_id,
        )
        .await?;

    Ok(Json(updated.into()))
}

/// Delete a webhook
#[utoipa::path(
    delete,
    path = "/webhooks/{id}",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "Webhook identifier")),
    responses(
        (status = 204, description = "Webhook deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn delete_webhook(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let webhook = state.webhooks.get(&id).await?;
    ensure_owner(webhook.user_id, &actor)?;

    state.webhooks.delete(&id, actor.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Send a synthetic test event to one webhook
#[utoipa::path(
    post,
    path = "/webhooks/{id}/test",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "Webhook identifier")),
    responses(
        (status = 200, description = "Test delivery outcome", body = DeliveryInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn test_webhook(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
) -> Result<Json<DeliveryInfo>, ApiError> {
    let webhook = state.webhooks.get(&id).await?;
    ensure_owner(webhook.user_id, &actor)?;

    let delivery = state.webhooks.test_webhook(&id).await?;

    Ok(Json(DeliveryInfo::from_model(delivery, &webhook.public_id)))
}

/// List recent deliveries for a webhook
#[utoipa::path(
    get,
    path = "/webhooks/{id}/deliveries",
    security(("bearer_auth" = [])),
    params(
        ActorHeader,
        ("id" = String, Path, description = "Webhook identifier"),
        DeliveryListQuery
    ),
    responses(
        (status = 200, description = "Recent deliveries", body = DeliveriesResponse),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn list_deliveries(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
    Query(query): Query<DeliveryListQuery>,
) -> Result<Json<DeliveriesResponse>, ApiError> {
    let webhook = state.webhooks.get(&id).await?;
    ensure_owner(webhook.user_id, &actor)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let deliveries = state.webhooks.list_deliveries(&id, limit).await?;

    Ok(Json(DeliveriesResponse {
        deliveries: deliveries
            .into_iter()
            .map(|d| DeliveryInfo::from_model(d, &webhook.public_id))
            .collect(),
    }))
}

/// Fetch one delivery
#[utoipa::path(
    get,
    path = "/deliveries/{id}",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "Delivery identifier")),
    responses(
        (status = 200, description = "Delivery", body = DeliveryInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn get_delivery(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
) -> Result<Json<DeliveryInfo>, ApiError> {
    let delivery = state.webhooks.get_delivery(&id).await?;

    let webhook = state
        .webhooks
        .webhook_for_delivery(&delivery)
        .await?
        .ok_or_else(|| crate::error::not_found("Delivery"))?;
    ensure_owner(webhook.user_id, &actor)?;

    Ok(Json(DeliveryInfo::from_model(delivery, &webhook.public_id)))
}

/// Trigger an event fan-out across the acting user's webhooks
#[utoipa::path(
    post,
    path = "/events/trigger",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = TriggerEventRequest,
    responses(
        (status = 200, description = "Deliveries created", body = DeliveriesResponse),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "webhooks"
)]
pub async fn trigger_event(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Json(request): Json<TriggerEventRequest>,
) -> Result<Json<DeliveriesResponse>, ApiError> {
    if request.event.trim().is_empty() {
        return Err(crate::error::validation_error(
            "Missing required field",
            serde_json::json!({ "event": "must not be empty" }),
        ));
    }

    let deliveries = state
        .webhooks
        .trigger_event(actor.user_id, &request.event, request.payload)
        .await?;

    let mut infos = Vec::with_capacity(deliveries.len());
    for delivery in deliveries {
        let webhook = state
            .webhooks
            .webhook_for_delivery(&delivery)
            .await?
            .ok_or_else(|| crate::error::not_found("Webhook"))?;
        infos.push(DeliveryInfo::from_model(delivery, &webhook.public_id));
    }

    Ok(Json(DeliveriesResponse { deliveries: infos }))
}
