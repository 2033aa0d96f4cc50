//! # API Key Handlers
//!
//! Endpoints for issuing, validating and managing API keys. The plaintext
//! key appears in exactly one response: the creation response.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{ActorExtension, ActorHeader, OperatorAuth};
use crate::error::ApiError;
use crate::handlers::ensure_owner;
use crate::models::api_key::Model as ApiKeyModel;
use crate::rate_limit::RateLimitQuota;
use crate::repositories::api_key::ApiKeyChanges;
use crate::server::AppState;
use crate::services::api_keys::ApiKeyValidation;

/// Request body for creating an API key
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateApiKeyRequest {
    /// Human-readable label for the key
    pub name: String,
    /// Granted scopes; at least one is required
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Per-window rate limits (default: 60/minute, 1000/hour, 10000/day)
    pub rate_limit: Option<RateLimitQuota>,
    /// Optional IP allowlist
    pub allowed_ips: Option<Vec<String>>,
    /// Optional expiry; omitted keys never expire
    pub expires_at: Option<DateTime<FixedOffset>>,
}

/// Request body for updating an API key
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateApiKeyRequest {
    pub name: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub rate_limit: Option<RateLimitQuota>,
    pub is_active: Option<bool>,
}

/// Request body for revoking an API key
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct RevokeApiKeyRequest {
    /// Reason recorded with the revocation
    pub reason: Option<String>,
}

/// Request body for validating a presented key
#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateApiKeyRequest {
    /// The full plaintext key as presented by a caller
    pub key: String,
}

/// API key information for responses; never includes hash or plaintext
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeyInfo {
    pub id: String,
    pub name: String,
    /// Non-secret display prefix of the key
    pub key_prefix: String,
    pub scopes: serde_json::Value,
    pub rate_limit: RateLimitQuota,
    pub is_active: bool,
    pub expires_at: Option<String>,
    pub total_requests: i64,
    pub total_errors: i64,
    pub last_used_at: Option<String>,
    pub revoked_at: Option<String>,
    pub created_at: String,
}

impl From<ApiKeyModel> for ApiKeyInfo {
    fn from(model: ApiKeyModel) -> Self {
        Self {
            id: model.public_id,
            name: model.name,
            key_prefix: model.key_prefix,
            scopes: model.scopes,
            rate_limit: RateLimitQuota::new(
                model.rate_per_minute,
                model.rate_per_hour,
                model.rate_per_day,
            ),
            is_active: model.is_active,
            expires_at: model.expires_at.map(|dt| dt.to_rfc3339()),
            total_requests: model.total_requests,
            total_errors: model.total_errors,
            last_used_at: model.last_used_at.map(|dt| dt.to_rfc3339()),
            revoked_at: model.revoked_at.map(|dt| dt.to_rfc3339()),
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Creation response carrying the one-time plaintext key
#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedApiKeyResponse {
    #[serde(flatten)]
    pub info: ApiKeyInfo,
    /// Full plaintext key; shown only in this response
    pub key: String,
}

/// Response wrapper for key listings
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiKeysResponse {
    pub api_keys: Vec<ApiKeyInfo>,
}

/// Revocation outcome
#[derive(Debug, Serialize, ToSchema)]
pub struct RevokedResponse {
    /// False when the key had already been revoked
    pub revoked: bool,
}

/// Create an API key for the acting user
#[utoipa::path(
    post,
    path = "/api-keys",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = CreateApiKeyRequest,
    responses(
        (status = 201, description = "API key created", body = CreatedApiKeyResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn create_api_key(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreatedApiKeyResponse>), ApiError> {
    let created = state
        .api_keys
        .create(
            actor.user_id,
            request.name,
            request.scopes,
            request.rate_limit,
            request.allowed_ips,
            request.expires_at,
            actor.user_id,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatedApiKeyResponse {
            info: created.key.into(),
            key: created.plaintext,
        }),
    ))
}

/// List the acting user's API keys
#[utoipa::path(
    get,
    path = "/api-keys",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    responses(
        (status = 200, description = "List of API keys", body = ApiKeysResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn list_api_keys(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
) -> Result<Json<ApiKeysResponse>, ApiError> {
    let keys = state.api_keys.list(actor.user_id).await?;

    Ok(Json(ApiKeysResponse {
        api_keys: keys.into_iter().map(ApiKeyInfo::from).collect(),
    }))
}

/// Fetch one API key
#[utoipa::path(
    get,
    path = "/api-keys/{id}",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "API key identifier")),
    responses(
        (status = 200, description = "API key", body = ApiKeyInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn get_api_key(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
) -> Result<Json<ApiKeyInfo>, ApiError> {
    let key = state.api_keys.get(&id).await?;
    ensure_owner(key.user_id, &actor)?;

    Ok(Json(key.into()))
}

/// Update an API key's settings
#[utoipa::path(
    patch,
    path = "/api-keys/{id}",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "API key identifier")),
    request_body = UpdateApiKeyRequest,
    responses(
        (status = 200, description = "Updated API key", body = ApiKeyInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn update_api_key(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
    Json(request): Json<UpdateApiKeyRequest>,
) -> Result<Json<ApiKeyInfo>, ApiError> {
    let key = state.api_keys.get(&id).await?;
    ensure_owner(key.user_id, &actor)?;

    let updated = state
        .api_keys
        .update(
            &id,
            ApiKeyChanges {
                name: request.name,
                scopes: request.scopes,
                quota: request.rate_limit,
                is_active: request.is_active,
                ..Default::default()
            },
            actor.user_id,
        )
        .await?;

    Ok(Json(updated.into()))
}

/// Delete an API key
#[utoipa::path(
    delete,
    path = "/api-keys/{id}",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "API key identifier")),
    responses(
        (status = 204, description = "API key deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn delete_api_key(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let key = state.api_keys.get(&id).await?;
    ensure_owner(key.user_id, &actor)?;

    state.api_keys.delete(&id, actor.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Revoke an API key (idempotent)
#[utoipa::path(
    post,
    path = "/api-keys/{id}/revoke",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "API key identifier")),
    request_body = RevokeApiKeyRequest,
    responses(
        (status = 200, description = "Revocation outcome", body = RevokedResponse),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn revoke_api_key(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
    Json(request): Json<RevokeApiKeyRequest>,
) -> Result<Json<RevokedResponse>, ApiError> {
    let key = state.api_keys.get(&id).await?;
    ensure_owner(key.user_id, &actor)?;

    let revoked = state
        .api_keys
        .revoke(&id, request.reason.as_deref(), actor.user_id)
        .await?;

    Ok(Json(RevokedResponse { revoked }))
}

/// Validate a presented API key, recording usage on acceptance
#[utoipa::path(
    post,
    path = "/api-keys/validate",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = ValidateApiKeyRequest,
    responses(
        (status = 200, description = "Validation result", body = ApiKeyValidation),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "api-keys"
)]
pub async fn validate_api_key(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<ValidateApiKeyRequest>,
) -> Result<Json<ApiKeyValidation>, ApiError> {
    let validation = state.api_keys.validate_and_touch(&request.key).await?;
    Ok(Json(validation))
}
