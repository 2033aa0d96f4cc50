//! # OAuth Handlers
//!
//! Endpoints for app registration, the authorization and token endpoints,
//! introspection and revocation. The token endpoint dispatches on
//! `grant_type` the way RFC 6749 describes, with errors relayed using
//! OAuth-style codes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::{ActorExtension, ActorHeader, OperatorAuth};
use crate::error::ApiError;
use crate::handlers::ensure_owner;
use crate::models::oauth_app::Model as OAuthAppModel;
use crate::rate_limit::RateLimitQuota;
use crate::repositories::oauth_app::OAuthAppChanges;
use crate::server::AppState;
use crate::services::oauth::{Authorization, OAuthError, TokenResponse, TokenValidation};

/// Request body for registering an OAuth app
#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterAppRequest {
    pub name: String,
    pub redirect_uris: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Enabled grant types (default: authorization_code and refresh_token)
    pub grant_types: Option<Vec<String>>,
    pub rate_limit: Option<RateLimitQuota>,
}

/// Request body for updating an OAuth app
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateAppRequest {
    pub name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
    pub scopes: Option<Vec<String>>,
    pub grant_types: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

/// Request body for the authorization endpoint
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthorizeRequest {
    pub client_id: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Opaque client state echoed back with the code
    pub state: Option<String>,
}

/// Request body for the token endpoint; fields depend on `grant_type`
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: String,
    pub client_secret: String,
    /// Required for grant_type=authorization_code
    pub code: Option<String>,
    /// Required for grant_type=authorization_code
    pub redirect_uri: Option<String>,
    /// Required for grant_type=refresh_token
    pub refresh_token: Option<String>,
    /// Optional for grant_type=client_credentials
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Request body for token revocation
#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeTokenRequest {
    pub client_id: String,
    pub client_secret: String,
    pub token: String,
}

/// Request body for token introspection
#[derive(Debug, Deserialize, ToSchema)]
pub struct IntrospectRequest {
    pub token: String,
}

/// OAuth app information; never includes the secret digest
#[derive(Debug, Serialize, ToSchema)]
pub struct OAuthAppInfo {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub redirect_uris: serde_json::Value,
    pub scopes: serde_json::Value,
    pub grant_types: serde_json::Value,
    pub is_active: bool,
    pub is_verified: bool,
    pub created_at: String,
}

impl From<OAuthAppModel> for OAuthAppInfo {
    fn from(model: OAuthAppModel) -> Self {
        Self {
            id: model.public_id,
            name: model.name,
            client_id: model.client_id,
            redirect_uris: model.redirect_uris,
            scopes: model.scopes,
            grant_types: model.grant_types,
            is_active: model.is_active,
            is_verified: model.is_verified,
            created_at: model.created_at.to_rfc3339(),
        }
    }
}

/// Registration response carrying the one-time client secret
#[derive(Debug, Serialize, ToSchema)]
pub struct RegisteredAppResponse {
    #[serde(flatten)]
    pub info: OAuthAppInfo,
    /// Full client secret; shown only in this response
    pub client_secret: String,
}

/// Response wrapper for app listings
#[derive(Debug, Serialize, ToSchema)]
pub struct OAuthAppsResponse {
    pub apps: Vec<OAuthAppInfo>,
}

/// Secret rotation response
#[derive(Debug, Serialize, ToSchema)]
pub struct RotatedSecretResponse {
    pub client_secret: String,
}

/// Revocation outcome
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenRevokedResponse {
    /// False when the token was unknown or already revoked
    pub revoked: bool,
}

/// Register an OAuth app for the acting user
#[utoipa::path(
    post,
    path = "/oauth/apps",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = RegisterAppRequest,
    responses(
        (status = 201, description = "App registered", body = RegisteredAppResponse),
        (status = 400, description = "Validation error", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn register_app(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Json(request): Json<RegisterAppRequest>,
) -> Result<(StatusCode, Json<RegisteredAppResponse>), ApiError> {
    let grant_types = request.grant_types.unwrap_or_else(|| {
        vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
        ]
    });

    let registered = state
        .oauth
        .register_app(
            actor.user_id,
            request.name,
            request.redirect_uris,
            request.scopes,
            grant_types,
            request.rate_limit,
            actor.user_id,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisteredAppResponse {
            info: registered.app.into(),
            client_secret: registered.client_secret,
        }),
    ))
}

/// List the acting user's OAuth apps
#[utoipa::path(
    get,
    path = "/oauth/apps",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    responses(
        (status = 200, description = "List of apps", body = OAuthAppsResponse)
    ),
    tag = "oauth"
)]
pub async fn list_apps(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
) -> Result<Json<OAuthAppsResponse>, ApiError> {
    let apps = state.oauth.list_apps(actor.user_id).await?;

    Ok(Json(OAuthAppsResponse {
        apps: apps.into_iter().map(OAuthAppInfo::from).collect(),
    }))
}

/// Fetch one OAuth app
#[utoipa::path(
    get,
    path = "/oauth/apps/{id}",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "App identifier")),
    responses(
        (status = 200, description = "OAuth app", body = OAuthAppInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn get_app(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
) -> Result<Json<OAuthAppInfo>, ApiError> {
    let app = state.oauth.get_app(&id).await?;
    ensure_owner(app.user_id, &actor)?;

    Ok(Json(app.into()))
}

/// Update an OAuth app's settings
#[utoipa::path(
    patch,
    path = "/oauth/apps/{id}",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "App identifier")),
    request_body = UpdateAppRequest,
    responses(
        (status = 200, description = "Updated app", body = OAuthAppInfo),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn update_app(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
    Json(request): Json<UpdateAppRequest>,
) -> Result<Json<OAuthAppInfo>, ApiError> {
    let app = state.oauth.get_app(&id).await?;
    ensure_owner(app.user_id, &actor)?;

    let updated = state
        .oauth
        .update_app(
            &id,
            OAuthAppChanges {
                name: request.name,
                redirect_uris: request.redirect_uris,
                scopes: request.scopes,
                grant_types: request.grant_types,
                is_active: request.is_active,
                ..Default::default()
            },
            actor.user_id,
        )
        .await?;

    Ok(Json(updated.into()))
}

/// Delete an OAuth app, revoking all its tokens
#[utoipa::path(
    delete,
    path = "/oauth/apps/{id}",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "App identifier")),
    responses(
        (status = 204, description = "App deleted"),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn delete_app(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let app = state.oauth.get_app(&id).await?;
    ensure_owner(app.user_id, &actor)?;

    state.oauth.delete_app(&id, actor.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Rotate an app's client secret, invalidating the old one
#[utoipa::path(
    post,
    path = "/oauth/apps/{id}/rotate-secret",
    security(("bearer_auth" = [])),
    params(ActorHeader, ("id" = String, Path, description = "App identifier")),
    responses(
        (status = 200, description = "New client secret", body = RotatedSecretResponse),
        (status = 404, description = "Not found", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn rotate_secret(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Path(id): Path<String>,
) -> Result<Json<RotatedSecretResponse>, ApiError> {
    let app = state.oauth.get_app(&id).await?;
    ensure_owner(app.user_id, &actor)?;

    let client_secret = state.oauth.rotate_client_secret(&id, actor.user_id).await?;

    Ok(Json(RotatedSecretResponse { client_secret }))
}

/// Issue an authorization code for the acting user
#[utoipa::path(
    post,
    path = "/oauth/authorize",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = AuthorizeRequest,
    responses(
        (status = 200, description = "Authorization code issued", body = Authorization),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Unknown client", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn authorize(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    ActorExtension(actor): ActorExtension,
    Json(request): Json<AuthorizeRequest>,
) -> Result<Json<Authorization>, ApiError> {
    let authorization = state
        .oauth
        .create_authorization(
            &request.client_id,
            &request.redirect_uri,
            request.scopes,
            request.state,
            actor.user_id,
        )
        .await?;

    Ok(Json(authorization))
}

/// Token endpoint; dispatches on grant_type
#[utoipa::path(
    post,
    path = "/oauth/token",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = TokenRequest,
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid grant", body = ApiError),
        (status = 401, description = "Client authentication failed", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn token(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<TokenRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let response = match request.grant_type.as_str() {
        "authorization_code" => {
            let code = request.code.ok_or_else(|| missing_field("code"))?;
            let redirect_uri = request
                .redirect_uri
                .ok_or_else(|| missing_field("redirect_uri"))?;

            state
                .oauth
                .exchange_code(
                    &request.client_id,
                    &request.client_secret,
                    &code,
                    &redirect_uri,
                )
                .await?
        }
        "refresh_token" => {
            let refresh_token = request
                .refresh_token
                .ok_or_else(|| missing_field("refresh_token"))?;

            state
                .oauth
                .refresh(&request.client_id, &request.client_secret, &refresh_token)
                .await?
        }
        "client_credentials" => {
            state
                .oauth
                .client_credentials(&request.client_id, &request.client_secret, request.scopes)
                .await?
        }
        other => return Err(OAuthError::UnsupportedGrantType(other.to_string()).into()),
    };

    Ok(Json(response))
}

/// Revoke an access or refresh token (idempotent)
#[utoipa::path(
    post,
    path = "/oauth/revoke",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = RevokeTokenRequest,
    responses(
        (status = 200, description = "Revocation outcome", body = TokenRevokedResponse),
        (status = 401, description = "Client authentication failed", body = ApiError)
    ),
    tag = "oauth"
)]
pub async fn revoke_token(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<RevokeTokenRequest>,
) -> Result<Json<TokenRevokedResponse>, ApiError> {
    let revoked = state
        .oauth
        .revoke_token(&request.client_id, &request.client_secret, &request.token)
        .await?;

    Ok(Json(TokenRevokedResponse { revoked }))
}

/// Validate a presented access token
#[utoipa::path(
    post,
    path = "/oauth/introspect",
    security(("bearer_auth" = [])),
    params(ActorHeader),
    request_body = IntrospectRequest,
    responses(
        (status = 200, description = "Introspection result", body = TokenValidation)
    ),
    tag = "oauth"
)]
pub async fn introspect(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Json(request): Json<IntrospectRequest>,
) -> Result<Json<TokenValidation>, ApiError> {
    let validation = state.oauth.validate_access_token(&request.token).await?;
    Ok(Json(validation))
}

fn missing_field(field: &str) -> ApiError {
    crate::error::validation_error(
        "Missing required field",
        serde_json::json!({ field: "required for this grant_type" }),
    )
}
