//! # OAuth Authority
//!
//! App registration and the authorization-code token lifecycle: code
//! issuance, the exactly-once code exchange, refresh without refresh-token
//! rotation, client_credentials issuance, validation and revocation.
//!
//! Errors carry OAuth-style lowercase codes (`invalid_client`,
//! `invalid_grant`, ...) so the application layer can relay them to
//! third-party developers unchanged.

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::OAuthConfig;
use crate::credentials::{self, SecretKind};
use crate::error::ApiError;
use crate::models::integration_event::{EventDirection, EventStatus};
use crate::models::oauth_app::{GrantType, Model as OAuthAppModel};
use crate::models::oauth_token::Model as OAuthTokenModel;
use crate::rate_limit::RateLimitQuota;
use crate::repositories::integration_event::{IntegrationEventRepository, NewEvent};
use crate::repositories::oauth_app::{NewOAuthApp, OAuthAppChanges, OAuthAppRepository};
use crate::repositories::oauth_token::{
    NewAuthorizationCode, NewBearerToken, OAuthTokenRepository,
};

/// Errors surfaced by OAuth operations.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("client authentication failed")]
    InvalidClient,
    #[error("authorization grant is invalid, revoked or already used")]
    InvalidGrant,
    #[error("authorization code has expired")]
    CodeExpired,
    #[error("token has expired")]
    TokenExpired,
    #[error("redirect_uri does not match the one bound to the authorization code")]
    RedirectUriMismatch,
    #[error("redirect_uri is not registered for this application")]
    UnregisteredRedirectUri,
    #[error("redirect_uri is not a valid absolute URI: {0}")]
    InvalidRedirectUri(String),
    #[error("grant type '{0}' is not enabled for this application")]
    UnsupportedGrantType(String),
    #[error("requested scope exceeds the application's registered scopes")]
    InvalidScope,
    #[error("application is deactivated")]
    AppInactive,
    #[error("oauth app not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

impl OAuthError {
    /// OAuth-style error code relayed on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant => "invalid_grant",
            OAuthError::CodeExpired => "authorization_code_expired",
            OAuthError::TokenExpired => "token_expired",
            OAuthError::RedirectUriMismatch => "redirect_uri_mismatch",
            OAuthError::UnregisteredRedirectUri => "invalid_redirect_uri",
            OAuthError::InvalidRedirectUri(_) => "invalid_redirect_uri",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::InvalidScope => "invalid_scope",
            OAuthError::AppInactive => "app_inactive",
            OAuthError::NotFound => "NOT_FOUND",
            OAuthError::Validation(_) => "VALIDATION_FAILED",
            OAuthError::Db(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            OAuthError::InvalidClient | OAuthError::TokenExpired => StatusCode::UNAUTHORIZED,
            OAuthError::AppInactive => StatusCode::FORBIDDEN,
            OAuthError::NotFound => StatusCode::NOT_FOUND,
            OAuthError::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(error: OAuthError) -> Self {
        match error {
            OAuthError::Db(db_err) => db_err.into(),
            other => ApiError::new(
                other.status(),
                other.code().to_string(),
                other.to_string(),
            ),
        }
    }
}

/// A freshly registered app. `client_secret` is shown exactly once.
pub struct RegisteredApp {
    pub app: OAuthAppModel,
    pub client_secret: String,
}

/// A freshly created authorization. The code is single use.
#[derive(Debug, Serialize, ToSchema)]
pub struct Authorization {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub expires_in: u64,
}

/// Issued token pair, shaped like a standard OAuth token response.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

/// Result of validating a presented access token.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TokenValidation {
    fn rejected(error: &str) -> Self {
        Self {
            valid: false,
            user_id: None,
            client_id: None,
            scopes: None,
            error: Some(error.to_string()),
        }
    }
}

fn scopes_of(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|scopes| {
            scopes
                .iter()
                .filter_map(|s| s.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// A redirect URI must be absolute with an explicit scheme and host, and
/// must carry no fragment. Matching elsewhere is exact string equality.
fn validate_redirect_uri(uri: &str) -> Result<(), OAuthError> {
    let parsed = Url::parse(uri).map_err(|_| OAuthError::InvalidRedirectUri(uri.to_string()))?;

    if parsed.host_str().is_none() && parsed.scheme() != "urn" {
        return Err(OAuthError::InvalidRedirectUri(uri.to_string()));
    }
    if parsed.fragment().is_some() {
        return Err(OAuthError::InvalidRedirectUri(uri.to_string()));
    }

    Ok(())
}

/// Service implementing the OAuth authority
pub struct OAuthService {
    apps: OAuthAppRepository,
    tokens: OAuthTokenRepository,
    events: IntegrationEventRepository,
    config: OAuthConfig,
}

impl OAuthService {
    /// Create a new OAuth service
    pub fn new(db: Arc<DatabaseConnection>, config: OAuthConfig) -> Self {
        Self {
            apps: OAuthAppRepository::new(Arc::clone(&db)),
            tokens: OAuthTokenRepository::new(Arc::clone(&db)),
            events: IntegrationEventRepository::new(db),
            config,
        }
    }

    /// Register a new client application. The generated client secret is
    /// returned once; only its digest is stored.
    pub async fn register_app(
        &self,
        user_id: Uuid,
        name: String,
        redirect_uris: Vec<String>,
        scopes: Vec<String>,
        grant_types: Vec<String>,
        quota: Option<RateLimitQuota>,
        created_by: Uuid,
    ) -> Result<RegisteredApp, OAuthError> {
        if name.trim().is_empty() {
            return Err(OAuthError::Validation("name must not be empty".into()));
        }
        if redirect_uris.is_empty() {
            return Err(OAuthError::Validation(
                "at least one redirect_uri is required".into(),
            ));
        }
        for uri in &redirect_uris {
            validate_redirect_uri(uri)?;
        }
        for grant in &grant_types {
            if GrantType::parse(grant).is_none() {
                return Err(OAuthError::UnsupportedGrantType(grant.clone()));
            }
        }
        let quota = quota.unwrap_or_default();
        if !quota.is_valid() {
            return Err(OAuthError::Validation(
                "rate limits must be positive integers".into(),
            ));
        }

        let client_id = format!("client_{}", Uuid::new_v4().simple());
        let secret = credentials::generate_default_secret(SecretKind::ClientSecret);

        let app = self
            .apps
            .create(NewOAuthApp {
                user_id,
                name,
                client_id,
                client_secret_hash: secret.hash.clone(),
                redirect_uris,
                scopes,
                grant_types,
                quota,
                created_by,
            })
            .await?;

        self.audit(app.user_id, "oauth.app_registered", &app).await?;

        tracing::info!(app_id = %app.public_id, client_id = %app.client_id, "OAuth app registered");

        Ok(RegisteredApp {
            app,
            client_secret: secret.plaintext.clone(),
        })
    }

    /// Replace an app's client secret, invalidating the old one immediately.
    pub async fn rotate_client_secret(
        &self,
        public_id: &str,
        rotated_by: Uuid,
    ) -> Result<String, OAuthError> {
        let app = self
            .apps
            .find_by_public_id(public_id)
            .await?
            .ok_or(OAuthError::NotFound)?;

        let secret = credentials::generate_default_secret(SecretKind::ClientSecret);
        self.apps
            .rotate_secret_hash(app.id, &secret.hash, rotated_by)
            .await?;

        tracing::info!(app_id = %public_id, "OAuth client secret rotated");

        Ok(secret.plaintext.clone())
    }

    /// Fetch an app by its external identifier.
    pub async fn get_app(&self, public_id: &str) -> Result<OAuthAppModel, OAuthError> {
        self.apps
            .find_by_public_id(public_id)
            .await?
            .ok_or(OAuthError::NotFound)
    }

    /// List a user's apps.
    pub async fn list_apps(&self, user_id: Uuid) -> Result<Vec<OAuthAppModel>, OAuthError> {
        Ok(self.apps.list_by_user(user_id).await?)
    }

    /// Update an app's mutable settings.
    pub async fn update_app(
        &self,
        public_id: &str,
        changes: OAuthAppChanges,
        updated_by: Uuid,
    ) -> Result<OAuthAppModel, OAuthError> {
        if let Some(redirect_uris) = &changes.redirect_uris {
            if redirect_uris.is_empty() {
                return Err(OAuthError::Validation(
                    "at least one redirect_uri is required".into(),
                ));
            }
            for uri in redirect_uris {
                validate_redirect_uri(uri)?;
            }
        }
        if let Some(grant_types) = &changes.grant_types {
            for grant in grant_types {
                if GrantType::parse(grant).is_none() {
                    return Err(OAuthError::UnsupportedGrantType(grant.clone()));
                }
            }
        }

        let app = self
            .apps
            .find_by_public_id(public_id)
            .await?
            .ok_or(OAuthError::NotFound)?;

        Ok(self.apps.update(app.id, changes, updated_by).await?)
    }

    /// Delete an app and revoke every token it issued.
    pub async fn delete_app(&self, public_id: &str, deleted_by: Uuid) -> Result<u64, OAuthError> {
        let app = self
            .apps
            .find_by_public_id(public_id)
            .await?
            .ok_or(OAuthError::NotFound)?;

        self.apps.soft_delete(app.id, deleted_by).await?;
        let revoked = self
            .tokens
            .revoke_all_for_app(app.id, "app deleted")
            .await?;
        self.audit(app.user_id, "oauth.app_deleted", &app).await?;

        tracing::info!(app_id = %public_id, revoked_tokens = revoked, "OAuth app deleted");

        Ok(revoked)
    }

    /// Start an authorization-code flow: mint a short-lived single-use code
    /// bound to the exact redirect URI it was issued for.
    pub async fn create_authorization(
        &self,
        client_id: &str,
        redirect_uri: &str,
        requested_scopes: Vec<String>,
        state: Option<String>,
        user_id: Uuid,
    ) -> Result<Authorization, OAuthError> {
        let app = self
            .apps
            .find_by_client_id(client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;

        if !app.is_active {
            return Err(OAuthError::AppInactive);
        }
        if !app.allows_grant(GrantType::AuthorizationCode) {
            return Err(OAuthError::UnsupportedGrantType(
                GrantType::AuthorizationCode.as_str().to_string(),
            ));
        }
        if !app.redirect_uri_registered(redirect_uri) {
            return Err(OAuthError::UnregisteredRedirectUri);
        }

        let app_scopes: HashSet<String> = scopes_of(&app.scopes).into_iter().collect();
        if !requested_scopes.iter().all(|s| app_scopes.contains(s)) {
            return Err(OAuthError::InvalidScope);
        }

        let secret = credentials::generate_default_secret(SecretKind::AuthorizationCode);
        let ttl = self.config.code_ttl_seconds;
        let expires_at = Utc::now().fixed_offset() + Duration::seconds(ttl as i64);

        self.tokens
            .create_code(NewAuthorizationCode {
                app_id: app.id,
                user_id,
                code_hash: secret.hash.clone(),
                scopes: requested_scopes,
                redirect_uri: redirect_uri.to_string(),
                state: state.clone(),
                expires_at,
            })
            .await?;

        tracing::info!(client_id = %client_id, user_id = %user_id, "authorization code issued");

        Ok(Authorization {
            code: secret.plaintext.clone(),
            state,
            expires_in: ttl,
        })
    }

    /// Exchange an authorization code for a Bearer pair.
    ///
    /// The code is consumed through a conditional update on its unrevoked
    /// row, so of N concurrent exchanges of the same code exactly one
    /// succeeds; the rest see `invalid_grant`.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let app = self.authenticate_client(client_id, client_secret).await?;

        // The redirect is checked first, against the registered set and
        // then the URI bound at authorization time, so a mismatch reports
        // as such even when the code is also spent or stale.
        if !app.redirect_uri_registered(redirect_uri) {
            return Err(OAuthError::RedirectUriMismatch);
        }

        let code_hash = credentials::hash_secret(code);
        let row = self
            .tokens
            .find_code_by_hash(&code_hash)
            .await?
            .ok_or(OAuthError::InvalidGrant)?;

        if row.app_id != app.id {
            return Err(OAuthError::InvalidGrant);
        }
        if row.redirect_uri.as_deref() != Some(redirect_uri) {
            return Err(OAuthError::RedirectUriMismatch);
        }
        if row.is_revoked {
            return Err(OAuthError::InvalidGrant);
        }
        if row.expires_at <= Utc::now().fixed_offset() {
            return Err(OAuthError::CodeExpired);
        }

        if !self.tokens.consume_code(row.id).await? {
            // Lost the race to a concurrent exchange.
            return Err(OAuthError::InvalidGrant);
        }

        let scopes = scopes_of(&row.scopes);
        self.issue_bearer(&app, row.user_id, scopes, true).await
    }

    /// Issue a fresh access token against an unexpired refresh token.
    /// The refresh token is not rotated and stays valid until its own expiry.
    pub async fn refresh(
        &self,
        client_id: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<TokenResponse, OAuthError> {
        let app = self.authenticate_client(client_id, client_secret).await?;

        let refresh_hash = credentials::hash_secret(refresh_token);
        let row = self
            .tokens
            .find_bearer_by_refresh_hash(&refresh_hash)
            .await?
            .ok_or(OAuthError::InvalidGrant)?;

        if row.app_id != app.id || row.is_revoked {
            return Err(OAuthError::InvalidGrant);
        }
        if let Some(refresh_expires_at) = row.refresh_token_expires_at
            && refresh_expires_at <= Utc::now().fixed_offset()
        {
            return Err(OAuthError::TokenExpired);
        }

        let access = credentials::generate_default_secret(SecretKind::AccessToken);
        let ttl = self.config.access_token_ttl_seconds;
        let expires_at = Utc::now().fixed_offset() + Duration::seconds(ttl as i64);

        if !self
            .tokens
            .rotate_access(row.id, &access.hash, expires_at)
            .await?
        {
            // Revoked between lookup and rotation.
            return Err(OAuthError::InvalidGrant);
        }

        Ok(TokenResponse {
            access_token: access.plaintext.clone(),
            token_type: "Bearer".to_string(),
            expires_in: ttl,
            refresh_token: None,
            scope: scopes_of(&row.scopes).join(" "),
        })
    }

    /// Issue a token directly to the app itself (machine-to-machine). No
    /// refresh token is minted; clients re-authenticate when it expires.
    pub async fn client_credentials(
        &self,
        client_id: &str,
        client_secret: &str,
        requested_scopes: Vec<String>,
    ) -> Result<TokenResponse, OAuthError> {
        let app = self.authenticate_client(client_id, client_secret).await?;

        if !app.allows_grant(GrantType::ClientCredentials) {
            return Err(OAuthError::UnsupportedGrantType(
                GrantType::ClientCredentials.as_str().to_string(),
            ));
        }

        let app_scopes: HashSet<String> = scopes_of(&app.scopes).into_iter().collect();
        let scopes = if requested_scopes.is_empty() {
            scopes_of(&app.scopes)
        } else {
            if !requested_scopes.iter().all(|s| app_scopes.contains(s)) {
                return Err(OAuthError::InvalidScope);
            }
            requested_scopes
        };

        let user_id = app.user_id;
        self.issue_bearer(&app, user_id, scopes, false).await
    }

    /// Validate a presented access token, bumping its usage count on
    /// acceptance.
    pub async fn validate_access_token(
        &self,
        presented: &str,
    ) -> Result<TokenValidation, OAuthError> {
        let hash = credentials::hash_secret(presented);
        let Some(row) = self.tokens.find_bearer_by_access_hash(&hash).await? else {
            return Ok(TokenValidation::rejected("invalid_token"));
        };

        if row.is_revoked {
            return Ok(TokenValidation::rejected("token_revoked"));
        }
        if row.expires_at <= Utc::now().fixed_offset() {
            return Ok(TokenValidation::rejected("token_expired"));
        }

        if !self.tokens.touch_usage(row.id).await? {
            return Ok(TokenValidation::rejected("token_revoked"));
        }

        let client_id = self
            .apps
            .find_by_id(row.app_id)
            .await?
            .map(|app| app.client_id);

        Ok(TokenValidation {
            valid: true,
            user_id: Some(row.user_id),
            client_id,
            scopes: Some(scopes_of(&row.scopes)),
            error: None,
        })
    }

    /// Revoke a token by plaintext; accepts either an access or a refresh
    /// token. Idempotent: revoking twice reports `false` the second time.
    pub async fn revoke_token(
        &self,
        client_id: &str,
        client_secret: &str,
        token: &str,
    ) -> Result<bool, OAuthError> {
        let app = self.authenticate_client(client_id, client_secret).await?;

        let hash = credentials::hash_secret(token);
        let row = match self.tokens.find_bearer_by_access_hash(&hash).await? {
            Some(row) => Some(row),
            None => self.tokens.find_bearer_by_refresh_hash(&hash).await?,
        };

        let Some(row) = row else {
            // RFC 7009 semantics: unknown tokens are not an error.
            return Ok(false);
        };
        if row.app_id != app.id {
            return Err(OAuthError::InvalidGrant);
        }

        let revoked = self.tokens.revoke(row.id, Some("revoked by client")).await?;
        if revoked {
            self.audit(row.user_id, "oauth.token_revoked", &app).await?;
            tracing::info!(client_id = %client_id, "token revoked");
        }

        Ok(revoked)
    }

    /// Append a credential lifecycle entry for `app` to the event log.
    async fn audit(
        &self,
        user_id: Uuid,
        event_type: &str,
        app: &OAuthAppModel,
    ) -> Result<(), OAuthError> {
        self.events
            .record(NewEvent {
                user_id,
                integration: None,
                event_type: event_type.to_string(),
                direction: EventDirection::Inbound,
                status: EventStatus::Success,
                payload: Some(serde_json::json!({
                    "app_id": app.public_id,
                    "client_id": app.client_id,
                })),
                error: None,
            })
            .await?;
        Ok(())
    }

    /// Look up an app by client id and check its secret in constant time.
    /// Unknown client ids and wrong secrets are indistinguishable.
    async fn authenticate_client(
        &self,
        client_id: &str,
        client_secret: &str,
    ) -> Result<OAuthAppModel, OAuthError> {
        let app = self
            .apps
            .find_by_client_id(client_id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;

        if !credentials::verify_secret(client_secret, &app.client_secret_hash) {
            return Err(OAuthError::InvalidClient);
        }
        if !app.is_active {
            return Err(OAuthError::AppInactive);
        }

        Ok(app)
    }

    /// Mint a Bearer pair for `user_id` under `app`.
    async fn issue_bearer(
        &self,
        app: &OAuthAppModel,
        user_id: Uuid,
        scopes: Vec<String>,
        with_refresh: bool,
    ) -> Result<TokenResponse, OAuthError> {
        let access = credentials::generate_default_secret(SecretKind::AccessToken);
        let access_ttl = self.config.access_token_ttl_seconds;
        let now = Utc::now().fixed_offset();
        let expires_at = now + Duration::seconds(access_ttl as i64);

        let (refresh_plaintext, refresh_hash, refresh_expires_at) = if with_refresh {
            let refresh = credentials::generate_default_secret(SecretKind::RefreshToken);
            let refresh_expires_at =
                now + Duration::seconds(self.config.refresh_token_ttl_seconds as i64);
            (
                Some(refresh.plaintext.clone()),
                Some(refresh.hash.clone()),
                Some(refresh_expires_at),
            )
        } else {
            (None, None, None)
        };

        self.tokens
            .create_bearer(NewBearerToken {
                app_id: app.id,
                user_id,
                access_token_hash: access.hash.clone(),
                refresh_token_hash: refresh_hash,
                scopes: scopes.clone(),
                expires_at,
                refresh_token_expires_at: refresh_expires_at,
            })
            .await?;

        tracing::info!(client_id = %app.client_id, user_id = %user_id, "bearer token issued");

        Ok(TokenResponse {
            access_token: access.plaintext.clone(),
            token_type: "Bearer".to_string(),
            expires_in: access_ttl,
            refresh_token: refresh_plaintext,
            scope: scopes.join(" "),
        })
    }
}
