//! # API Key Service
//!
//! Issues and validates long-lived API keys. Validation is a single
//! indexed lookup on the key prefix followed by a constant-time digest
//! comparison; the plaintext key is never stored and never logged.

use axum::http::StatusCode;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::credentials::{self, SecretKind};
use crate::error::ApiError;
use crate::models::api_key::Model as ApiKeyModel;
use crate::models::integration_event::{EventDirection, EventStatus};
use crate::rate_limit::RateLimitQuota;
use crate::repositories::api_key::{ApiKeyChanges, ApiKeyRepository, NewApiKey};
use crate::repositories::integration_event::{IntegrationEventRepository, NewEvent};

/// Why a presented key was rejected.
///
/// `InvalidKey` deliberately covers both "no such prefix" and "digest
/// mismatch" so a caller probing keys cannot distinguish the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyRejection {
    InvalidKey,
    KeyInactive,
    KeyExpired,
}

impl ApiKeyRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKeyRejection::InvalidKey => "invalid_key",
            ApiKeyRejection::KeyInactive => "key_inactive",
            ApiKeyRejection::KeyExpired => "key_expired",
        }
    }
}

/// Result of validating a presented API key.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiKeyValidation {
    pub valid: bool,
    /// External identifier of the matched key, when one matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitQuota>,
    /// Rejection reason when `valid` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiKeyRejection>,
}

impl ApiKeyValidation {
    fn rejected(reason: ApiKeyRejection) -> Self {
        Self {
            valid: false,
            key_id: None,
            user_id: None,
            scopes: None,
            rate_limit: None,
            error: Some(reason),
        }
    }

    fn accepted(key: &ApiKeyModel) -> Self {
        Self {
            valid: true,
            key_id: Some(key.public_id.clone()),
            user_id: Some(key.user_id),
            scopes: Some(scopes_of(key)),
            rate_limit: Some(RateLimitQuota::new(
                key.rate_per_minute,
                key.rate_per_hour,
                key.rate_per_day,
            )),
            error: None,
        }
    }
}

/// A freshly created key. `plaintext` is returned to the caller exactly
/// once and cannot be recovered afterwards.
pub struct CreatedApiKey {
    pub key: ApiKeyModel,
    pub plaintext: String,
}

/// Errors surfaced by API key operations.
#[derive(Debug, Error)]
pub enum ApiKeyError {
    #[error("api key not found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

impl From<ApiKeyError> for ApiError {
    fn from(error: ApiKeyError) -> Self {
        match error {
            ApiKeyError::NotFound => crate::error::not_found("API key"),
            ApiKeyError::Validation(message) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED".to_string(),
                message,
            ),
            ApiKeyError::Db(db_err) => db_err.into(),
        }
    }
}

fn scopes_of(key: &ApiKeyModel) -> Vec<String> {
    key.scopes
        .as_array()
        .map(|scopes| {
            scopes
                .iter()
                .filter_map(|s| s.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Service for API key issuance, validation and lifecycle management
pub struct ApiKeyService {
    keys: ApiKeyRepository,
    events: IntegrationEventRepository,
}

impl ApiKeyService {
    /// Create a new API key service
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            keys: ApiKeyRepository::new(Arc::clone(&db)),
            events: IntegrationEventRepository::new(db),
        }
    }

    /// Issue a new key for `user_id`. The generated plaintext is present in
    /// the return value only; the row stores its prefix and digest.
    pub async fn create(
        &self,
        user_id: Uuid,
        name: String,
        scopes: Vec<String>,
        quota: Option<RateLimitQuota>,
        allowed_ips: Option<Vec<String>>,
        expires_at: Option<chrono::DateTime<chrono::FixedOffset>>,
        created_by: Uuid,
    ) -> Result<CreatedApiKey, ApiKeyError> {
        if name.trim().is_empty() {
            return Err(ApiKeyError::Validation("name must not be empty".into()));
        }
        if scopes.is_empty() {
            return Err(ApiKeyError::Validation(
                "at least one scope is required".into(),
            ));
        }
        let quota = quota.unwrap_or_default();
        if !quota.is_valid() {
            return Err(ApiKeyError::Validation(
                "rate limits must be positive integers".into(),
            ));
        }
        if let Some(expires_at) = expires_at
            && expires_at <= Utc::now().fixed_offset()
        {
            return Err(ApiKeyError::Validation(
                "expires_at must be in the future".into(),
            ));
        }

        let secret = credentials::generate_default_secret(SecretKind::ApiKey);
        let key = self
            .keys
            .create(NewApiKey {
                user_id,
                name,
                key_prefix: secret.prefix.clone(),
                key_hash: secret.hash.clone(),
                scopes,
                quota,
                allowed_ips,
                expires_at,
                created_by,
            })
            .await?;

        self.audit(&key, "api_key.created", None).await?;

        tracing::info!(key_id = %key.public_id, user_id = %user_id, "API key created");

        Ok(CreatedApiKey {
            key,
            plaintext: secret.plaintext.clone(),
        })
    }

    /// Validate a presented key without recording usage.
    pub async fn validate(&self, presented: &str) -> Result<ApiKeyValidation, ApiKeyError> {
        let Some(key) = self.lookup(presented).await? else {
            return Ok(ApiKeyValidation::rejected(ApiKeyRejection::InvalidKey));
        };

        Ok(self.evaluate(&key))
    }

    /// Validate a presented key and, on acceptance, atomically bump its
    /// usage counters. The counter update re-checks `is_active` so a key
    /// revoked mid-flight is not recorded as used.
    pub async fn validate_and_touch(
        &self,
        presented: &str,
    ) -> Result<ApiKeyValidation, ApiKeyError> {
        let Some(key) = self.lookup(presented).await? else {
            return Ok(ApiKeyValidation::rejected(ApiKeyRejection::InvalidKey));
        };

        let validation = self.evaluate(&key);
        if !validation.valid {
            return Ok(validation);
        }

        if !self.keys.touch_usage(key.id).await? {
            // Deactivated between lookup and update.
            return Ok(ApiKeyValidation::rejected(ApiKeyRejection::KeyInactive));
        }

        Ok(validation)
    }

    /// Record an error attributed to a key (e.g. a downstream 4xx/5xx).
    pub async fn record_error(&self, public_id: &str) -> Result<(), ApiKeyError> {
        let key = self
            .keys
            .find_by_public_id(public_id)
            .await?
            .ok_or(ApiKeyError::NotFound)?;
        self.keys.record_error(key.id).await?;
        Ok(())
    }

    /// Revoke a key. Idempotent: revoking an already-revoked key returns
    /// `false` without error, and the original revocation metadata stands.
    pub async fn revoke(
        &self,
        public_id: &str,
        reason: Option<&str>,
        revoked_by: Uuid,
    ) -> Result<bool, ApiKeyError> {
        let key = self
            .keys
            .find_by_public_id(public_id)
            .await?
            .ok_or(ApiKeyError::NotFound)?;

        let revoked = self.keys.revoke(key.id, reason, revoked_by).await?;
        if revoked {
            self.audit(&key, "api_key.revoked", reason).await?;
            tracing::info!(key_id = %public_id, "API key revoked");
        }

        Ok(revoked)
    }

    /// Update a key's mutable settings.
    pub async fn update(
        &self,
        public_id: &str,
        changes: ApiKeyChanges,
        updated_by: Uuid,
    ) -> Result<ApiKeyModel, ApiKeyError> {
        if let Some(quota) = &changes.quota
            && !quota.is_valid()
        {
            return Err(ApiKeyError::Validation(
                "rate limits must be positive integers".into(),
            ));
        }

        let key = self
            .keys
            .find_by_public_id(public_id)
            .await?
            .ok_or(ApiKeyError::NotFound)?;

        Ok(self.keys.update(key.id, changes, updated_by).await?)
    }

    /// Fetch a key by its external identifier.
    pub async fn get(&self, public_id: &str) -> Result<ApiKeyModel, ApiKeyError> {
        self.keys
            .find_by_public_id(public_id)
            .await?
            .ok_or(ApiKeyError::NotFound)
    }

    /// List a user's keys.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<ApiKeyModel>, ApiKeyError> {
        Ok(self.keys.list_by_user(user_id).await?)
    }

    /// Soft-delete a key.
    pub async fn delete(&self, public_id: &str, deleted_by: Uuid) -> Result<(), ApiKeyError> {
        let key = self
            .keys
            .find_by_public_id(public_id)
            .await?
            .ok_or(ApiKeyError::NotFound)?;

        self.keys.soft_delete(key.id, deleted_by).await?;
        Ok(())
    }

    /// Append a lifecycle entry for `key` to the event log.
    async fn audit(
        &self,
        key: &ApiKeyModel,
        event_type: &str,
        reason: Option<&str>,
    ) -> Result<(), ApiKeyError> {
        self.events
            .record(NewEvent {
                user_id: key.user_id,
                integration: None,
                event_type: event_type.to_string(),
                direction: EventDirection::Inbound,
                status: EventStatus::Success,
                payload: Some(serde_json::json!({
                    "key_id": key.public_id,
                    "name": key.name,
                    "reason": reason,
                })),
                error: None,
            })
            .await?;
        Ok(())
    }

    /// Prefix lookup plus constant-time digest comparison. A prefix hit
    /// with a digest mismatch is treated the same as a miss.
    async fn lookup(&self, presented: &str) -> Result<Option<ApiKeyModel>, ApiKeyError> {
        if presented.len() < credentials::PREFIX_LEN {
            return Ok(None);
        }

        let prefix = credentials::prefix_of(presented);
        let Some(key) = self.keys.find_by_prefix(&prefix).await? else {
            return Ok(None);
        };

        if !credentials::verify_secret(presented, &key.key_hash) {
            return Ok(None);
        }

        Ok(Some(key))
    }

    /// Check liveness of a matched key. Expiry is evaluated lazily here;
    /// no background job flips expired keys.
    fn evaluate(&self, key: &ApiKeyModel) -> ApiKeyValidation {
        if !key.is_active {
            return ApiKeyValidation::rejected(ApiKeyRejection::KeyInactive);
        }

        if let Some(expires_at) = key.expires_at
            && expires_at <= Utc::now().fixed_offset()
        {
            return ApiKeyValidation::rejected(ApiKeyRejection::KeyExpired);
        }

        ApiKeyValidation::accepted(key)
    }
}
