//! # Webhook Service
//!
//! Webhook registration and the delivery engine. An event triggered for a
//! user fans out to every active webhook subscribed to it; each delivery
//! row tracks its own attempt sequence. The first attempt runs inline at
//! enqueue time; failed attempts are rescheduled with geometric backoff
//! and picked up by the retry sweeper.

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sea_orm::DatabaseConnection;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::credentials::{self, SecretKind};
use crate::error::ApiError;
use crate::models::integration_event::{EventDirection, EventStatus};
use crate::models::webhook::Model as WebhookModel;
use crate::models::webhook_delivery::Model as DeliveryModel;
use crate::repositories::integration_event::{IntegrationEventRepository, NewEvent};
use crate::repositories::webhook::{NewWebhook, RetryPolicy, WebhookChanges, WebhookRepository};
use crate::repositories::webhook_delivery::{
    AttemptOutcome, NewDelivery, WebhookDeliveryRepository,
};

type HmacSha256 = Hmac<Sha256>;

/// Event type used by endpoint test deliveries.
pub const TEST_EVENT: &str = "webhook.test";

/// Slack added to the inline-attempt lease beyond the request timeout,
/// covering persistence of the outcome.
const ENQUEUE_LEASE_GRACE_SECONDS: i64 = 5;

/// Errors surfaced by webhook operations.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook not found")]
    NotFound,
    #[error("delivery not found")]
    DeliveryNotFound,
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

impl From<WebhookError> for ApiError {
    fn from(error: WebhookError) -> Self {
        match error {
            WebhookError::NotFound => crate::error::not_found("Webhook"),
            WebhookError::DeliveryNotFound => crate::error::not_found("Delivery"),
            WebhookError::Validation(message) => ApiError::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED".to_string(),
                message,
            ),
            WebhookError::Db(db_err) => db_err.into(),
        }
    }
}

/// A freshly registered webhook. `secret` is returned in full exactly once.
pub struct CreatedWebhook {
    pub webhook: WebhookModel,
    pub secret: String,
}

/// How an executed attempt left the delivery row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDisposition {
    /// 2xx response; the row is terminal `delivered`.
    Succeeded,
    /// Failed with attempts remaining; rescheduled.
    Rescheduled,
    /// Failed on the final attempt; the row is terminal `failed`.
    Exhausted,
}

/// Compute the lowercase hex HMAC-SHA256 signature of a request body.
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Delay before retrying after failed attempt `attempt_number` (1-based):
/// `initial_delay * multiplier^(attempt_number - 1)`, capped at one hour.
pub fn backoff_delay(initial_delay_seconds: i32, multiplier: f64, attempt_number: i32) -> Duration {
    const MAX_DELAY_SECONDS: f64 = 3_600.0;

    let exponent = (attempt_number - 1).max(0);
    let delay =
        (initial_delay_seconds.max(1) as f64) * multiplier.max(1.0).powi(exponent);

    Duration::seconds(delay.min(MAX_DELAY_SECONDS) as i64)
}

fn validate_endpoint_url(url: &str) -> Result<(), WebhookError> {
    let parsed = Url::parse(url)
        .map_err(|_| WebhookError::Validation(format!("invalid webhook URL: {url}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(WebhookError::Validation(
            "webhook URL must use http or https".into(),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(WebhookError::Validation("webhook URL must have a host".into()));
    }

    Ok(())
}

/// Service for webhook registration and delivery
pub struct WebhookService {
    webhooks: WebhookRepository,
    deliveries: WebhookDeliveryRepository,
    events: IntegrationEventRepository,
    http: reqwest::Client,
}

impl WebhookService {
    /// Create a new webhook service
    pub fn new(db: Arc<DatabaseConnection>, http: reqwest::Client) -> Self {
        Self {
            webhooks: WebhookRepository::new(Arc::clone(&db)),
            deliveries: WebhookDeliveryRepository::new(Arc::clone(&db)),
            events: IntegrationEventRepository::new(db),
            http,
        }
    }

    /// Register a new webhook. The signing secret is generated server-side
    /// and returned in full only here.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        user_id: Uuid,
        url: String,
        events: Vec<String>,
        method: Option<String>,
        headers: Option<serde_json::Value>,
        timeout_seconds: Option<i32>,
        retry: Option<RetryPolicy>,
        created_by: Uuid,
    ) -> Result<CreatedWebhook, WebhookError> {
        validate_endpoint_url(&url)?;

        if events.is_empty() {
            return Err(WebhookError::Validation(
                "at least one event subscription is required".into(),
            ));
        }

        let method = method.unwrap_or_else(|| "POST".to_string()).to_uppercase();
        if !matches!(method.as_str(), "POST" | "PUT") {
            return Err(WebhookError::Validation(
                "delivery method must be POST or PUT".into(),
            ));
        }

        let timeout_seconds = timeout_seconds.unwrap_or(10);
        if !(1..=60).contains(&timeout_seconds) {
            return Err(WebhookError::Validation(
                "timeout_seconds must be between 1 and 60".into(),
            ));
        }

        let retry = retry.unwrap_or_default();
        if retry.max_attempts < 1 || retry.max_attempts > 10 {
            return Err(WebhookError::Validation(
                "retry_max_attempts must be between 1 and 10".into(),
            ));
        }
        if retry.backoff_multiplier < 1.0 {
            return Err(WebhookError::Validation(
                "retry_backoff_multiplier must be at least 1.0".into(),
            ));
        }
        if retry.initial_delay_seconds < 1 {
            return Err(WebhookError::Validation(
                "retry_initial_delay_seconds must be at least 1".into(),
            ));
        }

        let secret = credentials::generate_default_secret(SecretKind::WebhookSecret);
        let webhook = self
            .webhooks
            .create(NewWebhook {
                user_id,
                url,
                secret: secret.plaintext.clone(),
                events,
                method,
                headers,
                timeout_seconds,
                retry,
                created_by,
            })
            .await?;

        tracing::info!(webhook_id = %webhook.public_id, user_id = %user_id, "webhook created");

        Ok(CreatedWebhook {
            webhook,
            secret: secret.plaintext.clone(),
        })
    }

    /// Fetch a webhook by its external identifier.
    pub async fn get(&self, public_id: &str) -> Result<WebhookModel, WebhookError> {
        self.webhooks
            .find_by_public_id(public_id)
            .await?
            .ok_or(WebhookError::NotFound)
    }

    /// List a user's webhooks.
    pub async fn list(&self, user_id: Uuid) -> Result<Vec<WebhookModel>, WebhookError> {
        Ok(self.webhooks.list_by_user(user_id).await?)
    }

    /// Update a webhook's mutable settings.
    pub async fn update(
        &self,
        public_id: &str,
        changes: WebhookChanges,
        updated_by: Uuid,
    ) -> Result<WebhookModel, WebhookError> {
        if let Some(url) = &changes.url {
            validate_endpoint_url(url)?;
        }
        if let Some(events) = &changes.events
            && events.is_empty()
        {
            return Err(WebhookError::Validation(
                "at least one event subscription is required".into(),
            ));
        }

        let webhook = self
            .webhooks
            .find_by_public_id(public_id)
            .await?
            .ok_or(WebhookError::NotFound)?;

        Ok(self.webhooks.update(webhook.id, changes, updated_by).await?)
    }

    /// Soft-delete a webhook.
    pub async fn delete(&self, public_id: &str, deleted_by: Uuid) -> Result<(), WebhookError> {
        let webhook = self
            .webhooks
            .find_by_public_id(public_id)
            .await?
            .ok_or(WebhookError::NotFound)?;

        self.webhooks.soft_delete(webhook.id, deleted_by).await?;
        Ok(())
    }

    /// Fan an event out to every active webhook of `user_id` subscribed to
    /// it. Each matching webhook gets its own delivery row and an inline
    /// first attempt.
    pub async fn trigger_event(
        &self,
        user_id: Uuid,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<Vec<DeliveryModel>, WebhookError> {
        let webhooks = self.webhooks.list_active_for_user(user_id).await?;

        let mut deliveries = Vec::new();
        for webhook in webhooks {
            if !webhook.subscribes_to(event) {
                continue;
            }

            let delivery = self.enqueue(&webhook, event, payload.clone()).await?;
            let delivery = self.execute_attempt(&webhook, delivery).await?;
            deliveries.push(delivery);
        }

        tracing::info!(
            user_id = %user_id,
            event = %event,
            deliveries = deliveries.len(),
            "event fanned out"
        );

        Ok(deliveries)
    }

    /// Send a synthetic `webhook.test` event to one webhook, regardless of
    /// its subscriptions.
    pub async fn test_webhook(&self, public_id: &str) -> Result<DeliveryModel, WebhookError> {
        let webhook = self
            .webhooks
            .find_by_public_id(public_id)
            .await?
            .ok_or(WebhookError::NotFound)?;

        let payload = serde_json::json!({
            "event": TEST_EVENT,
            "webhook_id": webhook.public_id,
            "timestamp": Utc::now().to_rfc3339(),
        });

        let delivery = self.enqueue(&webhook, TEST_EVENT, payload).await?;
        self.execute_attempt(&webhook, delivery).await
    }

    /// Fetch a delivery by its external identifier.
    pub async fn get_delivery(&self, public_id: &str) -> Result<DeliveryModel, WebhookError> {
        self.deliveries
            .find_by_public_id(public_id)
            .await?
            .ok_or(WebhookError::DeliveryNotFound)
    }

    /// List recent deliveries for a webhook.
    pub async fn list_deliveries(
        &self,
        webhook_public_id: &str,
        limit: u64,
    ) -> Result<Vec<DeliveryModel>, WebhookError> {
        let webhook = self
            .webhooks
            .find_by_public_id(webhook_public_id)
            .await?
            .ok_or(WebhookError::NotFound)?;

        Ok(self.deliveries.list_by_webhook(webhook.id, limit).await?)
    }

    /// Look up the webhook a claimed delivery belongs to.
    pub async fn webhook_for_delivery(
        &self,
        delivery: &DeliveryModel,
    ) -> Result<Option<WebhookModel>, WebhookError> {
        Ok(self.webhooks.find_by_id(delivery.webhook_id).await?)
    }

    /// Claim due deliveries for the sweeper; see the repository for the
    /// lease semantics.
    pub async fn claim_due_deliveries(
        &self,
        limit: u64,
        lease: Duration,
    ) -> Result<Vec<DeliveryModel>, WebhookError> {
        Ok(self.deliveries.claim_due(limit, lease).await?)
    }

    /// Count non-terminal deliveries, for health reporting.
    pub async fn deliveries_in_flight(&self) -> Result<u64, WebhookError> {
        Ok(self.deliveries.count_in_flight().await?)
    }

    /// Insert a pending delivery row and bump the webhook's trigger counters.
    async fn enqueue(
        &self,
        webhook: &WebhookModel,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<DeliveryModel, WebhookError> {
        let body = serde_json::to_vec(&payload)
            .map_err(|e| WebhookError::Validation(format!("payload is not serializable: {e}")))?;
        let signature = sign_payload(&webhook.secret, &body);

        let max_attempts = if webhook.retry_enabled {
            webhook.retry_max_attempts
        } else {
            1
        };

        // The lease must outlast the inline attempt, which is bounded by
        // the webhook's request timeout.
        let first_attempt_lease =
            Duration::seconds(webhook.timeout_seconds as i64 + ENQUEUE_LEASE_GRACE_SECONDS);

        let delivery = self
            .deliveries
            .create(NewDelivery {
                webhook_id: webhook.id,
                event: event.to_string(),
                payload,
                signature,
                max_attempts,
                first_attempt_lease,
            })
            .await?;

        self.webhooks.record_enqueued(webhook.id).await?;

        Ok(delivery)
    }

    /// Execute one attempt of a delivery and persist the outcome. Returns
    /// the refreshed delivery row.
    pub async fn execute_attempt(
        &self,
        webhook: &WebhookModel,
        delivery: DeliveryModel,
    ) -> Result<DeliveryModel, WebhookError> {
        let attempt = delivery.attempt_number;

        // A webhook deactivated while deliveries are in flight fails them
        // terminally instead of burning retries against a dead endpoint.
        if !webhook.is_active {
            self.deliveries
                .mark_failed(
                    delivery.id,
                    AttemptOutcome {
                        attempt_number: attempt,
                        status_code: None,
                        response_time_ms: None,
                        error: Some("webhook deactivated".to_string()),
                    },
                )
                .await?;
            self.webhooks.record_terminal_failure(webhook.id).await?;
            self.record_outcome(webhook, &delivery, EventStatus::Failed, Some("webhook deactivated"))
                .await?;

            return Ok(self.refreshed(delivery.id).await?);
        }

        let (status_code, response_time_ms, error) = self.send(webhook, &delivery).await;
        let succeeded = status_code.map(|code| (200..300).contains(&code)).unwrap_or(false);

        metrics::counter!("webhook_delivery_attempts_total").increment(1);
        if let Some(elapsed) = response_time_ms {
            metrics::histogram!("webhook_delivery_response_time_ms").record(elapsed as f64);
        }

        if succeeded {
            self.deliveries
                .mark_delivered(
                    delivery.id,
                    AttemptOutcome {
                        attempt_number: attempt,
                        status_code,
                        response_time_ms,
                        error: None,
                    },
                )
                .await?;
            self.webhooks.record_success(webhook.id).await?;
            self.record_outcome(webhook, &delivery, EventStatus::Success, None)
                .await?;

            tracing::info!(
                delivery_id = %delivery.public_id,
                attempt,
                status = status_code,
                "delivery succeeded"
            );
        } else {
            let error_text = error.unwrap_or_else(|| {
                format!("endpoint returned status {}", status_code.unwrap_or(0))
            });

            let exhausted = !webhook.retry_enabled || attempt >= delivery.max_attempts;
            if exhausted {
                self.deliveries
                    .mark_failed(
                        delivery.id,
                        AttemptOutcome {
                            attempt_number: attempt,
                            status_code,
                            response_time_ms,
                            error: Some(error_text.clone()),
                        },
                    )
                    .await?;
                self.webhooks.record_terminal_failure(webhook.id).await?;
                self.record_outcome(webhook, &delivery, EventStatus::Failed, Some(&error_text))
                    .await?;

                tracing::warn!(
                    delivery_id = %delivery.public_id,
                    attempt,
                    error = %error_text,
                    "delivery exhausted"
                );
            } else {
                let delay = backoff_delay(
                    webhook.retry_initial_delay_seconds,
                    webhook.retry_backoff_multiplier,
                    attempt,
                );
                let next_retry_at = Utc::now().fixed_offset() + delay;

                self.deliveries
                    .mark_retrying(
                        delivery.id,
                        AttemptOutcome {
                            // The bumped number is the attempt the sweeper
                            // will execute when the row comes due.
                            attempt_number: attempt + 1,
                            status_code,
                            response_time_ms,
                            error: Some(error_text.clone()),
                        },
                        next_retry_at,
                    )
                    .await?;
                self.webhooks.record_attempt_failure(webhook.id).await?;

                tracing::info!(
                    delivery_id = %delivery.public_id,
                    attempt,
                    retry_in_seconds = delay.num_seconds(),
                    error = %error_text,
                    "delivery rescheduled"
                );
            }
        }

        Ok(self.refreshed(delivery.id).await?)
    }

    /// Perform the HTTP request for one attempt. Never fails the caller;
    /// transport errors come back as `(None, elapsed, Some(error))`.
    async fn send(
        &self,
        webhook: &WebhookModel,
        delivery: &DeliveryModel,
    ) -> (Option<i32>, Option<i64>, Option<String>) {
        let body = match serde_json::to_vec(&delivery.payload) {
            Ok(body) => body,
            Err(e) => return (None, None, Some(format!("payload serialization failed: {e}"))),
        };

        let mut request = match webhook.method.as_str() {
            "PUT" => self.http.put(&webhook.url),
            _ => self.http.post(&webhook.url),
        };

        request = request
            .timeout(std::time::Duration::from_secs(webhook.timeout_seconds as u64))
            .header("Content-Type", "application/json")
            .header("X-Webhook-Signature", &delivery.signature)
            .header("X-Webhook-Event", &delivery.event)
            .header("X-Webhook-ID", &delivery.public_id);

        if let Some(headers) = webhook.headers.as_ref().and_then(|h| h.as_object()) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name, value);
                }
            }
        }

        let started = Instant::now();
        match request.body(body).send().await {
            Ok(response) => {
                let elapsed = started.elapsed().as_millis() as i64;
                (Some(response.status().as_u16() as i32), Some(elapsed), None)
            }
            Err(e) => {
                let elapsed = started.elapsed().as_millis() as i64;
                let error = if e.is_timeout() {
                    format!("request timed out after {}s", webhook.timeout_seconds)
                } else {
                    format!("request failed: {e}")
                };
                (None, Some(elapsed), Some(error))
            }
        }
    }

    /// Append the terminal outcome of a delivery to the event log.
    async fn record_outcome(
        &self,
        webhook: &WebhookModel,
        delivery: &DeliveryModel,
        status: EventStatus,
        error: Option<&str>,
    ) -> Result<(), WebhookError> {
        self.events
            .record(NewEvent {
                user_id: webhook.user_id,
                integration: None,
                event_type: "webhook.delivery".to_string(),
                direction: EventDirection::Outbound,
                status,
                payload: Some(serde_json::json!({
                    "webhook_id": webhook.public_id,
                    "delivery_id": delivery.public_id,
                    "event": delivery.event,
                })),
                error: error.map(str::to_string),
            })
            .await?;

        Ok(())
    }

    async fn refreshed(&self, id: Uuid) -> Result<DeliveryModel, WebhookError> {
        self.deliveries
            .find_by_id(id)
            .await?
            .ok_or(WebhookError::DeliveryNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_lowercase_hex_hmac() {
        let signature = sign_payload("whsec_test", br#"{"hello":"world"}"#);
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(signature, signature.to_lowercase());

        // Same secret and body always produce the same signature.
        assert_eq!(signature, sign_payload("whsec_test", br#"{"hello":"world"}"#));
        // A different secret produces a different signature.
        assert_ne!(signature, sign_payload("whsec_other", br#"{"hello":"world"}"#));
    }

    #[test]
    fn backoff_grows_geometrically() {
        assert_eq!(backoff_delay(1, 5.0, 1), Duration::seconds(1));
        assert_eq!(backoff_delay(1, 5.0, 2), Duration::seconds(5));
        assert_eq!(backoff_delay(1, 5.0, 3), Duration::seconds(25));
        assert_eq!(backoff_delay(2, 3.0, 3), Duration::seconds(18));
    }

    #[test]
    fn backoff_is_capped_at_one_hour() {
        assert_eq!(backoff_delay(1, 10.0, 8), Duration::seconds(3_600));
    }

    #[test]
    fn backoff_tolerates_degenerate_policies() {
        // Non-positive inputs clamp instead of panicking.
        assert_eq!(backoff_delay(0, 0.5, 1), Duration::seconds(1));
        assert_eq!(backoff_delay(1, 5.0, 0), Duration::seconds(1));
    }

    #[test]
    fn url_validation_rejects_non_http_schemes() {
        assert!(validate_endpoint_url("https://example.com/hook").is_ok());
        assert!(validate_endpoint_url("http://localhost:9999/hook").is_ok());
        assert!(validate_endpoint_url("ftp://example.com/hook").is_err());
        assert!(validate_endpoint_url("not a url").is_err());
    }
}
