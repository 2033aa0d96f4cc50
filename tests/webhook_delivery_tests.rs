//! Integration tests for webhook registration, delivery and the retry
//! sweeper, using a local wiremock endpoint.

use std::sync::Arc;

use anyhow::Result;
use integrations::config::AppConfig;
use integrations::dispatcher::DeliverySweeper;
use integrations::models::webhook_delivery::DeliveryStatus;
use integrations::repositories::webhook::RetryPolicy;
use integrations::services::WebhookService;
use integrations::services::webhooks::{TEST_EVENT, sign_payload};
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{TestServices, setup_services};

fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        enabled: true,
        max_attempts: 3,
        backoff_multiplier: 1.0,
        initial_delay_seconds: 1,
    }
}

async fn register_webhook(
    services: &TestServices,
    user_id: Uuid,
    url: String,
    events: Vec<&str>,
    retry: Option<RetryPolicy>,
) -> Result<(integrations::models::webhook::Model, String)> {
    let created = services
        .webhooks
        .create(
            user_id,
            url,
            events.into_iter().map(str::to_string).collect(),
            None,
            None,
            None,
            retry,
            user_id,
        )
        .await?;

    Ok((created.webhook, created.secret))
}

#[tokio::test]
async fn successful_delivery_updates_counters_and_event_log() -> Result<()> {
    let services = setup_services().await?;
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (webhook, secret) = register_webhook(
        &services,
        user_id,
        format!("{}/hook", server.uri()),
        vec!["content.published"],
        None,
    )
    .await?;
    assert!(secret.starts_with("whsec_"));

    let deliveries = services
        .webhooks
        .trigger_event(
            user_id,
            "content.published",
            serde_json::json!({ "post_id": 42 }),
        )
        .await?;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Delivered.as_str());
    assert_eq!(deliveries[0].attempt_number, 1);
    assert_eq!(deliveries[0].status_code, Some(200));
    assert!(deliveries[0].next_retry_at.is_none());

    let webhook = services.webhooks.get(&webhook.public_id).await?;
    assert_eq!(webhook.total_deliveries, 1);
    assert_eq!(webhook.successful_deliveries, 1);
    assert_eq!(webhook.failed_deliveries, 0);
    assert!(webhook.last_success_at.is_some());

    // The terminal outcome lands in the event log.
    let events = services
        .events
        .list(Default::default(), 10)
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(
        events
            .iter()
            .any(|e| e.event_type == "webhook.delivery" && e.status == "success")
    );

    Ok(())
}

#[tokio::test]
async fn delivery_carries_signature_and_metadata_headers() -> Result<()> {
    let services = setup_services().await?;
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    let (_, secret) = register_webhook(
        &services,
        user_id,
        format!("{}/hook", server.uri()),
        vec!["*"],
        None,
    )
    .await?;

    let payload = serde_json::json!({ "post_id": 42, "title": "hello" });
    let expected_signature = sign_payload(&secret, &serde_json::to_vec(&payload)?);

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(header("X-Webhook-Signature", expected_signature.as_str()))
        .and(header("X-Webhook-Event", "content.published"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let deliveries = services
        .webhooks
        .trigger_event(user_id, "content.published", payload)
        .await?;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].status, DeliveryStatus::Delivered.as_str());

    Ok(())
}

#[tokio::test]
async fn failed_delivery_is_rescheduled_and_retried_by_sweeper() -> Result<()> {
    let services = setup_services().await?;
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    // First attempt fails, the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (webhook, _) = register_webhook(
        &services,
        user_id,
        format!("{}/hook", server.uri()),
        vec!["content.published"],
        Some(quick_retry()),
    )
    .await?;

    let deliveries = services
        .webhooks
        .trigger_event(user_id, "content.published", serde_json::json!({}))
        .await?;
    assert_eq!(deliveries[0].status, DeliveryStatus::Retrying.as_str());
    assert_eq!(deliveries[0].attempt_number, 2);
    assert!(deliveries[0].next_retry_at.is_some());

    // Wait past the 1s backoff, then run one sweep.
    tokio::time::sleep(std::time::Duration::from_millis(1_200)).await;

    let sweeper_webhooks = Arc::new(WebhookService::new(
        Arc::clone(&services.db),
        reqwest::Client::new(),
    ));
    let sweeper = DeliverySweeper::new(Arc::new(AppConfig::default()), sweeper_webhooks);
    sweeper.tick().await?;

    let delivery = services
        .webhooks
        .get_delivery(&deliveries[0].public_id)
        .await?;
    assert_eq!(delivery.status, DeliveryStatus::Delivered.as_str());
    assert_eq!(delivery.attempt_number, 2);

    let webhook = services.webhooks.get(&webhook.public_id).await?;
    assert_eq!(webhook.successful_deliveries, 1);
    assert_eq!(webhook.failed_deliveries, 0);

    Ok(())
}

#[tokio::test]
async fn delivery_fails_terminally_after_max_attempts() -> Result<()> {
    let services = setup_services().await?;
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (webhook, _) = register_webhook(
        &services,
        user_id,
        format!("{}/hook", server.uri()),
        vec!["content.published"],
        Some(RetryPolicy {
            enabled: true,
            max_attempts: 2,
            backoff_multiplier: 1.0,
            initial_delay_seconds: 1,
        }),
    )
    .await?;

    let deliveries = services
        .webhooks
        .trigger_event(user_id, "content.published", serde_json::json!({}))
        .await?;
    assert_eq!(deliveries[0].status, DeliveryStatus::Retrying.as_str());

    tokio::time::sleep(std::time::Duration::from_millis(1_200)).await;

    let sweeper = DeliverySweeper::new(
        Arc::new(AppConfig::default()),
        Arc::new(WebhookService::new(
            Arc::clone(&services.db),
            reqwest::Client::new(),
        )),
    );
    sweeper.tick().await?;

    let delivery = services
        .webhooks
        .get_delivery(&deliveries[0].public_id)
        .await?;
    assert_eq!(delivery.status, DeliveryStatus::Failed.as_str());
    assert_eq!(delivery.attempt_number, 2);
    assert!(delivery.next_retry_at.is_none());
    assert!(delivery.error.is_some());

    let webhook = services.webhooks.get(&webhook.public_id).await?;
    assert_eq!(webhook.failed_deliveries, 1);

    Ok(())
}

#[tokio::test]
async fn retry_disabled_means_single_attempt() -> Result<()> {
    let services = setup_services().await?;
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let (_, _) = register_webhook(
        &services,
        user_id,
        format!("{}/hook", server.uri()),
        vec!["*"],
        Some(RetryPolicy {
            enabled: false,
            ..RetryPolicy::default()
        }),
    )
    .await?;

    let deliveries = services
        .webhooks
        .trigger_event(user_id, "anything.at.all", serde_json::json!({}))
        .await?;
    assert_eq!(deliveries[0].status, DeliveryStatus::Failed.as_str());
    assert_eq!(deliveries[0].max_attempts, 1);

    Ok(())
}

#[tokio::test]
async fn fanout_skips_unsubscribed_and_inactive_webhooks() -> Result<()> {
    let services = setup_services().await?;
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let (subscribed, _) = register_webhook(
        &services,
        user_id,
        format!("{}/a", server.uri()),
        vec!["content.published"],
        None,
    )
    .await?;
    register_webhook(
        &services,
        user_id,
        format!("{}/b", server.uri()),
        vec!["content.deleted"],
        None,
    )
    .await?;
    let (deactivated, _) = register_webhook(
        &services,
        user_id,
        format!("{}/c", server.uri()),
        vec!["content.published"],
        None,
    )
    .await?;
    services
        .webhooks
        .update(
            &deactivated.public_id,
            integrations::repositories::webhook::WebhookChanges {
                is_active: Some(false),
                ..Default::default()
            },
            user_id,
        )
        .await?;

    let deliveries = services
        .webhooks
        .trigger_event(user_id, "content.published", serde_json::json!({}))
        .await?;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].webhook_id, subscribed.id);

    Ok(())
}

#[tokio::test]
async fn deactivating_webhook_fails_inflight_deliveries() -> Result<()> {
    let services = setup_services().await?;
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (webhook, _) = register_webhook(
        &services,
        user_id,
        format!("{}/hook", server.uri()),
        vec!["*"],
        Some(quick_retry()),
    )
    .await?;

    let deliveries = services
        .webhooks
        .trigger_event(user_id, "content.published", serde_json::json!({}))
        .await?;
    assert_eq!(deliveries[0].status, DeliveryStatus::Retrying.as_str());

    services
        .webhooks
        .update(
            &webhook.public_id,
            integrations::repositories::webhook::WebhookChanges {
                is_active: Some(false),
                ..Default::default()
            },
            user_id,
        )
        .await?;

    tokio::time::sleep(std::time::Duration::from_millis(1_200)).await;

    let sweeper = DeliverySweeper::new(
        Arc::new(AppConfig::default()),
        Arc::new(WebhookService::new(
            Arc::clone(&services.db),
            reqwest::Client::new(),
        )),
    );
    sweeper.tick().await?;

    let delivery = services
        .webhooks
        .get_delivery(&deliveries[0].public_id)
        .await?;
    assert_eq!(delivery.status, DeliveryStatus::Failed.as_str());
    assert_eq!(delivery.error.as_deref(), Some("webhook deactivated"));

    Ok(())
}

#[tokio::test]
async fn test_delivery_ignores_subscriptions() -> Result<()> {
    let services = setup_services().await?;
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(header("X-Webhook-Event", TEST_EVENT))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let (webhook, _) = register_webhook(
        &services,
        user_id,
        format!("{}/hook", server.uri()),
        vec!["content.published"],
        None,
    )
    .await?;

    let delivery = services.webhooks.test_webhook(&webhook.public_id).await?;
    assert_eq!(delivery.status, DeliveryStatus::Delivered.as_str());
    assert_eq!(delivery.event, TEST_EVENT);

    Ok(())
}

#[tokio::test]
async fn registration_validates_inputs() -> Result<()> {
    let services = setup_services().await?;
    let user_id = Uuid::new_v4();

    // Scheme must be http or https.
    let result = register_webhook(
        &services,
        user_id,
        "ftp://example.com/hook".to_string(),
        vec!["*"],
        None,
    )
    .await;
    assert!(result.is_err());

    // At least one event subscription is required.
    let result = register_webhook(
        &services,
        user_id,
        "https://example.com/hook".to_string(),
        vec![],
        None,
    )
    .await;
    assert!(result.is_err());

    // Attempt ceiling is bounded.
    let result = register_webhook(
        &services,
        user_id,
        "https://example.com/hook".to_string(),
        vec!["*"],
        Some(RetryPolicy {
            max_attempts: 11,
            ..RetryPolicy::default()
        }),
    )
    .await;
    assert!(result.is_err());

    Ok(())
}

#[tokio::test]
async fn sweep_cannot_claim_a_row_during_the_inline_attempt() -> Result<()> {
    let services = setup_services().await?;
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    // Endpoint slow enough that the inline attempt is still in flight
    // when the claim below runs.
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(2)),
        )
        .expect(1)
        .mount(&server)
        .await;

    register_webhook(
        &services,
        user_id,
        format!("{}/hook", server.uri()),
        vec!["content.published"],
        None,
    )
    .await?;

    let trigger = {
        let webhooks = WebhookService::new(Arc::clone(&services.db), reqwest::Client::new());
        tokio::spawn(async move {
            webhooks
                .trigger_event(user_id, "content.published", serde_json::json!({}))
                .await
        })
    };

    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
    let claimed = services
        .webhooks
        .claim_due_deliveries(10, chrono::Duration::seconds(60))
        .await?;
    assert!(claimed.is_empty());

    let deliveries = trigger.await??;
    assert_eq!(deliveries[0].status, DeliveryStatus::Delivered.as_str());

    Ok(())
}

#[tokio::test]
async fn backoff_grows_geometrically_between_persisted_retries() -> Result<()> {
    let services = setup_services().await?;
    let server = MockServer::start().await;
    let user_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (webhook, _) = register_webhook(
        &services,
        user_id,
        format!("{}/hook", server.uri()),
        vec!["content.published"],
        Some(RetryPolicy {
            enabled: true,
            max_attempts: 3,
            backoff_multiplier: 4.0,
            initial_delay_seconds: 2,
        }),
    )
    .await?;

    // Attempt 1: delay = 2 * 4^0 = 2s.
    let before_first = chrono::Utc::now().fixed_offset();
    let deliveries = services
        .webhooks
        .trigger_event(user_id, "content.published", serde_json::json!({}))
        .await?;
    let first = deliveries[0].clone();
    assert_eq!(first.status, DeliveryStatus::Retrying.as_str());
    assert_eq!(first.attempt_number, 2);
    let first_delay = (first.next_retry_at.unwrap() - before_first).num_milliseconds();
    assert!((2_000..4_000).contains(&first_delay), "got {first_delay}ms");

    // Attempt 2: delay = 2 * 4^1 = 8s.
    let before_second = chrono::Utc::now().fixed_offset();
    let second = services.webhooks.execute_attempt(&webhook, first.clone()).await?;
    assert_eq!(second.status, DeliveryStatus::Retrying.as_str());
    assert_eq!(second.attempt_number, 3);
    let second_delay = (second.next_retry_at.unwrap() - before_second).num_milliseconds();
    assert!((8_000..10_000).contains(&second_delay), "got {second_delay}ms");

    assert!(second.next_retry_at.unwrap() > first.next_retry_at.unwrap());

    Ok(())
}
