//! # Delivery Sweeper
//!
//! Background task that picks up webhook deliveries due for retry and
//! re-executes them. Claimed rows are leased by pushing `next_retry_at`
//! forward, so multiple instances may sweep concurrently without double
//! sending; attempts within a tick run under a semaphore bound.

use std::sync::Arc;

use chrono::Duration;
use metrics::{counter, gauge, histogram};
use tokio::sync::Semaphore;
use tokio::time::{Duration as TokioDuration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::AppConfig;
use crate::services::WebhookService;

/// Background retry sweeper for webhook deliveries.
pub struct DeliverySweeper {
    config: Arc<AppConfig>,
    webhooks: Arc<WebhookService>,
}

#[derive(Debug, Default)]
struct TickStats {
    deliveries_claimed: u64,
    deliveries_succeeded: u64,
    deliveries_rescheduled: u64,
    deliveries_failed: u64,
    deliveries_orphaned: u64,
}

impl DeliverySweeper {
    /// Create a new sweeper instance.
    pub fn new(config: Arc<AppConfig>, webhooks: Arc<WebhookService>) -> Self {
        Self { config, webhooks }
    }

    /// Run the sweep loop until the provided shutdown token fires.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!("Starting delivery sweeper");
        let tick_interval =
            TokioDuration::from_secs(self.config.dispatcher.sweep_interval_seconds);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Delivery sweeper shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    let tick_started = Instant::now();
                    if let Err(err) = self.tick().await {
                        error!(error = ?err, "Sweeper tick failed");
                    }
                    let elapsed = tick_started.elapsed();
                    histogram!("delivery_sweeper_tick_duration_ms")
                        .record(elapsed.as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Delivery sweeper stopped");
    }

    /// Execute one sweep: claim due rows, then attempt them concurrently
    /// under the configured bound.
    pub async fn tick(&self) -> Result<(), crate::services::webhooks::WebhookError> {
        let lease = Duration::seconds(self.config.dispatcher.claim_lease_seconds as i64);
        let claimed = self
            .webhooks
            .claim_due_deliveries(self.config.dispatcher.batch_size, lease)
            .await?;

        let mut stats = TickStats {
            deliveries_claimed: claimed.len() as u64,
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.config.dispatcher.concurrency as usize));
        let mut handles = Vec::with_capacity(claimed.len());

        for delivery in claimed {
            let webhooks = Arc::clone(&self.webhooks);
            let semaphore = Arc::clone(&semaphore);

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("sweeper semaphore never closes");

                let webhook = match webhooks.webhook_for_delivery(&delivery).await {
                    Ok(Some(webhook)) => webhook,
                    Ok(None) => {
                        warn!(delivery_id = %delivery.public_id, "delivery has no webhook");
                        return Ok(None);
                    }
                    Err(err) => return Err(err),
                };

                webhooks
                    .execute_attempt(&webhook, delivery)
                    .await
                    .map(Some)
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(Some(delivery))) => match delivery.status.as_str() {
                    "delivered" => stats.deliveries_succeeded += 1,
                    "retrying" => stats.deliveries_rescheduled += 1,
                    "failed" => stats.deliveries_failed += 1,
                    _ => {}
                },
                Ok(Ok(None)) => stats.deliveries_orphaned += 1,
                Ok(Err(err)) => {
                    error!(error = ?err, "delivery attempt failed to persist");
                }
                Err(join_err) => {
                    error!(error = ?join_err, "delivery attempt task panicked");
                }
            }
        }

        counter!("delivery_sweeper_claimed_total").increment(stats.deliveries_claimed);
        let in_flight = self.webhooks.deliveries_in_flight().await?;
        gauge!("delivery_sweeper_backlog_gauge").set(in_flight as f64);

        debug!(
            claimed = stats.deliveries_claimed,
            succeeded = stats.deliveries_succeeded,
            rescheduled = stats.deliveries_rescheduled,
            failed = stats.deliveries_failed,
            orphaned = stats.deliveries_orphaned,
            backlog = in_flight,
            "Sweeper tick completed"
        );

        Ok(())
    }
}
