//! Test utilities for database testing.
//!
//! Sets up in-memory SQLite databases with migrations applied and builds
//! the service graph the integration tests exercise.

use anyhow::Result;
use integrations::config::OAuthConfig;
use integrations::services::{ApiKeyService, EventService, OAuthService, WebhookService};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use std::sync::Arc;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// The service graph wired over one test database.
#[allow(dead_code)]
pub struct TestServices {
    pub db: Arc<DatabaseConnection>,
    pub api_keys: ApiKeyService,
    pub oauth: OAuthService,
    pub webhooks: WebhookService,
    pub events: EventService,
}

/// Builds every service over a fresh in-memory database with default
/// OAuth lifetimes.
#[allow(dead_code)]
pub async fn setup_services() -> Result<TestServices> {
    setup_services_with_oauth(OAuthConfig::default()).await
}

/// Builds every service over a fresh in-memory database with the given
/// OAuth lifetimes (tests shrink TTLs to exercise expiry).
#[allow(dead_code)]
pub async fn setup_services_with_oauth(oauth: OAuthConfig) -> Result<TestServices> {
    let db = Arc::new(setup_test_db().await?);

    Ok(TestServices {
        api_keys: ApiKeyService::new(Arc::clone(&db)),
        oauth: OAuthService::new(Arc::clone(&db), oauth),
        webhooks: WebhookService::new(Arc::clone(&db), reqwest::Client::new()),
        events: EventService::new(Arc::clone(&db)),
        db,
    })
}
