//! Database migrations for the Integrations API.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000100_create_api_keys;
mod m2025_06_01_000200_create_oauth_apps;
mod m2025_06_01_000300_create_oauth_tokens;
mod m2025_06_01_000400_create_webhooks;
mod m2025_06_01_000500_create_webhook_deliveries;
mod m2025_06_01_000600_create_integration_events;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000100_create_api_keys::Migration),
            Box::new(m2025_06_01_000200_create_oauth_apps::Migration),
            Box::new(m2025_06_01_000300_create_oauth_tokens::Migration),
            Box::new(m2025_06_01_000400_create_webhooks::Migration),
            Box::new(m2025_06_01_000500_create_webhook_deliveries::Migration),
            Box::new(m2025_06_01_000600_create_integration_events::Migration),
        ]
    }
}
