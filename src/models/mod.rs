//! # Data Models
//!
//! This module contains all the data models used throughout the Integrations API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod api_key;
pub mod integration_event;
pub mod oauth_app;
pub mod oauth_token;
pub mod webhook;
pub mod webhook_delivery;

pub use api_key::Entity as ApiKey;
pub use integration_event::Entity as IntegrationEvent;
pub use oauth_app::Entity as OAuthApp;
pub use oauth_token::Entity as OAuthToken;
pub use webhook::Entity as Webhook;
pub use webhook_delivery::Entity as WebhookDelivery;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "integrations".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
