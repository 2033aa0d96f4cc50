//! # Repositories
//!
//! Database access layer for the Integrations API.

pub mod api_key;
pub mod integration_event;
pub mod oauth_app;
pub mod oauth_token;
pub mod webhook;
pub mod webhook_delivery;

pub use api_key::ApiKeyRepository;
pub use integration_event::IntegrationEventRepository;
pub use oauth_app::OAuthAppRepository;
pub use oauth_token::OAuthTokenRepository;
pub use webhook::WebhookRepository;
pub use webhook_delivery::WebhookDeliveryRepository;
