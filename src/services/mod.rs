//! # Services
//!
//! Domain logic for the Integrations API: credential issuance and
//! validation, the OAuth token lifecycle, webhook delivery, and the
//! integration event log. Handlers stay thin and delegate here.

pub mod api_keys;
pub mod events;
pub mod oauth;
pub mod webhooks;

pub use api_keys::ApiKeyService;
pub use events::EventService;
pub use oauth::OAuthService;
pub use webhooks::WebhookService;
