//! # Server Configuration
//!
//! This module contains the server setup and configuration for the
//! Integrations API: shared state, the router, the OpenAPI document and
//! the serve loop with graceful shutdown.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dispatcher::DeliverySweeper;
use crate::handlers;
use crate::services::{ApiKeyService, EventService, OAuthService, WebhookService};
use crate::telemetry::{self, TraceContext};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub api_keys: Arc<ApiKeyService>,
    pub oauth: Arc<OAuthService>,
    pub webhooks: Arc<WebhookService>,
    pub events: Arc<EventService>,
}

impl AppState {
    /// Build the service graph over one database connection.
    pub fn new(config: Arc<AppConfig>, db: DatabaseConnection) -> Self {
        let shared_db = Arc::new(db.clone());
        let http = reqwest::Client::new();

        Self {
            api_keys: Arc::new(ApiKeyService::new(Arc::clone(&shared_db))),
            oauth: Arc::new(OAuthService::new(
                Arc::clone(&shared_db),
                config.oauth.clone(),
            )),
            webhooks: Arc::new(WebhookService::new(Arc::clone(&shared_db), http)),
            events: Arc::new(EventService::new(shared_db)),
            config,
            db,
        }
    }
}

/// Attach a per-request trace context so errors raised anywhere below
/// carry a correlation id.
async fn trace_context_middleware(request: Request, next: Next) -> Response {
    let trace_id = format!("corr-{}", &Uuid::new_v4().simple().to_string()[..8]);
    let context = TraceContext {
        trace_id: trace_id.clone(),
    };

    let mut request = request;
    request.extensions_mut().insert(context.clone());

    let mut response = telemetry::with_trace_context(context, next.run(request)).await;

    if let Ok(header_value) = trace_id.parse() {
        response.headers_mut().insert("X-Trace-Id", header_value);
    }

    response
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api-keys",
            post(handlers::api_keys::create_api_key).get(handlers::api_keys::list_api_keys),
        )
        .route("/api-keys/validate", post(handlers::api_keys::validate_api_key))
        .route(
            "/api-keys/{id}",
            get(handlers::api_keys::get_api_key)
                .patch(handlers::api_keys::update_api_key)
                .delete(handlers::api_keys::delete_api_key),
        )
        .route("/api-keys/{id}/revoke", post(handlers::api_keys::revoke_api_key))
        .route(
            "/oauth/apps",
            post(handlers::oauth::register_app).get(handlers::oauth::list_apps),
        )
        .route(
            "/oauth/apps/{id}",
            get(handlers::oauth::get_app)
                .patch(handlers::oauth::update_app)
                .delete(handlers::oauth::delete_app),
        )
        .route(
            "/oauth/apps/{id}/rotate-secret",
            post(handlers::oauth::rotate_secret),
        )
        .route("/oauth/authorize", post(handlers::oauth::authorize))
        .route("/oauth/token", post(handlers::oauth::token))
        .route("/oauth/revoke", post(handlers::oauth::revoke_token))
        .route("/oauth/introspect", post(handlers::oauth::introspect))
        .route(
            "/webhooks",
            post(handlers::webhooks::create_webhook).get(handlers::webhooks::list_webhooks),
        )
        .route(
            "/webhooks/{id}",
            get(handlers::webhooks::get_webhook)
                .patch(handlers::webhooks::update_webhook)
                .delete(handlers::webhooks::delete_webhook),
        )
        .route("/webhooks/{id}/test", post(handlers::webhooks::test_webhook))
        .route(
            "/webhooks/{id}/deliveries",
            get(handlers::webhooks::list_deliveries),
        )
        .route("/deliveries/{id}", get(handlers::webhooks::get_delivery))
        .route("/events/trigger", post(handlers::webhooks::trigger_event))
        .route(
            "/events",
            post(handlers::events::record_event).get(handlers::events::list_events),
        )
        .route("/events/summary", get(handlers::events::activity_summary))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state.config),
            crate::auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .merge(protected)
        .layer(middleware::from_fn(trace_context_middleware))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Starts the server with the given configuration, running the delivery
/// sweeper alongside it until shutdown.
pub async fn run_server(
    config: Arc<AppConfig>,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::new(Arc::clone(&config), db);

    let shutdown = CancellationToken::new();
    let sweeper = DeliverySweeper::new(Arc::clone(&config), Arc::clone(&state.webhooks));
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let app = create_app(state);

    // Resolve the configured bind address
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            serve_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    let _ = sweeper_handle.await;

    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::api_keys::create_api_key,
        crate::handlers::api_keys::list_api_keys,
        crate::handlers::api_keys::get_api_key,
        crate::handlers::api_keys::update_api_key,
        crate::handlers::api_keys::delete_api_key,
        crate::handlers::api_keys::revoke_api_key,
        crate::handlers::api_keys::validate_api_key,
        crate::handlers::oauth::register_app,
        crate::handlers::oauth::list_apps,
        crate::handlers::oauth::get_app,
        crate::handlers::oauth::update_app,
        crate::handlers::oauth::delete_app,
        crate::handlers::oauth::rotate_secret,
        crate::handlers::oauth::authorize,
        crate::handlers::oauth::token,
        crate::handlers::oauth::revoke_token,
        crate::handlers::oauth::introspect,
        crate::handlers::webhooks::create_webhook,
        crate::handlers::webhooks::list_webhooks,
        crate::handlers::webhooks::get_webhook,
        crate::handlers::webhooks::update_webhook,
        crate::handlers::webhooks::delete_webhook,
        crate::handlers::webhooks::test_webhook,
        crate::handlers::webhooks::list_deliveries,
        crate::handlers::webhooks::get_delivery,
        crate::handlers::webhooks::trigger_event,
        crate::handlers::events::record_event,
        crate::handlers::events::list_events,
        crate::handlers::events::activity_summary,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::HealthResponse,
            crate::handlers::api_keys::CreateApiKeyRequest,
            crate::handlers::api_keys::UpdateApiKeyRequest,
            crate::handlers::api_keys::RevokeApiKeyRequest,
            crate::handlers::api_keys::ValidateApiKeyRequest,
            crate::handlers::api_keys::ApiKeyInfo,
            crate::handlers::api_keys::CreatedApiKeyResponse,
            crate::handlers::api_keys::ApiKeysResponse,
            crate::handlers::api_keys::RevokedResponse,
            crate::handlers::oauth::RegisterAppRequest,
            crate::handlers::oauth::UpdateAppRequest,
            crate::handlers::oauth::AuthorizeRequest,
            crate::handlers::oauth::TokenRequest,
            crate::handlers::oauth::RevokeTokenRequest,
            crate::handlers::oauth::IntrospectRequest,
            crate::handlers::oauth::OAuthAppInfo,
            crate::handlers::oauth::RegisteredAppResponse,
            crate::handlers::oauth::OAuthAppsResponse,
            crate::handlers::oauth::RotatedSecretResponse,
            crate::handlers::oauth::TokenRevokedResponse,
            crate::handlers::webhooks::RetryPolicyRequest,
            crate::handlers::webhooks::CreateWebhookRequest,
            crate::handlers::webhooks::UpdateWebhookRequest,
            crate::handlers::webhooks::TriggerEventRequest,
            crate::handlers::webhooks::WebhookInfo,
            crate::handlers::webhooks::CreatedWebhookResponse,
            crate::handlers::webhooks::WebhooksResponse,
            crate::handlers::webhooks::DeliveryInfo,
            crate::handlers::webhooks::DeliveriesResponse,
            crate::handlers::events::RecordEventRequest,
            crate::handlers::events::EventInfo,
            crate::handlers::events::EventsResponse,
            crate::rate_limit::RateLimitQuota,
            crate::models::integration_event::EventDirection,
            crate::models::integration_event::EventStatus,
            crate::models::webhook_delivery::DeliveryStatus,
            crate::services::api_keys::ApiKeyValidation,
            crate::services::api_keys::ApiKeyRejection,
            crate::services::oauth::Authorization,
            crate::services::oauth::TokenResponse,
            crate::services::oauth::TokenValidation,
            crate::services::events::ActivitySummary,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Integrations API",
        description = "API for integration credentials and webhook delivery",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
