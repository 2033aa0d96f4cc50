//! Webhook entity model
//!
//! SeaORM entity for the webhooks table: a user-registered HTTPS endpoint
//! subscribed to a set of event types, with per-webhook retry policy.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Webhook entity representing a subscribed delivery endpoint
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "webhooks")]
pub struct Model {
    /// Unique identifier for the webhook (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// External identifier exposed through the API
    pub public_id: String,

    /// Owning user
    pub user_id: Uuid,

    /// Destination endpoint URL
    pub url: String,

    /// Shared signing secret; returned in full only at creation
    pub secret: String,

    /// Subscribed event types (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub events: JsonValue,

    /// HTTP method used for deliveries
    pub method: String,

    /// Extra headers attached to every delivery (JSON object)
    #[sea_orm(column_type = "JsonBinary")]
    pub headers: Option<JsonValue>,

    /// Per-attempt request timeout
    pub timeout_seconds: i32,

    /// Whether failed deliveries are retried
    pub retry_enabled: bool,

    /// Total attempts allowed per delivery
    pub retry_max_attempts: i32,

    /// Geometric backoff multiplier between attempts
    pub retry_backoff_multiplier: f64,

    /// Delay before the first retry
    pub retry_initial_delay_seconds: i32,

    /// Whether the webhook accepts new deliveries
    pub is_active: bool,

    /// Deliveries ever enqueued for this webhook
    pub total_deliveries: i64,

    /// Deliveries that ended in `delivered`
    pub successful_deliveries: i64,

    /// Deliveries that ended in terminal `failed`
    pub failed_deliveries: i64,

    /// When a delivery was last enqueued
    pub last_triggered_at: Option<DateTimeWithTimeZone>,

    /// When a delivery last succeeded
    pub last_success_at: Option<DateTimeWithTimeZone>,

    /// When an attempt last failed
    pub last_failure_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,
    pub created_by: Uuid,
    pub updated_at: DateTimeWithTimeZone,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub deleted_by: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::webhook_delivery::Entity")]
    WebhookDelivery,
}

impl Related<super::webhook_delivery::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WebhookDelivery.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the webhook subscribes to `event`, honoring the `*` wildcard.
    pub fn subscribes_to(&self, event: &str) -> bool {
        self.events
            .as_array()
            .map(|events| {
                events
                    .iter()
                    .any(|e| e.as_str() == Some(event) || e.as_str() == Some("*"))
            })
            .unwrap_or(false)
    }
}
