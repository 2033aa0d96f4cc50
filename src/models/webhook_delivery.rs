//! Webhook delivery entity model
//!
//! One row tracks the whole attempt sequence for a (webhook, event, payload)
//! triple. Retries reuse the row, bumping `attempt_number` and rescheduling
//! through `next_retry_at`.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

/// Webhook delivery entity tracking one enqueued event delivery
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_deliveries")]
pub struct Model {
    /// Unique identifier for the delivery (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// External identifier, sent to the endpoint as X-Webhook-ID
    pub public_id: String,

    /// Target webhook
    pub webhook_id: Uuid,

    /// Event type that triggered the delivery
    pub event: String,

    /// JSON payload sent as the request body
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// HMAC-SHA256 hex signature of the serialized payload
    pub signature: String,

    /// Lifecycle state: pending, retrying, delivered, failed
    pub status: String,

    /// 1-based number of the next (or last finished) attempt
    pub attempt_number: i32,

    /// Attempt ceiling captured from the webhook at enqueue time
    pub max_attempts: i32,

    /// HTTP status of the most recent attempt
    pub status_code: Option<i32>,

    /// Round-trip time of the most recent attempt
    pub response_time_ms: Option<i64>,

    /// When the delivery becomes due again; NULL for terminal rows
    pub next_retry_at: Option<DateTimeWithTimeZone>,

    /// Failure description from the most recent attempt
    pub error: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::webhook::Entity",
        from = "Column::WebhookId",
        to = "super::webhook::Column::Id"
    )]
    Webhook,
}

impl Related<super::webhook::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Webhook.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Lifecycle states of a delivery row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Retrying => "retrying",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(DeliveryStatus::Pending),
            "retrying" => Some(DeliveryStatus::Retrying),
            "delivered" => Some(DeliveryStatus::Delivered),
            "failed" => Some(DeliveryStatus::Failed),
            _ => None,
        }
    }

    /// Terminal rows are never picked up by the retry sweep.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}
