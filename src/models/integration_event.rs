//! Integration event entity model
//!
//! Append-only log of inbound and outbound integration activity.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

/// Integration event entity, one immutable row per recorded activity
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "integration_events")]
pub struct Model {
    /// Unique identifier for the event (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// User the activity belongs to
    pub user_id: Uuid,

    /// Integration the activity relates to, if any
    pub integration: Option<String>,

    /// Dotted event type, e.g. "webhook.delivery"
    pub event_type: String,

    /// Direction of the activity: inbound or outbound
    pub direction: String,

    /// Outcome of the activity: pending, success, failed
    pub status: String,

    /// Optional structured payload snapshot
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: Option<JsonValue>,

    /// Failure description for failed activity
    pub error: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Direction of recorded activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventDirection {
    Inbound,
    Outbound,
}

impl EventDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventDirection::Inbound => "inbound",
            EventDirection::Outbound => "outbound",
        }
    }
}

/// Outcome of recorded activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Success,
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Success => "success",
            EventStatus::Failed => "failed",
        }
    }
}
