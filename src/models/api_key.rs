//! API key entity model
//!
//! SeaORM entity for the api_keys table. A row never stores the plaintext
//! key; `key_prefix` is the indexed lookup slice and `key_hash` the SHA-256
//! digest the presented secret is compared against.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// API key entity representing a long-lived per-user bearer credential
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    /// Unique identifier for the key (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// External identifier exposed through the API
    pub public_id: String,

    /// Owning user
    pub user_id: Uuid,

    /// Human-readable label chosen by the owner
    pub name: String,

    /// First characters of the plaintext key, indexed for O(1) lookup
    pub key_prefix: String,

    /// SHA-256 hex digest of the full plaintext key
    pub key_hash: String,

    /// Granted scopes, stored as a JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub scopes: JsonValue,

    /// Requests allowed per minute
    pub rate_per_minute: i32,

    /// Requests allowed per hour
    pub rate_per_hour: i32,

    /// Requests allowed per day
    pub rate_per_day: i32,

    /// Optional IP allowlist (JSON array of CIDR strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub allowed_ips: Option<JsonValue>,

    /// Whether the key currently accepts requests
    pub is_active: bool,

    /// Optional expiry; NULL means the key never expires
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Lifetime successful validation count
    pub total_requests: i64,

    /// Lifetime error count reported against this key
    pub total_errors: i64,

    /// Timestamp of the most recent successful validation
    pub last_used_at: Option<DateTimeWithTimeZone>,

    /// When the key was revoked, if ever
    pub revoked_at: Option<DateTimeWithTimeZone>,

    /// Operator-supplied reason recorded at revocation
    pub revoked_reason: Option<String>,

    pub created_at: DateTimeWithTimeZone,
    pub created_by: Uuid,
    pub updated_at: DateTimeWithTimeZone,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub deleted_by: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
