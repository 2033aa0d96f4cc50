//! OAuth token entity model
//!
//! One table holds both single-use authorization codes and issued Bearer
//! token pairs, discriminated by `token_type`. Only digests are stored;
//! the access token digest is the unique lookup key.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Discriminator value for authorization-code rows.
pub const TOKEN_TYPE_CODE: &str = "code";
/// Discriminator value for issued access/refresh pairs.
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// OAuth token entity covering authorization codes and Bearer pairs
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "oauth_tokens")]
pub struct Model {
    /// Unique identifier for the token row (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Issuing application
    pub app_id: Uuid,

    /// End user the token acts on behalf of
    pub user_id: Uuid,

    /// Row discriminator: 'code' or 'Bearer'
    pub token_type: String,

    /// SHA-256 hex digest of the code or access token
    pub access_token_hash: String,

    /// SHA-256 hex digest of the refresh token, Bearer rows only
    pub refresh_token_hash: Option<String>,

    /// Granted scopes (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub scopes: JsonValue,

    /// Redirect URI bound at authorization time, code rows only
    pub redirect_uri: Option<String>,

    /// Opaque client state echoed back on redirect, code rows only
    pub state: Option<String>,

    /// Expiry of the code or access token
    pub expires_at: DateTimeWithTimeZone,

    /// Expiry of the refresh token, Bearer rows only
    pub refresh_token_expires_at: Option<DateTimeWithTimeZone>,

    /// Set when the row is consumed (codes) or revoked (Bearer pairs)
    pub is_revoked: bool,

    pub revoked_at: Option<DateTimeWithTimeZone>,
    pub revoked_reason: Option<String>,

    /// Successful validation count for Bearer rows
    pub usage_count: i64,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::oauth_app::Entity",
        from = "Column::AppId",
        to = "super::oauth_app::Column::Id"
    )]
    OAuthApp,
}

impl Related<super::oauth_app::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OAuthApp.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
