//! OAuth application entity model
//!
//! SeaORM entity for the oauth_apps table: registered client applications
//! identified by a public client id and authenticated by a hashed secret.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

/// OAuth app entity representing a registered client application
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "oauth_apps")]
pub struct Model {
    /// Unique identifier for the app (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// External identifier exposed through the API
    pub public_id: String,

    /// Owning user
    pub user_id: Uuid,

    /// Display name shown on consent screens
    pub name: String,

    /// Public client identifier presented in OAuth flows
    pub client_id: String,

    /// SHA-256 hex digest of the client secret
    pub client_secret_hash: String,

    /// Registered redirect URIs (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub redirect_uris: JsonValue,

    /// Scopes the app may request (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub scopes: JsonValue,

    /// Enabled grant types (JSON array of strings)
    #[sea_orm(column_type = "JsonBinary")]
    pub grant_types: JsonValue,

    pub rate_per_minute: i32,
    pub rate_per_hour: i32,
    pub rate_per_day: i32,

    /// Whether the app may start flows or exchange tokens
    pub is_active: bool,

    /// Marked by an admin after review
    pub is_verified: bool,

    pub created_at: DateTimeWithTimeZone,
    pub created_by: Uuid,
    pub updated_at: DateTimeWithTimeZone,
    pub updated_by: Option<Uuid>,
    pub deleted_at: Option<DateTimeWithTimeZone>,
    pub deleted_by: Option<Uuid>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::oauth_token::Entity")]
    OAuthToken,
}

impl Related<super::oauth_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OAuthToken.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Grant types an app can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    ClientCredentials,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
            GrantType::ClientCredentials => "client_credentials",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(GrantType::AuthorizationCode),
            "refresh_token" => Some(GrantType::RefreshToken),
            "client_credentials" => Some(GrantType::ClientCredentials),
            _ => None,
        }
    }
}

impl Model {
    /// Whether the app is registered for the given grant type.
    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grant_types
            .as_array()
            .map(|grants| grants.iter().any(|g| g.as_str() == Some(grant.as_str())))
            .unwrap_or(false)
    }

    /// Whether `uri` exactly matches a registered redirect URI.
    pub fn redirect_uri_registered(&self, uri: &str) -> bool {
        self.redirect_uris
            .as_array()
            .map(|uris| uris.iter().any(|u| u.as_str() == Some(uri)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_type_round_trips_wire_names() {
        for grant in [
            GrantType::AuthorizationCode,
            GrantType::RefreshToken,
            GrantType::ClientCredentials,
        ] {
            assert_eq!(GrantType::parse(grant.as_str()), Some(grant));
        }
        assert_eq!(GrantType::parse("implicit"), None);
    }
}
