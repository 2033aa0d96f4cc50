//! Integration tests for the OAuth app registry and token lifecycle.

use anyhow::Result;
use integrations::config::OAuthConfig;
use integrations::repositories::integration_event::EventFilter;
use integrations::services::oauth::OAuthError;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{TestServices, setup_services, setup_services_with_oauth};

const REDIRECT_URI: &str = "https://app.example.com/callback";

async fn register_test_app(
    services: &TestServices,
    owner: Uuid,
    grant_types: Vec<&str>,
) -> Result<(integrations::models::oauth_app::Model, String)> {
    let registered = services
        .oauth
        .register_app(
            owner,
            "Test App".to_string(),
            vec![REDIRECT_URI.to_string()],
            vec!["read".to_string(), "write".to_string()],
            grant_types.into_iter().map(str::to_string).collect(),
            None,
            owner,
        )
        .await?;

    Ok((registered.app, registered.client_secret))
}

#[tokio::test]
async fn authorization_code_flow_end_to_end() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();
    let end_user = Uuid::new_v4();

    let (app, client_secret) =
        register_test_app(&services, owner, vec!["authorization_code", "refresh_token"]).await?;
    assert!(client_secret.starts_with("cs_"));

    let authorization = services
        .oauth
        .create_authorization(
            &app.client_id,
            REDIRECT_URI,
            vec!["read".to_string()],
            Some("xyz".to_string()),
            end_user,
        )
        .await?;
    assert!(authorization.code.starts_with("ac_"));
    assert_eq!(authorization.state.as_deref(), Some("xyz"));
    assert_eq!(authorization.expires_in, 600);

    let tokens = services
        .oauth
        .exchange_code(&app.client_id, &client_secret, &authorization.code, REDIRECT_URI)
        .await?;
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.scope, "read");
    assert!(tokens.refresh_token.is_some());

    let validation = services
        .oauth
        .validate_access_token(&tokens.access_token)
        .await?;
    assert!(validation.valid);
    assert_eq!(validation.user_id, Some(end_user));
    assert_eq!(validation.client_id.as_deref(), Some(app.client_id.as_str()));
    assert_eq!(validation.scopes, Some(vec!["read".to_string()]));

    Ok(())
}

#[tokio::test]
async fn code_is_single_use() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();

    let (app, client_secret) =
        register_test_app(&services, owner, vec!["authorization_code"]).await?;

    let authorization = services
        .oauth
        .create_authorization(&app.client_id, REDIRECT_URI, vec![], None, Uuid::new_v4())
        .await?;

    services
        .oauth
        .exchange_code(&app.client_id, &client_secret, &authorization.code, REDIRECT_URI)
        .await?;

    let second = services
        .oauth
        .exchange_code(&app.client_id, &client_secret, &authorization.code, REDIRECT_URI)
        .await;
    assert!(matches!(second, Err(OAuthError::InvalidGrant)));

    Ok(())
}

#[tokio::test]
async fn concurrent_exchanges_succeed_exactly_once() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();

    let (app, client_secret) =
        register_test_app(&services, owner, vec!["authorization_code"]).await?;

    let authorization = services
        .oauth
        .create_authorization(&app.client_id, REDIRECT_URI, vec![], None, Uuid::new_v4())
        .await?;

    let (first, second) = tokio::join!(
        services.oauth.exchange_code(
            &app.client_id,
            &client_secret,
            &authorization.code,
            REDIRECT_URI
        ),
        services.oauth.exchange_code(
            &app.client_id,
            &client_secret,
            &authorization.code,
            REDIRECT_URI
        ),
    );

    let successes = [&first, &second].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);

    Ok(())
}

#[tokio::test]
async fn redirect_uri_must_match_exactly() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();

    let (app, client_secret) =
        register_test_app(&services, owner, vec!["authorization_code"]).await?;

    // Unregistered URI is rejected at authorization time.
    let result = services
        .oauth
        .create_authorization(
            &app.client_id,
            "https://evil.example.com/callback",
            vec![],
            None,
            Uuid::new_v4(),
        )
        .await;
    assert!(matches!(result, Err(OAuthError::UnregisteredRedirectUri)));

    // A trailing slash is a different URI at exchange time.
    let authorization = services
        .oauth
        .create_authorization(&app.client_id, REDIRECT_URI, vec![], None, Uuid::new_v4())
        .await?;
    let result = services
        .oauth
        .exchange_code(
            &app.client_id,
            &client_secret,
            &authorization.code,
            &format!("{REDIRECT_URI}/"),
        )
        .await;
    assert!(matches!(result, Err(OAuthError::RedirectUriMismatch)));

    Ok(())
}

#[tokio::test]
async fn expired_code_is_rejected() -> Result<()> {
    let services = setup_services_with_oauth(OAuthConfig {
        code_ttl_seconds: 1,
        ..Default::default()
    })
    .await?;
    let owner = Uuid::new_v4();

    let (app, client_secret) =
        register_test_app(&services, owner, vec!["authorization_code"]).await?;

    let authorization = services
        .oauth
        .create_authorization(&app.client_id, REDIRECT_URI, vec![], None, Uuid::new_v4())
        .await?;

    tokio::time::sleep(std::time::Duration::from_millis(1_100)).await;

    let result = services
        .oauth
        .exchange_code(&app.client_id, &client_secret, &authorization.code, REDIRECT_URI)
        .await;
    assert!(matches!(result, Err(OAuthError::CodeExpired)));

    Ok(())
}

#[tokio::test]
async fn wrong_client_secret_is_invalid_client() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();

    let (app, _client_secret) =
        register_test_app(&services, owner, vec!["authorization_code"]).await?;

    let authorization = services
        .oauth
        .create_authorization(&app.client_id, REDIRECT_URI, vec![], None, Uuid::new_v4())
        .await?;

    let result = services
        .oauth
        .exchange_code(&app.client_id, "cs_wrong", &authorization.code, REDIRECT_URI)
        .await;
    assert!(matches!(result, Err(OAuthError::InvalidClient)));

    // Unknown client id looks identical to a wrong secret.
    let result = services
        .oauth
        .exchange_code("client_unknown", "cs_wrong", &authorization.code, REDIRECT_URI)
        .await;
    assert!(matches!(result, Err(OAuthError::InvalidClient)));

    Ok(())
}

#[tokio::test]
async fn scopes_must_be_subset_of_app_scopes() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();

    let (app, _) = register_test_app(&services, owner, vec!["authorization_code"]).await?;

    let result = services
        .oauth
        .create_authorization(
            &app.client_id,
            REDIRECT_URI,
            vec!["admin".to_string()],
            None,
            Uuid::new_v4(),
        )
        .await;
    assert!(matches!(result, Err(OAuthError::InvalidScope)));

    Ok(())
}

#[tokio::test]
async fn refresh_issues_new_access_token_without_rotating_refresh() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();

    let (app, client_secret) =
        register_test_app(&services, owner, vec!["authorization_code", "refresh_token"]).await?;

    let authorization = services
        .oauth
        .create_authorization(&app.client_id, REDIRECT_URI, vec![], None, Uuid::new_v4())
        .await?;
    let tokens = services
        .oauth
        .exchange_code(&app.client_id, &client_secret, &authorization.code, REDIRECT_URI)
        .await?;
    let refresh_token = tokens.refresh_token.clone().unwrap();

    let refreshed = services
        .oauth
        .refresh(&app.client_id, &client_secret, &refresh_token)
        .await?;
    assert_ne!(refreshed.access_token, tokens.access_token);
    assert!(refreshed.refresh_token.is_none());

    // The old access token was replaced in place.
    let old = services
        .oauth
        .validate_access_token(&tokens.access_token)
        .await?;
    assert!(!old.valid);

    let fresh = services
        .oauth
        .validate_access_token(&refreshed.access_token)
        .await?;
    assert!(fresh.valid);

    // The same refresh token keeps working.
    let again = services
        .oauth
        .refresh(&app.client_id, &client_secret, &refresh_token)
        .await?;
    assert!(again.refresh_token.is_none());

    Ok(())
}

#[tokio::test]
async fn client_credentials_issues_app_scoped_token_without_refresh() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();

    let (app, client_secret) =
        register_test_app(&services, owner, vec!["client_credentials"]).await?;

    let tokens = services
        .oauth
        .client_credentials(&app.client_id, &client_secret, vec![])
        .await?;
    assert!(tokens.refresh_token.is_none());
    assert_eq!(tokens.scope, "read write");

    let validation = services
        .oauth
        .validate_access_token(&tokens.access_token)
        .await?;
    assert!(validation.valid);
    assert_eq!(validation.user_id, Some(owner));

    // The grant must be enabled on the app.
    let (other_app, other_secret) =
        register_test_app(&services, owner, vec!["authorization_code"]).await?;
    let result = services
        .oauth
        .client_credentials(&other_app.client_id, &other_secret, vec![])
        .await;
    assert!(matches!(result, Err(OAuthError::UnsupportedGrantType(_))));

    Ok(())
}

#[tokio::test]
async fn revocation_accepts_both_token_kinds_and_is_idempotent() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();

    let (app, client_secret) =
        register_test_app(&services, owner, vec!["authorization_code", "refresh_token"]).await?;

    let authorization = services
        .oauth
        .create_authorization(&app.client_id, REDIRECT_URI, vec![], None, Uuid::new_v4())
        .await?;
    let tokens = services
        .oauth
        .exchange_code(&app.client_id, &client_secret, &authorization.code, REDIRECT_URI)
        .await?;

    let revoked = services
        .oauth
        .revoke_token(&app.client_id, &client_secret, &tokens.access_token)
        .await?;
    assert!(revoked);

    let again = services
        .oauth
        .revoke_token(&app.client_id, &client_secret, &tokens.access_token)
        .await?;
    assert!(!again);

    // Revoking the access token kills the whole pair.
    let result = services
        .oauth
        .refresh(&app.client_id, &client_secret, &tokens.refresh_token.unwrap())
        .await;
    assert!(matches!(result, Err(OAuthError::InvalidGrant)));

    // Unknown tokens report false instead of erroring.
    let unknown = services
        .oauth
        .revoke_token(&app.client_id, &client_secret, "at_unknown")
        .await?;
    assert!(!unknown);

    Ok(())
}

#[tokio::test]
async fn secret_rotation_invalidates_old_secret() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();

    let (app, old_secret) =
        register_test_app(&services, owner, vec!["client_credentials"]).await?;

    let new_secret = services
        .oauth
        .rotate_client_secret(&app.public_id, owner)
        .await?;
    assert_ne!(new_secret, old_secret);

    let result = services
        .oauth
        .client_credentials(&app.client_id, &old_secret, vec![])
        .await;
    assert!(matches!(result, Err(OAuthError::InvalidClient)));

    services
        .oauth
        .client_credentials(&app.client_id, &new_secret, vec![])
        .await?;

    Ok(())
}

#[tokio::test]
async fn deleting_app_revokes_outstanding_tokens() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();

    let (app, client_secret) =
        register_test_app(&services, owner, vec!["authorization_code"]).await?;

    let authorization = services
        .oauth
        .create_authorization(&app.client_id, REDIRECT_URI, vec![], None, Uuid::new_v4())
        .await?;
    let tokens = services
        .oauth
        .exchange_code(&app.client_id, &client_secret, &authorization.code, REDIRECT_URI)
        .await?;

    let revoked = services.oauth.delete_app(&app.public_id, owner).await?;
    assert!(revoked >= 1);

    let validation = services
        .oauth
        .validate_access_token(&tokens.access_token)
        .await?;
    assert!(!validation.valid);
    assert_eq!(validation.error.as_deref(), Some("token_revoked"));

    Ok(())
}

#[tokio::test]
async fn app_and_token_lifecycle_are_audited_in_the_event_log() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();
    let end_user = Uuid::new_v4();

    let (app, secret) =
        register_test_app(&services, owner, vec!["authorization_code"]).await?;

    let authorization = services
        .oauth
        .create_authorization(
            &app.client_id,
            REDIRECT_URI,
            vec!["read".to_string()],
            None,
            end_user,
        )
        .await?;
    let tokens = services
        .oauth
        .exchange_code(
            &app.client_id,
            &secret,
            &authorization.code,
            REDIRECT_URI,
        )
        .await?;

    let revoked = services
        .oauth
        .revoke_token(&app.client_id, &secret, &tokens.access_token)
        .await?;
    assert!(revoked);

    let owner_events = services
        .events
        .list(
            EventFilter {
                user_id: Some(owner),
                ..Default::default()
            },
            100,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(
        owner_events
            .iter()
            .any(|e| e.event_type == "oauth.app_registered")
    );

    // The revocation entry is attributed to the token's end user.
    let user_events = services
        .events
        .list(
            EventFilter {
                user_id: Some(end_user),
                ..Default::default()
            },
            100,
        )
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    assert!(
        user_events
            .iter()
            .any(|e| e.event_type == "oauth.token_revoked")
    );

    Ok(())
}

#[tokio::test]
async fn redirect_mismatch_reported_even_for_spent_codes() -> Result<()> {
    let services = setup_services().await?;
    let owner = Uuid::new_v4();
    let second_uri = "https://app.example.com/alt-callback";

    let registered = services
        .oauth
        .register_app(
            owner,
            "Two Redirects".to_string(),
            vec![REDIRECT_URI.to_string(), second_uri.to_string()],
            vec!["read".to_string()],
            vec!["authorization_code".to_string()],
            None,
            owner,
        )
        .await?;
    let (app, client_secret) = (registered.app, registered.client_secret);

    let authorization = services
        .oauth
        .create_authorization(&app.client_id, REDIRECT_URI, vec![], None, Uuid::new_v4())
        .await?;
    services
        .oauth
        .exchange_code(&app.client_id, &client_secret, &authorization.code, REDIRECT_URI)
        .await?;

    // The code is spent, but a registered URI that is not the one bound
    // to the code still reports a redirect mismatch, not invalid_grant.
    let err = services
        .oauth
        .exchange_code(&app.client_id, &client_secret, &authorization.code, second_uri)
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::RedirectUriMismatch));

    // Same precedence for a URI outside the registered set.
    let err = services
        .oauth
        .exchange_code(
            &app.client_id,
            &client_secret,
            &authorization.code,
            "https://elsewhere.example.com/cb",
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::RedirectUriMismatch));

    Ok(())
}

#[tokio::test]
async fn migrations_create_the_tables_the_entities_point_at() -> Result<()> {
    use integrations::models::{oauth_app, oauth_token};
    use sea_orm::EntityTrait;

    let services = setup_services().await?;

    // A bare find against each entity fails with "no such table" if the
    // migration created the table under a different name.
    assert!(oauth_app::Entity::find().all(&*services.db).await?.is_empty());
    assert!(oauth_token::Entity::find().all(&*services.db).await?.is_empty());

    Ok(())
}
