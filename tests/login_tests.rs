//! Login integration tests: password and token paths against an in-memory
//! store. These exercise positive and negative paths, the generic-failure
//! contract, and expiry policy.

use std::collections::BTreeSet;

use anyhow::Result;
use chrono::{Duration, Utc};

use authgate::identity::{CredentialValidator, LoginRequest, SessionManager};
use authgate::security;
use authgate::store::Store;

async fn fresh_store() -> Result<Store> {
    let store = Store::connect_in_memory().await?;
    store.ensure_schema().await?;
    Ok(store)
}

async fn seed_user(
    store: &Store,
    username: &str,
    name: &str,
    password: &str,
    roles: &[&str],
) -> Result<i64> {
    let phc = security::hash_password(password)?;
    let id = store.create_user(username, name, &phc).await?;
    for role in roles {
        store.assign_role(id, role).await?;
    }
    Ok(id)
}

fn login(username: &str, password: &str, remember_me: bool) -> LoginRequest {
    LoginRequest {
        username: username.to_string(),
        password: password.to_string(),
        remember_me,
    }
}

fn role_set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn password_login_round_trips_to_the_same_user() -> Result<()> {
    let store = fresh_store().await?;
    seed_user(&store, "alice", "Alice", "s3cr3t!", &["admin", "user"]).await?;
    let auth = CredentialValidator::default();

    let result = auth.authenticate(&store, &login("alice", "s3cr3t!", false)).await?;
    assert!(result.success, "valid credentials must log in");
    let profile = result.profile.expect("profile");
    assert_eq!(profile.username, "alice");
    assert_eq!(profile.name, "Alice");
    assert_eq!(profile.roles, role_set(&["admin", "user"]));
    let token = result.token.expect("token");

    // The issued token resolves back to the same user via the token path
    let relogin = auth.login_with_token(&store, &token).await?;
    assert!(relogin.success);
    let reprofile = relogin.profile.expect("profile");
    assert_eq!(reprofile.username, "alice");
    assert_eq!(reprofile.roles, role_set(&["admin", "user"]));
    Ok(())
}

#[tokio::test]
async fn wrong_password_and_unknown_username_fail_identically() -> Result<()> {
    let store = fresh_store().await?;
    seed_user(&store, "alice", "Alice", "s3cr3t!", &["user"]).await?;
    let auth = CredentialValidator::default();

    let wrong_password = auth.authenticate(&store, &login("alice", "wrong", false)).await?;
    let unknown_user = auth.authenticate(&store, &login("nobody", "s3cr3t!", false)).await?;

    assert!(!wrong_password.success);
    assert!(!unknown_user.success);
    assert!(wrong_password.token.is_none());
    assert!(wrong_password.profile.is_none());

    // Byte-identical wire shape: nothing distinguishes the two cases
    let a = serde_json::to_value(&wrong_password)?;
    let b = serde_json::to_value(&unknown_user)?;
    assert_eq!(a, b);
    Ok(())
}

#[tokio::test]
async fn remember_me_sessions_never_expire() -> Result<()> {
    let store = fresh_store().await?;
    seed_user(&store, "bob", "Bob", "pw", &["user"]).await?;
    let sm = SessionManager::default();

    let issued = sm.create_session(&store, "bob", true).await?;
    assert!(issued.expiration.is_none());
    assert!(sm.resolve_session(&store, &issued.token).await?.is_some());

    // Liveness with a null expiry ignores the clock entirely
    let far_future = Utc::now() + Duration::days(3650);
    assert!(store.resolve_session(&issued.token, far_future).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn default_sessions_expire_after_24_hours() -> Result<()> {
    let store = fresh_store().await?;
    seed_user(&store, "bob", "Bob", "pw", &["user"]).await?;
    let sm = SessionManager::default();

    let issued = sm.create_session(&store, "bob", false).await?;
    let expiration = issued.expiration.expect("expiration");
    let remaining = expiration - Utc::now();
    assert!(remaining <= Duration::hours(24));
    assert!(remaining > Duration::hours(23));

    // Live now, dead once the expiration instant has passed
    assert!(store.resolve_session(&issued.token, Utc::now()).await?.is_some());
    let after = expiration + Duration::seconds(1);
    assert!(store.resolve_session(&issued.token, after).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn expired_or_unknown_tokens_yield_the_same_session_failure() -> Result<()> {
    let store = fresh_store().await?;
    let id = seed_user(&store, "bob", "Bob", "pw", &["user"]).await?;
    store
        .insert_session(id, "deadbeefdeadbeefdeadbeefdeadbeef", Some(Utc::now() - Duration::hours(1)))
        .await?;
    let auth = CredentialValidator::default();

    let expired = auth.login_with_token(&store, "deadbeefdeadbeefdeadbeefdeadbeef").await?;
    let unknown = auth.login_with_token(&store, "0000000000000000").await?;
    assert!(!expired.success);
    assert!(!unknown.success);
    assert_eq!(serde_json::to_value(&expired)?, serde_json::to_value(&unknown)?);
    Ok(())
}

#[tokio::test]
async fn session_creation_for_unknown_username_is_not_found() -> Result<()> {
    let store = fresh_store().await?;
    let sm = SessionManager::default();
    let err = sm.create_session(&store, "ghost", false).await.unwrap_err();
    assert_eq!(err.http_status(), 404);
    Ok(())
}

#[tokio::test]
async fn concurrent_session_creation_yields_independent_tokens() -> Result<()> {
    let store = fresh_store().await?;
    seed_user(&store, "bob", "Bob", "pw", &["user"]).await?;
    let sm = SessionManager::default();

    let (a, b) = tokio::join!(
        sm.create_session(&store, "bob", false),
        sm.create_session(&store, "bob", false),
    );
    let a = a?;
    let b = b?;
    assert_ne!(a.token, b.token);

    // Each token is independently live
    assert!(sm.resolve_session(&store, &a.token).await?.is_some());
    assert!(sm.resolve_session(&store, &b.token).await?.is_some());

    // One expiring must not affect the other: check liveness past a's expiry
    let past_a = a.expiration.expect("expiration") + Duration::seconds(1);
    assert!(store.resolve_session(&a.token, past_a).await?.is_none());
    assert!(store
        .resolve_session(&b.token, b.expiration.expect("expiration") - Duration::seconds(1))
        .await?
        .is_some());
    Ok(())
}

#[tokio::test]
async fn default_admin_provisioning_is_idempotent() -> Result<()> {
    let store = fresh_store().await?;
    security::ensure_default_admin(&store, "changeme").await?;
    security::ensure_default_admin(&store, "other").await?;

    let auth = CredentialValidator::default();
    let result = auth.authenticate(&store, &login("admin", "changeme", false)).await?;
    assert!(result.success, "first provisioning wins");
    assert_eq!(result.profile.expect("profile").roles, role_set(&["admin"]));
    Ok(())
}
