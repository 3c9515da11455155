mod common;

use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use aid_inventory_backend::services::error::ServiceError;
use aid_inventory_backend::services::query_cache::keys;
use aid_inventory_backend::services::donors;

use crate::common::{Op, TestEnv, OTHER_TOKEN, TOKEN};

#[tokio::test]
async fn test_session_loads_currency_from_profile() {
    let env = TestEnv::new();
    let ctx = env.session().await;
    assert_eq!(ctx.currency.current(), "EUR");
    assert_eq!(ctx.user_id(), env.user_id);
}

#[tokio::test]
async fn test_missing_preference_falls_back_to_default() {
    let env = TestEnv::new();
    let user = Uuid::new_v4();
    env.backend.add_user("token-new", user);
    env.backend.seed(
        "profiles",
        vec![json!({ "id": user, "agency_id": null, "preferred_currency": null })],
    );

    let ctx = env.sessions.resolve("token-new").await.unwrap();
    assert_eq!(ctx.currency.current(), "EUR");
}

#[tokio::test]
async fn test_unreadable_profile_falls_back_to_default() {
    let env = TestEnv::new();
    env.backend.fail(Op::Select, "profiles", "service unavailable");

    let ctx = env.session().await;
    assert_eq!(ctx.currency.current(), "EUR");
}

#[tokio::test]
async fn test_set_currency_writes_through_to_profile() {
    let env = TestEnv::new();
    let ctx = env.session().await;

    let code = ctx.currency.set(ctx.client(), "chf").await.unwrap();

    assert_eq!(code, "CHF");
    assert_eq!(ctx.currency.current(), "CHF");
    let profile = env.backend.row("profiles", env.user_id).unwrap();
    assert_eq!(profile["preferred_currency"], "CHF");
}

#[tokio::test]
async fn test_failed_currency_write_restores_previous_value() {
    let env = TestEnv::new();
    let ctx = env.session().await;
    env.backend.fail(Op::Update, "profiles", "permission denied");

    let err = ctx.currency.set(ctx.client(), "USD").await.unwrap_err();

    assert!(matches!(err, ServiceError::Remote(_)));
    assert_eq!(ctx.currency.current(), "EUR");
}

#[tokio::test]
async fn test_currency_update_without_profile_row_is_not_found() {
    let env = TestEnv::new();
    let user = Uuid::new_v4();
    env.backend.add_user("token-noprofile", user);
    let ctx = env.sessions.resolve("token-noprofile").await.unwrap();

    let err = ctx.currency.set(ctx.client(), "USD").await.unwrap_err();

    assert!(matches!(err, ServiceError::NotFound("Profil utilisateur")));
    assert_eq!(ctx.currency.current(), "EUR");
    assert!(env.backend.row("profiles", user).is_none());
}

#[tokio::test]
async fn test_invalid_currency_code_is_rejected_without_write() {
    let env = TestEnv::new();
    let ctx = env.session().await;
    env.backend.clear_calls();

    let err = ctx.currency.set(ctx.client(), "EURO").await.unwrap_err();

    assert!(matches!(err, ServiceError::Validation(_)));
    assert!(env.backend.writes().is_empty());
    assert_eq!(ctx.currency.current(), "EUR");
}

#[tokio::test]
async fn test_unknown_token_is_unauthenticated() {
    let env = TestEnv::new();

    let err = env.sessions.resolve("forged-token").await.err().unwrap();
    assert!(matches!(err, ServiceError::Unauthenticated));

    let err = env.sessions.resolve("  ").await.err().unwrap();
    assert!(matches!(err, ServiceError::Unauthenticated));
}

#[tokio::test]
async fn test_sessions_are_reused_per_token() {
    let env = TestEnv::new();

    let a = env.sessions.resolve(TOKEN).await.unwrap();
    let b = env.sessions.resolve(TOKEN).await.unwrap();
    let other = env.sessions.resolve(OTHER_TOKEN).await.unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &other));
}

#[tokio::test]
async fn test_sign_out_tears_down_session_state() {
    let env = TestEnv::new();
    let ctx = env.session().await;

    donors::list_donors(&ctx).await.unwrap();
    ctx.currency.set(ctx.client(), "GBP").await.unwrap();
    assert!(ctx.queries.peek(&keys::donors()).await.is_some());

    assert!(env.sessions.sign_out(TOKEN).await);
    assert!(!env.sessions.sign_out(TOKEN).await);

    let fresh = env.session().await;
    assert!(!Arc::ptr_eq(&ctx, &fresh));
    assert!(fresh.queries.peek(&keys::donors()).await.is_none());
    // Reloaded from the profile written through before sign-out
    assert_eq!(fresh.currency.current(), "GBP");
}

#[tokio::test]
async fn test_session_is_inactive_after_sign_out() {
    let env = TestEnv::new();
    assert!(!env.sessions.is_active(TOKEN));

    env.session().await;
    assert!(env.sessions.is_active(TOKEN));
    assert!(!env.sessions.is_active(OTHER_TOKEN));

    env.sessions.sign_out(TOKEN).await;
    assert!(!env.sessions.is_active(TOKEN));
}
