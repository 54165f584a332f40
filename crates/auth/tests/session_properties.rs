//! Service-level properties of the session and token lifecycle: single-use
//! refresh under concurrency, expiry boundaries, and behaviour when the cache
//! is evicted or unreachable.

mod common;

use assert_matches::assert_matches;
use chrono::{Duration as ChronoDuration, Utc};
use uuid::Uuid;

use common::{build_test_app, jwt_config, register_and_login};
use greenhouse_auth::auth::jwt::{sign, Claims};
use greenhouse_core::error::CoreError;
use greenhouse_core::types::ClientInfo;

#[tokio::test]
async fn test_login_then_validate_returns_same_identity() {
    let t = build_test_app();
    let s = register_and_login(&t.app, "alice").await;

    let validated = t
        .auth
        .validate(Some(&s.access_token), Some(&s.session_token))
        .await
        .unwrap();
    assert_eq!(validated.user.id, s.user_id);
    assert_eq!(validated.user.username, "alice");
    assert_eq!(validated.session_token.as_deref(), Some(s.session_token.as_str()));
}

#[tokio::test]
async fn test_concurrent_refresh_has_exactly_one_winner() {
    let t = build_test_app();
    let s = register_and_login(&t.app, "alice").await;

    let (a, b) = tokio::join!(
        t.auth.refresh(Some(&s.refresh_token), ClientInfo::default()),
        t.auth.refresh(Some(&s.refresh_token), ClientInfo::default()),
    );

    let outcomes = [a, b];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one refresh may succeed");
    for loser in outcomes.iter().filter(|r| r.is_err()) {
        assert_matches!(loser, Err(CoreError::Unauthorized(_)));
    }
    assert_eq!(t.store.session_count().await, 1);
}

#[tokio::test]
async fn test_concurrent_refresh_on_spawned_tasks() {
    let t = build_test_app();
    let s = register_and_login(&t.app, "alice").await;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let auth = t.auth.clone();
            let token = s.refresh_token.clone();
            tokio::spawn(async move { auth.refresh(Some(&token), ClientInfo::default()).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(t.store.session_count().await, 1);
}

#[tokio::test]
async fn test_cleanup_deletes_at_and_before_boundary_only() {
    let t = build_test_app();
    let expired = register_and_login(&t.app, "alice").await;
    let live = register_and_login(&t.app, "bob").await;

    t.store
        .set_session_expiry(&expired.session_token, Utc::now() - ChronoDuration::milliseconds(1))
        .await;

    let removed = t.auth.sessions().cleanup_expired_sessions().await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(t.store.session_count().await, 1);

    assert!(t
        .auth
        .sessions()
        .validate_session(&live.session_token)
        .await
        .unwrap()
        .is_some());
    assert!(t
        .auth
        .sessions()
        .validate_session(&expired.session_token)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_expired_session_does_not_validate() {
    let t = build_test_app();
    let s = register_and_login(&t.app, "alice").await;

    t.store
        .set_session_expiry(&s.session_token, Utc::now() - ChronoDuration::seconds(1))
        .await;
    t.cache.clear().await;

    let result = t.auth.validate(Some(&s.access_token), Some(&s.session_token)).await;
    assert_matches!(result, Err(CoreError::Unauthorized(msg)) if msg == "Invalid or expired session");
}

#[tokio::test]
async fn test_expired_access_token_is_rejected() {
    let t = build_test_app();
    let s = register_and_login(&t.app, "alice").await;

    let now = Utc::now().timestamp();
    let expired = sign(
        &Claims {
            sub: s.user_id,
            username: "alice".into(),
            email: "alice@example.com".into(),
            exp: now - 1,
            iat: now - 7200,
            jti: Uuid::new_v4().to_string(),
        },
        &jwt_config(),
    )
    .unwrap();

    let result = t.auth.validate(Some(&expired), Some(&s.session_token)).await;
    assert_matches!(result, Err(CoreError::Unauthorized(msg)) if msg == "Token expired");
}

#[tokio::test]
async fn test_cache_eviction_rebuilds_from_store() {
    let t = build_test_app();
    let s = register_and_login(&t.app, "alice").await;

    t.cache.clear().await;
    assert!(t.cache.is_empty().await);

    let validated = t
        .auth
        .validate(Some(&s.access_token), Some(&s.session_token))
        .await
        .unwrap();
    assert_eq!(validated.user.username, "alice");
    assert_eq!(t.cache.len().await, 2, "session and refresh keys are repopulated");

    // Refresh through an evicted reverse index falls back to the store.
    t.cache.clear().await;
    let rotated = t
        .auth
        .refresh(Some(&s.refresh_token), ClientInfo::default())
        .await
        .unwrap();
    assert_ne!(rotated.refresh_token, s.refresh_token);
}

#[tokio::test]
async fn test_operations_degrade_to_store_when_cache_is_down() {
    let t = build_test_app();
    t.cache.set_offline(true);

    let s = register_and_login(&t.app, "alice").await;
    let validated = t
        .auth
        .validate(Some(&s.access_token), Some(&s.session_token))
        .await
        .unwrap();
    assert_eq!(validated.user.id, s.user_id);

    let rotated = t
        .auth
        .refresh(Some(&s.refresh_token), ClientInfo::default())
        .await
        .unwrap();
    assert_matches!(
        t.auth.refresh(Some(&s.refresh_token), ClientInfo::default()).await,
        Err(CoreError::Unauthorized(_))
    );

    t.auth
        .logout(Some(&rotated.session_token), None)
        .await
        .unwrap();
    assert_matches!(
        t.auth
            .validate(Some(&s.access_token), Some(&s.session_token))
            .await,
        Err(CoreError::Unauthorized(_))
    );
}

#[tokio::test]
async fn test_store_outage_surfaces_as_internal() {
    let t = build_test_app();
    let s = register_and_login(&t.app, "alice").await;
    t.cache.clear().await;
    t.store.set_offline(true);

    assert_matches!(
        t.auth
            .validate(Some(&s.access_token), Some(&s.session_token))
            .await,
        Err(CoreError::Internal(_))
    );
}

#[tokio::test]
async fn test_refresh_records_new_client_metadata() {
    let t = build_test_app();
    let s = register_and_login(&t.app, "alice").await;

    t.auth
        .refresh(
            Some(&s.refresh_token),
            ClientInfo {
                ip_address: Some("203.0.113.9".into()),
                user_agent: Some("greenhouse-app/2.0".into()),
            },
        )
        .await
        .unwrap();

    let row = t
        .auth
        .sessions()
        .find_session(&s.session_token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.session.ip_address.as_deref(), Some("203.0.113.9"));
    assert_eq!(row.session.user_agent.as_deref(), Some("greenhouse-app/2.0"));
}
