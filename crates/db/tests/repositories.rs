//! Repository tests against a real PostgreSQL database.
//!
//! Exercises the queries the session layer depends on:
//! - Joined projections into `SessionWithUser`
//! - Conditional refresh-token rotation (single use, one concurrent winner)
//! - `RETURNING` key collection on every delete path
//! - Inclusive expiry sweep
//! - Unique constraint violations on users

use chrono::{Duration, Utc};
use greenhouse_core::types::{ClientInfo, Timestamp};
use greenhouse_db::models::session::{
    CreateSession, RotateRefreshToken, SessionKeys, SessionWithUser,
};
use greenhouse_db::models::user::{CreateUser, User};
use greenhouse_db::repositories::{SessionRepo, UserRepo};
use greenhouse_db::unique_violation;
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn new_user(pool: &PgPool, username: &str) -> User {
    UserRepo::create(
        pool,
        &CreateUser {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: "hash".to_string(),
        },
    )
    .await
    .unwrap()
}

async fn new_session(
    pool: &PgPool,
    user_id: i64,
    tag: &str,
    expires_at: Timestamp,
) -> SessionWithUser {
    SessionRepo::create(
        pool,
        &CreateSession {
            user_id,
            session_token: format!("session-{tag}"),
            refresh_token: format!("refresh-{tag}"),
            expires_at,
            client: ClientInfo {
                ip_address: Some("10.0.0.1".into()),
                user_agent: Some("curl/8".into()),
            },
        },
    )
    .await
    .unwrap()
}

fn rotation(row: &SessionWithUser, current: &str, next: &str) -> RotateRefreshToken {
    RotateRefreshToken {
        id: row.session.id,
        current_refresh_token: current.to_string(),
        new_refresh_token: next.to_string(),
        expires_at: Utc::now() + Duration::days(7),
        client: ClientInfo::default(),
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_duplicate_username_and_email_report_constraint(pool: PgPool) {
    new_user(&pool, "alice").await;

    let err = UserRepo::create(
        &pool,
        &CreateUser {
            username: "alice".into(),
            email: "other@example.com".into(),
            password_hash: "hash".into(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(unique_violation(&err).as_deref(), Some("uq_users_username"));

    let err = UserRepo::create(
        &pool,
        &CreateUser {
            username: "bob".into(),
            email: "alice@example.com".into(),
            password_hash: "hash".into(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(unique_violation(&err).as_deref(), Some("uq_users_email"));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_new_user_defaults_and_login_stamp(pool: PgPool) {
    let user = new_user(&pool, "alice").await;
    assert!(user.is_active);
    assert!(!user.is_verified);
    assert!(user.last_login_at.is_none());

    let stamped = UserRepo::record_successful_login(&pool, user.id)
        .await
        .unwrap()
        .unwrap();
    assert!(stamped.last_login_at.is_some());

    assert!(UserRepo::record_successful_login(&pool, user.id + 1000)
        .await
        .unwrap()
        .is_none());
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_created_session_is_joined_with_owner(pool: PgPool) {
    let user = new_user(&pool, "alice").await;
    let created = new_session(&pool, user.id, "a", Utc::now() + Duration::days(7)).await;

    assert_eq!(created.session.user_id, user.id);
    assert_eq!(created.username, "alice");
    assert_eq!(created.email, "alice@example.com");
    assert!(created.session.is_active);
    assert_eq!(created.session.ip_address.as_deref(), Some("10.0.0.1"));

    let by_session = SessionRepo::find_by_session_token(&pool, "session-a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_session.session.id, created.session.id);
    assert_eq!(by_session.identity(), user.identity());

    let by_refresh = SessionRepo::find_by_refresh_token(&pool, "refresh-a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_refresh.session.id, created.session.id);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_session_for_missing_user_violates_foreign_key(pool: PgPool) {
    let err = SessionRepo::create(
        &pool,
        &CreateSession {
            user_id: 9999,
            session_token: "session-x".into(),
            refresh_token: "refresh-x".into(),
            expires_at: Utc::now() + Duration::days(7),
            client: ClientInfo::default(),
        },
    )
    .await
    .unwrap_err();

    let db_err = err.as_database_error().expect("database error");
    assert_eq!(db_err.code().as_deref(), Some("23503"));
    assert_eq!(db_err.constraint(), Some("fk_sessions_user_id"));
}

#[sqlx::test(migrations = "./migrations")]
async fn test_rotation_is_single_use(pool: PgPool) {
    let user = new_user(&pool, "alice").await;
    let row = new_session(&pool, user.id, "a", Utc::now() + Duration::minutes(5)).await;

    let rotated = SessionRepo::rotate_refresh_token(&pool, &rotation(&row, "refresh-a", "refresh-b"))
        .await
        .unwrap()
        .expect("first rotation applies");
    assert_eq!(rotated.session.refresh_token.as_deref(), Some("refresh-b"));
    assert_eq!(rotated.session.session_token, "session-a");
    assert!(rotated.session.expires_at > row.session.expires_at);
    assert_eq!(rotated.username, "alice");
    // Absent client info keeps the stored values.
    assert_eq!(rotated.session.user_agent.as_deref(), Some("curl/8"));

    let replay = SessionRepo::rotate_refresh_token(&pool, &rotation(&row, "refresh-a", "refresh-c"))
        .await
        .unwrap();
    assert!(replay.is_none());

    assert!(SessionRepo::find_by_refresh_token(&pool, "refresh-a")
        .await
        .unwrap()
        .is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_concurrent_rotation_has_one_winner(pool: PgPool) {
    let user = new_user(&pool, "alice").await;
    let row = new_session(&pool, user.id, "a", Utc::now() + Duration::days(7)).await;

    let first = rotation(&row, "refresh-a", "refresh-b");
    let second = rotation(&row, "refresh-a", "refresh-c");
    let (a, b) = tokio::join!(
        SessionRepo::rotate_refresh_token(&pool, &first),
        SessionRepo::rotate_refresh_token(&pool, &second),
    );
    let winners = [a.unwrap(), b.unwrap()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();
    assert_eq!(winners.len(), 1);

    let stored = SessionRepo::find_by_session_token(&pool, "session-a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.session.refresh_token, winners[0].session.refresh_token);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_rotation_skips_inactive_session(pool: PgPool) {
    let user = new_user(&pool, "alice").await;
    let row = new_session(&pool, user.id, "a", Utc::now() + Duration::days(7)).await;
    sqlx::query("UPDATE sessions SET is_active = false WHERE id = $1")
        .bind(row.session.id)
        .execute(&pool)
        .await
        .unwrap();

    let result = SessionRepo::rotate_refresh_token(&pool, &rotation(&row, "refresh-a", "refresh-b"))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_deletes_return_the_removed_keys(pool: PgPool) {
    let user = new_user(&pool, "alice").await;
    let later = Utc::now() + Duration::days(7);
    new_session(&pool, user.id, "a", later).await;
    new_session(&pool, user.id, "b", later).await;
    new_session(&pool, user.id, "c", later).await;
    new_session(&pool, user.id, "d", later).await;

    let by_session = SessionRepo::delete_by_session_token(&pool, "session-a")
        .await
        .unwrap();
    assert_eq!(
        by_session,
        Some(SessionKeys {
            session_token: "session-a".into(),
            refresh_token: Some("refresh-a".into()),
        })
    );
    assert!(SessionRepo::delete_by_session_token(&pool, "session-a")
        .await
        .unwrap()
        .is_none());

    let by_refresh = SessionRepo::delete_by_refresh_token(&pool, "refresh-b")
        .await
        .unwrap();
    assert_eq!(by_refresh.map(|k| k.session_token).as_deref(), Some("session-b"));

    let mut rest = SessionRepo::delete_for_user(&pool, user.id).await.unwrap();
    rest.sort_by(|x, y| x.session_token.cmp(&y.session_token));
    let tokens: Vec<&str> = rest.iter().map(|k| k.session_token.as_str()).collect();
    assert_eq!(tokens, ["session-c", "session-d"]);
    assert!(SessionRepo::delete_for_user(&pool, user.id)
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_expired_sweep_is_inclusive(pool: PgPool) {
    let user = new_user(&pool, "alice").await;
    // Postgres keeps microseconds; truncate so the boundary row compares equal.
    let now = Timestamp::from_timestamp_micros(Utc::now().timestamp_micros()).unwrap();

    new_session(&pool, user.id, "past", now - Duration::seconds(1)).await;
    new_session(&pool, user.id, "edge", now).await;
    new_session(&pool, user.id, "future", now + Duration::seconds(1)).await;

    let mut swept = SessionRepo::delete_expired(&pool, now).await.unwrap();
    swept.sort_by(|x, y| x.session_token.cmp(&y.session_token));
    let tokens: Vec<&str> = swept.iter().map(|k| k.session_token.as_str()).collect();
    assert_eq!(tokens, ["session-edge", "session-past"]);

    let remaining = SessionRepo::list_active_for_user(&pool, user.id, now)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].session_token, "session-future");
}

#[sqlx::test(migrations = "./migrations")]
async fn test_touch_reports_existence_and_orders_listing(pool: PgPool) {
    let user = new_user(&pool, "alice").await;
    let later = Utc::now() + Duration::days(7);
    new_session(&pool, user.id, "a", later).await;
    new_session(&pool, user.id, "b", later).await;

    assert!(SessionRepo::touch(&pool, "session-a").await.unwrap());
    assert!(!SessionRepo::touch(&pool, "session-missing").await.unwrap());

    let listed = SessionRepo::list_active_for_user(&pool, user.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].session_token, "session-a");
}
