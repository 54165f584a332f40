#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use greenhouse_auth::auth::jwt::JwtConfig;
use greenhouse_auth::cache::{MemoryCache, SessionCache};
use greenhouse_auth::config::ServerConfig;
use greenhouse_auth::router::build_app_router;
use greenhouse_auth::service::AuthService;
use greenhouse_auth::session::{SessionConfig, SessionManager};
use greenhouse_auth::state::AppState;
use greenhouse_auth::store::MemoryStore;
use greenhouse_core::identity::SESSION_TOKEN_HEADER;

pub const PASSWORD: &str = "Secret123";

/// Everything a test needs to drive the service and poke at its backends.
pub struct TestApp {
    pub app: Router,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub auth: Arc<AuthService>,
    pub config: ServerConfig,
}

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "integration-test-secret-at-least-32-bytes".to_string(),
        expires_in: "2h".to_string(),
    }
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_url: String::new(),
        redis_url: None,
        store_timeout_ms: 1000,
        cache_timeout_ms: 200,
        cookie_secure: true,
        jwt: jwt_config(),
        session: SessionConfig::default(),
    }
}

/// Build the full application router over in-memory backends.
///
/// Uses the same [`build_app_router`] as `main.rs` so tests exercise the
/// production middleware stack.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());

    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        SessionCache::new(cache.clone(), Duration::from_millis(config.cache_timeout_ms)),
        config.session.clone(),
    ));
    let auth = Arc::new(AuthService::new(
        store.clone(),
        sessions,
        config.jwt.clone(),
    ));

    let state = AppState {
        config: Arc::new(config.clone()),
        auth: Arc::clone(&auth),
    };
    let app = build_app_router(state, &config);

    TestApp {
        app,
        store,
        cache,
        auth,
        config,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

/// GET with a bearer token and, optionally, a session token.
pub async fn get_auth(
    app: &Router,
    uri: &str,
    access_token: &str,
    session_token: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::get(uri).header(AUTHORIZATION, format!("Bearer {access_token}"));
    if let Some(session) = session_token {
        builder = builder.header(SESSION_TOKEN_HEADER, session);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    let request = Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

/// POST with no body, carrying the given refresh cookie and session token.
pub async fn post_with_credentials(
    app: &Router,
    uri: &str,
    access_token: Option<&str>,
    session_token: Option<&str>,
    refresh_cookie: Option<&str>,
) -> Response<Body> {
    let mut builder = Request::post(uri);
    if let Some(token) = access_token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(session) = session_token {
        builder = builder.header(SESSION_TOKEN_HEADER, session);
    }
    if let Some(refresh) = refresh_cookie {
        builder = builder.header(COOKIE, format!("refresh_token={refresh}"));
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

pub async fn put_json_auth(
    app: &Router,
    uri: &str,
    access_token: &str,
    session_token: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::put(uri)
        .header(CONTENT_TYPE, "application/json")
        .header(AUTHORIZATION, format!("Bearer {access_token}"))
        .header(SESSION_TOKEN_HEADER, session_token)
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn delete_auth(
    app: &Router,
    uri: &str,
    access_token: &str,
    session_token: &str,
) -> Response<Body> {
    let request = Request::delete(uri)
        .header(AUTHORIZATION, format!("Bearer {access_token}"))
        .header(SESSION_TOKEN_HEADER, session_token)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// The raw `Set-Cookie` header for the refresh cookie, if any.
pub fn refresh_set_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("refresh_token="))
        .map(str::to_string)
}

/// The refresh token value carried by the response's `Set-Cookie`.
pub fn refresh_cookie_value(response: &Response<Body>) -> Option<String> {
    let header = refresh_set_cookie(response)?;
    let value = header
        .strip_prefix("refresh_token=")?
        .split(';')
        .next()?
        .to_string();
    (!value.is_empty()).then_some(value)
}

// ---------------------------------------------------------------------------
// Flow helpers
// ---------------------------------------------------------------------------

/// Tokens from a successful HTTP login.
#[derive(Debug, Clone)]
pub struct LoggedIn {
    pub access_token: String,
    pub session_token: String,
    pub refresh_token: String,
    pub user_id: i64,
}

pub async fn register(app: &Router, username: &str, email: &str) -> Response<Body> {
    post_json(
        app,
        "/auth/register",
        serde_json::json!({ "username": username, "email": email, "password": PASSWORD }),
    )
    .await
}

pub async fn login(app: &Router, username: &str, password: &str) -> Response<Body> {
    post_json(
        app,
        "/auth/login",
        serde_json::json!({ "username": username, "password": password }),
    )
    .await
}

/// Register a user and log them in, asserting both succeed.
pub async fn register_and_login(app: &Router, username: &str) -> LoggedIn {
    let response = register(app, username, &format!("{username}@example.com")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    login_ok(app, username, PASSWORD).await
}

pub async fn login_ok(app: &Router, username: &str, password: &str) -> LoggedIn {
    let response = login(app, username, password).await;
    assert_eq!(response.status(), StatusCode::OK);
    let refresh_token = refresh_cookie_value(&response).expect("login must set refresh cookie");
    let json = body_json(response).await;
    LoggedIn {
        access_token: json["access_token"].as_str().unwrap().to_string(),
        session_token: json["session_token"].as_str().unwrap().to_string(),
        refresh_token,
        user_id: json["user"]["id"].as_i64().unwrap(),
    }
}
