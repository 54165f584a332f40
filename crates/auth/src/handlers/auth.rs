//! Handlers for the `/auth` resource.
//!
//! The refresh token never appears in a JSON body; it travels only in the
//! `refresh_token` cookie (HttpOnly, SameSite=Strict, scoped to `/auth`).

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::header::{COOKIE, SET_COOKIE, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use cookie::{Cookie, SameSite};
use greenhouse_core::error::CoreError;
use greenhouse_core::identity::{UserIdentity, ValidateResponse};
use greenhouse_core::types::{ClientInfo, Timestamp};
use greenhouse_db::models::session::SessionSummary;
use greenhouse_db::models::user::UserResponse;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{bearer_token, session_token, AuthUser};
use crate::state::AppState;

/// Name of the cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refresh_token";
/// Path scope of the refresh cookie.
const REFRESH_COOKIE_PATH: &str = "/auth";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /auth/register`.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Request body for `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Optional body of `POST /auth/refresh` for clients that cannot hold cookies.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Request body for `PUT /auth/change-password`.
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: UserResponse,
}

/// Returned by login.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub session_token: String,
    /// Session expiry.
    pub expires_at: Timestamp,
    pub user: UserResponse,
}

/// Returned by refresh.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub session_token: String,
    pub expires_at: Timestamp,
    pub user: UserIdentity,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub message: &'static str,
    pub sessions_revoked: u64,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let user = state
        .auth
        .register(&input.username, &input.email, &input.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully",
            user,
        }),
    ))
}

/// POST /auth/login
///
/// Authenticate with username + password. Returns the access and session
/// tokens in the body and sets the refresh cookie.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<LoginRequest>,
) -> AppResult<Response> {
    let outcome = state
        .auth
        .login(&input.username, &input.password, client_info(&headers))
        .await?;

    let cookie = refresh_cookie(&state.config, outcome.refresh_token);
    let body = LoginResponse {
        access_token: outcome.access_token,
        session_token: outcome.session_token,
        expires_at: outcome.expires_at,
        user: outcome.user,
    };
    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Json(body)).into_response())
}

/// POST /auth/refresh
///
/// Rotate the refresh token. The cookie wins over a body-supplied token.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let from_body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice::<RefreshRequest>(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?
            .refresh_token
    };
    let presented = read_refresh_cookie(&headers).or(from_body);

    let outcome = state
        .auth
        .refresh(presented.as_deref(), client_info(&headers))
        .await?;

    let cookie = refresh_cookie(&state.config, outcome.refresh_token);
    let body = RefreshResponse {
        access_token: outcome.access_token,
        session_token: outcome.session_token,
        expires_at: outcome.expires_at,
        user: outcome.user,
    };
    Ok((AppendHeaders([(SET_COOKIE, cookie)]), Json(body)).into_response())
}

/// GET /auth/validate
///
/// The gateway's validation endpoint. Always answers with a
/// [`ValidateResponse`]: 200 when valid, 401 otherwise.
pub async fn validate(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let access_token = match bearer_token(&headers) {
        Ok(token) => token,
        Err(_) => return invalid("Invalid Authorization format"),
    };

    match state
        .auth
        .validate(access_token, session_token(&headers))
        .await
    {
        Ok(validated) => Json(ValidateResponse::valid(
            validated.user,
            validated.expires_at,
        ))
        .into_response(),
        Err(CoreError::Unauthorized(msg)) => invalid(msg),
        Err(other) => AppError::Core(other).into_response(),
    }
}

/// POST /auth/logout
///
/// Ends the session named by `x-session-token` and/or the refresh cookie.
/// Succeeds even when neither matches a live session.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let refresh = read_refresh_cookie(&headers);
    state
        .auth
        .logout(session_token(&headers), refresh.as_deref())
        .await?;

    Ok(cleared(
        &state.config,
        MessageResponse {
            message: "Logged out successfully",
        },
    ))
}

/// POST /auth/logout-all
pub async fn logout_all(State(state): State<AppState>, auth_user: AuthUser) -> AppResult<Response> {
    let sessions_revoked = state.auth.logout_all(auth_user.user_id).await?;
    Ok(cleared(
        &state.config,
        LogoutAllResponse {
            message: "Logged out from all devices",
            sessions_revoked,
        },
    ))
}

/// GET /auth/me
pub async fn me(State(state): State<AppState>, auth_user: AuthUser) -> AppResult<Json<MeResponse>> {
    let user = state.auth.current_user(auth_user.user_id).await?;
    Ok(Json(MeResponse { user }))
}

/// PUT /auth/change-password
///
/// Every session of the user, including the caller's, is revoked.
pub async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(input): Json<ChangePasswordRequest>,
) -> AppResult<Response> {
    state
        .auth
        .change_password(
            auth_user.user_id,
            &input.current_password,
            &input.new_password,
        )
        .await?;

    Ok(cleared(
        &state.config,
        MessageResponse {
            message: "Password changed successfully. Please log in again.",
        },
    ))
}

/// GET /auth/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<Json<SessionsResponse>> {
    let sessions = state
        .auth
        .list_sessions(auth_user.user_id, auth_user.session_token.as_deref())
        .await?;
    Ok(Json(SessionsResponse { sessions }))
}

/// DELETE /auth/sessions/{session_token}
pub async fn revoke_session(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(target): Path<String>,
) -> AppResult<StatusCode> {
    state
        .auth
        .revoke_session(auth_user.user_id, &target)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn invalid(error: impl Into<String>) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ValidateResponse::invalid(error)),
    )
        .into_response()
}

/// Client metadata from proxy headers. The first `x-forwarded-for` hop wins.
pub fn client_info(headers: &HeaderMap) -> ClientInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let ip_address = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip").map(str::to_string));

    ClientInfo {
        ip_address,
        user_agent: header(USER_AGENT.as_str()).map(str::to_string),
    }
}

fn refresh_cookie_base(config: &ServerConfig, value: String) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE, value))
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Strict)
        .path(REFRESH_COOKIE_PATH)
        .build()
}

/// `Set-Cookie` value carrying a fresh refresh token.
fn refresh_cookie(config: &ServerConfig, refresh_token: String) -> HeaderValue {
    let mut cookie = refresh_cookie_base(config, refresh_token);
    cookie.set_max_age(cookie::time::Duration::seconds(
        config.session.lifetime_secs(),
    ));
    to_header_value(&cookie)
}

/// `Set-Cookie` value that deletes the refresh cookie.
fn clear_refresh_cookie(config: &ServerConfig) -> HeaderValue {
    let mut cookie = refresh_cookie_base(config, String::new());
    cookie.make_removal();
    to_header_value(&cookie)
}

fn to_header_value(cookie: &Cookie<'_>) -> HeaderValue {
    // Token values are hex, so the serialized cookie is always visible ASCII.
    HeaderValue::from_str(&cookie.to_string()).unwrap_or_else(|_| HeaderValue::from_static(""))
}

fn cleared<T: Serialize>(config: &ServerConfig, body: T) -> Response {
    (
        AppendHeaders([(SET_COOKIE, clear_refresh_cookie(config))]),
        Json(body),
    )
        .into_response()
}

/// The refresh token from the request's `Cookie` headers.
pub fn read_refresh_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|c| c.name() == REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_info_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.1"));
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));

        let info = client_info(&headers);
        assert_eq!(info.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(info.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn client_info_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.2"));
        assert_eq!(
            client_info(&headers).ip_address.as_deref(),
            Some("198.51.100.2")
        );
    }

    #[test]
    fn refresh_cookie_is_read_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=abc123; lang=en"),
        );
        assert_eq!(read_refresh_cookie(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn empty_refresh_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("refresh_token="));
        assert_eq!(read_refresh_cookie(&headers), None);
    }
}
