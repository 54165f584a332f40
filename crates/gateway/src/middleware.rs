//! Identity middleware for routers behind the gateway.
//!
//! Two modes share one pipeline:
//!
//! - [`inject_identity`] never blocks. Valid credentials add the `x-user-*`
//!   headers; anything else forwards the request anonymously.
//! - [`require_auth`] answers `401` unless the auth service confirms the
//!   credentials.
//!
//! Install either with `axum::middleware::from_fn_with_state`.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use greenhouse_core::identity::{
    UserIdentity, IDENTITY_HEADERS, SESSION_TOKEN_HEADER, USER_EMAIL_HEADER, USER_ID_HEADER,
    USER_USERNAME_HEADER,
};
use serde_json::json;

use crate::client::{AuthClient, Credentials};

/// Shared state for the identity middleware.
#[derive(Clone)]
pub struct GatewayState {
    pub client: Arc<dyn AuthClient>,
}

impl GatewayState {
    pub fn new(client: Arc<dyn AuthClient>) -> Self {
        Self { client }
    }
}

/// The identity established for a request, also available as a request
/// extension to handlers running inside the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayIdentity(pub UserIdentity);

/// Outcome of checking one request.
enum Verdict {
    Anonymous,
    Authenticated(UserIdentity),
    Rejected(String),
}

/// Optional authentication: inject identity when valid, pass through otherwise.
pub async fn inject_identity(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Verdict::Authenticated(user) = authenticate(&state, &mut request).await {
        attach(&mut request, user);
    }
    next.run(request).await
}

/// Mandatory authentication: reject with 401 unless the credentials validate.
pub async fn require_auth(
    State(state): State<GatewayState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, &mut request).await {
        Verdict::Authenticated(user) => {
            attach(&mut request, user);
            next.run(request).await
        }
        Verdict::Anonymous => unauthorized("No token provided"),
        Verdict::Rejected(reason) => unauthorized(&reason),
    }
}

/// Strip spoofed identity headers, then ask the auth service.
async fn authenticate(state: &GatewayState, request: &mut Request) -> Verdict {
    strip_identity_headers(request.headers_mut());

    let credentials = credentials(request.headers());
    if credentials.authorization.is_none() {
        return Verdict::Anonymous;
    }

    match state.client.validate(&credentials).await {
        Ok(response) => match (response.valid, response.user) {
            (true, Some(user)) => Verdict::Authenticated(user),
            _ => Verdict::Rejected(
                response
                    .error
                    .unwrap_or_else(|| "Invalid token".to_string()),
            ),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Auth service validation failed");
            Verdict::Rejected("Authentication service unavailable".to_string())
        }
    }
}

pub fn strip_identity_headers(headers: &mut HeaderMap) {
    for name in IDENTITY_HEADERS {
        headers.remove(name);
    }
}

fn credentials(headers: &HeaderMap) -> Credentials {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .filter(|v| !v.trim().is_empty())
    };
    Credentials {
        authorization: header(AUTHORIZATION.as_str()),
        session_token: header(SESSION_TOKEN_HEADER),
    }
}

fn attach(request: &mut Request, user: UserIdentity) {
    let headers = request.headers_mut();
    headers.insert(USER_ID_HEADER, HeaderValue::from(user.id));
    if let Ok(username) = HeaderValue::from_str(&user.username) {
        headers.insert(USER_USERNAME_HEADER, username);
    }
    if let Ok(email) = HeaderValue::from_str(&user.email) {
        headers.insert(USER_EMAIL_HEADER, email);
    }
    request.extensions_mut().insert(GatewayIdentity(user));
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": message, "code": "UNAUTHORIZED" })),
    )
        .into_response()
}
