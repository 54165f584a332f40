//! Route definitions for the `/auth` resource.

use axum::routing::{delete, get, post, put};
use axum::Router;

use crate::handlers::auth;
use crate::routes::health;
use crate::state::AppState;

/// Routes mounted at `/auth`.
///
/// ```text
/// POST   /register                 -> register
/// POST   /login                    -> login
/// POST   /refresh                  -> refresh (refresh cookie)
/// GET    /validate                 -> validate (gateway)
/// POST   /logout                   -> logout
/// POST   /logout-all               -> logout_all (requires auth)
/// GET    /me                       -> me (requires auth)
/// PUT    /change-password          -> change_password (requires auth)
/// GET    /sessions                 -> list_sessions (requires auth)
/// DELETE /sessions/{session_token} -> revoke_session (requires auth)
/// GET    /health                   -> health
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/validate", get(auth::validate))
        .route("/logout", post(auth::logout))
        .route("/logout-all", post(auth::logout_all))
        .route("/me", get(auth::me))
        .route("/change-password", put(auth::change_password))
        .route("/sessions", get(auth::list_sessions))
        .route("/sessions/{session_token}", delete(auth::revoke_session))
        .route("/health", get(health::health_check))
}
