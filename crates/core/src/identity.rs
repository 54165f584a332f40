//! The validate contract shared by the auth service and the gateway.
//!
//! The gateway forwards the caller's `Authorization` and
//! [`SESSION_TOKEN_HEADER`] headers to `GET /auth/validate` and, on success,
//! injects the `x-user-*` headers into the proxied request. Downstream
//! services trust those headers without re-verifying them, so only the
//! gateway may set them.

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Request header carrying the opaque session token.
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";
/// Injected by the gateway: authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Injected by the gateway: authenticated username.
pub const USER_USERNAME_HEADER: &str = "x-user-username";
/// Injected by the gateway: authenticated email.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// Every header the gateway owns. Client-supplied copies must be stripped.
pub const IDENTITY_HEADERS: [&str; 3] = [USER_ID_HEADER, USER_USERNAME_HEADER, USER_EMAIL_HEADER];

/// Identity carried by an access token and a session view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: DbId,
    pub username: String,
    pub email: String,
}

/// Response body of `GET /auth/validate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidateResponse {
    pub fn valid(user: UserIdentity, expires_at: Timestamp) -> Self {
        Self {
            valid: true,
            user: Some(user),
            expires_at: Some(expires_at),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            user: None,
            expires_at: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_response_omits_identity_fields() {
        let json = serde_json::to_value(ValidateResponse::invalid("Token expired")).unwrap();
        assert_eq!(json, serde_json::json!({ "valid": false, "error": "Token expired" }));
    }

    #[test]
    fn valid_response_round_trips_through_json() {
        let response = ValidateResponse::valid(
            UserIdentity {
                id: 7,
                username: "alice".into(),
                email: "a@x.com".into(),
            },
            chrono::Utc::now(),
        );
        let text = serde_json::to_string(&response).unwrap();
        let back: ValidateResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(back, response);
    }
}
