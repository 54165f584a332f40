//! Access-token issuing and verification.
//!
//! Access tokens are HS256-signed JWTs containing a [`Claims`] payload. They
//! are stateless: validity is the signature plus the `exp` claim, with no
//! store lookup and no revocation list.

use chrono::{TimeZone, Utc};
use greenhouse_core::duration::{lifetime_or_default, parse_duration};
use greenhouse_core::identity::UserIdentity;
use greenhouse_core::types::{DbId, Timestamp};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default access-token lifetime string.
const DEFAULT_EXPIRES_IN: &str = "2h";

/// JWT claims embedded in every access token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject -- the user's internal database id.
    pub sub: DbId,
    pub username: String,
    pub email: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Unique token identifier (UUID v4) for audit logs.
    pub jti: String,
}

impl Claims {
    pub fn identity(&self) -> UserIdentity {
        UserIdentity {
            id: self.sub,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }

    pub fn expires_at(&self) -> Timestamp {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
    }
}

/// Configuration for JWT token generation and validation.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Access-token lifetime, `<int>[smhd]` (default: `2h`).
    pub expires_in: String,
}

impl JwtConfig {
    /// Load JWT configuration from environment variables.
    ///
    /// | Env Var          | Required | Default |
    /// |------------------|----------|---------|
    /// | `JWT_SECRET`     | **yes**  | --      |
    /// | `JWT_EXPIRES_IN` | no       | `2h`    |
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let secret =
            std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "JWT_SECRET must not be empty");

        let expires_in =
            std::env::var("JWT_EXPIRES_IN").unwrap_or_else(|_| DEFAULT_EXPIRES_IN.into());
        if parse_duration(&expires_in).is_none() {
            tracing::warn!(
                expires_in = %expires_in,
                "JWT_EXPIRES_IN is not <int>[smhd]; access tokens will use the 2h default"
            );
        }

        Self { secret, expires_in }
    }

    /// Access-token lifetime in seconds.
    pub fn lifetime_secs(&self) -> i64 {
        lifetime_or_default(&self.expires_in).num_seconds()
    }
}

/// Why a token was rejected or could not be issued.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    /// Signing failed; a server misconfiguration, not a per-request error.
    #[error("Token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Issue an HS256 access token for the given identity.
pub fn generate_access_token(
    user: &UserIdentity,
    config: &JwtConfig,
) -> Result<String, TokenError> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        exp: now + config.lifetime_secs(),
        iat: now,
        jti: Uuid::new_v4().to_string(),
    };
    sign(&claims, config)
}

/// Sign arbitrary claims. Exposed so callers can mint tokens with a chosen
/// `exp` (e.g. already expired) when exercising verification.
pub fn sign(claims: &Claims, config: &JwtConfig) -> Result<String, TokenError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(TokenError::Signing)
}

/// Verify the signature and expiry of an access token and return its claims.
///
/// No leeway is applied to `exp`: a token is expired the second its claim passes.
pub fn validate_token(token: &str, config: &JwtConfig) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::Invalid,
    })
}
