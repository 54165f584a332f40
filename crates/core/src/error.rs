//! Domain error taxonomy surfaced by every auth operation.
//!
//! Transport layers map each variant to a status code with an exhaustive
//! match; see `greenhouse_auth::error::AppError`.

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Missing or malformed input.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Bad credentials, or an expired / invalid / mismatched token.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Duplicate username or email.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A referenced session or entity does not exist.
    #[error("Entity not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    /// Store failure or misconfiguration. Never shown verbatim to clients.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for the single message every credential failure uses, so
    /// callers cannot tell which check failed.
    pub fn invalid_credentials() -> Self {
        CoreError::Unauthorized("Invalid credentials".into())
    }
}
