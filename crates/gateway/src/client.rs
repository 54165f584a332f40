//! Client for the auth service's `GET /auth/validate`.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use greenhouse_core::identity::{ValidateResponse, SESSION_TOKEN_HEADER};

use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Credentials copied from the incoming request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Raw `Authorization` header value.
    pub authorization: Option<String>,
    pub session_token: Option<String>,
}

/// Anything that can answer the validate contract.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn validate(&self, credentials: &Credentials) -> Result<ValidateResponse, GatewayError>;
}

/// [`AuthClient`] over HTTP.
pub struct HttpAuthClient {
    client: reqwest::Client,
    validate_url: String,
}

impl HttpAuthClient {
    pub fn new(config: &GatewayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.validate_timeout_ms))
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            validate_url: format!("{}/auth/validate", config.auth_service_url),
        }
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn validate(&self, credentials: &Credentials) -> Result<ValidateResponse, GatewayError> {
        let mut request = self.client.get(&self.validate_url);
        if let Some(authorization) = &credentials.authorization {
            request = request.header(AUTHORIZATION, authorization);
        }
        if let Some(session_token) = &credentials.session_token {
            request = request.header(SESSION_TOKEN_HEADER, session_token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK | StatusCode::UNAUTHORIZED => {
                Ok(response.json::<ValidateResponse>().await?)
            }
            other => Err(GatewayError::UnexpectedStatus(other.as_u16())),
        }
    }
}
