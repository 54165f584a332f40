/// Gateway authentication settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the auth service (default: `http://auth-service:3001`).
    pub auth_service_url: String,
    /// Timeout for one validate call in milliseconds (default: `5000`).
    pub validate_timeout_ms: u64,
}

impl GatewayConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                    |
    /// |----------------------------|----------------------------|
    /// | `AUTH_SERVICE_URL`         | `http://auth-service:3001` |
    /// | `AUTH_VALIDATE_TIMEOUT_MS` | `5000`                     |
    pub fn from_env() -> Self {
        let auth_service_url = std::env::var("AUTH_SERVICE_URL")
            .unwrap_or_else(|_| "http://auth-service:3001".into())
            .trim_end_matches('/')
            .to_string();

        let validate_timeout_ms: u64 = std::env::var("AUTH_VALIDATE_TIMEOUT_MS")
            .unwrap_or_else(|_| "5000".into())
            .parse()
            .expect("AUTH_VALIDATE_TIMEOUT_MS must be a valid u64");

        Self {
            auth_service_url,
            validate_timeout_ms,
        }
    }
}
