/// Why the gateway could not get a verdict from the auth service.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Network failure, timeout, or an undecodable body.
    #[error("Auth service request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The auth service answered with something other than 200 or 401.
    #[error("Auth service returned HTTP {0}")]
    UnexpectedStatus(u16),
}
