use serde::{Deserialize, Serialize};

/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Connection metadata recorded on a session at login and refreshed on rotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Overlay `self` on top of `previous`, keeping the old value wherever the
    /// new request did not report one.
    pub fn or(&self, previous: &ClientInfo) -> ClientInfo {
        ClientInfo {
            ip_address: self
                .ip_address
                .clone()
                .or_else(|| previous.ip_address.clone()),
            user_agent: self
                .user_agent
                .clone()
                .or_else(|| previous.user_agent.clone()),
        }
    }
}
