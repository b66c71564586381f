//! Database models for the Subgate daemon.

use serde::{Deserialize, Serialize};

/// Client record from the database.
///
/// Pairs local bookkeeping with the identifiers of the remote panel account
/// (`remote_id`, `short_id`, `subscription_url`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: String,
    pub username: String,
    pub remote_id: String,
    pub short_id: String,
    pub subscription_url: String,
    pub status: String,
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Client {
    /// Whether the subscription expiry lies strictly in the past.
    /// A client without an expiry never expires.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }
}

/// Operation record from the append-only audit log.
///
/// `client_id` is a soft reference: the record outlives the client row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Operation {
    pub id: String,
    pub client_id: String,
    pub action: String,
    pub payload: Option<String>,
    pub result: String,
    pub error: Option<String>,
    pub created_at: i64,
}

/// Client status enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Active,
    Blocked,
}

impl ClientStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audited action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Create,
    Extend,
    Block,
    Unblock,
    Delete,
    RotateConfig,
    Deactivate,
}

impl ActionType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Extend => "extend",
            Self::Block => "block",
            Self::Unblock => "unblock",
            Self::Delete => "delete",
            Self::RotateConfig => "rotate_config",
            Self::Deactivate => "deactivate",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome recorded for an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
    Success,
    Fail,
}

impl OperationResult {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Fail => "fail",
        }
    }
}

impl std::fmt::Display for OperationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_serde() {
        let s: ClientStatus = serde_json::from_str("\"blocked\"").unwrap();
        assert_eq!(s, ClientStatus::Blocked);
        assert_eq!(serde_json::to_string(&ClientStatus::Active).unwrap(), "\"active\"");
    }

    #[test]
    fn expiry_check_handles_null() {
        let mut client = Client {
            id: "c1".into(),
            username: "alice".into(),
            remote_id: "r1".into(),
            short_id: "s1".into(),
            subscription_url: "https://panel/sub/s1".into(),
            status: "active".into(),
            expires_at: None,
            created_at: 0,
            updated_at: 0,
        };
        assert!(!client.is_expired(1_000));

        client.expires_at = Some(999);
        assert!(client.is_expired(1_000));

        client.expires_at = Some(1_000);
        assert!(!client.is_expired(1_000));
    }
}
