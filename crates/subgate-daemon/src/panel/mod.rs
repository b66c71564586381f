//! Remote VPN panel integration.
//!
//! The coordinator consumes the panel through the [`PanelAdapter`] trait so
//! the production REST client can be swapped for a test double. Every
//! implementation must translate remote failures into [`PanelError`] so
//! callers never see panel-specific error shapes.

mod client;
pub mod types;


use async_trait::async_trait;
use thiserror::Error;

pub use client::{PanelClient, PanelConfig, PanelConfigError};

/// Uniform error taxonomy for remote panel calls.
#[derive(Debug, Error)]
pub enum PanelError {
    /// Network failure, timeout, or a 5xx from the panel. Safe to retry.
    #[error("transient panel failure: {0}")]
    Transient(String),

    /// The panel rejected our credential. Not retryable.
    #[error("panel authentication failed: {0}")]
    Auth(String),

    /// The panel does not know the account or subscription we referenced.
    #[error("panel resource not found: {0}")]
    NotFound(String),

    /// The panel rejected the request shape.
    #[error("panel rejected the request: {0}")]
    Validation(String),
}

impl From<reqwest::Error> for PanelError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

/// Identifiers returned by a successful account provisioning call.
#[derive(Debug, Clone)]
pub struct PanelAccount {
    pub remote_id: String,
    pub short_id: String,
    pub subscription_url: String,
}

/// Fresh subscription identifiers returned by a revoke-and-reissue call.
#[derive(Debug, Clone)]
pub struct PanelSubscription {
    pub short_id: String,
    pub subscription_url: String,
}

/// Capability set the lifecycle coordinator needs from the remote panel.
///
/// Every call is a network operation bounded by the implementation's request
/// timeout; a timeout surfaces as [`PanelError::Transient`].
#[async_trait]
pub trait PanelAdapter: Send + Sync {
    /// Provision a remote account for `username`.
    async fn create_account(&self, username: &str) -> Result<PanelAccount, PanelError>;

    /// Revoke a remote account. Not reversible.
    async fn delete_account(&self, remote_id: &str) -> Result<(), PanelError>;

    /// Enable or disable VPN access for a remote account.
    async fn set_blocked(&self, remote_id: &str, blocked: bool) -> Result<(), PanelError>;

    /// Fetch the base64-encoded subscription payload for a short id.
    async fn fetch_subscription(&self, short_id: &str) -> Result<String, PanelError>;

    /// Revoke the current subscription and issue a new short id + URL.
    /// The previous subscription stops resolving as soon as this succeeds.
    async fn reissue_subscription(&self, remote_id: &str)
    -> Result<PanelSubscription, PanelError>;
}
