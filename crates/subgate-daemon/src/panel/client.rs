//! REST client for the remote VPN panel.
//!
//! Uses reqwest to call the panel's user and subscription endpoints, with a
//! bounded request timeout and status-code translation into [`PanelError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use super::types::{CreateUserBody, PanelUser};
use super::{PanelAccount, PanelAdapter, PanelError, PanelSubscription};

/// Configuration for connecting to a panel instance.
#[derive(Debug, Clone)]
pub struct PanelConfig {
    /// Panel base URL (e.g., "<https://panel.example.com>").
    pub base_url: String,
    /// API token with user-management permissions.
    pub token: String,
    /// Upper bound for any single panel request; a timeout surfaces as
    /// [`PanelError::Transient`].
    pub timeout: Duration,
}

impl PanelConfig {
    /// Config with the default 30-second request timeout.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Error constructing a [`PanelClient`] from an invalid configuration.
#[derive(Debug, thiserror::Error)]
#[error("panel configuration error: {0}")]
pub struct PanelConfigError(String);

/// Panel REST API client.
#[derive(Debug)]
pub struct PanelClient {
    http: reqwest::Client,
    base_url: String,
}

impl PanelClient {
    /// Create a new panel API client.
    pub fn new(config: &PanelConfig) -> Result<Self, PanelConfigError> {
        if config.base_url.is_empty() {
            return Err(PanelConfigError("base_url is empty".into()));
        }
        if config.token.is_empty() {
            return Err(PanelConfigError("token is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let token_val = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| PanelConfigError("Invalid token format".into()))?;
        headers.insert(AUTHORIZATION, token_val);

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed -- safe to ignore.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| PanelConfigError(e.to_string()))?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { http, base_url })
    }

    /// Build the panel API URL for a given path.
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// Translate a non-success HTTP status into the uniform error taxonomy.
    pub(crate) fn translate_status(status: StatusCode) -> Option<PanelError> {
        if status.is_success() {
            return None;
        }
        let message = format!(
            "{} {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown")
        );
        Some(match status.as_u16() {
            401 | 403 => PanelError::Auth(message),
            404 => PanelError::NotFound(message),
            400 | 409 | 422 => PanelError::Validation(message),
            _ => PanelError::Transient(message),
        })
    }

    /// Check HTTP response status, returning the translated error for
    /// non-success codes.
    fn check_status(resp: &reqwest::Response) -> Result<(), PanelError> {
        match Self::translate_status(resp.status()) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PanelAdapter for PanelClient {
    async fn create_account(&self, username: &str) -> Result<PanelAccount, PanelError> {
        let url = self.api_url("/users");
        let body = CreateUserBody {
            username,
            status: "ACTIVE",
        };
        let resp = self.http.post(&url).json(&body).send().await?;
        Self::check_status(&resp)?;
        let user: PanelUser = resp.json().await?;
        Ok(PanelAccount {
            remote_id: user.uuid,
            short_id: user.short_uuid,
            subscription_url: user.subscription_url,
        })
    }

    async fn delete_account(&self, remote_id: &str) -> Result<(), PanelError> {
        let url = self.api_url(&format!("/users/{remote_id}"));
        let resp = self.http.delete(&url).send().await?;
        Self::check_status(&resp)
    }

    async fn set_blocked(&self, remote_id: &str, blocked: bool) -> Result<(), PanelError> {
        let action = if blocked { "disable" } else { "enable" };
        let url = self.api_url(&format!("/users/{remote_id}/actions/{action}"));
        let resp = self.http.post(&url).send().await?;
        Self::check_status(&resp)
    }

    async fn fetch_subscription(&self, short_id: &str) -> Result<String, PanelError> {
        let url = self.api_url(&format!("/sub/{short_id}"));
        let resp = self.http.get(&url).send().await?;
        Self::check_status(&resp)?;
        let raw = resp.bytes().await?;
        Ok(subgate_core::db::base64_encode(&raw))
    }

    async fn reissue_subscription(
        &self,
        remote_id: &str,
    ) -> Result<PanelSubscription, PanelError> {
        let url = self.api_url(&format!("/users/{remote_id}/actions/revoke"));
        let resp = self.http.post(&url).send().await?;
        Self::check_status(&resp)?;
        let user: PanelUser = resp.json().await?;
        Ok(PanelSubscription {
            short_id: user.short_uuid,
            subscription_url: user.subscription_url,
        })
    }
}
