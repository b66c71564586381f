//! Panel REST API wire types.
//!
//! Serialization structs matching the panel's user and subscription
//! endpoints.

use serde::{Deserialize, Serialize};

/// Panel user as returned by the user endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct PanelUser {
    pub uuid: String,
    pub username: String,
    pub short_uuid: String,
    pub subscription_url: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Request body for account provisioning.
#[derive(Debug, Serialize)]
pub struct CreateUserBody<'a> {
    pub username: &'a str,
    pub status: &'a str,
}
