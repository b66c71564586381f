//! Request handlers and wire schemas.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::lifecycle::{ClientConfig, CreateOpts, LifecycleError, ListFilter};
use crate::storage::{Client, ClientStatus, Operation};

use super::AppState;

// =============================================================================
// Schemas
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateClientRequest {
    pub username: String,
    #[serde(default)]
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub days: u32,
}

#[derive(Debug, Deserialize)]
pub struct ListClientsParams {
    #[serde(default)]
    pub status: Option<ClientStatus>,
    #[serde(default)]
    pub expired: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ListOperationsParams {
    pub client_id: Uuid,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ClientListResponse {
    pub items: Vec<Client>,
    pub total: usize,
}

/// Operation record with the payload column parsed back into JSON.
#[derive(Debug, Serialize)]
pub struct OperationView {
    pub id: String,
    pub client_id: String,
    pub action: String,
    pub payload: Option<Value>,
    pub result: String,
    pub error: Option<String>,
    pub created_at: i64,
}

impl From<Operation> for OperationView {
    fn from(op: Operation) -> Self {
        let payload = op
            .payload
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        Self {
            id: op.id,
            client_id: op.client_id,
            action: op.action,
            payload,
            result: op.result,
            error: op.error,
            created_at: op.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OperationListResponse {
    pub items: Vec<OperationView>,
    pub total: i64,
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn health() -> Json<Value> {
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn create_client(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), LifecycleError> {
    let client = state
        .coordinator
        .create(&body.username, CreateOpts { days: body.days })
        .await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn list_clients(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListClientsParams>,
) -> Result<Json<ClientListResponse>, LifecycleError> {
    let items = state
        .coordinator
        .list(ListFilter {
            status: params.status,
            expired: params.expired,
        })
        .await?;
    let total = items.len();
    Ok(Json(ClientListResponse { items, total }))
}

pub async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, LifecycleError> {
    Ok(Json(state.coordinator.get(id).await?))
}

pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, LifecycleError> {
    state.coordinator.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn extend_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ExtendRequest>,
) -> Result<Json<Client>, LifecycleError> {
    Ok(Json(state.coordinator.extend(id, body.days).await?))
}

pub async fn block_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, LifecycleError> {
    Ok(Json(state.coordinator.block(id).await?))
}

pub async fn unblock_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, LifecycleError> {
    Ok(Json(state.coordinator.unblock(id).await?))
}

pub async fn get_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ClientConfig>, LifecycleError> {
    Ok(Json(state.coordinator.get_config(id).await?))
}

pub async fn rotate_config(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Client>, LifecycleError> {
    Ok(Json(state.coordinator.rotate_config(id).await?))
}

pub async fn list_operations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListOperationsParams>,
) -> Result<Json<OperationListResponse>, LifecycleError> {
    let limit = params.limit.unwrap_or(50).min(500);
    let offset = params.offset.unwrap_or(0);
    let (items, total) = state
        .coordinator
        .operations(params.client_id, limit, offset)
        .await?;
    Ok(Json(OperationListResponse {
        items: items.into_iter().map(OperationView::from).collect(),
        total,
    }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn operation_view_parses_payload_json() {
        let op = Operation {
            id: "op-1".into(),
            client_id: "c-1".into(),
            action: "extend".into(),
            payload: Some(r#"{"days":30}"#.into()),
            result: "success".into(),
            error: None,
            created_at: 100,
        };
        let view = OperationView::from(op);
        assert_eq!(view.payload.unwrap()["days"], 30);
    }

    #[test]
    fn operation_view_tolerates_missing_payload() {
        let op = Operation {
            id: "op-2".into(),
            client_id: "c-1".into(),
            action: "delete".into(),
            payload: None,
            result: "success".into(),
            error: None,
            created_at: 100,
        };
        let view = OperationView::from(op);
        assert!(view.payload.is_none());
    }
}
