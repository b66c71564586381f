//! The lifecycle coordinator.
//!
//! Every mutating operation follows the same discipline:
//!
//! 1. acquire the per-key lock, read and validate local state;
//! 2. issue the remote panel call when a remote effect is required;
//! 3. apply the local store write;
//! 4. append exactly one audit record whose result reflects the true
//!    outcome, whichever step failed.
//!
//! Remote calls come before local writes for `create`, `delete`, and
//! `rotate_config`: a local row must never claim an access state the remote
//! side does not have. The price is an orphan window when the local write
//! fails after the remote call succeeded; those failures are logged at
//! error level and tagged in the audit payload so operators can reconcile.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};
use uuid::Uuid;

use subgate_core::db::unix_timestamp;

use crate::panel::{PanelAdapter, PanelError};
use crate::storage::{
    ActionType, Client, ClientStatus, Database, DatabaseError, NewClient, Operation,
    OperationResult,
};

use super::error::LifecycleError;
use super::locks::KeyedLocks;

const SECS_PER_DAY: i64 = 86_400;

/// Options for [`Coordinator::create`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOpts {
    /// Initial subscription length in days. `None` leaves the client
    /// without an expiry.
    pub days: Option<u32>,
}

/// Filter for [`Coordinator::list`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ListFilter {
    pub status: Option<ClientStatus>,
    /// `Some(true)` selects clients whose expiry lies in the past.
    pub expired: Option<bool>,
}

/// Connection configuration for one client, as served to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub short_id: String,
    pub subscription_url: String,
    /// base64-encoded subscription payload fetched from the panel.
    pub config_data: String,
}

/// Sequences remote-panel and local-store mutations for client lifecycle
/// operations.
pub struct Coordinator {
    db: Database,
    panel: Arc<dyn PanelAdapter>,
    locks: KeyedLocks,
}

impl Coordinator {
    pub fn new(db: Database, panel: Arc<dyn PanelAdapter>) -> Self {
        Self {
            db,
            panel,
            locks: KeyedLocks::new(),
        }
    }

    // =========================================================================
    // Reads (no audit entries)
    // =========================================================================

    /// Get a client by id.
    pub async fn get(&self, id: Uuid) -> Result<Client, LifecycleError> {
        Ok(self.db.get_client(&id.to_string()).await?)
    }

    /// List clients in stable creation order.
    pub async fn list(&self, filter: ListFilter) -> Result<Vec<Client>, LifecycleError> {
        Ok(self.db.list_clients(filter.status, filter.expired).await?)
    }

    /// Fetch the client's connection configuration from the panel.
    ///
    /// Pure read: no local mutation and no audit entry.
    pub async fn get_config(&self, id: Uuid) -> Result<ClientConfig, LifecycleError> {
        let client = self.db.get_client(&id.to_string()).await?;
        let config_data = self
            .panel
            .fetch_subscription(&client.short_id)
            .await
            .map_err(LifecycleError::from)?;

        Ok(ClientConfig {
            client_id: client.id,
            short_id: client.short_id,
            subscription_url: client.subscription_url,
            config_data,
        })
    }

    /// Audit history for a client, newest first. The history survives
    /// deletion of the client itself.
    pub async fn operations(
        &self,
        client_id: Uuid,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Operation>, i64), LifecycleError> {
        let key = client_id.to_string();
        let items = self.db.list_operations(&key, limit, offset).await?;
        let total = self.db.count_operations(&key).await?;
        Ok((items, total))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Create a client: uniqueness check, remote provisioning, local insert.
    ///
    /// No local row is ever written unless the remote provisioning call
    /// succeeded first.
    pub async fn create(
        &self,
        username: &str,
        opts: CreateOpts,
    ) -> Result<Client, LifecycleError> {
        // Keyed by username: two concurrent creates of the same name must
        // not both pass the uniqueness check.
        let _guard = self.locks.acquire(&format!("username:{username}")).await;

        // The id is fixed up front so failed attempts are auditable even
        // though no client row ever materializes for them.
        let id = Uuid::new_v4().to_string();
        let payload = json!({"username": username, "days": opts.days});

        let existing = match self.db.get_client_by_username(username).await {
            Ok(existing) => existing,
            Err(e) => {
                let err = LifecycleError::from(e);
                self.audit(&id, ActionType::Create, Some(payload), OperationResult::Fail, Some(&err))
                    .await;
                return Err(err);
            }
        };
        if existing.is_some() {
            let err = LifecycleError::DuplicateUsername(username.to_string());
            self.audit(&id, ActionType::Create, Some(payload), OperationResult::Fail, Some(&err))
                .await;
            return Err(err);
        }

        let account = match self.panel.create_account(username).await {
            Ok(account) => account,
            Err(e) => {
                let err = LifecycleError::from(e);
                self.audit(&id, ActionType::Create, Some(payload), OperationResult::Fail, Some(&err))
                    .await;
                return Err(err);
            }
        };

        let expires_at = opts
            .days
            .map(|days| unix_timestamp() + i64::from(days) * SECS_PER_DAY);
        let inserted = self
            .db
            .create_client(&NewClient {
                id: &id,
                username,
                remote_id: &account.remote_id,
                short_id: &account.short_id,
                subscription_url: &account.subscription_url,
                expires_at,
            })
            .await;

        match inserted {
            Ok(client) => {
                self.audit(&client.id, ActionType::Create, Some(payload), OperationResult::Success, None)
                    .await;
                info!(client_id = %client.id, username, "Client created");
                Ok(client)
            }
            Err(e) => {
                // Remote account exists with no local row. Not rolled back;
                // surfaced for manual reconciliation.
                error!(
                    client_id = %id,
                    username,
                    remote_id = %account.remote_id,
                    error = %e,
                    "Remote account provisioned but local insert failed; manual reconciliation required"
                );
                let err = LifecycleError::LocalPersistence(e.to_string());
                let payload = json!({"username": username, "days": opts.days, "orphan": true});
                self.audit(&id, ActionType::Create, Some(payload), OperationResult::Fail, Some(&err))
                    .await;
                Err(err)
            }
        }
    }

    /// Extend the subscription by `days`, counted from the current expiry
    /// or from now, whichever is later.
    ///
    /// Not idempotent by design: repeated calls accumulate days.
    pub async fn extend(&self, id: Uuid, days: u32) -> Result<Client, LifecycleError> {
        let key = id.to_string();
        let _guard = self.locks.acquire(&format!("client:{key}")).await;

        let client = match self.db.get_client(&key).await {
            Ok(client) => client,
            Err(e) => {
                let err = LifecycleError::from(e);
                self.audit(
                    &key,
                    ActionType::Extend,
                    Some(json!({"days": days})),
                    OperationResult::Fail,
                    Some(&err),
                )
                .await;
                return Err(err);
            }
        };

        let now = unix_timestamp();
        let base = client.expires_at.map_or(now, |at| at.max(now));
        let new_expires_at = base + i64::from(days) * SECS_PER_DAY;

        match self.db.update_client_expiry(&key, Some(new_expires_at)).await {
            Ok(updated) => {
                self.audit(
                    &key,
                    ActionType::Extend,
                    Some(json!({"days": days, "new_expires_at": new_expires_at})),
                    OperationResult::Success,
                    None,
                )
                .await;
                Ok(updated)
            }
            Err(e) => {
                let err = LifecycleError::from(e);
                self.audit(
                    &key,
                    ActionType::Extend,
                    Some(json!({"days": days})),
                    OperationResult::Fail,
                    Some(&err),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Block the client, revoking VPN access remotely. Idempotent: an
    /// already-blocked client is audited as a no-op with zero panel calls.
    pub async fn block(&self, id: Uuid) -> Result<Client, LifecycleError> {
        self.transition(id, ClientStatus::Blocked, ActionType::Block).await
    }

    /// Unblock the client, restoring VPN access remotely. Idempotent.
    pub async fn unblock(&self, id: Uuid) -> Result<Client, LifecycleError> {
        self.transition(id, ClientStatus::Active, ActionType::Unblock).await
    }

    async fn transition(
        &self,
        id: Uuid,
        target: ClientStatus,
        action: ActionType,
    ) -> Result<Client, LifecycleError> {
        let key = id.to_string();
        let _guard = self.locks.acquire(&format!("client:{key}")).await;

        let client = match self.db.get_client(&key).await {
            Ok(client) => client,
            Err(e) => {
                let err = LifecycleError::from(e);
                self.audit(&key, action, None, OperationResult::Fail, Some(&err)).await;
                return Err(err);
            }
        };

        let (client, _changed) = self.apply_block_state(&client, target, action, None).await?;
        Ok(client)
    }

    /// Drive a client's access state to `target`, remote first.
    ///
    /// Returns the (possibly updated) client and whether a real transition
    /// happened. Caller holds the client lock.
    async fn apply_block_state(
        &self,
        client: &Client,
        target: ClientStatus,
        action: ActionType,
        payload: Option<Value>,
    ) -> Result<(Client, bool), LifecycleError> {
        if client.status == target.as_str() {
            // Idempotent short-circuit: no panel call, but the invocation is
            // still audited.
            let noop_payload = match &payload {
                Some(Value::Object(map)) => {
                    let mut map = map.clone();
                    map.insert("noop".into(), Value::Bool(true));
                    Value::Object(map)
                }
                _ => json!({"noop": true}),
            };
            self.audit(&client.id, action, Some(noop_payload), OperationResult::Success, None)
                .await;
            return Ok((client.clone(), false));
        }

        let blocked = target == ClientStatus::Blocked;
        if let Err(e) = self.panel.set_blocked(&client.remote_id, blocked).await {
            let err = LifecycleError::from(e);
            self.audit(&client.id, action, payload, OperationResult::Fail, Some(&err))
                .await;
            return Err(err);
        }

        match self.db.update_client_status(&client.id, target).await {
            Ok(updated) => {
                self.audit(&client.id, action, payload, OperationResult::Success, None)
                    .await;
                info!(client_id = %client.id, status = %target, "Client access state changed");
                Ok((updated, true))
            }
            Err(e) => {
                error!(
                    client_id = %client.id,
                    remote_id = %client.remote_id,
                    error = %e,
                    "Remote access state changed but local status update failed; manual reconciliation required"
                );
                let err = LifecycleError::LocalPersistence(e.to_string());
                self.audit(
                    &client.id,
                    action,
                    Some(json!({"orphan": true})),
                    OperationResult::Fail,
                    Some(&err),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Delete a client: remote revocation first, local removal second.
    ///
    /// A remote failure aborts with nothing changed locally. A local
    /// failure after successful revocation leaves an orphan row; revocation
    /// wins over bookkeeping, so no rollback is attempted.
    pub async fn delete(&self, id: Uuid) -> Result<(), LifecycleError> {
        let key = id.to_string();
        let _guard = self.locks.acquire(&format!("client:{key}")).await;

        let client = match self.db.get_client(&key).await {
            Ok(client) => client,
            Err(e) => {
                let err = LifecycleError::from(e);
                self.audit(&key, ActionType::Delete, None, OperationResult::Fail, Some(&err))
                    .await;
                return Err(err);
            }
        };

        match self.panel.delete_account(&client.remote_id).await {
            Ok(()) => {}
            Err(PanelError::NotFound(msg)) => {
                // Drift: the remote side already lost the account. Removing
                // the local row reconciles the two systems.
                warn!(
                    client_id = %client.id,
                    remote_id = %client.remote_id,
                    "Remote account already gone ({msg}); removing local record"
                );
            }
            Err(e) => {
                let err = LifecycleError::from(e);
                self.audit(&client.id, ActionType::Delete, None, OperationResult::Fail, Some(&err))
                    .await;
                return Err(err);
            }
        }

        match self.db.delete_client(&client.id).await {
            Ok(_) => {
                self.audit(&client.id, ActionType::Delete, None, OperationResult::Success, None)
                    .await;
                info!(client_id = %client.id, username = %client.username, "Client deleted");
                Ok(())
            }
            Err(e) => {
                error!(
                    client_id = %client.id,
                    remote_id = %client.remote_id,
                    error = %e,
                    "Remote account revoked but local row removal failed; manual reconciliation required"
                );
                let err = LifecycleError::LocalPersistence(e.to_string());
                self.audit(
                    &client.id,
                    ActionType::Delete,
                    Some(json!({"orphan": true})),
                    OperationResult::Fail,
                    Some(&err),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Revoke the current subscription and persist the reissued identifiers.
    ///
    /// The old subscription URL stops working the moment the remote call
    /// succeeds, so a local persist failure here is an orphan window with
    /// the same policy as `delete`.
    pub async fn rotate_config(&self, id: Uuid) -> Result<Client, LifecycleError> {
        let key = id.to_string();
        let _guard = self.locks.acquire(&format!("client:{key}")).await;

        let client = match self.db.get_client(&key).await {
            Ok(client) => client,
            Err(e) => {
                let err = LifecycleError::from(e);
                self.audit(&key, ActionType::RotateConfig, None, OperationResult::Fail, Some(&err))
                    .await;
                return Err(err);
            }
        };

        let sub = match self.panel.reissue_subscription(&client.remote_id).await {
            Ok(sub) => sub,
            Err(e) => {
                let err = LifecycleError::from(e);
                self.audit(&client.id, ActionType::RotateConfig, None, OperationResult::Fail, Some(&err))
                    .await;
                return Err(err);
            }
        };

        match self
            .db
            .update_client_subscription(&client.id, &sub.short_id, &sub.subscription_url)
            .await
        {
            Ok(updated) => {
                self.audit(
                    &client.id,
                    ActionType::RotateConfig,
                    Some(json!({"new_short_id": sub.short_id})),
                    OperationResult::Success,
                    None,
                )
                .await;
                info!(client_id = %client.id, "Subscription rotated");
                Ok(updated)
            }
            Err(e) => {
                error!(
                    client_id = %client.id,
                    remote_id = %client.remote_id,
                    error = %e,
                    "Subscription reissued remotely but local persist failed; stored identifiers are already revoked"
                );
                let err = LifecycleError::LocalPersistence(e.to_string());
                self.audit(
                    &client.id,
                    ActionType::RotateConfig,
                    Some(json!({"orphan": true})),
                    OperationResult::Fail,
                    Some(&err),
                )
                .await;
                Err(err)
            }
        }
    }

    /// Block every active client whose expiry lies in the past.
    ///
    /// Each client is processed independently: one failure is logged and
    /// does not abort the batch. Returns the number of clients actually
    /// blocked. Safe to run repeatedly and concurrently with per-client
    /// operations; a client extended mid-sweep is re-checked under its lock
    /// and skipped.
    pub async fn deactivate_expired(&self) -> Result<usize, LifecycleError> {
        let now = unix_timestamp();
        let candidates = self.db.list_expired_active(now).await?;
        let mut deactivated = 0;

        for candidate in candidates {
            let _guard = self.locks.acquire(&format!("client:{}", candidate.id)).await;

            // Selection ran outside the lock; re-read before acting.
            let client = match self.db.get_client(&candidate.id).await {
                Ok(client) => client,
                Err(DatabaseError::NotFound(_)) => continue,
                Err(e) => {
                    warn!(client_id = %candidate.id, error = %e, "Skipping client in expiry sweep");
                    continue;
                }
            };
            if !client.is_expired(now) {
                continue;
            }

            let payload = client.expires_at.map(|at| json!({"expired_at": at}));
            match self
                .apply_block_state(&client, ClientStatus::Blocked, ActionType::Deactivate, payload)
                .await
            {
                Ok((_, changed)) => {
                    if changed {
                        deactivated += 1;
                    }
                }
                Err(e) => {
                    warn!(client_id = %client.id, error = %e, "Failed to deactivate expired client");
                }
            }
        }

        Ok(deactivated)
    }

    /// Append one audit record; a failed append is logged as an
    /// audit-integrity incident and never alters the operation's outcome.
    async fn audit(
        &self,
        client_id: &str,
        action: ActionType,
        payload: Option<Value>,
        result: OperationResult,
        error: Option<&LifecycleError>,
    ) {
        let detail = error.map(ToString::to_string);
        if let Err(e) = self
            .db
            .append_operation(client_id, action, payload.as_ref(), result, detail.as_deref())
            .await
        {
            error!(
                client_id,
                action = %action,
                error = %e,
                "Audit append failed; operation outcome reported unchanged"
            );
        }
    }
}
