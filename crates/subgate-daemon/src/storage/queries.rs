//! Database queries for the Subgate daemon.

use subgate_core::db::unix_timestamp;
use uuid::Uuid;

use super::db::{Database, DatabaseError};
use super::models::{ActionType, Client, ClientStatus, Operation, OperationResult};

/// Column values for a new client row.
///
/// The remote identifiers come from a panel provisioning call that has
/// already succeeded by the time this struct is built.
#[derive(Debug)]
pub struct NewClient<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub remote_id: &'a str,
    pub short_id: &'a str,
    pub subscription_url: &'a str,
    pub expires_at: Option<i64>,
}

impl Database {
    // =========================================================================
    // Client queries
    // =========================================================================

    /// Insert a new client row with status `active`.
    pub async fn create_client(&self, params: &NewClient<'_>) -> Result<Client, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            r"
            INSERT INTO clients
                (id, username, remote_id, short_id, subscription_url, status, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(params.id)
        .bind(params.username)
        .bind(params.remote_id)
        .bind(params.short_id)
        .bind(params.subscription_url)
        .bind(ClientStatus::Active.as_str())
        .bind(params.expires_at)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_client(params.id).await
    }

    /// Get a client by ID.
    pub async fn get_client(&self, id: &str) -> Result<Client, DatabaseError> {
        sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Client {id}")))
    }

    /// Look up a client by username.
    pub async fn get_client_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Client>, DatabaseError> {
        let client = sqlx::query_as::<_, Client>("SELECT * FROM clients WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool())
            .await?;

        Ok(client)
    }

    /// List clients in stable creation order, optionally filtered by status
    /// and/or by whether the subscription expiry lies in the past.
    ///
    /// A client without an expiry is never considered expired.
    pub async fn list_clients(
        &self,
        status: Option<ClientStatus>,
        expired: Option<bool>,
    ) -> Result<Vec<Client>, DatabaseError> {
        let now = unix_timestamp();

        let mut sql = String::from("SELECT * FROM clients");
        let mut clauses: Vec<&str> = Vec::new();
        if status.is_some() {
            clauses.push("status = ?");
        }
        match expired {
            Some(true) => clauses.push("expires_at IS NOT NULL AND expires_at < ?"),
            Some(false) => clauses.push("(expires_at IS NULL OR expires_at >= ?)"),
            None => {}
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        // rowid breaks ties within one second, preserving insertion order.
        sql.push_str(" ORDER BY created_at, rowid");

        let mut query = sqlx::query_as::<_, Client>(&sql);
        if let Some(s) = status {
            query = query.bind(s.as_str());
        }
        if expired.is_some() {
            query = query.bind(now);
        }

        Ok(query.fetch_all(self.pool()).await?)
    }

    /// Active clients whose expiry lies strictly before `now`.
    ///
    /// Used by the expiry monitor; already-blocked clients are excluded so
    /// repeated sweeps converge without extra work.
    pub async fn list_expired_active(&self, now: i64) -> Result<Vec<Client>, DatabaseError> {
        let clients = sqlx::query_as::<_, Client>(
            "SELECT * FROM clients \
             WHERE status = ? AND expires_at IS NOT NULL AND expires_at < ? \
             ORDER BY created_at, rowid",
        )
        .bind(ClientStatus::Active.as_str())
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        Ok(clients)
    }

    /// Update a client's status.
    pub async fn update_client_status(
        &self,
        id: &str,
        status: ClientStatus,
    ) -> Result<Client, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query("UPDATE clients SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Client {id}")));
        }

        self.get_client(id).await
    }

    /// Update a client's subscription expiry.
    pub async fn update_client_expiry(
        &self,
        id: &str,
        expires_at: Option<i64>,
    ) -> Result<Client, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query("UPDATE clients SET expires_at = ?, updated_at = ? WHERE id = ?")
            .bind(expires_at)
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Client {id}")));
        }

        self.get_client(id).await
    }

    /// Replace a client's subscription identifiers after a rotation.
    pub async fn update_client_subscription(
        &self,
        id: &str,
        short_id: &str,
        subscription_url: &str,
    ) -> Result<Client, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "UPDATE clients SET short_id = ?, subscription_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(short_id)
        .bind(subscription_url)
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!("Client {id}")));
        }

        self.get_client(id).await
    }

    /// Remove a client row. Returns `false` when the row was already gone.
    ///
    /// Operation records referencing the client are left untouched.
    pub async fn delete_client(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Operation audit log (append + read only)
    // =========================================================================

    /// Append an operation record to the audit log.
    pub async fn append_operation(
        &self,
        client_id: &str,
        action: ActionType,
        payload: Option<&serde_json::Value>,
        result: OperationResult,
        error: Option<&str>,
    ) -> Result<Operation, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = unix_timestamp();
        let payload_text = payload.map(serde_json::Value::to_string);

        sqlx::query(
            r"
            INSERT INTO operations (id, client_id, action, payload, result, error, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&id)
        .bind(client_id)
        .bind(action.as_str())
        .bind(payload_text)
        .bind(result.as_str())
        .bind(error)
        .bind(now)
        .execute(self.pool())
        .await?;

        sqlx::query_as::<_, Operation>("SELECT * FROM operations WHERE id = ?")
            .bind(&id)
            .fetch_one(self.pool())
            .await
            .map_err(Into::into)
    }

    /// Operations for a client, newest first.
    pub async fn list_operations(
        &self,
        client_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Operation>, DatabaseError> {
        let operations = sqlx::query_as::<_, Operation>(
            "SELECT * FROM operations WHERE client_id = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
        )
        .bind(client_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?;

        Ok(operations)
    }

    /// Total operation count for a client.
    pub async fn count_operations(&self, client_id: &str) -> Result<i64, DatabaseError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM operations WHERE client_id = ?")
            .bind(client_id)
            .fetch_one(self.pool())
            .await?;

        Ok(count.0)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    async fn db_with_client(username: &str) -> (Database, Client) {
        let db = Database::open_in_memory().await.unwrap();
        let id = Uuid::new_v4().to_string();
        let client = db
            .create_client(&NewClient {
                id: &id,
                username,
                remote_id: "r-1",
                short_id: "s-1",
                subscription_url: "https://panel/sub/s-1",
                expires_at: None,
            })
            .await
            .unwrap();
        (db, client)
    }

    #[tokio::test]
    async fn create_and_get_client() {
        let (db, client) = db_with_client("alice").await;
        assert_eq!(client.username, "alice");
        assert_eq!(client.status, "active");
        assert_eq!(client.expires_at, None);

        let fetched = db.get_client(&client.id).await.unwrap();
        assert_eq!(fetched.remote_id, "r-1");
    }

    #[tokio::test]
    async fn get_unknown_client_is_not_found() {
        let db = Database::open_in_memory().await.unwrap();
        let err = db.get_client("missing").await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn username_is_unique() {
        let (db, _client) = db_with_client("alice").await;
        let err = db
            .create_client(&NewClient {
                id: &Uuid::new_v4().to_string(),
                username: "alice",
                remote_id: "r-2",
                short_id: "s-2",
                subscription_url: "https://panel/sub/s-2",
                expires_at: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::Query(_)));

        let found = db.get_client_by_username("alice").await.unwrap();
        assert_eq!(found.unwrap().remote_id, "r-1");
    }

    #[tokio::test]
    async fn list_filters_by_status_and_expiry() {
        let (db, active) = db_with_client("active-user").await;

        let blocked_id = Uuid::new_v4().to_string();
        db.create_client(&NewClient {
            id: &blocked_id,
            username: "blocked-user",
            remote_id: "r-2",
            short_id: "s-2",
            subscription_url: "https://panel/sub/s-2",
            expires_at: Some(unix_timestamp() - 60),
        })
        .await
        .unwrap();
        db.update_client_status(&blocked_id, ClientStatus::Blocked)
            .await
            .unwrap();

        let all = db.list_clients(None, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let actives = db.list_clients(Some(ClientStatus::Active), None).await.unwrap();
        assert_eq!(actives.len(), 1);
        assert_eq!(actives[0].id, active.id);

        let expired = db.list_clients(None, Some(true)).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, blocked_id);

        // NULL expiry counts as not expired.
        let current = db.list_clients(None, Some(false)).await.unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, active.id);
    }

    #[tokio::test]
    async fn expired_active_excludes_blocked_and_future() {
        let db = Database::open_in_memory().await.unwrap();
        let now = unix_timestamp();

        for (name, expires_at, blocked) in [
            ("expired", Some(now - 10), false),
            ("future", Some(now + 3600), false),
            ("expired-blocked", Some(now - 10), true),
            ("no-expiry", None, false),
        ] {
            let id = Uuid::new_v4().to_string();
            db.create_client(&NewClient {
                id: &id,
                username: name,
                remote_id: name,
                short_id: name,
                subscription_url: "https://panel/sub",
                expires_at,
            })
            .await
            .unwrap();
            if blocked {
                db.update_client_status(&id, ClientStatus::Blocked).await.unwrap();
            }
        }

        let expired = db.list_expired_active(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].username, "expired");
    }

    #[tokio::test]
    async fn subscription_update_replaces_identifiers() {
        let (db, client) = db_with_client("alice").await;
        let updated = db
            .update_client_subscription(&client.id, "s-9", "https://panel/sub/s-9")
            .await
            .unwrap();
        assert_eq!(updated.short_id, "s-9");
        assert_eq!(updated.subscription_url, "https://panel/sub/s-9");
    }

    #[tokio::test]
    async fn update_missing_client_is_not_found() {
        let db = Database::open_in_memory().await.unwrap();
        let err = db
            .update_client_status("missing", ClientStatus::Blocked)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_client_leaves_operations() {
        let (db, client) = db_with_client("alice").await;
        db.append_operation(&client.id, ActionType::Create, None, OperationResult::Success, None)
            .await
            .unwrap();

        assert!(db.delete_client(&client.id).await.unwrap());
        assert!(!db.delete_client(&client.id).await.unwrap());

        let ops = db.list_operations(&client.id, 50, 0).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(db.count_operations(&client.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn operations_are_listed_newest_first() {
        let (db, client) = db_with_client("alice").await;
        for action in [ActionType::Create, ActionType::Block, ActionType::Unblock] {
            db.append_operation(&client.id, action, None, OperationResult::Success, None)
                .await
                .unwrap();
        }

        let ops = db.list_operations(&client.id, 50, 0).await.unwrap();
        let actions: Vec<&str> = ops.iter().map(|o| o.action.as_str()).collect();
        assert_eq!(actions, vec!["unblock", "block", "create"]);

        let page = db.list_operations(&client.id, 1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].action, "block");
    }

    #[tokio::test]
    async fn operation_payload_and_error_round_trip() {
        let (db, client) = db_with_client("alice").await;
        let payload = serde_json::json!({"days": 30});
        let op = db
            .append_operation(
                &client.id,
                ActionType::Extend,
                Some(&payload),
                OperationResult::Fail,
                Some("panel timed out"),
            )
            .await
            .unwrap();

        assert_eq!(op.action, "extend");
        assert_eq!(op.result, "fail");
        assert_eq!(op.error.as_deref(), Some("panel timed out"));
        let parsed: serde_json::Value = serde_json::from_str(op.payload.as_deref().unwrap()).unwrap();
        assert_eq!(parsed["days"], 30);
    }
}
