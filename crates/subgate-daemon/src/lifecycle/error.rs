//! Lifecycle coordinator error taxonomy.

use thiserror::Error;

use crate::panel::PanelError;
use crate::storage::DatabaseError;

/// Errors surfaced by lifecycle operations.
///
/// Remote variants preserve the adapter's uniform taxonomy; the two local
/// variants distinguish "the client never existed" from "the store failed",
/// because the latter can mean a remote mutation already happened.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// A client with this username already exists. No remote call was made.
    #[error("client with username '{0}' already exists")]
    DuplicateUsername(String),

    /// No client with this id exists locally.
    #[error("client {0} not found")]
    NotFound(String),

    /// Network failure, timeout, or 5xx from the panel. Caller may retry.
    #[error("panel request failed: {0}")]
    RemoteTransient(String),

    /// The panel rejected our credential. Deployment configuration failure.
    #[error("panel authentication failed: {0}")]
    RemoteAuth(String),

    /// A locally known client has no matching remote account. State drift;
    /// needs reconciliation, distinct from [`Self::NotFound`].
    #[error("remote account missing for locally known client: {0}")]
    RemoteNotFound(String),

    /// The panel rejected the request shape.
    #[error("panel rejected the request: {0}")]
    RemoteValidation(String),

    /// The local store failed. When this follows a successful remote
    /// mutation the client is in an orphan state and the error is logged at
    /// elevated severity.
    #[error("local persistence failure: {0}")]
    LocalPersistence(String),
}

impl From<PanelError> for LifecycleError {
    fn from(e: PanelError) -> Self {
        match e {
            PanelError::Transient(msg) => Self::RemoteTransient(msg),
            PanelError::Auth(msg) => Self::RemoteAuth(msg),
            PanelError::NotFound(msg) => Self::RemoteNotFound(msg),
            PanelError::Validation(msg) => Self::RemoteValidation(msg),
        }
    }
}

impl From<DatabaseError> for LifecycleError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            other => Self::LocalPersistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panel_errors_map_onto_remote_variants() {
        assert!(matches!(
            LifecycleError::from(PanelError::Transient("502".into())),
            LifecycleError::RemoteTransient(_)
        ));
        assert!(matches!(
            LifecycleError::from(PanelError::Auth("401".into())),
            LifecycleError::RemoteAuth(_)
        ));
        assert!(matches!(
            LifecycleError::from(PanelError::NotFound("404".into())),
            LifecycleError::RemoteNotFound(_)
        ));
        assert!(matches!(
            LifecycleError::from(PanelError::Validation("422".into())),
            LifecycleError::RemoteValidation(_)
        ));
    }

    #[test]
    fn database_not_found_stays_not_found() {
        assert!(matches!(
            LifecycleError::from(DatabaseError::NotFound("Client x".into())),
            LifecycleError::NotFound(_)
        ));
        assert!(matches!(
            LifecycleError::from(DatabaseError::Query("disk I/O error".into())),
            LifecycleError::LocalPersistence(_)
        ));
    }
}
