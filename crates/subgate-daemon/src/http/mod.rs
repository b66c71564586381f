//! REST API surface.
//!
//! Thin translation layer: routing plus error-to-status mapping. All
//! decisions live in the lifecycle coordinator; handlers never touch the
//! store or the panel directly.

mod routes;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::lifecycle::{Coordinator, LifecycleError};

/// Shared state for request handlers.
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/clients", post(routes::create_client).get(routes::list_clients))
        .route("/clients/:id", get(routes::get_client).delete(routes::delete_client))
        .route("/clients/:id/extend", post(routes::extend_client))
        .route("/clients/:id/block", post(routes::block_client))
        .route("/clients/:id/unblock", post(routes::unblock_client))
        .route("/clients/:id/config", get(routes::get_config))
        .route("/clients/:id/config/rotate", post(routes::rotate_config))
        .route("/operations", get(routes::list_operations))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// JSON error body returned for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// Map a lifecycle error onto a status code and a stable error code.
///
/// All remote-side failures surface as 502: the panel, not this service,
/// is the component that misbehaved.
const fn classify(err: &LifecycleError) -> (StatusCode, &'static str) {
    match err {
        LifecycleError::DuplicateUsername(_) => (StatusCode::CONFLICT, "duplicate_username"),
        LifecycleError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        LifecycleError::RemoteTransient(_) => (StatusCode::BAD_GATEWAY, "remote_transient"),
        LifecycleError::RemoteAuth(_) => (StatusCode::BAD_GATEWAY, "remote_auth"),
        LifecycleError::RemoteNotFound(_) => (StatusCode::BAD_GATEWAY, "remote_not_found"),
        LifecycleError::RemoteValidation(_) => (StatusCode::BAD_GATEWAY, "remote_validation"),
        LifecycleError::LocalPersistence(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "local_persistence")
        }
    }
}

impl IntoResponse for LifecycleError {
    fn into_response(self) -> Response {
        let (status, code) = classify(&self);
        let body = axum::Json(ErrorBody {
            error: code,
            message: self.to_string(),
        });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_username_maps_to_conflict() {
        let (status, code) = classify(&LifecycleError::DuplicateUsername("alice".into()));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(code, "duplicate_username");
    }

    #[test]
    fn not_found_maps_to_404() {
        let (status, _) = classify(&LifecycleError::NotFound("x".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn remote_failures_map_to_bad_gateway() {
        for err in [
            LifecycleError::RemoteTransient("t".into()),
            LifecycleError::RemoteAuth("a".into()),
            LifecycleError::RemoteNotFound("n".into()),
            LifecycleError::RemoteValidation("v".into()),
        ] {
            let (status, _) = classify(&err);
            assert_eq!(status, StatusCode::BAD_GATEWAY);
        }
    }

    #[test]
    fn local_persistence_maps_to_500() {
        let (status, code) = classify(&LifecycleError::LocalPersistence("disk".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(code, "local_persistence");
    }
}
