//! Client lifecycle coordination.
//!
//! The coordinator is the only component that touches both systems of
//! record: the remote panel and the local store. It owns the ordering
//! policy for partial failure, the idempotency short-circuits, and the
//! audit-logging contract.

mod coordinator;
mod error;
mod locks;

pub use coordinator::{ClientConfig, Coordinator, CreateOpts, ListFilter};
pub use error::LifecycleError;
pub use locks::KeyedLocks;
