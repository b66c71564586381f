//! `SQLite` storage for the Subgate daemon.
//!
//! Provides persistence for client records and the append-only operation
//! audit log. The audit API deliberately exposes no update or delete path.

mod db;
mod models;
mod queries;

pub use db::{Database, DatabaseError};
pub use models::*;
pub use queries::NewClient;
