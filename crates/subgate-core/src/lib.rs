//! Subgate Core Library
//!
//! Shared functionality for Subgate components:
//! - SQLite pool creation and shared database error type
//! - base64 encoding for subscription payloads
//! - Tracing/logging initialization

pub mod db;
pub mod tracing_init;

pub use db::DatabaseError;
