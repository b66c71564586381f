//! Subgate Daemon Library
//!
//! Core functionality for the Subgate daemon:
//! - Lifecycle coordinator sequencing remote-panel and local-store mutations
//! - SQLite storage for clients and the append-only operation audit log
//! - Remote VPN panel adapter (trait + reqwest implementation)
//! - REST API surface for clients and audit queries
//! - Background expiry monitor

pub mod expiry;
pub mod http;
pub mod lifecycle;
pub mod panel;
pub mod storage;
