//! Subgate Daemon
//!
//! Serves the client-lifecycle REST API and runs the background expiry
//! monitor against a single SQLite database and one remote VPN panel.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use subgate_daemon::expiry::spawn_expiry_monitor;
use subgate_daemon::http::{AppState, build_router};
use subgate_daemon::lifecycle::Coordinator;
use subgate_daemon::panel::{PanelClient, PanelConfig};
use subgate_daemon::storage::Database;

#[derive(Parser, Debug)]
#[command(name = "subgate-daemon")]
#[command(version, about = "Subgate daemon - VPN subscriber lifecycle coordinator")]
struct Args {
    /// TCP bind address
    #[arg(long, default_value = "127.0.0.1:8080", env = "SUBGATE_ADDR")]
    addr: SocketAddr,

    /// Database file path
    #[arg(long, env = "SUBGATE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Remote VPN panel base URL (e.g. "<https://panel.example.com>")
    #[arg(long, env = "SUBGATE_PANEL_URL")]
    panel_url: String,

    /// API token for the remote VPN panel
    #[arg(long, env = "SUBGATE_PANEL_TOKEN")]
    panel_token: String,

    /// Per-request timeout for panel calls, in seconds
    #[arg(long, default_value_t = 30, env = "SUBGATE_PANEL_TIMEOUT")]
    panel_timeout: u64,

    /// Interval between expiry sweeps, in seconds
    #[arg(long, default_value_t = 3600, env = "SUBGATE_EXPIRY_INTERVAL")]
    expiry_interval: u64,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "SUBGATE_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "SUBGATE_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("subgate_daemon={}", args.log_level);
    subgate_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        panel_url = %args.panel_url,
        "Starting subgate-daemon"
    );

    // Initialize database
    let db = if let Some(path) = &args.db_path {
        info!(path = %path.display(), "Opening database");
        Database::open(path).await?
    } else {
        let default_path = default_db_path()?;
        info!(path = %default_path.display(), "Opening database (default path)");
        Database::open(&default_path).await?
    };

    // Panel client and coordinator
    let panel_config = PanelConfig {
        base_url: args.panel_url.clone(),
        token: args.panel_token.clone(),
        timeout: Duration::from_secs(args.panel_timeout),
    };
    let panel = PanelClient::new(&panel_config)?;
    let coordinator = Arc::new(Coordinator::new(db, Arc::new(panel)));

    // Daemon-level shutdown channel (Ctrl+C or SIGTERM)
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let expiry_handle = spawn_expiry_monitor(
        Arc::clone(&coordinator),
        Duration::from_secs(args.expiry_interval),
        shutdown_rx,
    );

    let router = build_router(AppState { coordinator });
    let listener = tokio::net::TcpListener::bind(args.addr).await?;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Notify systemd that the daemon is ready to serve (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!(addr = %args.addr, "REST API ready");

    tokio::select! {
        result = axum::serve(listener, router).into_future() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    // Signal the expiry monitor to shut down
    let _ = shutdown_tx.send(true);
    let _ = expiry_handle.await;

    info!("Daemon stopped");
    Ok(())
}

/// Default database path: ~/.subgate/subgate.db
fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".subgate").join("subgate.db"))
}
