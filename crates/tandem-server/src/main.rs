//! # tandem-server
//!
//! Real-time presence and message-relay server for the Tandem platform.
//!
//! This binary provides:
//! - **WebSocket relay** that authenticates identities, tracks which users
//!   are reachable (across multiple devices), and fans messages out to
//!   every live connection of a recipient
//! - **Relationship gate**: a message is only relayed between users with
//!   an accepted connection or an approved mentor/mentee match
//! - **Durable message store** (SQLite) written before any delivery event
//!   is emitted
//! - **REST API** (axum) for conversation history, unread counts,
//!   conversation clearing, and connection requests
//! - **Per-IP rate limiting** to protect against abuse

mod api;
mod authorizer;
mod config;
mod db;
mod error;
mod rate_limit;
mod registry;
mod relay;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use tandem_store::Database;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::rate_limit::RateLimiter;
use crate::relay::RelayEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tandem_server=debug")),
        )
        .init();

    info!("Starting Tandem relay server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    info!(instance = %config.instance_name, "Instance settings");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------

    // Durable store (runs migrations on open). DB_PATH overrides the
    // platform data directory.
    let database = match &config.db_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    info!(db = ?database.path(), "Database ready");
    let shared_db = db::shared(database);

    // Relay engine owns the registry and the authorizer.
    let engine = Arc::new(RelayEngine::new(shared_db.clone(), config.max_message_bytes));

    // Rate limiter per client IP.
    let rate_limiter = RateLimiter::new(config.rate_limit_per_sec, config.rate_limit_burst);

    let app_state = AppState {
        db: shared_db,
        engine,
        rate_limiter: rate_limiter.clone(),
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------

    // Periodic rate limiter cleanup (every 5 minutes, evict buckets idle
    // >10 min).
    let rl = rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(300));
        loop {
            interval.tick().await;
            rl.purge_stale(Duration::from_secs(600)).await;
        }
    });

    // -----------------------------------------------------------------------
    // 5. Run the HTTP/WebSocket server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
