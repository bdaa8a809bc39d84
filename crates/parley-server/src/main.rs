//! # parley-server
//!
//! HTTP front end of the conversation engine.
//!
//! This binary provides:
//! - **REST API** (axum) for conversations, messages, calls and the user
//!   directory, one route per engine operation
//! - **Event stream** over WebSocket, one private channel per user
//! - **Attachment storage** on the local filesystem
//! - **Ring timeout sweep** turning unanswered calls into missed ones

mod api;
mod auth;
mod blob_store;
mod config;
mod error;
mod ws;

use std::sync::Arc;
use std::time::Duration;

use parley_engine::{Engine, EngineConfig, InProcessHub};
use parley_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::blob_store::BlobStore;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,parley_server=debug,parley_engine=debug")),
        )
        .init();

    info!("Starting Parley server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };

    let blobs = Arc::new(BlobStore::new(config.blob_storage_path.clone()).await?);
    let hub = InProcessHub::new();

    let engine = Engine::new(db, Arc::new(hub.clone()), blobs.clone()).with_config(EngineConfig {
        max_attachment_size: config.max_attachment_size,
        page_size: config.page_size,
        ..EngineConfig::default()
    });

    let app_state = AppState {
        engine: engine.clone(),
        hub,
        blobs,
        config: Arc::new(config.clone()),
    };

    // -----------------------------------------------------------------------
    // 4. Spawn background tasks
    // -----------------------------------------------------------------------
    if let Some(timeout) = config.call_ring_timeout {
        let ring_timeout = chrono::Duration::from_std(timeout)?;
        let period = (timeout / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                match engine.expire_stale_calls(ring_timeout).await {
                    Ok(0) => {}
                    Ok(expired) => info!(expired, "Stale calls marked missed"),
                    Err(e) => tracing::warn!(error = %e, "Stale call sweep failed"),
                }
            }
        });
        info!(timeout_secs = timeout.as_secs(), "Ring timeout sweep enabled");
    }

    // -----------------------------------------------------------------------
    // 5. Run the HTTP API server (blocks until shutdown)
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
