// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Macroblog API Server
//!
//! Serves blog posts and profiles read from AT Protocol repos, with an
//! optional app-password session.

use anyhow::Context;
use macroblog::{
    config::Config,
    store::{FileStore, MemoryStore, TokenStore},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(
        port = config.port,
        service_url = %config.service_url,
        auth_mode = ?config.auth_mode,
        "Starting Macroblog API"
    );

    // Token store: file-backed when configured, otherwise in memory
    let store: Arc<dyn TokenStore> = match &config.store_path {
        Some(path) => {
            let store = FileStore::open(path)
                .with_context(|| format!("Failed to open token store {}", path.display()))?;
            tracing::info!(path = %path.display(), "File token store opened");
            Arc::new(store)
        }
        None => {
            tracing::info!("Using in-memory token store");
            Arc::new(MemoryStore::new())
        }
    };

    let state = Arc::new(AppState::new(config.clone(), store)?);

    // Restore any stored session and start the background tasks
    let _tasks = match &state.sessions {
        Some(sessions) => {
            match sessions.restore().await {
                Ok(Some(session)) => {
                    tracing::info!(did = %session.did, handle = %session.handle, "Session restored")
                }
                Ok(None) => tracing::info!("No stored session"),
                Err(e) => tracing::warn!(error = %e, "Stored session could not be restored"),
            }
            vec![
                sessions.spawn_expiry_watch(),
                sessions.spawn_event_listener(),
            ]
        }
        None => Vec::new(),
    };

    // Build router
    let app = macroblog::routes::create_router(state.clone());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(sessions) = &state.sessions {
        sessions.shutdown();
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy()
        .add_directive(
            "macroblog=debug"
                .parse()
                .unwrap_or_else(|_| tracing::Level::DEBUG.into()),
        );

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
