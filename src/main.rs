//! Mage Arena Server - authoritative multiplayer battle-royale server
//!
//! Entry point. Wires together:
//! - WebSocket sessions for lobby control and real-time gameplay
//! - Per-match simulation tasks at a fixed tick rate
//! - The global sweep that reconciles shared registries
//! - A small HTTP surface for health checks

mod app;
mod config;
mod game;
mod http;
mod lobby;
mod registry;
mod util;
mod ws;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(&config.log_level);
    init_server_time();

    info!("starting mage arena server");
    info!("server address: {}", config.server_addr);

    let state = AppState::new(config.clone());

    // Dedicated sweep task, independent of any match's tick rate
    tokio::spawn(registry::run_sweep(
        state.registry.clone(),
        state.lobbies.clone(),
        config.sweep_interval,
    ));

    let router = build_router(state);

    // Failing to bind is fatal; nothing to recover to
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("listening on {}", addr);
    info!("health check: http://{}/health", addr);
    info!("websocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received ctrl+c, starting graceful shutdown");
        }
        _ = terminate => {
            info!("received terminate signal, starting graceful shutdown");
        }
    }
}
