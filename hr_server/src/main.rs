//! Multi-room Texas Hold'em server.
//!
//! Provisions a fixed roster of rooms, each hosted by its own actor
//! task behind a coordinator, and bridges clients in over HTTP and
//! WebSocket.

mod api;
mod config;

use std::sync::Arc;

use anyhow::Error;
use log::info;
use pico_args::Arguments;
use tokio::time::Instant;

use holdem_rooms::room::RoomCoordinator;

use crate::config::ServerConfig;

const HELP: &str = "\
Run a multi-room Texas Hold'em server

USAGE:
  hr_server [OPTIONS]

OPTIONS:
  --bind           IP:PORT  Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:3000]
  --manual-rooms   N        Manual (physical deck) rooms  [default: env MANUAL_ROOMS or 6]
  --auto-rooms     N        Automated (server-dealt) rooms  [default: env AUTO_ROOMS or 3]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  RESET_PASSWORD           Password for POST /reset  [default: admin123]
  PRESERVE_ROOM_UNITS      Keep room units warm on reset (true/false)
  ROOM_MAX_PLAYERS         Seats per room  [default: 20]
  ROOM_SMALL_BLIND         Small blind  [default: 5]
  ROOM_BIG_BLIND           Big blind  [default: 10]
";

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let config = ServerConfig::from_env(
        pargs.opt_value_from_str("--bind")?,
        pargs.opt_value_from_str("--manual-rooms")?,
        pargs.opt_value_from_str("--auto-rooms")?,
    );
    config.validate()?;

    env_logger::builder().format_target(false).init();
    info!("Starting multi-room hold'em server at {}", config.bind);

    info!(
        "Provisioning {} manual and {} automated room(s), blinds {}/{}",
        config.manual_rooms,
        config.auto_rooms,
        config.room_defaults.small_blind,
        config.room_defaults.big_blind
    );
    let (coordinator, outbound) = RoomCoordinator::new(config.room_configs());
    for meta in coordinator.metas().await {
        info!(
            "  - {} (ID: {}) - {} seats, {}",
            meta.name,
            meta.id,
            meta.max_players,
            if meta.automated { "automated" } else { "manual" }
        );
    }

    let registry = api::websocket::ConnectionRegistry::default();
    tokio::spawn(api::websocket::relay_outbound(outbound, registry.clone()));

    let state = api::AppState {
        coordinator: coordinator.clone(),
        registry,
        config: Arc::new(config.clone()),
        started_at: Instant::now(),
    };
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    coordinator.drain().await;

    Ok(())
}

/// Graceful shutdown signal: Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
