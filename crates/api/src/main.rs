use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shipyard_api::background::stale_runner;
use shipyard_api::config::ServerConfig;
use shipyard_api::router::build_app_router;
use shipyard_api::state::AppState;
use shipyard_api::ws;
use shipyard_codegen::HttpCodeGenerator;
use shipyard_db::{GenerationTracker, InMemoryJobStore};
use shipyard_events::EventBus;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shipyard_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    if config.runner_secret.is_none() {
        tracing::warn!("RUNNER_SECRET is not set; runner endpoints will answer 503");
    }

    // --- Job store and generation tracker ---
    let store = Arc::new(InMemoryJobStore::new());
    let generations = Arc::new(GenerationTracker::new());

    // --- Code generator ---
    let codegen = Arc::new(
        HttpCodeGenerator::new(config.codegen.clone())
            .expect("Failed to build code generator HTTP client"),
    );
    tracing::info!(base_url = %config.codegen.base_url, "Code generator client ready");

    // --- WebSocket manager and event bus ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let event_bus = Arc::new(EventBus::default());
    let relay_handle = tokio::spawn(ws::relay::run(
        Arc::clone(&ws_manager),
        event_bus.subscribe(),
        ws::relay::PING_INTERVAL,
    ));
    tracing::info!("Event bus and WebSocket relay started");

    // --- Stale runner reaper ---
    let reaper_cancel = tokio_util::sync::CancellationToken::new();
    let reaper_handle = config.runner_stale_after().map(|stale_after| {
        tokio::spawn(stale_runner::run(
            store.clone(),
            Arc::clone(&event_bus),
            stale_after,
            reaper_cancel.clone(),
        ))
    });
    if reaper_handle.is_none() {
        tracing::info!("Stale runner reaper disabled");
    }

    // --- App state ---
    let state = AppState {
        store,
        generations,
        codegen,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    reaper_cancel.cancel();
    if let Some(handle) = reaper_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Stale runner reaper stopped");
    }

    // Dropping the last sender closes the channel and ends the relay. The
    // router state holding the other clones was dropped with `axum::serve`.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), relay_handle).await;

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
