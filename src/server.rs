use anyhow::{Context, Result};
use axum::{middleware, routing::get, Router};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use crate::{
    config::Config,
    handlers,
    store::{LogStore, StoreOptions},
    tracking::{track_requests, RecordWriter, TrackingState},
};

/// Add request tracking to `app` and mount the devtrack routes beside it
///
/// The tracking middleware is installed with `route_layer`, so `app` must
/// already have its routes. The devtrack routes are merged afterwards and are
/// never tracked.
pub fn with_devtrack(app: Router, store: Arc<LogStore>, tracking: TrackingState) -> Router {
    let mount_path = tracking.settings.mount_path.clone();

    app.route_layer(middleware::from_fn_with_state(tracking, track_requests))
        .merge(handlers::mount_devtrack_routes(&mount_path, store))
}

/// Standalone application: `/health` plus the mounted devtrack routes
pub fn create_app(store: Arc<LogStore>, tracking: TrackingState) -> Router {
    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .with_state(store.clone());

    with_devtrack(app, store, tracking).layer(TraceLayer::new_for_http())
}

/// Start the devtrack server
///
/// This function:
/// 1. Opens the request log store (taking its write lock)
/// 2. Spawns the background record writer
/// 3. Serves until Ctrl-C or SIGTERM
/// 4. Drains queued records and closes the store
pub async fn start_server(config: Config) -> Result<()> {
    let store = Arc::new(
        LogStore::open_with(StoreOptions::from(&config.store))
            .await
            .with_context(|| {
                format!("Failed to open request log store at {}", config.store.database_path)
            })?,
    );

    let (writer, writer_handle) = RecordWriter::spawn(store.clone(), config.tracking.writer_buffer);
    let tracking = TrackingState::new(writer, config.tracking.clone());
    let app = create_app(store.clone(), tracking);

    let addr = SocketAddr::from((
        config
            .server
            .host
            .parse::<std::net::IpAddr>()
            .with_context(|| format!("Invalid server.host '{}'", config.server.host))?,
        config.server.port,
    ));

    info!("Starting devtrack on {}", addr);
    info!(
        database = %config.store.database_path,
        mount_path = %config.tracking.mount_path,
        tracking_enabled = config.tracking.enabled,
        "Configuration loaded"
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router (and every writer clone in it) is gone once serve returns,
    // so the writer task drains its queue and exits.
    if let Err(e) = writer_handle.await {
        error!("Request log writer did not stop cleanly: {}", e);
    }
    store.close().await;

    info!("Server stopped gracefully");
    Ok(())
}

/// Resolves on SIGTERM or SIGINT
#[cfg(unix)]
async fn shutdown_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to setup SIGTERM handler: {}", e);
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received, initiating graceful shutdown"),
        _ = ctrl_c() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    ctrl_c().await
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, initiating graceful shutdown"),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await
        }
    }
}
