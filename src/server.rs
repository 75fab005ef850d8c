use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    auth,
    config::Config,
    handlers::{self, AppState},
    logs::{ExportRunner, LogBroadcaster, LogStore, LogWriter, Source, SweeperConfig},
};

/// Start the log service.
///
/// Opens the store, wires up the broadcast hub and export runner, spawns the
/// retention sweeper, and serves the admin API until SIGTERM/SIGINT.
pub async fn start_server(config: Config) -> Result<()> {
    let config = Arc::new(config);

    let store = Arc::new(LogStore::new(&config.database.url).await?);
    let hub = Arc::new(LogBroadcaster::new());
    let request_writer = LogWriter::new(Source::Api, Arc::clone(&store), Arc::clone(&hub));
    let exports = ExportRunner::new(
        Arc::clone(&store),
        PathBuf::from(&config.export.directory),
    );

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let sweeper = crate::logs::spawn_retention_sweeper(
        Arc::clone(&store),
        SweeperConfig {
            sweep_hour: config.retention.sweep_hour,
            ..Default::default()
        },
    );

    let state = AppState {
        config: Arc::clone(&config),
        store,
        hub,
        request_writer,
        exports,
    };

    let app = create_router(Arc::clone(&config), state);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting loghub on {}", addr);
    info!(
        "Configuration: {} admin tokens, database {}, retention sweep at {:02}:00",
        config.admin_tokens.len(),
        config.database.url,
        config.retention.sweep_hour
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    sweeper.abort();
    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware.
///
/// Literal segments (`stats`, `stream`, `export`) register before `/:id` so
/// they are never captured as entry ids.
pub fn create_router(config: Arc<Config>, state: AppState) -> Router {
    let log_routes = Router::new()
        .route("/logs", get(handlers::logs_api::get_logs))
        .route("/logs/stats", get(handlers::logs_api::get_stats))
        .route("/logs/stream", get(handlers::stream_api::stream_logs))
        .route(
            "/logs/export",
            post(handlers::export_api::start_export).get(handlers::export_api::list_exports),
        )
        .route("/logs/export/:id", get(handlers::export_api::get_export))
        .route(
            "/logs/export/:id/download",
            get(handlers::export_api::download_export),
        )
        .route("/logs/:id", get(handlers::logs_api::get_log))
        .route("/logs/:id/related", get(handlers::logs_api::get_related))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::instrument_request,
        ))
        .layer(middleware::from_fn_with_state(
            config,
            auth::auth_middleware,
        ))
        .with_state(state);

    Router::new()
        // Public endpoints (no auth required)
        .route("/health", get(handlers::health::health_check))
        .merge(log_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Setup signal handlers for graceful shutdown.
///
/// Returns a broadcast sender for shutdown and a join handle for the signal
/// task. SIGTERM and SIGINT both trigger a graceful drain.
#[cfg(unix)]
fn setup_signal_handlers() -> (broadcast::Sender<()>, tokio::task::JoinHandle<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to setup SIGTERM handler: {}", e);
                return;
            }
        };
        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                error!("Failed to setup SIGINT handler: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown");
            }
        }
        let _ = tx_clone.send(());
    });

    (shutdown_tx, handle)
}

#[cfg(not(unix))]
fn setup_signal_handlers() -> (broadcast::Sender<()>, tokio::task::JoinHandle<()>) {
    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, initiating shutdown");
                let _ = tx_clone.send(());
            }
            Err(e) => {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
        }
    });

    (shutdown_tx, handle)
}
