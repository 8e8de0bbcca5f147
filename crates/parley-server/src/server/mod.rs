use crate::config::ServerConfig;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use parley_signal::SessionRouter;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, warn, Level};

mod routes;

/// Server application state
pub struct AppState {
    /// Signaling engine shared by every connection
    pub router: Arc<SessionRouter>,
    /// Server configuration
    pub config: ServerConfig,
    /// Cancelled when the server begins shutting down
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            router: Arc::new(SessionRouter::new(config.router_options())),
            config,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Start the server and run until Ctrl-C or SIGTERM.
pub async fn start(config: ServerConfig) -> Result<()> {
    let state = Arc::new(AppState::new(config));
    let stop_token = state.shutdown.clone();

    let listener = tokio::net::TcpListener::bind(state.config.bind_addr).await?;

    let sweep_handle = tokio::spawn(run_sweeper(
        Arc::clone(&state.router),
        state.config.sweep_interval,
        stop_token.clone(),
    ));

    let signal_token = stop_token.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    let result = start_http_server(state, listener, stop_token.clone()).await;

    stop_token.cancel();
    if let Err(e) = sweep_handle.await {
        warn!(error = %e, "Sweep task failed");
    }

    result
}

/// Start the HTTP server with graceful shutdown support.
async fn start_http_server(
    state: Arc<AppState>,
    listener: tokio::net::TcpListener,
    stop_token: CancellationToken,
) -> Result<()> {
    let app = create_router(state);

    let addr = listener.local_addr()?;
    info!("Starting Axum HTTP server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            stop_token.cancelled().await;
            info!("HTTP server received shutdown signal, draining connections");
        })
        .await?;

    Ok(())
}

/// Resolves on Ctrl-C, or on SIGTERM where available.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Periodically expire unanswered calls and lonely rooms.
async fn run_sweeper(router: Arc<SessionRouter>, period: Duration, stop_token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = stop_token.cancelled() => {
                debug!("Sweep task stopping");
                break;
            }
            _ = ticker.tick() => {
                router.sweep_expired(std::time::Instant::now());
            }
        }
    }
}

/// Configure CORS layer.
///
/// With explicit origins only those are allowed. Otherwise falls back to
/// permissive CORS (suitable for development).
fn configure_cors(origins: &[String]) -> CorsLayer {
    use tower_http::cors::AllowOrigin;

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let allowed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if allowed.is_empty() {
        warn!("PARLEY_CORS_ORIGINS set but no valid origins parsed, falling back to permissive CORS");
        CorsLayer::permissive()
    } else {
        info!(origins = ?allowed, "Configured CORS with explicit allowed origins");
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    }
}

/// Create the Axum router with all routes and middleware
fn create_router(state: Arc<AppState>) -> Router {
    let cors = configure_cors(&state.config.cors_origins);

    Router::new()
        .route("/", get(status_handler))
        .route("/health", get(health_handler))
        .with_state(Arc::clone(&state))
        // Merge signaling WebSocket endpoint
        .merge(routes::websocket::router(Arc::clone(&state)))
        // Merge administrative REST endpoints
        .merge(routes::admin::router(state))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
}

/// Service status with live counters
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.router.stats();
    (
        StatusCode::OK,
        Json(json!({
            "status": "running",
            "service": "parley-server",
            "version": env!("CARGO_PKG_VERSION"),
            "connected_users": stats.connected_users,
            "active_rooms": stats.rooms,
            "pending_calls": stats.pending_calls,
            "active_calls": stats.active_calls,
        })),
    )
}

/// Simple health check endpoint (for load balancers)
async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "parley-server",
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}
