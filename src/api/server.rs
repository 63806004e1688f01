//! HTTP server setup: router, middleware and listener.

use super::state::ApiState;
use super::{auth, strategy, system, telegram};

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use std::net::SocketAddr;
use std::sync::Arc;

/// Build the full router. Everything except `/health` sits behind the bearer
/// gate.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let gated = Router::new()
        .route("/status", get(system::status))
        .route("/test-connection", post(telegram::test_connection))
        .route("/test-channel-message", post(telegram::test_channel_message))
        .route("/channel-info", post(telegram::channel_info))
        .route("/collect-tips", post(telegram::collect_tips))
        .route("/strategy-summary", post(strategy::strategy_summary))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(system::health))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the given address.
///
/// Serves until `shutdown_rx` flips to `true`, then drains in-flight requests.
pub async fn start_http_server(
    bind: SocketAddr,
    state: Arc<ApiState>,
    shutdown_rx: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(%bind, "HTTP server listening");

    let handle = tokio::spawn(async move {
        let mut shutdown = shutdown_rx;
        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|v| *v).await;
            })
            .await
        {
            tracing::error!(%error, "HTTP server exited with error");
        }
    });

    Ok(handle)
}
