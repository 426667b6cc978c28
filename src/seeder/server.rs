use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::api::{self, AppState};
use super::github::GitHubClient;
use super::orchestrator::Orchestrator;
use super::store::JobStore;
use crate::config::Config;

/// Build the full application router: API routes plus the shared layers.
pub fn build_router(state: Arc<AppState>, config: &Config) -> Router {
    with_middleware(api::api_router().fallback(not_found), config).with_state(state)
}

/// Request timeout (408), panic recovery, tracing and CORS around `router`.
fn with_middleware<S>(router: Router<S>, config: &Config) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    router
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.request_timeout,
        ))
        .layer(CatchPanicLayer::custom(internal_error))
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Not found"})),
    )
}

fn internal_error(_panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    tracing::error!("Request handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"error": "Internal server error"})),
    )
        .into_response()
}

/// Wire the real GitHub client and simulated pipeline into an app state.
pub fn build_state(config: &Config) -> Result<Arc<AppState>> {
    let github = GitHubClient::new(&config.github_api_url, config.request_timeout)
        .context("Failed to build GitHub HTTP client")?;
    let orchestrator = Orchestrator::new(
        Arc::new(github.clone()),
        Arc::new(config.simulated_pipeline()),
        JobStore::new(),
        config.staging_dir.clone(),
        config.retry_policy(),
    );
    Ok(Arc::new(AppState {
        orchestrator,
        downloader: github,
        package_path: config.package_path.clone(),
    }))
}

/// Start the seeder server and block until Ctrl+C.
pub async fn start_server(config: Config) -> Result<()> {
    let state = build_state(&config)?;
    let orchestrator = state.orchestrator.clone();

    orchestrator.store().spawn_sweeper(
        orchestrator.tracker(),
        config.sweep_interval,
        config.failed_job_max_age,
        orchestrator.shutdown_token(),
    );

    let app = build_router(state, &config);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        address = %local_addr,
        staging_dir = %config.staging_dir.display(),
        "Repository seeder listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!(in_flight = orchestrator.tracker().len(), "Draining setup jobs");
    orchestrator.shutdown().await;
    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C; shutting down");
    }
    tracing::info!("Shutdown signal received");
}
