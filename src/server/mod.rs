//! OpenAI-compatible HTTP surface.

pub mod error;
pub mod health;
pub mod models;
pub mod speech;
pub mod state;
pub mod transcriptions;

pub use error::ApiError;
pub use state::AppState;

use crate::error::{Result, SpeechError};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::net::SocketAddr;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Room for multipart boundaries and form fields on top of the file itself.
const MULTIPART_SLACK_BYTES: usize = 1024 * 1024;

/// Build the router with every route and the shared middleware.
pub fn create_router(state: AppState) -> Router {
    let upload_limit = state.config.server.max_upload_mb * 1024 * 1024 + MULTIPART_SLACK_BYTES;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/audio/speech", post(speech::speech))
        .route(
            "/v1/audio/transcriptions",
            post(transcriptions::transcriptions).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/v1/models", get(models::list_models))
        .route("/v1/models/stt/download", post(models::download_stt))
        .route("/v1/models/tts/download", post(models::download_tts))
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until SIGINT or SIGTERM.
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address '{}': {}", addr, e))?;

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
}

/// Accept an empty model name, the loaded model id, or an OpenAI alias.
pub(crate) fn check_model(requested: Option<&str>, loaded: &str, aliases: &[&str]) -> Result<()> {
    let requested = requested.map(str::trim).unwrap_or_default();
    if requested.is_empty() || requested == loaded || aliases.contains(&requested) {
        return Ok(());
    }
    Err(SpeechError::InvalidModel {
        model: requested.to_string(),
    })
}
