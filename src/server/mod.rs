//! HTTP server
//!
//! Thin axum surface over the analysis relay: multipart in, JSON or a
//! verbatim event stream out.

pub mod connect_info;
pub mod error;
pub mod http;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::config::Config;
use crate::media::{AnalysisError, ChatCompletionsAnalyzer, InputNormalizer, VideoAnalyzer};

/// Allowance on top of the upload ceiling for multipart framing and text fields.
pub const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to create analyzer: {0}")]
    Analyzer(#[from] AnalysisError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    /// `None` when no API key is configured; analysis requests then fail
    /// with a server-misconfigured error.
    pub analyzer: Option<Arc<dyn VideoAnalyzer>>,
    pub normalizer: InputNormalizer,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("analyzer", &self.analyzer.as_ref().map(|a| a.model().to_string()))
            .field("normalizer", &self.normalizer)
            .finish()
    }
}

impl AppState {
    pub fn new(analyzer: Option<Arc<dyn VideoAnalyzer>>, normalizer: InputNormalizer) -> Self {
        Self {
            analyzer,
            normalizer,
        }
    }

    /// Build state from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ServerError> {
        let analyzer = ChatCompletionsAnalyzer::from_config(&config.provider)?
            .map(|a| Arc::new(a) as Arc<dyn VideoAnalyzer>);
        let normalizer = InputNormalizer::new(
            config.media.max_upload_bytes,
            config.media.default_mime_type.clone(),
        );
        Ok(Self::new(analyzer, normalizer))
    }

    pub fn is_configured(&self) -> bool {
        self.analyzer.is_some()
    }
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state
        .normalizer
        .max_upload_bytes()
        .saturating_add(FORM_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/health", get(http::health_handler))
        .route("/api/analyze", post(http::analyze_handler))
        .route("/api/analyze/stream", post(http::analyze_stream_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Bind and serve until ctrl-c or SIGTERM.
pub async fn start_server(config: &Config) -> Result<(), ServerError> {
    let state = AppState::from_config(config)?;
    if !state.is_configured() {
        tracing::warn!(
            "No provider API key configured (set {}); analysis requests will fail",
            crate::config::API_KEY_ENV
        );
    }

    let app = create_router(state);
    let host = config.server.host.as_str();
    let port = config.server.port;
    let listener = tokio::net::TcpListener::bind((host, port))
        .await
        .map_err(|source| ServerError::Bind {
            addr: format!("{host}:{port}"),
            source,
        })?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        address = %local_addr,
        model = %config.provider.model,
        "Starting analysis server"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
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
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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
    tracing::info!("Shutdown signal received, draining connections");
}
