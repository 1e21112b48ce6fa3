//! OnAir Web Server
//!
//! Axum-based relay: WebSocket consumers, trigger ingestion and status.

pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

use std::path::{Path, PathBuf};

use axum::Router;
use onair_core::RegistryConfig;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub use error::ApiError;
use routes::{get_only, post_only};
use state::AppState;

/// Settings for `run_server`.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served under `/logo/`.
    pub logo_dir: PathBuf,
    pub registry: RegistryConfig,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Create the application router.
pub fn create_router(state: AppState, logo_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get_only(routes::dashboard::index))
        .route("/direct-speech", get_only(websocket::ws_handler))
        .route("/trigger", post_only(routes::trigger::trigger))
        .route("/status", get_only(routes::status::status))
        .nest_service("/logo", ServeDir::new(logo_dir))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the web server until Ctrl+C.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let state = AppState::new(config.registry.clone());
    let app = create_router(state, &config.logo_dir);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Relay listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
