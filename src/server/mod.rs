pub mod error;
pub mod handlers;

use axum::{
    Router,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::analysis::Analyzer;
use crate::flow::{FlowRunner, Tweaks};
use crate::scrape::Scraper;
use crate::store::DocumentStore;

pub use error::{ApiError, ApiResult};

/// Identifiers reported by `/test-config`.
#[derive(Debug, Clone, Default)]
pub struct FlowInfo {
    pub langflow_id: Option<String>,
    pub flow_id: Option<String>,
}

/// Shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<dyn FlowRunner>,
    pub flow_info: FlowInfo,
    pub default_tweaks: Option<Tweaks>,
    pub scraper: Arc<Scraper>,
    pub analyzer: Arc<Analyzer>,
    pub store: Arc<dyn DocumentStore>,
    pub collection: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/test-config", get(handlers::test_config))
        .route("/run-flow", post(handlers::run_flow))
        .route("/scrape-instagram", post(handlers::scrape_instagram))
        .route("/analysis", post(handlers::analyze))
        .route("/profiles", get(handlers::profiles))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
