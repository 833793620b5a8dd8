//! HTTP surface: shared state, router, and server bootstrap.
//!
//! ## Why an in-memory job map?
//!
//! The async intake path (`POST /api/v1/uploads`) needs somewhere to park
//! job state between the accept and the poll. Completed *records* go to
//! SQLite; the job handles are ephemeral coordination state, so they live
//! in a `RwLock<HashMap>` keyed by uuid. A restart forgets in-flight jobs
//! and the client re-uploads, which is the contract the polling UI was
//! written against.

mod handlers;
mod types;

pub use types::{
    ErrorBody, ExtractData, ExtractResponse, Health, ListResponse, RecordPatch, RecordResponse,
    UploadJob, UploadStatus,
};

use crate::config::ExtractionConfig;
use crate::store::RecordStore;
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<ExtractionConfig>,
    pub store: Arc<RecordStore>,
    /// Where multipart uploads are staged before the pipeline reads them.
    pub uploads_dir: Arc<PathBuf>,
    /// Async intake jobs by id.
    pub jobs: Arc<RwLock<HashMap<String, UploadJob>>>,
}

impl ApiState {
    pub fn new(
        config: ExtractionConfig,
        store: RecordStore,
        uploads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            uploads_dir: Arc::new(uploads_dir.into()),
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

/// Build the application router with request tracing and permissive CORS.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/checks/extract", post(handlers::extract_check))
        .route("/api/v1/checks", get(handlers::list_checks))
        .route(
            "/api/v1/checks/{id}",
            get(handlers::get_check).put(handlers::update_check),
        )
        .route("/api/v1/history", get(handlers::history))
        .route("/api/v1/uploads", post(handlers::create_upload))
        .route("/api/v1/uploads/{id}", get(handlers::upload_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve the API until the process is stopped.
pub async fn start_server(addr: &str, state: ApiState) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "API listening");
    axum::serve(listener, build_router(state)).await
}
