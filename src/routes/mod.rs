// HTTP status routes

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::worker::StatusBoard;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) status: Arc<StatusBoard>,
}

pub fn app(status: Arc<StatusBoard>) -> Router {
    let state = AppState { status };
    Router::new()
        .route("/health", get(|| async { "ok" })) // GET /health
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/status", get(http::status_handler)) // GET /api/status
        .with_state(state)
}
