// GET handlers: version, api/status

use axum::{extract::State, response::IntoResponse};

use super::AppState;

pub(crate) const NAME: &str = env!("CARGO_PKG_NAME");
pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET /version: service name and version from Cargo.toml.
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/status: pass counter and the last reconciliation report (null before the first pass).
pub(super) async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.status.snapshot().await)
}
