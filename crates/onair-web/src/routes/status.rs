//! Connection status endpoint.

use axum::{extract::State, Json};
use onair_core::StatusReport;

use crate::state::AppState;

/// GET /status - Connection counts by consumer role.
pub async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    Json(StatusReport::from(state.registry.stats()))
}
