//! Trigger ingestion endpoint.

use axum::{body::Bytes, extract::State, Json};
use onair_core::{message::parse_trigger, TriggerAck};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// POST /trigger - Broadcast a line of text to every connected consumer.
///
/// The body is read as JSON whatever its content type. Delivery failures
/// on individual connections are not reported back to the caller.
pub async fn trigger(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<TriggerAck>, ApiError> {
    let message = parse_trigger(&body).map_err(|e| {
        warn!(error = %e, "invalid trigger request");
        ApiError::from(e)
    })?;

    let report = state.registry.broadcast(&message).await;
    info!(
        ?message,
        recipients = report.attempted,
        evicted = report.evicted,
        "trigger broadcast"
    );

    Ok(Json(TriggerAck { ok: true }))
}
