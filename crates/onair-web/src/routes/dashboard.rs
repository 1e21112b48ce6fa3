//! Dashboard route handler.
//!
//! Serves the embedded on-air display page, which connects back to
//! `/direct-speech?client=ui`.

use axum::response::{Html, IntoResponse};

const DASHBOARD_HTML: &str = include_str!("../../../../assets/web/index.html");

/// GET / - Serve the on-air display page.
pub async fn index() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}
