//! Route handlers.

pub mod dashboard;
pub mod status;
pub mod trigger;

use axum::{
    handler::Handler,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, MethodRouter},
};

use crate::state::AppState;

/// Route answering GET only. HEAD and every other method get 405.
pub fn get_only<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    get(handler).head(get_not_allowed).fallback(get_not_allowed)
}

/// Route answering POST only.
pub fn post_only<H, T>(handler: H) -> MethodRouter<AppState>
where
    H: Handler<T, AppState>,
    T: 'static,
{
    post(handler).fallback(post_not_allowed)
}

async fn get_not_allowed() -> Response {
    method_not_allowed("GET")
}

async fn post_not_allowed() -> Response {
    method_not_allowed("POST")
}

fn method_not_allowed(allow: &'static str) -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        [(header::ALLOW, allow)],
        "Method Not Allowed",
    )
        .into_response()
}
