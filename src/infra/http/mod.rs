mod ingest;
mod middleware;
mod viewers;

pub use ingest::BLANK_DOCUMENT_MESSAGE;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::{broadcast::BroadcastHub, pipeline::PipelineCoordinator};

use self::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub pipeline: PipelineCoordinator,
    pub hub: Arc<BroadcastHub>,
}

/// Build the HTTP surface: label upload, viewer socket, viewer page.
pub fn build_router(state: HttpState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(crate::infra::assets::serve_index))
        .route("/static/{*path}", get(crate::infra::assets::serve_static))
        .route("/_health", get(health))
        .route(
            "/pstprnt",
            post(ingest::submit_label).layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        .route("/ws", get(viewers::viewer_socket))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
