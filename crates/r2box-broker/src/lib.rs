//! HTTP Broker: the loopback service that fronts the Provider Client,
//! Folder Cache, and Transfer Engine over HTTP. Built on `axum` +
//! `tower-http` rather than a hand-rolled single-route `hyper` server,
//! since this surface is wide and streaming enough to warrant it.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod transfers;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Request/response body ceiling (5 GiB).
pub const BODY_LIMIT_BYTES: usize = 5 * 1024 * 1024 * 1024;

/// Builds the full route table with the request-id, CORS, and logging
/// layers applied in that order, plus the body-size ceiling.
#[must_use]
pub fn build_router(state: Arc<AppState>, cors_allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/buckets", get(routes::list_buckets))
        .route("/buckets/:bucket/objects", get(routes::list_objects))
        .route("/buckets/:bucket/batch-delete", delete(routes::delete_batch))
        .route(
            "/buckets/:bucket/objects/*key",
            get(routes::get_object)
                .put(routes::put_object)
                .delete(routes::delete_object),
        )
        .route("/buckets/:bucket/search", get(routes::search))
        .route(
            "/transfers/uploads",
            post(transfers::enqueue_upload),
        )
        .route(
            "/transfers/downloads",
            post(transfers::enqueue_download),
        )
        .route(
            "/transfers/deletes",
            post(transfers::enqueue_delete),
        )
        .route("/transfers", get(transfers::list_tasks))
        .route("/transfers/:id", get(transfers::get_task))
        .route("/transfers/:id/cancel", post(transfers::cancel_task))
        .route("/transfers/:id/pause", post(transfers::pause_task))
        .route("/transfers/:id/resume", post(transfers::resume_task))
        .route("/transfers/:id/retry", post(transfers::retry_task))
        .route("/shutdown", post(routes::shutdown))
        .layer(axum::middleware::from_fn(middleware::logging))
        .layer(middleware::cors_layer(cors_allowed_origins))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .with_state(state)
}
