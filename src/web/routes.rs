use axum::{routing::get, Router};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// Dashboard metrics and chat
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/get_metrics",
            get(handlers::metrics::get_metrics).post(handlers::metrics::filter_chart_metrics),
        )
        .route("/stream_openai_text", get(handlers::chat::stream_openai_text))
}

// Liveness
pub fn system_routes() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(handlers::status::system_status))
}
