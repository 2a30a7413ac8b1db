use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use crate::web::error::ApiError;
use crate::web::state::AppState;
use crate::web::streaming::paced_chunks;

#[derive(Debug, Deserialize)]
pub struct ChatQuery {
    pub query: Option<String>,
}

/// `GET /stream_openai_text?query=...`
///
/// Everything up to the first answer chunk happens before the response is
/// committed, so those failures still map to a status code.
pub async fn stream_openai_text(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChatQuery>,
) -> Result<Response, ApiError> {
    let query = params.query.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }
    info!(chars = query.len(), "Answering chat query");

    let answer = state
        .orchestrator
        .answer(&query)
        .await
        .map_err(|source| ApiError::Chat {
            message: "Error streaming OpenAI text",
            source,
        })?;

    let body = Body::from_stream(paced_chunks(answer, state.pacing));
    Ok(([(header::CONTENT_TYPE, "text/event-stream")], body).into_response())
}
