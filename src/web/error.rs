use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::metrics::MetricsError;
use crate::orchestration::OrchestrationError;

/// Handler failures. Client errors carry their message through; server
/// errors log the full source and answer with a generic message only.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}: {source}")]
    Metrics {
        message: String,
        #[source]
        source: MetricsError,
    },
    #[error("{message}: {source}")]
    Chat {
        message: &'static str,
        #[source]
        source: OrchestrationError,
    },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Metrics { message, source } => {
                error!(error = %source, "{}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
            ApiError::Chat { message, source } => {
                error!(error = %source, "{}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.to_string())
            }
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
