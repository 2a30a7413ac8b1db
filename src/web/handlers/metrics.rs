use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Local;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::metrics::models::{ChartFilters, DataType};
use crate::metrics::MetricsError;
use crate::web::error::ApiError;
use crate::web::state::AppState;

const INVALID_DATA_TYPE: &str = "Invalid data type. Please provide a valid data type.";

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub data_type: Option<String>,
}

/// `GET /get_metrics?data_type=filters|charts`
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MetricsQuery>,
) -> Result<Response, ApiError> {
    let raw = params.data_type.as_deref().unwrap_or("filters");
    let data_type: DataType = raw.parse().map_err(|e| {
        warn!("Rejected metrics request: {}", e);
        ApiError::BadRequest(INVALID_DATA_TYPE.to_string())
    })?;

    let failed = |source: MetricsError| ApiError::Metrics {
        message: format!("Error getting {} metrics", data_type),
        source,
    };

    let today = Local::now().date_naive();
    let shifted = state
        .metrics
        .normalize_dates(today)
        .await
        .map_err(|e| failed(e.into()))?;
    debug!(days = shifted, %data_type, "Serving metrics");

    match data_type {
        DataType::Filters => {
            let filters = state
                .metrics
                .fetch_filter_metrics()
                .await
                .map_err(|e| failed(e.into()))?;
            Ok(Json(filters).into_response())
        }
        DataType::Charts => {
            let charts = state
                .metrics
                .fetch_chart_metrics(None, today)
                .await
                .map_err(failed)?;
            Ok(Json(charts).into_response())
        }
    }
}

/// `POST /get_metrics` with the dashboard's current filter selection.
pub async fn filter_chart_metrics(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ChartFilters>,
) -> Result<Response, ApiError> {
    let failed = |source: MetricsError| match source {
        MetricsError::InvalidFilter(message) => ApiError::BadRequest(message),
        source => ApiError::Metrics {
            message: "Error getting chart metrics".to_string(),
            source,
        },
    };

    let today = Local::now().date_naive();
    state
        .metrics
        .normalize_dates(today)
        .await
        .map_err(|e| failed(e.into()))?;

    let charts = state
        .metrics
        .fetch_chart_metrics(Some(&body.selected_filters), today)
        .await
        .map_err(failed)?;

    Ok(Json(charts).into_response())
}
