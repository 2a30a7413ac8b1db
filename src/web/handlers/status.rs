use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub uptime_seconds: i64,
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let uptime = chrono::Utc::now().signed_duration_since(state.startup_time);

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: uptime.num_seconds(),
    })
}
