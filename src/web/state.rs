use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::metrics::MetricsGateway;
use crate::orchestration::Orchestrator;

/// Shared, read-only application state for the web server
pub struct AppState {
    pub metrics: MetricsGateway,
    pub orchestrator: Orchestrator,
    /// Delay before each streamed answer chunk; zero disables pacing.
    pub pacing: Duration,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(metrics: MetricsGateway, orchestrator: Orchestrator, pacing: Duration) -> Self {
        Self {
            metrics,
            orchestrator,
            pacing,
            startup_time: Utc::now(),
        }
    }
}
