//! Health check endpoints.

use axum::{http::StatusCode, Json};
use metricsd_telemetry::{health, HealthReport};

/// GET /health - Full health check across datastore/engine/ingress.
pub async fn health_handler() -> Json<HealthReport> {
    Json(health().report())
}

/// GET /health/ready - Readiness probe (can accept query traffic).
pub async fn ready_handler() -> StatusCode {
    if health().is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health/live - Liveness probe (process is running).
pub async fn live_handler() -> StatusCode {
    if health().is_alive() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
