//! Liveness endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::SharedState;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "status": "ok",
    "uptimeMs": 12345,
    "devices": 3,
    "timestamp": "2025-01-15T03:30:00Z"
}))]
pub struct HealthResponse {
    /// Service status.
    #[schema(example = "ok")]
    pub status: String,

    /// Milliseconds since the server started.
    #[schema(example = 12345)]
    pub uptime_ms: u64,

    /// Devices that have reported at least once.
    #[schema(example = 3)]
    pub devices: usize,

    /// Current server time.
    pub timestamp: DateTime<Utc>,
}

/// Creates the health router.
pub fn router() -> Router<SharedState> {
    Router::new().route("/", get(health_check))
}

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/v1/health",
    tag = "system",
    operation_id = "healthCheck",
    summary = "Check service health",
    description = "Returns service status, uptime and the number of devices seen on \
        the broker since startup.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_ms = u64::try_from(state.uptime().as_millis()).unwrap_or(u64::MAX);
    let devices = state.registry().read().await.len();

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_ms,
        devices,
        timestamp: Utc::now(),
    })
}
