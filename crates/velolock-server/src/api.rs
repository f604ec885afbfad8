//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `health` - Service health checks
//! - `devices` - Last reported device status
//! - `commands` - Per-workflow device commands
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

pub mod commands;
pub mod devices;
pub mod error;
pub mod health;
pub mod openapi;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /v1
/// ├── /health                                  - Health check
/// ├── /devices                                 - Known devices
/// ├── /devices/{deviceId}                      - One device
/// ├── /devices/{deviceId}/commands/state       - Set lifecycle state
/// ├── /devices/{deviceId}/commands/booking     - book / release
/// ├── /devices/{deviceId}/commands/maintenance - start / complete
/// ├── /devices/{deviceId}/commands/reservation - reserve / cancel
/// ├── /devices/{deviceId}/commands/status      - request
/// └── /openapi.json                            - OpenAPI specification
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest(
            "/v1",
            Router::new()
                .nest("/health", health::router())
                .nest("/devices", devices::router().merge(commands::router()))
                .route("/openapi.json", get(openapi::get_openapi_spec)),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
