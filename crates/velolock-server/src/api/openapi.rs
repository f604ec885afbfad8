//! OpenAPI specification generation for the velolock API.
//!
//! The document is served at `/v1/openapi.json` and written to the workspace
//! root by the `gen-openapi` binary for client generation.

use axum::Json;
use utoipa::OpenApi;
use velolock_core::{
    BookingCommand, LifecycleState, MaintenanceCommand, ReservationCommand, StateCommand,
    StatusCommand, ValidationIssue,
};

use super::commands::{
    BookingCommandRequest, CommandAcceptedResponse, MaintenanceCommandRequest,
    ReservationCommandRequest, StateCommandRequest, StatusCommandRequest,
};
use super::devices::{DeviceListResponse, DeviceStatusResponse};
use super::error::ErrorResponse;
use super::health::HealthResponse;

/// Serve the OpenAPI specification as JSON.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as pretty-printed JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for velolock.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "velolock API",
        version = "0.1.0",
        description = r#"
# velolock API

Command and status service for a fleet of connected bicycle locks.

## Overview

Each lock is addressed by its hardware address and listens on MQTT command
topics. This API:

1. **Validates commands** against a closed vocabulary per workflow
2. **Checks legality** against the lock's lifecycle state machine
3. **Publishes** accepted commands on the lock's command topic

A `202 Accepted` means the command was published. The lock confirms by
publishing its new status, which is visible through the devices endpoints.

## Lifecycle

`available`, `reserved`, `booked`, `broken`, `maintained`, `unavailable`.
Rejected transitions return `409` with the allowed destinations in
`details.allowedStates`.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local velolock server")
    ),
    tags(
        (name = "system", description = "Health checks and API documentation"),
        (name = "devices", description = "Last reported status of each lock"),
        (name = "commands", description = "Commands sent to locks over MQTT")
    ),
    paths(
        super::health::health_check,
        super::devices::list_devices,
        super::devices::get_device,
        super::commands::send_state_command,
        super::commands::send_booking_command,
        super::commands::send_maintenance_command,
        super::commands::send_reservation_command,
        super::commands::send_status_command,
    ),
    components(
        schemas(
            ErrorResponse,
            ValidationIssue,
            HealthResponse,
            LifecycleState,
            DeviceStatusResponse,
            DeviceListResponse,
            StateCommand,
            BookingCommand,
            MaintenanceCommand,
            ReservationCommand,
            StatusCommand,
            StateCommandRequest,
            BookingCommandRequest,
            MaintenanceCommandRequest,
            ReservationCommandRequest,
            StatusCommandRequest,
            CommandAcceptedResponse,
        )
    )
)]
pub struct ApiDoc;
