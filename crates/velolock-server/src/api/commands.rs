//! Device command API endpoints.
//!
//! One route per workflow. Each request is validated against its workflow's
//! schema, then checked against the device's current lifecycle state, then
//! published on the device's command topic. A `202 Accepted` means the
//! command was handed to the broker; the device confirms by publishing its
//! new status.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use velolock_core::{
    BookingCommand, CommandAccepted, DeviceCommand, MaintenanceCommand, ReservationCommand,
    StateCommand, StatusCommand, Workflow,
};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the command router, rooted at `/devices`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/{deviceId}/commands/state", post(send_state_command))
        .route("/{deviceId}/commands/booking", post(send_booking_command))
        .route("/{deviceId}/commands/maintenance", post(send_maintenance_command))
        .route("/{deviceId}/commands/reservation", post(send_reservation_command))
        .route("/{deviceId}/commands/status", post(send_status_command))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of a state command.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "state": "maintained" }))]
pub struct StateCommandRequest {
    /// Requested lifecycle state.
    pub state: StateCommand,
}

/// Body of a booking command.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "command": "book" }))]
pub struct BookingCommandRequest {
    /// Booking verb.
    pub command: BookingCommand,
}

/// Body of a maintenance command.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "command": "start" }))]
pub struct MaintenanceCommandRequest {
    /// Maintenance verb.
    pub command: MaintenanceCommand,
}

/// Body of a reservation command.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "command": "reserve" }))]
pub struct ReservationCommandRequest {
    /// Reservation verb.
    pub command: ReservationCommand,
}

/// Body of a status request. The body may be omitted entirely.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "command": "request" }))]
pub struct StatusCommandRequest {
    /// Status verb, `request` when omitted.
    #[schema(nullable)]
    pub command: Option<StatusCommand>,
}

/// A command accepted for delivery.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "deviceId": "AABBCCDDEEFF",
    "topic": "esp/commands/booking/AABBCCDDEEFF",
    "payload": "book"
}))]
pub struct CommandAcceptedResponse {
    /// Normalized device id.
    #[schema(example = "AABBCCDDEEFF")]
    pub device_id: String,

    /// Topic the command was published on.
    #[schema(example = "esp/commands/booking/AABBCCDDEEFF")]
    pub topic: String,

    /// Literal payload that was published.
    #[schema(example = "book")]
    pub payload: String,
}

impl From<CommandAccepted> for CommandAcceptedResponse {
    fn from(accepted: CommandAccepted) -> Self {
        Self {
            device_id: accepted.device_id.to_string(),
            topic: accepted.topic,
            payload: accepted.payload.to_string(),
        }
    }
}

type Accepted = (StatusCode, Json<CommandAcceptedResponse>);

async fn submit(
    state: &SharedState,
    workflow: Workflow,
    device_id: &str,
    body: &[u8],
) -> ApiResult<Accepted> {
    let command = DeviceCommand::from_body(workflow, body)?;
    let accepted = state.dispatcher().submit(device_id, command).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted.into())))
}

// ============================================================================
// Handlers
// ============================================================================

/// Set a device's lifecycle state.
#[utoipa::path(
    post,
    path = "/v1/devices/{deviceId}/commands/state",
    tag = "commands",
    operation_id = "sendStateCommand",
    summary = "Set device state",
    description = "Administrative override of the lifecycle state. Only `available`, \
        `booked`, `maintained`, and `unavailable` may be requested. A device that has \
        never reported is accepted without a transition check.",
    params(
        ("deviceId" = String, Path, description = "Device hardware address", example = "AA:BB:CC:DD:EE:FF")
    ),
    request_body = StateCommandRequest,
    responses(
        (status = 202, description = "Command published", body = CommandAcceptedResponse),
        (status = 400, description = "Invalid payload or device id", body = ErrorResponse),
        (status = 404, description = "Device not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse),
        (status = 503, description = "Broker unavailable", body = ErrorResponse)
    )
)]
pub async fn send_state_command(
    State(state): State<SharedState>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> ApiResult<Accepted> {
    submit(&state, Workflow::State, &device_id, &body).await
}

/// Start or end a rental.
#[utoipa::path(
    post,
    path = "/v1/devices/{deviceId}/commands/booking",
    tag = "commands",
    operation_id = "sendBookingCommand",
    summary = "Book or release a bike",
    description = "`book` moves the device to `booked`, `release` to `available`. \
        Booking a broken bike fails with `MAINTENANCE_REQUIRED`.",
    params(
        ("deviceId" = String, Path, description = "Device hardware address", example = "AA:BB:CC:DD:EE:FF")
    ),
    request_body = BookingCommandRequest,
    responses(
        (status = 202, description = "Command published", body = CommandAcceptedResponse),
        (status = 400, description = "Invalid payload or device id", body = ErrorResponse),
        (status = 404, description = "Device not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse),
        (status = 503, description = "Broker unavailable", body = ErrorResponse)
    )
)]
pub async fn send_booking_command(
    State(state): State<SharedState>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> ApiResult<Accepted> {
    submit(&state, Workflow::Booking, &device_id, &body).await
}

/// Start or finish maintenance.
#[utoipa::path(
    post,
    path = "/v1/devices/{deviceId}/commands/maintenance",
    tag = "commands",
    operation_id = "sendMaintenanceCommand",
    summary = "Start or complete maintenance",
    description = "`start` moves the device to `maintained`, `complete` to `available`.",
    params(
        ("deviceId" = String, Path, description = "Device hardware address", example = "AA:BB:CC:DD:EE:FF")
    ),
    request_body = MaintenanceCommandRequest,
    responses(
        (status = 202, description = "Command published", body = CommandAcceptedResponse),
        (status = 400, description = "Invalid payload or device id", body = ErrorResponse),
        (status = 404, description = "Device not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse),
        (status = 503, description = "Broker unavailable", body = ErrorResponse)
    )
)]
pub async fn send_maintenance_command(
    State(state): State<SharedState>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> ApiResult<Accepted> {
    submit(&state, Workflow::Maintenance, &device_id, &body).await
}

/// Hold or release a bike for a user.
#[utoipa::path(
    post,
    path = "/v1/devices/{deviceId}/commands/reservation",
    tag = "commands",
    operation_id = "sendReservationCommand",
    summary = "Reserve a bike or cancel a reservation",
    description = "`reserve` moves the device to `reserved`, `cancel` to `available`. \
        Cancelling when the device is not reserved fails with `RESERVATION_NOT_FOUND`.",
    params(
        ("deviceId" = String, Path, description = "Device hardware address", example = "AA:BB:CC:DD:EE:FF")
    ),
    request_body = ReservationCommandRequest,
    responses(
        (status = 202, description = "Command published", body = CommandAcceptedResponse),
        (status = 400, description = "Invalid payload or device id", body = ErrorResponse),
        (status = 404, description = "Device or reservation not found", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse),
        (status = 503, description = "Broker unavailable", body = ErrorResponse)
    )
)]
pub async fn send_reservation_command(
    State(state): State<SharedState>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> ApiResult<Accepted> {
    submit(&state, Workflow::Reservation, &device_id, &body).await
}

/// Ask a device to report its state.
#[utoipa::path(
    post,
    path = "/v1/devices/{deviceId}/commands/status",
    tag = "commands",
    operation_id = "sendStatusCommand",
    summary = "Request a status report",
    description = "Publishes `request` on the device's status command topic. The body is \
        optional and the registry is never consulted, so unknown devices are accepted.",
    params(
        ("deviceId" = String, Path, description = "Device hardware address", example = "AA:BB:CC:DD:EE:FF")
    ),
    request_body(content = StatusCommandRequest, description = "Optional body"),
    responses(
        (status = 202, description = "Command published", body = CommandAcceptedResponse),
        (status = 400, description = "Invalid payload or device id", body = ErrorResponse),
        (status = 503, description = "Broker unavailable", body = ErrorResponse)
    )
)]
pub async fn send_status_command(
    State(state): State<SharedState>,
    Path(device_id): Path<String>,
    body: Bytes,
) -> ApiResult<Accepted> {
    submit(&state, Workflow::Status, &device_id, &body).await
}
