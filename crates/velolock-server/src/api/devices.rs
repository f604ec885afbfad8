//! Device status API endpoints.
//!
//! Read-only views of the registry: what each lock last reported and the
//! lifecycle state that report implies.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use velolock_core::{BusinessError, DeviceId, DeviceRecord, LifecycleState, VelolockError};

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the devices router.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_devices))
        .route("/{deviceId}", get(get_device))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Last known status of one device.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "deviceId": "AABBCCDDEEFF",
    "status": "booked",
    "state": "booked",
    "lastMessage": "State changed to 5",
    "updatedAt": "2025-01-15T03:30:00Z"
}))]
pub struct DeviceStatusResponse {
    /// Normalized device id.
    #[schema(example = "AABBCCDDEEFF")]
    pub device_id: String,

    /// Lifecycle label if known, otherwise the last raw status message.
    #[schema(example = "booked")]
    pub status: String,

    /// Last known lifecycle state.
    #[schema(nullable)]
    pub state: Option<LifecycleState>,

    /// Last message received from the device.
    #[schema(example = "State changed to 5")]
    pub last_message: String,

    /// When the last message was received.
    pub updated_at: DateTime<Utc>,
}

impl DeviceStatusResponse {
    fn from_record(device_id: &DeviceId, record: &DeviceRecord) -> Self {
        Self {
            device_id: device_id.to_string(),
            status: record.status().to_string(),
            state: record.state,
            last_message: record.last_message.clone(),
            updated_at: record.updated_at,
        }
    }
}

/// Every device the server has heard from.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DeviceListResponse {
    /// Devices sorted by id.
    pub items: Vec<DeviceStatusResponse>,
}

// ============================================================================
// Handlers
// ============================================================================

/// List every known device.
#[utoipa::path(
    get,
    path = "/v1/devices",
    tag = "devices",
    operation_id = "listDevices",
    summary = "List known devices",
    description = "Returns the last reported status of every device that has published \
        on a status topic since the server started, sorted by device id.",
    responses(
        (status = 200, description = "Known devices", body = DeviceListResponse)
    )
)]
pub async fn list_devices(State(state): State<SharedState>) -> Json<DeviceListResponse> {
    let registry = state.registry().read().await;

    let items = registry
        .iter()
        .map(|(id, record)| DeviceStatusResponse::from_record(id, record))
        .collect();

    Json(DeviceListResponse { items })
}

/// Get one device's last known status.
#[utoipa::path(
    get,
    path = "/v1/devices/{deviceId}",
    tag = "devices",
    operation_id = "getDevice",
    summary = "Get device status",
    description = "Returns the last status the device reported. The id is normalized \
        before lookup, so `aa:bb:cc:dd:ee:ff` and `AABBCCDDEEFF` name the same device.",
    params(
        ("deviceId" = String, Path, description = "Device hardware address", example = "AA:BB:CC:DD:EE:FF")
    ),
    responses(
        (status = 200, description = "Device status", body = DeviceStatusResponse),
        (status = 400, description = "Device id contains no hex digits", body = crate::api::error::ErrorResponse),
        (status = 404, description = "Device has never reported", body = crate::api::error::ErrorResponse)
    )
)]
pub async fn get_device(
    State(state): State<SharedState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<DeviceStatusResponse>> {
    let device_id = DeviceId::parse(&device_id)?;
    let registry = state.registry().read().await;

    let record = registry.get(&device_id).ok_or_else(|| {
        VelolockError::from(BusinessError::DeviceNotFound {
            device_id: device_id.to_string(),
        })
    })?;

    Ok(Json(DeviceStatusResponse::from_record(&device_id, record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use velolock_core::StatusMessage;

    #[test]
    fn test_device_status_serialization() {
        let id = DeviceId::parse("aabbcc").unwrap();
        let record = DeviceRecord {
            last_message: StatusMessage::Online.to_string(),
            state: None,
            sequence: 3,
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(DeviceStatusResponse::from_record(&id, &record)).unwrap();
        assert_eq!(json["deviceId"], "AABBCC");
        assert_eq!(json["status"], "ESP32 online");
        assert_eq!(json["state"], serde_json::Value::Null);
        assert_eq!(json["lastMessage"], "ESP32 online");
    }
}
