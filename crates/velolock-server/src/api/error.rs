//! API error types and response handling.
//!
//! Every handler failure becomes an [`ApiError`], which renders as
//! `{error, message, details}` with the matching HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use velolock_core::VelolockError;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Malformed payload or device id.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Structured details.
        details: Option<Value>,
    },

    /// 404 Not Found - Device or reservation does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Structured details.
        details: Option<Value>,
    },

    /// 409 Conflict - Command is illegal in the device's current state.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Structured details.
        details: Option<Value>,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details.
        details: Option<Value>,
    },

    /// 503 Service Unavailable - The broker cannot take the command.
    ServiceUnavailable {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details.
        details: Option<Value>,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "INVALID_STATE_TRANSITION",
    "message": "Cannot transition from booked to reserved",
    "details": {
        "currentState": "booked",
        "requestedState": "reserved",
        "allowedStates": ["available", "broken", "maintained", "unavailable"],
        "reason": "Transition not allowed"
    }
}))]
pub struct ErrorResponse {
    /// Machine-readable error code.
    #[schema(example = "DEVICE_NOT_FOUND")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "Device AABBCCDDEEFF not found")]
    pub message: String,

    /// Structured details. `issues` for validation errors.
    #[schema(nullable)]
    pub details: Option<Value>,
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (Self::BadRequest {
            error_code,
            message,
            details,
        }
        | Self::NotFound {
            error_code,
            message,
            details,
        }
        | Self::Conflict {
            error_code,
            message,
            details,
        }
        | Self::InternalError {
            error_code,
            message,
            details,
        }
        | Self::ServiceUnavailable {
            error_code,
            message,
            details,
        }) = self;

        if status.is_server_error() {
            tracing::error!(
                error_code = %error_code,
                message = %message,
                details = ?details,
                "Request failed"
            );
        }

        let body = ErrorResponse {
            error: error_code,
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::InternalError { message, .. } => write!(f, "Internal Error: {message}"),
            Self::ServiceUnavailable { message, .. } => {
                write!(f, "Service Unavailable: {message}")
            }
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from velolock_core errors.
impl From<VelolockError> for ApiError {
    fn from(err: VelolockError) -> Self {
        let error_code = err.error_code().to_string();

        let (message, details) = match &err {
            VelolockError::Business(business) => (business.to_string(), Some(business.details())),
            VelolockError::Validation(validation) => (
                "Request validation failed".to_string(),
                Some(json!({ "issues": validation.issues })),
            ),
            VelolockError::InvalidDeviceIdentifier(raw) => {
                (err.to_string(), Some(json!({ "deviceId": raw })))
            }
            _ => (err.to_string(), None),
        };

        match err.http_status_code() {
            400 => Self::BadRequest {
                error_code,
                message,
                details,
            },
            404 => Self::NotFound {
                error_code,
                message,
                details,
            },
            409 => Self::Conflict {
                error_code,
                message,
                details,
            },
            503 => Self::ServiceUnavailable {
                error_code,
                message,
                details,
            },
            _ => Self::InternalError {
                error_code,
                message,
                details,
            },
        }
    }
}

impl From<velolock_core::ValidationError> for ApiError {
    fn from(err: velolock_core::ValidationError) -> Self {
        Self::from(VelolockError::from(err))
    }
}
