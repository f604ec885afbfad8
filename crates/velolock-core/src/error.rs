//! Error types for the velolock core library.
//!
//! Two layers:
//!
//! - [`BusinessError`]: the closed taxonomy of protocol failures a client can
//!   act on (`INVALID_STATE_TRANSITION`, `DEVICE_NOT_FOUND`, ...). Each carries
//!   the structured details clients render.
//! - [`VelolockError`]: the unified error for every fallible operation in the
//!   crate, wrapping business errors, payload validation errors, publish
//!   failures, and configuration/I/O failures.
//!
//! Nothing here retries or recovers. Every failure is a typed value that the
//! caller classifies through [`VelolockError::error_code`] and
//! [`VelolockError::http_status_code`].
//!
//! # Example
//!
//! ```rust
//! use velolock_core::error::{BusinessError, VelolockError};
//!
//! let err = VelolockError::from(BusinessError::DeviceNotFound {
//!     device_id: "AABBCC".to_string(),
//! });
//! assert_eq!(err.error_code(), "DEVICE_NOT_FOUND");
//! assert_eq!(err.http_status_code(), 404);
//! ```

use std::path::PathBuf;

use serde_json::{json, Value};
use thiserror::Error;

use crate::dispatcher::PublishError;
use crate::lifecycle::LifecycleState;
use crate::payload::ValidationError;
use crate::transitions::TransitionRejection;

/// Protocol-level failures with machine-readable codes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusinessError {
    /// The requested state is not reachable from the current one.
    #[error("{message}")]
    InvalidStateTransition {
        /// Human-readable summary.
        message: String,
        /// Current state label as observed.
        current_state: String,
        /// Requested state label.
        requested_state: String,
        /// States reachable from the current one.
        allowed_states: Vec<LifecycleState>,
        /// Why the transition is refused.
        reason: String,
    },

    /// The device has never reported to the registry.
    #[error("Device {device_id} not found")]
    DeviceNotFound {
        /// Normalized device id.
        device_id: String,
    },

    /// The device is already in the requested state.
    #[error("Device {device_id} is already in state {current_state}")]
    DeviceAlreadyInState {
        /// Normalized device id.
        device_id: String,
        /// Current state.
        current_state: LifecycleState,
        /// Requested state.
        requested_state: LifecycleState,
    },

    /// A reservation workflow command found no active reservation.
    #[error("No active reservation for device {device_id}")]
    ReservationNotFound {
        /// Normalized device id.
        device_id: String,
        /// Reservation the caller referred to, if any.
        reservation_id: Option<String>,
    },

    /// The device must be maintained before the command can run.
    #[error("Device {device_id} requires maintenance: {issue}")]
    MaintenanceRequired {
        /// Normalized device id.
        device_id: String,
        /// Current state.
        current_state: LifecycleState,
        /// What blocks the command.
        issue: String,
    },
}

impl BusinessError {
    /// Builds the business error for a rejected transition on `device_id`.
    #[must_use]
    pub fn from_rejection(device_id: &str, rejection: TransitionRejection) -> Self {
        match rejection {
            TransitionRejection::AlreadyInState { state } => Self::DeviceAlreadyInState {
                device_id: device_id.to_string(),
                current_state: state,
                requested_state: state,
            },
            TransitionRejection::NotAllowed {
                current_state,
                requested_state,
                allowed_states,
                reason,
            } => Self::InvalidStateTransition {
                message: format!("Cannot transition from {current_state} to {requested_state}"),
                current_state,
                requested_state,
                allowed_states,
                reason: reason.to_string(),
            },
            TransitionRejection::UnknownCurrentState {
                current_state,
                requested_state,
            } => Self::InvalidStateTransition {
                message: format!("Unknown current state: {current_state}"),
                current_state,
                requested_state,
                allowed_states: Vec::new(),
                reason: crate::transitions::UNKNOWN_CURRENT_STATE.to_string(),
            },
        }
    }

    /// Returns the machine-readable error code.
    #[inline]
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            Self::DeviceNotFound { .. } => "DEVICE_NOT_FOUND",
            Self::DeviceAlreadyInState { .. } => "DEVICE_ALREADY_IN_STATE",
            Self::ReservationNotFound { .. } => "RESERVATION_NOT_FOUND",
            Self::MaintenanceRequired { .. } => "MAINTENANCE_REQUIRED",
        }
    }

    /// Returns the HTTP status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::DeviceNotFound { .. } | Self::ReservationNotFound { .. } => 404,
            Self::InvalidStateTransition { .. }
            | Self::DeviceAlreadyInState { .. }
            | Self::MaintenanceRequired { .. } => 409,
        }
    }

    /// Returns the structured details clients consume.
    ///
    /// Pure: the same error always yields the same value.
    #[must_use]
    pub fn details(&self) -> Value {
        match self {
            Self::InvalidStateTransition {
                current_state,
                requested_state,
                allowed_states,
                reason,
                ..
            } => json!({
                "currentState": current_state,
                "requestedState": requested_state,
                "allowedStates": allowed_states,
                "reason": reason,
            }),
            Self::DeviceNotFound { device_id } => json!({ "deviceId": device_id }),
            Self::DeviceAlreadyInState {
                device_id,
                current_state,
                requested_state,
            } => json!({
                "deviceId": device_id,
                "currentState": current_state,
                "requestedState": requested_state,
            }),
            Self::ReservationNotFound {
                device_id,
                reservation_id,
            } => match reservation_id {
                Some(reservation_id) => {
                    json!({ "deviceId": device_id, "reservationId": reservation_id })
                }
                None => json!({ "deviceId": device_id }),
            },
            Self::MaintenanceRequired {
                device_id,
                current_state,
                issue,
            } => json!({
                "deviceId": device_id,
                "currentState": current_state,
                "issue": issue,
            }),
        }
    }
}

/// The unified error type for all velolock operations.
#[derive(Debug, Error)]
pub enum VelolockError {
    // =========================================================================
    // PROTOCOL ERRORS
    // =========================================================================
    /// A command was refused by the protocol rules.
    #[error(transparent)]
    Business(#[from] BusinessError),

    /// A payload did not match its schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The device identifier contains no hex digits.
    #[error("Invalid device identifier: '{0}'")]
    InvalidDeviceIdentifier(String),

    // =========================================================================
    // BROKER ERRORS
    // =========================================================================
    /// The command could not be handed to the broker.
    #[error(transparent)]
    Publish(#[from] PublishError),

    // =========================================================================
    // CONFIGURATION & I/O ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for velolock operations.
pub type Result<T> = std::result::Result<T, VelolockError>;

impl VelolockError {
    /// Returns `true` if this error is a protocol refusal.
    #[inline]
    #[must_use]
    pub const fn is_business_error(&self) -> bool {
        matches!(self, Self::Business(_))
    }

    /// Returns `true` if the request itself was malformed.
    #[inline]
    #[must_use]
    pub const fn is_client_input_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidDeviceIdentifier(_))
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns `true` if retrying later may succeed.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Publish(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Business(err) => err.http_status_code(),

            // 400 Bad Request - malformed input
            Self::Validation(_) | Self::InvalidDeviceIdentifier(_) => 400,

            // 404 Not Found
            Self::ConfigNotFound(_) => 404,

            // 422 Unprocessable Entity - semantic errors
            Self::ConfigParseError(_) | Self::ConfigValidationError(_) => 422,

            // 500 Internal Server Error - server-side issues
            Self::IoError(_) => 500,

            // 503 Service Unavailable - broker unreachable
            Self::Publish(_) => 503,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Business(err) => err.code(),
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidDeviceIdentifier(_) => "INVALID_DEVICE_IDENTIFIER",
            Self::Publish(_) => "BROKER_UNAVAILABLE",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for VelolockError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::ReadError { source, .. } | ConfigError::WriteError { source, .. } => {
                Self::IoError(source)
            }
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transitions::validate_transition;
    use std::io::{Error as IoErr, ErrorKind};

    #[test]
    fn test_business_error_codes() {
        let not_found = BusinessError::DeviceNotFound {
            device_id: "AABB".into(),
        };
        assert_eq!(not_found.code(), "DEVICE_NOT_FOUND");
        assert_eq!(not_found.http_status_code(), 404);

        let maintenance = BusinessError::MaintenanceRequired {
            device_id: "AABB".into(),
            current_state: LifecycleState::Broken,
            issue: "Lock jammed".into(),
        };
        assert_eq!(maintenance.code(), "MAINTENANCE_REQUIRED");
        assert_eq!(maintenance.http_status_code(), 409);
    }

    #[test]
    fn test_invalid_transition_details() {
        let rejection =
            validate_transition(LifecycleState::Booked, LifecycleState::Reserved).unwrap_err();
        let err = BusinessError::from_rejection("AABB", rejection);

        assert_eq!(err.code(), "INVALID_STATE_TRANSITION");
        assert_eq!(err.to_string(), "Cannot transition from booked to reserved");
        assert_eq!(
            err.details(),
            json!({
                "currentState": "booked",
                "requestedState": "reserved",
                "allowedStates": ["available", "broken", "maintained", "unavailable"],
                "reason": "Transition not allowed",
            })
        );
    }

    #[test]
    fn test_already_in_state_details_have_no_allowed_list() {
        let rejection =
            validate_transition(LifecycleState::Booked, LifecycleState::Booked).unwrap_err();
        let err = BusinessError::from_rejection("AABB", rejection);

        assert_eq!(err.code(), "DEVICE_ALREADY_IN_STATE");
        assert_eq!(
            err.details(),
            json!({
                "deviceId": "AABB",
                "currentState": "booked",
                "requestedState": "booked",
            })
        );
    }

    #[test]
    fn test_details_are_idempotent() {
        for state in LifecycleState::ALL {
            let first = BusinessError::from_rejection(
                "AABB",
                validate_transition(state, state).unwrap_err(),
            );
            let second = BusinessError::from_rejection(
                "AABB",
                validate_transition(state, state).unwrap_err(),
            );
            assert_eq!(
                serde_json::to_vec(&first.details()).unwrap(),
                serde_json::to_vec(&second.details()).unwrap()
            );
        }
    }

    #[test]
    fn test_reservation_not_found_optional_id() {
        let without = BusinessError::ReservationNotFound {
            device_id: "AABB".into(),
            reservation_id: None,
        };
        assert_eq!(without.details(), json!({ "deviceId": "AABB" }));

        let with = BusinessError::ReservationNotFound {
            device_id: "AABB".into(),
            reservation_id: Some("r-1".into()),
        };
        assert_eq!(
            with.details(),
            json!({ "deviceId": "AABB", "reservationId": "r-1" })
        );
    }

    #[test]
    fn test_unified_classification() {
        let err = VelolockError::InvalidDeviceIdentifier("zz".into());
        assert!(err.is_client_input_error());
        assert_eq!(err.http_status_code(), 400);
        assert_eq!(err.error_code(), "INVALID_DEVICE_IDENTIFIER");

        let err = VelolockError::from(PublishError::Disconnected("broker down".into()));
        assert!(err.is_recoverable());
        assert_eq!(err.http_status_code(), 503);

        let err = VelolockError::ConfigValidationError("port: must be > 0".into());
        assert!(err.is_config_error());
        assert_eq!(err.http_status_code(), 422);
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoErr::new(ErrorKind::NotFound, "file not found");
        let err: VelolockError = io_err.into();
        assert!(matches!(err, VelolockError::IoError(_)));
        assert_eq!(err.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VelolockError>();
        assert_sync::<VelolockError>();
    }
}
