//! Workflow commands and command planning.
//!
//! A command travels through two independent checks. Schema validation
//! ([`DeviceCommand::from_body`]) decides whether the request is well formed;
//! planning ([`plan_command`]) decides whether it is legal for the device's
//! current state. Each has its own error type and HTTP mapping.
//!
//! Planning is pure: it reads a registry snapshot and returns the topic and
//! payload to publish. Publishing and per-device serialization live in
//! [`crate::dispatcher`].

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::device::DeviceId;
use crate::error::{BusinessError, VelolockError};
use crate::lifecycle::LifecycleState;
use crate::payload::{decode_body, optional_verb, required_verb, CommandVerb, ValidationError};
use crate::registry::DeviceRecord;
use crate::topics::CommandTopic;
use crate::transitions::{validate_raw_transition, validate_transition};

// =============================================================================
// Workflows
// =============================================================================

/// The five command workflows a device accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    /// Administrative state override.
    State,
    /// Rental start and end.
    Booking,
    /// Maintenance start and end.
    Maintenance,
    /// Reservation hold and release.
    Reservation,
    /// Ask the device to report its state.
    Status,
}

impl Workflow {
    /// Every workflow.
    pub const ALL: [Self; 5] = [
        Self::State,
        Self::Booking,
        Self::Maintenance,
        Self::Reservation,
        Self::Status,
    ];

    /// Returns the workflow name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Booking => "booking",
            Self::Maintenance => "maintenance",
            Self::Reservation => "reservation",
            Self::Status => "status",
        }
    }

    /// Returns the command topic this workflow publishes on.
    #[must_use]
    pub const fn command_topic(self) -> CommandTopic {
        match self {
            Self::State => CommandTopic::State,
            Self::Booking => CommandTopic::Booking,
            Self::Maintenance => CommandTopic::Maintenance,
            Self::Reservation => CommandTopic::Reservation,
            Self::Status => CommandTopic::Status,
        }
    }

    /// Returns the body field carrying the verb.
    #[must_use]
    pub const fn body_field(self) -> &'static str {
        match self {
            Self::State => "state",
            _ => "command",
        }
    }
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Verbs
// =============================================================================

/// Target of an administrative state command.
///
/// `reserved` and `broken` are deliberately absent: reservations go through
/// their own workflow and breakage is only ever reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StateCommand {
    /// `available`
    Available,
    /// `booked`
    Booked,
    /// `maintained`
    Maintained,
    /// `unavailable`
    Unavailable,
}

impl StateCommand {
    /// The lifecycle state this command requests.
    #[must_use]
    pub const fn target(self) -> LifecycleState {
        match self {
            Self::Available => LifecycleState::Available,
            Self::Booked => LifecycleState::Booked,
            Self::Maintained => LifecycleState::Maintained,
            Self::Unavailable => LifecycleState::Unavailable,
        }
    }
}

impl CommandVerb for StateCommand {
    const VARIANTS: &'static [Self] = &[
        Self::Available,
        Self::Booked,
        Self::Maintained,
        Self::Unavailable,
    ];

    fn as_str(self) -> &'static str {
        self.target().as_str()
    }
}

/// Booking workflow verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum BookingCommand {
    /// Unlock for a rental.
    Book,
    /// End the rental.
    Release,
}

impl CommandVerb for BookingCommand {
    const VARIANTS: &'static [Self] = &[Self::Book, Self::Release];

    fn as_str(self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Release => "release",
        }
    }
}

/// Maintenance workflow verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceCommand {
    /// Take the bike in for maintenance.
    Start,
    /// Return the bike to service.
    Complete,
}

impl CommandVerb for MaintenanceCommand {
    const VARIANTS: &'static [Self] = &[Self::Start, Self::Complete];

    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
        }
    }
}

/// Reservation workflow verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReservationCommand {
    /// Hold the bike for a user.
    Reserve,
    /// Release the hold.
    Cancel,
}

impl CommandVerb for ReservationCommand {
    const VARIANTS: &'static [Self] = &[Self::Reserve, Self::Cancel];

    fn as_str(self) -> &'static str {
        match self {
            Self::Reserve => "reserve",
            Self::Cancel => "cancel",
        }
    }
}

/// Status workflow verb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatusCommand {
    /// Ask for a status report.
    #[default]
    Request,
}

impl CommandVerb for StatusCommand {
    const VARIANTS: &'static [Self] = &[Self::Request];

    fn as_str(self) -> &'static str {
        "request"
    }
}

// =============================================================================
// Commands
// =============================================================================

/// A validated command for one workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceCommand {
    /// Administrative state override.
    State(StateCommand),
    /// Booking workflow.
    Booking(BookingCommand),
    /// Maintenance workflow.
    Maintenance(MaintenanceCommand),
    /// Reservation workflow.
    Reservation(ReservationCommand),
    /// Status request.
    Status(StatusCommand),
}

impl DeviceCommand {
    /// Validates a raw request body for `workflow`.
    ///
    /// The status workflow accepts an empty body and defaults to `request`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing every schema violation.
    pub fn from_body(workflow: Workflow, raw: &[u8]) -> Result<Self, ValidationError> {
        let body = decode_body(raw)?;
        let field = workflow.body_field();

        Ok(match workflow {
            Workflow::State => Self::State(required_verb(&body, field)?),
            Workflow::Booking => Self::Booking(required_verb(&body, field)?),
            Workflow::Maintenance => Self::Maintenance(required_verb(&body, field)?),
            Workflow::Reservation => Self::Reservation(required_verb(&body, field)?),
            Workflow::Status => Self::Status(optional_verb(&body, field)?.unwrap_or_default()),
        })
    }

    /// Returns the workflow this command belongs to.
    #[must_use]
    pub const fn workflow(self) -> Workflow {
        match self {
            Self::State(_) => Workflow::State,
            Self::Booking(_) => Workflow::Booking,
            Self::Maintenance(_) => Workflow::Maintenance,
            Self::Reservation(_) => Workflow::Reservation,
            Self::Status(_) => Workflow::Status,
        }
    }

    /// Returns the literal payload published to the device.
    #[must_use]
    pub fn payload(self) -> &'static str {
        match self {
            Self::State(verb) => verb.as_str(),
            Self::Booking(verb) => verb.as_str(),
            Self::Maintenance(verb) => verb.as_str(),
            Self::Reservation(verb) => verb.as_str(),
            Self::Status(verb) => verb.as_str(),
        }
    }

    /// Returns the lifecycle state the command moves the device to, if any.
    #[must_use]
    pub const fn target_state(self) -> Option<LifecycleState> {
        match self {
            Self::State(verb) => Some(verb.target()),
            Self::Booking(BookingCommand::Book) => Some(LifecycleState::Booked),
            Self::Reservation(ReservationCommand::Reserve) => Some(LifecycleState::Reserved),
            Self::Maintenance(MaintenanceCommand::Start) => Some(LifecycleState::Maintained),
            Self::Booking(BookingCommand::Release)
            | Self::Reservation(ReservationCommand::Cancel)
            | Self::Maintenance(MaintenanceCommand::Complete) => Some(LifecycleState::Available),
            Self::Status(_) => None,
        }
    }

    const fn needs_working_lock(self) -> bool {
        matches!(
            self,
            Self::Booking(BookingCommand::Book) | Self::Reservation(ReservationCommand::Reserve)
        )
    }
}

/// A command that passed every check and is ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAccepted {
    /// Normalized device id.
    pub device_id: DeviceId,
    /// Device-scoped command topic.
    pub topic: String,
    /// Literal payload.
    pub payload: &'static str,
    /// Transition reason, when the command changed lifecycle state.
    pub reason: Option<&'static str>,
}

/// Decides whether `command` may be sent to `device_id`.
///
/// `record` is the registry's current view of the device, `None` if it never
/// reported. Status requests never consult it. An administrative state
/// command to an unknown device is accepted unchecked; every other
/// state-changing command requires a known device.
///
/// # Errors
///
/// Returns [`VelolockError::Business`] with one of `DEVICE_NOT_FOUND`,
/// `MAINTENANCE_REQUIRED`, `DEVICE_ALREADY_IN_STATE`,
/// `INVALID_STATE_TRANSITION`, or `RESERVATION_NOT_FOUND`.
pub fn plan_command(
    device_id: &DeviceId,
    record: Option<&DeviceRecord>,
    command: DeviceCommand,
) -> Result<CommandAccepted, VelolockError> {
    let accepted = |reason| CommandAccepted {
        device_id: device_id.clone(),
        topic: command
            .workflow()
            .command_topic()
            .for_device(Some(device_id.as_str())),
        payload: command.payload(),
        reason,
    };

    let Some(target) = command.target_state() else {
        return Ok(accepted(None));
    };

    let Some(record) = record else {
        if matches!(command, DeviceCommand::State(_)) {
            return Ok(accepted(None));
        }
        return Err(BusinessError::DeviceNotFound {
            device_id: device_id.to_string(),
        }
        .into());
    };

    let reason = match record.state {
        Some(current) => {
            if current == LifecycleState::Broken && command.needs_working_lock() {
                return Err(BusinessError::MaintenanceRequired {
                    device_id: device_id.to_string(),
                    current_state: current,
                    issue: "Device is broken and must be maintained first".to_string(),
                }
                .into());
            }

            let reason = validate_transition(current, target)
                .map_err(|rejection| BusinessError::from_rejection(device_id.as_str(), rejection))?;

            if command == DeviceCommand::Reservation(ReservationCommand::Cancel)
                && current != LifecycleState::Reserved
            {
                return Err(BusinessError::ReservationNotFound {
                    device_id: device_id.to_string(),
                    reservation_id: None,
                }
                .into());
            }

            reason
        }
        None => validate_raw_transition(&record.last_message, target.as_str())
            .map_err(|rejection| BusinessError::from_rejection(device_id.as_str(), rejection))?,
    };

    Ok(accepted(Some(reason)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::StatusMessage;
    use chrono::Utc;

    fn device() -> DeviceId {
        DeviceId::parse("aa:bb:cc:dd:ee:ff").unwrap()
    }

    fn record(message: StatusMessage) -> DeviceRecord {
        DeviceRecord {
            last_message: message.to_string(),
            state: message.lifecycle_label(),
            sequence: 1,
            updated_at: Utc::now(),
        }
    }

    fn in_state(state: LifecycleState) -> DeviceRecord {
        record(StatusMessage::Lifecycle(state))
    }

    fn business_code(err: &VelolockError) -> &'static str {
        match err {
            VelolockError::Business(e) => e.code(),
            other => panic!("expected business error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_body_per_workflow() {
        assert_eq!(
            DeviceCommand::from_body(Workflow::State, br#"{"state":"maintained"}"#),
            Ok(DeviceCommand::State(StateCommand::Maintained))
        );
        assert_eq!(
            DeviceCommand::from_body(Workflow::Booking, br#"{"command":"release"}"#),
            Ok(DeviceCommand::Booking(BookingCommand::Release))
        );
        assert_eq!(
            DeviceCommand::from_body(Workflow::Reservation, br#"{"command":"cancel"}"#),
            Ok(DeviceCommand::Reservation(ReservationCommand::Cancel))
        );
    }

    #[test]
    fn test_state_command_rejects_reserved_and_broken() {
        for label in ["reserved", "broken"] {
            let body = format!(r#"{{"state":"{label}"}}"#);
            let err = DeviceCommand::from_body(Workflow::State, body.as_bytes()).unwrap_err();
            assert_eq!(err.issues[0].path, "state");
            assert_eq!(
                err.issues[0].expected,
                vec!["available", "booked", "maintained", "unavailable"]
            );
        }
    }

    #[test]
    fn test_status_body_defaults_to_request() {
        let bodies: [&[u8]; 3] = [b"", b"{}", br#"{"command":"request"}"#];
        for body in bodies {
            assert_eq!(
                DeviceCommand::from_body(Workflow::Status, body),
                Ok(DeviceCommand::Status(StatusCommand::Request))
            );
        }
        assert!(DeviceCommand::from_body(Workflow::Status, br#"{"command":"reboot"}"#).is_err());
    }

    #[test]
    fn test_booking_requires_command() {
        let err = DeviceCommand::from_body(Workflow::Booking, b"{}").unwrap_err();
        assert_eq!(err.issues[0].path, "command");
        assert_eq!(err.issues[0].message, "Required");
    }

    #[test]
    fn test_target_mapping() {
        use LifecycleState::{Available, Booked, Maintained, Reserved};
        let cases = [
            (DeviceCommand::Booking(BookingCommand::Book), Some(Booked)),
            (DeviceCommand::Booking(BookingCommand::Release), Some(Available)),
            (DeviceCommand::Reservation(ReservationCommand::Reserve), Some(Reserved)),
            (DeviceCommand::Reservation(ReservationCommand::Cancel), Some(Available)),
            (DeviceCommand::Maintenance(MaintenanceCommand::Start), Some(Maintained)),
            (DeviceCommand::Maintenance(MaintenanceCommand::Complete), Some(Available)),
            (DeviceCommand::State(StateCommand::Booked), Some(Booked)),
            (DeviceCommand::Status(StatusCommand::Request), None),
        ];
        for (command, target) in cases {
            assert_eq!(command.target_state(), target, "{command:?}");
        }
    }

    #[test]
    fn test_book_available_device() {
        let accepted = plan_command(
            &device(),
            Some(&in_state(LifecycleState::Available)),
            DeviceCommand::Booking(BookingCommand::Book),
        )
        .unwrap();

        assert_eq!(accepted.topic, "esp/commands/booking/AABBCCDDEEFF");
        assert_eq!(accepted.payload, "book");
        assert_eq!(accepted.reason, Some("Bike rented directly"));
    }

    #[test]
    fn test_reserve_booked_device_is_invalid_transition() {
        let err = plan_command(
            &device(),
            Some(&in_state(LifecycleState::Booked)),
            DeviceCommand::Reservation(ReservationCommand::Reserve),
        )
        .unwrap_err();
        assert_eq!(business_code(&err), "INVALID_STATE_TRANSITION");
        assert_eq!(err.http_status_code(), 409);
    }

    #[test]
    fn test_already_in_state() {
        let err = plan_command(
            &device(),
            Some(&in_state(LifecycleState::Maintained)),
            DeviceCommand::Maintenance(MaintenanceCommand::Start),
        )
        .unwrap_err();
        assert_eq!(business_code(&err), "DEVICE_ALREADY_IN_STATE");
    }

    #[test]
    fn test_unknown_device() {
        let err = plan_command(
            &device(),
            None,
            DeviceCommand::Booking(BookingCommand::Book),
        )
        .unwrap_err();
        assert_eq!(business_code(&err), "DEVICE_NOT_FOUND");
        assert_eq!(err.http_status_code(), 404);
    }

    #[test]
    fn test_state_command_to_unknown_device_is_unchecked() {
        let accepted = plan_command(
            &device(),
            None,
            DeviceCommand::State(StateCommand::Available),
        )
        .unwrap();
        assert_eq!(accepted.topic, "esp/commands/state/AABBCCDDEEFF");
        assert_eq!(accepted.payload, "available");
        assert_eq!(accepted.reason, None);
    }

    #[test]
    fn test_status_never_consults_registry() {
        let accepted = plan_command(
            &device(),
            None,
            DeviceCommand::Status(StatusCommand::Request),
        )
        .unwrap();
        assert_eq!(accepted.topic, "esp/commands/status/AABBCCDDEEFF");
        assert_eq!(accepted.payload, "request");
    }

    #[test]
    fn test_broken_device_requires_maintenance() {
        for command in [
            DeviceCommand::Booking(BookingCommand::Book),
            DeviceCommand::Reservation(ReservationCommand::Reserve),
        ] {
            let err = plan_command(&device(), Some(&in_state(LifecycleState::Broken)), command)
                .unwrap_err();
            assert_eq!(business_code(&err), "MAINTENANCE_REQUIRED");
        }

        // Maintenance itself goes through.
        assert!(plan_command(
            &device(),
            Some(&in_state(LifecycleState::Broken)),
            DeviceCommand::Maintenance(MaintenanceCommand::Start),
        )
        .is_ok());
    }

    #[test]
    fn test_cancel_without_reservation() {
        let err = plan_command(
            &device(),
            Some(&in_state(LifecycleState::Booked)),
            DeviceCommand::Reservation(ReservationCommand::Cancel),
        )
        .unwrap_err();
        assert_eq!(business_code(&err), "RESERVATION_NOT_FOUND");
        assert_eq!(err.http_status_code(), 404);

        let accepted = plan_command(
            &device(),
            Some(&in_state(LifecycleState::Reserved)),
            DeviceCommand::Reservation(ReservationCommand::Cancel),
        )
        .unwrap();
        assert_eq!(accepted.reason, Some("Reservation cancelled"));
    }

    #[test]
    fn test_device_without_lifecycle_state() {
        let err = plan_command(
            &device(),
            Some(&record(StatusMessage::Online)),
            DeviceCommand::Booking(BookingCommand::Book),
        )
        .unwrap_err();

        match err {
            VelolockError::Business(e @ BusinessError::InvalidStateTransition { .. }) => {
                assert_eq!(e.to_string(), "Unknown current state: ESP32 online");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_planning_is_deterministic() {
        let record = in_state(LifecycleState::Available);
        let command = DeviceCommand::Reservation(ReservationCommand::Reserve);
        assert_eq!(
            plan_command(&device(), Some(&record), command).unwrap(),
            plan_command(&device(), Some(&record), command).unwrap()
        );
    }
}
