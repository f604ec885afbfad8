//! # velolock-core
//!
//! Device state and command protocol for the velolock bicycle lock fleet.
//!
//! This crate provides:
//! - Broker topic addressing for per-device command and status channels
//! - The closed vocabulary of command and status payloads
//! - The lifecycle state machine that every command is validated against
//! - The firmware state index that folds device reports into lifecycle labels
//! - An in-memory device registry and a per-device serialized dispatcher
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`topics`] - Command and status topic names, MAC normalization
//! - [`payload`] - Command body validators and status message parsing
//! - [`lifecycle`] - The six canonical lifecycle states
//! - [`firmware`] - Firmware state enum and its lifecycle mapping
//! - [`transitions`] - Transition table and validation
//! - [`command`] - Workflow commands and pure command planning
//! - [`device`] - Normalized device identifiers
//! - [`registry`] - Last observed status per device
//! - [`dispatcher`] - Command publishing seam and per-device serialization
//! - [`config`] - Service configuration loading, saving, and validation
//! - [`error`] - Business error taxonomy and the unified error type

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod error;
pub mod firmware;
pub mod lifecycle;
pub mod payload;
pub mod registry;
pub mod topics;
pub mod transitions;

// Re-export primary types for convenience
pub use command::{
    plan_command, BookingCommand, CommandAccepted, DeviceCommand, MaintenanceCommand,
    ReservationCommand, StateCommand, StatusCommand, Workflow,
};
pub use config::{Config, ConfigError, ConfigResult, LoggingConfig, MqttConfig, ServerConfig};
pub use device::DeviceId;
pub use dispatcher::{
    CommandPublisher, Dispatcher, LoggingPublisher, PublishError, PublishedCommand,
    RecordingPublisher,
};
pub use error::{BusinessError, Result, VelolockError};
pub use firmware::{
    firmware_state_to_label, label_at_ordinal, FirmwareState, UnknownFirmwareState,
};
pub use lifecycle::{LifecycleState, UnknownLifecycleState};
pub use payload::{
    BookingStatusMessage, MaintenanceStatusMessage, StatusMessage, ValidationError,
    ValidationIssue,
};
pub use registry::{
    DeviceRecord, DeviceRegistry, IngestOutcome, Report, ReportedState, SharedRegistry,
};
pub use topics::{matches_topic, normalize_mac, topic_with_mac, CommandTopic, StatusTopic};
pub use transitions::{
    rule_for, validate_raw_transition, validate_transition, TransitionRejection, TransitionRule,
};
