//! Payload schemas for commands and device status messages.
//!
//! Command bodies are validated field by field so that a failure can name the
//! path, the received value, and the accepted vocabulary. Status messages are
//! the reverse direction: strings a device publishes, parsed into a closed
//! set of shapes and folded into lifecycle labels.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::firmware::label_at_ordinal;
use crate::lifecycle::LifecycleState;

/// Path reported for failures of the body as a whole.
pub const BODY_PATH: &str = "body";

/// Status a device publishes once it has joined the broker.
pub const ONLINE_MESSAGE: &str = "ESP32 online";

static STATE_CHANGED_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^State changed to ([0-9]+)$").expect("valid regex"));

static CURRENT_STATE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Current state: ([0-9]+)$").expect("valid regex"));

// =============================================================================
// Validation errors
// =============================================================================

/// One schema violation.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Field path, or `body` for the payload as a whole.
    pub path: String,
    /// Human-readable description.
    pub message: String,
    /// Machine-readable issue code (`invalid_json`, `invalid_type`, `invalid_enum_value`).
    pub code: String,
    /// Accepted values or types.
    pub expected: Vec<String>,
    /// The value that was received, `null` when absent.
    #[schema(value_type = Object)]
    pub received: Value,
}

impl ValidationIssue {
    /// The body is not valid JSON.
    #[must_use]
    pub fn invalid_json(detail: impl fmt::Display) -> Self {
        Self {
            path: BODY_PATH.to_string(),
            message: format!("Malformed JSON: {detail}"),
            code: "invalid_json".to_string(),
            expected: vec!["object".to_string()],
            received: Value::Null,
        }
    }

    /// The body is JSON but not an object.
    #[must_use]
    pub fn body_not_object(received: &Value) -> Self {
        Self {
            path: BODY_PATH.to_string(),
            message: format!("Expected object, received {}", json_type(received)),
            code: "invalid_type".to_string(),
            expected: vec!["object".to_string()],
            received: received.clone(),
        }
    }

    /// A required field is absent.
    #[must_use]
    pub fn required(path: &str, expected: &[&str]) -> Self {
        Self {
            path: path.to_string(),
            message: "Required".to_string(),
            code: "invalid_type".to_string(),
            expected: expected.iter().map(ToString::to_string).collect(),
            received: Value::Null,
        }
    }

    /// A field holds a value of the wrong JSON type.
    #[must_use]
    pub fn wrong_type(path: &str, expected: &[&str], received: &Value) -> Self {
        Self {
            path: path.to_string(),
            message: format!("Expected string, received {}", json_type(received)),
            code: "invalid_type".to_string(),
            expected: expected.iter().map(ToString::to_string).collect(),
            received: received.clone(),
        }
    }

    /// A field holds a string outside the accepted vocabulary.
    #[must_use]
    pub fn not_one_of(path: &str, expected: &[&str], received: &str) -> Self {
        let options: Vec<String> = expected.iter().map(|v| format!("\"{v}\"")).collect();
        Self {
            path: path.to_string(),
            message: format!("Invalid option: expected one of {}", options.join("|")),
            code: "invalid_enum_value".to_string(),
            expected: expected.iter().map(ToString::to_string).collect(),
            received: Value::String(received.to_string()),
        }
    }
}

/// A payload failed its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Every violation found, in field order.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    /// Wraps a single issue.
    #[must_use]
    pub fn single(issue: ValidationIssue) -> Self {
        Self {
            issues: vec![issue],
        }
    }
}

impl From<ValidationIssue> for ValidationError {
    fn from(issue: ValidationIssue) -> Self {
        Self::single(issue)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Invalid payload")?;
        for issue in &self.issues {
            write!(f, "; {}: {}", issue.path, issue.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Command bodies
// =============================================================================

/// A closed vocabulary of command verbs carried in one body field.
pub trait CommandVerb: Copy + Sized + 'static {
    /// Every accepted verb, in documentation order.
    const VARIANTS: &'static [Self];

    /// Returns the wire form of the verb.
    fn as_str(self) -> &'static str;

    /// Parses a wire verb.
    fn from_verb(verb: &str) -> Option<Self> {
        Self::VARIANTS.iter().copied().find(|v| v.as_str() == verb)
    }

    /// Wire forms of every accepted verb.
    fn labels() -> Vec<&'static str> {
        Self::VARIANTS.iter().map(|v| v.as_str()).collect()
    }
}

/// Decodes a request body into a JSON object.
///
/// An empty or whitespace-only body is an empty object.
///
/// # Errors
///
/// Returns a [`ValidationError`] at path `body` for malformed JSON or a
/// non-object document.
pub fn decode_body(raw: &[u8]) -> Result<Map<String, Value>, ValidationError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(Map::new());
    }

    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ValidationIssue::body_not_object(&other).into()),
        Err(e) => Err(ValidationIssue::invalid_json(e).into()),
    }
}

/// Reads an optional verb field. `null` counts as absent.
///
/// # Errors
///
/// Returns a [`ValidationError`] when the field holds a non-string or a
/// string outside `V`'s vocabulary.
pub fn optional_verb<V: CommandVerb>(
    body: &Map<String, Value>,
    field: &str,
) -> Result<Option<V>, ValidationError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => V::from_verb(raw)
            .map(Some)
            .ok_or_else(|| ValidationIssue::not_one_of(field, &V::labels(), raw).into()),
        Some(other) => Err(ValidationIssue::wrong_type(field, &V::labels(), other).into()),
    }
}

/// Reads a required verb field.
///
/// # Errors
///
/// As [`optional_verb`], plus a `Required` issue when the field is absent.
pub fn required_verb<V: CommandVerb>(
    body: &Map<String, Value>,
    field: &str,
) -> Result<V, ValidationError> {
    optional_verb(body, field)?
        .ok_or_else(|| ValidationIssue::required(field, &V::labels()).into())
}

// =============================================================================
// Device status messages
// =============================================================================

/// A message published on `esp/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMessage {
    /// `ESP32 online`
    Online,
    /// A lifecycle label.
    Lifecycle(LifecycleState),
    /// `State changed to <digits>`, the digits as sent.
    StateChanged(String),
    /// `Current state: <digits>`, the digits as sent.
    CurrentState(String),
}

impl StatusMessage {
    /// Parses a trimmed status payload.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] at path `status` for anything outside the
    /// vocabulary.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let message = raw.trim();

        if message == ONLINE_MESSAGE {
            return Ok(Self::Online);
        }
        if let Some(state) = LifecycleState::from_label(message) {
            return Ok(Self::Lifecycle(state));
        }
        if let Some(caps) = STATE_CHANGED_PATTERN.captures(message) {
            return Ok(Self::StateChanged(caps[1].to_string()));
        }
        if let Some(caps) = CURRENT_STATE_PATTERN.captures(message) {
            return Ok(Self::CurrentState(caps[1].to_string()));
        }

        let mut expected = vec![ONLINE_MESSAGE];
        expected.extend(LifecycleState::ALL.iter().map(|s| s.as_str()));
        expected.extend(["State changed to <n>", "Current state: <n>"]);
        Err(ValidationIssue::not_one_of("status", &expected, message).into())
    }

    /// Returns `false` for messages that say nothing about the lifecycle.
    #[must_use]
    pub const fn carries_state(&self) -> bool {
        !matches!(self, Self::Online)
    }

    /// Folds the message into a lifecycle label.
    ///
    /// Diagnostic templates are resolved through the firmware ordinal table;
    /// an out-of-range ordinal yields `None`.
    #[must_use]
    pub fn lifecycle_label(&self) -> Option<LifecycleState> {
        match self {
            Self::Online => None,
            Self::Lifecycle(state) => Some(*state),
            Self::StateChanged(digits) | Self::CurrentState(digits) => {
                digits.parse::<usize>().ok().and_then(label_at_ordinal)
            }
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Online => f.write_str(ONLINE_MESSAGE),
            Self::Lifecycle(state) => f.write_str(state.as_str()),
            Self::StateChanged(digits) => write!(f, "State changed to {digits}"),
            Self::CurrentState(digits) => write!(f, "Current state: {digits}"),
        }
    }
}

/// A message published on `esp/booking/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingStatusMessage {
    /// The lock opened for a rental.
    Booked,
    /// The lock closed after a rental.
    Available,
}

impl BookingStatusMessage {
    /// Parses a trimmed booking status payload.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for anything but `booked` or `available`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim() {
            "booked" => Ok(Self::Booked),
            "available" => Ok(Self::Available),
            other => Err(
                ValidationIssue::not_one_of("status", &["booked", "available"], other).into(),
            ),
        }
    }

    /// The lifecycle label the message reports.
    #[must_use]
    pub const fn lifecycle_label(self) -> LifecycleState {
        match self {
            Self::Booked => LifecycleState::Booked,
            Self::Available => LifecycleState::Available,
        }
    }
}

/// A message published on `esp/maintenance/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceStatusMessage {
    /// Maintenance started.
    InProgress,
    /// Maintenance finished.
    Completed,
}

impl MaintenanceStatusMessage {
    /// Parses a trimmed maintenance status payload.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for anything but `in_progress` or `completed`.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        match raw.trim() {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(ValidationIssue::not_one_of(
                "status",
                &["in_progress", "completed"],
                other,
            )
            .into()),
        }
    }

    /// The lifecycle label the message reports.
    #[must_use]
    pub const fn lifecycle_label(self) -> LifecycleState {
        match self {
            Self::InProgress => LifecycleState::Maintained,
            Self::Completed => LifecycleState::Available,
        }
    }
}
