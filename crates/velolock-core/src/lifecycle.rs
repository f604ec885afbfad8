//! The six canonical lifecycle states of a fleet device.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle state of a bicycle lock.
///
/// This is the label used by the dashboard, business rules, and the
/// transition table. Firmware reports are folded into it through
/// [`crate::firmware`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Ready to be reserved or rented.
    Available,
    /// Held for a user who has not picked it up yet.
    Reserved,
    /// Rented and in use.
    Booked,
    /// Reported or detected as broken.
    Broken,
    /// Under maintenance.
    Maintained,
    /// Taken out of service.
    Unavailable,
}

/// Error returned when a string is not a lifecycle label.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown lifecycle state: '{0}'")]
pub struct UnknownLifecycleState(pub String);

impl LifecycleState {
    /// Every lifecycle state, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Available,
        Self::Reserved,
        Self::Booked,
        Self::Broken,
        Self::Maintained,
        Self::Unavailable,
    ];

    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved => "reserved",
            Self::Booked => "booked",
            Self::Broken => "broken",
            Self::Maintained => "maintained",
            Self::Unavailable => "unavailable",
        }
    }

    /// Parses a wire label, returning `None` for anything else.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == label)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = UnknownLifecycleState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| UnknownLifecycleState(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for state in LifecycleState::ALL {
            assert_eq!(state.as_str().parse::<LifecycleState>(), Ok(state));
        }
    }

    #[test]
    fn test_unknown_label() {
        let err = "claimed".parse::<LifecycleState>().unwrap_err();
        assert_eq!(err, UnknownLifecycleState("claimed".to_string()));
        assert!(LifecycleState::from_label("Available").is_none());
    }

    #[test]
    fn test_serde_uses_lowercase_labels() {
        let json = serde_json::to_string(&LifecycleState::Maintained).unwrap();
        assert_eq!(json, "\"maintained\"");

        let state: LifecycleState = serde_json::from_str("\"unavailable\"").unwrap();
        assert_eq!(state, LifecycleState::Unavailable);
    }
}
