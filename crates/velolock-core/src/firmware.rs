//! Firmware state index.
//!
//! Lock controllers run a richer state machine than the fleet cares about.
//! This module maps each of the eight firmware states onto a lifecycle label
//! with a fixed table, and resolves raw ordinals sent in diagnostic status
//! messages (`State changed to 5`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::lifecycle::LifecycleState;

/// Firmware state as reported by the lock controller.
///
/// Declaration order is the firmware's ordinal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum FirmwareState {
    /// Booting.
    #[serde(rename = "STATE_INIT")]
    Init,
    /// Joining the Wi-Fi network.
    #[serde(rename = "STATE_CONNECTING_WIFI")]
    ConnectingWifi,
    /// Connected to the broker, no lifecycle state assigned yet.
    #[serde(rename = "STATE_CONNECTED")]
    Connected,
    /// Controller fault.
    #[serde(rename = "STATE_ERROR")]
    Error,
    /// Idle and unlockable.
    #[serde(rename = "STATE_AVAILABLE")]
    Available,
    /// Unlocked for a rental.
    #[serde(rename = "STATE_BOOKED")]
    Booked,
    /// Locked for maintenance.
    #[serde(rename = "STATE_MAINTAINED")]
    Maintained,
    /// Locked out of service.
    #[serde(rename = "STATE_UNAVAILABLE")]
    Unavailable,
}

/// Error returned when a string is not a firmware state name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown firmware state: '{0}'")]
pub struct UnknownFirmwareState(pub String);

/// Lifecycle label for each firmware state, indexed by ordinal.
const FIRMWARE_STATE_LABELS: [LifecycleState; 8] = [
    LifecycleState::Unavailable, // STATE_INIT
    LifecycleState::Unavailable, // STATE_CONNECTING_WIFI
    LifecycleState::Available,   // STATE_CONNECTED
    LifecycleState::Unavailable, // STATE_ERROR
    LifecycleState::Available,   // STATE_AVAILABLE
    LifecycleState::Booked,      // STATE_BOOKED
    LifecycleState::Maintained,  // STATE_MAINTAINED
    LifecycleState::Unavailable, // STATE_UNAVAILABLE
];

impl FirmwareState {
    /// Every firmware state, in ordinal order.
    pub const ALL: [Self; 8] = [
        Self::Init,
        Self::ConnectingWifi,
        Self::Connected,
        Self::Error,
        Self::Available,
        Self::Booked,
        Self::Maintained,
        Self::Unavailable,
    ];

    /// Returns the firmware's name for this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "STATE_INIT",
            Self::ConnectingWifi => "STATE_CONNECTING_WIFI",
            Self::Connected => "STATE_CONNECTED",
            Self::Error => "STATE_ERROR",
            Self::Available => "STATE_AVAILABLE",
            Self::Booked => "STATE_BOOKED",
            Self::Maintained => "STATE_MAINTAINED",
            Self::Unavailable => "STATE_UNAVAILABLE",
        }
    }

    /// Returns the firmware ordinal.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Returns the state at `ordinal`, if any.
    #[must_use]
    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// Returns the lifecycle label this firmware state maps to.
    #[must_use]
    pub const fn lifecycle_label(self) -> LifecycleState {
        FIRMWARE_STATE_LABELS[self as usize]
    }
}

impl fmt::Display for FirmwareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FirmwareState {
    type Err = UnknownFirmwareState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| UnknownFirmwareState(s.to_string()))
    }
}

/// Maps a firmware state to its lifecycle label.
#[must_use]
pub const fn firmware_state_to_label(state: FirmwareState) -> LifecycleState {
    state.lifecycle_label()
}

/// Resolves a raw firmware ordinal to a lifecycle label.
///
/// Returns `None` when the ordinal is out of range. Callers must treat `None`
/// as "state unknown", never as a particular lifecycle state.
#[must_use]
pub fn label_at_ordinal(ordinal: usize) -> Option<LifecycleState> {
    FIRMWARE_STATE_LABELS.get(ordinal).copied()
}
