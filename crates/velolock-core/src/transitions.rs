//! Lifecycle transition table and validation.
//!
//! Every state-changing command is checked here before it is forwarded to a
//! device. The table is keyed by [`LifecycleState`] through an exhaustive
//! `match`, so adding a state without a rule does not compile.
//!
//! ```text
//! available   -> reserved, booked, broken, maintained, unavailable
//! reserved    -> available, booked
//! booked      -> available, broken, maintained, unavailable
//! broken      -> maintained, unavailable
//! maintained  -> available, unavailable
//! unavailable -> available, maintained
//! ```

use crate::lifecycle::LifecycleState;

/// Reason reported when a destination has no registered reason.
pub const TRANSITION_NOT_ALLOWED: &str = "Transition not allowed";

/// Reason reported when the current state is not a lifecycle label.
pub const UNKNOWN_CURRENT_STATE: &str = "Current state is not recognized";

/// Allowed destinations from one lifecycle state.
#[derive(Debug)]
pub struct TransitionRule {
    /// Source state.
    pub from: LifecycleState,
    edges: &'static [(LifecycleState, &'static str)],
}

impl TransitionRule {
    /// Returns the allowed destinations, in table order.
    #[must_use]
    pub fn allowed(&self) -> Vec<LifecycleState> {
        self.edges.iter().map(|(to, _)| *to).collect()
    }

    /// Returns `true` if `to` is a direct destination.
    #[must_use]
    pub fn allows(&self, to: LifecycleState) -> bool {
        self.edges.iter().any(|(dest, _)| *dest == to)
    }

    /// Returns the reason registered for `to`, if any.
    #[must_use]
    pub fn reason_for(&self, to: LifecycleState) -> Option<&'static str> {
        self.edges
            .iter()
            .find(|(dest, _)| *dest == to)
            .map(|(_, reason)| *reason)
    }

    /// Iterates `(destination, reason)` pairs.
    pub fn edges(&self) -> impl Iterator<Item = (LifecycleState, &'static str)> + '_ {
        self.edges.iter().copied()
    }
}

use LifecycleState::{Available, Booked, Broken, Maintained, Reserved, Unavailable};

static FROM_AVAILABLE: TransitionRule = TransitionRule {
    from: Available,
    edges: &[
        (Reserved, "Bike reserved by user"),
        (Booked, "Bike rented directly"),
        (Broken, "Issue detected when available"),
        (Maintained, "Scheduled maintenance"),
        (Unavailable, "Bike taken offline"),
    ],
};

static FROM_RESERVED: TransitionRule = TransitionRule {
    from: Reserved,
    edges: &[
        (Available, "Reservation cancelled"),
        (Booked, "User picked up the bike"),
    ],
};

static FROM_BOOKED: TransitionRule = TransitionRule {
    from: Booked,
    edges: &[
        (Available, "Bike returned by user"),
        (Broken, "Issue reported or detected during use"),
        (Maintained, "Maintenance scheduled during use"),
        (Unavailable, "Bike marked unavailable during use"),
    ],
};

static FROM_BROKEN: TransitionRule = TransitionRule {
    from: Broken,
    edges: &[
        (Maintained, "Maintenance started on broken bike"),
        (Unavailable, "Bike permanently unavailable"),
    ],
};

static FROM_MAINTAINED: TransitionRule = TransitionRule {
    from: Maintained,
    edges: &[
        (Available, "Maintenance completed successfully"),
        (
            Unavailable,
            "Bike deemed permanently unavailable after maintenance",
        ),
    ],
};

static FROM_UNAVAILABLE: TransitionRule = TransitionRule {
    from: Unavailable,
    edges: &[
        (Available, "Bike brought back online"),
        (Maintained, "Maintenance started on unavailable bike"),
    ],
};

/// Returns the transition rule for `state`.
#[must_use]
pub const fn rule_for(state: LifecycleState) -> &'static TransitionRule {
    match state {
        Available => &FROM_AVAILABLE,
        Reserved => &FROM_RESERVED,
        Booked => &FROM_BOOKED,
        Broken => &FROM_BROKEN,
        Maintained => &FROM_MAINTAINED,
        Unavailable => &FROM_UNAVAILABLE,
    }
}

/// Why a transition was refused.
///
/// Carries no device identity; the command layer attaches it when converting
/// into a [`crate::error::BusinessError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionRejection {
    /// The device is already in the requested state.
    AlreadyInState {
        /// Current (and requested) state.
        state: LifecycleState,
    },

    /// The requested state is not reachable from the current one.
    NotAllowed {
        /// Current state label.
        current_state: String,
        /// Requested state label.
        requested_state: String,
        /// Destinations reachable from the current state.
        allowed_states: Vec<LifecycleState>,
        /// Registered reason, or [`TRANSITION_NOT_ALLOWED`].
        reason: &'static str,
    },

    /// The current state is not a lifecycle label.
    UnknownCurrentState {
        /// Current state as observed.
        current_state: String,
        /// Requested state label.
        requested_state: String,
    },
}

/// Validates a transition between two lifecycle states.
///
/// Returns the reason registered for the edge on success.
///
/// # Errors
///
/// - [`TransitionRejection::AlreadyInState`] when `current == requested`
/// - [`TransitionRejection::NotAllowed`] when the table has no such edge
pub fn validate_transition(
    current: LifecycleState,
    requested: LifecycleState,
) -> Result<&'static str, TransitionRejection> {
    if current == requested {
        return Err(TransitionRejection::AlreadyInState { state: current });
    }

    let rule = rule_for(current);
    rule.reason_for(requested)
        .ok_or_else(|| TransitionRejection::NotAllowed {
            current_state: current.as_str().to_string(),
            requested_state: requested.as_str().to_string(),
            allowed_states: rule.allowed(),
            reason: TRANSITION_NOT_ALLOWED,
        })
}

/// Validates a transition given as raw labels.
///
/// An unrecognized requested label is never allowed. An unrecognized current
/// label fails with [`TransitionRejection::UnknownCurrentState`].
///
/// # Errors
///
/// See [`validate_transition`], plus the unknown-state cases above.
pub fn validate_raw_transition(
    current: &str,
    requested: &str,
) -> Result<&'static str, TransitionRejection> {
    let Some(current_state) = LifecycleState::from_label(current) else {
        return Err(TransitionRejection::UnknownCurrentState {
            current_state: current.to_string(),
            requested_state: requested.to_string(),
        });
    };

    match LifecycleState::from_label(requested) {
        Some(requested_state) => validate_transition(current_state, requested_state),
        None => Err(TransitionRejection::NotAllowed {
            current_state: current.to_string(),
            requested_state: requested.to_string(),
            allowed_states: rule_for(current_state).allowed(),
            reason: TRANSITION_NOT_ALLOWED,
        }),
    }
}
