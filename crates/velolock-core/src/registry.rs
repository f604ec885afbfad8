//! Last observed status per device.
//!
//! The registry is the server's only view of the fleet. It is fed by status
//! messages from the broker and read by command planning. Observations are
//! ordered by a monotonic sequence number: a late observation carrying an
//! older sequence never overwrites a newer one.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::device::DeviceId;
use crate::lifecycle::LifecycleState;
use crate::payload::{
    BookingStatusMessage, MaintenanceStatusMessage, StatusMessage, ValidationError,
};
use crate::topics::StatusTopic;

/// Registry shared between request handlers and the broker listener.
pub type SharedRegistry = Arc<RwLock<DeviceRegistry>>;

/// What the registry knows about one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// The last status message, as received (trimmed).
    pub last_message: String,
    /// The last lifecycle state any message carried.
    pub state: Option<LifecycleState>,
    /// Sequence number of the observation that produced this record.
    pub sequence: u64,
    /// When the observation was recorded.
    pub updated_at: DateTime<Utc>,
}

impl DeviceRecord {
    /// The lifecycle label if known, otherwise the last raw message.
    #[must_use]
    pub fn status(&self) -> &str {
        self.state.map_or(self.last_message.as_str(), |state| state.as_str())
    }

    /// Returns a copy of this record with `state` assumed in place of the
    /// reported one.
    #[must_use]
    pub fn assuming(&self, state: LifecycleState) -> Self {
        Self {
            state: Some(state),
            ..self.clone()
        }
    }
}

/// What a report says about the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportedState {
    /// The message names a lifecycle state.
    Known(LifecycleState),
    /// The message is about the state but it could not be resolved, e.g. an
    /// out-of-range firmware ordinal. The state becomes unknown.
    Unresolved,
    /// The message says nothing about the state. The previous one stands.
    Silent,
}

impl ReportedState {
    /// Returns the state to record given the previously recorded one.
    #[must_use]
    pub const fn resolve(self, previous: Option<LifecycleState>) -> Option<LifecycleState> {
        match self {
            Self::Known(state) => Some(state),
            Self::Unresolved => None,
            Self::Silent => previous,
        }
    }
}

/// One device report, normalized across the status topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Message text.
    pub message: String,
    /// What the message says about the lifecycle state.
    pub state: ReportedState,
}

impl From<StatusMessage> for Report {
    fn from(message: StatusMessage) -> Self {
        let state = match message.lifecycle_label() {
            Some(state) => ReportedState::Known(state),
            None if message.carries_state() => ReportedState::Unresolved,
            None => ReportedState::Silent,
        };
        Self {
            state,
            message: message.to_string(),
        }
    }
}

impl From<BookingStatusMessage> for Report {
    fn from(message: BookingStatusMessage) -> Self {
        let state = message.lifecycle_label();
        Self {
            message: state.as_str().to_string(),
            state: ReportedState::Known(state),
        }
    }
}

impl From<MaintenanceStatusMessage> for Report {
    fn from(message: MaintenanceStatusMessage) -> Self {
        let text = match message {
            MaintenanceStatusMessage::InProgress => "in_progress",
            MaintenanceStatusMessage::Completed => "completed",
        };
        Self {
            message: text.to_string(),
            state: ReportedState::Known(message.lifecycle_label()),
        }
    }
}

/// Result of feeding one broker message to [`DeviceRegistry::ingest`].
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The report was recorded.
    Applied {
        /// Reporting device.
        device_id: DeviceId,
        /// Lifecycle state after the report.
        state: Option<LifecycleState>,
    },
    /// A firmware log line. Never changes state.
    Log {
        /// Reporting device.
        device_id: DeviceId,
        /// Trimmed log line.
        line: String,
    },
    /// The payload is outside its topic's vocabulary.
    Invalid {
        /// Reporting device.
        device_id: DeviceId,
        /// What was wrong with it.
        error: ValidationError,
    },
    /// The topic is not a status topic, or no device could be attributed.
    Ignored,
}

/// In-memory map from device to its last report.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<DeviceId, DeviceRecord>,
    next_sequence: u64,
}

impl DeviceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry ready to share.
    #[must_use]
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Records a report with the next sequence number.
    pub fn observe(&mut self, device_id: DeviceId, report: impl Into<Report>) {
        let sequence = self.next_sequence;
        self.apply(device_id, report, sequence);
    }

    /// Records a report observed at `sequence`.
    ///
    /// Returns `false` and leaves the record untouched when `sequence` is
    /// older than the one already recorded. A report that says nothing about
    /// the lifecycle keeps the previously known state; one whose state cannot
    /// be resolved clears it.
    pub fn apply(&mut self, device_id: DeviceId, report: impl Into<Report>, sequence: u64) -> bool {
        let report = report.into();
        let previous = self.devices.get(&device_id);

        if previous.is_some_and(|record| sequence < record.sequence) {
            debug!(device_id = %device_id, sequence, "Ignoring stale report");
            return false;
        }

        let state = report.state.resolve(previous.and_then(|record| record.state));
        self.next_sequence = self.next_sequence.max(sequence.saturating_add(1));
        self.devices.insert(
            device_id,
            DeviceRecord {
                last_message: report.message,
                state,
                sequence,
                updated_at: Utc::now(),
            },
        );
        true
    }

    /// Routes a raw broker message into the registry.
    ///
    /// The device is taken from the topic's first segment after the status
    /// root, falling back to `fallback_device` for bare roots. Payloads are
    /// trimmed before parsing.
    pub fn ingest(
        &mut self,
        topic: &str,
        payload: &str,
        fallback_device: Option<&DeviceId>,
    ) -> IngestOutcome {
        let Some((root, segment)) = StatusTopic::classify(topic) else {
            return IngestOutcome::Ignored;
        };

        let device_id = match segment.and_then(|s| DeviceId::parse(s).ok()) {
            Some(id) => id,
            None => match fallback_device {
                Some(id) => id.clone(),
                None => {
                    debug!(topic, "No device attributable to message");
                    return IngestOutcome::Ignored;
                }
            },
        };

        let parsed: Result<Report, ValidationError> = match root {
            StatusTopic::Logs => {
                return IngestOutcome::Log {
                    device_id,
                    line: payload.trim().to_string(),
                };
            }
            StatusTopic::Status => StatusMessage::parse(payload).map(Report::from),
            StatusTopic::BookingStatus => BookingStatusMessage::parse(payload).map(Report::from),
            StatusTopic::MaintenanceStatus => {
                MaintenanceStatusMessage::parse(payload).map(Report::from)
            }
        };

        match parsed {
            Ok(report) => {
                self.observe(device_id.clone(), report);
                let state = self.get(&device_id).and_then(|record| record.state);
                IngestOutcome::Applied { device_id, state }
            }
            Err(error) => IngestOutcome::Invalid { device_id, error },
        }
    }

    /// Returns the record for `device_id`.
    #[must_use]
    pub fn get(&self, device_id: &DeviceId) -> Option<&DeviceRecord> {
        self.devices.get(device_id)
    }

    /// Iterates records in device id order.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &DeviceRecord)> {
        self.devices.iter()
    }

    /// Number of known devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if no device has reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> DeviceId {
        DeviceId::parse(raw).unwrap()
    }

    #[test]
    fn test_observe_and_get() {
        let mut registry = DeviceRegistry::new();
        registry.observe(id("aabbcc"), StatusMessage::Lifecycle(LifecycleState::Booked));

        let record = registry.get(&id("AABBCC")).unwrap();
        assert_eq!(record.state, Some(LifecycleState::Booked));
        assert_eq!(record.status(), "booked");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_sequence_ignored() {
        let mut registry = DeviceRegistry::new();
        assert!(registry.apply(
            id("aa"),
            StatusMessage::Lifecycle(LifecycleState::Booked),
            10
        ));
        assert!(!registry.apply(
            id("aa"),
            StatusMessage::Lifecycle(LifecycleState::Available),
            9
        ));
        assert_eq!(
            registry.get(&id("aa")).unwrap().state,
            Some(LifecycleState::Booked)
        );

        // Later observations continue after the highest applied sequence.
        registry.observe(id("aa"), StatusMessage::Lifecycle(LifecycleState::Available));
        let record = registry.get(&id("aa")).unwrap();
        assert_eq!(record.sequence, 11);
        assert_eq!(record.state, Some(LifecycleState::Available));
    }

    #[test]
    fn test_online_retains_lifecycle_state() {
        let mut registry = DeviceRegistry::new();
        registry.observe(id("aa"), StatusMessage::Lifecycle(LifecycleState::Reserved));
        registry.observe(id("aa"), StatusMessage::Online);

        let record = registry.get(&id("aa")).unwrap();
        assert_eq!(record.last_message, "ESP32 online");
        assert_eq!(record.state, Some(LifecycleState::Reserved));
        assert_eq!(record.status(), "reserved");
    }

    #[test]
    fn test_unresolved_ordinal_clears_lifecycle_state() {
        let mut registry = DeviceRegistry::new();
        registry.observe(id("aa"), StatusMessage::Lifecycle(LifecycleState::Booked));

        assert_eq!(
            registry.ingest("esp/status/AA", "Current state: 99", None),
            IngestOutcome::Applied {
                device_id: id("AA"),
                state: None,
            }
        );
        let record = registry.get(&id("aa")).unwrap();
        assert_eq!(record.state, None);
        assert_eq!(record.status(), "Current state: 99");

        // A later silent message does not resurrect the old label.
        registry.observe(id("aa"), StatusMessage::Online);
        assert_eq!(registry.get(&id("aa")).unwrap().state, None);
    }

    #[test]
    fn test_reported_state_resolution() {
        let previous = Some(LifecycleState::Reserved);
        assert_eq!(
            ReportedState::Known(LifecycleState::Broken).resolve(previous),
            Some(LifecycleState::Broken)
        );
        assert_eq!(ReportedState::Unresolved.resolve(previous), None);
        assert_eq!(ReportedState::Silent.resolve(previous), previous);
    }

    #[test]
    fn test_assuming_overrides_state_only() {
        let mut registry = DeviceRegistry::new();
        registry.observe(id("aa"), StatusMessage::Online);

        let record = registry.get(&id("aa")).unwrap();
        let assumed = record.assuming(LifecycleState::Booked);
        assert_eq!(assumed.state, Some(LifecycleState::Booked));
        assert_eq!(assumed.last_message, record.last_message);
        assert_eq!(assumed.sequence, record.sequence);
    }

    #[test]
    fn test_unknown_state_reports_raw_message() {
        let mut registry = DeviceRegistry::new();
        registry.observe(id("aa"), StatusMessage::Online);
        assert_eq!(registry.get(&id("aa")).unwrap().status(), "ESP32 online");
    }

    #[test]
    fn test_ingest_status_topics() {
        let mut registry = DeviceRegistry::new();

        assert_eq!(
            registry.ingest("esp/status/aabbcc", " State changed to 6 ", None),
            IngestOutcome::Applied {
                device_id: id("AABBCC"),
                state: Some(LifecycleState::Maintained),
            }
        );
        assert_eq!(
            registry.ingest("esp/maintenance/status/AABBCC", "completed", None),
            IngestOutcome::Applied {
                device_id: id("AABBCC"),
                state: Some(LifecycleState::Available),
            }
        );
        assert_eq!(
            registry.ingest("esp/booking/status/AABBCC", "booked", None),
            IngestOutcome::Applied {
                device_id: id("AABBCC"),
                state: Some(LifecycleState::Booked),
            }
        );
    }

    #[test]
    fn test_ingest_logs_never_change_state() {
        let mut registry = DeviceRegistry::new();
        registry.observe(id("aa"), StatusMessage::Lifecycle(LifecycleState::Booked));

        let outcome = registry.ingest("esp/logs/AA", "available\n", None);
        assert_eq!(
            outcome,
            IngestOutcome::Log {
                device_id: id("AA"),
                line: "available".to_string(),
            }
        );
        assert_eq!(
            registry.get(&id("aa")).unwrap().state,
            Some(LifecycleState::Booked)
        );
    }

    #[test]
    fn test_ingest_invalid_payload() {
        let mut registry = DeviceRegistry::new();
        let outcome = registry.ingest("esp/status/AA", "rebooting", None);
        assert!(matches!(outcome, IngestOutcome::Invalid { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ingest_bare_topic_uses_fallback() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(registry.ingest("esp/status", "available", None), IngestOutcome::Ignored);

        let fallback = id("ffeedd");
        assert_eq!(
            registry.ingest("esp/status", "available", Some(&fallback)),
            IngestOutcome::Applied {
                device_id: fallback.clone(),
                state: Some(LifecycleState::Available),
            }
        );
    }

    #[test]
    fn test_ingest_ignores_other_topics() {
        let mut registry = DeviceRegistry::new();
        assert_eq!(
            registry.ingest("esp/commands/state/AA", "booked", None),
            IngestOutcome::Ignored
        );
    }

    #[test]
    fn test_iter_sorted_by_device() {
        let mut registry = DeviceRegistry::new();
        registry.observe(id("cc"), StatusMessage::Online);
        registry.observe(id("aa"), StatusMessage::Online);
        registry.observe(id("bb"), StatusMessage::Online);

        let ids: Vec<&str> = registry.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["AA", "BB", "CC"]);
    }
}
