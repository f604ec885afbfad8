//! Command publishing and per-device serialization.
//!
//! [`Dispatcher::submit`] is the single entry point for sending a command to
//! a device. It holds the device's lock across planning and publishing, and
//! remembers the target of the last accepted command until the device
//! reports again, so two commands for the same device are always validated
//! against the state the other one leaves behind. Commands for different
//! devices never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{plan_command, CommandAccepted, DeviceCommand};
use crate::device::DeviceId;
use crate::error::Result;
use crate::lifecycle::LifecycleState;
use crate::registry::{DeviceRecord, SharedRegistry};

/// Errors raised while handing a command to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// No broker connection is available.
    #[error("Broker unavailable: {0}")]
    Disconnected(String),

    /// The broker client refused the message.
    #[error("Broker client error: {0}")]
    Client(String),
}

/// Sink for outbound device commands.
#[async_trait]
pub trait CommandPublisher: Send + Sync {
    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns a [`PublishError`] if the message could not be queued.
    async fn publish(&self, topic: &str, payload: &str) -> std::result::Result<(), PublishError>;
}

/// Publisher used when no broker is configured: logs and accepts.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingPublisher;

#[async_trait]
impl CommandPublisher for LoggingPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> std::result::Result<(), PublishError> {
        info!(topic, payload, "Broker disabled, command not sent");
        Ok(())
    }
}

/// A command as handed to a publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedCommand {
    /// Topic.
    pub topic: String,
    /// Payload.
    pub payload: String,
}

/// Publisher that keeps every command in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<PublishedCommand>>,
    offline: bool,
}

impl RecordingPublisher {
    /// Creates a publisher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a publisher that fails every publish as disconnected.
    #[must_use]
    pub fn offline() -> Self {
        Self {
            published: Mutex::default(),
            offline: true,
        }
    }

    /// Returns a copy of everything published so far.
    #[must_use]
    pub fn published(&self) -> Vec<PublishedCommand> {
        self.published.lock().clone()
    }
}

#[async_trait]
impl CommandPublisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> std::result::Result<(), PublishError> {
        if self.offline {
            return Err(PublishError::Disconnected("recording publisher is offline".into()));
        }
        self.published.lock().push(PublishedCommand {
            topic: topic.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

/// A command accepted and published but not yet confirmed by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pending {
    target: LifecycleState,
    /// Sequence of the registry record the command was planned against.
    /// Any newer report from the device supersedes the assumption.
    sequence: u64,
}

type Slot = Arc<tokio::sync::Mutex<Option<Pending>>>;

/// Validates and publishes commands, one at a time per device.
///
/// Once a state-changing command is accepted, later commands for the device
/// are planned against its target state until the device reports again.
pub struct Dispatcher {
    registry: SharedRegistry,
    publisher: Arc<dyn CommandPublisher>,
    slots: Mutex<HashMap<DeviceId, Slot>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("devices", &self.slots.lock().len())
            .finish_non_exhaustive()
    }
}

/// Holds a device slot for the duration of one submit and gives it back
/// afterwards, even if the submit future is dropped.
struct Lease<'a> {
    dispatcher: &'a Dispatcher,
    device_id: DeviceId,
    slot: Slot,
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.dispatcher.release(&self.device_id, &self.slot);
    }
}

impl Dispatcher {
    /// Creates a dispatcher over `registry` that sends through `publisher`.
    #[must_use]
    pub fn new(registry: SharedRegistry, publisher: Arc<dyn CommandPublisher>) -> Self {
        Self {
            registry,
            publisher,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the registry commands are planned against.
    #[must_use]
    pub const fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    fn lease(&self, device_id: DeviceId) -> Lease<'_> {
        let slot = Arc::clone(self.slots.lock().entry(device_id.clone()).or_default());
        Lease {
            dispatcher: self,
            device_id,
            slot,
        }
    }

    /// Drops the slot once nobody waits on it and nothing is pending.
    fn release(&self, device_id: &DeviceId, slot: &Slot) {
        let mut slots = self.slots.lock();
        // Clones are only taken under the map lock, so a count of two (map
        // plus this lease) means no other submit holds or awaits the slot.
        if Arc::strong_count(slot) == 2 && slot.try_lock().is_ok_and(|pending| pending.is_none()) {
            slots.remove(device_id);
        }
    }

    /// Sends `command` to the device named by `raw_device_id`.
    ///
    /// Nothing is published when the command is rejected.
    ///
    /// # Errors
    ///
    /// - [`crate::VelolockError::InvalidDeviceIdentifier`] for an id with no hex digits
    /// - [`crate::VelolockError::Business`] when planning rejects the command
    /// - [`crate::VelolockError::Publish`] when the broker refuses it
    pub async fn submit(
        &self,
        raw_device_id: &str,
        command: DeviceCommand,
    ) -> Result<CommandAccepted> {
        let device_id = DeviceId::parse(raw_device_id)?;

        let lease = self.lease(device_id.clone());
        let mut pending = lease.slot.lock().await;

        let (planned, planned_sequence) = {
            let registry = self.registry.read().await;
            let record = registry.get(&device_id);
            let assumed = assumed_record(record, &mut pending);
            (
                plan_command(&device_id, assumed.as_ref().or(record), command),
                record.map(|record| record.sequence),
            )
        };

        let accepted = match planned {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(
                    device_id = %device_id,
                    workflow = %command.workflow(),
                    payload = command.payload(),
                    code = err.error_code(),
                    "Command rejected: {err}"
                );
                return Err(err);
            }
        };

        debug!(topic = %accepted.topic, payload = accepted.payload, "Publishing command");
        self.publisher
            .publish(&accepted.topic, accepted.payload)
            .await?;

        if let (Some(target), Some(sequence)) = (command.target_state(), planned_sequence) {
            *pending = Some(Pending { target, sequence });
        }

        info!(
            device_id = %device_id,
            workflow = %command.workflow(),
            topic = %accepted.topic,
            payload = accepted.payload,
            reason = accepted.reason.unwrap_or("-"),
            "Command accepted"
        );
        Ok(accepted)
    }

    #[cfg(test)]
    fn tracked_devices(&self) -> usize {
        self.slots.lock().len()
    }
}

/// Returns the record to plan against when a command is still pending.
///
/// Clears `pending` once the device has reported since it was accepted.
fn assumed_record(
    record: Option<&DeviceRecord>,
    pending: &mut Option<Pending>,
) -> Option<DeviceRecord> {
    let record = record?;
    let Some(assumed) = *pending else {
        return None;
    };

    if assumed.sequence == record.sequence {
        Some(record.assuming(assumed.target))
    } else {
        *pending = None;
        None
    }
}
