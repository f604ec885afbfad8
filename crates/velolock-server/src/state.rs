//! Application state shared across handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use velolock_core::{CommandPublisher, DeviceRegistry, Dispatcher, SharedRegistry};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    registry: SharedRegistry,
    dispatcher: Dispatcher,
    started_at: Instant,
}

/// State type handed to every router.
pub type SharedState = AppState;

impl AppState {
    /// Create state over an existing registry.
    ///
    /// The registry is shared with the broker listener, which feeds it.
    pub fn new(registry: SharedRegistry, publisher: Arc<dyn CommandPublisher>) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&registry), publisher);
        Self {
            inner: Arc::new(AppStateInner {
                registry,
                dispatcher,
                started_at: Instant::now(),
            }),
        }
    }

    /// Create state with an empty registry.
    pub fn with_publisher(publisher: Arc<dyn CommandPublisher>) -> Self {
        Self::new(DeviceRegistry::shared(), publisher)
    }

    /// The device registry.
    pub fn registry(&self) -> &SharedRegistry {
        &self.inner.registry
    }

    /// The command dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Time since the state was created.
    pub fn uptime(&self) -> Duration {
        self.inner.started_at.elapsed()
    }
}
