//! Dashboard event stream for observers.
//!
//! The [`Dashboard`](crate::Dashboard) publishes a [`DashboardEvent`] for
//! every state change it applies. Observers (status lines, loggers, tests)
//! subscribe through an [`EventDispatcher`]; a lagging or absent observer
//! never blocks the session.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use dustline_types::{Percentages, Scope, StateValue};

use crate::buffer::InsertOutcome;
use crate::channel::ConnectionState;

/// Events emitted by a dashboard session.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DashboardEvent {
    /// The live channel changed state.
    Connection { state: ConnectionState },
    /// An element took a new value.
    DeviceState {
        device: Option<String>,
        id: String,
        value: StateValue,
    },
    /// A duration snapshot was applied.
    Durations {
        device: Option<String>,
        id: String,
        percentages: Percentages,
    },
    /// A sample was offered to a series buffer.
    Sample {
        device: Option<String>,
        metric: String,
        value: f64,
        added: bool,
    },
    /// Expired samples were pruned during cleanup.
    Pruned { removed: usize },
    /// The simulation-mode toggle changed.
    SimulationMode { enabled: bool, acknowledged: bool },
    /// A frame could not be normalized and was dropped.
    FrameDropped { reason: String },
    /// A user-visible alert was raised.
    Alert { message: String },
}

impl DashboardEvent {
    pub(crate) fn device_state(scope: &Scope, id: &str, value: &StateValue) -> Self {
        Self::DeviceState {
            device: scope.device_uuid().map(String::from),
            id: id.to_string(),
            value: value.clone(),
        }
    }

    pub(crate) fn durations(scope: &Scope, id: &str, percentages: Percentages) -> Self {
        Self::Durations {
            device: scope.device_uuid().map(String::from),
            id: id.to_string(),
            percentages,
        }
    }

    pub(crate) fn sample(scope: &Scope, metric: &str, value: f64, outcome: InsertOutcome) -> Self {
        Self::Sample {
            device: scope.device_uuid().map(String::from),
            metric: metric.to_string(),
            value,
            added: outcome.changed(),
        }
    }
}

/// Sender for dashboard events.
pub type EventSender = broadcast::Sender<DashboardEvent>;

/// Receiver for dashboard events.
pub type EventReceiver = broadcast::Receiver<DashboardEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: DashboardEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
