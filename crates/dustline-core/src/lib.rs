//! Real-time telemetry reconciliation for dust-collection dashboards.
//!
//! This crate ingests the push stream of a dust-collection monitoring
//! service (tools, blast gates, the collector and particulate sensors) and
//! keeps a dashboard's view of it consistent across reconnects and restarts.
//!
//! # Features
//!
//! - **Sample buffers**: bounded, deduplicated, time-ordered series per metric
//! - **Sliding windows**: visible range that scrolls with the clock and freezes on stale data
//! - **Duration statistics**: cumulative ON/OFF/UNAVAILABLE snapshots as percentages
//! - **Live channel**: event-stream or WebSocket client with fixed-delay reconnection
//! - **Persistence**: best-effort snapshots through [`dustline_store`]
//! - **Simulation toggle**: optimistic UI with rollback on failure
//!
//! # Architecture
//!
//! ```text
//! LiveChannel ──ChannelEvent──▶ Dashboard ──▶ RenderAdapter
//!                                  │
//!                                  ├──▶ SampleBuffer / DurationAggregator
//!                                  └──▶ PersistenceStore
//! ```
//!
//! The [`LiveChannel`] runs on its own task and only forwards frames. The
//! [`Dashboard`] owns all state and applies frames, ticks and commands one
//! at a time.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use dustline_core::{
//!     ChannelOptions, Dashboard, DashboardConfig, EventStreamTransport, LiveChannel,
//!     NullRenderer, SimulationControl,
//! };
//! use dustline_store::{Layout, PersistenceStore};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PersistenceStore::in_memory(Layout::Flat)?;
//!     let mut dashboard = Dashboard::mount(DashboardConfig::default(), store, NullRenderer);
//!
//!     let transport = Arc::new(EventStreamTransport::new("http://localhost:8000")?);
//!     let channel = LiveChannel::new(transport, ChannelOptions::default())?
//!         .with_metrics(dashboard.metrics());
//!
//!     let cancel = CancellationToken::new();
//!     let (events, _task) = channel.spawn(cancel.clone());
//!     let (_commands_tx, commands) = tokio::sync::mpsc::channel(8);
//!     let control = Arc::new(SimulationControl::new("http://localhost:8000")?);
//!
//!     dashboard.run(events, commands, control, cancel).await;
//!     Ok(())
//! }
//! ```

pub mod buffer;
pub mod channel;
pub mod control;
pub mod durations;
pub mod error;
pub mod events;
pub mod frames;
pub mod metrics;
pub mod mock;
pub mod render;
pub mod session;
pub mod transport;
pub mod window;

// Core exports
pub use buffer::{DEDUP_EPSILON, InsertOutcome, MAX_DATA_POINTS, SampleBuffer};
pub use channel::{ChannelEvent, ChannelOptions, ConnectionState, LiveChannel, RECONNECT_DELAY};
pub use control::{ControlClient, SimulationControl};
pub use durations::{DurationAggregator, DurationError, DurationView};
pub use error::{ControlError, Error, FrameError, Result};
pub use events::{DashboardEvent, EventDispatcher, EventReceiver, EventSender};
pub use frames::{InboundFrame, scale_concentration};
pub use metrics::{ChannelMetrics, ChannelMetricsSummary, OperationMetrics};
pub use mock::{MockControl, MockTransport, RecordingRenderer};
pub use render::{NullRenderer, RenderAdapter, SeriesFrame};
pub use session::{
    CLEANUP_INTERVAL, Dashboard, DashboardCommand, DashboardConfig, PendingToggle, SeriesConfig,
    TICK, TOGGLE_FAILED_MESSAGE,
};
pub use transport::{EventStreamTransport, FrameSource, SseDecoder, Transport, WebSocketTransport};
pub use window::{MAX_GAP, RETENTION, TIME_WINDOW, ValueRange, Window, WindowPolicy};

// Re-export from dustline-types
pub use dustline_types::{
    DeviceState, DurationCounts, ElementId, ElementKind, Percentages, Sample, Scope, SeriesKey,
    StateValue,
};
