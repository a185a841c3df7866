//! The dashboard session.
//!
//! A [`Dashboard`] owns every buffer, duration snapshot and element state
//! for one dashboard. It is driven by three inputs that never run
//! concurrently: channel events, a one-second tick, and user commands.
//! Each input is applied to memory, persisted through the
//! [`PersistenceStore`] and handed to the [`RenderAdapter`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use dustline_core::{
//!     ChannelOptions, Dashboard, DashboardConfig, EventStreamTransport, LiveChannel,
//!     NullRenderer, SimulationControl,
//! };
//! use dustline_store::{Layout, PersistenceStore, StoreOptions};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PersistenceStore::open("state.db", StoreOptions::default(), Layout::Flat);
//! let mut dashboard = Dashboard::mount(DashboardConfig::default(), store, NullRenderer);
//!
//! let transport = Arc::new(EventStreamTransport::new("http://localhost:8000")?);
//! let channel = LiveChannel::new(transport, ChannelOptions::default())?;
//! let cancel = CancellationToken::new();
//! let (events, _task) = channel.spawn(cancel.clone());
//! let (_commands_tx, commands) = mpsc::channel(8);
//! let control = Arc::new(SimulationControl::new("http://localhost:8000")?);
//!
//! dashboard.run(events, commands, control, cancel).await;
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use dustline_store::{DataRange, DomainKey, Layout, ParticleMetadata, PersistenceStore};
use dustline_types::{
    DeviceState, DurationCounts, ElementId, ElementKind, Sample, Scope, SeriesKey, StateValue,
    to_epoch_millis,
};

use crate::buffer::{InsertOutcome, SampleBuffer};
use crate::channel::{ChannelEvent, ConnectionState};
use crate::control::ControlClient;
use crate::durations::DurationAggregator;
use crate::error::{ControlError, Result};
use crate::events::{DashboardEvent, EventDispatcher, EventReceiver};
use crate::frames::{DeviceChange, InboundFrame, scale_concentration};
use crate::metrics::ChannelMetrics;
use crate::render::{RenderAdapter, SeriesFrame};
use crate::window::WindowPolicy;

/// Interval at which every series window is re-evaluated.
pub const TICK: std::time::Duration = std::time::Duration::from_secs(1);

/// Interval between retention sweeps of the sample buffers.
pub const CLEANUP_INTERVAL: Duration = Duration::seconds(30);

/// Alert shown when the simulation toggle could not be applied.
pub const TOGGLE_FAILED_MESSAGE: &str = "Failed to update simulation mode. Please try again.";

/// A charted concentration metric and its display label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesConfig {
    pub metric: String,
    pub label: String,
}

impl SeriesConfig {
    /// Create a series entry.
    pub fn new(metric: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            label: label.into(),
        }
    }

    /// The four particulate channels of the standard sensor.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("pm1_concentration", "PM1"),
            Self::new("pm2_5_concentration", "PM2.5"),
            Self::new("pm4_concentration", "PM4"),
            Self::new("pm10_concentration", "PM10"),
        ]
    }
}

/// Configuration for a [`Dashboard`].
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    /// Charted concentration metrics. Other concentration ids update the
    /// readout only.
    pub series: Vec<SeriesConfig>,
    /// Device this dashboard belongs to. Used for the simulation toggle and
    /// as the default scope in the per-device layout.
    pub device_uuid: Option<String>,
    /// Duration snapshots rendered before anything is persisted or received.
    pub initial_durations: BTreeMap<String, DurationCounts>,
    /// Window and value-range rules for every series.
    pub window: WindowPolicy,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            series: SeriesConfig::defaults(),
            device_uuid: None,
            initial_durations: BTreeMap::new(),
            window: WindowPolicy::default(),
            event_capacity: 100,
        }
    }
}

impl DashboardConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device uuid.
    #[must_use]
    pub fn device_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.device_uuid = Some(uuid.into()).filter(|u: &String| !u.is_empty());
        self
    }

    /// Replace the charted series.
    #[must_use]
    pub fn series(mut self, series: Vec<SeriesConfig>) -> Self {
        self.series = series;
        self
    }

    /// Set the initial duration snapshots.
    #[must_use]
    pub fn initial_durations(mut self, initial: BTreeMap<String, DurationCounts>) -> Self {
        self.initial_durations = initial;
        self
    }

    /// Set the window policy.
    #[must_use]
    pub fn window_policy(mut self, policy: WindowPolicy) -> Self {
        self.window = policy;
        self
    }

    fn label_for(&self, metric: &str) -> Option<&str> {
        self.series
            .iter()
            .find(|s| s.metric == metric)
            .map(|s| s.label.as_str())
    }
}

/// User commands accepted by [`Dashboard::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DashboardCommand {
    /// Switch simulation mode to the given value.
    SetSimulationMode(bool),
    /// Flip the simulation toggle.
    ToggleSimulationMode,
}

/// An optimistic toggle waiting for the server's answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingToggle {
    /// The value shown optimistically.
    pub requested: bool,
    /// The value to restore if the request fails.
    pub previous: bool,
}

struct ToggleOutcome {
    pending: PendingToggle,
    result: std::result::Result<(), ControlError>,
}

/// A live dashboard: state, persistence and rendering for one view.
pub struct Dashboard<R> {
    config: DashboardConfig,
    store: PersistenceStore,
    renderer: R,
    buffers: HashMap<SeriesKey, SampleBuffer>,
    durations: BTreeMap<Scope, DurationAggregator>,
    states: BTreeMap<Scope, BTreeMap<String, DeviceState>>,
    simulation_mode: bool,
    acknowledged_simulation: Option<bool>,
    connection: ConnectionState,
    last_cleanup: OffsetDateTime,
    events: EventDispatcher,
    metrics: Arc<ChannelMetrics>,
}

impl<R> std::fmt::Debug for Dashboard<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("layout", &self.store.layout())
            .field("device_uuid", &self.config.device_uuid)
            .field("series", &self.buffers.len())
            .field("connection", &self.connection)
            .field("simulation_mode", &self.simulation_mode)
            .finish()
    }
}

impl<R: RenderAdapter> Dashboard<R> {
    /// Restore persisted state, render it, and return the session.
    pub fn mount(config: DashboardConfig, store: PersistenceStore, renderer: R) -> Self {
        Self::mount_at(config, store, renderer, OffsetDateTime::now_utc())
    }

    /// [`mount`](Self::mount) with an explicit clock reading.
    pub fn mount_at(
        config: DashboardConfig,
        store: PersistenceStore,
        renderer: R,
        now: OffsetDateTime,
    ) -> Self {
        let events = EventDispatcher::new(config.event_capacity.max(1));
        let mut dashboard = Self {
            config,
            store,
            renderer,
            buffers: HashMap::new(),
            durations: BTreeMap::new(),
            states: BTreeMap::new(),
            simulation_mode: false,
            acknowledged_simulation: None,
            connection: ConnectionState::Disconnected,
            last_cleanup: now,
            events,
            metrics: ChannelMetrics::shared(),
        };
        dashboard.restore(now);
        dashboard.render_all(now);
        dashboard
    }

    /// Share the metrics instance of the channel feeding this session.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ChannelMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    fn restore(&mut self, now: OffsetDateTime) {
        let home = self.home_scope();

        for (scope, snapshots) in self
            .store
            .restore_all_entries::<DurationCounts>(DomainKey::ChartData)
        {
            self.durations
                .insert(scope, DurationAggregator::from_snapshots(snapshots));
        }
        if !self.config.initial_durations.is_empty() {
            let seeded = self
                .durations
                .entry(home.clone())
                .or_default()
                .seed(self.config.initial_durations.clone());
            debug!("Seeded {} initial duration snapshots", seeded);
        }

        for (scope, items) in self
            .store
            .restore_all_entries::<StateValue>(DomainKey::DeviceStates)
        {
            let states = items
                .into_iter()
                .map(|(id, value)| (id.clone(), DeviceState::new(id, value, now)))
                .collect();
            self.states.insert(scope, states);
        }

        for (scope, series) in self
            .store
            .restore_all_entries::<Vec<Sample>>(DomainKey::ParticleData)
        {
            for (metric, samples) in series {
                if self.config.label_for(&metric).is_none() {
                    debug!("Ignoring persisted samples for unconfigured series {}", metric);
                    continue;
                }
                let buffer = SampleBuffer::from_samples(samples, now);
                self.buffers
                    .insert(SeriesKey::new(scope.clone(), metric), buffer);
            }
        }
        let metadata: ParticleMetadata = self.store.restore(DomainKey::ParticleDataMetadata, &home);
        if metadata.last_update > 0 {
            debug!(
                "Restored particle data last written at {} ({} series)",
                metadata.last_update,
                metadata.data_ranges.len()
            );
        }

        self.acknowledged_simulation = self.store.restore(DomainKey::SimulationMode, &home);
        self.simulation_mode = self.acknowledged_simulation.unwrap_or(false);

        for series in &self.config.series {
            self.buffers
                .entry(SeriesKey::new(home.clone(), series.metric.as_str()))
                .or_default();
        }

        info!(
            "Restored {} duration charts, {} element states, {} series",
            self.durations.values().map(DurationAggregator::len).sum::<usize>(),
            self.states.values().map(BTreeMap::len).sum::<usize>(),
            self.buffers.values().filter(|b| !b.is_empty()).count()
        );
    }

    fn render_all(&mut self, now: OffsetDateTime) {
        for (scope, states) in &self.states {
            for state in states.values() {
                self.renderer.device_state(
                    scope,
                    &state.id,
                    ElementKind::classify(&state.id),
                    &state.value,
                );
            }
        }
        for (scope, aggregator) in &self.durations {
            for id in aggregator.ids() {
                self.renderer.durations(scope, id, &aggregator.view(id));
            }
        }
        self.render_all_series(now);
        if self.acknowledged_simulation.is_some() {
            self.renderer.simulation_mode(self.simulation_mode);
        }
    }

    /// Scope used for data that is not tied to a frame.
    fn home_scope(&self) -> Scope {
        self.scope_for(None)
    }

    fn scope_for(&self, device_uuid: Option<&str>) -> Scope {
        match self.store.layout() {
            Layout::Flat => Scope::Global,
            Layout::PerDevice => device_uuid
                .or(self.config.device_uuid.as_deref())
                .map_or(Scope::Global, Scope::device),
        }
    }

    fn change_scope(&self, change: &DeviceChange) -> Scope {
        // A uuid derived from the prefix of a bare metric id (`pm2_5_...`)
        // is not a device.
        let derived = change.device_uuid.as_deref() == change.id.device_prefix();
        if derived && self.config.label_for(change.id.raw()).is_some() {
            return self.scope_for(None);
        }
        self.scope_for(change.device_uuid.as_deref())
    }

    /// The configured metric an id charts into, if any.
    fn series_metric(&self, scope: &Scope, id: &str) -> Option<String> {
        if self.config.label_for(id).is_some() {
            return Some(id.to_string());
        }
        let uuid = scope.device_uuid()?;
        let metric = id.strip_prefix(uuid)?.strip_prefix('_')?;
        self.config.label_for(metric).map(|_| metric.to_string())
    }

    /// Normalize and apply one raw frame.
    ///
    /// Malformed frames are logged, counted and dropped; the returned error
    /// is informational and never affects later frames.
    pub fn handle_frame(&mut self, text: &str, now: OffsetDateTime) -> Result<()> {
        match InboundFrame::parse(text) {
            Ok(frame) => {
                self.apply_frame(frame, now);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_malformed();
                warn!("Dropping malformed frame: {}", e);
                self.events.send(DashboardEvent::FrameDropped {
                    reason: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Apply a normalized frame.
    pub fn apply_frame(&mut self, frame: InboundFrame, now: OffsetDateTime) {
        match frame {
            InboundFrame::ConnectionEstablished {
                data_items,
                device_uuid,
            } => self.initialize_ui(data_items, device_uuid.as_deref(), now),
            InboundFrame::DeviceChange(change) => self.apply_device_change(change, now),
            InboundFrame::SimulationModeUpdated {
                success,
                value,
                error,
            } => self.apply_simulation_ack(success, value, error.as_deref()),
            InboundFrame::Heartbeat => trace!("Heartbeat"),
            InboundFrame::Unrecognized(event) => debug!("Ignoring event {}", event),
        }
    }

    /// Apply the full snapshot sent when a connection opens.
    ///
    /// The snapshot is persisted before any element is updated, and replaces
    /// the stored states for its scope.
    pub fn initialize_ui(
        &mut self,
        items: BTreeMap<String, StateValue>,
        device_uuid: Option<&str>,
        now: OffsetDateTime,
    ) {
        let scope = self.scope_for(device_uuid);
        info!("Applying snapshot of {} items ({})", items.len(), scope);
        self.store.snapshot(DomainKey::DeviceStates, &scope, &items);

        let mut states = BTreeMap::new();
        for (id, value) in items {
            let element = match ElementId::parse(id.as_str()) {
                Ok(element) => element,
                Err(e) => {
                    warn!("Skipping snapshot item: {}", e);
                    continue;
                }
            };
            self.show_state(&scope, &element, &value);
            if element.kind() == ElementKind::Concentration
                && let Some(raw) = value.as_f64()
            {
                let scaled = scale_concentration(raw);
                self.renderer.concentration(&scope, element.raw(), scaled);
                self.chart_sample(&scope, element.raw(), now, scaled, now);
            }
            states.insert(id.clone(), DeviceState::new(id, value, now));
        }
        self.states.insert(scope, states);
    }

    /// Apply one element update.
    pub fn apply_device_change(&mut self, change: DeviceChange, now: OffsetDateTime) {
        let scope = self.change_scope(&change);
        let id = change.id.raw().to_string();
        let observed = change.timestamp.unwrap_or(now);
        trace!("{} {} = {}", scope, id, change.value);

        self.show_state(&scope, &change.id, &change.value);
        self.states
            .entry(scope.clone())
            .or_default()
            .insert(id.clone(), DeviceState::new(id.as_str(), change.value.clone(), observed));

        if let Some(counts) = change.durations {
            self.apply_durations(&scope, &id, counts);
        }

        if change.kind() == ElementKind::Concentration {
            let raw = change.value.as_f64();
            if let Some(raw) = raw {
                self.renderer
                    .concentration(&scope, &id, scale_concentration(raw));
            }
            // The average, when present, is what gets charted.
            let point = match (change.avg_value, raw) {
                (Some(avg), _) => Some((avg.timestamp.unwrap_or(observed), scale_concentration(avg.value))),
                (None, Some(raw)) => Some((observed, scale_concentration(raw))),
                (None, None) => None,
            };
            if let Some((timestamp, value)) = point {
                self.chart_sample(&scope, &id, timestamp, value, now);
            }
        }

        self.persist_states(&scope);
    }

    fn show_state(&mut self, scope: &Scope, element: &ElementId, value: &StateValue) {
        self.renderer
            .device_state(scope, element.raw(), element.kind(), value);
        self.events
            .send(DashboardEvent::device_state(scope, element.raw(), value));
    }

    fn apply_durations(&mut self, scope: &Scope, id: &str, counts: DurationCounts) {
        let aggregator = self.durations.entry(scope.clone()).or_default();
        match aggregator.apply(id, counts) {
            Ok(()) => {
                let view = aggregator.view(id);
                self.renderer.durations(scope, id, &view);
                self.store
                    .snapshot(DomainKey::ChartData, scope, aggregator.snapshots());
                self.events
                    .send(DashboardEvent::durations(scope, id, view.percentages));
            }
            Err(e) => warn!("Ignoring duration update for {}: {}", id, e),
        }
    }

    fn chart_sample(
        &mut self,
        scope: &Scope,
        id: &str,
        timestamp: OffsetDateTime,
        value: f64,
        now: OffsetDateTime,
    ) {
        let Some(metric) = self.series_metric(scope, id) else {
            trace!("{} is not a charted series", id);
            return;
        };
        let key = SeriesKey::new(scope.clone(), metric);
        let outcome = self
            .buffers
            .entry(key.clone())
            .or_default()
            .insert(timestamp, value, now);
        self.events
            .send(DashboardEvent::sample(scope, &key.metric, value, outcome));

        match outcome {
            InsertOutcome::Added | InsertOutcome::Replaced => {
                self.render_series(&key, now);
                self.persist_particles(scope, now);
            }
            InsertOutcome::Ignored => trace!("Sample for {} at {} not kept", key, timestamp),
            InsertOutcome::Expired => debug!("Dropping expired sample for {} at {}", key, timestamp),
        }
    }

    fn render_series(&mut self, key: &SeriesKey, now: OffsetDateTime) {
        if let Some(buffer) = self.buffers.get(key) {
            draw_series(&mut self.renderer, &self.config, key, buffer, now);
        }
    }

    fn render_all_series(&mut self, now: OffsetDateTime) {
        let mut keys: Vec<&SeriesKey> = self.buffers.keys().collect();
        keys.sort();
        for key in keys {
            draw_series(&mut self.renderer, &self.config, key, &self.buffers[key], now);
        }
    }

    fn persist_states(&self, scope: &Scope) {
        let Some(states) = self.states.get(scope) else {
            return;
        };
        let items: BTreeMap<&str, &StateValue> = states
            .iter()
            .map(|(id, state)| (id.as_str(), &state.value))
            .collect();
        self.store.snapshot(DomainKey::DeviceStates, scope, &items);
    }

    fn persist_particles(&self, scope: &Scope, now: OffsetDateTime) {
        let mut series: BTreeMap<&str, &[Sample]> = BTreeMap::new();
        let mut metadata = ParticleMetadata {
            last_update: to_epoch_millis(now),
            data_ranges: BTreeMap::new(),
        };
        for (key, buffer) in self.buffers.iter().filter(|(key, _)| key.scope == *scope) {
            series.insert(key.metric.as_str(), buffer.as_slice());
            if let Some((start, end)) = buffer.extent() {
                metadata.data_ranges.insert(
                    key.metric.clone(),
                    DataRange {
                        start: to_epoch_millis(start),
                        end: to_epoch_millis(end),
                        count: buffer.len(),
                    },
                );
            }
        }
        self.store.snapshot(DomainKey::ParticleData, scope, &series);
        self.store
            .snapshot(DomainKey::ParticleDataMetadata, scope, &metadata);
    }

    /// Advance the clock: redraw every series window, and prune retention
    /// every [`CLEANUP_INTERVAL`].
    pub fn tick(&mut self, now: OffsetDateTime) {
        if now - self.last_cleanup >= CLEANUP_INTERVAL {
            self.cleanup(now);
        }
        self.render_all_series(now);
    }

    /// Drop expired samples from every buffer and persist what changed.
    ///
    /// Returns how many samples were removed.
    pub fn cleanup(&mut self, now: OffsetDateTime) -> usize {
        self.last_cleanup = now;
        let mut dirty = BTreeSet::new();
        let mut removed = 0;
        for (key, buffer) in &mut self.buffers {
            let pruned = buffer.prune(now);
            if pruned > 0 {
                removed += pruned;
                dirty.insert(key.scope.clone());
            }
        }
        for scope in &dirty {
            self.persist_particles(scope, now);
        }
        if removed > 0 {
            debug!("Pruned {} expired samples", removed);
            self.events.send(DashboardEvent::Pruned { removed });
        }
        removed
    }

    /// Record a channel state change.
    pub fn set_connection_state(&mut self, state: ConnectionState) {
        if self.connection == state {
            return;
        }
        debug!("Dashboard connection {} -> {}", self.connection, state);
        self.connection = state;
        self.renderer.connection(state);
        self.events.send(DashboardEvent::Connection { state });
    }

    /// Show `enabled` on the toggle immediately, before the server confirms.
    pub fn request_simulation_mode(&mut self, enabled: bool) -> PendingToggle {
        let pending = PendingToggle {
            requested: enabled,
            previous: self.simulation_mode,
        };
        self.simulation_mode = enabled;
        self.renderer.simulation_mode(enabled);
        self.events.send(DashboardEvent::SimulationMode {
            enabled,
            acknowledged: false,
        });
        pending
    }

    /// Finish a toggle: persist on success, roll back and alert on failure.
    pub fn complete_simulation_toggle(
        &mut self,
        pending: PendingToggle,
        result: std::result::Result<(), ControlError>,
    ) {
        match result {
            Ok(()) => {
                info!("Simulation mode set to {}", pending.requested);
                self.acknowledge_simulation(pending.requested);
            }
            Err(e) => {
                warn!("Failed to update simulation mode: {}", e);
                self.simulation_mode = pending.previous;
                self.renderer.simulation_mode(pending.previous);
                self.renderer.alert(TOGGLE_FAILED_MESSAGE);
                self.events.send(DashboardEvent::Alert {
                    message: TOGGLE_FAILED_MESSAGE.to_string(),
                });
            }
        }
    }

    fn acknowledge_simulation(&mut self, enabled: bool) {
        let scope = self.home_scope();
        self.acknowledged_simulation = Some(enabled);
        self.store.snapshot(DomainKey::SimulationMode, &scope, &enabled);
        self.events.send(DashboardEvent::SimulationMode {
            enabled,
            acknowledged: true,
        });
    }

    fn apply_simulation_ack(&mut self, success: bool, value: Option<bool>, error: Option<&str>) {
        if success {
            let Some(enabled) = value else {
                debug!("Simulation mode acknowledged without a value");
                return;
            };
            if self.simulation_mode != enabled {
                self.simulation_mode = enabled;
                self.renderer.simulation_mode(enabled);
            }
            self.acknowledge_simulation(enabled);
        } else {
            warn!(
                "Server rejected simulation mode change: {}",
                error.unwrap_or("unknown error")
            );
            let reverted = self
                .acknowledged_simulation
                .unwrap_or(!self.simulation_mode);
            self.simulation_mode = reverted;
            self.renderer.simulation_mode(reverted);
        }
    }

    /// Apply one event from a [`LiveChannel`](crate::LiveChannel).
    pub fn handle_channel_event(&mut self, event: ChannelEvent, now: OffsetDateTime) {
        match event {
            ChannelEvent::StateChanged(state) => self.set_connection_state(state),
            ChannelEvent::Frame(text) => {
                // Already logged and counted.
                let _ = self.handle_frame(&text, now);
            }
            ChannelEvent::Reconnecting { attempt, delay } => {
                debug!("Channel reconnecting in {:?} (attempt {})", delay, attempt);
            }
        }
    }

    fn handle_command(
        &mut self,
        command: DashboardCommand,
        control: &Arc<dyn ControlClient>,
        done: &mpsc::Sender<ToggleOutcome>,
    ) {
        let enabled = match command {
            DashboardCommand::SetSimulationMode(enabled) => enabled,
            DashboardCommand::ToggleSimulationMode => !self.simulation_mode,
        };
        let pending = self.request_simulation_mode(enabled);

        let Some(device_uuid) = self.config.device_uuid.clone() else {
            self.complete_simulation_toggle(pending, Err(ControlError::MissingDevice));
            return;
        };
        let control = Arc::clone(control);
        let done = done.clone();
        tokio::spawn(async move {
            let result = control
                .set_simulation_mode(&device_uuid, enabled)
                .await
                .map(|_| ());
            let _ = done.send(ToggleOutcome { pending, result }).await;
        });
    }

    /// Drive the session until `cancel` fires.
    ///
    /// Channel events, the one-second tick, user commands and toggle
    /// completions are handled one at a time on the calling task.
    pub async fn run(
        &mut self,
        mut channel: mpsc::Receiver<ChannelEvent>,
        mut commands: mpsc::Receiver<DashboardCommand>,
        control: Arc<dyn ControlClient>,
        cancel: CancellationToken,
    ) {
        let mut ticker = interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (done_tx, mut done_rx) = mpsc::channel::<ToggleOutcome>(8);
        let mut channel_open = true;
        let mut commands_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Dashboard session cancelled");
                    break;
                }
                event = channel.recv(), if channel_open => match event {
                    Some(event) => self.handle_channel_event(event, OffsetDateTime::now_utc()),
                    None => {
                        warn!("Live channel ended");
                        channel_open = false;
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command, &control, &done_tx),
                    None => commands_open = false,
                },
                Some(outcome) = done_rx.recv() => {
                    self.complete_simulation_toggle(outcome.pending, outcome.result);
                }
                _ = ticker.tick() => self.tick(OffsetDateTime::now_utc()),
            }
        }
    }
}

impl<R> Dashboard<R> {
    /// The session configuration.
    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// The persistence store.
    pub fn store(&self) -> &PersistenceStore {
        &self.store
    }

    /// The renderer.
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// The renderer, mutably.
    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Tear down the session and return the renderer.
    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Last known state of element `id` in `scope`.
    pub fn state(&self, scope: &Scope, id: &str) -> Option<&DeviceState> {
        self.states.get(scope)?.get(id)
    }

    /// All element states in `scope`.
    pub fn states(&self, scope: &Scope) -> Option<&BTreeMap<String, DeviceState>> {
        self.states.get(scope)
    }

    /// The buffer for a series.
    pub fn buffer(&self, key: &SeriesKey) -> Option<&SampleBuffer> {
        self.buffers.get(key)
    }

    /// Duration snapshots in `scope`.
    pub fn durations(&self, scope: &Scope) -> Option<&DurationAggregator> {
        self.durations.get(scope)
    }

    /// The value shown on the simulation toggle.
    pub fn simulation_mode(&self) -> bool {
        self.simulation_mode
    }

    /// The last value the server confirmed, if any.
    pub fn acknowledged_simulation_mode(&self) -> Option<bool> {
        self.acknowledged_simulation
    }

    /// Current channel state as last reported.
    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    /// Metrics shared with the channel.
    pub fn metrics(&self) -> Arc<ChannelMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}

fn draw_series<R: RenderAdapter>(
    renderer: &mut R,
    config: &DashboardConfig,
    key: &SeriesKey,
    buffer: &SampleBuffer,
    now: OffsetDateTime,
) {
    let window = config.window.window(buffer, now);
    let samples = buffer.range(window.start, window.end);
    renderer.series(SeriesFrame {
        key,
        label: config.label_for(&key.metric).unwrap_or(&key.metric),
        samples,
        window,
        range: config.window.value_range(samples),
    });
}
