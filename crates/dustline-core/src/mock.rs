//! Test doubles for the transport, control and rendering seams.
//!
//! - [`MockTransport`] implements [`Transport`] with scripted sessions,
//!   failure injection and connect-time recording.
//! - [`MockControl`] implements [`ControlClient`] with failure injection.
//! - [`RecordingRenderer`] implements [`RenderAdapter`] and keeps every call.
//!
//! Everything here runs without a network, so sessions and channels can be
//! exercised under a paused tokio clock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use dustline_types::{ElementKind, Sample, Scope, SeriesKey, StateValue};

use crate::channel::ConnectionState;
use crate::control::{self, ControlClient};
use crate::durations::DurationView;
use crate::error::{ControlError, Error, Result};
use crate::render::{RenderAdapter, SeriesFrame};
use crate::transport::{FrameSource, Transport};
use crate::window::{ValueRange, Window};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
enum SessionEnd {
    Close,
    Error(String),
}

#[derive(Debug, Clone)]
struct MockSession {
    frames: Vec<String>,
    end: SessionEnd,
}

/// A scripted push endpoint.
///
/// Each successful connect consumes the next scripted session: its frames
/// are delivered in order, then the session ends with a clean close or an
/// error. Once the script runs out, connections succeed but stay silent.
///
/// # Example
///
/// ```
/// use dustline_core::mock::MockTransport;
///
/// let transport = MockTransport::builder()
///     .session([r#"{"event":"ping"}"#])
///     .transient_failures(2)
///     .build();
/// assert_eq!(transport.connect_count(), 0);
/// ```
#[derive(Debug)]
pub struct MockTransport {
    sessions: Mutex<VecDeque<MockSession>>,
    fail_connect: AtomicBool,
    remaining_failures: AtomicU32,
    connect_latency_ms: AtomicU64,
    connect_count: AtomicU32,
    connect_times: Mutex<Vec<Instant>>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a transport with no scripted sessions.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a scripted transport.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// Append a session that delivers `frames` then closes cleanly.
    pub fn push_session<I, S>(&self, frames: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.sessions).push_back(MockSession {
            frames: frames.into_iter().map(Into::into).collect(),
            end: SessionEnd::Close,
        });
    }

    /// Make every connect attempt fail (or succeed again).
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::Relaxed);
    }

    /// Fail the next `count` connect attempts, then behave normally.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::Relaxed);
    }

    /// Number of connect attempts so far.
    pub fn connect_count(&self) -> u32 {
        self.connect_count.load(Ordering::Relaxed)
    }

    /// When each connect attempt started, on the tokio clock.
    pub fn connect_times(&self) -> Vec<Instant> {
        lock(&self.connect_times).clone()
    }

    /// Scripted sessions not yet consumed.
    pub fn remaining_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self) -> Result<Box<dyn FrameSource>> {
        self.connect_count.fetch_add(1, Ordering::Relaxed);
        lock(&self.connect_times).push(Instant::now());

        let latency = self.connect_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.remaining_failures.load(Ordering::Relaxed) > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(Error::transport("mock transient connect failure"));
        }
        if self.fail_connect.load(Ordering::Relaxed) {
            return Err(Error::transport("mock connect failure"));
        }

        match lock(&self.sessions).pop_front() {
            Some(session) => Ok(Box::new(ScriptedSource {
                frames: session.frames.into(),
                end: session.end,
            })),
            None => Ok(Box::new(IdleSource)),
        }
    }

    fn endpoint(&self) -> String {
        "mock://push".to_string()
    }
}

/// Builder for [`MockTransport`].
#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    sessions: Vec<MockSession>,
    fail_connect: bool,
    transient_failures: u32,
    connect_latency: Duration,
}

impl MockTransportBuilder {
    /// Script a session that delivers `frames` then closes cleanly.
    #[must_use]
    pub fn session<I, S>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sessions.push(MockSession {
            frames: frames.into_iter().map(Into::into).collect(),
            end: SessionEnd::Close,
        });
        self
    }

    /// Script a session that delivers `frames` then fails with `message`.
    #[must_use]
    pub fn session_then_error<I, S>(mut self, frames: I, message: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sessions.push(MockSession {
            frames: frames.into_iter().map(Into::into).collect(),
            end: SessionEnd::Error(message.to_string()),
        });
        self
    }

    /// Fail every connect attempt.
    #[must_use]
    pub fn fail_connect(mut self, fail: bool) -> Self {
        self.fail_connect = fail;
        self
    }

    /// Fail the first `count` connect attempts.
    #[must_use]
    pub fn transient_failures(mut self, count: u32) -> Self {
        self.transient_failures = count;
        self
    }

    /// Delay every connect attempt.
    #[must_use]
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = latency;
        self
    }

    /// Build the transport.
    pub fn build(self) -> MockTransport {
        MockTransport {
            sessions: Mutex::new(self.sessions.into()),
            fail_connect: AtomicBool::new(self.fail_connect),
            remaining_failures: AtomicU32::new(self.transient_failures),
            connect_latency_ms: AtomicU64::new(self.connect_latency.as_millis() as u64),
            connect_count: AtomicU32::new(0),
            connect_times: Mutex::new(Vec::new()),
        }
    }
}

struct ScriptedSource {
    frames: VecDeque<String>,
    end: SessionEnd,
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(Some(frame));
        }
        match &self.end {
            SessionEnd::Close => Ok(None),
            SessionEnd::Error(message) => Err(Error::transport(message.clone())),
        }
    }
}

struct IdleSource;

#[async_trait]
impl FrameSource for IdleSource {
    async fn next_frame(&mut self) -> Result<Option<String>> {
        std::future::pending().await
    }
}

/// A [`ControlClient`] that records calls and can be told to fail.
#[derive(Debug, Default)]
pub struct MockControl {
    should_fail: AtomicBool,
    latency_ms: AtomicU64,
    calls: Mutex<Vec<(String, bool)>>,
}

impl MockControl {
    /// Create a control client that accepts every toggle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a control client that rejects every toggle.
    pub fn failing() -> Self {
        let control = Self::new();
        control.set_should_fail(true);
        control
    }

    /// Make subsequent calls fail (or succeed).
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::Relaxed);
    }

    /// Delay each call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Every `(device_uuid, enabled)` request so far.
    pub fn calls(&self) -> Vec<(String, bool)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl ControlClient for MockControl {
    async fn set_simulation_mode(
        &self,
        device_uuid: &str,
        enabled: bool,
    ) -> control::Result<serde_json::Value> {
        lock(&self.calls).push((device_uuid.to_string(), enabled));

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.should_fail.load(Ordering::Relaxed) {
            return Err(ControlError::ApiError {
                status: 503,
                message: "Mock failure".to_string(),
            });
        }
        Ok(serde_json::json!({ "success": true, "enabled": enabled }))
    }
}

/// One call made to a [`RecordingRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    DeviceState {
        scope: Scope,
        id: String,
        kind: ElementKind,
        value: StateValue,
    },
    Durations {
        scope: Scope,
        id: String,
        view: DurationView,
    },
    Concentration {
        scope: Scope,
        id: String,
        value: f64,
    },
    Series {
        key: SeriesKey,
        label: String,
        samples: Vec<Sample>,
        window: Window,
        range: ValueRange,
    },
    SimulationMode(bool),
    Connection(ConnectionState),
    Alert(String),
}

/// A [`RenderAdapter`] that keeps every call for inspection.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    calls: Vec<RenderCall>,
}

impl RecordingRenderer {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All calls so far, oldest first.
    pub fn calls(&self) -> &[RenderCall] {
        &self.calls
    }

    /// Forget recorded calls.
    pub fn clear(&mut self) {
        self.calls.clear();
    }

    /// Messages passed to [`RenderAdapter::alert`].
    pub fn alerts(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::Alert(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Every value the simulation toggle was set to.
    pub fn simulation_modes(&self) -> Vec<bool> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::SimulationMode(enabled) => Some(*enabled),
                _ => None,
            })
            .collect()
    }

    /// The most recent value shown for element `id`.
    pub fn last_state(&self, id: &str) -> Option<&StateValue> {
        self.calls.iter().rev().find_map(|call| match call {
            RenderCall::DeviceState { id: shown, value, .. } if shown == id => Some(value),
            _ => None,
        })
    }

    /// The most recent duration view for `id`.
    pub fn last_durations(&self, id: &str) -> Option<&DurationView> {
        self.calls.iter().rev().find_map(|call| match call {
            RenderCall::Durations { id: shown, view, .. } if shown == id => Some(view),
            _ => None,
        })
    }

    /// The most recent concentration readout for `id`.
    pub fn last_concentration(&self, id: &str) -> Option<f64> {
        self.calls.iter().rev().find_map(|call| match call {
            RenderCall::Concentration { id: shown, value, .. } if shown == id => Some(*value),
            _ => None,
        })
    }

    /// The most recent chart refresh for `key`: samples, window and range.
    pub fn last_series(&self, key: &SeriesKey) -> Option<(&[Sample], Window, ValueRange)> {
        self.calls.iter().rev().find_map(|call| match call {
            RenderCall::Series {
                key: shown,
                samples,
                window,
                range,
                ..
            } if shown == key => Some((samples.as_slice(), *window, *range)),
            _ => None,
        })
    }

    /// Number of chart refreshes for `key`.
    pub fn series_count(&self, key: &SeriesKey) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, RenderCall::Series { key: shown, .. } if shown == key))
            .count()
    }
}

impl RenderAdapter for RecordingRenderer {
    fn device_state(&mut self, scope: &Scope, id: &str, kind: ElementKind, value: &StateValue) {
        self.calls.push(RenderCall::DeviceState {
            scope: scope.clone(),
            id: id.to_string(),
            kind,
            value: value.clone(),
        });
    }

    fn durations(&mut self, scope: &Scope, id: &str, view: &DurationView) {
        self.calls.push(RenderCall::Durations {
            scope: scope.clone(),
            id: id.to_string(),
            view: *view,
        });
    }

    fn concentration(&mut self, scope: &Scope, id: &str, value: f64) {
        self.calls.push(RenderCall::Concentration {
            scope: scope.clone(),
            id: id.to_string(),
            value,
        });
    }

    fn series(&mut self, frame: SeriesFrame<'_>) {
        self.calls.push(RenderCall::Series {
            key: frame.key.clone(),
            label: frame.label.to_string(),
            samples: frame.samples.to_vec(),
            window: frame.window,
            range: frame.range,
        });
    }

    fn simulation_mode(&mut self, enabled: bool) {
        self.calls.push(RenderCall::SimulationMode(enabled));
    }

    fn connection(&mut self, state: ConnectionState) {
        self.calls.push(RenderCall::Connection(state));
    }

    fn alert(&mut self, message: &str) {
        self.calls.push(RenderCall::Alert(message.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_sessions_in_order() {
        let transport = MockTransport::builder()
            .session(["a"])
            .session_then_error(["b"], "reset by peer")
            .build();

        let mut first = transport.connect().await.unwrap();
        assert_eq!(first.next_frame().await.unwrap(), Some("a".to_string()));
        assert_eq!(first.next_frame().await.unwrap(), None);

        let mut second = transport.connect().await.unwrap();
        assert_eq!(second.next_frame().await.unwrap(), Some("b".to_string()));
        assert!(second.next_frame().await.is_err());

        assert_eq!(transport.connect_count(), 2);
        assert_eq!(transport.remaining_sessions(), 0);
    }

    #[tokio::test]
    async fn test_transient_failures() {
        let transport = MockTransport::builder().transient_failures(2).build();
        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_err());
        assert!(transport.connect().await.is_ok());
        assert_eq!(transport.connect_count(), 3);
    }

    #[tokio::test]
    async fn test_fail_connect_toggle() {
        let transport = MockTransport::builder().fail_connect(true).build();
        assert!(transport.connect().await.is_err());
        transport.set_fail_connect(false);
        transport.push_session(["x"]);
        let mut source = transport.connect().await.unwrap();
        assert_eq!(source.next_frame().await.unwrap(), Some("x".to_string()));
    }

    #[tokio::test]
    async fn test_mock_control() {
        let control = MockControl::new();
        assert!(control.set_simulation_mode("DC-01", true).await.is_ok());

        control.set_should_fail(true);
        let err = control.set_simulation_mode("DC-01", false).await.unwrap_err();
        assert!(matches!(err, ControlError::ApiError { status: 503, .. }));

        assert_eq!(
            control.calls(),
            vec![("DC-01".to_string(), true), ("DC-01".to_string(), false)]
        );
    }

    #[test]
    fn test_recording_renderer_helpers() {
        let mut renderer = RecordingRenderer::new();
        renderer.device_state(&Scope::Global, "Tool1", ElementKind::Tool, &"ON".into());
        renderer.device_state(&Scope::Global, "Tool1", ElementKind::Tool, &"OFF".into());
        renderer.simulation_mode(true);
        renderer.alert("boom");

        assert_eq!(renderer.last_state("Tool1"), Some(&StateValue::from("OFF")));
        assert_eq!(renderer.simulation_modes(), vec![true]);
        assert_eq!(renderer.alerts(), vec!["boom"]);

        renderer.clear();
        assert!(renderer.calls().is_empty());
    }
}
