//! Reconnecting server-push channel.
//!
//! [`LiveChannel`] owns the connection state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (error) -> Disconnected
//!      ^                                                    |
//!      +---------------- after reconnect_delay -------------+
//! ```
//!
//! Reconnection uses a fixed delay and never gives up. The channel only
//! forwards raw frames; normalization happens in the session that consumes
//! the [`ChannelEvent`]s.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::metrics::ChannelMetrics;
use crate::transport::Transport;

/// Delay between a transport failure and the next connection attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Connection state of a [`LiveChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// Whether the state machine allows moving from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// What a [`LiveChannel`] reports to its consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A raw text frame arrived.
    Frame(String),
    /// A reconnect is scheduled after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
}

/// Options for a [`LiveChannel`].
///
/// ```
/// use std::time::Duration;
/// use dustline_core::ChannelOptions;
///
/// let options = ChannelOptions::default()
///     .reconnect_delay(Duration::from_secs(5))
///     .buffer_size(64);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ChannelOptions {
    /// Fixed delay before each reconnect attempt. Default: 3 seconds.
    pub reconnect_delay: Duration,
    /// Capacity of the event channel. Default: 64 events.
    pub buffer_size: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
            buffer_size: 64,
        }
    }
}

impl ChannelOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reconnect delay.
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Set the event buffer size.
    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Validate the options and return an error if invalid.
    ///
    /// Checks that:
    /// - `reconnect_delay` is > 0
    /// - `buffer_size` is > 0
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_delay.is_zero() {
            return Err(Error::invalid_config("reconnect_delay must be > 0"));
        }
        if self.buffer_size == 0 {
            return Err(Error::invalid_config("buffer_size must be > 0"));
        }
        Ok(())
    }
}

/// A server-push client that reconnects forever.
pub struct LiveChannel {
    transport: Arc<dyn Transport>,
    options: ChannelOptions,
    metrics: Arc<ChannelMetrics>,
    state: ConnectionState,
}

impl fmt::Debug for LiveChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveChannel")
            .field("endpoint", &self.transport.endpoint())
            .field("options", &self.options)
            .field("state", &self.state)
            .finish()
    }
}

impl LiveChannel {
    /// Create a channel over `transport`.
    pub fn new(transport: Arc<dyn Transport>, options: ChannelOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            transport,
            options,
            metrics: ChannelMetrics::shared(),
            state: ConnectionState::Disconnected,
        })
    }

    /// Share an existing metrics instance.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<ChannelMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Metrics for this channel.
    pub fn metrics(&self) -> Arc<ChannelMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Run the channel on a background task.
    ///
    /// The task stops when `cancel` fires or the receiver is dropped.
    pub fn spawn(self, cancel: CancellationToken) -> (mpsc::Receiver<ChannelEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.options.buffer_size);
        let handle = tokio::spawn(self.run(tx, cancel));
        (rx, handle)
    }

    /// Run the connect/read/reconnect loop until cancelled.
    pub async fn run(mut self, tx: mpsc::Sender<ChannelEvent>, cancel: CancellationToken) {
        let mut attempt: u32 = 0;
        info!("Live channel starting for {}", self.transport.endpoint());

        loop {
            if !self.transition(&tx, ConnectionState::Connecting).await {
                return;
            }

            let started = Instant::now();
            let connected = tokio::select! {
                _ = cancel.cancelled() => break,
                result = self.transport.connect() => result,
            };

            match connected {
                Ok(mut source) => {
                    self.metrics.connects.record_success(started.elapsed());
                    attempt = 0;
                    if !self.transition(&tx, ConnectionState::Connected).await {
                        return;
                    }

                    loop {
                        let next = tokio::select! {
                            _ = cancel.cancelled() => {
                                self.transition(&tx, ConnectionState::Disconnected).await;
                                debug!("Live channel cancelled while connected");
                                return;
                            }
                            next = source.next_frame() => next,
                        };

                        match next {
                            Ok(Some(frame)) => {
                                self.metrics.record_frame();
                                if tx.send(ChannelEvent::Frame(frame)).await.is_err() {
                                    debug!("Channel receiver dropped, stopping");
                                    return;
                                }
                            }
                            Ok(None) => {
                                info!("Server closed {}", self.transport.endpoint());
                                break;
                            }
                            Err(e) => {
                                self.metrics.record_transport_error();
                                warn!("Stream error on {}: {}", self.transport.endpoint(), e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    self.metrics.connects.record_failure(started.elapsed());
                    self.metrics.record_transport_error();
                    warn!("Failed to connect to {}: {}", self.transport.endpoint(), e);
                }
            }

            if !self.transition(&tx, ConnectionState::Disconnected).await {
                return;
            }

            attempt = attempt.saturating_add(1);
            let delay = self.options.reconnect_delay;
            self.metrics.record_reconnect();
            info!("Reconnecting in {:?} (attempt {})", delay, attempt);
            if tx
                .send(ChannelEvent::Reconnecting { attempt, delay })
                .await
                .is_err()
            {
                return;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }

        if self.state != ConnectionState::Disconnected {
            self.transition(&tx, ConnectionState::Disconnected).await;
        }
        debug!("Live channel stopped");
    }

    /// Move to `next` and report it. Returns `false` if the receiver is gone.
    async fn transition(&mut self, tx: &mpsc::Sender<ChannelEvent>, next: ConnectionState) -> bool {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {}",
            self.state,
            next
        );
        debug!("Connection state {} -> {}", self.state, next);
        self.state = next;
        tx.send(ChannelEvent::StateChanged(next)).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    #[test]
    fn test_transitions() {
        use ConnectionState::*;
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Disconnected));
        assert!(Connected.can_transition_to(Disconnected));

        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connecting));
        assert!(!Connected.can_transition_to(Connected));
    }

    #[test]
    fn test_options_validate() {
        assert!(ChannelOptions::default().validate().is_ok());
        assert_eq!(ChannelOptions::default().reconnect_delay, RECONNECT_DELAY);
        assert!(
            ChannelOptions::default()
                .reconnect_delay(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(ChannelOptions::default().buffer_size(0).validate().is_err());
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let transport = Arc::new(MockTransport::new());
        let result = LiveChannel::new(transport, ChannelOptions::default().buffer_size(0));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_then_close_reconnects() {
        let transport = Arc::new(
            MockTransport::builder()
                .session(["a", "b"])
                .session(["c"])
                .build(),
        );
        let channel = LiveChannel::new(transport.clone(), ChannelOptions::default()).unwrap();
        let cancel = CancellationToken::new();
        let (mut rx, handle) = channel.spawn(cancel.clone());

        let mut events = Vec::new();
        while events.len() < 12 {
            events.push(rx.recv().await.unwrap());
        }
        cancel.cancel();
        handle.await.unwrap();

        use ConnectionState::*;
        assert_eq!(
            events,
            vec![
                ChannelEvent::StateChanged(Connecting),
                ChannelEvent::StateChanged(Connected),
                ChannelEvent::Frame("a".to_string()),
                ChannelEvent::Frame("b".to_string()),
                ChannelEvent::StateChanged(Disconnected),
                ChannelEvent::Reconnecting {
                    attempt: 1,
                    delay: RECONNECT_DELAY
                },
                ChannelEvent::StateChanged(Connecting),
                ChannelEvent::StateChanged(Connected),
                ChannelEvent::Frame("c".to_string()),
                ChannelEvent::StateChanged(Disconnected),
                ChannelEvent::Reconnecting {
                    attempt: 1,
                    delay: RECONNECT_DELAY
                },
                ChannelEvent::StateChanged(Connecting),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_reconnect_timer() {
        let transport = Arc::new(MockTransport::builder().fail_connect(true).build());
        let channel = LiveChannel::new(transport.clone(), ChannelOptions::default()).unwrap();
        let metrics = channel.metrics();
        let cancel = CancellationToken::new();
        let (mut rx, handle) = channel.spawn(cancel.clone());

        // Wait until the first reconnect is scheduled, then tear down.
        loop {
            if let Some(ChannelEvent::Reconnecting { .. }) = rx.recv().await {
                break;
            }
        }
        cancel.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(metrics.summary().connects.failure_count, 1);
    }
}
