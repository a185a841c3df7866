//! Channel and ingestion metrics.
//!
//! [`ChannelMetrics`] is shared (via `Arc`) between the channel task and the
//! dashboard session; every counter is atomic so neither needs a lock.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Snapshot of one timed operation type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    /// Total number of operations.
    pub count: u64,
    /// Number of successful operations.
    pub success_count: u64,
    /// Number of failed operations.
    pub failure_count: u64,
    /// Minimum operation duration.
    pub min_duration_ms: Option<u64>,
    /// Maximum operation duration.
    pub max_duration_ms: Option<u64>,
    /// Average operation duration.
    pub avg_duration_ms: Option<f64>,
}

/// Thread-safe atomic operation metrics tracker.
#[derive(Debug)]
pub struct AtomicOperationMetrics {
    count: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    total_duration_ms: AtomicU64,
    min_duration_ms: AtomicU64,
    max_duration_ms: AtomicU64,
}

impl Default for AtomicOperationMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicOperationMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            total_duration_ms: AtomicU64::new(0),
            min_duration_ms: AtomicU64::new(u64::MAX),
            max_duration_ms: AtomicU64::new(0),
        }
    }

    /// Record a successful operation.
    pub fn record_success(&self, duration: Duration) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.record(duration);
    }

    /// Record a failed operation.
    pub fn record_failure(&self, duration: Duration) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.record(duration);
    }

    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms.fetch_add(ms, Ordering::Relaxed);
        self.min_duration_ms.fetch_min(ms, Ordering::Relaxed);
        self.max_duration_ms.fetch_max(ms, Ordering::Relaxed);
    }

    /// Get a snapshot of the current metrics.
    pub fn snapshot(&self) -> OperationMetrics {
        let count = self.count.load(Ordering::Relaxed);
        let total = self.total_duration_ms.load(Ordering::Relaxed);
        let min = self.min_duration_ms.load(Ordering::Relaxed);

        OperationMetrics {
            count,
            success_count: self.success_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            min_duration_ms: (min != u64::MAX).then_some(min),
            max_duration_ms: (count > 0).then(|| self.max_duration_ms.load(Ordering::Relaxed)),
            avg_duration_ms: (count > 0).then(|| total as f64 / count as f64),
        }
    }
}

/// Counters for one live channel and the frames it delivered.
#[derive(Debug, Default)]
pub struct ChannelMetrics {
    /// Connection attempts, timed.
    pub connects: AtomicOperationMetrics,
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    transport_errors: AtomicU64,
    reconnects: AtomicU64,
}

impl ChannelMetrics {
    /// Create new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create shared metrics.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Record a frame delivered by the transport.
    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame that failed to normalize.
    pub fn record_malformed(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transport failure (connect or mid-stream).
    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a scheduled reconnect.
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a summary of all metrics.
    pub fn summary(&self) -> ChannelMetricsSummary {
        ChannelMetricsSummary {
            connects: self.connects.snapshot(),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

/// Serializable summary of channel metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelMetricsSummary {
    pub connects: OperationMetrics,
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub transport_errors: u64,
    pub reconnects: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_metrics() {
        let metrics = AtomicOperationMetrics::new();
        metrics.record_success(Duration::from_millis(100));
        metrics.record_failure(Duration::from_millis(300));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.count, 2);
        assert_eq!(snapshot.success_count, 1);
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.min_duration_ms, Some(100));
        assert_eq!(snapshot.max_duration_ms, Some(300));
        assert_eq!(snapshot.avg_duration_ms, Some(200.0));
    }

    #[test]
    fn test_channel_metrics_summary() {
        let metrics = ChannelMetrics::shared();
        metrics.connects.record_failure(Duration::ZERO);
        metrics.record_transport_error();
        metrics.record_reconnect();
        metrics.record_frame();
        metrics.record_frame();
        metrics.record_malformed();

        let summary = metrics.summary();
        assert_eq!(summary.connects.failure_count, 1);
        assert_eq!(summary.frames_received, 2);
        assert_eq!(summary.malformed_frames, 1);
        assert_eq!(summary.transport_errors, 1);
        assert_eq!(summary.reconnects, 1);
    }
}
