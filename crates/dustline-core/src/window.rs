//! Visible chart window for a metric.
//!
//! The window is a function of the buffer's extreme timestamps and the wall
//! clock, so it must be recomputed on every tick even when no data arrives.

use time::{Duration, OffsetDateTime};

use dustline_types::Sample;

use crate::buffer::SampleBuffer;

/// Width of the display window.
pub const TIME_WINDOW: Duration = Duration::minutes(5);

/// Widest span of data kept in memory.
pub const RETENTION: Duration = Duration::minutes(10);

/// Staleness after which the window anchors to the data instead of the clock.
pub const MAX_GAP: Duration = Duration::minutes(2);

/// A closed time range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl Window {
    /// Whether `ts` falls inside the window.
    #[must_use]
    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Width of the window.
    #[must_use]
    pub fn span(&self) -> Duration {
        self.end - self.start
    }
}

/// Y-axis bounds for a chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

/// Rules for the visible window and value range of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Width of the live window.
    pub time_window: Duration,
    /// How stale the newest sample may be before the window stops scrolling.
    pub max_gap: Duration,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            time_window: TIME_WINDOW,
            max_gap: MAX_GAP,
        }
    }
}

impl WindowPolicy {
    /// Compute the window from the oldest and newest sample timestamps.
    ///
    /// - no samples: `[now - time_window, now]`
    /// - newest sample older than `max_gap`: `[latest - time_window, latest]`
    /// - otherwise: `[min(earliest, now - time_window), now]`
    #[must_use]
    pub fn window_for(
        &self,
        extent: Option<(OffsetDateTime, OffsetDateTime)>,
        now: OffsetDateTime,
    ) -> Window {
        let ideal_start = now - self.time_window;
        match extent {
            None => Window {
                start: ideal_start,
                end: now,
            },
            Some((_, latest)) if now - latest > self.max_gap => Window {
                start: latest - self.time_window,
                end: latest,
            },
            Some((earliest, _)) => Window {
                start: earliest.min(ideal_start),
                end: now,
            },
        }
    }

    /// Compute the window for a buffer.
    #[must_use]
    pub fn window(&self, buffer: &SampleBuffer, now: OffsetDateTime) -> Window {
        self.window_for(buffer.extent(), now)
    }

    /// Y-axis bounds: two units of headroom either side, never below zero.
    ///
    /// Defaults to `[0, 10]` when there is nothing to show.
    #[must_use]
    pub fn value_range<'a, I>(&self, samples: I) -> ValueRange
    where
        I: IntoIterator<Item = &'a Sample>,
    {
        let (min, max) = samples
            .into_iter()
            .map(Sample::value)
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .map_or((0.0, 10.0), |(lo, hi)| ((lo - 2.0).max(0.0), hi + 2.0));
        ValueRange { min, max }
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    #[test]
    fn test_empty_buffer_window() {
        let policy = WindowPolicy::default();
        let window = policy.window(&SampleBuffer::new(), NOW);
        assert_eq!(window.start, NOW - Duration::minutes(5));
        assert_eq!(window.end, NOW);
        assert_eq!(window.span(), TIME_WINDOW);
    }

    #[test]
    fn test_live_window_scrolls_with_now() {
        let policy = WindowPolicy::default();
        let mut buffer = SampleBuffer::new();
        buffer.insert(NOW - Duration::minutes(1), 1.0, NOW);
        buffer.insert(NOW - Duration::seconds(10), 2.0, NOW);

        let window = policy.window(&buffer, NOW);
        assert_eq!(window.start, NOW - TIME_WINDOW);
        assert_eq!(window.end, NOW);
    }

    #[test]
    fn test_live_window_extends_to_early_data() {
        let policy = WindowPolicy::default();
        let mut buffer = SampleBuffer::new();
        buffer.insert(NOW - Duration::minutes(8), 1.0, NOW);
        buffer.insert(NOW - Duration::seconds(30), 2.0, NOW);

        let window = policy.window(&buffer, NOW);
        assert_eq!(window.start, NOW - Duration::minutes(8));
        assert_eq!(window.end, NOW);
    }

    #[test]
    fn test_stale_data_anchors_to_latest() {
        let policy = WindowPolicy::default();
        let latest = NOW - Duration::minutes(3);
        let mut buffer = SampleBuffer::new();
        buffer.insert(latest - Duration::minutes(1), 1.0, NOW);
        buffer.insert(latest, 2.0, NOW);

        let window = policy.window(&buffer, NOW);
        assert_eq!(window.start, latest - TIME_WINDOW);
        assert_eq!(window.end, latest);
        assert!(window.contains(latest));
    }

    #[test]
    fn test_gap_of_exactly_max_gap_still_scrolls() {
        let policy = WindowPolicy::default();
        let latest = NOW - MAX_GAP;
        let window = policy.window_for(Some((latest, latest)), NOW);
        assert_eq!(window.end, NOW);
    }

    #[test]
    fn test_value_range() {
        let policy = WindowPolicy::default();
        assert_eq!(
            policy.value_range(std::iter::empty()),
            ValueRange {
                min: 0.0,
                max: 10.0
            }
        );

        let samples = [Sample::new(NOW, 1.0), Sample::new(NOW, 12.5)];
        assert_eq!(
            policy.value_range(&samples),
            ValueRange {
                min: 0.0,
                max: 14.5
            }
        );

        let samples = [Sample::new(NOW, 20.0), Sample::new(NOW, 30.0)];
        assert_eq!(policy.value_range(&samples).min, 18.0);
    }
}
