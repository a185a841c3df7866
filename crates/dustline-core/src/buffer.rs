//! Bounded, deduplicated, time-ordered sample storage for one metric.
//!
//! A [`SampleBuffer`] maintains these invariants after every mutation:
//!
//! - timestamps are in non-decreasing order
//! - no two retained samples are closer than [`DEDUP_EPSILON`]
//! - at most [`MAX_DATA_POINTS`] samples are retained (oldest evicted first)
//! - every retained timestamp is at or after `now - RETENTION`
//!
//! Samples may arrive out of order, e.g. when a reconnect replays state older
//! than what is already buffered; insertion places them at their sorted slot.

use time::{Duration, OffsetDateTime};
use tracing::trace;

use dustline_types::Sample;

use crate::window::RETENTION;

/// Maximum number of samples kept per metric.
pub const MAX_DATA_POINTS: usize = 100;

/// Two samples closer than this occupy the same slot.
pub const DEDUP_EPSILON: Duration = Duration::SECOND;

/// What [`SampleBuffer::insert`] did with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The sample took a new slot.
    Added,
    /// The sample replaced an older one within the epsilon window.
    Replaced,
    /// The sample was not kept: a sample at least as recent holds the slot,
    /// it is older than everything in a full buffer, or it is not finite.
    Ignored,
    /// The sample is older than the retention cutoff.
    Expired,
}

impl InsertOutcome {
    /// Whether the buffer contents changed.
    #[must_use]
    pub fn changed(self) -> bool {
        matches!(self, Self::Added | Self::Replaced)
    }
}

/// Time-ordered samples for one series.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Vec<Sample>,
    capacity: usize,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleBuffer {
    /// Create an empty buffer holding up to [`MAX_DATA_POINTS`] samples.
    pub fn new() -> Self {
        Self::with_capacity(MAX_DATA_POINTS)
    }

    /// Create an empty buffer with a custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity.min(MAX_DATA_POINTS)),
            capacity: capacity.max(1),
        }
    }

    /// Rebuild a buffer from restored samples.
    ///
    /// Every sample goes through [`insert`](Self::insert), so duplicates,
    /// disorder and expired entries in persisted data are cleaned up.
    pub fn from_samples<I>(samples: I, now: OffsetDateTime) -> Self
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut buffer = Self::new();
        for sample in samples {
            buffer.insert(sample.timestamp(), sample.value(), now);
        }
        buffer
    }

    /// Prune, then insert an observation and enforce capacity.
    pub fn insert(&mut self, timestamp: OffsetDateTime, value: f64, now: OffsetDateTime) -> InsertOutcome {
        self.prune(now);
        if timestamp < now - RETENTION {
            return InsertOutcome::Expired;
        }
        if !value.is_finite() {
            trace!("Ignoring non-finite sample at {}", timestamp);
            return InsertOutcome::Ignored;
        }

        let lo = self
            .samples
            .partition_point(|s| s.timestamp() <= timestamp - DEDUP_EPSILON);
        let hi = self
            .samples
            .partition_point(|s| s.timestamp() < timestamp + DEDUP_EPSILON);
        let sample = Sample::new(timestamp, value);

        if lo == hi {
            // Older than everything in a full buffer: it would be the one evicted.
            if lo == 0 && self.samples.len() >= self.capacity {
                return InsertOutcome::Ignored;
            }
            self.samples.insert(lo, sample);
            if self.samples.len() > self.capacity {
                let excess = self.samples.len() - self.capacity;
                self.samples.drain(..excess);
                trace!("Evicted {} samples over capacity", excess);
            }
            InsertOutcome::Added
        } else if self.samples[lo..hi].iter().all(|s| s.timestamp() < timestamp) {
            self.samples.splice(lo..hi, [sample]);
            InsertOutcome::Replaced
        } else {
            InsertOutcome::Ignored
        }
    }

    /// Drop samples older than `now - RETENTION`. Returns how many were removed.
    pub fn prune(&mut self, now: OffsetDateTime) -> usize {
        let cutoff = now - RETENTION;
        let expired = self.samples.partition_point(|s| s.timestamp() < cutoff);
        self.samples.drain(..expired);
        expired
    }

    /// Samples with timestamps in `[start, end]`, oldest first.
    ///
    /// The iterator borrows the buffer and can be cloned to restart it.
    pub fn query(
        &self,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> impl Iterator<Item = &Sample> + Clone + '_ {
        self.range(start, end).iter()
    }

    /// The contiguous run of samples with timestamps in `[start, end]`.
    pub fn range(&self, start: OffsetDateTime, end: OffsetDateTime) -> &[Sample] {
        let lo = self.samples.partition_point(|s| s.timestamp() < start);
        let hi = self.samples.partition_point(|s| s.timestamp() <= end);
        &self.samples[lo..hi.max(lo)]
    }

    /// All samples, oldest first.
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// The samples as a slice.
    pub fn as_slice(&self) -> &[Sample] {
        &self.samples
    }

    /// The oldest sample.
    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    /// The newest sample.
    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    /// Timestamps of the oldest and newest samples.
    pub fn extent(&self) -> Option<(OffsetDateTime, OffsetDateTime)> {
        Some((self.first()?.timestamp(), self.last()?.timestamp()))
    }

    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of retained samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<'a> IntoIterator for &'a SampleBuffer {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use time::macros::datetime;

    use super::*;

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00:00 UTC);

    fn at(ms: i64) -> OffsetDateTime {
        NOW - Duration::minutes(9) + Duration::milliseconds(ms)
    }

    fn values(buffer: &SampleBuffer) -> Vec<f64> {
        buffer.iter().map(Sample::value).collect()
    }

    #[test]
    fn test_out_of_order_inserts_are_sorted() {
        let mut buffer = SampleBuffer::new();
        assert_eq!(buffer.insert(at(5_000), 5.0, NOW), InsertOutcome::Added);
        assert_eq!(buffer.insert(at(1_000), 1.0, NOW), InsertOutcome::Added);
        assert_eq!(buffer.insert(at(3_000), 3.0, NOW), InsertOutcome::Added);

        assert_eq!(values(&buffer), vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn test_later_sample_within_epsilon_replaces() {
        let mut buffer = SampleBuffer::new();
        buffer.insert(at(1_000), 1.0, NOW);
        assert_eq!(buffer.insert(at(1_600), 2.0, NOW), InsertOutcome::Replaced);

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.last().unwrap().timestamp(), at(1_600));
        assert_eq!(buffer.last().unwrap().value(), 2.0);
    }

    #[test]
    fn test_earlier_or_equal_sample_within_epsilon_is_ignored() {
        let mut buffer = SampleBuffer::new();
        buffer.insert(at(1_600), 2.0, NOW);
        assert_eq!(buffer.insert(at(1_000), 1.0, NOW), InsertOutcome::Ignored);
        assert_eq!(buffer.insert(at(1_600), 9.0, NOW), InsertOutcome::Ignored);

        assert_eq!(values(&buffer), vec![2.0]);
    }

    #[test]
    fn test_exactly_epsilon_apart_are_distinct() {
        let mut buffer = SampleBuffer::new();
        buffer.insert(at(1_000), 1.0, NOW);
        assert_eq!(buffer.insert(at(2_000), 2.0, NOW), InsertOutcome::Added);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_sample_between_two_neighbours() {
        let mut buffer = SampleBuffer::new();
        buffer.insert(at(1_000), 1.0, NOW);
        buffer.insert(at(2_500), 2.5, NOW);

        // Within epsilon of both, but not later than the second.
        assert_eq!(buffer.insert(at(1_800), 1.8, NOW), InsertOutcome::Ignored);
        assert_eq!(values(&buffer), vec![1.0, 2.5]);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut buffer = SampleBuffer::new();
        for i in 0..(MAX_DATA_POINTS as i64 + 10) {
            buffer.insert(at(i * 2_000), i as f64, NOW);
        }

        assert_eq!(buffer.len(), MAX_DATA_POINTS);
        assert_eq!(buffer.first().unwrap().value(), 10.0);
        assert_eq!(
            buffer.last().unwrap().value(),
            (MAX_DATA_POINTS + 9) as f64
        );
    }

    #[test]
    fn test_sample_older_than_full_buffer_is_ignored() {
        let mut buffer = SampleBuffer::with_capacity(3);
        for i in 1..=3 {
            buffer.insert(at(i * 10_000), i as f64, NOW);
        }

        assert_eq!(buffer.insert(at(0), 0.0, NOW), InsertOutcome::Ignored);
        assert_eq!(values(&buffer), vec![1.0, 2.0, 3.0]);

        // A newer sample still evicts the oldest.
        assert_eq!(buffer.insert(at(40_000), 4.0, NOW), InsertOutcome::Added);
        assert_eq!(values(&buffer), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_non_finite_values_are_ignored() {
        let mut buffer = SampleBuffer::new();
        buffer.insert(at(1_000), 1.0, NOW);
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert_eq!(buffer.insert(at(5_000), value, NOW), InsertOutcome::Ignored);
        }
        assert_eq!(values(&buffer), vec![1.0]);
    }

    #[test]
    fn test_expired_sample_is_not_kept() {
        let mut buffer = SampleBuffer::new();
        let old = NOW - RETENTION - Duration::SECOND;
        assert_eq!(buffer.insert(old, 1.0, NOW), InsertOutcome::Expired);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_prune_drops_samples_past_retention() {
        let mut buffer = SampleBuffer::new();
        buffer.insert(at(0), 0.0, NOW);
        buffer.insert(at(120_000), 1.0, NOW);

        let later = NOW + Duration::minutes(2);
        assert_eq!(buffer.prune(later), 1);
        assert_eq!(values(&buffer), vec![1.0]);
        assert_eq!(buffer.prune(later), 0);
    }

    #[test]
    fn test_query_is_inclusive_and_restartable() {
        let mut buffer = SampleBuffer::new();
        for i in 0..5 {
            buffer.insert(at(i * 10_000), i as f64, NOW);
        }

        let query = buffer.query(at(10_000), at(30_000));
        let first: Vec<f64> = query.clone().map(Sample::value).collect();
        let second: Vec<f64> = query.map(Sample::value).collect();
        assert_eq!(first, vec![1.0, 2.0, 3.0]);
        assert_eq!(first, second);
        assert_eq!(buffer.len(), 5);
    }

    #[test]
    fn test_query_inverted_range_is_empty() {
        let mut buffer = SampleBuffer::new();
        buffer.insert(at(10_000), 1.0, NOW);
        assert_eq!(buffer.query(at(20_000), at(0)).count(), 0);
    }

    #[test]
    fn test_from_samples_cleans_restored_data() {
        let restored = vec![
            Sample::new(at(3_000), 3.0),
            Sample::new(at(1_000), 1.0),
            Sample::new(at(1_400), 1.4),
            Sample::new(NOW - Duration::hours(1), 0.0),
        ];
        let buffer = SampleBuffer::from_samples(restored, NOW);

        assert_eq!(values(&buffer), vec![1.4, 3.0]);
        assert_eq!(buffer.extent(), Some((at(1_400), at(3_000))));
    }

    #[test]
    fn test_empty_buffer_accessors() {
        let buffer = SampleBuffer::new();
        assert!(buffer.is_empty());
        assert!(buffer.first().is_none());
        assert!(buffer.extent().is_none());
        assert_eq!(buffer.capacity(), MAX_DATA_POINTS);
    }

    proptest! {
        #[test]
        fn prop_insert_keeps_invariants(
            offsets in proptest::collection::vec(0i64..540_000, 0..300),
        ) {
            let mut buffer = SampleBuffer::new();
            for (i, offset) in offsets.iter().enumerate() {
                let outcome = buffer.insert(at(*offset), i as f64, NOW);

                if outcome.changed() {
                    prop_assert!(buffer.iter().any(|s| s.timestamp() == at(*offset)));
                }

                prop_assert!(buffer.len() <= MAX_DATA_POINTS);
                for pair in buffer.as_slice().windows(2) {
                    prop_assert!(pair[0].timestamp() < pair[1].timestamp());
                    prop_assert!(pair[1].timestamp() - pair[0].timestamp() >= DEDUP_EPSILON);
                }
                for sample in &buffer {
                    prop_assert!(sample.timestamp() >= NOW - RETENTION);
                }
            }
        }

        #[test]
        fn prop_latest_in_slot_wins(base in 0i64..500_000, delta in 1i64..1_000) {
            let mut buffer = SampleBuffer::new();
            buffer.insert(at(base), 1.0, NOW);
            buffer.insert(at(base + delta), 2.0, NOW);

            prop_assert_eq!(buffer.len(), 1);
            prop_assert_eq!(buffer.last().unwrap().value(), 2.0);
        }
    }
}
