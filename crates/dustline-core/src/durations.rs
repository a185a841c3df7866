//! Cumulative ON/OFF/UNAVAILABLE duration statistics.
//!
//! Upstream sends authoritative cumulative snapshots, so the aggregator keeps
//! the latest snapshot per data item and never sums anything itself.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use dustline_types::{DurationCounts, ParseError, Percentages};

/// Powered time below this many minutes is reported as unknown.
const MIN_POWERED_MINUTES: f64 = 2.0;

/// Why percentages could not be derived.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum DurationError {
    /// The snapshot totals zero seconds.
    #[error("Duration snapshot for '{0}' totals zero seconds")]
    ZeroDuration(String),

    /// No snapshot has been applied for this id.
    #[error("No duration snapshot for '{0}'")]
    Unknown(String),

    /// The snapshot contains a negative or non-finite counter.
    #[error("Rejected duration snapshot: {0}")]
    Invalid(#[from] ParseError),
}

/// Split a snapshot into percentages of its total.
pub fn percentages_of(id: &str, counts: &DurationCounts) -> Result<Percentages, DurationError> {
    let total = counts.total();
    if total <= 0.0 {
        return Err(DurationError::ZeroDuration(id.to_string()));
    }
    Ok(Percentages {
        on: counts.on / total * 100.0,
        off: counts.off / total * 100.0,
        unavailable: counts.unavailable / total * 100.0,
    })
}

/// What the renderer needs to draw one duration chart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationView {
    /// The counts the view was derived from (the fallback if none usable).
    pub counts: DurationCounts,
    /// Three-way split, summing to 100.
    pub percentages: Percentages,
    /// Total seconds across all states.
    pub total_seconds: f64,
    /// Total in minutes, when long enough to be meaningful.
    pub powered_minutes: Option<f64>,
    /// Whether the fallback distribution was substituted.
    pub fallback: bool,
}

impl DurationView {
    fn from_counts(counts: DurationCounts, percentages: Percentages, fallback: bool) -> Self {
        let total_seconds = counts.total();
        let minutes = total_seconds / 60.0;
        Self {
            counts,
            percentages,
            total_seconds,
            powered_minutes: (minutes > MIN_POWERED_MINUTES).then_some(minutes),
            fallback,
        }
    }

    /// The mostly-OFF view shown when there is nothing usable.
    #[must_use]
    pub fn fallback() -> Self {
        let counts = DurationCounts::fallback();
        let total = counts.total();
        let percentages = Percentages {
            on: counts.on / total * 100.0,
            off: counts.off / total * 100.0,
            unavailable: counts.unavailable / total * 100.0,
        };
        Self::from_counts(counts, percentages, true)
    }
}

/// Latest duration snapshot per data item.
#[derive(Debug, Clone, Default)]
pub struct DurationAggregator {
    snapshots: BTreeMap<String, DurationCounts>,
}

impl DurationAggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an aggregator from persisted snapshots, skipping invalid ones.
    pub fn from_snapshots<I>(snapshots: I) -> Self
    where
        I: IntoIterator<Item = (String, DurationCounts)>,
    {
        let mut aggregator = Self::new();
        for (id, counts) in snapshots {
            if let Err(e) = aggregator.apply(id, counts) {
                debug!("Skipping restored snapshot: {}", e);
            }
        }
        aggregator
    }

    /// Replace the snapshot for `id`.
    ///
    /// A snapshot whose total is lower than the previous one is still
    /// accepted; upstream counters reset when the monitoring service restarts.
    pub fn apply(&mut self, id: impl Into<String>, counts: DurationCounts) -> Result<(), DurationError> {
        counts.validate()?;
        let id = id.into();
        if let Some(previous) = self.snapshots.get(&id)
            && counts.total() < previous.total()
        {
            debug!(
                "Duration total for {} went backwards ({} -> {}), accepting reset",
                id,
                previous.total(),
                counts.total()
            );
        }
        self.snapshots.insert(id, counts);
        Ok(())
    }

    /// Add initial snapshots for ids that have none yet.
    ///
    /// Returns how many ids were seeded.
    pub fn seed<I>(&mut self, initial: I) -> usize
    where
        I: IntoIterator<Item = (String, DurationCounts)>,
    {
        let mut seeded = 0;
        for (id, counts) in initial {
            if self.snapshots.contains_key(&id) || counts.validate().is_err() {
                continue;
            }
            self.snapshots.insert(id, counts);
            seeded += 1;
        }
        seeded
    }

    /// Percentages for `id`.
    pub fn percentages(&self, id: &str) -> Result<Percentages, DurationError> {
        let counts = self
            .snapshots
            .get(id)
            .ok_or_else(|| DurationError::Unknown(id.to_string()))?;
        percentages_of(id, counts)
    }

    /// Chart view for `id`, with the fallback substituted when needed.
    #[must_use]
    pub fn view(&self, id: &str) -> DurationView {
        match (self.snapshots.get(id), self.percentages(id)) {
            (Some(counts), Ok(percentages)) => DurationView::from_counts(*counts, percentages, false),
            _ => DurationView::fallback(),
        }
    }

    /// The stored snapshot for `id`.
    pub fn get(&self, id: &str) -> Option<&DurationCounts> {
        self.snapshots.get(id)
    }

    /// All snapshots, keyed by id.
    pub fn snapshots(&self) -> &BTreeMap<String, DurationCounts> {
        &self.snapshots
    }

    /// Ids with a snapshot.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.snapshots.keys().map(String::as_str)
    }

    /// Number of tracked ids.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Whether nothing is tracked.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_percentages_of_hundred_seconds() {
        let mut agg = DurationAggregator::new();
        agg.apply("Tool1", DurationCounts::new(30.0, 60.0, 10.0)).unwrap();

        let pct = agg.percentages("Tool1").unwrap();
        assert!(close(pct.on, 30.0));
        assert!(close(pct.off, 60.0));
        assert!(close(pct.unavailable, 10.0));
        assert!(close(pct.sum(), 100.0));
    }

    #[test]
    fn test_last_snapshot_wins() {
        let mut agg = DurationAggregator::new();
        agg.apply("Tool1", DurationCounts::new(10.0, 10.0, 0.0)).unwrap();
        agg.apply("Tool1", DurationCounts::new(40.0, 60.0, 0.0)).unwrap();

        assert_eq!(agg.get("Tool1"), Some(&DurationCounts::new(40.0, 60.0, 0.0)));
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn test_decreasing_total_is_accepted() {
        let mut agg = DurationAggregator::new();
        agg.apply("Tool1", DurationCounts::new(100.0, 100.0, 0.0)).unwrap();
        agg.apply("Tool1", DurationCounts::new(1.0, 2.0, 0.0)).unwrap();
        assert_eq!(agg.get("Tool1").unwrap().total(), 3.0);
    }

    #[test]
    fn test_zero_total_uses_fallback() {
        let mut agg = DurationAggregator::new();
        agg.apply("Tool1", DurationCounts::default()).unwrap();

        assert_eq!(
            agg.percentages("Tool1"),
            Err(DurationError::ZeroDuration("Tool1".to_string()))
        );

        let view = agg.view("Tool1");
        assert!(view.fallback);
        assert!(view.percentages.off > 90.0);
        assert!(close(view.percentages.sum(), 100.0));
        assert_eq!(view.total_seconds, 102.0);
    }

    #[test]
    fn test_unknown_id() {
        let agg = DurationAggregator::new();
        assert!(matches!(agg.percentages("nope"), Err(DurationError::Unknown(_))));
        assert!(agg.view("nope").fallback);
    }

    #[test]
    fn test_invalid_snapshot_rejected() {
        let mut agg = DurationAggregator::new();
        agg.apply("Tool1", DurationCounts::new(1.0, 1.0, 1.0)).unwrap();

        let err = agg
            .apply("Tool1", DurationCounts::new(-5.0, 1.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, DurationError::Invalid(_)));
        assert_eq!(agg.get("Tool1"), Some(&DurationCounts::new(1.0, 1.0, 1.0)));
    }

    #[test]
    fn test_powered_minutes_threshold() {
        let mut agg = DurationAggregator::new();
        agg.apply("short", DurationCounts::new(60.0, 60.0, 0.0)).unwrap();
        agg.apply("long", DurationCounts::new(300.0, 300.0, 0.0)).unwrap();

        assert_eq!(agg.view("short").powered_minutes, None);
        assert_eq!(agg.view("long").powered_minutes, Some(10.0));
    }

    #[test]
    fn test_seed_does_not_overwrite() {
        let mut agg = DurationAggregator::new();
        agg.apply("Tool1", DurationCounts::new(5.0, 5.0, 0.0)).unwrap();

        let seeded = agg.seed([
            ("Tool1".to_string(), DurationCounts::new(1.0, 1.0, 1.0)),
            ("Tool2".to_string(), DurationCounts::new(2.0, 2.0, 2.0)),
            ("Tool3".to_string(), DurationCounts::new(f64::NAN, 0.0, 0.0)),
        ]);

        assert_eq!(seeded, 1);
        assert_eq!(agg.get("Tool1"), Some(&DurationCounts::new(5.0, 5.0, 0.0)));
        assert_eq!(agg.ids().collect::<Vec<_>>(), vec!["Tool1", "Tool2"]);
    }

    #[test]
    fn test_from_snapshots_skips_invalid() {
        let agg = DurationAggregator::from_snapshots([
            ("a".to_string(), DurationCounts::new(1.0, 0.0, 0.0)),
            ("b".to_string(), DurationCounts::new(-1.0, 0.0, 0.0)),
        ]);
        assert_eq!(agg.len(), 1);
    }
}
