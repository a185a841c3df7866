//! Core types for dust-collection telemetry.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ParseError, ParseResult};

/// Convert a timestamp to epoch milliseconds.
#[must_use]
pub fn to_epoch_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Build a timestamp from epoch milliseconds.
pub fn from_epoch_millis(ms: i64) -> ParseResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .map_err(|e| ParseError::InvalidTimestamp(format!("{ms}: {e}")))
}

/// Serde adapter storing an `OffsetDateTime` as epoch milliseconds.
#[cfg(feature = "serde")]
pub mod epoch_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;

    pub fn serialize<S: Serializer>(ts: &OffsetDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(super::to_epoch_millis(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<OffsetDateTime, D::Error> {
        let ms = i64::deserialize(d)?;
        super::from_epoch_millis(ms).map_err(serde::de::Error::custom)
    }
}

/// One timestamped scalar observation for a metric.
///
/// Samples are immutable: buffers replace a sample at an existing slot but
/// never change one in place. The serialized form is `{"x": millis, "y": value}`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    #[cfg_attr(feature = "serde", serde(rename = "x", with = "epoch_millis"))]
    timestamp: OffsetDateTime,
    #[cfg_attr(feature = "serde", serde(rename = "y"))]
    value: f64,
}

impl Sample {
    /// Create a new sample.
    #[must_use]
    pub fn new(timestamp: OffsetDateTime, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// When the observation was made.
    #[must_use]
    pub fn timestamp(&self) -> OffsetDateTime {
        self.timestamp
    }

    /// The observed value.
    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Storage and identity scope for per-device data.
///
/// Single-device dashboards keep everything in [`Scope::Global`]; multi-device
/// dashboards nest state under the device uuid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Scope {
    /// Flat, single-device scope.
    #[default]
    Global,
    /// Scoped to one device uuid.
    Device(String),
}

impl Scope {
    /// Create a device scope.
    pub fn device(uuid: impl Into<String>) -> Self {
        Self::Device(uuid.into())
    }

    /// The device uuid, if scoped to a device.
    #[must_use]
    pub fn device_uuid(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Device(uuid) => Some(uuid),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Device(uuid) => write!(f, "{}", uuid),
        }
    }
}

/// Identifies one metric stream, e.g. one particulate channel of one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SeriesKey {
    /// Device scope of the series.
    pub scope: Scope,
    /// Metric name (e.g. `pm2_5_concentration`).
    pub metric: String,
}

impl SeriesKey {
    /// Create a new series key.
    pub fn new(scope: Scope, metric: impl Into<String>) -> Self {
        Self {
            scope,
            metric: metric.into(),
        }
    }

    /// Create a series key in the global scope.
    pub fn global(metric: impl Into<String>) -> Self {
        Self::new(Scope::Global, metric)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.scope {
            Scope::Global => write!(f, "{}", self.metric),
            Scope::Device(uuid) => write!(f, "{}/{}", uuid, self.metric),
        }
    }
}

/// Cumulative ON/OFF/UNAVAILABLE seconds for one data item.
///
/// Each update from upstream is an authoritative cumulative snapshot, not a
/// delta. Serialized with the upstream labels `ON`, `OFF`, `UNAVAILABLE`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DurationCounts {
    #[cfg_attr(feature = "serde", serde(rename = "ON", default))]
    pub on: f64,
    #[cfg_attr(feature = "serde", serde(rename = "OFF", default))]
    pub off: f64,
    #[cfg_attr(feature = "serde", serde(rename = "UNAVAILABLE", default))]
    pub unavailable: f64,
}

impl DurationCounts {
    /// Create a new snapshot.
    #[must_use]
    pub fn new(on: f64, off: f64, unavailable: f64) -> Self {
        Self {
            on,
            off,
            unavailable,
        }
    }

    /// Distribution shown when no usable snapshot exists: mostly OFF.
    #[must_use]
    pub fn fallback() -> Self {
        Self::new(1.0, 100.0, 1.0)
    }

    /// Sum of all three counters, in seconds.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.on + self.off + self.unavailable
    }

    /// Check that every counter is finite and non-negative.
    pub fn validate(&self) -> ParseResult<()> {
        for (state, value) in [
            ("ON", self.on),
            ("OFF", self.off),
            ("UNAVAILABLE", self.unavailable),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ParseError::InvalidDuration { state, value });
            }
        }
        Ok(())
    }
}

/// Three-way percentage split of a [`DurationCounts`] snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Percentages {
    pub on: f64,
    pub off: f64,
    pub unavailable: f64,
}

impl Percentages {
    /// Sum of the three shares (100 up to rounding).
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.on + self.off + self.unavailable
    }
}

/// Last known value of a displayed element.
///
/// Upstream values are usually strings (`"ON"`, `"OPEN"`), sometimes numbers
/// for sensor readings; `null` maps to [`StateValue::Unavailable`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum StateValue {
    Flag(bool),
    Number(f64),
    Text(String),
    Unavailable,
}

impl StateValue {
    /// Borrow the value as text, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a finite number.
    ///
    /// Numeric strings are accepted since some upstream adapters report
    /// sensor values as text. "NaN" and infinities are not numbers here.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        n.is_finite().then_some(n)
    }

    /// Whether a tool reports power on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.as_str() == Some("ON")
    }

    /// Whether a blast gate reports open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.as_str() == Some("OPEN")
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
        }
    }
}

/// Last known state of one element, with the time it was observed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceState {
    pub id: String,
    pub value: StateValue,
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
}

impl DeviceState {
    /// Create a new device state.
    pub fn new(id: impl Into<String>, value: StateValue, timestamp: OffsetDateTime) -> Self {
        Self {
            id: id.into(),
            value,
            timestamp,
        }
    }
}
