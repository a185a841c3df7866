//! Normalization of inbound push frames.
//!
//! Upstream adapters emit a handful of JSON shapes with inconsistent field
//! casing. [`InboundFrame::parse`] turns each into one internal type:
//!
//! ```json
//! {"event": "connection_established", "data_items": {"Tool1": "ON"}, "device_uuid": "DC-01"}
//! {"event": "device_change", "data": {"ID": "Tool1", "VALUE": "OFF", "durations": {...}}}
//! {"event": "simulation_mode_updated", "success": true, "value": true}
//! {"event": "ping"}
//! {"data": {"id": "pm1_concentration", "value": 0.0012, "timestamp": "..."}}
//! ```
//!
//! A frame without an `event` field but with a `data` object is an implicit
//! device change.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::warn;

use dustline_types::{DurationCounts, ElementId, ElementKind, StateValue, from_epoch_millis};

use crate::error::FrameError;

/// Air density used to convert volume percentages, in mg/m³.
pub const AIR_DENSITY_MG_PER_M3: f64 = 1_225_000.0;

/// Convert a concentration reported as a volume percentage to µg/m³.
///
/// ```
/// use dustline_core::frames::scale_concentration;
///
/// assert!((scale_concentration(0.0001) - 1225.0).abs() < 1e-6);
/// ```
#[must_use]
pub fn scale_concentration(percent: f64) -> f64 {
    percent / 100.0 * AIR_DENSITY_MG_PER_M3 * 1000.0
}

/// Parse a frame timestamp: RFC 3339, ISO 8601 without offset (UTC), or
/// epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Result<OffsetDateTime, FrameError> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
                return Ok(ts);
            }
            if let Ok(ts) = PrimitiveDateTime::parse(s, &Iso8601::DEFAULT) {
                return Ok(ts.assume_utc());
            }
            s.parse::<i64>()
                .map_err(|_| FrameError::invalid("timestamp", format!("unrecognized format '{s}'")))
                .and_then(millis_to_datetime)
        }
        Value::Number(n) => {
            let ms = n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .ok_or_else(|| FrameError::invalid("timestamp", format!("not an integer: {n}")))?;
            millis_to_datetime(ms)
        }
        other => Err(FrameError::invalid(
            "timestamp",
            format!("expected string or number, got {other}"),
        )),
    }
}

fn millis_to_datetime(ms: i64) -> Result<OffsetDateTime, FrameError> {
    from_epoch_millis(ms).map_err(|e| FrameError::invalid("timestamp", e.to_string()))
}

/// A normalized inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Full state snapshot sent when a connection opens.
    ConnectionEstablished {
        data_items: BTreeMap<String, StateValue>,
        device_uuid: Option<String>,
    },
    /// One element changed.
    DeviceChange(DeviceChange),
    /// Acknowledgement of a simulation-mode toggle.
    SimulationModeUpdated {
        success: bool,
        value: Option<bool>,
        error: Option<String>,
    },
    /// Keep-alive.
    Heartbeat,
    /// An event this client does not handle.
    Unrecognized(String),
}

/// A single element update.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceChange {
    pub id: ElementId,
    pub value: StateValue,
    pub durations: Option<DurationCounts>,
    pub avg_value: Option<AvgValue>,
    pub timestamp: Option<OffsetDateTime>,
    /// Explicit `device_uuid`, else the id prefix before the first `_`.
    pub device_uuid: Option<String>,
}

impl DeviceChange {
    /// Kind of the changed element.
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        self.id.kind()
    }
}

/// Averaged concentration attached to a device change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvgValue {
    /// Averaged volume percentage, unscaled.
    pub value: f64,
    pub timestamp: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    event: Option<String>,
    data: Option<Value>,
    data_items: Option<BTreeMap<String, StateValue>>,
    device_uuid: Option<String>,
    success: Option<bool>,
    value: Option<Value>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    #[serde(rename = "ID", alias = "id")]
    id: Option<String>,
    #[serde(rename = "VALUE", alias = "value")]
    value: Option<StateValue>,
    durations: Option<Value>,
    avg_value: Option<RawAvg>,
    timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RawAvg {
    value: Option<StateValue>,
    timestamp: Option<Value>,
}

impl InboundFrame {
    /// Parse and normalize one frame.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let raw: RawFrame = serde_json::from_str(text)?;

        match raw.event.as_deref() {
            Some("connection_established") => Ok(Self::ConnectionEstablished {
                data_items: raw
                    .data_items
                    .ok_or(FrameError::MissingField("data_items"))?,
                device_uuid: raw.device_uuid.filter(|u| !u.is_empty()),
            }),
            Some("device_change") | None => {
                let data = raw.data.ok_or(FrameError::MissingField("data"))?;
                let change = Self::parse_change(data, raw.device_uuid)?;
                Ok(Self::DeviceChange(change))
            }
            Some("simulation_mode_updated") => Ok(Self::SimulationModeUpdated {
                success: raw.success.ok_or(FrameError::MissingField("success"))?,
                value: raw.value.and_then(|value| match value {
                    Value::Bool(enabled) => Some(enabled),
                    Value::Null => None,
                    other => {
                        warn!("Ignoring non-boolean simulation mode value {}", other);
                        None
                    }
                }),
                error: raw.error,
            }),
            Some("ping") => Ok(Self::Heartbeat),
            Some(other) => Ok(Self::Unrecognized(other.to_string())),
        }
    }

    fn parse_change(data: Value, device_uuid: Option<String>) -> Result<DeviceChange, FrameError> {
        if !data.is_object() {
            return Err(FrameError::invalid("data", "expected an object"));
        }
        let raw: RawChange = serde_json::from_value(data)?;

        let id = raw.id.ok_or(FrameError::MissingField("ID"))?;
        let id = ElementId::parse(id).map_err(|e| FrameError::invalid("ID", e.to_string()))?;

        let timestamp = raw.timestamp.as_ref().map(parse_timestamp).transpose()?;

        let value = raw.value.unwrap_or(StateValue::Unavailable);
        if id.kind() == ElementKind::Concentration {
            reject_non_finite("VALUE", &value)?;
        }

        // Bad durations drop only themselves; the state update still applies.
        let durations = match raw.durations {
            None | Some(Value::Null) => None,
            Some(durations) => match serde_json::from_value::<DurationCounts>(durations) {
                Ok(counts) => Some(counts),
                Err(e) => {
                    warn!("Ignoring unreadable durations for {}: {}", id, e);
                    None
                }
            },
        };

        // An empty `avg_value` object means no average.
        let avg_value = match raw.avg_value {
            Some(RawAvg {
                value: Some(value),
                timestamp,
            }) => {
                reject_non_finite("avg_value", &value)?;
                let value = value
                    .as_f64()
                    .ok_or_else(|| FrameError::invalid("avg_value", format!("not a number: {value}")))?;
                let timestamp = timestamp.as_ref().map(parse_timestamp).transpose()?;
                Some(AvgValue { value, timestamp })
            }
            _ => None,
        };

        let device_uuid = device_uuid
            .filter(|u| !u.is_empty())
            .or_else(|| id.device_prefix().map(str::to_string));

        Ok(DeviceChange {
            id,
            value,
            durations,
            avg_value,
            timestamp,
            device_uuid,
        })
    }
}

/// Numeric text that names NaN or an infinity cannot be charted or persisted.
fn reject_non_finite(field: &'static str, value: &StateValue) -> Result<(), FrameError> {
    if let StateValue::Text(text) = value
        && text.trim().parse::<f64>().is_ok_and(|n| !n.is_finite())
    {
        return Err(FrameError::invalid(field, format!("not a finite number: {text}")));
    }
    Ok(())
}
