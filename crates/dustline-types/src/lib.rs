//! Platform-agnostic types for dust-collection telemetry.
//!
//! This crate provides the shared data model used by the reconciliation
//! engine (dustline-core) and the persistence layer (dustline-store).
//!
//! # Features
//!
//! - Timestamped samples with a compact `{x, y}` serialized form
//! - Series keys and per-device scopes
//! - Cumulative ON/OFF/UNAVAILABLE duration snapshots
//! - Structured element ids parsed from the id naming convention
//!
//! # Example
//!
//! ```
//! use dustline_types::{DurationCounts, ElementId, ElementKind};
//!
//! let id = ElementId::parse("TS1_Tool_state").unwrap();
//! assert_eq!(id.kind(), ElementKind::Tool);
//!
//! let counts = DurationCounts::new(30.0, 60.0, 10.0);
//! assert_eq!(counts.total(), 100.0);
//! ```

pub mod element;
pub mod error;
pub mod types;

pub use element::{ElementId, ElementKind};
pub use error::{ParseError, ParseResult};
pub use types::{
    DeviceState, DurationCounts, Percentages, Sample, Scope, SeriesKey, StateValue,
    from_epoch_millis, to_epoch_millis,
};

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_sample_serializes_as_x_y() {
        let sample = Sample::new(datetime!(2024-05-01 12:00:00 UTC), 42.5);
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"x":1714564800000,"y":42.5}"#);

        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample);
    }

    #[test]
    fn test_epoch_millis_keeps_sub_second_precision() {
        let ts = from_epoch_millis(1_714_564_800_250).unwrap();
        assert_eq!(to_epoch_millis(ts), 1_714_564_800_250);
    }

    #[test]
    fn test_duration_counts_upstream_labels() {
        let counts: DurationCounts =
            serde_json::from_str(r#"{"ON": 30, "OFF": 60.5, "UNAVAILABLE": 10}"#).unwrap();
        assert_eq!(counts, DurationCounts::new(30.0, 60.5, 10.0));
        assert_eq!(counts.total(), 100.5);
    }

    #[test]
    fn test_duration_counts_missing_labels_default_to_zero() {
        let counts: DurationCounts = serde_json::from_str(r#"{"ON": 5}"#).unwrap();
        assert_eq!(counts, DurationCounts::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_duration_counts_validate() {
        assert!(DurationCounts::new(1.0, 2.0, 3.0).validate().is_ok());

        let err = DurationCounts::new(-1.0, 2.0, 3.0).validate().unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidDuration {
                state: "ON",
                value: -1.0
            }
        );

        assert!(
            DurationCounts::new(1.0, f64::NAN, 3.0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_fallback_is_mostly_off() {
        let fallback = DurationCounts::fallback();
        assert!(fallback.off > fallback.on + fallback.unavailable);
        assert_eq!(fallback.total(), 102.0);
    }

    #[test]
    fn test_state_value_untagged_round_trip() {
        let values: Vec<StateValue> =
            serde_json::from_str(r#"["ON", 3.5, true, null]"#).unwrap();
        assert_eq!(
            values,
            vec![
                StateValue::Text("ON".to_string()),
                StateValue::Number(3.5),
                StateValue::Flag(true),
                StateValue::Unavailable,
            ]
        );
        assert!(values[0].is_on());
        assert_eq!(values[1].as_f64(), Some(3.5));
        assert_eq!(serde_json::to_string(&values[3]).unwrap(), "null");
    }

    #[test]
    fn test_state_value_numeric_text() {
        assert_eq!(StateValue::from("0.0012").as_f64(), Some(0.0012));
        assert_eq!(StateValue::from("OPEN").as_f64(), None);
        assert_eq!(StateValue::from("NaN").as_f64(), None);
        assert_eq!(StateValue::from("-inf").as_f64(), None);
        assert!(StateValue::from("OPEN").is_open());
    }

    #[test]
    fn test_element_id_rejects_empty() {
        assert_eq!(ElementId::parse("  ").unwrap_err(), ParseError::EmptyId);
    }

    #[test]
    fn test_element_id_keeps_raw_string() {
        let id = ElementId::parse("DC-01_Gate3").unwrap();
        assert_eq!(id.raw(), "DC-01_Gate3");
        assert_eq!(id.kind(), ElementKind::Gate);
        assert_eq!(id.device_prefix(), Some("DC-01"));
        assert_eq!(id.to_string(), "DC-01_Gate3");
    }

    #[test]
    fn test_series_key_display() {
        assert_eq!(SeriesKey::global("pm1_concentration").to_string(), "pm1_concentration");
        assert_eq!(
            SeriesKey::new(Scope::device("DC-01"), "pm10_concentration").to_string(),
            "DC-01/pm10_concentration"
        );
    }
}
