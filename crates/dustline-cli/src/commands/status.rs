//! Status command implementation.
//!
//! Reads the persisted dashboard snapshot, so it works while the service is
//! unreachable.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;

use dustline_core::durations::percentages_of;
use dustline_store::{DomainKey, PersistenceStore};
use dustline_types::{DurationCounts, Percentages, Sample, Scope, StateValue};

use crate::cli::OutputFormat;
use crate::config::Config;
use crate::style;

/// Everything persisted for one scope.
#[derive(Debug, Default, Serialize)]
pub struct ScopeStatus {
    pub states: BTreeMap<String, StateValue>,
    pub durations: BTreeMap<String, DurationSummary>,
    pub series: BTreeMap<String, SeriesSummary>,
    pub simulation_mode: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DurationSummary {
    pub counts: DurationCounts,
    /// `None` when the snapshot totals zero.
    pub percentages: Option<Percentages>,
}

#[derive(Debug, Serialize)]
pub struct SeriesSummary {
    pub samples: usize,
    pub latest: Option<f64>,
    pub latest_at: Option<String>,
}

/// Persisted state of every scope, keyed by scope name.
#[derive(Debug, Default, Serialize)]
pub struct StatusReport {
    pub scopes: BTreeMap<String, ScopeStatus>,
}

impl StatusReport {
    /// Collect the snapshot held by `store`.
    pub fn collect(store: &PersistenceStore) -> Self {
        let mut scopes: BTreeMap<Scope, ScopeStatus> = BTreeMap::new();

        for (scope, states) in store.restore_all_entries::<StateValue>(DomainKey::DeviceStates) {
            scopes.entry(scope).or_default().states = states;
        }

        for (scope, charts) in
            store.restore_all_entries::<DurationCounts>(DomainKey::ChartData)
        {
            let durations = charts
                .into_iter()
                .map(|(id, counts)| {
                    let percentages = percentages_of(&id, &counts).ok();
                    (id, DurationSummary { counts, percentages })
                })
                .collect();
            scopes.entry(scope).or_default().durations = durations;
        }

        for (scope, series) in
            store.restore_all_entries::<Vec<Sample>>(DomainKey::ParticleData)
        {
            let series = series
                .into_iter()
                .map(|(metric, samples)| {
                    let latest = samples.iter().max_by_key(|s| s.timestamp());
                    let summary = SeriesSummary {
                        samples: samples.len(),
                        latest: latest.map(Sample::value),
                        latest_at: latest.and_then(|s| s.timestamp().format(&Rfc3339).ok()),
                    };
                    (metric, summary)
                })
                .collect();
            scopes.entry(scope).or_default().series = series;
        }

        for (scope, enabled) in store.restore_all::<bool>(DomainKey::SimulationMode) {
            scopes.entry(scope).or_default().simulation_mode = Some(enabled);
        }

        Self {
            scopes: scopes
                .into_iter()
                .map(|(scope, status)| (scope.to_string(), status))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Human-readable rendering.
    pub fn to_text(&self, no_color: bool) -> String {
        if self.is_empty() {
            return style::format_info("No persisted dashboard state", no_color) + "\n";
        }

        let mut out = String::new();
        for (scope, status) in &self.scopes {
            out.push_str(&style::format_title(scope, no_color));
            out.push('\n');

            for (id, value) in &status.states {
                let kind = dustline_types::ElementKind::classify(id);
                out.push_str(&format!(
                    "  {:<24} {}\n",
                    id,
                    style::format_state_colored(kind, value, no_color)
                ));
            }
            for (id, summary) in &status.durations {
                let line = match &summary.percentages {
                    Some(p) => format!(
                        "{} on {:.0}% off {:.0}% unavailable {:.0}%",
                        style::format_duration_bar(p, 20, no_color),
                        p.on,
                        p.off,
                        p.unavailable
                    ),
                    None => "no duration data".to_string(),
                };
                out.push_str(&format!("  {:<24} {}\n", id, line));
            }
            for (metric, summary) in &status.series {
                let latest = summary
                    .latest
                    .map(|v| style::format_concentration_colored(v, no_color))
                    .unwrap_or_else(|| "-".to_string());
                out.push_str(&format!(
                    "  {:<24} {} µg/m³ ({} samples)\n",
                    metric, latest, summary.samples
                ));
            }
            if let Some(enabled) = status.simulation_mode {
                out.push_str(&format!(
                    "  {:<24} {}\n",
                    "simulation mode",
                    if enabled { "on" } else { "off" }
                ));
            }
        }
        out
    }
}

pub fn cmd_status(config: &Config, format: OutputFormat, no_color: bool) -> Result<()> {
    let path = config.database_path();
    let store = if path.exists() {
        PersistenceStore::open(&path, config.store_options(), config.layout)
    } else {
        eprintln!(
            "{}",
            style::format_warning(&format!("No database at {}", path.display()), no_color)
        );
        PersistenceStore::disabled(config.layout)
    };
    let report = StatusReport::collect(&store);

    match format {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
            println!("{}", json);
        }
        OutputFormat::Text => print!("{}", report.to_text(no_color)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dustline_store::Layout;
    use time::macros::datetime;

    #[test]
    fn test_empty_store() {
        let store = PersistenceStore::in_memory(Layout::Flat).unwrap();
        let report = StatusReport::collect(&store);
        assert!(report.is_empty());
        assert_eq!(report.to_text(true), "[--] No persisted dashboard state\n");
    }

    #[test]
    fn test_collect_flat_snapshot() {
        let store = PersistenceStore::in_memory(Layout::Flat).unwrap();
        let scope = Scope::Global;
        store.snapshot(
            DomainKey::DeviceStates,
            &scope,
            &BTreeMap::from([("Tool1".to_string(), StateValue::from("ON"))]),
        );
        store.snapshot(
            DomainKey::ChartData,
            &scope,
            &BTreeMap::from([
                ("Tool1".to_string(), DurationCounts::new(30.0, 60.0, 10.0)),
                ("Tool2".to_string(), DurationCounts::new(0.0, 0.0, 0.0)),
            ]),
        );
        let t0 = datetime!(2024-05-01 12:00:00 UTC);
        store.snapshot(
            DomainKey::ParticleData,
            &scope,
            &BTreeMap::from([(
                "pm1_concentration".to_string(),
                vec![Sample::new(t0, 4.0), Sample::new(t0 + time::Duration::seconds(2), 6.0)],
            )]),
        );
        store.snapshot(DomainKey::SimulationMode, &scope, &true);

        let report = StatusReport::collect(&store);
        let status = &report.scopes["global"];
        assert_eq!(status.states["Tool1"], StateValue::from("ON"));
        let tool1 = status.durations["Tool1"].percentages.unwrap();
        assert!((tool1.on - 30.0).abs() < 1e-9);
        assert!(status.durations["Tool2"].percentages.is_none());
        let pm1 = &status.series["pm1_concentration"];
        assert_eq!(pm1.samples, 2);
        assert_eq!(pm1.latest, Some(6.0));
        assert_eq!(pm1.latest_at.as_deref(), Some("2024-05-01T12:00:02Z"));
        assert_eq!(status.simulation_mode, Some(true));

        let text = report.to_text(true);
        assert!(text.contains("Tool1"));
        assert!(text.contains("on 30% off 60% unavailable 10%"));
        assert!(text.contains("no duration data"));
        assert!(text.contains("6.0 µg/m³ (2 samples)"));
        assert!(text.contains("simulation mode"));
    }

    #[test]
    fn test_collect_per_device_snapshot() {
        let store = PersistenceStore::in_memory(Layout::PerDevice).unwrap();
        for (uuid, value) in [("DC-01", "ON"), ("DC-02", "OFF")] {
            store.snapshot(
                DomainKey::DeviceStates,
                &Scope::device(uuid),
                &BTreeMap::from([("Tool1".to_string(), StateValue::from(value))]),
            );
        }

        let report = StatusReport::collect(&store);
        assert_eq!(report.scopes.len(), 2);
        assert_eq!(report.scopes["DC-02"].states["Tool1"], StateValue::from("OFF"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["scopes"]["DC-01"]["states"]["Tool1"], "ON");
    }
}
