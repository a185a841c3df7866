//! Persisted key names, layouts, and stored shapes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Durable store keys, one per persisted domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DomainKey {
    /// Duration snapshots per data item.
    ChartData,
    /// Last known value per element.
    DeviceStates,
    /// Sample buffers per particulate metric.
    ParticleData,
    /// Summary of the persisted particulate buffers.
    ParticleDataMetadata,
    /// Last acknowledged simulation-mode toggle.
    SimulationMode,
}

impl DomainKey {
    /// All keys, in the order they are restored on mount.
    pub const ALL: [DomainKey; 5] = [
        DomainKey::ChartData,
        DomainKey::DeviceStates,
        DomainKey::ParticleData,
        DomainKey::ParticleDataMetadata,
        DomainKey::SimulationMode,
    ];

    /// The key name as stored.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChartData => "chartData",
            Self::DeviceStates => "deviceStates",
            Self::ParticleData => "particleData",
            Self::ParticleDataMetadata => "particleDataMetadata",
            Self::SimulationMode => "simulationMode",
        }
    }
}

impl fmt::Display for DomainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How values are scoped inside a key.
///
/// Callers must pick one layout per deployment and keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Layout {
    /// Single-device dashboards: the value is stored directly under the key.
    #[default]
    Flat,
    /// Multi-device dashboards: the key holds `{ device_uuid: value }`.
    PerDevice,
}

/// Summary written next to the particulate buffers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticleMetadata {
    /// Epoch milliseconds of the last write.
    pub last_update: i64,
    /// Extent of each non-empty buffer.
    pub data_ranges: BTreeMap<String, DataRange>,
}

/// Extent of one persisted buffer, in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataRange {
    pub start: i64,
    pub end: i64,
    pub count: usize,
}
