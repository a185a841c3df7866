//! Best-effort snapshot/restore of dashboard state.
//!
//! Every domain value is one JSON document under its [`DomainKey`]. With
//! [`Layout::PerDevice`] the document is an object keyed by device uuid and
//! each snapshot rewrites only its own entry.
//!
//! The plain [`PersistenceStore::snapshot`] and [`PersistenceStore::restore`]
//! never fail: storage problems are logged and the caller keeps working from
//! memory. The `try_` variants expose the underlying [`Error`].

use std::collections::BTreeMap;
use std::path::Path;

use dustline_types::Scope;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{DomainKey, Layout};
use crate::store::{Store, StoreOptions};

/// Durable store for dashboard snapshots.
#[derive(Debug)]
pub struct PersistenceStore {
    store: Option<Store>,
    layout: Layout,
}

impl PersistenceStore {
    /// Wrap an open [`Store`].
    pub fn new(store: Store, layout: Layout) -> Self {
        Self {
            store: Some(store),
            layout,
        }
    }

    /// Open a database file, falling back to a disabled store on failure.
    pub fn open<P: AsRef<Path>>(path: P, options: StoreOptions, layout: Layout) -> Self {
        match Store::open_with_options(path.as_ref(), options) {
            Ok(store) => Self::new(store, layout),
            Err(e) => {
                warn!(
                    "Persistence unavailable at {}, continuing in memory: {}",
                    path.as_ref().display(),
                    e
                );
                Self::disabled(layout)
            }
        }
    }

    /// An in-memory store (for testing).
    pub fn in_memory(layout: Layout) -> Result<Self> {
        Ok(Self::new(Store::open_in_memory()?, layout))
    }

    /// A store that keeps nothing. Every restore returns the default.
    pub fn disabled(layout: Layout) -> Self {
        Self {
            store: None,
            layout,
        }
    }

    /// The layout chosen for this deployment.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Whether a database is attached.
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Access the underlying store.
    pub fn store(&self) -> Option<&Store> {
        self.store.as_ref()
    }

    fn backend(&self) -> Result<&Store> {
        self.store.as_ref().ok_or(Error::Disabled)
    }

    fn device_uuid<'a>(&self, key: DomainKey, scope: &'a Scope) -> Result<&'a str> {
        scope.device_uuid().ok_or(Error::ScopeMismatch {
            key,
            layout: self.layout,
        })
    }

    /// Serialize `value` and write it under `key`.
    pub fn try_snapshot<T: Serialize + ?Sized>(
        &self,
        key: DomainKey,
        scope: &Scope,
        value: &T,
    ) -> Result<()> {
        let store = self.backend()?;

        let document = match self.layout {
            Layout::Flat => serde_json::to_string(value)?,
            Layout::PerDevice => {
                let uuid = self.device_uuid(key, scope)?;
                let entry = serde_json::to_value(value)?;
                let mut object = match store.get(key.as_str())? {
                    Some(raw) => match serde_json::from_str::<Value>(&raw) {
                        Ok(Value::Object(map)) => map,
                        _ => {
                            warn!("Discarding unreadable {} document", key);
                            Map::new()
                        }
                    },
                    None => Map::new(),
                };
                object.insert(uuid.to_string(), entry);
                serde_json::to_string(&object)?
            }
        };

        store.put(key.as_str(), &document)
    }

    /// Read the value stored under `key` for `scope`.
    ///
    /// Returns `Ok(None)` when nothing has been stored.
    pub fn try_restore<T: DeserializeOwned>(
        &self,
        key: DomainKey,
        scope: &Scope,
    ) -> Result<Option<T>> {
        let store = self.backend()?;
        let Some(raw) = store.get(key.as_str())? else {
            return Ok(None);
        };

        match self.layout {
            Layout::Flat => Ok(Some(serde_json::from_str(&raw)?)),
            Layout::PerDevice => {
                let uuid = self.device_uuid(key, scope)?;
                let mut object: Map<String, Value> = serde_json::from_str(&raw)?;
                match object.remove(uuid) {
                    Some(entry) => Ok(Some(serde_json::from_value(entry)?)),
                    None => Ok(None),
                }
            }
        }
    }

    /// Read every stored scope under `key`.
    ///
    /// The flat layout yields at most one entry, under [`Scope::Global`].
    pub fn try_restore_all<T: DeserializeOwned>(
        &self,
        key: DomainKey,
    ) -> Result<BTreeMap<Scope, T>> {
        let store = self.backend()?;
        let mut out = BTreeMap::new();
        let Some(raw) = store.get(key.as_str())? else {
            return Ok(out);
        };

        match self.layout {
            Layout::Flat => {
                out.insert(Scope::Global, serde_json::from_str(&raw)?);
            }
            Layout::PerDevice => {
                let object: Map<String, Value> = serde_json::from_str(&raw)?;
                for (uuid, entry) in object {
                    match serde_json::from_value(entry) {
                        Ok(value) => {
                            out.insert(Scope::Device(uuid), value);
                        }
                        Err(e) => warn!("Skipping unreadable {} entry for {}: {}", key, uuid, e),
                    }
                }
            }
        }
        Ok(out)
    }

    /// Best-effort write. Returns whether the value was stored.
    pub fn snapshot<T: Serialize + ?Sized>(&self, key: DomainKey, scope: &Scope, value: &T) -> bool {
        match self.try_snapshot(key, scope, value) {
            Ok(()) => true,
            Err(Error::Disabled) => false,
            Err(e) => {
                warn!("Failed to persist {} ({}): {}", key, scope, e);
                false
            }
        }
    }

    /// Best-effort read. Absent or unreadable values yield `T::default()`.
    pub fn restore<T: DeserializeOwned + Default>(&self, key: DomainKey, scope: &Scope) -> T {
        match self.try_restore(key, scope) {
            Ok(Some(value)) => value,
            Ok(None) | Err(Error::Disabled) => T::default(),
            Err(e) => {
                warn!("Ignoring persisted {} ({}): {}", key, scope, e);
                T::default()
            }
        }
    }

    /// Best-effort read of every scope under `key`.
    pub fn restore_all<T: DeserializeOwned>(&self, key: DomainKey) -> BTreeMap<Scope, T> {
        match self.try_restore_all(key) {
            Ok(values) => values,
            Err(Error::Disabled) => BTreeMap::new(),
            Err(e) => {
                warn!("Ignoring persisted {}: {}", key, e);
                BTreeMap::new()
            }
        }
    }

    /// Best-effort read of every scope under `key` when each scope holds a
    /// map of named entries, such as one series per metric.
    ///
    /// Entries are deserialized one at a time: an unreadable entry is
    /// skipped and its siblings are kept.
    pub fn restore_all_entries<T: DeserializeOwned>(
        &self,
        key: DomainKey,
    ) -> BTreeMap<Scope, BTreeMap<String, T>> {
        self.restore_all::<Map<String, Value>>(key)
            .into_iter()
            .map(|(scope, entries)| {
                let entries = entries
                    .into_iter()
                    .filter_map(|(name, entry)| match serde_json::from_value(entry) {
                        Ok(value) => Some((name, value)),
                        Err(e) => {
                            warn!("Skipping unreadable {} entry {} ({}): {}", key, name, scope, e);
                            None
                        }
                    })
                    .collect();
                (scope, entries)
            })
            .collect()
    }

    /// Remove `key` entirely. Returns whether anything was removed.
    pub fn clear(&self, key: DomainKey) -> bool {
        match self.store.as_ref().map(|s| s.remove(key.as_str())) {
            Some(Ok(removed)) => {
                debug!("Cleared {}", key);
                removed
            }
            Some(Err(e)) => {
                warn!("Failed to clear {}: {}", key, e);
                false
            }
            None => false,
        }
    }
}
