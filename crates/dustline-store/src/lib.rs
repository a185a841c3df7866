//! Local persistence for dust-collection dashboard state.
//!
//! This crate keeps enough of the dashboard's state on disk to survive a
//! restart: duration snapshots, last known element values, particulate
//! sample buffers and the simulation-mode flag.
//!
//! # Features
//!
//! - SQLite key/value backend with a configurable size quota
//! - Flat or per-device (nested by uuid) layouts
//! - Best-effort API that logs and degrades instead of failing
//!
//! # Example
//!
//! ```no_run
//! use dustline_store::{DomainKey, Layout, PersistenceStore, StoreOptions};
//! use dustline_types::Scope;
//!
//! let store = PersistenceStore::open(
//!     dustline_store::default_db_path(),
//!     StoreOptions::default(),
//!     Layout::Flat,
//! );
//!
//! store.snapshot(DomainKey::SimulationMode, &Scope::Global, &true);
//! let mode: Option<bool> = store.restore(DomainKey::SimulationMode, &Scope::Global);
//! assert_eq!(mode, Some(true));
//! ```

mod error;
mod models;
mod persistence;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{DataRange, DomainKey, Layout, ParticleMetadata};
pub use persistence::PersistenceStore;
pub use store::{DEFAULT_QUOTA_BYTES, Store, StoreOptions};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/dustline/state.db`
/// - macOS: `~/Library/Application Support/dustline/state.db`
/// - Windows: `C:\Users\<user>\AppData\Local\dustline\state.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("dustline")
        .join("state.db")
}
