//! Error types for dustline-store.

use std::path::PathBuf;

use crate::models::{DomainKey, Layout};

/// Result type for dustline-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dustline-store.
///
/// [`PersistenceStore`](crate::PersistenceStore) catches every one of these
/// on its best-effort paths; they only surface through the `try_` methods.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Writing the value would exceed the storage quota.
    #[error("Storage quota exceeded writing {key}: {needed} bytes needed, quota is {quota}")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    /// A global value was requested under the per-device layout.
    #[error("Scope mismatch for {key:?}: layout is {layout:?}")]
    ScopeMismatch { key: DomainKey, layout: Layout },

    /// The database was written with a schema this release does not know.
    #[error("Unsupported schema version {found} (this release supports {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// No backing database is available.
    #[error("Persistence is disabled")]
    Disabled,

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
