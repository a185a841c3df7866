//! Error types for dustline-core.
//!
//! Nothing in the reconciliation engine is fatal. These errors describe what
//! went wrong so the caller can log it, and each one maps to a fixed recovery:
//!
//! | Error | Recovery |
//! |-------|----------|
//! | [`Error::Transport`] | Fixed-delay reconnect by [`LiveChannel`](crate::LiveChannel) |
//! | [`Error::Frame`] | Frame dropped, channel keeps running |
//! | [`Error::Control`] | Simulation toggle rolled back, user alerted |
//! | [`Error::InvalidConfig`] | Fix configuration and restart |
//! | [`Error::Cancelled`] | Graceful shutdown |
//!
//! Storage failures never reach this enum; [`dustline_store::PersistenceStore`]
//! absorbs them.

use thiserror::Error;

/// Errors that can occur in the reconciliation engine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The push transport failed or closed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// An inbound frame could not be normalized.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The outbound control call failed.
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// A value in a frame violated the data model.
    #[error("Parse error: {0}")]
    Parse(#[from] dustline_types::ParseError),
}

impl Error {
    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Why an inbound frame was dropped.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FrameError {
    /// The frame was not valid JSON.
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field was absent.
    #[error("Frame is missing field '{0}'")]
    MissingField(&'static str),

    /// A field was present but unusable.
    #[error("Invalid field '{field}': {reason}")]
    InvalidField {
        /// The offending field.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

impl FrameError {
    /// Create an invalid field error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors from the simulation-mode control call.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ControlError {
    /// The control endpoint is not reachable.
    #[error("Control endpoint not reachable at {url}: {source}")]
    NotReachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Invalid base URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No device uuid is known for the toggle.
    #[error("No device uuid configured for the simulation toggle")]
    MissingDevice,
}

/// Result type alias using dustline-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
