//! Error types for data parsing in dustline-types.

use thiserror::Error;

/// Errors that can occur when interpreting telemetry values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Error, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    /// Generic invalid data.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// An element id was empty or whitespace.
    #[error("Element id must not be empty")]
    EmptyId,

    /// A duration counter was negative or not finite.
    #[error("Invalid duration for {state}: {value}")]
    InvalidDuration {
        /// The state label (ON, OFF, UNAVAILABLE).
        state: &'static str,
        /// The offending value.
        value: f64,
    },

    /// A timestamp could not be represented.
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// Result type alias using dustline-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
