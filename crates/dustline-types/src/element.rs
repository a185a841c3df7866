//! Structured element identifiers.
//!
//! Element and metric ids embed a type token (`Tool`, `Gate`,
//! `concentration`) that existing dashboard markup relies on. The token is
//! parsed once, at ingestion, into an [`ElementId`]; everything downstream
//! matches on [`ElementKind`] instead of searching the string again.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// What an element id denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ElementKind {
    /// Tool power state (`ON` / `OFF`).
    Tool,
    /// Blast gate position (`OPEN` / `CLOSED`).
    Gate,
    /// Particulate concentration metric.
    Concentration,
    /// Anything else (collector, diagnostics).
    Other,
}

impl ElementKind {
    /// Classify a raw id by its type token.
    ///
    /// `Tool` takes precedence over `Gate`, and both over `concentration`.
    ///
    /// # Examples
    ///
    /// ```
    /// use dustline_types::ElementKind;
    ///
    /// assert_eq!(ElementKind::classify("TS1_Tool_state"), ElementKind::Tool);
    /// assert_eq!(ElementKind::classify("TS1_Gate_state"), ElementKind::Gate);
    /// assert_eq!(ElementKind::classify("pm2_5_concentration"), ElementKind::Concentration);
    /// assert_eq!(ElementKind::classify("collector_avail"), ElementKind::Other);
    /// ```
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        if raw.contains("Tool") {
            Self::Tool
        } else if raw.contains("Gate") {
            Self::Gate
        } else if raw.contains("concentration") {
            Self::Concentration
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tool => write!(f, "tool"),
            Self::Gate => write!(f, "gate"),
            Self::Concentration => write!(f, "concentration"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// An element id together with its parsed kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ElementId {
    kind: ElementKind,
    raw: String,
}

impl ElementId {
    /// Parse a raw id.
    pub fn parse(raw: impl Into<String>) -> ParseResult<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ParseError::EmptyId);
        }
        Ok(Self {
            kind: ElementKind::classify(&raw),
            raw,
        })
    }

    /// The parsed kind.
    #[must_use]
    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// The id exactly as received.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The device uuid embedded before the first `_`, if any.
    ///
    /// ```
    /// use dustline_types::ElementId;
    ///
    /// let id = ElementId::parse("DUST-001_TS1_Tool").unwrap();
    /// assert_eq!(id.device_prefix(), Some("DUST-001"));
    /// assert_eq!(ElementId::parse("Tool1").unwrap().device_prefix(), None);
    /// ```
    #[must_use]
    pub fn device_prefix(&self) -> Option<&str> {
        match self.raw.split_once('_') {
            Some((prefix, _)) if !prefix.is_empty() => Some(prefix),
            _ => None,
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}
