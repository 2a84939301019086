//! Error types for tour resolution and tour definitions.

use thiserror::Error;

/// Errors surfaced by the tour engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TourError {
    #[error("target '{selector}' not found within {timeout_ms}ms")]
    TargetNotFound { selector: String, timeout_ms: u64 },

    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("step {index}: {source}")]
    InvalidStep {
        index: usize,
        #[source]
        source: Box<TourError>,
    },

    #[error("unsupported tour file format '{0}' (expected json, yaml, yml or toml)")]
    UnsupportedFormat(String),
}

impl TourError {
    /// Selector this error refers to, if any
    pub fn selector(&self) -> Option<&str> {
        match self {
            TourError::TargetNotFound { selector, .. }
            | TourError::InvalidSelector { selector, .. } => Some(selector),
            TourError::InvalidStep { source, .. } => source.selector(),
            TourError::UnsupportedFormat(_) => None,
        }
    }

    /// Check if this is a wait timeout
    pub fn is_not_found(&self) -> bool {
        matches!(self, TourError::TargetNotFound { .. })
    }
}
