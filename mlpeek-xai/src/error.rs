//! Error types for the mlpeek-xai crate.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, XaiError>;

/// Top-level error type for explanation shaping.
///
/// Every variant is recoverable at the row level: the pipeline records the
/// failing row as skipped and keeps going.
#[derive(Debug, Error)]
pub enum XaiError {
    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Row {row_index}: no contribution record for predicted class '{label}'")]
    NoMatchingClass { row_index: u64, label: String },

    #[error("Row {row_index}: no baseline supplied for class '{label}'")]
    MissingBaseline { row_index: u64, label: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl XaiError {
    pub fn missing_input(msg: impl Into<String>) -> Self {
        Self::MissingInput(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Short machine-readable kind, used in skip reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingInput(_) => "missing_input",
            Self::NoMatchingClass { .. } => "no_matching_class",
            Self::MissingBaseline { .. } => "missing_baseline",
            Self::InvalidInput(_) => "invalid_input",
            Self::Config(_) => "config",
            Self::Serde(_) => "serde",
        }
    }
}

impl From<figment::Error> for XaiError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
