//! Error handling module for sweepctl
//!
//! Provides the crate-wide error type using thiserror. Component modules keep
//! their own narrow error enums and convert into `SweepError` at the seams.

use thiserror::Error;

/// Main error type for sweepctl
#[derive(Error, Debug)]
pub enum SweepError {
    /// IO errors (artifacts, state records, graph files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (workflow file, problem definition, sampling setup)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generation state errors (missing or corrupted state record)
    #[error("State error: {0}")]
    State(String),

    /// Job input materialization errors
    #[error("Materialization error: {0}")]
    Materialize(String),

    /// Estimator applied to a sample matrix it cannot have produced
    #[error("Analysis mismatch: {0}")]
    Analysis(String),

    /// Validation errors (malformed artifacts read back from disk)
    #[error("Validation error: {0}")]
    Validation(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Indicator table errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// General errors (catch-all for edge cases)
    #[error("{0}")]
    General(String),
}

/// Result type alias for sweepctl operations
pub type Result<T> = std::result::Result<T, SweepError>;

impl SweepError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a materialization error
    pub fn materialize(msg: impl Into<String>) -> Self {
        Self::Materialize(msg.into())
    }

    /// Create an analysis mismatch error
    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }

    /// True for errors that must abort the whole step before any job is touched
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<anyhow::Error> for SweepError {
    fn from(err: anyhow::Error) -> Self {
        // `{:#}` keeps the whole context chain on one line
        Self::Config(format!("{err:#}"))
    }
}
