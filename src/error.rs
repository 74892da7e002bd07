//! Error types for collar analysis operations.
//!
//! Configuration problems fail fast with [`AnalysisError::InvalidConfig`]
//! before any scan begins. Data defects found while assembling a
//! repository are *not* errors: the offending fix is excluded and counted
//! in the [`IngestReport`](crate::repository::IngestReport) so analysis
//! continues over the remaining valid fixes. Empty results (no cluster,
//! no crossing, no candidate) are `Ok` with empty collections.

use thiserror::Error;

/// Main error type for collar analysis operations.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// A threshold or tolerance parameter failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The operation was cancelled via its [`CancelToken`](crate::CancelToken);
    /// all partial results were discarded.
    #[error("analysis cancelled before completion")]
    Cancelled,
}

/// Result type alias for collar analysis operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

impl AnalysisError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
