//! Error types for the report lifecycle.
//!
//! Each layer gets its own enum so callers can tell a rejected state
//! transition apart from a storage or generation problem. The binary
//! layer wraps all of these in `anyhow`.

use thiserror::Error;

/// Errors raised by report entity operations.
#[derive(Debug, Error, PartialEq)]
pub enum ModelError {
    /// The report is not in the state the operation requires.
    #[error("report {id} is already complete")]
    AlreadyComplete { id: String },

    /// An executive summary must carry at least one conviction score.
    #[error("executive summary has no conviction scores")]
    NoConvictionScores,

    /// A conviction score is outside the 0.0-10.0 range.
    #[error("conviction score '{title}' is out of range: {score}")]
    ScoreOutOfRange { title: String, score: f64 },

    /// The analysis must contain at least one phase.
    #[error("analysis has no phases")]
    NoPhases,

    /// Every phase needs at least one step.
    #[error("phase '{0}' has no steps")]
    EmptyPhase(String),

    /// Every step needs at least one insight.
    #[error("step '{0}' has no insights")]
    EmptyStep(String),
}

/// Errors raised by an analysis engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Only pending reports can be generated.
    #[error("report {id} is not pending")]
    NotPending { id: String },

    /// The generated content violated the report model.
    #[error("generated report is invalid: {0}")]
    InvalidOutput(#[from] ModelError),

    /// Failure reported by the engine implementation.
    #[error("analysis backend failed: {0}")]
    Backend(String),
}

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend refused the operation (quota, unavailable, ...).
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
