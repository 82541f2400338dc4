//! Errors from scene loading and the background runner.

use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by the orchestration layer.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The scene file could not be read.
    #[error("failed to read scene file {path}: {source}")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The scene file is not valid JSON for a [`crate::SimulationConfig`].
    #[error("failed to parse scene file {path}: {source}")]
    Json {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A runner-level field is out of range.
    #[error("invalid scene: `{field}` {reason}")]
    InvalidScene {
        /// Name of the offending field.
        field: &'static str,
        /// Constraint that was violated.
        reason: String,
    },

    /// The solver rejected its configuration.
    #[error(transparent)]
    Solver(#[from] kernel::SolverError),

    /// The simulation thread panicked.
    #[error("simulation thread panicked")]
    ThreadPanicked,
}

/// Convenience alias used throughout the orchestrator crate.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
