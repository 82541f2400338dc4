//! Error types for solver construction and reconfiguration.
//!
//! Numeric blow-up is never reported here: non-finite particle state is
//! visible through [`crate::ErrorMetrics`] but does not fail a step.

use thiserror::Error;

/// Failures surfaced while building or reconfiguring a solver.
#[derive(Debug, Error)]
pub enum SolverError {
    /// A configuration field is out of range.
    #[error("invalid configuration: `{field}` {reason}")]
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable constraint that was violated.
        reason: String,
    },

    /// The grid needs more than 16 bits per axis, which 32-bit Morton keys cannot address.
    #[error("grid resolution {grid_x}x{grid_y} exceeds the 65536 cells per axis addressable by 32-bit Morton keys")]
    GridTooLarge {
        /// Cells along x.
        grid_x: u32,
        /// Cells along y.
        grid_y: u32,
    },

    /// The grid fits the Morton key width but has too many cells to allocate range tables for.
    #[error("grid needs {cells} cells, more than the {limit} cell range tables allowed")]
    TooManyCells {
        /// Total cells the configuration asks for.
        cells: u64,
        /// Largest supported total.
        limit: u64,
    },

    /// A solver buffer could not be allocated.
    #[error("failed to allocate {bytes} bytes for `{buffer}`")]
    Allocation {
        /// Buffer that failed.
        buffer: &'static str,
        /// Requested size.
        bytes: usize,
    },

    /// The worker pool backing the execution context could not be created.
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A compute pipeline was rejected while compiling the pipeline cache.
    #[error("failed to compile pipeline `{label}`: {reason}")]
    Pipeline {
        /// Pipeline label.
        label: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// Explicit initial state does not match the configured particle count.
    #[error("initial state has {actual} particles, configuration expects {expected}")]
    ParticleCountMismatch {
        /// Configured particle count.
        expected: usize,
        /// Length of the supplied arrays.
        actual: usize,
    },
}

impl SolverError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, SolverError>;
