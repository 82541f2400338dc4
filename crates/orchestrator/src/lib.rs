//! Orchestration Layer
//!
//! This crate wires the 2D SPH solver into something runnable:
//! - Scene files (JSON) with solver, executor and run-limit settings
//! - Execution context and solver construction
//! - Background simulation runner with lifecycle management
//! - The `sph2d` headless command-line driver

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod runner;

pub use config::SimulationConfig;
pub use error::{OrchestratorError, Result};
pub use runner::{RunLimits, RunnerCommand, RunnerState, SimulationRunner};

use std::path::Path;
use std::sync::Arc;

use kernel::{ExecutionContext, Solver};

/// Build the execution context and solver described by `config`.
pub fn build_solver(config: &SimulationConfig) -> Result<Solver> {
    config.validate()?;
    let ctx = Arc::new(ExecutionContext::new(&config.context)?);
    let solver = Solver::new(config.solver.clone(), ctx)?;
    Ok(solver)
}

/// Run limits of a scene.
pub fn run_limits(config: &SimulationConfig) -> RunLimits {
    RunLimits {
        max_frames: config.max_frames,
        frame_rate: config.frame_rate,
    }
}

/// Create a complete simulation from a configuration file
///
/// This function performs the full simulation setup pipeline:
/// 1. Load and validate the configuration
/// 2. Create the execution context (worker pool and pipelines)
/// 3. Allocate and seed the solver
/// 4. Wrap in a SimulationRunner for lifecycle management
///
/// # Example
/// ```no_run
/// use orchestrator::create_simulation;
///
/// let runner = create_simulation("configs/dam_break.json")?;
/// runner.start();
/// // ... query status, pause, resume, etc.
/// # Ok::<(), orchestrator::OrchestratorError>(())
/// ```
pub fn create_simulation(config_path: impl AsRef<Path>) -> Result<SimulationRunner> {
    let config_path = config_path.as_ref();
    tracing::info!("Creating simulation from config: {}", config_path.display());

    let config = SimulationConfig::load(config_path)?;
    tracing::info!("Configuration loaded: {}", config.name);

    let solver = build_solver(&config)?;
    tracing::info!(
        particles = solver.positions().len(),
        scheme = %solver.config().scheme,
        "Simulation ready to start"
    );
    Ok(SimulationRunner::new(solver, run_limits(&config)))
}
