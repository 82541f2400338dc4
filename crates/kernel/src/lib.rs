//! 2D SPH Fluid Solver Kernel
//!
//! Core of a data-parallel Smoothed Particle Hydrodynamics solver in two
//! dimensions. Every pass is expressed as a dispatch over an
//! [`ExecutionContext`], one work item per particle (or cell, or block), with
//! a barrier between passes.
//!
//! # Modules
//! - [`context`] -- Execution context: worker pool, pipeline cache, dispatch counters.
//! - [`grid`] -- Uniform grid parameters and Morton indexing.
//! - [`radix`] -- Stable LSD radix sort over Morton keys with ping-pong buffers.
//! - [`neighbor`] -- Per-cell ranges over the sorted particle order.
//! - [`sph`] -- Smoothing kernels and the density / force evaluators.
//! - [`eos`] -- Linear equation of state.
//! - [`integrator`] -- Verlet, RK2, predictor-corrector and RK4 stage pipelines.
//! - [`boundary`] -- Domain wall clamping with restitution.
//! - [`seed`] -- Initial lattice placement.
//! - [`buffers`] -- Buffer arena allocated and replaced as a unit.
//! - [`solver`] -- Step driver, reset, pause and reconfiguration.
//! - `gpu` -- wgpu compute back-end mirroring every pass (feature `gpu`).

#![warn(missing_docs)]

pub mod boundary;
pub mod buffers;
pub mod config;
pub mod context;
pub mod eos;
pub mod error;
pub mod grid;
pub mod integrator;
pub mod neighbor;
pub mod particle;
pub mod radix;
pub mod seed;
pub mod solver;
pub mod sph;

#[cfg(feature = "gpu")]
#[allow(missing_docs)]
pub mod gpu;

pub use config::{SeedConfig, SolverConfig};
pub use context::{ComputeKernel, ContextConfig, DispatchStats, ExecutionContext, ExecutorKind};
pub use error::{Result, SolverError};
pub use grid::GridParams;
pub use integrator::IntegrationScheme;
pub use neighbor::CellRanges;
pub use particle::ParticleArrays;
pub use solver::{FrameSnapshot, ParamUpdate, Solver, StepProfile};
pub use sph::FluidParams;

#[cfg(feature = "gpu")]
pub use gpu::{gpu_available, GpuError, GpuKernel};

// ---------------------------------------------------------------------------
// SimulationKernel trait
// ---------------------------------------------------------------------------

/// Aggregate diagnostics for a particle snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
pub struct ErrorMetrics {
    /// Maximum relative density deviation from rest density across finite particles.
    pub max_density_variation: f32,
    /// Mean density across finite particles.
    pub mean_density: f32,
    /// Total kinetic energy `sum 1/2 m |v|^2`.
    pub kinetic_energy: f64,
    /// Largest particle speed.
    pub max_speed: f32,
    /// Particles with a non-finite position, velocity or density.
    pub non_finite: usize,
}

impl ErrorMetrics {
    /// Compute metrics for `particles` with uniform mass `mass`.
    pub fn from_particles(particles: &ParticleArrays, rest_density: f32, mass: f32) -> Self {
        let mut metrics = Self::default();
        let mut density_sum = 0.0_f64;
        let mut finite = 0_usize;
        for i in 0..particles.len() {
            let p = particles.positions[i];
            let v = particles.velocities[i];
            let rho = particles.density[i];
            if !p.is_finite() || !v.is_finite() || !rho.is_finite() {
                metrics.non_finite += 1;
                continue;
            }
            finite += 1;
            density_sum += rho as f64;
            let var = (rho - rest_density).abs() / rest_density;
            metrics.max_density_variation = metrics.max_density_variation.max(var);
            let speed2 = v.length_squared();
            metrics.max_speed = metrics.max_speed.max(speed2.sqrt());
            metrics.kinetic_energy += 0.5 * mass as f64 * speed2 as f64;
        }
        if finite > 0 {
            metrics.mean_density = (density_sum / finite as f64) as f32;
        }
        metrics
    }
}

/// Common surface of a simulation back-end, used by the runner and the
/// reference suite.
///
/// A frame is made of one or more physics steps:
///
/// 1. Grid indexing and Morton sort
/// 2. Cell range build
/// 3. Density and force evaluation per integrator stage
/// 4. Combine and boundary resolution
pub trait SimulationKernel {
    /// Advance one frame. Returns `false` if the frame was skipped (paused).
    fn advance_frame(&mut self) -> bool;

    /// Read back current particle state (immutable reference).
    fn particles(&self) -> &ParticleArrays;

    /// Get current diagnostics.
    fn error_metrics(&self) -> ErrorMetrics;

    /// Number of particles in the simulation.
    fn particle_count(&self) -> usize;

    /// Return to the initial state without reallocating.
    fn reset(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn metrics_of_rest_state() {
        let mut p = ParticleArrays::zeroed(4).unwrap();
        p.density.fill(1000.0);
        let m = ErrorMetrics::from_particles(&p, 1000.0, 0.5);
        assert_eq!(m.max_density_variation, 0.0);
        assert_eq!(m.mean_density, 1000.0);
        assert_eq!(m.kinetic_energy, 0.0);
        assert_eq!(m.non_finite, 0);
    }

    #[test]
    fn metrics_skip_non_finite() {
        let mut p = ParticleArrays::zeroed(3).unwrap();
        p.density = vec![1000.0, 1100.0, 1000.0];
        p.velocities[0] = Vec2::new(3.0, 4.0);
        p.positions[2] = Vec2::new(f32::NAN, 0.0);
        let m = ErrorMetrics::from_particles(&p, 1000.0, 2.0);
        assert_eq!(m.non_finite, 1);
        assert!((m.max_density_variation - 0.1).abs() < 1e-6);
        assert!((m.mean_density - 1050.0).abs() < 1e-3);
        assert!((m.max_speed - 5.0).abs() < 1e-6);
        assert!((m.kinetic_energy - 25.0).abs() < 1e-9);
    }
}
