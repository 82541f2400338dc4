//! Step driver: owns the buffers and runs frames of physics steps.
//!
//! # Step structure
//! Each frame runs `max(1, substeps)` physics steps. One physics step is
//! 1. grid indexer (Morton key, id, cell per particle),
//! 2. radix sort on `morton_bits` key bits,
//! 3. cell range build,
//! 4. the integrator pipeline, evaluating density and force once per sub-stage
//!    against the neighbor structure from 1-3,
//! 5. boundary resolution.
//!
//! Steps never overlap and a frame is never partially applied: a paused
//! solver skips the whole frame.

use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::boundary::resolve_boundaries;
use crate::buffers::BufferArena;
use crate::config::SolverConfig;
use crate::context::ExecutionContext;
use crate::error::{Result, SolverError};
use crate::grid::{index_particles, GridParams};
use crate::integrator::{self, IntegrationScheme};
use crate::neighbor::CellRanges;
use crate::particle::ParticleArrays;
use crate::radix::SortBuffers;
use crate::seed::seed_positions;
use crate::sph::{particle_mass, Evaluator, FluidParams, NeighborView};
use crate::{ErrorMetrics, SimulationKernel};

/// Wall-clock breakdown of the most recent frame, summed over its steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StepProfile {
    /// Physics steps in the frame.
    pub steps: u32,
    /// Grid indexer (microseconds).
    pub index_us: u64,
    /// Radix sort (microseconds).
    pub sort_us: u64,
    /// Cell range build (microseconds).
    pub ranges_us: u64,
    /// Integrator pipeline including every evaluation (microseconds).
    pub integrate_us: u64,
    /// Boundary resolution (microseconds).
    pub boundary_us: u64,
    /// Whole frame (microseconds).
    pub total_us: u64,
}

impl StepProfile {
    fn accumulate(&mut self, step: &StepProfile) {
        self.steps += step.steps;
        self.index_us += step.index_us;
        self.sort_us += step.sort_us;
        self.ranges_us += step.ranges_us;
        self.integrate_us += step.integrate_us;
        self.boundary_us += step.boundary_us;
    }
}

/// Copy of the readable particle state between frames.
#[derive(Debug, Clone, Default)]
pub struct FrameSnapshot {
    /// Frames completed when the snapshot was taken.
    pub frame: u64,
    /// Simulated time (seconds).
    pub time: f64,
    /// Positions.
    pub positions: Vec<Vec2>,
    /// Velocities.
    pub velocities: Vec<Vec2>,
    /// Densities.
    pub density: Vec<f32>,
    /// Pressures.
    pub pressure: Vec<f32>,
}

impl FrameSnapshot {
    /// Particle count.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True for an empty snapshot.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Positions as raw bytes (interleaved `f32` x/y), for upload to a renderer.
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    /// Velocities as raw bytes (interleaved `f32` x/y).
    pub fn velocity_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.velocities)
    }
}

/// A single parameter change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamUpdate {
    /// Equation-of-state stiffness.
    Stiffness(f32),
    /// Rest density.
    RestDensity(f32),
    /// Viscosity coefficient.
    Viscosity(f32),
    /// Near-pressure coefficient.
    NearPressure(f32),
    /// Gravity multiplier.
    GravityMultiplier(f32),
    /// Physics step.
    Dt(f32),
    /// Physics steps per frame.
    Substeps(u32),
    /// Integration scheme.
    Scheme(IntegrationScheme),
    /// Particle count; rebuilds buffers and reseeds.
    ParticleCount(usize),
    /// Particle radius; rebuilds buffers and reseeds.
    ParticleRadius(f32),
}

impl ParamUpdate {
    /// Apply to a configuration.
    pub fn apply_to(self, config: &mut SolverConfig) {
        match self {
            Self::Stiffness(v) => config.stiffness = v,
            Self::RestDensity(v) => config.rest_density = v,
            Self::Viscosity(v) => config.viscosity = v,
            Self::NearPressure(v) => config.near_pressure = v,
            Self::GravityMultiplier(v) => config.gravity_multiplier = v,
            Self::Dt(v) => config.dt = v,
            Self::Substeps(v) => config.substeps = v,
            Self::Scheme(v) => config.scheme = v,
            Self::ParticleCount(v) => config.particle_count = v,
            Self::ParticleRadius(v) => config.particle_radius = v,
        }
    }
}

#[derive(Debug, Clone)]
struct InitialState {
    positions: Vec<Vec2>,
}

pub(crate) fn fluid_params(config: &SolverConfig, grid: &GridParams) -> FluidParams {
    let h = grid.smoothing_radius();
    FluidParams {
        h,
        mass: particle_mass(h, config.rest_density),
        rest_density: config.rest_density,
        stiffness: config.stiffness,
        viscosity: config.viscosity,
        near_pressure: config.near_pressure,
        gravity_multiplier: config.gravity_multiplier,
    }
}

/// The 2D SPH solver.
///
/// Owns every buffer exclusively. Readers get slices between steps; there
/// is no way to observe a partially applied frame.
pub struct Solver {
    config: SolverConfig,
    ctx: Arc<ExecutionContext>,
    grid: GridParams,
    params: FluidParams,
    arena: BufferArena,
    initial: Option<InitialState>,
    paused: bool,
    frame: u64,
    sim_time: f64,
    last_profile: StepProfile,
}

impl std::fmt::Debug for Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Solver")
            .field("particles", &self.arena.len())
            .field("grid", &self.grid.dims)
            .field("scheme", &self.config.scheme)
            .field("frame", &self.frame)
            .finish()
    }
}

impl Solver {
    /// Build a solver with lattice-seeded particles at rest.
    pub fn new(config: SolverConfig, ctx: Arc<ExecutionContext>) -> Result<Self> {
        Self::build(config, ctx, None, None)
    }

    /// Build a solver from explicit positions and velocities.
    ///
    /// Both arrays must hold exactly `config.particle_count` entries. Reset
    /// returns to these positions, at rest.
    pub fn with_initial_state(
        config: SolverConfig,
        ctx: Arc<ExecutionContext>,
        positions: Vec<Vec2>,
        velocities: Vec<Vec2>,
    ) -> Result<Self> {
        for len in [positions.len(), velocities.len()] {
            if len != config.particle_count {
                return Err(SolverError::ParticleCountMismatch {
                    expected: config.particle_count,
                    actual: len,
                });
            }
        }
        Self::build(config, ctx, Some(InitialState { positions }), Some(velocities))
    }

    fn build(
        config: SolverConfig,
        ctx: Arc<ExecutionContext>,
        initial: Option<InitialState>,
        velocities: Option<Vec<Vec2>>,
    ) -> Result<Self> {
        config.validate()?;
        let grid = GridParams::new(
            config.particle_radius,
            config.half_extents(),
            config.neighbor_radius_cells,
        )?;
        let arena = BufferArena::new(config.particle_count, grid.cell_count(), 0)?;
        let mut solver = Self {
            params: fluid_params(&config, &grid),
            config,
            ctx,
            grid,
            arena,
            initial,
            paused: false,
            frame: 0,
            sim_time: 0.0,
            last_profile: StepProfile::default(),
        };
        solver.seed_state();
        if let Some(v) = velocities {
            solver.arena.particles.velocities = v;
        }
        tracing::info!(
            particles = solver.arena.len(),
            grid_x = grid.dims.x,
            grid_y = grid.dims.y,
            cell_size = grid.cell_size,
            morton_bits = grid.morton_bits,
            scheme = %solver.config.scheme,
            "solver created"
        );
        Ok(solver)
    }

    fn seed_state(&mut self) {
        match &self.initial {
            Some(init) => self.arena.particles.positions.copy_from_slice(&init.positions),
            None => {
                seed_positions(
                    &self.ctx,
                    &mut self.arena.particles.positions,
                    self.config.particle_radius,
                    self.config.half_extents(),
                    &self.config.seed,
                );
            }
        }
    }

    // ---- Stepping ----

    /// Advance one frame of `max(1, substeps)` physics steps.
    ///
    /// Returns `false` without touching any state when paused.
    pub fn advance_frame(&mut self) -> bool {
        if self.paused {
            return false;
        }
        let start = Instant::now();
        let mut profile = StepProfile::default();
        for _ in 0..self.config.effective_substeps() {
            profile.accumulate(&self.step());
        }
        profile.total_us = start.elapsed().as_micros() as u64;
        self.frame += 1;
        self.last_profile = profile;
        tracing::debug!(
            frame = self.frame,
            sim_time = self.sim_time,
            steps = profile.steps,
            total_us = profile.total_us,
            "frame complete"
        );
        true
    }

    /// One physics step of `dt`, regardless of the pause state.
    pub fn step(&mut self) -> StepProfile {
        let ctx: &ExecutionContext = &self.ctx;
        let scheme = self.config.scheme;
        let dt = self.config.dt;
        let half_extents = self.config.half_extents();
        let restitution = self.config.restitution;
        let grid = &self.grid;
        let BufferArena {
            particles,
            sorter,
            ranges,
            sorted,
            stages,
            ..
        } = &mut self.arena;
        let mut profile = StepProfile {
            steps: 1,
            ..StepProfile::default()
        };

        let t = Instant::now();
        index_particles(ctx, grid, &particles.positions, sorter.live());
        profile.index_us = t.elapsed().as_micros() as u64;

        let t = Instant::now();
        sorter.sort(ctx, grid.morton_bits);
        profile.sort_us = t.elapsed().as_micros() as u64;

        let t = Instant::now();
        ranges.build(ctx, sorter.live());
        profile.ranges_us = t.elapsed().as_micros() as u64;

        let t = Instant::now();
        let ParticleArrays {
            positions,
            velocities,
            density,
            pressure,
        } = particles;
        let mut eval = Evaluator {
            ctx,
            neighbors: NeighborView {
                grid,
                ranges,
                sorted: sorter.live(),
            },
            params: self.params,
            scratch: sorted,
            density: density.as_mut_slice(),
            pressure: pressure.as_mut_slice(),
        };
        integrator::advance(
            scheme,
            dt,
            positions,
            velocities,
            &mut stages[scheme.index()],
            &mut eval,
        );
        profile.integrate_us = t.elapsed().as_micros() as u64;

        let t = Instant::now();
        resolve_boundaries(ctx, positions, velocities, half_extents, restitution);
        profile.boundary_us = t.elapsed().as_micros() as u64;

        self.sim_time += dt as f64;
        profile
    }

    /// Reseed positions and zero velocities, stage buffers, density and
    /// pressure. Buffers are reused as-is.
    pub fn reset(&mut self) {
        self.arena.zero_dynamics();
        self.seed_state();
        self.frame = 0;
        self.sim_time = 0.0;
        tracing::info!(particles = self.arena.len(), "solver reset");
    }

    /// Stop frames from advancing.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Let frames advance again.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Whether frames are currently skipped.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // ---- Configuration ----

    /// Replace the configuration.
    ///
    /// Validation and allocation happen first; on error nothing changes. Particle count,
    /// radius or domain changes rebuild the whole arena and reseed. Every
    /// other field applies from the next step without reallocating. Seed
    /// settings take effect on the next reseed.
    pub fn apply_config(&mut self, config: SolverConfig) -> Result<()> {
        config.validate()?;
        let grid = GridParams::new(
            config.particle_radius,
            config.half_extents(),
            config.neighbor_radius_cells,
        )?;
        let rebuild = config.particle_count != self.config.particle_count
            || config.particle_radius != self.config.particle_radius
            || config.half_extents != self.config.half_extents;
        let arena = if rebuild {
            let generation = self.arena.generation() + 1;
            Some(BufferArena::new(config.particle_count, grid.cell_count(), generation)?)
        } else {
            None
        };
        if config.particle_count != self.config.particle_count {
            self.initial = None;
        }
        self.params = fluid_params(&config, &grid);
        self.config = config;
        self.grid = grid;

        if let Some(arena) = arena {
            let generation = arena.generation();
            self.arena = arena;
            self.seed_state();
            self.frame = 0;
            self.sim_time = 0.0;
            tracing::info!(
                particles = self.arena.len(),
                grid_x = grid.dims.x,
                grid_y = grid.dims.y,
                generation,
                "buffers rebuilt"
            );
        }
        Ok(())
    }

    /// Apply a single parameter change.
    pub fn apply_update(&mut self, update: ParamUpdate) -> Result<()> {
        let mut config = self.config.clone();
        update.apply_to(&mut config);
        self.apply_config(config)
    }

    /// Set the equation-of-state stiffness.
    pub fn set_stiffness(&mut self, stiffness: f32) -> Result<()> {
        self.apply_update(ParamUpdate::Stiffness(stiffness))
    }

    /// Set the rest density.
    pub fn set_rest_density(&mut self, rest_density: f32) -> Result<()> {
        self.apply_update(ParamUpdate::RestDensity(rest_density))
    }

    /// Set the viscosity coefficient.
    pub fn set_viscosity(&mut self, viscosity: f32) -> Result<()> {
        self.apply_update(ParamUpdate::Viscosity(viscosity))
    }

    /// Set the near-pressure coefficient.
    pub fn set_near_pressure(&mut self, near_pressure: f32) -> Result<()> {
        self.apply_update(ParamUpdate::NearPressure(near_pressure))
    }

    /// Set the gravity multiplier.
    pub fn set_gravity_multiplier(&mut self, multiplier: f32) -> Result<()> {
        self.apply_update(ParamUpdate::GravityMultiplier(multiplier))
    }

    /// Set the physics step.
    pub fn set_dt(&mut self, dt: f32) -> Result<()> {
        self.apply_update(ParamUpdate::Dt(dt))
    }

    /// Set physics steps per frame.
    pub fn set_substeps(&mut self, substeps: u32) -> Result<()> {
        self.apply_update(ParamUpdate::Substeps(substeps))
    }

    /// Switch integration scheme.
    pub fn set_scheme(&mut self, scheme: IntegrationScheme) -> Result<()> {
        self.apply_update(ParamUpdate::Scheme(scheme))
    }

    /// Change particle count; rebuilds and reseeds.
    pub fn set_particle_count(&mut self, count: usize) -> Result<()> {
        self.apply_update(ParamUpdate::ParticleCount(count))
    }

    /// Change particle radius; rebuilds and reseeds.
    pub fn set_particle_radius(&mut self, radius: f32) -> Result<()> {
        self.apply_update(ParamUpdate::ParticleRadius(radius))
    }

    // ---- Readouts ----

    /// Particle positions.
    pub fn positions(&self) -> &[Vec2] {
        &self.arena.particles.positions
    }

    /// Particle velocities.
    pub fn velocities(&self) -> &[Vec2] {
        &self.arena.particles.velocities
    }

    /// Densities from the last evaluation.
    pub fn densities(&self) -> &[f32] {
        &self.arena.particles.density
    }

    /// Pressures from the last evaluation.
    pub fn pressures(&self) -> &[f32] {
        &self.arena.particles.pressure
    }

    /// All particle arrays.
    pub fn particles(&self) -> &ParticleArrays {
        &self.arena.particles
    }

    /// Copy of the readable state.
    pub fn snapshot(&self) -> FrameSnapshot {
        let p = &self.arena.particles;
        FrameSnapshot {
            frame: self.frame,
            time: self.sim_time,
            positions: p.positions.clone(),
            velocities: p.velocities.clone(),
            density: p.density.clone(),
            pressure: p.pressure.clone(),
        }
    }

    /// Aggregate diagnostics of the current state.
    pub fn error_metrics(&self) -> ErrorMetrics {
        ErrorMetrics::from_particles(&self.arena.particles, self.params.rest_density, self.params.mass)
    }

    /// Active configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Grid of the current buffer set.
    pub fn grid(&self) -> &GridParams {
        &self.grid
    }

    /// Fluid constants handed to the evaluators.
    pub fn fluid_params(&self) -> &FluidParams {
        &self.params
    }

    /// Cell ranges from the most recent step.
    pub fn cell_ranges(&self) -> &CellRanges {
        &self.arena.ranges
    }

    /// Sorted keys, ids and cells from the most recent step.
    pub fn sorted(&self) -> &SortBuffers {
        self.arena.sorter.live()
    }

    /// Shared execution context.
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    /// Frames completed since construction, reset or rebuild.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Simulated time (seconds).
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    /// Timing of the most recent frame.
    pub fn last_profile(&self) -> StepProfile {
        self.last_profile
    }

    /// Arena allocation counter.
    pub fn buffer_generation(&self) -> u64 {
        self.arena.generation()
    }
}

impl SimulationKernel for Solver {
    fn advance_frame(&mut self) -> bool {
        Solver::advance_frame(self)
    }

    fn particles(&self) -> &ParticleArrays {
        Solver::particles(self)
    }

    fn error_metrics(&self) -> ErrorMetrics {
        Solver::error_metrics(self)
    }

    fn particle_count(&self) -> usize {
        self.arena.len()
    }

    fn reset(&mut self) {
        Solver::reset(self)
    }
}
