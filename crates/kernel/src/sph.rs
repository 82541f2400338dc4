//! 2D SPH smoothing kernels and the density / force evaluators.
//!
//! Kernels follow Müller et al. (2003), restated for two dimensions with
//! support radius `h` equal to the grid cell size:
//! - poly6 for density,
//! - the gradient of the spiky kernel for pressure,
//! - the Laplacian of the viscosity kernel for viscosity,
//! - an optional near-pressure term on the cubic spiky profile, which keeps
//!   close pairs apart even where the clamped pressure is zero.
//!
//! Evaluation of one integrator sub-stage is four dispatches:
//! 1. gather stage positions/velocities into sorted order,
//! 2. density and pressure per particle,
//! 3. gather density/pressure into sorted order,
//! 4. acceleration per particle.
//!
//! Neighbor loops read only the sorted copies; every work item writes only
//! its own particle slot.

use std::f32::consts::PI;

use glam::Vec2;

use crate::buffers::try_filled;
use crate::context::{ComputeKernel, ExecutionContext};
use crate::eos::{floor_density, linear_eos};
use crate::error::Result;
use crate::grid::GridParams;
use crate::neighbor::CellRanges;
use crate::radix::SortBuffers;

/// Standard gravitational acceleration, pointing down.
pub const GRAVITY: Vec2 = Vec2::new(0.0, -9.81);

/// Squared distance below which a pair is treated as coincident and skipped.
const MIN_PAIR_DIST_SQ: f32 = 1.0e-12;

/// 2D poly6 kernel.
///
/// ```text
/// W(r, h) = 4 / (pi h^2) * (1 - r^2/h^2)^3    for r < h
/// ```
///
/// Integrates to one over the disk of radius `h`.
pub fn poly6(r2: f32, h: f32) -> f32 {
    let h2 = h * h;
    4.0 / (PI * h2) * poly6_shape(r2, h2)
}

/// Unnormalized poly6 profile `(1 - r^2/h^2)^3`, equal to 1 at the center.
#[inline]
pub fn poly6_shape(r2: f32, h2: f32) -> f32 {
    if r2 >= h2 {
        return 0.0;
    }
    let q = 1.0 - r2 / h2;
    q * q * q
}

/// Radial derivative of the 2D spiky kernel.
///
/// ```text
/// dW/dr = -30 / (pi h^5) * (h - r)^2    for r < h
/// ```
///
/// Multiply by the unit vector from j to i for the gradient at particle i.
#[inline]
pub fn spiky_derivative(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    let d = h - r;
    -30.0 / (PI * h.powi(5)) * d * d
}

/// Laplacian of the 2D viscosity kernel.
///
/// ```text
/// lap W = 40 / (pi h^5) * (h - r)    for r < h
/// ```
#[inline]
pub fn viscosity_laplacian(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    40.0 / (PI * h.powi(5)) * (h - r)
}

/// Radial profile of the near-pressure gradient.
///
/// ```text
/// dWn/dr = -10 / (pi h^5) * (h - r)^3    for r < h
/// ```
///
/// One power of `(h - r)` steeper than the spiky derivative, so it only
/// matters at short range.
#[inline]
pub fn near_pressure_derivative(r: f32, h: f32) -> f32 {
    if r >= h {
        return 0.0;
    }
    let d = h - r;
    -10.0 / (PI * h.powi(5)) * d * d * d
}

/// Per-particle mass giving `rest_density` for an isolated particle.
///
/// `m * W(0, h) = rho0` with the 2D poly6 kernel.
pub fn particle_mass(h: f32, rest_density: f32) -> f32 {
    rest_density * PI * h * h / 4.0
}

/// Fluid constants consumed by the evaluators, laid out as a uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FluidParams {
    /// Smoothing radius.
    pub h: f32,
    /// Per-particle mass.
    pub mass: f32,
    /// Rest density rho0.
    pub rest_density: f32,
    /// Equation-of-state stiffness.
    pub stiffness: f32,
    /// Viscosity coefficient.
    pub viscosity: f32,
    /// Near-pressure coefficient; 0 disables the term.
    pub near_pressure: f32,
    /// Gravity multiplier applied to [`GRAVITY`].
    pub gravity_multiplier: f32,
}

impl FluidParams {
    /// Gravity acceleration vector.
    pub fn gravity(&self) -> Vec2 {
        GRAVITY * self.gravity_multiplier
    }
}

/// Sorted-order copies of the stage state, rebuilt for every evaluation.
#[derive(Debug, Clone, Default)]
pub struct SortedState {
    /// Positions in sorted order.
    pub position: Vec<Vec2>,
    /// Velocities in sorted order.
    pub velocity: Vec<Vec2>,
    /// Densities in sorted order.
    pub density: Vec<f32>,
    /// Pressures in sorted order.
    pub pressure: Vec<f32>,
}

impl SortedState {
    /// Zeroed copies for `n` particles.
    pub fn new(n: usize) -> Result<Self> {
        Ok(Self {
            position: try_filled("sorted_position", n, Vec2::ZERO)?,
            velocity: try_filled("sorted_velocity", n, Vec2::ZERO)?,
            density: try_filled("sorted_density", n, 0.0)?,
            pressure: try_filled("sorted_pressure", n, 0.0)?,
        })
    }

    /// Zero every array in place.
    pub fn clear(&mut self) {
        self.position.fill(Vec2::ZERO);
        self.velocity.fill(Vec2::ZERO);
        self.density.fill(0.0);
        self.pressure.fill(0.0);
    }
}

/// The frozen neighbor structure of one physics step.
#[derive(Debug, Clone, Copy)]
pub struct NeighborView<'a> {
    /// Grid the ranges were built on.
    pub grid: &'a GridParams,
    /// Per-cell sorted ranges.
    pub ranges: &'a CellRanges,
    /// Live sort buffer (ids in sorted order).
    pub sorted: &'a SortBuffers,
}

/// Density and force evaluation against one neighbor structure.
///
/// Borrows the per-particle density/pressure outputs and the sorted scratch
/// for the duration of a step; the integrator calls [`Evaluator::evaluate`]
/// once per sub-stage.
pub struct Evaluator<'a> {
    /// Dispatch target.
    pub ctx: &'a ExecutionContext,
    /// Frozen neighbor structure.
    pub neighbors: NeighborView<'a>,
    /// Fluid constants.
    pub params: FluidParams,
    /// Sorted copies.
    pub scratch: &'a mut SortedState,
    /// Density per particle (output).
    pub density: &'a mut [f32],
    /// Pressure per particle (output).
    pub pressure: &'a mut [f32],
}

impl Evaluator<'_> {
    /// Evaluate density, pressure and acceleration at the state `(pos, vel)`.
    pub fn evaluate(&mut self, pos: &[Vec2], vel: &[Vec2], accel: &mut [Vec2]) {
        reorder_state(self.ctx, self.neighbors.sorted, pos, vel, self.scratch);
        compute_density(
            self.ctx,
            &self.neighbors,
            &self.params,
            pos,
            &self.scratch.position,
            self.density,
            self.pressure,
        );
        reorder_density_pressure(
            self.ctx,
            self.neighbors.sorted,
            self.density,
            self.pressure,
            self.scratch,
        );
        compute_forces(
            self.ctx,
            &self.neighbors,
            &self.params,
            pos,
            vel,
            self.density,
            self.pressure,
            self.scratch,
            accel,
        );
    }
}

/// Gather `pos`/`vel` into sorted order: `sorted[k] = state[ids[k]]`.
pub fn reorder_state(
    ctx: &ExecutionContext,
    sorted: &SortBuffers,
    pos: &[Vec2],
    vel: &[Vec2],
    out: &mut SortedState,
) {
    ctx.dispatch_pair(
        ComputeKernel::ReorderState,
        &mut out.position,
        &mut out.velocity,
        |k, p, v| {
            let id = sorted.id(k) as usize;
            *p = pos[id];
            *v = vel[id];
        },
    );
}

/// Gather density/pressure into sorted order.
pub fn reorder_density_pressure(
    ctx: &ExecutionContext,
    sorted: &SortBuffers,
    density: &[f32],
    pressure: &[f32],
    out: &mut SortedState,
) {
    ctx.dispatch_pair(
        ComputeKernel::ReorderDensityPressure,
        &mut out.density,
        &mut out.pressure,
        |k, d, p| {
            let id = sorted.id(k) as usize;
            *d = density[id];
            *p = pressure[id];
        },
    );
}

/// Density summation plus equation of state.
///
/// ```text
/// rho_i = sum_j m W(|x_i - x_j|, h)     (self term included)
/// P_i   = max(0, k (rho_i - rho0))
/// ```
///
/// With `m` from [`particle_mass`], this is `rho0 * sum_j (1 - r^2/h^2)^3`.
pub fn compute_density(
    ctx: &ExecutionContext,
    neighbors: &NeighborView<'_>,
    params: &FluidParams,
    pos: &[Vec2],
    sorted_pos: &[Vec2],
    density: &mut [f32],
    pressure: &mut [f32],
) {
    let h2 = params.h * params.h;
    ctx.dispatch_pair(ComputeKernel::Density, density, pressure, |i, rho, p| {
        let xi = pos[i];
        let mut sum = 1.0;
        neighbors
            .ranges
            .for_each_candidate(neighbors.grid, neighbors.grid.cell_of(xi), |k| {
                if neighbors.sorted.id(k) as usize == i {
                    return;
                }
                sum += poly6_shape((xi - sorted_pos[k]).length_squared(), h2);
            });
        *rho = floor_density(params.rest_density * sum);
        *p = linear_eos(*rho, params.rest_density, params.stiffness);
    });
}

/// Pairwise pressure, near-pressure and viscosity acceleration on particle `i` from `j`.
///
/// `d = x_i - x_j`. Antisymmetric under swapping i and j, so pair
/// contributions cancel exactly. Near pressure is `k_near * rho`, which makes
/// its term `-m k_near (1/rho_i + 1/rho_j) grad Wn`.
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn pair_acceleration(
    params: &FluidParams,
    d: Vec2,
    r: f32,
    rho_i: f32,
    p_i: f32,
    v_i: Vec2,
    rho_j: f32,
    p_j: f32,
    v_j: Vec2,
) -> Vec2 {
    let h = params.h;
    let grad_w = d / r * spiky_derivative(r, h);
    let pressure_term = p_i / (rho_i * rho_i) + p_j / (rho_j * rho_j);
    let mut a = -params.mass * pressure_term * grad_w;

    if params.near_pressure > 0.0 {
        let grad_near = d / r * near_pressure_derivative(r, h);
        a -= params.mass * params.near_pressure * (1.0 / rho_i + 1.0 / rho_j) * grad_near;
    }

    let mean_density = 0.5 * (rho_i + rho_j);
    a += params.viscosity * params.mass * (v_j - v_i) / mean_density * viscosity_laplacian(r, h);
    a
}

/// Acceleration per particle: pressure + viscosity + gravity.
#[allow(clippy::too_many_arguments)]
pub fn compute_forces(
    ctx: &ExecutionContext,
    neighbors: &NeighborView<'_>,
    params: &FluidParams,
    pos: &[Vec2],
    vel: &[Vec2],
    density: &[f32],
    pressure: &[f32],
    sorted: &SortedState,
    accel: &mut [Vec2],
) {
    let h2 = params.h * params.h;
    let gravity = params.gravity();
    ctx.dispatch(ComputeKernel::Force, accel, |i, out| {
        let xi = pos[i];
        let vi = vel[i];
        let rho_i = density[i];
        let p_i = pressure[i];
        let mut a = Vec2::ZERO;
        neighbors
            .ranges
            .for_each_candidate(neighbors.grid, neighbors.grid.cell_of(xi), |k| {
                if neighbors.sorted.id(k) as usize == i {
                    return;
                }
                let d = xi - sorted.position[k];
                let r2 = d.length_squared();
                if r2 >= h2 || r2 < MIN_PAIR_DIST_SQ {
                    return;
                }
                a += pair_acceleration(
                    params,
                    d,
                    r2.sqrt(),
                    rho_i,
                    p_i,
                    vi,
                    sorted.density[k],
                    sorted.pressure[k],
                    sorted.velocity[k],
                );
            });
        *out = a + gravity;
    });
}
