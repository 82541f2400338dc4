//! Time integration schemes as fixed stage pipelines.
//!
//! A scheme is an ordered list of [`StageOp`]s: evaluate accelerations at
//! some stage state, or combine stage buffers into a new stage state (or
//! the final state). All evaluations of one physics step share the neighbor
//! structure built at its start, even though the stage positions drift away
//! from the positions it was built from.
//!
//! Each scheme owns a disjoint [`StageBuffers`] set, so switching schemes
//! between steps carries nothing over.

use std::fmt;
use std::str::FromStr;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::buffers::try_filled;
use crate::context::{ComputeKernel, ExecutionContext};
use crate::sph::Evaluator;

/// Available integration schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IntegrationScheme {
    /// Velocity Verlet (kick-drift-kick).
    Verlet,
    /// Second-order Runge-Kutta, midpoint rule.
    Rk2,
    /// Heun predictor-corrector.
    PredictorCorrector,
    /// Classic fourth-order Runge-Kutta.
    #[default]
    Rk4,
}

/// Which state an evaluation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    /// Canonical position and velocity at the start of the step.
    Base,
    /// The stage position with stage velocity `k`.
    Predicted(usize),
}

/// Combine kernels. Each reads the base state and stage buffers and writes
/// either the stage state or the final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    /// `v' = v0 + a1 dt/2`, `x' = x0 + v' dt`
    VerletDrift,
    /// `x = x'`, `v = v' + a2 dt/2`
    VerletFinal,
    /// `x' = x0 + v0 dt/2`, `v' = v0 + a1 dt/2`
    Rk2Midpoint,
    /// `x = x0 + v' dt`, `v = v0 + a2 dt`
    Rk2Final,
    /// `x' = x0 + v0 dt`, `v' = v0 + a1 dt`
    PcPredict,
    /// `x = x0 + (v0 + v') dt/2`, `v = v0 + (a1 + a2) dt/2`
    PcCorrect,
    /// `x' = x0 + v0 dt/2`, `v1 = v0 + a1 dt/2`
    Rk4Step1,
    /// `x' = x0 + v1 dt/2`, `v2 = v0 + a2 dt/2`
    Rk4Step2,
    /// `x' = x0 + v2 dt`, `v3 = v0 + a3 dt`
    Rk4Step3,
    /// weighted `(k1 + 2k2 + 2k3 + k4) / 6` update of `x` and `v`
    Rk4Final,
}

impl Combine {
    /// Kernel dispatched for this combine.
    pub fn kernel(self) -> ComputeKernel {
        match self {
            Self::VerletDrift => ComputeKernel::VerletDrift,
            Self::VerletFinal => ComputeKernel::VerletFinal,
            Self::Rk2Midpoint => ComputeKernel::Rk2Midpoint,
            Self::Rk2Final => ComputeKernel::Rk2Final,
            Self::PcPredict => ComputeKernel::PcPredict,
            Self::PcCorrect => ComputeKernel::PcCorrect,
            Self::Rk4Step1 => ComputeKernel::Rk4Step1,
            Self::Rk4Step2 => ComputeKernel::Rk4Step2,
            Self::Rk4Step3 => ComputeKernel::Rk4Step3,
            Self::Rk4Final => ComputeKernel::Rk4Final,
        }
    }
}

/// One operation of a scheme pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOp {
    /// Density + force at `state`, written to force slot `force`.
    Evaluate {
        /// State to evaluate.
        state: StageState,
        /// Destination acceleration buffer.
        force: usize,
    },
    /// Combine stage buffers.
    Combine(Combine),
}

use StageOp::{Combine as C, Evaluate as E};
use StageState::{Base, Predicted};

const VERLET: &[StageOp] = &[
    E { state: Base, force: 0 },
    C(Combine::VerletDrift),
    E { state: Predicted(0), force: 1 },
    C(Combine::VerletFinal),
];

const RK2: &[StageOp] = &[
    E { state: Base, force: 0 },
    C(Combine::Rk2Midpoint),
    E { state: Predicted(0), force: 1 },
    C(Combine::Rk2Final),
];

const PREDICTOR_CORRECTOR: &[StageOp] = &[
    E { state: Base, force: 0 },
    C(Combine::PcPredict),
    E { state: Predicted(0), force: 1 },
    C(Combine::PcCorrect),
];

const RK4: &[StageOp] = &[
    E { state: Base, force: 0 },
    C(Combine::Rk4Step1),
    E { state: Predicted(0), force: 1 },
    C(Combine::Rk4Step2),
    E { state: Predicted(1), force: 2 },
    C(Combine::Rk4Step3),
    E { state: Predicted(2), force: 3 },
    C(Combine::Rk4Final),
];

impl IntegrationScheme {
    /// All schemes.
    pub const ALL: [IntegrationScheme; 4] = [
        Self::Verlet,
        Self::Rk2,
        Self::PredictorCorrector,
        Self::Rk4,
    ];

    /// The scheme's stage pipeline.
    pub fn pipeline(self) -> &'static [StageOp] {
        match self {
            Self::Verlet => VERLET,
            Self::Rk2 => RK2,
            Self::PredictorCorrector => PREDICTOR_CORRECTOR,
            Self::Rk4 => RK4,
        }
    }

    /// Force evaluations per physics step.
    pub fn stages(self) -> usize {
        match self {
            Self::Rk4 => 4,
            _ => 2,
        }
    }

    /// Stage velocity buffers the scheme needs.
    pub fn velocity_stages(self) -> usize {
        self.stages() - 1
    }

    /// Stable position in [`IntegrationScheme::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Verlet => "verlet",
            Self::Rk2 => "rk2",
            Self::PredictorCorrector => "pc",
            Self::Rk4 => "rk4",
        }
    }
}

impl fmt::Display for IntegrationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IntegrationScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "verlet" => Ok(Self::Verlet),
            "rk2" | "midpoint" => Ok(Self::Rk2),
            "pc" | "predictor-corrector" | "predictorcorrector" => Ok(Self::PredictorCorrector),
            "rk4" => Ok(Self::Rk4),
            other => Err(format!(
                "unknown integration scheme `{other}` (expected verlet, rk2, pc or rk4)"
            )),
        }
    }
}

/// Stage buffers owned by one scheme.
///
/// Two-stage schemes allocate one stage velocity and two force slots; RK4
/// allocates three and four. Unused slots stay empty.
#[derive(Debug, Clone)]
pub struct StageBuffers {
    /// Stage position.
    pub position: Vec<Vec2>,
    /// Stage velocities.
    pub velocity: [Vec<Vec2>; 3],
    /// Accelerations per evaluation.
    pub force: [Vec<Vec2>; 4],
}

impl StageBuffers {
    /// Allocate the buffers `scheme` uses for `n` particles.
    pub fn new(scheme: IntegrationScheme, n: usize) -> crate::error::Result<Self> {
        let mut buffers = Self {
            position: try_filled("stage_position", n, Vec2::ZERO)?,
            velocity: Default::default(),
            force: Default::default(),
        };
        for v in &mut buffers.velocity[..scheme.velocity_stages()] {
            *v = try_filled("stage_velocity", n, Vec2::ZERO)?;
        }
        for f in &mut buffers.force[..scheme.stages()] {
            *f = try_filled("stage_force", n, Vec2::ZERO)?;
        }
        Ok(buffers)
    }

    /// Zero every allocated buffer.
    pub fn clear(&mut self) {
        self.position.fill(Vec2::ZERO);
        for v in &mut self.velocity {
            v.fill(Vec2::ZERO);
        }
        for f in &mut self.force {
            f.fill(Vec2::ZERO);
        }
    }
}

/// Run `scheme`'s pipeline once, advancing `positions`/`velocities` by `dt`.
pub fn advance(
    scheme: IntegrationScheme,
    dt: f32,
    positions: &mut [Vec2],
    velocities: &mut [Vec2],
    stages: &mut StageBuffers,
    eval: &mut Evaluator<'_>,
) {
    for op in scheme.pipeline() {
        match *op {
            StageOp::Evaluate { state, force } => {
                let StageBuffers {
                    position,
                    velocity,
                    force: forces,
                } = stages;
                let (x, v) = match state {
                    Base => (&positions[..], &velocities[..]),
                    Predicted(k) => (&position[..], &velocity[k][..]),
                };
                eval.evaluate(x, v, &mut forces[force]);
            }
            StageOp::Combine(kind) => combine(eval.ctx, kind, dt, positions, velocities, stages),
        }
    }
}

/// Execute one combine kernel.
pub fn combine(
    ctx: &ExecutionContext,
    kind: Combine,
    dt: f32,
    x: &mut [Vec2],
    v: &mut [Vec2],
    stages: &mut StageBuffers,
) {
    let StageBuffers {
        position: xk,
        velocity: [v1, v2, v3],
        force: [a1, a2, a3, a4],
    } = stages;
    let half = 0.5 * dt;
    let sixth = dt / 6.0;
    let kernel = kind.kernel();

    match kind {
        Combine::VerletDrift => {
            let (x0, v0): (&[Vec2], &[Vec2]) = (x, v);
            ctx.dispatch_pair(kernel, xk, v1, |i, xs, vs| {
                *vs = v0[i] + a1[i] * half;
                *xs = x0[i] + *vs * dt;
            });
        }
        Combine::VerletFinal => {
            ctx.dispatch_pair(kernel, x, v, |i, xo, vo| {
                *xo = xk[i];
                *vo = v1[i] + a2[i] * half;
            });
        }
        Combine::Rk2Midpoint | Combine::Rk4Step1 => {
            let (x0, v0): (&[Vec2], &[Vec2]) = (x, v);
            ctx.dispatch_pair(kernel, xk, v1, |i, xs, vs| {
                *xs = x0[i] + v0[i] * half;
                *vs = v0[i] + a1[i] * half;
            });
        }
        Combine::Rk2Final => {
            ctx.dispatch_pair(kernel, x, v, |i, xo, vo| {
                *xo += v1[i] * dt;
                *vo += a2[i] * dt;
            });
        }
        Combine::PcPredict => {
            let (x0, v0): (&[Vec2], &[Vec2]) = (x, v);
            ctx.dispatch_pair(kernel, xk, v1, |i, xs, vs| {
                *xs = x0[i] + v0[i] * dt;
                *vs = v0[i] + a1[i] * dt;
            });
        }
        Combine::PcCorrect => {
            ctx.dispatch_pair(kernel, x, v, |i, xo, vo| {
                *xo += (*vo + v1[i]) * half;
                *vo += (a1[i] + a2[i]) * half;
            });
        }
        Combine::Rk4Step2 => {
            let (x0, v0): (&[Vec2], &[Vec2]) = (x, v);
            ctx.dispatch_pair(kernel, xk, v2, |i, xs, vs| {
                *xs = x0[i] + v1[i] * half;
                *vs = v0[i] + a2[i] * half;
            });
        }
        Combine::Rk4Step3 => {
            let (x0, v0): (&[Vec2], &[Vec2]) = (x, v);
            ctx.dispatch_pair(kernel, xk, v3, |i, xs, vs| {
                *xs = x0[i] + v2[i] * dt;
                *vs = v0[i] + a3[i] * dt;
            });
        }
        Combine::Rk4Final => {
            ctx.dispatch_pair(kernel, x, v, |i, xo, vo| {
                *xo += (*vo + 2.0 * v1[i] + 2.0 * v2[i] + v3[i]) * sixth;
                *vo += (a1[i] + 2.0 * a2[i] + 2.0 * a3[i] + a4[i]) * sixth;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluations(scheme: IntegrationScheme) -> Vec<(StageState, usize)> {
        scheme
            .pipeline()
            .iter()
            .filter_map(|op| match *op {
                StageOp::Evaluate { state, force } => Some((state, force)),
                StageOp::Combine(_) => None,
            })
            .collect()
    }

    #[test]
    fn pipelines_match_stage_counts() {
        for scheme in IntegrationScheme::ALL {
            let evals = evaluations(scheme);
            assert_eq!(evals.len(), scheme.stages(), "{scheme}");
            assert_eq!(evals[0].0, StageState::Base, "{scheme} must start from the base state");
            for (k, (_, slot)) in evals.iter().enumerate() {
                assert_eq!(*slot, k, "{scheme} force slots out of order");
            }
            assert!(
                matches!(scheme.pipeline().last(), Some(StageOp::Combine(_))),
                "{scheme} must end with a combine"
            );
        }
    }

    #[test]
    fn stage_buffers_sized_per_scheme() {
        let rk2 = StageBuffers::new(IntegrationScheme::Rk2, 10).unwrap();
        assert_eq!(rk2.velocity[0].len(), 10);
        assert!(rk2.velocity[1].is_empty());
        assert_eq!(rk2.force[1].len(), 10);
        assert!(rk2.force[2].is_empty());

        let rk4 = StageBuffers::new(IntegrationScheme::Rk4, 10).unwrap();
        assert!(rk4.velocity.iter().all(|v| v.len() == 10));
        assert!(rk4.force.iter().all(|f| f.len() == 10));
    }

    #[test]
    fn scheme_names_parse() {
        for scheme in IntegrationScheme::ALL {
            assert_eq!(scheme.name().parse::<IntegrationScheme>().unwrap(), scheme);
        }
        assert_eq!("Midpoint".parse::<IntegrationScheme>().unwrap(), IntegrationScheme::Rk2);
        assert!("euler".parse::<IntegrationScheme>().is_err());
    }

    /// Constant acceleration: every scheme is exact for x and v.
    #[test]
    fn combines_exact_under_constant_acceleration() {
        let ctx = ExecutionContext::serial().unwrap();
        let dt = 0.1;
        let g = Vec2::new(0.0, -10.0);
        for scheme in IntegrationScheme::ALL {
            let mut x = vec![Vec2::new(1.0, 2.0)];
            let mut v = vec![Vec2::new(0.5, 0.0)];
            let mut stages = StageBuffers::new(scheme, 1).unwrap();
            for op in scheme.pipeline() {
                match *op {
                    StageOp::Evaluate { force, .. } => stages.force[force][0] = g,
                    StageOp::Combine(kind) => combine(&ctx, kind, dt, &mut x, &mut v, &mut stages),
                }
            }
            let expected_x = Vec2::new(1.0 + 0.5 * dt, 2.0 + 0.5 * g.y * dt * dt);
            assert!((x[0] - expected_x).length() < 1e-5, "{scheme}: x = {}", x[0]);
            assert!((v[0] - Vec2::new(0.5, g.y * dt)).length() < 1e-5, "{scheme}: v = {}", v[0]);
        }
    }
}
