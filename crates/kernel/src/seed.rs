//! Initial particle placement.
//!
//! Particles are laid out row by row on a square lattice inside the seed
//! region, starting at its lower-left corner. When the preferred spacing
//! cannot fit every particle, the spacing shrinks until it does.

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SeedConfig;
use crate::context::{ComputeKernel, ExecutionContext};

/// Lattice geometry chosen for a seed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lattice {
    /// World-space lower-left corner of the region.
    pub origin: Vec2,
    /// Distance between neighboring lattice sites.
    pub spacing: f32,
    /// Sites per row.
    pub columns: usize,
}

impl Lattice {
    /// Fit `n` particles of `radius` into the seed region of a domain.
    pub fn fit(n: usize, radius: f32, half_extents: Vec2, seed: &SeedConfig) -> Self {
        let extent = 2.0 * half_extents;
        let lo = -half_extents + Vec2::from(seed.region_min) * extent;
        let hi = -half_extents + Vec2::from(seed.region_max) * extent;
        let size = hi - lo;

        let mut spacing = seed.spacing_factor * radius;
        let mut columns;
        loop {
            columns = ((size.x / spacing).floor() as usize).max(1);
            let rows = n.div_ceil(columns);
            if rows as f32 * spacing <= size.y || spacing <= f32::EPSILON {
                break;
            }
            spacing *= 0.95;
        }
        Self {
            origin: lo,
            spacing,
            columns,
        }
    }

    /// Center of lattice site `i`.
    #[inline]
    pub fn site(&self, i: usize) -> Vec2 {
        let col = (i % self.columns) as f32;
        let row = (i / self.columns) as f32;
        self.origin + Vec2::new(col + 0.5, row + 0.5) * self.spacing
    }
}

/// Write seeded positions into `positions`.
pub fn seed_positions(
    ctx: &ExecutionContext,
    positions: &mut [Vec2],
    radius: f32,
    half_extents: Vec2,
    seed: &SeedConfig,
) -> Lattice {
    let lattice = Lattice::fit(positions.len(), radius, half_extents, seed);
    let offsets: Vec<Vec2> = if seed.jitter > 0.0 {
        let amplitude = seed.jitter * lattice.spacing;
        let mut rng = StdRng::seed_from_u64(seed.rng_seed);
        (0..positions.len())
            .map(|_| {
                Vec2::new(
                    rng.random_range(-amplitude..amplitude),
                    rng.random_range(-amplitude..amplitude),
                )
            })
            .collect()
    } else {
        Vec::new()
    };

    ctx.dispatch(ComputeKernel::InitPositions, positions, |i, p| {
        let jitter = offsets.get(i).copied().unwrap_or(Vec2::ZERO);
        *p = lattice.site(i) + jitter;
    });
    tracing::debug!(
        particles = positions.len(),
        spacing = lattice.spacing,
        columns = lattice.columns,
        "seeded particle lattice"
    );
    lattice
}
