//! Buffer arena: every array sized by particle count or grid resolution.
//!
//! The arena is allocated as one unit and replaced as one unit whenever
//! particle count, radius or domain changes. Reset zeroes it in place.
//! Every allocation is fallible so that an oversized configuration surfaces
//! as [`SolverError::Allocation`] instead of aborting the process.

use std::sync::atomic::AtomicU32;

use crate::error::{Result, SolverError};
use crate::integrator::{IntegrationScheme, StageBuffers};
use crate::neighbor::CellRanges;
use crate::particle::ParticleArrays;
use crate::radix::RadixSorter;
use crate::sph::SortedState;

/// `n` copies of `value`, or an allocation error naming `buffer`.
pub(crate) fn try_filled<T: Clone>(buffer: &'static str, n: usize, value: T) -> Result<Vec<T>> {
    let mut v = Vec::new();
    v.try_reserve_exact(n).map_err(|_| SolverError::Allocation {
        buffer,
        bytes: n.saturating_mul(std::mem::size_of::<T>()),
    })?;
    v.resize(n, value);
    Ok(v)
}

/// `n` atomics holding `init`, or an allocation error naming `buffer`.
pub(crate) fn try_atomic(buffer: &'static str, n: usize, init: u32) -> Result<Box<[AtomicU32]>> {
    let mut v: Vec<AtomicU32> = Vec::new();
    v.try_reserve_exact(n).map_err(|_| SolverError::Allocation {
        buffer,
        bytes: n.saturating_mul(std::mem::size_of::<AtomicU32>()),
    })?;
    v.extend((0..n).map(|_| AtomicU32::new(init)));
    Ok(v.into_boxed_slice())
}

/// All solver-owned buffers.
#[derive(Debug)]
pub struct BufferArena {
    /// Canonical particle state.
    pub particles: ParticleArrays,
    /// Ping-pong sort buffers and scan scratch.
    pub sorter: RadixSorter,
    /// Per-cell sorted ranges.
    pub ranges: CellRanges,
    /// Sorted copies used by neighbor loops.
    pub sorted: SortedState,
    /// Stage buffers, one disjoint set per scheme (indexed by [`IntegrationScheme::index`]).
    pub stages: [StageBuffers; 4],
    generation: u64,
}

impl BufferArena {
    /// Allocate zeroed buffers for `n` particles on a grid of `cell_count` cells.
    pub fn new(n: usize, cell_count: usize, generation: u64) -> Result<Self> {
        let [verlet, rk2, pc, rk4] = IntegrationScheme::ALL;
        Ok(Self {
            particles: ParticleArrays::zeroed(n)?,
            sorter: RadixSorter::new(n)?,
            ranges: CellRanges::new(cell_count)?,
            sorted: SortedState::new(n)?,
            stages: [
                StageBuffers::new(verlet, n)?,
                StageBuffers::new(rk2, n)?,
                StageBuffers::new(pc, n)?,
                StageBuffers::new(rk4, n)?,
            ],
            generation,
        })
    }

    /// Particle count the arena is sized for.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// True when sized for no particles.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Allocation counter; bumps on every rebuild, never on reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Zero velocities, densities, pressures, sorted copies and every stage buffer.
    pub fn zero_dynamics(&mut self) {
        self.particles.clear_dynamics();
        self.sorted.clear();
        for stage in &mut self.stages {
            stage.clear();
        }
    }

    /// Stage buffers of `scheme`.
    pub fn stages_mut(&mut self, scheme: IntegrationScheme) -> &mut StageBuffers {
        &mut self.stages[scheme.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;

    #[test]
    fn sized_per_particle_and_cell() {
        let arena = BufferArena::new(32, 100, 0).unwrap();
        assert_eq!(arena.len(), 32);
        assert_eq!(arena.sorter.len(), 32);
        assert_eq!(arena.ranges.cell_count(), 100);
        assert_eq!(arena.sorted.position.len(), 32);
        assert_eq!(arena.stages[IntegrationScheme::Rk4.index()].force[3].len(), 32);
    }

    #[test]
    fn zero_dynamics_clears_stage_forces() {
        let mut arena = BufferArena::new(4, 4, 3).unwrap();
        arena.particles.velocities[2] = Vec2::ONE;
        arena.stages_mut(IntegrationScheme::Verlet).force[1][0] = Vec2::ONE;
        arena.zero_dynamics();
        assert!(arena.particles.velocities.iter().all(|v| *v == Vec2::ZERO));
        assert_eq!(arena.stages_mut(IntegrationScheme::Verlet).force[1][0], Vec2::ZERO);
        assert_eq!(arena.generation(), 3);
    }

    #[test]
    fn oversized_request_is_an_error() {
        let err = try_filled("positions", usize::MAX / 4, Vec2::ZERO).unwrap_err();
        match err {
            SolverError::Allocation { buffer, bytes } => {
                assert_eq!(buffer, "positions");
                assert_eq!(bytes, usize::MAX);
            }
            other => panic!("expected Allocation, got {other}"),
        }
        assert!(matches!(
            try_atomic("cell_start", usize::MAX / 2, 0),
            Err(SolverError::Allocation { .. })
        ));
    }

    #[test]
    fn atomic_buffer_starts_at_init() {
        let cells = try_atomic("cell_end", 3, 7).unwrap();
        assert!(cells.iter().all(|c| c.load(std::sync::atomic::Ordering::Relaxed) == 7));
    }
}
