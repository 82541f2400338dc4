//! Uniform grid over the 2D domain and Morton (Z-order) keys.
//!
//! The grid spans `[-half_extents, +half_extents]` with its origin at the
//! lower-left corner. Cell size tracks the particle radius so that the
//! smoothing radius never exceeds one cell and the 3x3 neighborhood is enough.

use glam::{UVec2, Vec2};

use crate::context::{ComputeKernel, ExecutionContext};
use crate::error::{Result, SolverError};
use crate::radix::SortBuffers;

/// Cell size used when the particle radius is vanishingly small.
pub const MIN_CELL_SIZE: f32 = 1.0e-5;

/// Cell size as a multiple of the particle radius.
pub const CELL_SIZE_PER_RADIUS: f32 = 4.0;

/// Largest resolution per axis: Morton keys are 32-bit, 16 bits per axis.
pub const MAX_CELLS_PER_AXIS: u32 = 1 << 16;

/// Largest total cell count; bounds the two cell range tables to 128 MiB.
pub const MAX_GRID_CELLS: u64 = 1 << 24;

/// Derived grid parameters, recomputed whenever radius or domain changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridParams {
    /// Edge length of one square cell.
    pub cell_size: f32,
    /// `1 / cell_size`.
    pub inv_cell_size: f32,
    /// World position of the lower-left grid corner.
    pub origin: Vec2,
    /// Cells along x and y.
    pub dims: UVec2,
    /// Radix passes needed to fully order every Morton key of this grid.
    pub morton_bits: u32,
    /// Neighborhood half-width in cells (1 gives the 3x3 stencil).
    pub neighbor_radius: u32,
}

impl GridParams {
    /// Grid for particles of `particle_radius` inside `[-half_extents, half_extents]`.
    pub fn new(particle_radius: f32, half_extents: Vec2, neighbor_radius: u32) -> Result<Self> {
        let cell_size = (CELL_SIZE_PER_RADIUS * particle_radius).max(MIN_CELL_SIZE);
        let extent = 2.0 * half_extents;
        let cells_x = (extent.x / cell_size).ceil().max(1.0);
        let cells_y = (extent.y / cell_size).ceil().max(1.0);
        let limit = MAX_CELLS_PER_AXIS as f32;
        if cells_x > limit || cells_y > limit {
            return Err(SolverError::GridTooLarge {
                grid_x: cells_x.min(u32::MAX as f32) as u32,
                grid_y: cells_y.min(u32::MAX as f32) as u32,
            });
        }
        let dims = UVec2::new(cells_x as u32, cells_y as u32);
        let cells = dims.x as u64 * dims.y as u64;
        if cells > MAX_GRID_CELLS {
            return Err(SolverError::TooManyCells {
                cells,
                limit: MAX_GRID_CELLS,
            });
        }
        Ok(Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            origin: -half_extents,
            dims,
            morton_bits: morton_bit_count(dims),
            neighbor_radius: neighbor_radius.max(1),
        })
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.dims.x as usize * self.dims.y as usize
    }

    /// Kernel support radius; equal to the cell size.
    pub fn smoothing_radius(&self) -> f32 {
        self.cell_size
    }

    /// Cell containing `p`, clamped to the grid.
    #[inline]
    pub fn cell_of(&self, p: Vec2) -> UVec2 {
        let c = ((p - self.origin) * self.inv_cell_size).floor();
        let max = (self.dims - UVec2::ONE).as_vec2();
        // NaN coordinates clamp to cell 0.
        c.clamp(Vec2::ZERO, max).as_uvec2()
    }

    /// Row-major linear cell index.
    #[inline]
    pub fn linear(&self, cell: UVec2) -> u32 {
        cell.y * self.dims.x + cell.x
    }
}

/// Spread the low 16 bits of `v` into the even bit positions.
#[inline]
fn part1by1(v: u32) -> u32 {
    let mut x = v & 0x0000_ffff;
    x = (x | (x << 8)) & 0x00ff_00ff;
    x = (x | (x << 4)) & 0x0f0f_0f0f;
    x = (x | (x << 2)) & 0x3333_3333;
    x = (x | (x << 1)) & 0x5555_5555;
    x
}

#[inline]
fn compact1by1(v: u32) -> u32 {
    let mut x = v & 0x5555_5555;
    x = (x | (x >> 1)) & 0x3333_3333;
    x = (x | (x >> 2)) & 0x0f0f_0f0f;
    x = (x | (x >> 4)) & 0x00ff_00ff;
    x = (x | (x >> 8)) & 0x0000_ffff;
    x
}

/// Morton code of a cell: x in the even bits, y in the odd bits.
#[inline]
pub fn morton_encode(cell: UVec2) -> u32 {
    part1by1(cell.x) | (part1by1(cell.y) << 1)
}

/// Inverse of [`morton_encode`].
pub fn morton_decode(code: u32) -> UVec2 {
    UVec2::new(compact1by1(code), compact1by1(code >> 1))
}

/// Key bits that carry information for a grid of `dims`: `2 * ceil(log2(max))`, at least 2.
pub fn morton_bit_count(dims: UVec2) -> u32 {
    let largest = dims.max_element().max(1);
    let axis_bits = u32::BITS - (largest - 1).leading_zeros();
    (2 * axis_bits).max(2)
}

/// Grid indexer pass: key, identity id and linear cell for every particle.
pub fn index_particles(
    ctx: &ExecutionContext,
    grid: &GridParams,
    positions: &[Vec2],
    out: &SortBuffers,
) {
    debug_assert_eq!(positions.len(), out.len());
    ctx.dispatch_indices(ComputeKernel::MortonCodes, positions.len(), |i| {
        let cell = grid.cell_of(positions[i]);
        out.store(i, morton_encode(cell), i as u32, grid.linear(cell));
    });
}
