//! Per-cell ranges over the sorted particle order, and neighborhood traversal.
//!
//! After the radix sort, particles sharing a cell occupy one contiguous run
//! of sorted slots. `start[c]..end[c]` is that run; cells with no particles
//! hold the sentinel in both tables and read back as an empty range.

use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{IVec2, UVec2};

use crate::buffers::try_atomic;
use crate::context::{ComputeKernel, ExecutionContext};
use crate::error::Result;
use crate::grid::GridParams;
use crate::radix::SortBuffers;

/// Marks a cell with no particles.
pub const EMPTY_CELL: u32 = u32::MAX;

/// `[start, end)` of sorted slots for every grid cell.
#[derive(Debug)]
pub struct CellRanges {
    start: Box<[AtomicU32]>,
    end: Box<[AtomicU32]>,
}

impl CellRanges {
    /// Tables for `cell_count` cells, all empty.
    pub fn new(cell_count: usize) -> Result<Self> {
        Ok(Self {
            start: try_atomic("cell_start", cell_count, EMPTY_CELL)?,
            end: try_atomic("cell_end", cell_count, EMPTY_CELL)?,
        })
    }

    /// Number of cells covered.
    pub fn cell_count(&self) -> usize {
        self.start.len()
    }

    /// Rebuild from sorted cells: clear to the sentinel, then mark run boundaries.
    pub fn build(&mut self, ctx: &ExecutionContext, sorted: &SortBuffers) {
        let start = &self.start;
        let end = &self.end;
        ctx.dispatch_indices(ComputeKernel::ClearCellRanges, start.len(), |c| {
            start[c].store(EMPTY_CELL, Ordering::Relaxed);
            end[c].store(EMPTY_CELL, Ordering::Relaxed);
        });

        let n = sorted.len();
        ctx.dispatch_indices(ComputeKernel::BuildCellRanges, n, |i| {
            let cell = sorted.cell(i);
            if i == 0 || sorted.cell(i - 1) != cell {
                start[cell as usize].store(i as u32, Ordering::Relaxed);
            }
            if i + 1 == n || sorted.cell(i + 1) != cell {
                end[cell as usize].store(i as u32 + 1, Ordering::Relaxed);
            }
        });
    }

    /// Sorted slots belonging to `cell`; empty for unoccupied cells.
    #[inline]
    pub fn range(&self, cell: usize) -> Range<usize> {
        let start = self.start[cell].load(Ordering::Relaxed);
        let end = self.end[cell].load(Ordering::Relaxed);
        if start == EMPTY_CELL || end == EMPTY_CELL {
            0..0
        } else {
            start as usize..end as usize
        }
    }

    /// Visit every sorted slot in the `(2r+1) x (2r+1)` block of cells around `cell`.
    ///
    /// Candidates are not distance-filtered; callers test against the
    /// smoothing radius themselves.
    #[inline]
    pub fn for_each_candidate<F>(&self, grid: &GridParams, cell: UVec2, mut f: F)
    where
        F: FnMut(usize),
    {
        let r = grid.neighbor_radius as i32;
        let dims = grid.dims.as_ivec2();
        let center = cell.as_ivec2();
        for dy in -r..=r {
            let y = center.y + dy;
            if y < 0 || y >= dims.y {
                continue;
            }
            for dx in -r..=r {
                let x = center.x + dx;
                if x < 0 || x >= dims.x {
                    continue;
                }
                let linear = grid.linear(IVec2::new(x, y).as_uvec2()) as usize;
                for slot in self.range(linear) {
                    f(slot);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::index_particles;
    use crate::radix::RadixSorter;
    use glam::Vec2;

    fn build(positions: &[Vec2], grid: &GridParams) -> (RadixSorter, CellRanges) {
        let ctx = ExecutionContext::serial().unwrap();
        let mut sorter = RadixSorter::new(positions.len()).unwrap();
        index_particles(&ctx, grid, positions, sorter.live());
        sorter.sort(&ctx, grid.morton_bits);
        let mut ranges = CellRanges::new(grid.cell_count()).unwrap();
        ranges.build(&ctx, sorter.live());
        (sorter, ranges)
    }

    #[test]
    fn empty_cells_read_as_empty() {
        let ranges = CellRanges::new(16).unwrap();
        assert!((0..16).all(|c| ranges.range(c).is_empty()));
    }

    #[test]
    fn shared_cell_forms_one_run() {
        let grid = GridParams::new(0.025, Vec2::splat(1.0), 1).unwrap();
        let positions = [
            Vec2::new(0.51, 0.51),
            Vec2::new(-0.9, -0.9),
            Vec2::new(0.52, 0.53),
            Vec2::new(0.55, 0.58),
        ];
        let (sorter, ranges) = build(&positions, &grid);
        let cell = grid.linear(grid.cell_of(positions[0])) as usize;
        let run = ranges.range(cell);
        assert_eq!(run.len(), 3);
        let mut ids: Vec<u32> = run.map(|s| sorter.live().id(s)).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 2, 3]);
    }

    #[test]
    fn candidates_cover_adjacent_cells_only() {
        let grid = GridParams::new(0.025, Vec2::splat(1.0), 1).unwrap();
        let positions = [
            Vec2::new(0.05, 0.05),
            Vec2::new(0.14, 0.05),  // next cell over
            Vec2::new(0.25, 0.05),  // two cells over
            Vec2::new(-0.04, -0.04), // diagonal neighbor
        ];
        let (sorter, ranges) = build(&positions, &grid);
        let mut seen = Vec::new();
        ranges.for_each_candidate(&grid, grid.cell_of(positions[0]), |slot| {
            seen.push(sorter.live().id(slot));
        });
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 3]);
    }

    #[test]
    fn wider_neighborhood_reaches_further() {
        let grid = GridParams::new(0.025, Vec2::splat(1.0), 2).unwrap();
        let positions = [Vec2::new(0.05, 0.05), Vec2::new(0.25, 0.05)];
        let (_, ranges) = build(&positions, &grid);
        let mut count = 0;
        ranges.for_each_candidate(&grid, grid.cell_of(positions[0]), |_| count += 1);
        assert_eq!(count, 2);
    }
}
