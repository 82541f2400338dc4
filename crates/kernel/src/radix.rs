//! Stable parallel LSD radix sort of particle ids by Morton key.
//!
//! One pass per key bit, each built from six dispatches:
//! 1. `flags[i]` = bit `b` of `keys[i]`
//! 2. block-local exclusive scan of the zero flags, one aggregate per block
//! 3. exclusive scan of the block aggregates (single work item)
//! 4. add block offsets, giving every element its rank among the zeros
//! 5. `total_zeros` = `rank[n-1] + (1 - flags[n-1])`
//! 6. scatter: zeros to `rank`, ones to `total_zeros + i - rank`
//!
//! Keys, ids and cells move together into the inactive buffer of a
//! ping-pong pair. The live buffer is selected by a single parity index that
//! flips after every scatter and is back at 0 when a sort returns.

use std::sync::atomic::{AtomicU32, Ordering};

use crate::buffers::{try_atomic, try_filled};
use crate::context::{ComputeKernel, ExecutionContext};
use crate::error::Result;

/// Elements scanned by one work item in the block scan.
pub const RADIX_BLOCK: usize = 256;

/// One side of the ping-pong pair: Morton key, particle id and linear cell per sorted slot.
#[derive(Debug)]
pub struct SortBuffers {
    keys: Box<[AtomicU32]>,
    ids: Box<[AtomicU32]>,
    cells: Box<[AtomicU32]>,
}

impl SortBuffers {
    /// Zeroed buffers for `n` particles.
    pub fn new(n: usize) -> Result<Self> {
        Ok(Self {
            keys: try_atomic("sort_keys", n, 0)?,
            ids: try_atomic("sort_ids", n, 0)?,
            cells: try_atomic("sort_cells", n, 0)?,
        })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True for an empty particle set.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Key in slot `i`.
    #[inline]
    pub fn key(&self, i: usize) -> u32 {
        self.keys[i].load(Ordering::Relaxed)
    }

    /// Particle id in slot `i`.
    #[inline]
    pub fn id(&self, i: usize) -> u32 {
        self.ids[i].load(Ordering::Relaxed)
    }

    /// Linear cell index in slot `i`.
    #[inline]
    pub fn cell(&self, i: usize) -> u32 {
        self.cells[i].load(Ordering::Relaxed)
    }

    /// Write one slot. Distinct work items must target distinct slots.
    #[inline]
    pub fn store(&self, i: usize, key: u32, id: u32, cell: u32) {
        self.keys[i].store(key, Ordering::Relaxed);
        self.ids[i].store(id, Ordering::Relaxed);
        self.cells[i].store(cell, Ordering::Relaxed);
    }

    /// Copy of all keys.
    pub fn keys(&self) -> Vec<u32> {
        self.keys.iter().map(|k| k.load(Ordering::Relaxed)).collect()
    }

    /// Copy of all ids.
    pub fn ids(&self) -> Vec<u32> {
        self.ids.iter().map(|k| k.load(Ordering::Relaxed)).collect()
    }

    /// Copy of all linear cells.
    pub fn cells(&self) -> Vec<u32> {
        self.cells.iter().map(|k| k.load(Ordering::Relaxed)).collect()
    }
}

/// Ping-pong sort buffers plus per-pass scratch.
#[derive(Debug)]
pub struct RadixSorter {
    buffers: [SortBuffers; 2],
    live: usize,
    flags: Vec<u32>,
    ranks: Vec<u32>,
    block_sums: Vec<u32>,
    block_offsets: Vec<u32>,
    total_zeros: u32,
}

impl RadixSorter {
    /// Allocate for `n` particles.
    pub fn new(n: usize) -> Result<Self> {
        let blocks = n.div_ceil(RADIX_BLOCK);
        Ok(Self {
            buffers: [SortBuffers::new(n)?, SortBuffers::new(n)?],
            live: 0,
            flags: try_filled("radix_flags", n, 0)?,
            ranks: try_filled("radix_ranks", n, 0)?,
            block_sums: try_filled("radix_block_sums", blocks, 0)?,
            block_offsets: try_filled("radix_block_offsets", blocks, 0)?,
            total_zeros: 0,
        })
    }

    /// Number of elements sorted.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// True when sized for zero particles.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Parity index of the live buffer (0 or 1).
    pub fn live_index(&self) -> usize {
        self.live
    }

    /// Buffer holding the current keys, ids and cells.
    pub fn live(&self) -> &SortBuffers {
        &self.buffers[self.live]
    }

    /// Zero-flag count of the last pass.
    pub fn total_zeros(&self) -> u32 {
        self.total_zeros
    }

    /// Sort the live buffer on the low `bits` key bits.
    ///
    /// The result always lands in buffer 0. Grid Morton widths are even, so
    /// the ping-pong passes end there on their own; an odd `bits` costs one
    /// extra identity scatter.
    pub fn sort(&mut self, ctx: &ExecutionContext, bits: u32) {
        if self.is_empty() {
            return;
        }
        for bit in 0..bits {
            self.pass(ctx, bit);
        }
        if self.live == 1 {
            self.restore_canonical(ctx);
        }
    }

    /// Copy buffer 1 back into buffer 0 so the sort always ends in buffer 0.
    fn restore_canonical(&mut self, ctx: &ExecutionContext) {
        let [dst, src] = &self.buffers;
        ctx.dispatch_indices(ComputeKernel::RadixScatter, self.len(), |i| {
            dst.store(i, src.key(i), src.id(i), src.cell(i));
        });
        self.live = 0;
    }

    fn pass(&mut self, ctx: &ExecutionContext, bit: u32) {
        let n = self.len();
        let Self {
            buffers,
            live,
            flags,
            ranks,
            block_sums,
            block_offsets,
            total_zeros,
        } = self;
        let [a, b] = &*buffers;
        let (src, dst) = if *live == 0 { (a, b) } else { (b, a) };

        ctx.dispatch(ComputeKernel::RadixFlags, flags, |i, flag| {
            *flag = (src.key(i) >> bit) & 1;
        });

        let flags: &[u32] = flags;
        ctx.dispatch_blocks(
            ComputeKernel::RadixScanBlocks,
            RADIX_BLOCK,
            ranks,
            block_sums,
            |block, chunk, sum| {
                let base = block * RADIX_BLOCK;
                let mut zeros = 0;
                for (k, rank) in chunk.iter_mut().enumerate() {
                    *rank = zeros;
                    zeros += 1 - flags[base + k];
                }
                *sum = zeros;
            },
        );

        let sums: &[u32] = block_sums;
        ctx.dispatch_single(ComputeKernel::RadixScanBlockSums, || {
            let mut running = 0;
            for (offset, &sum) in block_offsets.iter_mut().zip(sums) {
                *offset = running;
                running += sum;
            }
        });

        let offsets: &[u32] = block_offsets;
        ctx.dispatch(ComputeKernel::RadixAddOffsets, ranks, |i, rank| {
            *rank += offsets[i / RADIX_BLOCK];
        });

        let ranks: &[u32] = ranks;
        ctx.dispatch_single(ComputeKernel::RadixTotalZeros, || {
            *total_zeros = ranks[n - 1] + (1 - flags[n - 1]);
        });

        let zeros = *total_zeros;
        ctx.dispatch_indices(ComputeKernel::RadixScatter, n, |i| {
            let rank = ranks[i];
            let dest = if flags[i] == 0 {
                rank
            } else {
                zeros + i as u32 - rank
            };
            dst.store(dest as usize, src.key(i), src.id(i), src.cell(i));
        });

        *live ^= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(sorter: &RadixSorter, keys: &[u32]) {
        for (i, &k) in keys.iter().enumerate() {
            sorter.live().store(i, k, i as u32, k);
        }
    }

    #[test]
    fn sorts_small_keys_stably() {
        let ctx = ExecutionContext::serial().unwrap();
        let keys = [3, 1, 2, 1, 0, 3, 2, 0];
        let mut sorter = RadixSorter::new(keys.len()).unwrap();
        load(&sorter, &keys);
        sorter.sort(&ctx, 2);

        assert_eq!(sorter.live().keys(), vec![0, 0, 1, 1, 2, 2, 3, 3]);
        // Equal keys keep their original relative order.
        assert_eq!(sorter.live().ids(), vec![4, 7, 1, 3, 2, 6, 0, 5]);
    }

    #[test]
    fn odd_bit_count_ends_in_canonical_buffer() {
        let ctx = ExecutionContext::serial().unwrap();
        let mut sorter = RadixSorter::new(4).unwrap();
        load(&sorter, &[1, 0, 1, 0]);
        assert_eq!(sorter.live_index(), 0);
        sorter.sort(&ctx, 1);
        assert_eq!(sorter.live_index(), 0);
        assert_eq!(sorter.total_zeros(), 2);
        assert_eq!(sorter.live().keys(), vec![0, 0, 1, 1]);
        assert_eq!(sorter.live().ids(), vec![1, 3, 0, 2]);
        // One scatter for the pass, one to copy back.
        assert_eq!(ctx.stats().count(ComputeKernel::RadixScatter), 2);
    }

    #[test]
    fn even_bit_count_needs_no_copy_back() {
        let ctx = ExecutionContext::serial().unwrap();
        let mut sorter = RadixSorter::new(4).unwrap();
        load(&sorter, &[3, 2, 1, 0]);
        sorter.sort(&ctx, 2);
        assert_eq!(sorter.live_index(), 0);
        assert_eq!(sorter.live().keys(), vec![0, 1, 2, 3]);
        assert_eq!(ctx.stats().count(ComputeKernel::RadixScatter), 2);
    }

    #[test]
    fn spans_multiple_blocks() {
        let ctx = ExecutionContext::parallel().unwrap();
        let n = RADIX_BLOCK * 3 + 17;
        let keys: Vec<u32> = (0..n as u32).map(|i| (i * 7919) % 1024).collect();
        let mut sorter = RadixSorter::new(n).unwrap();
        load(&sorter, &keys);
        sorter.sort(&ctx, 10);

        let sorted = sorter.live().keys();
        assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
        let ids = sorter.live().ids();
        for (slot, &id) in ids.iter().enumerate() {
            assert_eq!(keys[id as usize], sorted[slot], "id {id} carried the wrong key");
        }
    }

    #[test]
    fn all_ones_pass_keeps_order() {
        let ctx = ExecutionContext::serial().unwrap();
        let mut sorter = RadixSorter::new(5).unwrap();
        load(&sorter, &[1, 1, 1, 1, 1]);
        sorter.sort(&ctx, 1);
        assert_eq!(sorter.total_zeros(), 0);
        assert_eq!(sorter.live().ids(), vec![0, 1, 2, 3, 4]);
    }
}
