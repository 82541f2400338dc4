//! Execution context: the compiled kernels plus the handle work is submitted to.
//!
//! Every pass of the solver is a *dispatch*: one independent work item per
//! particle, per cell or per block, followed by a barrier before the next
//! dispatch starts. The context owns
//! - the executor (a dedicated rayon pool, or the calling thread),
//! - the [`PipelineCache`] with one compiled [`Pipeline`] per [`ComputeKernel`],
//! - dispatch counters, so callers can observe how often each kernel ran.
//!
//! Work items may only write their own output slot. Passes that scatter to
//! computed destinations go through [`ExecutionContext::dispatch_indices`] and
//! write through atomics.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

/// Largest workgroup size a pipeline accepts.
pub const MAX_WORKGROUP_SIZE: u32 = 1024;

/// Every compute kernel the solver dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComputeKernel {
    /// Cell coordinates, Morton key and identity id per particle.
    MortonCodes,
    /// Extract the current radix bit of every key.
    RadixFlags,
    /// Block-local exclusive scan of zero flags.
    RadixScanBlocks,
    /// Exclusive scan of the per-block zero counts.
    RadixScanBlockSums,
    /// Add block offsets to block-local ranks.
    RadixAddOffsets,
    /// Count of zero-flagged keys in the pass.
    RadixTotalZeros,
    /// Stable scatter of keys, ids and cells into the other ping-pong buffer.
    RadixScatter,
    /// Reset the cell tables to the empty sentinel.
    ClearCellRanges,
    /// Record the start and end of every run of equal cells.
    BuildCellRanges,
    /// Gather stage positions and velocities into sorted order.
    ReorderState,
    /// Density summation and equation of state.
    Density,
    /// Gather density and pressure into sorted order.
    ReorderDensityPressure,
    /// Pressure, viscosity and gravity accelerations.
    Force,
    /// Midpoint state for the second-order Runge-Kutta scheme.
    Rk2Midpoint,
    /// Final combine of the second-order Runge-Kutta scheme.
    Rk2Final,
    /// Half kick and drift of velocity Verlet.
    VerletDrift,
    /// Closing half kick of velocity Verlet.
    VerletFinal,
    /// Forward Euler prediction.
    PcPredict,
    /// Trapezoidal correction.
    PcCorrect,
    /// First RK4 intermediate state.
    Rk4Step1,
    /// Second RK4 intermediate state.
    Rk4Step2,
    /// Third RK4 intermediate state.
    Rk4Step3,
    /// Weighted RK4 combine.
    Rk4Final,
    /// Domain clamp and wall reflection.
    Collision,
    /// Lattice placement of seeded particles.
    InitPositions,
}

impl ComputeKernel {
    /// Number of kernels.
    pub const COUNT: usize = 25;

    /// All kernels in declaration order.
    pub const ALL: [ComputeKernel; Self::COUNT] = [
        Self::MortonCodes,
        Self::RadixFlags,
        Self::RadixScanBlocks,
        Self::RadixScanBlockSums,
        Self::RadixAddOffsets,
        Self::RadixTotalZeros,
        Self::RadixScatter,
        Self::ClearCellRanges,
        Self::BuildCellRanges,
        Self::ReorderState,
        Self::Density,
        Self::ReorderDensityPressure,
        Self::Force,
        Self::Rk2Midpoint,
        Self::Rk2Final,
        Self::VerletDrift,
        Self::VerletFinal,
        Self::PcPredict,
        Self::PcCorrect,
        Self::Rk4Step1,
        Self::Rk4Step2,
        Self::Rk4Step3,
        Self::Rk4Final,
        Self::Collision,
        Self::InitPositions,
    ];

    /// Entry-point name, used for logging.
    pub fn label(self) -> &'static str {
        match self {
            Self::MortonCodes => "compute_morton_codes",
            Self::RadixFlags => "radix_flags",
            Self::RadixScanBlocks => "radix_scan_blocks",
            Self::RadixScanBlockSums => "radix_scan_block_sums",
            Self::RadixAddOffsets => "radix_add_offsets",
            Self::RadixTotalZeros => "radix_total_zeros",
            Self::RadixScatter => "radix_scatter",
            Self::ClearCellRanges => "clear_cell_ranges",
            Self::BuildCellRanges => "build_cell_ranges",
            Self::ReorderState => "reorder_positions_velocities",
            Self::Density => "compute_density",
            Self::ReorderDensityPressure => "reorder_density_pressure",
            Self::Force => "compute_force",
            Self::Rk2Midpoint => "rk2_midpoint",
            Self::Rk2Final => "rk2_final",
            Self::VerletDrift => "verlet_drift",
            Self::VerletFinal => "verlet_final",
            Self::PcPredict => "pc_predict",
            Self::PcCorrect => "pc_correct",
            Self::Rk4Step1 => "rk4_step1",
            Self::Rk4Step2 => "rk4_step2",
            Self::Rk4Step3 => "rk4_step3",
            Self::Rk4Final => "rk4_final",
            Self::Collision => "collision",
            Self::InitPositions => "init_positions",
        }
    }

    /// Kernels that run as a single work item regardless of problem size.
    pub fn is_single(self) -> bool {
        matches!(self, Self::RadixScanBlockSums | Self::RadixTotalZeros)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Which executor a context drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    /// A dedicated rayon thread pool.
    #[default]
    Parallel,
    /// Every dispatch runs in order on the calling thread.
    Serial,
}

/// Construction options for an [`ExecutionContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Executor flavour.
    #[serde(default)]
    pub executor: ExecutorKind,
    /// Worker threads for the parallel executor; 0 picks one per core.
    #[serde(default)]
    pub threads: usize,
    /// Minimum number of work items a worker claims at once.
    #[serde(default = "default_workgroup_size")]
    pub workgroup_size: u32,
}

fn default_workgroup_size() -> u32 {
    256
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorKind::default(),
            threads: 0,
            workgroup_size: default_workgroup_size(),
        }
    }
}

impl ContextConfig {
    /// Serial executor with the default workgroup size.
    pub fn serial() -> Self {
        Self {
            executor: ExecutorKind::Serial,
            ..Self::default()
        }
    }
}

/// A compiled kernel: label plus launch geometry.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline {
    /// Kernel this pipeline executes.
    pub kernel: ComputeKernel,
    /// Entry-point name.
    pub label: &'static str,
    /// Work items claimed together by one worker.
    pub workgroup_size: usize,
}

/// One pipeline per [`ComputeKernel`], compiled once at context construction.
#[derive(Debug)]
pub struct PipelineCache {
    pipelines: Vec<Pipeline>,
}

impl PipelineCache {
    /// Compile every kernel for the given workgroup size.
    ///
    /// The size must be a power of two no larger than [`MAX_WORKGROUP_SIZE`].
    pub fn compile(workgroup_size: u32) -> Result<Self> {
        let pipelines = ComputeKernel::ALL
            .iter()
            .map(|&kernel| {
                let size = if kernel.is_single() { 1 } else { workgroup_size };
                if size == 0 || !size.is_power_of_two() || size > MAX_WORKGROUP_SIZE {
                    return Err(SolverError::Pipeline {
                        label: kernel.label(),
                        reason: format!(
                            "workgroup size {size} must be a power of two in 1..={MAX_WORKGROUP_SIZE}"
                        ),
                    });
                }
                Ok(Pipeline {
                    kernel,
                    label: kernel.label(),
                    workgroup_size: size as usize,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { pipelines })
    }

    /// Pipeline for `kernel`.
    pub fn get(&self, kernel: ComputeKernel) -> &Pipeline {
        &self.pipelines[kernel.index()]
    }

    /// Number of compiled pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    /// Always false once compiled.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}

/// Per-kernel dispatch counts at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchStats {
    counts: [u64; ComputeKernel::COUNT],
    /// Barriers issued, one per dispatch.
    pub barriers: u64,
}

impl DispatchStats {
    /// Dispatches of `kernel`.
    pub fn count(&self, kernel: ComputeKernel) -> u64 {
        self.counts[kernel.index()]
    }

    /// Dispatches across all kernels.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

enum Executor {
    Parallel(rayon::ThreadPool),
    Serial,
}

/// Owns the executor, compiled pipelines and dispatch counters.
///
/// Shared with the solver through an `Arc`; dispatching only needs `&self`.
pub struct ExecutionContext {
    executor: Executor,
    pipelines: PipelineCache,
    counters: [AtomicU64; ComputeKernel::COUNT],
    barriers: AtomicU64,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("threads", &self.thread_count())
            .field("pipelines", &self.pipelines.len())
            .finish()
    }
}

impl ExecutionContext {
    /// Build a context: create the worker pool and compile every pipeline.
    pub fn new(config: &ContextConfig) -> Result<Self> {
        let pipelines = PipelineCache::compile(config.workgroup_size)?;
        let executor = match config.executor {
            ExecutorKind::Parallel => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(config.threads)
                    .thread_name(|i| format!("sph2d-worker-{i}"))
                    .build()?;
                Executor::Parallel(pool)
            }
            ExecutorKind::Serial => Executor::Serial,
        };
        let ctx = Self {
            executor,
            pipelines,
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
            barriers: AtomicU64::new(0),
        };
        tracing::info!(
            threads = ctx.thread_count(),
            workgroup_size = config.workgroup_size,
            pipelines = ctx.pipelines.len(),
            "execution context ready"
        );
        Ok(ctx)
    }

    /// Parallel context with one worker per core.
    pub fn parallel() -> Result<Self> {
        Self::new(&ContextConfig::default())
    }

    /// Context that runs every dispatch on the calling thread.
    pub fn serial() -> Result<Self> {
        Self::new(&ContextConfig::serial())
    }

    /// Worker threads available to a dispatch.
    pub fn thread_count(&self) -> usize {
        match &self.executor {
            Executor::Parallel(pool) => pool.current_num_threads(),
            Executor::Serial => 1,
        }
    }

    /// Compiled pipelines.
    pub fn pipelines(&self) -> &PipelineCache {
        &self.pipelines
    }

    /// Snapshot of the dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            counts: std::array::from_fn(|i| self.counters[i].load(Ordering::Relaxed)),
            barriers: self.barriers.load(Ordering::Relaxed),
        }
    }

    /// Zero the dispatch counters.
    pub fn reset_stats(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
        self.barriers.store(0, Ordering::Relaxed);
    }

    fn launch(&self, kernel: ComputeKernel, items: usize) -> usize {
        let pipeline = self.pipelines.get(kernel);
        tracing::trace!(kernel = pipeline.label, items, "dispatch");
        self.counters[kernel.index()].fetch_add(1, Ordering::Relaxed);
        pipeline.workgroup_size
    }

    fn barrier(&self) {
        self.barriers.fetch_add(1, Ordering::Relaxed);
    }

    /// One work item per element of `out`; item `i` writes only `out[i]`.
    pub fn dispatch<T, F>(&self, kernel: ComputeKernel, out: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        let wg = self.launch(kernel, out.len());
        match &self.executor {
            Executor::Parallel(pool) => pool.install(|| {
                out.par_iter_mut()
                    .with_min_len(wg)
                    .enumerate()
                    .for_each(|(i, slot)| f(i, slot));
            }),
            Executor::Serial => out.iter_mut().enumerate().for_each(|(i, slot)| f(i, slot)),
        }
        self.barrier();
    }

    /// Like [`dispatch`](Self::dispatch) with two parallel output arrays of equal length.
    pub fn dispatch_pair<A, B, F>(&self, kernel: ComputeKernel, a: &mut [A], b: &mut [B], f: F)
    where
        A: Send,
        B: Send,
        F: Fn(usize, &mut A, &mut B) + Sync + Send,
    {
        debug_assert_eq!(a.len(), b.len());
        let wg = self.launch(kernel, a.len());
        match &self.executor {
            Executor::Parallel(pool) => pool.install(|| {
                a.par_iter_mut()
                    .zip(b.par_iter_mut())
                    .with_min_len(wg)
                    .enumerate()
                    .for_each(|(i, (x, y))| f(i, x, y));
            }),
            Executor::Serial => a
                .iter_mut()
                .zip(b.iter_mut())
                .enumerate()
                .for_each(|(i, (x, y))| f(i, x, y)),
        }
        self.barrier();
    }

    /// One work item per block of `block_size` elements of `data`, each also
    /// owning one slot of `block_out` (for block aggregates).
    pub fn dispatch_blocks<T, U, F>(
        &self,
        kernel: ComputeKernel,
        block_size: usize,
        data: &mut [T],
        block_out: &mut [U],
        f: F,
    ) where
        T: Send,
        U: Send,
        F: Fn(usize, &mut [T], &mut U) + Sync + Send,
    {
        debug_assert_eq!(data.len().div_ceil(block_size), block_out.len());
        self.launch(kernel, block_out.len());
        match &self.executor {
            Executor::Parallel(pool) => pool.install(|| {
                data.par_chunks_mut(block_size)
                    .zip(block_out.par_iter_mut())
                    .enumerate()
                    .for_each(|(b, (chunk, agg))| f(b, chunk, agg));
            }),
            Executor::Serial => data
                .chunks_mut(block_size)
                .zip(block_out.iter_mut())
                .enumerate()
                .for_each(|(b, (chunk, agg))| f(b, chunk, agg)),
        }
        self.barrier();
    }

    /// One work item per index in `0..n`. Items write only through atomics,
    /// and no two items may target the same destination.
    pub fn dispatch_indices<F>(&self, kernel: ComputeKernel, n: usize, f: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        let wg = self.launch(kernel, n);
        match &self.executor {
            Executor::Parallel(pool) => pool.install(|| {
                (0..n).into_par_iter().with_min_len(wg).for_each(&f);
            }),
            Executor::Serial => (0..n).for_each(f),
        }
        self.barrier();
    }

    /// A single work item.
    pub fn dispatch_single<F>(&self, kernel: ComputeKernel, f: F)
    where
        F: FnOnce() + Send,
    {
        self.launch(kernel, 1);
        match &self.executor {
            Executor::Parallel(pool) => pool.install(f),
            Executor::Serial => f(),
        }
        self.barrier();
    }
}
