//! GPU (Metal/Vulkan/DX12 via wgpu) implementation of the solver.
//!
//! `GpuKernel` implements `SimulationKernel` with WGSL compute shaders that
//! mirror the CPU passes one for one. Entry points carry the names from
//! [`ComputeKernel::label`].
//!
//! # Architecture
//! Each physics step is one compute pass:
//!   1. Morton indexing into sort buffer A
//!   2. Radix sort, six dispatches per key bit, ping-ponging A and B; an odd
//!      bit count ends with a copy back into A
//!   3. Cell range clear + build
//!   4. Per integrator stage: reorder, density, reorder, force; then the combine
//!   5. Wall resolution
//!
//! Particle data lives on the GPU between frames. The host copy behind
//! [`SimulationKernel::particles`] is refreshed once per frame.
//!
//! # Bind group layout
//! Every shader family uses a single group 0 and stays within the default
//! limit of 8 storage buffers per stage:
//!
//! - sort: params, radix pass (dynamic offset), positions, src, dst, flags,
//!   ranks, block sums, block offsets, total zeros
//! - ranges: params, sorted entries, cell ranges
//! - sph: params, sorted entries, cell ranges, evaluated position and
//!   velocity, fields, sorted copies, acceleration
//! - integrate: params, positions, velocities, stage position, stage
//!   velocity, stage force

pub mod buffers;

use std::collections::HashMap;
use std::num::NonZeroU64;

use glam::Vec2;
use thiserror::Error;

use buffers::{GpuBuffers, GpuSimParams, PassParams, WORKGROUP_SIZE};
use crate::buffers::try_filled;
use crate::config::SolverConfig;
use crate::context::{ComputeKernel, ExecutionContext};
use crate::error::SolverError;
use crate::grid::GridParams;
use crate::integrator::{StageOp, StageState};
use crate::particle::ParticleArrays;
use crate::radix::RADIX_BLOCK;
use crate::seed::seed_positions;
use crate::solver::fluid_params;
use crate::sph::FluidParams;
use crate::{ErrorMetrics, SimulationKernel};

/// Failures surfaced while creating or reading back a [`GpuKernel`].
#[derive(Debug, Error)]
pub enum GpuError {
    /// No adapter, no device, or a shader or pipeline was rejected.
    #[error("GPU initialization failed: {0}")]
    Init(String),

    /// A buffer exceeds the device's storage binding or buffer size limit.
    #[error("GPU buffer `{buffer}` needs {bytes} bytes, more than the device limit of {limit}")]
    BufferTooLarge {
        /// Buffer that failed.
        buffer: &'static str,
        /// Requested size.
        bytes: u64,
        /// Largest size the device accepts.
        limit: u64,
    },

    /// Mapping a staging buffer failed.
    #[error("GPU readback failed: {0}")]
    Readback(String),

    /// The configuration or initial state was rejected.
    #[error(transparent)]
    Solver(#[from] SolverError),
}

const SORT_KERNELS: [ComputeKernel; 7] = [
    ComputeKernel::MortonCodes,
    ComputeKernel::RadixFlags,
    ComputeKernel::RadixScanBlocks,
    ComputeKernel::RadixScanBlockSums,
    ComputeKernel::RadixAddOffsets,
    ComputeKernel::RadixTotalZeros,
    ComputeKernel::RadixScatter,
];

const RANGE_KERNELS: [ComputeKernel; 2] =
    [ComputeKernel::ClearCellRanges, ComputeKernel::BuildCellRanges];

/// Dispatch order of one density and force evaluation.
const EVAL_KERNELS: [ComputeKernel; 4] = [
    ComputeKernel::ReorderState,
    ComputeKernel::Density,
    ComputeKernel::ReorderDensityPressure,
    ComputeKernel::Force,
];

const INTEGRATE_KERNELS: [ComputeKernel; 11] = [
    ComputeKernel::VerletDrift,
    ComputeKernel::VerletFinal,
    ComputeKernel::Rk2Midpoint,
    ComputeKernel::Rk2Final,
    ComputeKernel::PcPredict,
    ComputeKernel::PcCorrect,
    ComputeKernel::Rk4Step1,
    ComputeKernel::Rk4Step2,
    ComputeKernel::Rk4Step3,
    ComputeKernel::Rk4Final,
    ComputeKernel::Collision,
];

/// One operation of the scheme pipeline with its bindings resolved.
enum GpuStage {
    /// Evaluation bound to its state and force slot.
    Evaluate(wgpu::BindGroup),
    /// Combine kernel, run on the integrate bind group.
    Combine(ComputeKernel),
}

/// GPU-accelerated SPH solver using wgpu compute shaders.
///
/// Parameters are fixed at construction; build a new kernel to change them.
pub struct GpuKernel {
    // wgpu resources
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    max_workgroups: u32,

    // Compute pipelines, one per dispatched kernel
    pipelines: HashMap<ComputeKernel, wgpu::ComputePipeline>,
    copy_back: wgpu::ComputePipeline,

    // GPU buffers and bind groups
    bufs: GpuBuffers,
    /// `[A -> B, B -> A]`
    sort_groups: [wgpu::BindGroup; 2],
    ranges_group: wgpu::BindGroup,
    integrate_group: wgpu::BindGroup,
    stages: Vec<GpuStage>,

    // Simulation parameters
    config: SolverConfig,
    grid: GridParams,
    params: FluidParams,
    initial: Vec<Vec2>,

    // Host copy, refreshed after every frame
    particles: ParticleArrays,

    paused: bool,
    frame: u64,
    sim_time: f64,
}

impl std::fmt::Debug for GpuKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuKernel")
            .field("adapter", &self.adapter_name)
            .field("particles", &self.config.particle_count)
            .field("grid", &self.grid.dims)
            .field("scheme", &self.config.scheme)
            .field("frame", &self.frame)
            .finish()
    }
}

fn request_adapter(instance: &wgpu::Instance) -> Option<wgpu::Adapter> {
    pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
}

/// Check whether a GPU adapter is available.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    request_adapter(&instance).is_some()
}

impl GpuKernel {
    /// Create a GPU kernel with lattice-seeded particles at rest.
    ///
    /// Seeding runs on the host with the same lattice as the CPU solver, so
    /// both start from identical positions.
    pub fn new(config: SolverConfig) -> Result<Self, GpuError> {
        config.validate()?;
        let grid = GridParams::new(
            config.particle_radius,
            config.half_extents(),
            config.neighbor_radius_cells,
        )?;
        let n = config.particle_count;
        let mut positions = try_filled("positions", n, Vec2::ZERO)?;
        let ctx = ExecutionContext::serial()?;
        seed_positions(
            &ctx,
            &mut positions,
            config.particle_radius,
            config.half_extents(),
            &config.seed,
        );
        let velocities = try_filled("velocities", n, Vec2::ZERO)?;
        Self::build(config, grid, positions, velocities)
    }

    /// Create a GPU kernel from explicit positions and velocities.
    ///
    /// Both arrays must hold exactly `config.particle_count` entries. Reset
    /// returns to these positions, at rest.
    pub fn with_initial_state(
        config: SolverConfig,
        positions: Vec<Vec2>,
        velocities: Vec<Vec2>,
    ) -> Result<Self, GpuError> {
        config.validate()?;
        for len in [positions.len(), velocities.len()] {
            if len != config.particle_count {
                return Err(SolverError::ParticleCountMismatch {
                    expected: config.particle_count,
                    actual: len,
                }
                .into());
            }
        }
        let grid = GridParams::new(
            config.particle_radius,
            config.half_extents(),
            config.neighbor_radius_cells,
        )?;
        Self::build(config, grid, positions, velocities)
    }

    fn build(
        config: SolverConfig,
        grid: GridParams,
        positions: Vec<Vec2>,
        velocities: Vec<Vec2>,
    ) -> Result<Self, GpuError> {
        // --- Device initialization ---
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = request_adapter(&instance)
            .ok_or_else(|| GpuError::Init("No suitable GPU adapter found".into()))?;
        let adapter_name = adapter.get_info().name;
        tracing::info!("GPU adapter: {:?}", adapter_name);

        // Large grids need cell tables beyond the 128 MiB default binding
        // size, so ask for what the adapter actually supports.
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_buffer_size: adapter_limits.max_buffer_size,
            ..wgpu::Limits::default()
        };
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("sph2d_gpu_device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| GpuError::Init(format!("Failed to create device: {e}")))?;

        // --- Buffers ---
        let params = fluid_params(&config, &grid);
        let n = config.particle_count;
        let stride = u32::try_from(GpuBuffers::stage_stride(n))
            .map_err(|_| GpuError::Init(format!("{n} particles exceed the GPU index range")))?;
        let sim_params = GpuSimParams::new(&config, &grid, &params, n as u32, stride);

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let bufs = GpuBuffers::new(&device, config.scheme, &sim_params, &positions, &velocities)?;

        // --- Shaders ---
        let shader = |label: &'static str, source: &'static str| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        };
        let sort_shader = shader("sort", include_str!("shaders/sort.wgsl"));
        let ranges_shader = shader("ranges", include_str!("shaders/ranges.wgsl"));
        let sph_shader = shader("sph", include_str!("shaders/sph.wgsl"));
        let integrate_shader = shader("integrate", include_str!("shaders/integrate.wgsl"));

        // --- Bind group layouts ---
        let sort_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sort_bgl"),
            entries: &[
                bgl_uniform(0),         // params
                bgl_uniform_dynamic(1), // radix pass
                bgl_storage_ro(2),      // positions
                bgl_storage_ro(3),      // src entries
                bgl_storage_rw(4),      // dst entries
                bgl_storage_rw(5),      // flags
                bgl_storage_rw(6),      // ranks
                bgl_storage_rw(7),      // block_sums
                bgl_storage_rw(8),      // block_offsets
                bgl_storage_rw(9),      // total_zeros
            ],
        });
        let ranges_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ranges_bgl"),
            entries: &[
                bgl_uniform(0),    // params
                bgl_storage_ro(1), // sorted entries
                bgl_storage_rw(2), // cell_ranges
            ],
        });
        let sph_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sph_bgl"),
            entries: &[
                bgl_uniform(0),    // params
                bgl_storage_ro(1), // sorted entries
                bgl_storage_ro(2), // cell_ranges
                bgl_storage_ro(3), // eval_pos
                bgl_storage_ro(4), // eval_vel
                bgl_storage_rw(5), // fields
                bgl_storage_rw(6), // sorted copies
                bgl_storage_rw(7), // accel
            ],
        });
        let integrate_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("integrate_bgl"),
            entries: &[
                bgl_uniform(0),    // params
                bgl_storage_rw(1), // positions
                bgl_storage_rw(2), // velocities
                bgl_storage_rw(3), // stage_position
                bgl_storage_rw(4), // stage_velocity
                bgl_storage_ro(5), // stage_force
            ],
        });

        // --- Pipelines ---
        let layout = |label: &'static str, bgl: &wgpu::BindGroupLayout| {
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(label),
                bind_group_layouts: &[bgl],
                push_constant_ranges: &[],
            })
        };
        let sort_layout = layout("sort_layout", &sort_bgl);
        let ranges_layout = layout("ranges_layout", &ranges_bgl);
        let sph_layout = layout("sph_layout", &sph_bgl);
        let integrate_layout = layout("integrate_layout", &integrate_bgl);

        let mut pipelines = HashMap::new();
        for (kernels, layout, module) in [
            (&SORT_KERNELS[..], &sort_layout, &sort_shader),
            (&RANGE_KERNELS[..], &ranges_layout, &ranges_shader),
            (&EVAL_KERNELS[..], &sph_layout, &sph_shader),
            (&INTEGRATE_KERNELS[..], &integrate_layout, &integrate_shader),
        ] {
            for &kernel in kernels {
                let pipeline = compute_pipeline(&device, layout, module, kernel.label());
                pipelines.insert(kernel, pipeline);
            }
        }
        let copy_back = compute_pipeline(&device, &sort_layout, &sort_shader, "radix_copy_back");

        // --- Bind groups ---
        let pass_binding = wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &bufs.pass_params,
            offset: 0,
            size: NonZeroU64::new(std::mem::size_of::<PassParams>() as u64),
        });
        let sort_group = |label: &'static str, src: &wgpu::Buffer, dst: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &sort_bgl,
                entries: &[
                    bind(0, &bufs.params),
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: pass_binding.clone(),
                    },
                    bind(2, &bufs.positions),
                    bind(3, src),
                    bind(4, dst),
                    bind(5, &bufs.flags),
                    bind(6, &bufs.ranks),
                    bind(7, &bufs.block_sums),
                    bind(8, &bufs.block_offsets),
                    bind(9, &bufs.total_zeros),
                ],
            })
        };
        let [entries_a, entries_b] = &bufs.entries;
        let sort_groups = [
            sort_group("sort_ab", entries_a, entries_b),
            sort_group("sort_ba", entries_b, entries_a),
        ];

        let ranges_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ranges_group"),
            layout: &ranges_bgl,
            entries: &[
                bind(0, &bufs.params),
                bind(1, entries_a),
                bind(2, &bufs.cell_ranges),
            ],
        });

        let integrate_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("integrate_group"),
            layout: &integrate_bgl,
            entries: &[
                bind(0, &bufs.params),
                bind(1, &bufs.positions),
                bind(2, &bufs.velocities),
                bind(3, &bufs.stage_position),
                bind(4, &bufs.stage_velocity),
                bind(5, &bufs.stage_force),
            ],
        });

        let stages = config
            .scheme
            .pipeline()
            .iter()
            .map(|op| match *op {
                StageOp::Evaluate { state, force } => {
                    let (pos, vel) = match state {
                        StageState::Base => (
                            bufs.positions.as_entire_binding(),
                            bufs.velocities.as_entire_binding(),
                        ),
                        StageState::Predicted(k) => (
                            bufs.stage_position.as_entire_binding(),
                            bufs.stage_slot(&bufs.stage_velocity, k),
                        ),
                    };
                    GpuStage::Evaluate(device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("sph_group"),
                        layout: &sph_bgl,
                        entries: &[
                            bind(0, &bufs.params),
                            bind(1, entries_a),
                            bind(2, &bufs.cell_ranges),
                            wgpu::BindGroupEntry {
                                binding: 3,
                                resource: pos,
                            },
                            wgpu::BindGroupEntry {
                                binding: 4,
                                resource: vel,
                            },
                            bind(5, &bufs.fields),
                            bind(6, &bufs.sorted),
                            wgpu::BindGroupEntry {
                                binding: 7,
                                resource: bufs.stage_slot(&bufs.stage_force, force),
                            },
                        ],
                    }))
                }
                StageOp::Combine(kind) => GpuStage::Combine(kind.kernel()),
            })
            .collect();

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(GpuError::Init(format!("pipeline setup rejected: {err}")));
        }

        let particles = ParticleArrays {
            positions: positions.clone(),
            velocities,
            density: try_filled("density", n, 0.0)?,
            pressure: try_filled("pressure", n, 0.0)?,
        };

        tracing::info!(
            particles = n,
            grid_x = grid.dims.x,
            grid_y = grid.dims.y,
            morton_bits = grid.morton_bits,
            scheme = %config.scheme,
            "GPU kernel created"
        );

        Ok(Self {
            max_workgroups: device.limits().max_compute_workgroups_per_dimension,
            device,
            queue,
            adapter_name,
            pipelines,
            copy_back,
            bufs,
            sort_groups,
            ranges_group,
            integrate_group,
            stages,
            config,
            grid,
            params,
            initial: positions,
            particles,
            paused: false,
            frame: 0,
            sim_time: 0.0,
        })
    }

    // ---- Encoding ----

    fn dispatch(
        &self,
        pass: &mut wgpu::ComputePass<'_>,
        pipeline: &wgpu::ComputePipeline,
        group: &wgpu::BindGroup,
        offsets: &[u32],
        items: u32,
    ) {
        let (x, y) = dispatch_size(items, WORKGROUP_SIZE, self.max_workgroups);
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, group, offsets);
        pass.dispatch_workgroups(x, y, 1);
    }

    /// Encode the sort: Morton keys into buffer A, then one radix pass per
    /// key bit. The sorted entries always end in buffer A.
    fn encode_sort(&self, pass: &mut wgpu::ComputePass<'_>) {
        let n = self.bufs.n;
        let blocks = n.div_ceil(RADIX_BLOCK as u32);
        let [ab, ba] = &self.sort_groups;

        self.dispatch(pass, &self.pipelines[&ComputeKernel::MortonCodes], ba, &[0], n);
        let mut live = 0;
        for bit in 0..self.grid.morton_bits {
            let offset = [(bit as u64 * self.bufs.pass_stride) as u32];
            let group = if live == 0 { ab } else { ba };
            for &kernel in &SORT_KERNELS[1..] {
                let items = match kernel {
                    ComputeKernel::RadixScanBlocks => blocks,
                    k if k.is_single() => 1,
                    _ => n,
                };
                self.dispatch(pass, &self.pipelines[&kernel], group, &offset, items);
            }
            live ^= 1;
        }
        if live == 1 {
            self.dispatch(pass, &self.copy_back, ba, &[0], n);
        }
    }

    /// Encode one physics step.
    fn encode_step(&self, encoder: &mut wgpu::CommandEncoder) {
        let n = self.bufs.n;
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("sph_step"),
            timestamp_writes: None,
        });

        self.encode_sort(&mut pass);

        for kernel in RANGE_KERNELS {
            let items = match kernel {
                ComputeKernel::ClearCellRanges => self.bufs.cells,
                _ => n,
            };
            self.dispatch(&mut pass, &self.pipelines[&kernel], &self.ranges_group, &[], items);
        }

        for stage in &self.stages {
            match stage {
                GpuStage::Evaluate(group) => {
                    for kernel in EVAL_KERNELS {
                        self.dispatch(&mut pass, &self.pipelines[&kernel], group, &[], n);
                    }
                }
                GpuStage::Combine(kernel) => {
                    self.dispatch(
                        &mut pass,
                        &self.pipelines[kernel],
                        &self.integrate_group,
                        &[],
                        n,
                    );
                }
            }
        }

        self.dispatch(
            &mut pass,
            &self.pipelines[&ComputeKernel::Collision],
            &self.integrate_group,
            &[],
            n,
        );
    }

    // ---- Stepping ----

    /// Advance one frame of `max(1, substeps)` physics steps, then refresh
    /// the host copy.
    ///
    /// Returns `false` without touching any state when paused.
    pub fn advance_frame(&mut self) -> bool {
        if self.paused {
            return false;
        }
        let steps = self.config.effective_substeps();
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("sph_frame"),
        });
        for _ in 0..steps {
            self.encode_step(&mut encoder);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        self.sim_time += self.config.dt as f64 * steps as f64;
        self.frame += 1;

        match self.bufs.read_back(&self.device, &self.queue) {
            Ok(particles) => self.particles = particles,
            Err(err) => tracing::error!(%err, frame = self.frame, "particle readback failed"),
        }
        tracing::debug!(frame = self.frame, sim_time = self.sim_time, steps, "GPU frame complete");
        true
    }

    /// Reseed positions and zero velocities, stage buffers, density and
    /// pressure. Buffers are reused as-is.
    pub fn reset(&mut self) {
        self.bufs.upload_positions(&self.queue, &self.initial);
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("reset"),
        });
        self.bufs.clear_dynamics(&mut encoder);
        self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(wgpu::Maintain::Wait);

        self.particles.positions.copy_from_slice(&self.initial);
        self.particles.clear_dynamics();
        self.frame = 0;
        self.sim_time = 0.0;
        tracing::info!(particles = self.config.particle_count, "GPU kernel reset");
    }

    /// Skip frames until resumed.
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume stepping.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Whether frames are skipped.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    // ---- Accessors ----

    /// Name of the adapter the device was created on.
    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Configuration the kernel was built from.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Grid parameters.
    pub fn grid(&self) -> &GridParams {
        &self.grid
    }

    /// Fluid constants.
    pub fn fluid_params(&self) -> &FluidParams {
        &self.params
    }

    /// Frames completed since construction or reset.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Simulated time (seconds).
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }
}

impl SimulationKernel for GpuKernel {
    fn advance_frame(&mut self) -> bool {
        GpuKernel::advance_frame(self)
    }

    fn particles(&self) -> &ParticleArrays {
        &self.particles
    }

    fn error_metrics(&self) -> ErrorMetrics {
        ErrorMetrics::from_particles(&self.particles, self.params.rest_density, self.params.mass)
    }

    fn particle_count(&self) -> usize {
        self.config.particle_count
    }

    fn reset(&mut self) {
        GpuKernel::reset(self)
    }
}

/// Workgroups for `total` items: `(x, y)` with `x` capped at the per-dimension
/// limit. Shaders flatten the index as `gid.x + gid.y * x * WG`.
fn dispatch_size(total: u32, workgroup_size: u32, max_per_dimension: u32) -> (u32, u32) {
    let groups = total.div_ceil(workgroup_size).max(1);
    let x = groups.min(max_per_dimension.max(1));
    (x, groups.div_ceil(x))
}

fn compute_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    entry_point: &str,
) -> wgpu::ComputePipeline {
    device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(entry_point),
        layout: Some(layout),
        module,
        entry_point: Some(entry_point),
        compilation_options: Default::default(),
        cache: None,
    })
}

fn bind(binding: u32, buffer: &wgpu::Buffer) -> wgpu::BindGroupEntry<'_> {
    wgpu::BindGroupEntry {
        binding,
        resource: buffer.as_entire_binding(),
    }
}

// ---- Bind group layout entry helpers ----

fn bgl_uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_uniform_dynamic(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: true,
            min_binding_size: NonZeroU64::new(std::mem::size_of::<PassParams>() as u64),
        },
        count: None,
    }
}

fn bgl_storage_ro(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_storage_rw(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
