//! GPU buffer set and uniform layouts.
//!
//! Mirrors the CPU buffer arena: particle state, ping-pong sort entries with
//! their scan scratch, per-cell ranges, sorted copies and the stage buffers
//! of the configured scheme. Handles upload and readback.

use std::num::NonZeroU64;

use glam::Vec2;
use wgpu::util::DeviceExt;

use super::GpuError;
use crate::config::SolverConfig;
use crate::grid::GridParams;
use crate::integrator::IntegrationScheme;
use crate::particle::ParticleArrays;
use crate::radix::RADIX_BLOCK;
use crate::sph::FluidParams;

/// Threads per workgroup. Must match `WG` in every shader.
pub const WORKGROUP_SIZE: u32 = 256;

/// Radix passes addressable through the pass uniform: one per key bit.
pub const MAX_RADIX_PASSES: u32 = 32;

/// Stage slots start on 256-byte boundaries: 32 `vec2<f32>` elements.
const STAGE_ALIGN: usize = 32;

const VEC2_BYTES: u64 = std::mem::size_of::<Vec2>() as u64;

/// Simulation parameters uniform buffer layout.
/// Must match the SimParams struct in all WGSL shaders exactly.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSimParams {
    pub n: u32,
    pub blocks: u32,
    pub cells_x: u32,
    pub cells_y: u32,
    pub origin_x: f32,
    pub origin_y: f32,
    pub inv_cell_size: f32,
    pub h: f32,
    pub mass: f32,
    pub rest_density: f32,
    pub stiffness: f32,
    pub viscosity: f32,
    pub near_pressure: f32,
    pub gravity_x: f32,
    pub gravity_y: f32,
    pub dt: f32,
    pub half_x: f32,
    pub half_y: f32,
    pub restitution: f32,
    pub neighbor_radius: u32,
    pub stage_stride: u32,
    pub cell_count: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

impl GpuSimParams {
    /// Uniform block for `n` particles with stage slots `stage_stride` elements apart.
    pub fn new(
        config: &SolverConfig,
        grid: &GridParams,
        fluid: &FluidParams,
        n: u32,
        stage_stride: u32,
    ) -> Self {
        let gravity = fluid.gravity();
        Self {
            n,
            blocks: n.div_ceil(RADIX_BLOCK as u32),
            cells_x: grid.dims.x,
            cells_y: grid.dims.y,
            origin_x: grid.origin.x,
            origin_y: grid.origin.y,
            inv_cell_size: grid.inv_cell_size,
            h: fluid.h,
            mass: fluid.mass,
            rest_density: fluid.rest_density,
            stiffness: fluid.stiffness,
            viscosity: fluid.viscosity,
            near_pressure: fluid.near_pressure,
            gravity_x: gravity.x,
            gravity_y: gravity.y,
            dt: config.dt,
            half_x: config.half_extents[0],
            half_y: config.half_extents[1],
            restitution: config.restitution,
            neighbor_radius: grid.neighbor_radius,
            stage_stride,
            cell_count: grid.dims.x * grid.dims.y,
            _pad0: 0,
            _pad1: 0,
        }
    }
}

/// Per-pass radix uniform, bound with a dynamic offset.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PassParams {
    pub bit: u32,
    pub _pad: [u32; 3],
}

/// One sort element. Must match `SortEntry` in the shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SortEntry {
    pub key: u32,
    pub id: u32,
    pub cell: u32,
}

/// One sorted-order particle. Must match `SortedParticle` in the shaders.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SortedParticle {
    pub position: Vec2,
    pub velocity: Vec2,
    pub density: f32,
    pub pressure: f32,
}

/// All GPU buffers needed for the simulation.
pub struct GpuBuffers {
    pub n: u32,
    pub cells: u32,
    /// Elements between stage slots.
    pub stage_stride: u64,
    /// Bytes between radix pass slots in `pass_params`.
    pub pass_stride: u64,

    // Uniforms
    pub params: wgpu::Buffer,
    pub pass_params: wgpu::Buffer,

    // Canonical state
    pub positions: wgpu::Buffer,
    pub velocities: wgpu::Buffer,
    /// Density and pressure per particle, as `vec2<f32>`.
    pub fields: wgpu::Buffer,

    // Sort
    pub entries: [wgpu::Buffer; 2],
    pub flags: wgpu::Buffer,
    pub ranks: wgpu::Buffer,
    pub block_sums: wgpu::Buffer,
    pub block_offsets: wgpu::Buffer,
    pub total_zeros: wgpu::Buffer,

    // Neighbor structure and sorted copies
    pub cell_ranges: wgpu::Buffer,
    pub sorted: wgpu::Buffer,

    // Stage buffers of the configured scheme
    pub stage_position: wgpu::Buffer,
    pub stage_velocity: wgpu::Buffer,
    pub stage_force: wgpu::Buffer,

    // Readback staging
    staging_positions: wgpu::Buffer,
    staging_velocities: wgpu::Buffer,
    staging_fields: wgpu::Buffer,
}

/// Byte size of `count` elements of `T`, or an error naming `buffer`.
fn byte_len<T>(buffer: &'static str, count: u64) -> Result<u64, GpuError> {
    count
        .checked_mul(std::mem::size_of::<T>() as u64)
        .ok_or(GpuError::BufferTooLarge {
            buffer,
            bytes: u64::MAX,
            limit: u64::MAX,
        })
}

struct Allocator<'a> {
    device: &'a wgpu::Device,
    limit: u64,
}

impl Allocator<'_> {
    fn check(&self, label: &'static str, size: u64) -> Result<(), GpuError> {
        if size > self.limit {
            return Err(GpuError::BufferTooLarge {
                buffer: label,
                bytes: size,
                limit: self.limit,
            });
        }
        Ok(())
    }

    fn storage(&self, label: &'static str, size: u64) -> Result<wgpu::Buffer, GpuError> {
        self.check(label, size)?;
        Ok(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.max(4),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        }))
    }

    fn storage_init(&self, label: &'static str, data: &[u8]) -> Result<wgpu::Buffer, GpuError> {
        self.check(label, data.len() as u64)?;
        Ok(self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: data,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
        }))
    }

    fn staging(&self, label: &'static str, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.max(4),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }
}

impl GpuBuffers {
    /// Allocate and upload every buffer.
    ///
    /// Sizes are checked against the device limits first, so an oversized
    /// configuration is an error instead of a validation panic.
    pub fn new(
        device: &wgpu::Device,
        scheme: IntegrationScheme,
        params: &GpuSimParams,
        positions: &[Vec2],
        velocities: &[Vec2],
    ) -> Result<Self, GpuError> {
        let limits = device.limits();
        let alloc = Allocator {
            device,
            limit: (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size),
        };
        let n = params.n as u64;
        let blocks = params.blocks as u64;
        let cells = params.cell_count as u64;
        let stride = params.stage_stride as u64;

        let pass_stride = (limits.min_uniform_buffer_offset_alignment as u64)
            .max(std::mem::size_of::<PassParams>() as u64);
        let mut pass_bytes = vec![0u8; (pass_stride * MAX_RADIX_PASSES as u64) as usize];
        for bit in 0..MAX_RADIX_PASSES {
            let offset = (bit as u64 * pass_stride) as usize;
            let slot = PassParams { bit, _pad: [0; 3] };
            pass_bytes[offset..offset + std::mem::size_of::<PassParams>()]
                .copy_from_slice(bytemuck::bytes_of(&slot));
        }

        let vec2_len = byte_len::<Vec2>("positions", n)?;
        let stage_len = |label: &'static str, slots: usize| byte_len::<Vec2>(label, stride * slots as u64);

        let bufs = Self {
            n: params.n,
            cells: params.cell_count,
            stage_stride: stride,
            pass_stride,
            params: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("sim_params"),
                contents: bytemuck::bytes_of(params),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            }),
            pass_params: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("radix_pass_params"),
                contents: &pass_bytes,
                usage: wgpu::BufferUsages::UNIFORM,
            }),
            positions: alloc.storage_init("positions", bytemuck::cast_slice(positions))?,
            velocities: alloc.storage_init("velocities", bytemuck::cast_slice(velocities))?,
            fields: alloc.storage("fields", vec2_len)?,
            entries: [
                alloc.storage("sort_entries_a", byte_len::<SortEntry>("sort_entries_a", n)?)?,
                alloc.storage("sort_entries_b", byte_len::<SortEntry>("sort_entries_b", n)?)?,
            ],
            flags: alloc.storage("radix_flags", byte_len::<u32>("radix_flags", n)?)?,
            ranks: alloc.storage("radix_ranks", byte_len::<u32>("radix_ranks", n)?)?,
            block_sums: alloc.storage("radix_block_sums", byte_len::<u32>("radix_block_sums", blocks)?)?,
            block_offsets: alloc.storage(
                "radix_block_offsets",
                byte_len::<u32>("radix_block_offsets", blocks)?,
            )?,
            total_zeros: alloc.storage("radix_total_zeros", 4)?,
            cell_ranges: alloc.storage("cell_ranges", byte_len::<[u32; 2]>("cell_ranges", cells)?)?,
            sorted: alloc.storage("sorted", byte_len::<SortedParticle>("sorted", n)?)?,
            stage_position: alloc.storage("stage_position", vec2_len)?,
            stage_velocity: alloc.storage(
                "stage_velocity",
                stage_len("stage_velocity", scheme.velocity_stages())?,
            )?,
            stage_force: alloc.storage("stage_force", stage_len("stage_force", scheme.stages())?)?,
            staging_positions: alloc.staging("staging_positions", vec2_len),
            staging_velocities: alloc.staging("staging_velocities", vec2_len),
            staging_fields: alloc.staging("staging_fields", vec2_len),
        };
        tracing::debug!(
            particles = n,
            cells,
            stage_stride = stride,
            pass_stride,
            "GPU buffers allocated"
        );
        Ok(bufs)
    }

    /// Elements between stage slots for `n` particles.
    pub fn stage_stride(n: usize) -> usize {
        n.next_multiple_of(STAGE_ALIGN)
    }

    /// Binding of stage slot `slot` of `buffer` (a stage velocity or force buffer).
    pub fn stage_slot<'a>(&self, buffer: &'a wgpu::Buffer, slot: usize) -> wgpu::BindingResource<'a> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer,
            offset: slot as u64 * self.stage_stride * VEC2_BYTES,
            size: NonZeroU64::new(self.n as u64 * VEC2_BYTES),
        })
    }

    /// Overwrite the canonical positions.
    pub fn upload_positions(&self, queue: &wgpu::Queue, positions: &[Vec2]) {
        queue.write_buffer(&self.positions, 0, bytemuck::cast_slice(positions));
    }

    /// Zero velocity, fields, sorted copies and stage buffers.
    pub fn clear_dynamics(&self, encoder: &mut wgpu::CommandEncoder) {
        for buffer in [
            &self.velocities,
            &self.fields,
            &self.sorted,
            &self.stage_position,
            &self.stage_velocity,
            &self.stage_force,
        ] {
            encoder.clear_buffer(buffer, 0, None);
        }
    }

    /// Copy positions, velocities, density and pressure back to the host.
    pub fn read_back(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<ParticleArrays, GpuError> {
        let n = self.n as usize;
        let byte_len = self.n as u64 * VEC2_BYTES;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback"),
        });
        encoder.copy_buffer_to_buffer(&self.positions, 0, &self.staging_positions, 0, byte_len);
        encoder.copy_buffer_to_buffer(&self.velocities, 0, &self.staging_velocities, 0, byte_len);
        encoder.copy_buffer_to_buffer(&self.fields, 0, &self.staging_fields, 0, byte_len);
        queue.submit(std::iter::once(encoder.finish()));

        let positions = read_mapped::<Vec2>(device, &self.staging_positions, n)?;
        let velocities = read_mapped::<Vec2>(device, &self.staging_velocities, n)?;
        let fields = read_mapped::<Vec2>(device, &self.staging_fields, n)?;

        Ok(ParticleArrays {
            positions,
            velocities,
            density: fields.iter().map(|f| f.x).collect(),
            pressure: fields.iter().map(|f| f.y).collect(),
        })
    }
}

/// Map a staging buffer and copy out its first `count` elements.
fn read_mapped<T: bytemuck::Pod>(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    count: usize,
) -> Result<Vec<T>, GpuError> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|e| GpuError::Readback(e.to_string()))?
        .map_err(|e| GpuError::Readback(e.to_string()))?;

    let data = slice.get_mapped_range();
    let result: Vec<T> = bytemuck::cast_slice(&data)[..count].to_vec();
    drop(data);
    buffer.unmap();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layouts_match_shaders() {
        assert_eq!(std::mem::size_of::<GpuSimParams>(), 96);
        assert_eq!(std::mem::size_of::<GpuSimParams>() % 16, 0);
        assert_eq!(std::mem::size_of::<PassParams>(), 16);
        assert_eq!(std::mem::size_of::<SortEntry>(), 12);
        assert_eq!(std::mem::size_of::<SortedParticle>(), 24);
    }

    #[test]
    fn stage_slots_are_256_byte_aligned() {
        for n in [1, 31, 32, 33, 1000] {
            let stride = GpuBuffers::stage_stride(n);
            assert!(stride >= n);
            assert_eq!(stride as u64 * VEC2_BYTES % 256, 0, "n = {n}");
        }
    }

    #[test]
    fn sim_params_follow_grid_and_fluid() {
        let config = SolverConfig {
            particle_count: 300,
            gravity_multiplier: 2.0,
            near_pressure: 3.0,
            ..SolverConfig::default()
        };
        let grid = GridParams::new(
            config.particle_radius,
            config.half_extents(),
            config.neighbor_radius_cells,
        )
        .unwrap();
        let fluid = FluidParams {
            h: grid.smoothing_radius(),
            mass: 1.0,
            rest_density: config.rest_density,
            stiffness: config.stiffness,
            viscosity: config.viscosity,
            near_pressure: config.near_pressure,
            gravity_multiplier: config.gravity_multiplier,
        };
        let params = GpuSimParams::new(&config, &grid, &fluid, 300, 320);
        assert_eq!(params.blocks, 2);
        assert_eq!(params.cell_count, grid.dims.x * grid.dims.y);
        assert_eq!(params.near_pressure, 3.0);
        assert!((params.gravity_y + 2.0 * 9.81).abs() < 1e-5);
        assert_eq!(params.origin_x, -config.half_extents[0]);
    }
}
