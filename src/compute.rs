//! The wgpu implementation of [`ComputeBackend`].
//!
//! [`WgpuBackend`] compiles the embedded WGSL kernel module once at
//! construction and builds one compute pipeline per entry point, so that
//! `load_kernel` is a table lookup rather than a shader compilation.  Each
//! launch records a single compute pass over the chunk partition, submits
//! it, and blocks until the device reports completion.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytemuck::{Pod, Zeroable};

use crate::backend::ComputeBackend;
use crate::buffer::GpuBuffer;
use crate::context::GpuContext;
use crate::error::ComputeError;

/// Threads per workgroup.  Must match the `@workgroup_size` attribute in
/// [`KERNEL_SOURCE`]; invocations stride across their workgroup's chunk in
/// steps of this many indices.
const WORKGROUP_SIZE: u32 = 64;

/// WGSL module containing every elementwise kernel the backend knows.
///
/// Each workgroup owns one contiguous chunk of `params.chunk` indices
/// starting at `chunk_index * params.chunk`; its invocations stride across
/// the chunk and a length guard drops the tail.  Division is the raw WGSL
/// `/`, so dividing by zero follows IEEE-754 (signed infinity, NaN for 0/0).
const KERNEL_SOURCE: &str = r#"
struct Params {
    len: u32,
    chunk: u32,
}

@group(0) @binding(0)
var<storage, read> a: array<f32>;
@group(0) @binding(1)
var<storage, read> b: array<f32>;
@group(0) @binding(2)
var<storage, read_write> out: array<f32>;
@group(0) @binding(3)
var<uniform> params: Params;

@compute @workgroup_size(64)
fn add(@builtin(workgroup_id) group_id: vec3<u32>,
       @builtin(local_invocation_id) local_id: vec3<u32>,
       @builtin(num_workgroups) groups: vec3<u32>) {
    let base = (group_id.y * groups.x + group_id.x) * params.chunk;
    for (var j = local_id.x; j < params.chunk; j = j + 64u) {
        let i = base + j;
        if (i < params.len) {
            out[i] = a[i] + b[i];
        }
    }
}

@compute @workgroup_size(64)
fn div(@builtin(workgroup_id) group_id: vec3<u32>,
       @builtin(local_invocation_id) local_id: vec3<u32>,
       @builtin(num_workgroups) groups: vec3<u32>) {
    let base = (group_id.y * groups.x + group_id.x) * params.chunk;
    for (var j = local_id.x; j < params.chunk; j = j + 64u) {
        let i = base + j;
        if (i < params.len) {
            out[i] = a[i] / b[i];
        }
    }
}
"#;

/// Uniform block handed to every launch.  Layout must match the `Params`
/// struct in [`KERNEL_SOURCE`].
#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct Params {
    len: u32,
    chunk: u32,
}

/// Calculate an (x, y) workgroup grid covering `total_groups` workgroups
/// without exceeding the per-dimension device limit.
fn split_workgroups(total_groups: u32, limit: u32) -> (u32, u32) {
    if total_groups <= limit {
        (total_groups, 1)
    } else {
        let x = limit;
        let y = (total_groups + limit - 1) / limit; // ceiling-divide
        (x, y)
    }
}

/// A [`ComputeBackend`] backed by a [`GpuContext`].
///
/// Construct one per process, wrap it in an [`std::sync::Arc`], and hand it
/// to every [`crate::DeviceVector`] factory.  The context, bind group
/// layout and pipelines live for the backend's whole lifetime.
pub struct WgpuBackend {
    context: GpuContext,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<&'static str, wgpu::ComputePipeline>,
    live_buffers: AtomicUsize,
}

impl WgpuBackend {
    /// Initialize the backend: acquire a device, compile the kernel module
    /// and build a pipeline for every entry point.  Blocks until done.
    pub fn new_blocking() -> Result<Self, ComputeError> {
        let context = GpuContext::new_blocking()?;
        let module = context
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("device_vector_kernels"),
                source: wgpu::ShaderSource::Wgsl(KERNEL_SOURCE.into()),
            });

        let float_size = NonZeroU64::new(std::mem::size_of::<f32>() as u64);
        let params_size = NonZeroU64::new(std::mem::size_of::<Params>() as u64);
        let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: float_size,
            },
            count: None,
        };
        let bind_group_layout =
            context
                .device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("device_vector_bind_group_layout"),
                    entries: &[
                        storage(0, true),
                        storage(1, true),
                        storage(2, false),
                        wgpu::BindGroupLayoutEntry {
                            binding: 3,
                            visibility: wgpu::ShaderStages::COMPUTE,
                            ty: wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: params_size,
                            },
                            count: None,
                        },
                    ],
                });
        let pipeline_layout =
            context
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("device_vector_pipeline_layout"),
                    bind_group_layouts: &[&bind_group_layout],
                    push_constant_ranges: &[],
                });

        let mut pipelines = HashMap::new();
        for entry_point in ["add", "div"] {
            let pipeline =
                context
                    .device
                    .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                        label: Some(entry_point),
                        layout: Some(&pipeline_layout),
                        module: &module,
                        entry_point: Some(entry_point),
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                        cache: None,
                    });
            pipelines.insert(entry_point, pipeline);
        }
        log::debug!(
            "compiled {} elementwise kernel(s), workgroup size {WORKGROUP_SIZE}",
            pipelines.len()
        );

        Ok(Self {
            context,
            bind_group_layout,
            pipelines,
            live_buffers: AtomicUsize::new(0),
        })
    }

    /// The underlying context, for callers that want to submit their own
    /// work against the same device and queue.
    pub fn context(&self) -> &GpuContext {
        &self.context
    }
}

impl ComputeBackend for WgpuBackend {
    type Buffer = GpuBuffer<f32>;
    type Kernel = wgpu::ComputePipeline;

    fn load_kernel(&self, name: &str) -> Result<Self::Kernel, ComputeError> {
        self.pipelines
            .get(name)
            .cloned()
            .ok_or_else(|| ComputeError::KernelNotFound(name.to_owned()))
    }

    fn allocate(&self, len: usize) -> Result<Self::Buffer, ComputeError> {
        let buffer = GpuBuffer::new_storage(&self.context, len)?;
        self.live_buffers.fetch_add(1, Ordering::Relaxed);
        log::trace!("allocated storage for {len} floats");
        Ok(buffer)
    }

    fn free(&self, buffer: Self::Buffer) {
        self.live_buffers.fetch_sub(1, Ordering::Relaxed);
        log::trace!("freeing storage for {} floats", buffer.len);
        // Reclaim device memory now instead of waiting for wgpu's internal
        // refcount to drop.
        buffer.buffer.destroy();
    }

    fn copy_host_to_device(&self, buffer: &Self::Buffer, data: &[f32]) -> Result<(), ComputeError> {
        buffer.write(&self.context, data)
    }

    fn copy_device_to_host(
        &self,
        buffer: &Self::Buffer,
        len: usize,
    ) -> Result<Vec<f32>, ComputeError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let download = GpuBuffer::<f32>::new_download(&self.context, len)?;
        let byte_len = (len * std::mem::size_of::<f32>()) as u64;
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("device_vector_download_encoder"),
            });
        encoder.copy_buffer_to_buffer(&buffer.buffer, 0, &download.buffer, 0, byte_len);
        self.context.queue.submit([encoder.finish()]);
        download.read_to_vec(&self.context)
    }

    fn launch(
        &self,
        kernel: &Self::Kernel,
        a: &Self::Buffer,
        b: &Self::Buffer,
        out: &Self::Buffer,
        len: usize,
        chunk_size: u32,
    ) -> Result<(), ComputeError> {
        if chunk_size == 0 {
            return Err(ComputeError::KernelLaunch(
                "chunk size must be at least 1".into(),
            ));
        }
        if len == 0 {
            return Ok(());
        }

        let params = Params {
            len: len as u32,
            chunk: chunk_size,
        };
        self.context
            .device
            .push_error_scope(wgpu::ErrorFilter::Validation);
        let params_buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("device_vector_params"),
            size: std::mem::size_of::<Params>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.context
            .queue
            .write_buffer(&params_buffer, 0, bytemuck::bytes_of(&params));
        let bind_group = self
            .context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("device_vector_bind_group"),
                layout: &self.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: a.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: b.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: out.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: params_buffer.as_entire_binding(),
                    },
                ],
            });

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("device_vector_launch_encoder"),
            });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("device_vector_elementwise"),
                timestamp_writes: None,
            });
            cpass.set_pipeline(kernel);
            cpass.set_bind_group(0, &bind_group, &[]);
            // One workgroup per chunk; wide grids fold into two dimensions
            // to respect the per-dimension limit.
            let limits = self.context.device.limits();
            let total_groups = ((len as u64 + chunk_size as u64 - 1) / chunk_size as u64) as u32;
            let (groups_x, groups_y) =
                split_workgroups(total_groups, limits.max_compute_workgroups_per_dimension);
            cpass.dispatch_workgroups(groups_x, groups_y, 1);
        }
        self.context.queue.submit([encoder.finish()]);
        // Wait for completion: the contract is synchronous.
        self.context
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| ComputeError::KernelLaunch(format!("device poll failed: {e:?}")))?;
        if let Some(error) = pollster::block_on(self.context.device.pop_error_scope()) {
            return Err(ComputeError::KernelLaunch(error.to_string()));
        }
        Ok(())
    }

    fn live_buffer_count(&self) -> usize {
        self.live_buffers.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_respects_dimension_limit() {
        assert_eq!(split_workgroups(10, 64), (10, 1));
        assert_eq!(split_workgroups(64, 64), (64, 1));
        assert_eq!(split_workgroups(65, 64), (64, 2));
        assert_eq!(split_workgroups(1000, 64), (64, 16));
    }

    #[test]
    fn workgroup_size_matches_shader() {
        assert!(KERNEL_SOURCE.contains(&format!("@workgroup_size({WORKGROUP_SIZE})")));
    }
}
