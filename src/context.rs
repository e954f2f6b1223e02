//! GPU context initialization.
//!
//! A thin wrapper around wgpu's instance, adapter, device and queue.  The
//! constructor hides the asynchronous nature of requesting an adapter and
//! device behind [`pollster`], because everything in this crate is
//! synchronous and blocking.

use wgpu::{Adapter, Device, Instance, Queue};

use crate::error::ComputeError;

/// All wgpu state needed to submit compute work.
///
/// Holds the `Instance`, `Adapter`, `Device` and `Queue`.  Those types are
/// internally reference counted and cheap to clone.  Construction picks the
/// default adapter on the system and fails if it cannot run compute
/// shaders.
pub struct GpuContext {
    /// Global GPU instance; required to request an adapter even in
    /// headless use.
    pub instance: Instance,
    /// The physical device selected for computation.
    pub adapter: Adapter,
    /// Logical device used to create buffers, pipelines and encoders.
    pub device: Device,
    /// Queue through which recorded command buffers are submitted.
    pub queue: Queue,
}

impl GpuContext {
    /// Create a GPU context, blocking the current thread while the
    /// asynchronous adapter and device requests finish.
    pub fn new_blocking() -> Result<Self, ComputeError> {
        let instance = Instance::new(&wgpu::InstanceDescriptor::default());
        // The default options pick a high performance adapter if one is
        // available, which is sufficient for compute workloads.
        let adapter =
            pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
                .map_err(|_| ComputeError::Init("no suitable GPU adapter found".into()))?;
        // Downlevel devices may not support compute on all backends; abort
        // early rather than failing at pipeline creation.
        let capabilities = adapter.get_downlevel_capabilities();
        if !capabilities.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(ComputeError::Init(
                "selected adapter does not support compute shaders".into(),
            ));
        }
        log::debug!("using adapter: {:?}", adapter.get_info());
        // No special features; downlevel default limits keep us portable
        // across the adapters wgpu can hand out.
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("device_vector_device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::Off,
        }))
        .map_err(|e| ComputeError::Init(format!("failed to create GPU device: {e}")))?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}
