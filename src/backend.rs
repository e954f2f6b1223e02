//! The compute-backend contract consumed by [`crate::DeviceVector`].
//!
//! A backend owns the process-wide device state (context, queue, compiled
//! kernels) and exposes the handful of primitives the vector type needs:
//! allocate, free, copy in both directions, and a synchronous elementwise
//! kernel launch.  Backends are constructed explicitly, once, and passed to
//! every vector by shared reference — there is no hidden global.
//!
//! Two implementations ship with the crate: [`crate::WgpuBackend`] for real
//! device execution and [`crate::CpuBackend`] as a host-memory reference.

use crate::error::ComputeError;

/// Operations a backend must provide for `DeviceVector` to function.
///
/// All methods block the calling thread until the device work they issue has
/// completed; there is no overlap of independent operations and no streamed
/// execution in this contract.  Work issued from one thread against one
/// backend executes in issue order.
pub trait ComputeBackend {
    /// Opaque handle to a region of device memory.  Exclusively owned by
    /// whoever holds it; returned to the backend through [`Self::free`].
    type Buffer;

    /// Resolved kernel entry point, produced by [`Self::load_kernel`].
    type Kernel;

    /// Resolve a kernel entry point by name from the module compiled at
    /// backend construction.  Fails with [`ComputeError::KernelNotFound`]
    /// for a name the module does not define.
    fn load_kernel(&self, name: &str) -> Result<Self::Kernel, ComputeError>;

    /// Reserve device memory for `len` 32-bit floats (`len × 4` bytes).
    /// The contents are unspecified until written.  Fails with
    /// [`ComputeError::Allocation`] on exhaustion.
    fn allocate(&self, len: usize) -> Result<Self::Buffer, ComputeError>;

    /// Release a device-memory region.  Consumes the handle, so a region
    /// can only ever be freed once through this interface.
    fn free(&self, buffer: Self::Buffer);

    /// Synchronously copy `data` into the region.  `data.len()` must not
    /// exceed the allocated length.
    fn copy_host_to_device(&self, buffer: &Self::Buffer, data: &[f32]) -> Result<(), ComputeError>;

    /// Synchronously copy `len` floats out of the region into a fresh host
    /// vector.
    fn copy_device_to_host(&self, buffer: &Self::Buffer, len: usize)
        -> Result<Vec<f32>, ComputeError>;

    /// Dispatch an elementwise binary kernel over `[0, len)` and wait for
    /// completion: `out[i] = kernel(a[i], b[i])` for every index.
    ///
    /// The index space is partitioned into contiguous chunks of
    /// `chunk_size` indices, each covered exactly once.  The partition is a
    /// performance parameter only: results are bit-identical for any
    /// `chunk_size >= 1`.  `a` and `b` may be the same buffer.
    fn launch(
        &self,
        kernel: &Self::Kernel,
        a: &Self::Buffer,
        b: &Self::Buffer,
        out: &Self::Buffer,
        len: usize,
        chunk_size: u32,
    ) -> Result<(), ComputeError>;

    /// Number of buffers allocated through this backend and not yet freed.
    /// Purely a leak diagnostic; carries no correctness contract.
    fn live_buffer_count(&self) -> usize;
}
