//! The device-resident float vector.
//!
//! A [`DeviceVector`] is an immutable, fixed-length array of 32-bit floats
//! living in device memory, combined with other vectors through elementwise
//! arithmetic that runs as a kernel launch.  Every operation produces a new
//! vector; operands are never mutated.  The device region is exclusively
//! owned and freed deterministically when the handle is released or
//! dropped, never by a collector.

use std::sync::Arc;

use crate::backend::ComputeBackend;
use crate::error::ComputeError;

/// Default dispatch partition: 256 indices per chunk.
pub const DEFAULT_CHUNK_SIZE: u32 = 256;

/// The elementwise kernels a vector can dispatch.
#[derive(Debug, Clone, Copy)]
enum ElementwiseOp {
    Add,
    Div,
}

impl ElementwiseOp {
    fn kernel_name(self) -> &'static str {
        match self {
            ElementwiseOp::Add => "add",
            ElementwiseOp::Div => "div",
        }
    }
}

/// An immutable handle to a fixed-length `f32` array in device memory.
///
/// The length is fixed at construction and the region is never written
/// again afterwards: `add` and `divide` allocate a fresh region for their
/// result.  A vector exclusively owns its region, so the type is not
/// `Clone` — no two handles ever alias the same device memory.  The backend
/// itself is shared through an [`Arc`], mirroring the one-device-per-process
/// model.
///
/// All operations block the calling thread until the device work completes.
/// Concurrent use of a single instance from multiple threads is not
/// coordinated here and must be serialized by the caller.
pub struct DeviceVector<B: ComputeBackend> {
    backend: Arc<B>,
    /// `None` once released; checked before every operation so that use
    /// after release is an error, not undefined behaviour.
    buffer: Option<B::Buffer>,
    len: usize,
    chunk_size: u32,
}

impl<B: ComputeBackend> DeviceVector<B> {
    /// Create a vector from host data: allocate a device region of
    /// `values.len() × 4` bytes and synchronously copy `values` into it.
    ///
    /// An empty slice is valid and yields a zero-length vector.  If the
    /// upload fails the freshly allocated region is freed before the error
    /// propagates.
    pub fn from_host(backend: &Arc<B>, values: &[f32]) -> Result<Self, ComputeError> {
        let buffer = backend.allocate(values.len())?;
        if let Err(e) = backend.copy_host_to_device(&buffer, values) {
            backend.free(buffer);
            return Err(e);
        }
        Ok(Self {
            backend: Arc::clone(backend),
            buffer: Some(buffer),
            len: values.len(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Wrap a backend-produced buffer of `len` floats, taking ownership.
    ///
    /// The buffer must hold `len` valid floats and must not be referenced
    /// by any other handle.  This is the construction path the arithmetic
    /// operations use for their results; general client code should prefer
    /// [`Self::from_host`].
    pub fn from_raw(backend: &Arc<B>, buffer: B::Buffer, len: usize) -> Self {
        Self {
            backend: Arc::clone(backend),
            buffer: Some(buffer),
            len,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Number of elements.  Fixed at construction; valid even after the
    /// vector has been released.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The dispatch partition used by this vector's arithmetic: the index
    /// space is split into contiguous chunks of this many indices.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Override the dispatch chunk size.  A tuning knob for backend
    /// occupancy only — any chunk size produces bit-identical results.
    /// Results of arithmetic inherit the left operand's setting.
    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Copy the device region back into a fresh host vector of exactly
    /// [`Self::len`] elements.  Blocks until the transfer completes.
    pub fn to_host(&self) -> Result<Vec<f32>, ComputeError> {
        let buffer = self.buffer()?;
        self.backend.copy_device_to_host(buffer, self.len)
    }

    /// Elementwise sum: returns a new vector with `result[i] = self[i] +
    /// other[i]`.
    ///
    /// Both operands must have the same length
    /// ([`ComputeError::DimensionMismatch`] otherwise, before any device
    /// work is issued) and are left unmodified.  `a.add(&a)` is valid.
    pub fn add(&self, other: &Self) -> Result<Self, ComputeError> {
        self.elementwise(other, ElementwiseOp::Add)
    }

    /// Elementwise quotient: returns a new vector with `result[i] =
    /// self[i] / other[i]`.
    ///
    /// Division by a zero element is not checked; the result follows the
    /// device's IEEE-754 semantics (signed infinity for `x / 0` with
    /// nonzero `x`, NaN for `0 / 0`).  Same preconditions as [`Self::add`].
    pub fn divide(&self, other: &Self) -> Result<Self, ComputeError> {
        self.elementwise(other, ElementwiseOp::Div)
    }

    /// Free the device region now.  Idempotent: releasing an already
    /// released vector does nothing.  Any later operation on this handle
    /// fails with [`ComputeError::UseAfterRelease`].
    pub fn release(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.backend.free(buffer);
        }
    }

    fn buffer(&self) -> Result<&B::Buffer, ComputeError> {
        self.buffer.as_ref().ok_or(ComputeError::UseAfterRelease)
    }

    fn elementwise(&self, other: &Self, op: ElementwiseOp) -> Result<Self, ComputeError> {
        let a = self.buffer()?;
        let b = other.buffer()?;
        if self.len != other.len {
            return Err(ComputeError::DimensionMismatch {
                left: self.len,
                right: other.len,
            });
        }
        let kernel = self.backend.load_kernel(op.kernel_name())?;
        let out = self.backend.allocate(self.len)?;
        // On launch failure the result region must not leak; the operands
        // stay valid either way.
        match self
            .backend
            .launch(&kernel, a, b, &out, self.len, self.chunk_size)
        {
            Ok(()) => {
                let result = Self::from_raw(&self.backend, out, self.len);
                Ok(result.with_chunk_size(self.chunk_size))
            }
            Err(e) => {
                self.backend.free(out);
                Err(e)
            }
        }
    }
}

impl<B: ComputeBackend> Drop for DeviceVector<B> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::CpuBackend;

    #[test]
    fn results_inherit_chunk_size() {
        let backend = Arc::new(CpuBackend::new());
        let a = DeviceVector::from_host(&backend, &[1.0, 2.0])
            .unwrap()
            .with_chunk_size(32);
        let b = DeviceVector::from_host(&backend, &[3.0, 4.0]).unwrap();
        let sum = a.add(&b).unwrap();
        assert_eq!(sum.chunk_size(), 32);
        assert_eq!(b.chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn drop_frees_the_region() {
        let backend = Arc::new(CpuBackend::new());
        {
            let _a = DeviceVector::from_host(&backend, &[1.0, 2.0, 3.0]).unwrap();
            assert_eq!(backend.live_buffer_count(), 1);
        }
        assert_eq!(backend.live_buffer_count(), 0);
    }
}
