//! Typed GPU buffers and host readback utilities.
//!
//! [`GpuBuffer`] wraps a [`wgpu::Buffer`] together with the number of typed
//! elements it stores.  Allocation, upload and download all go through a
//! [`crate::GpuContext`]; the wrapper itself holds no CPU-side copy of the
//! data.  Unlike a plain `create_buffer` call, allocation here runs inside
//! an out-of-memory error scope so that exhaustion surfaces as a
//! [`ComputeError::Allocation`] instead of a delayed device error.

use bytemuck::{cast_slice, Pod};
use wgpu::{Buffer, BufferDescriptor, BufferUsages};

use crate::error::ComputeError;
use crate::GpuContext;

/// A typed GPU buffer.
///
/// `len` records how many elements of type `T` the buffer holds; the
/// underlying size in bytes is `len * size_of::<T>()`, padded to wgpu's
/// four-byte minimum so that zero-length vectors remain representable.
pub struct GpuBuffer<T: Pod> {
    pub buffer: Buffer,
    pub len: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Pod> GpuBuffer<T> {
    /// Allocate a storage buffer of `len` elements with unspecified
    /// contents.
    ///
    /// The buffer carries `STORAGE | COPY_DST | COPY_SRC` so it can be
    /// bound to a compute shader, written from the host and read back.
    pub fn new_storage(context: &GpuContext, len: usize) -> Result<Self, ComputeError> {
        let bytes = (len * std::mem::size_of::<T>()) as u64;
        // wgpu rejects zero-sized bindings; keep empty buffers at the
        // minimum valid size.
        let size = bytes.max(wgpu::COPY_BUFFER_ALIGNMENT);
        context.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some("device_vector_storage"),
            size,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST | BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        if pollster::block_on(context.device.pop_error_scope()).is_some() {
            return Err(ComputeError::Allocation { bytes });
        }
        Ok(Self {
            buffer,
            len,
            _marker: std::marker::PhantomData,
        })
    }

    /// Allocate a download buffer sized for `len` elements, mappable for
    /// reading on the CPU.  It cannot be bound to a shader.
    pub fn new_download(context: &GpuContext, len: usize) -> Result<Self, ComputeError> {
        let bytes = (len * std::mem::size_of::<T>()) as u64;
        let size = bytes.max(wgpu::COPY_BUFFER_ALIGNMENT);
        context.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = context.device.create_buffer(&BufferDescriptor {
            label: Some("device_vector_download"),
            size,
            usage: BufferUsages::COPY_DST | BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        if pollster::block_on(context.device.pop_error_scope()).is_some() {
            return Err(ComputeError::Allocation { bytes });
        }
        Ok(Self {
            buffer,
            len,
            _marker: std::marker::PhantomData,
        })
    }

    /// Upload `data` into the buffer via a queue write.  This avoids the
    /// `MAP_WRITE` usage flag; the write is ordered before any subsequent
    /// submission that reads the buffer.
    pub fn write(&self, context: &GpuContext, data: &[T]) -> Result<(), ComputeError> {
        if data.is_empty() {
            return Ok(());
        }
        if data.len() > self.len {
            return Err(ComputeError::Transfer(format!(
                "upload of {} elements exceeds buffer capacity {}",
                data.len(),
                self.len
            )));
        }
        context.queue.write_buffer(&self.buffer, 0, cast_slice(data));
        Ok(())
    }

    /// Read the buffer's contents back to the CPU.
    ///
    /// Only valid on buffers created with [`Self::new_download`].  Blocks
    /// the calling thread until the GPU has finished writing and the
    /// mapping is ready, then unmaps before returning.
    pub fn read_to_vec(&self, context: &GpuContext) -> Result<Vec<T>, ComputeError> {
        if self.len == 0 {
            return Ok(Vec::new());
        }
        let byte_len = self.len * std::mem::size_of::<T>();
        let slice = self.buffer.slice(..byte_len as u64);
        // The mapping callback fires during the blocking poll below, so a
        // plain channel is enough to carry its result back.
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        context
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| ComputeError::Transfer(format!("device poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| ComputeError::Transfer("buffer mapping callback never ran".into()))?
            .map_err(|e| ComputeError::Transfer(format!("buffer mapping failed: {e}")))?;

        let data = slice.get_mapped_range();
        let result: Vec<T> = cast_slice(&data).to_vec();
        // Drop the view to release the borrow before unmapping.
        drop(data);
        self.buffer.unmap();
        Ok(result)
    }
}
