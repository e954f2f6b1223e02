//! Host-memory reference implementation of [`ComputeBackend`].
//!
//! Useful on machines without a GPU adapter and as the semantic oracle in
//! tests: it walks exactly the chunk partition the GPU backend dispatches,
//! so the two produce bit-identical results.  Not thread safe; buffers use
//! `RefCell`, matching the single-calling-thread contract of the crate.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::backend::ComputeBackend;
use crate::error::ComputeError;

/// A "device" buffer that is really a host vector.
pub struct CpuBuffer {
    data: RefCell<Vec<f32>>,
}

/// Kernel entry points the CPU backend understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuKernel {
    Add,
    Div,
}

impl CpuKernel {
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            // Plain IEEE-754 arithmetic, unguarded like the device kernels:
            // x / 0.0 is signed infinity, 0.0 / 0.0 is NaN.
            CpuKernel::Add => a + b,
            CpuKernel::Div => a / b,
        }
    }
}

/// In-process [`ComputeBackend`] with no device behind it.
#[derive(Default)]
pub struct CpuBackend {
    live_buffers: AtomicUsize,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComputeBackend for CpuBackend {
    type Buffer = CpuBuffer;
    type Kernel = CpuKernel;

    fn load_kernel(&self, name: &str) -> Result<Self::Kernel, ComputeError> {
        match name {
            "add" => Ok(CpuKernel::Add),
            "div" => Ok(CpuKernel::Div),
            other => Err(ComputeError::KernelNotFound(other.to_owned())),
        }
    }

    fn allocate(&self, len: usize) -> Result<Self::Buffer, ComputeError> {
        self.live_buffers.fetch_add(1, Ordering::Relaxed);
        Ok(CpuBuffer {
            data: RefCell::new(vec![0.0; len]),
        })
    }

    fn free(&self, buffer: Self::Buffer) {
        self.live_buffers.fetch_sub(1, Ordering::Relaxed);
        drop(buffer);
    }

    fn copy_host_to_device(&self, buffer: &Self::Buffer, data: &[f32]) -> Result<(), ComputeError> {
        let mut target = buffer.data.borrow_mut();
        if data.len() > target.len() {
            return Err(ComputeError::Transfer(format!(
                "upload of {} elements exceeds buffer capacity {}",
                data.len(),
                target.len()
            )));
        }
        target[..data.len()].copy_from_slice(data);
        Ok(())
    }

    fn copy_device_to_host(
        &self,
        buffer: &Self::Buffer,
        len: usize,
    ) -> Result<Vec<f32>, ComputeError> {
        let source = buffer.data.borrow();
        if len > source.len() {
            return Err(ComputeError::Transfer(format!(
                "download of {len} elements exceeds buffer capacity {}",
                source.len()
            )));
        }
        Ok(source[..len].to_vec())
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
        // `a` and `b` may be the same buffer (self-application); clone the
        // operand views so the RefCell borrows never conflict with `out`.
        let lhs = a.data.borrow().clone();
        let rhs = b.data.borrow().clone();
        if len > lhs.len() || len > rhs.len() || len > out.data.borrow().len() {
            return Err(ComputeError::KernelLaunch(format!(
                "launch over {len} elements exceeds an operand's capacity"
            )));
        }
        let mut result = out.data.borrow_mut();
        // Same partition the GPU dispatch uses: one pass per contiguous
        // chunk, every index covered exactly once.
        for base in (0..len).step_by(chunk_size as usize) {
            let end = (base + chunk_size as usize).min(len);
            for i in base..end {
                result[i] = kernel.apply(lhs[i], rhs[i]);
            }
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
    fn kernels_resolve_by_name() {
        let backend = CpuBackend::new();
        assert_eq!(backend.load_kernel("add").unwrap(), CpuKernel::Add);
        assert_eq!(backend.load_kernel("div").unwrap(), CpuKernel::Div);
        assert!(matches!(
            backend.load_kernel("mul"),
            Err(ComputeError::KernelNotFound(name)) if name == "mul"
        ));
    }

    #[test]
    fn launch_covers_ragged_tail() {
        let backend = CpuBackend::new();
        let a = backend.allocate(5).unwrap();
        let b = backend.allocate(5).unwrap();
        let out = backend.allocate(5).unwrap();
        backend
            .copy_host_to_device(&a, &[1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        backend
            .copy_host_to_device(&b, &[10.0, 10.0, 10.0, 10.0, 10.0])
            .unwrap();
        // Chunk of 2 leaves a one-element tail.
        backend
            .launch(&CpuKernel::Add, &a, &b, &out, 5, 2)
            .unwrap();
        assert_eq!(
            backend.copy_device_to_host(&out, 5).unwrap(),
            vec![11.0, 12.0, 13.0, 14.0, 15.0]
        );
    }
}
