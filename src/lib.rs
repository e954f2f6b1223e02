//! A lightweight framework for keeping fixed-length `f32` vectors resident
//! in GPU memory and combining them with elementwise arithmetic, built on
//! [wgpu](https://github.com/gfx-rs/wgpu).  The central type is
//! [`DeviceVector`]: an immutable handle to a device-memory region that
//! produces new vectors through `add` and `divide` without ever mutating
//! its operands, and reads back to the host on demand.  The API is
//! synchronous and blocking: every operation waits for the device to
//! finish before returning.
//!
//! Device access goes through the [`ComputeBackend`] trait.  Two
//! implementations are provided: [`WgpuBackend`] for real GPU execution
//! and [`CpuBackend`], a host-memory reference that computes the same
//! results without any device, useful for tests and machines without an
//! adapter.
//!
//! ```no_run
//! use std::sync::Arc;
//! use device_vector::{DeviceVector, WgpuBackend};
//!
//! # fn main() -> Result<(), device_vector::ComputeError> {
//! let backend = Arc::new(WgpuBackend::new_blocking()?);
//! let a = DeviceVector::from_host(&backend, &[-4.0, -2.0, 0.0, 2.0, 4.0])?;
//! let b = DeviceVector::from_host(&backend, &[4.0; 5])?;
//! let c = DeviceVector::from_host(&backend, &[2.0; 5])?;
//! assert_eq!(a.add(&b)?.divide(&c)?.to_host()?, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod buffer;
pub mod compute;
pub mod context;
pub mod cpu;
pub mod error;
pub mod vector;

// Re-export the most common types at the crate root so that users can
// simply `use device_vector::*;`.
pub use backend::ComputeBackend;
pub use buffer::GpuBuffer;
pub use compute::WgpuBackend;
pub use context::GpuContext;
pub use cpu::CpuBackend;
pub use error::ComputeError;
pub use vector::{DeviceVector, DEFAULT_CHUNK_SIZE};
