//! Error taxonomy shared by the backend contract and [`crate::DeviceVector`].
//!
//! Every fallible operation in this crate fails with exactly one
//! [`ComputeError`] kind; there are no partial or degraded results.  Backend
//! failures propagate unchanged to the caller of the operation that
//! triggered them — the only local recovery performed anywhere is releasing
//! a partially allocated result buffer before the error leaves the crate.

use thiserror::Error;

/// Unified error type for backend and vector operations.
#[derive(Debug, Error)]
pub enum ComputeError {
    /// Backend construction failed: no suitable adapter, the adapter lacks
    /// compute support, or the device request was rejected.
    #[error("backend initialisation failed: {0}")]
    Init(String),

    /// Device memory could not be reserved.
    #[error("failed to allocate {bytes} bytes of device memory")]
    Allocation { bytes: u64 },

    /// A host↔device copy could not complete.
    #[error("host/device transfer failed: {0}")]
    Transfer(String),

    /// Kernel dispatch or device-side execution reported an error.
    #[error("kernel launch failed: {0}")]
    KernelLaunch(String),

    /// The named entry point is not part of the loaded kernel module.
    #[error("no kernel named `{0}` in the loaded module")]
    KernelNotFound(String),

    /// The two operands of an elementwise operation differ in length.
    #[error("dimension mismatch: left operand has {left} elements, right operand has {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// The vector's device buffer was already released.
    #[error("use after release: the device buffer backing this vector was freed")]
    UseAfterRelease,
}
