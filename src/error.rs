//! Error vocabulary shared by every tier of the sort and reorder APIs.

use thiserror::Error;

/// Errors surfaced by context construction, validation, and execution.
///
/// Setup errors (device, queue, kernels, pipelines) are fatal and occur only
/// during [`crate::GpuContext`] construction. Precondition errors are raised
/// before any device work is submitted, so a failing call never partially
/// applies. Execution errors wrap whatever the device reported after an
/// auto-submitted command buffer completed with a non-success status.
#[derive(Debug, Error)]
pub enum SortError {
    #[error("no suitable GPU adapter is available")]
    DeviceUnavailable,

    #[error("failed to create GPU device and queue: {0}")]
    QueueCreationFailed(String),

    #[error("kernel `{kernel}` failed to compile: {message}")]
    KernelCompilationFailed {
        kernel: &'static str,
        message: String,
    },

    #[error("pipeline creation failed for kernel `{kernel}`: {message}")]
    PipelineCreationFailed {
        kernel: &'static str,
        message: String,
    },

    #[error("kernel `{kernel}` requires {required}-wide workgroups, device supports {max_supported}")]
    UnsupportedWorkgroupSize {
        kernel: &'static str,
        required: u32,
        max_supported: u32,
    },

    #[error("element count {0} is not supported on this device")]
    UnsupportedCount(usize),

    #[error("mismatched element counts: expected {expected}, got {got}")]
    MismatchedElementCount { expected: usize, got: usize },

    #[error("invalid element stride {0}")]
    InvalidElementStride(usize),

    #[error("index buffer too small: {required} elements required, {available} available")]
    IndexBufferTooSmall { required: usize, available: usize },

    #[error("{buffer} buffer too small: {required_bytes} bytes required, {available_bytes} available")]
    BufferTooSmall {
        buffer: &'static str,
        required_bytes: u64,
        available_bytes: u64,
    },

    #[error("byte count {0} is not supported")]
    UnsupportedByteCount(u128),

    #[error("failed to allocate {0}")]
    BufferAllocationFailed(&'static str),

    #[error("aliasing buffers are not supported: {0}")]
    AliasingBuffersNotSupported(&'static str),

    #[error("device execution failed: {0}")]
    ExecutionFailed(String),
}
