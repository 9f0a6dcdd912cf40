//! # radix-sort-wgpu: GPU radix sort for u32 keys
//!
//! A least-significant-digit radix sort running entirely on the GPU via wgpu
//! compute shaders: 8 bits per pass, four passes, stable within each pass, so
//! equal keys keep their relative order. Alongside the plain sort, an indexed
//! variant carries a permutation through the sort, and a reorder engine
//! applies that permutation to payload buffers of arbitrary byte stride.
//!
//! ## Architecture
//!
//! - `context`: wgpu device/queue acquisition and kernel compilation
//! - `sort`: the multi-pass histogram/scan/scatter engine
//! - `reorder`: permutation apply for arbitrary-stride payloads
//! - `array_ops`: upload/sort/read-back convenience over host slices
//! - `buffers`: buffer creation, size math, and readback
//! - `rng`: deterministic input generation for tests and benchmarks
//!
//! ## Command composition
//!
//! Every operation comes in three tiers. The buffer tier submits and blocks.
//! The encoder tier (`encode_*`) appends into a caller's `CommandEncoder`.
//! The pass tier (`encode_*_in_pass`) issues dispatches into a compute pass
//! the caller holds open, relying on WebGPU's guarantee that dispatches in
//! one pass execute in order.

mod array_ops;
pub mod buffers;
mod context;
mod error;
mod reorder;
mod rng;
mod shaders;
mod sort;

pub use context::GpuContext;
pub use error::SortError;
pub use rng::Lcg;
pub use sort::{IndexedSortResult, RadixSorter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
