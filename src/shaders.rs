//! Embedded WGSL compute kernels, one source file per pipeline.
//!
//! The ten kernels mirror the stages of the sort and reorder engines:
//! utility (index init, copies), histogram (clear, count, scan, block
//! offsets), scatter (values only, key+index), and the permutation gather.

pub(crate) const INITIALIZE_INDICES: &str = include_str!("shaders/initialize_indices.wgsl");
pub(crate) const CLEAR_HISTOGRAM: &str = include_str!("shaders/clear_histogram.wgsl");
pub(crate) const COPY_UINT: &str = include_str!("shaders/copy_uint.wgsl");
pub(crate) const COPY_BYTES: &str = include_str!("shaders/copy_bytes.wgsl");
pub(crate) const REORDER_BY_INDEX: &str = include_str!("shaders/reorder_by_index.wgsl");
pub(crate) const COUNT_HISTOGRAM: &str = include_str!("shaders/count_histogram.wgsl");
pub(crate) const SCAN_HISTOGRAM: &str = include_str!("shaders/scan_histogram.wgsl");
pub(crate) const BUILD_BLOCK_OFFSETS: &str = include_str!("shaders/build_block_offsets.wgsl");
pub(crate) const SCATTER_VALUES: &str = include_str!("shaders/scatter_values.wgsl");
pub(crate) const SCATTER_KEY_INDEX: &str = include_str!("shaders/scatter_key_index.wgsl");
