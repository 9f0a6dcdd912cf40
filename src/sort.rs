//! GPU radix sort engine: multi-pass histogram/scan/scatter over u32 keys.
//!
//! Least-significant-digit radix sort, 8 bits per pass, four passes over the
//! 32-bit key. Each pass partitions the input into 2048-element blocks,
//! histograms the current digit per block, prefix-sums the totals into global
//! bin offsets, derives per-(block, digit) output offsets, and scatters into
//! final position, ping-ponging between the caller's buffer and scratch.
//!
//! Dispatch boundaries inside one compute pass are the only cross-workgroup
//! synchronization: every stage consumes only what the previous dispatch
//! wrote, which is why the pass is split into five dispatch-separated stages.

use wgpu::{BindGroup, Buffer, CommandEncoder, ComputePass, ComputePipeline};

use crate::buffers::{checked_byte_count, create_buffer_init};
use crate::context::GpuContext;
use crate::error::SortError;

pub(crate) const RADIX_BITS: u32 = 8;
pub(crate) const RADIX: u32 = 1 << RADIX_BITS;
pub(crate) const PASSES: u32 = 32 / RADIX_BITS;
pub(crate) const ELEMENTS_PER_BLOCK: u32 = 2048;
pub(crate) const THREADS_PER_WORKGROUP: u32 = 256;

const KEY_STRIDE: usize = std::mem::size_of::<u32>();

/// Sorted values plus the permutation that produced them.
///
/// `indices[i]` is the original position of the value now at position `i`;
/// it is always a valid permutation of `0..values.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedSortResult {
    pub values: Vec<u32>,
    pub indices: Vec<u32>,
}

/// GPU radix sorter for u32 keys.
///
/// Owns a [`GpuContext`] (device, queue, compiled pipelines) and no per-call
/// state: every sort allocates its scratch fresh and frees it on return, and
/// no caller buffer is retained beyond one call.
pub struct RadixSorter {
    pub(crate) context: GpuContext,
}

/// Call-scoped scratch for one sort: the ping-pong value buffer, the optional
/// index twin, and the histogram/offset tables.
struct SortResources {
    scratch_values: Buffer,
    scratch_indices: Option<Buffer>,
    block_histograms: Buffer,
    total_histogram: Buffer,
    bin_offsets: Buffer,
    block_offsets: Buffer,
    block_count: u32,
}

/// Ping-pong slots for one pass. The index lane is an optional second pair
/// threaded alongside the value pair so the pass loop never branches on it.
struct SortState<'a> {
    input_values: &'a Buffer,
    output_values: &'a Buffer,
    input_indices: Option<&'a Buffer>,
    output_indices: Option<&'a Buffer>,
}

impl SortState<'_> {
    fn advance_to_next_pass(&mut self) {
        std::mem::swap(&mut self.input_values, &mut self.output_values);
        if self.input_indices.is_some() {
            std::mem::swap(&mut self.input_indices, &mut self.output_indices);
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PassParams {
    count: u32,
    shift: u32,
    pad0: u32,
    pad1: u32,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BlockCountParams {
    block_count: u32,
    pad0: u32,
    pad1: u32,
    pad2: u32,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct CountParams {
    pub count: u32,
    pub pad0: u32,
    pub pad1: u32,
    pub pad2: u32,
}

impl RadixSorter {
    /// Discover a GPU and build the sorter, blocking until ready.
    pub fn new() -> Result<Self, SortError> {
        Ok(Self {
            context: GpuContext::new_blocking()?,
        })
    }

    /// Build a sorter on an existing context.
    pub fn from_context(context: GpuContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    // ---- Buffer tier: auto-submit ----

    /// Sort `count` u32 keys in `buffer` ascending, submitting the work and
    /// blocking until the device reports completion.
    pub fn sort_buffer(&self, buffer: &Buffer, count: usize) -> Result<(), SortError> {
        self.validate_sort(count, buffer, None)?;
        if count <= 1 {
            return Ok(());
        }

        let mut encoder = self.begin_submit("radix sort");
        let encoded = {
            let mut pass = begin_pass(&mut encoder, "radix sort");
            self.encode_sort_internal(&mut pass, buffer, None, count, false)
        };
        self.finish_submit(encoder, encoded)
    }

    /// Sort keys and carry `index_buffer` through the same permutation.
    ///
    /// With `initialize_indices` the index buffer is first filled with the
    /// identity permutation; pass `false` to compose with a permutation the
    /// caller already staged there.
    pub fn sort_buffer_with_indices(
        &self,
        buffer: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        initialize_indices: bool,
    ) -> Result<(), SortError> {
        self.validate_sort(count, buffer, Some(index_buffer))?;
        if !needs_sort_work(count, initialize_indices) {
            return Ok(());
        }

        let mut encoder = self.begin_submit("indexed radix sort");
        let encoded = {
            let mut pass = begin_pass(&mut encoder, "indexed radix sort");
            self.encode_sort_internal(
                &mut pass,
                buffer,
                Some(index_buffer),
                count,
                initialize_indices,
            )
        };
        self.finish_submit(encoder, encoded)
    }

    // ---- Encoder tier: append into a caller-supplied command encoder ----

    /// Encode the sort into `encoder` without submitting; the caller controls
    /// submission and may batch unrelated work around it.
    pub fn encode_sort(
        &self,
        encoder: &mut CommandEncoder,
        buffer: &Buffer,
        count: usize,
    ) -> Result<(), SortError> {
        self.validate_sort(count, buffer, None)?;
        if count <= 1 {
            return Ok(());
        }
        let mut pass = begin_pass(encoder, "radix sort");
        self.encode_sort_internal(&mut pass, buffer, None, count, false)
    }

    pub fn encode_sort_with_indices(
        &self,
        encoder: &mut CommandEncoder,
        buffer: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        initialize_indices: bool,
    ) -> Result<(), SortError> {
        self.validate_sort(count, buffer, Some(index_buffer))?;
        if !needs_sort_work(count, initialize_indices) {
            return Ok(());
        }
        let mut pass = begin_pass(encoder, "indexed radix sort");
        self.encode_sort_internal(
            &mut pass,
            buffer,
            Some(index_buffer),
            count,
            initialize_indices,
        )
    }

    // ---- Pass tier: append into a caller-opened compute pass ----

    /// Issue the sort's dispatches into a compute pass the caller already
    /// holds open. Nothing is created or closed; unrelated dispatches may
    /// surround the sort.
    pub fn encode_sort_in_pass(
        &self,
        pass: &mut ComputePass<'_>,
        buffer: &Buffer,
        count: usize,
    ) -> Result<(), SortError> {
        self.validate_sort(count, buffer, None)?;
        if count <= 1 {
            return Ok(());
        }
        self.encode_sort_internal(pass, buffer, None, count, false)
    }

    pub fn encode_sort_with_indices_in_pass(
        &self,
        pass: &mut ComputePass<'_>,
        buffer: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        initialize_indices: bool,
    ) -> Result<(), SortError> {
        self.validate_sort(count, buffer, Some(index_buffer))?;
        if !needs_sort_work(count, initialize_indices) {
            return Ok(());
        }
        self.encode_sort_internal(
            pass,
            buffer,
            Some(index_buffer),
            count,
            initialize_indices,
        )
    }

    // ---- Sort encoding internals ----

    fn encode_sort_internal(
        &self,
        pass: &mut ComputePass<'_>,
        values: &Buffer,
        index_buffer: Option<&Buffer>,
        count: usize,
        initialize_indices: bool,
    ) -> Result<(), SortError> {
        let count32 = count as u32;
        if initialize_indices && count > 0 {
            if let Some(index_buffer) = index_buffer {
                self.encode_initialize_indices(pass, index_buffer, count32);
            }
        }
        if count <= 1 {
            return Ok(());
        }

        let resources = self.allocate_sort_resources(count, index_buffer.is_some())?;
        let mut state = SortState {
            input_values: values,
            output_values: &resources.scratch_values,
            input_indices: index_buffer,
            output_indices: resources.scratch_indices.as_ref(),
        };

        for pass_index in 0..PASSES {
            self.encode_sort_pass(pass, pass_index, count32, &resources, &mut state);
        }

        // An odd pass count strands the result in scratch; the parity is
        // derived, not assumed.
        if PASSES % 2 != 0 {
            self.encode_copy_uint(pass, state.input_values, values, count32);
            if let (Some(index_buffer), Some(final_indices)) = (index_buffer, state.input_indices)
            {
                self.encode_copy_uint(pass, final_indices, index_buffer, count32);
            }
        }

        Ok(())
    }

    /// One radix pass: clear, count, scan, block offsets, scatter, swap.
    fn encode_sort_pass(
        &self,
        pass: &mut ComputePass<'_>,
        pass_index: u32,
        count: u32,
        resources: &SortResources,
        state: &mut SortState<'_>,
    ) {
        let shift = pass_index * RADIX_BITS;
        let pipelines = &self.context.pipelines;

        let bind_group = self.bind(
            &pipelines.clear_histogram,
            "clear histogram bind group",
            &[&resources.total_histogram],
        );
        self.dispatch(pass, &pipelines.clear_histogram, &bind_group, 1);

        let params = self.uniform(
            "count histogram params",
            PassParams {
                count,
                shift,
                pad0: 0,
                pad1: 0,
            },
        );
        let bind_group = self.bind(
            &pipelines.count_histogram,
            "count histogram bind group",
            &[
                state.input_values,
                &resources.block_histograms,
                &resources.total_histogram,
                &params,
            ],
        );
        self.dispatch(
            pass,
            &pipelines.count_histogram,
            &bind_group,
            resources.block_count,
        );

        let bind_group = self.bind(
            &pipelines.scan_histogram,
            "scan histogram bind group",
            &[&resources.total_histogram, &resources.bin_offsets],
        );
        self.dispatch(pass, &pipelines.scan_histogram, &bind_group, 1);

        let params = self.uniform(
            "block offsets params",
            BlockCountParams {
                block_count: resources.block_count,
                pad0: 0,
                pad1: 0,
                pad2: 0,
            },
        );
        let bind_group = self.bind(
            &pipelines.build_block_offsets,
            "block offsets bind group",
            &[
                &resources.block_histograms,
                &resources.bin_offsets,
                &resources.block_offsets,
                &params,
            ],
        );
        self.dispatch(pass, &pipelines.build_block_offsets, &bind_group, 1);

        let params = self.uniform(
            "scatter params",
            PassParams {
                count,
                shift,
                pad0: 0,
                pad1: 0,
            },
        );
        if let (Some(input_indices), Some(output_indices)) =
            (state.input_indices, state.output_indices)
        {
            let bind_group = self.bind(
                &pipelines.scatter_key_index,
                "scatter key/index bind group",
                &[
                    state.input_values,
                    state.output_values,
                    input_indices,
                    output_indices,
                    &resources.block_offsets,
                    &params,
                ],
            );
            self.dispatch(
                pass,
                &pipelines.scatter_key_index,
                &bind_group,
                resources.block_count,
            );
        } else {
            let bind_group = self.bind(
                &pipelines.scatter_values,
                "scatter values bind group",
                &[
                    state.input_values,
                    state.output_values,
                    &resources.block_offsets,
                    &params,
                ],
            );
            self.dispatch(
                pass,
                &pipelines.scatter_values,
                &bind_group,
                resources.block_count,
            );
        }

        state.advance_to_next_pass();
    }

    fn encode_initialize_indices(
        &self,
        pass: &mut ComputePass<'_>,
        index_buffer: &Buffer,
        count: u32,
    ) {
        let pipeline = &self.context.pipelines.initialize_indices;
        let params = self.uniform(
            "initialize indices params",
            CountParams {
                count,
                pad0: 0,
                pad1: 0,
                pad2: 0,
            },
        );
        let bind_group = self.bind(
            pipeline,
            "initialize indices bind group",
            &[index_buffer, &params],
        );
        self.dispatch(pass, pipeline, &bind_group, self.elementwise_group_count(count));
    }

    pub(crate) fn encode_copy_uint(
        &self,
        pass: &mut ComputePass<'_>,
        source: &Buffer,
        destination: &Buffer,
        count: u32,
    ) {
        let pipeline = &self.context.pipelines.copy_uint;
        let params = self.uniform(
            "copy uint params",
            CountParams {
                count,
                pad0: 0,
                pad1: 0,
                pad2: 0,
            },
        );
        let bind_group = self.bind(
            pipeline,
            "copy uint bind group",
            &[source, destination, &params],
        );
        self.dispatch(pass, pipeline, &bind_group, self.elementwise_group_count(count));
    }

    // ---- Validation and resources ----

    fn validate_sort(
        &self,
        count: usize,
        values: &Buffer,
        index_buffer: Option<&Buffer>,
    ) -> Result<(), SortError> {
        if count > u32::MAX as usize {
            return Err(SortError::UnsupportedCount(count));
        }
        checked_block_count(
            count,
            self.context.limits.max_compute_workgroups_per_dimension,
        )?;

        let required = checked_byte_count(count, KEY_STRIDE)?;
        if values.size() < required {
            return Err(SortError::BufferTooSmall {
                buffer: "values",
                required_bytes: required,
                available_bytes: values.size(),
            });
        }

        if let Some(index_buffer) = index_buffer {
            let available = (index_buffer.size() / KEY_STRIDE as u64) as usize;
            if count > available {
                return Err(SortError::IndexBufferTooSmall {
                    required: count,
                    available,
                });
            }
        }

        Ok(())
    }

    fn allocate_sort_resources(
        &self,
        count: usize,
        needs_indices: bool,
    ) -> Result<SortResources, SortError> {
        let byte_count = checked_byte_count(count, KEY_STRIDE)?;
        let block_count = checked_block_count(
            count,
            self.context.limits.max_compute_workgroups_per_dimension,
        )?;

        let radix_bytes = u64::from(RADIX) * KEY_STRIDE as u64;
        let table_bytes = u64::from(block_count) * radix_bytes;

        let scratch_indices = if needs_indices {
            Some(
                self.context
                    .create_scratch("scratch indices buffer", byte_count)?,
            )
        } else {
            None
        };

        Ok(SortResources {
            scratch_values: self
                .context
                .create_scratch("scratch values buffer", byte_count)?,
            scratch_indices,
            block_histograms: self
                .context
                .create_scratch("block histogram buffer", table_bytes)?,
            total_histogram: self
                .context
                .create_scratch("total histogram buffer", radix_bytes)?,
            bin_offsets: self.context.create_scratch("bin offsets buffer", radix_bytes)?,
            block_offsets: self
                .context
                .create_scratch("block offsets buffer", table_bytes)?,
            block_count,
        })
    }

    // ---- Dispatch plumbing shared with the reorder engine ----

    pub(crate) fn uniform<T: bytemuck::Pod>(&self, label: &str, value: T) -> Buffer {
        create_buffer_init(
            &self.context.device,
            label,
            &[value],
            wgpu::BufferUsages::UNIFORM,
        )
    }

    pub(crate) fn bind(
        &self,
        pipeline: &ComputePipeline,
        label: &str,
        buffers: &[&Buffer],
    ) -> BindGroup {
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buffer.as_entire_binding(),
            })
            .collect();
        self.context
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &pipeline.get_bind_group_layout(0),
                entries: &entries,
            })
    }

    pub(crate) fn dispatch(
        &self,
        pass: &mut ComputePass<'_>,
        pipeline: &ComputePipeline,
        bind_group: &BindGroup,
        group_count: u32,
    ) {
        if group_count == 0 {
            return;
        }
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(group_count, 1, 1);
    }

    /// Workgroup count for grid-stride elementwise kernels, clamped to the
    /// device's per-dimension dispatch limit.
    pub(crate) fn elementwise_group_count(&self, elements: u32) -> u32 {
        elements
            .div_ceil(THREADS_PER_WORKGROUP)
            .clamp(1, self.context.limits.max_compute_workgroups_per_dimension)
    }

    // ---- Submission plumbing for the auto-submit tiers ----

    /// Open a command encoder with validation and OOM error scopes pushed.
    pub(crate) fn begin_submit(&self, label: &str) -> CommandEncoder {
        let device = &self.context.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    /// Submit and block until the device completes, surfacing any captured
    /// device error. If encoding failed, nothing is submitted.
    pub(crate) fn finish_submit(
        &self,
        encoder: CommandEncoder,
        encoded: Result<(), SortError>,
    ) -> Result<(), SortError> {
        let device = &self.context.device;
        if let Err(err) = encoded {
            let _ = pollster::block_on(device.pop_error_scope());
            let _ = pollster::block_on(device.pop_error_scope());
            return Err(err);
        }

        self.context.queue.submit(Some(encoder.finish()));
        let _ = device.poll(wgpu::Maintain::Wait);

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if let Some(err) = validation.or(out_of_memory) {
            return Err(SortError::ExecutionFailed(err.to_string()));
        }
        Ok(())
    }
}

fn needs_sort_work(count: usize, initialize_indices: bool) -> bool {
    count > 1 || (initialize_indices && count > 0)
}

/// Block kernels cannot grid-stride (one workgroup owns one block), so the
/// block count must fit a single dispatch dimension. Checked during
/// validation so a rejected call encodes nothing.
fn checked_block_count(count: usize, max_groups: u32) -> Result<u32, SortError> {
    let block_count = (count as u64).div_ceil(ELEMENTS_PER_BLOCK as u64);
    if block_count > u64::from(max_groups) {
        return Err(SortError::UnsupportedCount(count));
    }
    Ok(block_count as u32)
}

pub(crate) fn begin_pass<'a>(encoder: &'a mut CommandEncoder, label: &str) -> ComputePass<'a> {
    encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some(label),
        timestamp_writes: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_count_covers_all_key_bits() {
        assert_eq!(PASSES * RADIX_BITS, 32);
        assert_eq!(RADIX, 256);
    }

    #[test]
    fn test_block_count_boundaries() {
        let block_count = |n: u64| n.div_ceil(ELEMENTS_PER_BLOCK as u64);
        assert_eq!(block_count(1), 1);
        assert_eq!(block_count(2047), 1);
        assert_eq!(block_count(2048), 1);
        assert_eq!(block_count(2049), 2);
        assert_eq!(block_count(4096), 2);
        assert_eq!(block_count(4097), 3);
    }

    #[test]
    fn test_checked_block_count_respects_dispatch_limit() {
        assert_eq!(checked_block_count(2048, 65535).unwrap(), 1);
        let max_elements = 65535usize * ELEMENTS_PER_BLOCK as usize;
        assert_eq!(checked_block_count(max_elements, 65535).unwrap(), 65535);
        assert!(matches!(
            checked_block_count(max_elements + 1, 65535),
            Err(SortError::UnsupportedCount(_))
        ));
    }

    #[test]
    fn test_needs_sort_work() {
        assert!(!needs_sort_work(0, false));
        assert!(!needs_sort_work(0, true));
        assert!(!needs_sort_work(1, false));
        assert!(needs_sort_work(1, true));
        assert!(needs_sort_work(2, false));
        assert!(needs_sort_work(2, true));
    }
}
