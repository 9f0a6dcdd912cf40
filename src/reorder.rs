//! Permutation apply: gather arbitrary-stride elements by a sorted index
//! buffer, out of place or in place through an explicit temporary.
//!
//! Storage buffers are word addressed in WGSL, so the gather kernel assigns
//! each thread one destination *word*: it reassembles the word from the
//! source bytes the permutation maps there, merging destination bytes past
//! the payload's end on the final partial word. Strides that are a multiple
//! of four take a word-copy fast path inside the kernel.

use wgpu::{Buffer, CommandEncoder, ComputePass};

use crate::buffers::{checked_byte_count, round_up_to_word};
use crate::error::SortError;
use crate::sort::{begin_pass, CountParams, RadixSorter};

/// Validated shape of one reorder: element count, byte stride, and the
/// derived payload size in bytes and words.
struct ReorderSpec {
    count32: u32,
    element_stride32: u32,
    byte_count32: u32,
    word_count: u32,
}

#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ReorderParams {
    count: u32,
    element_stride: u32,
    byte_count: u32,
    pad0: u32,
}

impl RadixSorter {
    // ---- Buffer tier: auto-submit ----

    /// Gather `count` elements of `element_stride` bytes through the
    /// permutation in `index_buffer`, writing the result back into `buffer`.
    /// A temporary holding the gathered copy is allocated internally.
    pub fn reorder_buffer(
        &self,
        buffer: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        element_stride: usize,
    ) -> Result<(), SortError> {
        let spec = self.make_reorder_spec(buffer, buffer, index_buffer, count, element_stride)?;
        if count <= 1 {
            return Ok(());
        }

        let temp = self.context.create_scratch(
            "reorder scratch buffer",
            u64::from(spec.byte_count32),
        )?;
        let mut encoder = self.begin_submit("reorder");
        let encoded = {
            let mut pass = begin_pass(&mut encoder, "reorder");
            self.encode_reorder_in_place_with_temp(&mut pass, buffer, &temp, index_buffer, &spec)
        };
        self.finish_submit(encoder, encoded)
    }

    /// Like [`RadixSorter::reorder_buffer`] but reuses a caller-supplied
    /// temporary instead of allocating one per call. The temporary must be a
    /// different buffer from the target and at least as large as the payload.
    pub fn reorder_buffer_with_temp(
        &self,
        buffer: &Buffer,
        temp_buffer: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        element_stride: usize,
    ) -> Result<(), SortError> {
        let spec =
            self.make_reorder_spec(buffer, temp_buffer, index_buffer, count, element_stride)?;
        if count <= 1 {
            return Ok(());
        }

        let mut encoder = self.begin_submit("reorder");
        let encoded = {
            let mut pass = begin_pass(&mut encoder, "reorder");
            self.encode_reorder_in_place_with_temp(
                &mut pass,
                buffer,
                temp_buffer,
                index_buffer,
                &spec,
            )
        };
        self.finish_submit(encoder, encoded)
    }

    /// Gather from `source` into a distinct `destination`; the single-pass
    /// form, with no temporary and no copy-back.
    ///
    /// A gather of a buffer into itself races element reads against word
    /// writes, so handles to the same buffer are rejected with
    /// [`SortError::AliasingBuffersNotSupported`] rather than producing
    /// unspecified output. Callers who need in-place semantics use
    /// [`RadixSorter::reorder_buffer`] or
    /// [`RadixSorter::reorder_buffer_with_temp`].
    pub fn reorder_buffer_to(
        &self,
        source: &Buffer,
        destination: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        element_stride: usize,
    ) -> Result<(), SortError> {
        let spec =
            self.make_reorder_spec(source, destination, index_buffer, count, element_stride)?;
        if source == destination {
            return Err(SortError::AliasingBuffersNotSupported(
                "reorder source and destination must be distinct buffers",
            ));
        }
        if count == 0 {
            return Ok(());
        }

        let mut encoder = self.begin_submit("reorder");
        let encoded = {
            let mut pass = begin_pass(&mut encoder, "reorder");
            self.encode_reorder_gather(&mut pass, source, destination, index_buffer, &spec);
            Ok(())
        };
        self.finish_submit(encoder, encoded)
    }

    // ---- Encoder tier ----

    pub fn encode_reorder(
        &self,
        encoder: &mut CommandEncoder,
        buffer: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        element_stride: usize,
    ) -> Result<(), SortError> {
        let spec = self.make_reorder_spec(buffer, buffer, index_buffer, count, element_stride)?;
        if count <= 1 {
            return Ok(());
        }
        let temp = self.context.create_scratch(
            "reorder scratch buffer",
            u64::from(spec.byte_count32),
        )?;
        let mut pass = begin_pass(encoder, "reorder");
        self.encode_reorder_in_place_with_temp(&mut pass, buffer, &temp, index_buffer, &spec)
    }

    pub fn encode_reorder_with_temp(
        &self,
        encoder: &mut CommandEncoder,
        buffer: &Buffer,
        temp_buffer: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        element_stride: usize,
    ) -> Result<(), SortError> {
        let spec =
            self.make_reorder_spec(buffer, temp_buffer, index_buffer, count, element_stride)?;
        if count <= 1 {
            return Ok(());
        }
        let mut pass = begin_pass(encoder, "reorder");
        self.encode_reorder_in_place_with_temp(&mut pass, buffer, temp_buffer, index_buffer, &spec)
    }

    pub fn encode_reorder_to(
        &self,
        encoder: &mut CommandEncoder,
        source: &Buffer,
        destination: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        element_stride: usize,
    ) -> Result<(), SortError> {
        let spec =
            self.make_reorder_spec(source, destination, index_buffer, count, element_stride)?;
        if source == destination {
            return Err(SortError::AliasingBuffersNotSupported(
                "reorder source and destination must be distinct buffers",
            ));
        }
        if count == 0 {
            return Ok(());
        }
        let mut pass = begin_pass(encoder, "reorder");
        self.encode_reorder_gather(&mut pass, source, destination, index_buffer, &spec);
        Ok(())
    }

    // ---- Pass tier ----

    pub fn encode_reorder_in_pass(
        &self,
        pass: &mut ComputePass<'_>,
        buffer: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        element_stride: usize,
    ) -> Result<(), SortError> {
        let spec = self.make_reorder_spec(buffer, buffer, index_buffer, count, element_stride)?;
        if count <= 1 {
            return Ok(());
        }
        let temp = self.context.create_scratch(
            "reorder scratch buffer",
            u64::from(spec.byte_count32),
        )?;
        self.encode_reorder_in_place_with_temp(pass, buffer, &temp, index_buffer, &spec)
    }

    pub fn encode_reorder_with_temp_in_pass(
        &self,
        pass: &mut ComputePass<'_>,
        buffer: &Buffer,
        temp_buffer: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        element_stride: usize,
    ) -> Result<(), SortError> {
        let spec =
            self.make_reorder_spec(buffer, temp_buffer, index_buffer, count, element_stride)?;
        if count <= 1 {
            return Ok(());
        }
        self.encode_reorder_in_place_with_temp(pass, buffer, temp_buffer, index_buffer, &spec)
    }

    pub fn encode_reorder_to_in_pass(
        &self,
        pass: &mut ComputePass<'_>,
        source: &Buffer,
        destination: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        element_stride: usize,
    ) -> Result<(), SortError> {
        let spec =
            self.make_reorder_spec(source, destination, index_buffer, count, element_stride)?;
        if source == destination {
            return Err(SortError::AliasingBuffersNotSupported(
                "reorder source and destination must be distinct buffers",
            ));
        }
        if count == 0 {
            return Ok(());
        }
        self.encode_reorder_gather(pass, source, destination, index_buffer, &spec);
        Ok(())
    }

    // ---- Internals ----

    /// Gather into the temporary, then copy the payload back into the target.
    /// The copy-back is a separate dispatch so the gather's reads of the
    /// target complete before the target is overwritten.
    fn encode_reorder_in_place_with_temp(
        &self,
        pass: &mut ComputePass<'_>,
        buffer: &Buffer,
        temp_buffer: &Buffer,
        index_buffer: &Buffer,
        spec: &ReorderSpec,
    ) -> Result<(), SortError> {
        // Buffer equality is resource identity, so a cloned handle to the
        // same allocation is caught, not just the same Rust reference.
        if buffer == temp_buffer {
            return Err(SortError::AliasingBuffersNotSupported(
                "in-place reorder temporary buffer must differ from the target buffer",
            ));
        }
        self.encode_reorder_gather(pass, buffer, temp_buffer, index_buffer, spec);
        self.encode_copy_bytes(pass, temp_buffer, buffer, spec.byte_count32);
        Ok(())
    }

    fn encode_reorder_gather(
        &self,
        pass: &mut ComputePass<'_>,
        source: &Buffer,
        destination: &Buffer,
        index_buffer: &Buffer,
        spec: &ReorderSpec,
    ) {
        let pipeline = &self.context.pipelines.reorder_by_index;
        let params = self.uniform(
            "reorder params",
            ReorderParams {
                count: spec.count32,
                element_stride: spec.element_stride32,
                byte_count: spec.byte_count32,
                pad0: 0,
            },
        );
        let bind_group = self.bind(
            pipeline,
            "reorder bind group",
            &[source, destination, index_buffer, &params],
        );
        self.dispatch(
            pass,
            pipeline,
            &bind_group,
            self.elementwise_group_count(spec.word_count),
        );
    }

    fn encode_copy_bytes(
        &self,
        pass: &mut ComputePass<'_>,
        source: &Buffer,
        destination: &Buffer,
        byte_count: u32,
    ) {
        let pipeline = &self.context.pipelines.copy_bytes;
        let params = self.uniform(
            "copy bytes params",
            CountParams {
                count: byte_count,
                pad0: 0,
                pad1: 0,
                pad2: 0,
            },
        );
        let bind_group = self.bind(
            pipeline,
            "copy bytes bind group",
            &[source, destination, &params],
        );
        let word_count = byte_count.div_ceil(4);
        self.dispatch(
            pass,
            pipeline,
            &bind_group,
            self.elementwise_group_count(word_count),
        );
    }

    fn make_reorder_spec(
        &self,
        source: &Buffer,
        destination: &Buffer,
        index_buffer: &Buffer,
        count: usize,
        element_stride: usize,
    ) -> Result<ReorderSpec, SortError> {
        if count > u32::MAX as usize {
            return Err(SortError::UnsupportedCount(count));
        }
        if element_stride == 0 || element_stride > u32::MAX as usize {
            return Err(SortError::InvalidElementStride(element_stride));
        }

        let byte_count = checked_byte_count(count, element_stride)?;
        if byte_count > u64::from(u32::MAX) {
            return Err(SortError::UnsupportedByteCount(u128::from(byte_count)));
        }

        // Bindings are word granular; a payload ending mid-word still needs
        // the whole final word present in both buffers.
        let required = round_up_to_word(byte_count);
        if source.size() < required {
            return Err(SortError::BufferTooSmall {
                buffer: "source",
                required_bytes: required,
                available_bytes: source.size(),
            });
        }
        if destination.size() < required {
            return Err(SortError::BufferTooSmall {
                buffer: "destination",
                required_bytes: required,
                available_bytes: destination.size(),
            });
        }

        let available = (index_buffer.size() / std::mem::size_of::<u32>() as u64) as usize;
        if count > available {
            return Err(SortError::IndexBufferTooSmall {
                required: count,
                available,
            });
        }

        let byte_count32 = byte_count as u32;
        Ok(ReorderSpec {
            count32: count as u32,
            element_stride32: element_stride as u32,
            byte_count32,
            word_count: byte_count32.div_ceil(4),
        })
    }
}
