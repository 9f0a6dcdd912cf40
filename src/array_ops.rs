//! Host-array convenience tier: upload, sort or reorder on the GPU, read the
//! result back. Thin wrappers over the buffer tier for callers who hold
//! slices rather than wgpu buffers.

use crate::buffers::{checked_byte_count, read_buffer_blocking};
use crate::error::SortError;
use crate::sort::{IndexedSortResult, RadixSorter};

impl RadixSorter {
    /// Sort a u32 array ascending, returning a new sorted vector.
    pub fn sort(&self, values: &[u32]) -> Result<Vec<u32>, SortError> {
        if values.len() <= 1 {
            return Ok(values.to_vec());
        }

        let buffer = self.context.create_storage_init("sort input buffer", values)?;
        self.sort_buffer(&buffer, values.len())?;
        read_buffer_blocking(&self.context.device, &self.context.queue, &buffer, values.len())
    }

    /// Sort a u32 array ascending in place.
    pub fn sort_in_place(&self, values: &mut [u32]) -> Result<(), SortError> {
        let sorted = self.sort(values)?;
        values.copy_from_slice(&sorted);
        Ok(())
    }

    /// Sort a u32 array and return the sorted values together with the
    /// permutation that produced them.
    pub fn sort_with_indices(&self, values: &[u32]) -> Result<IndexedSortResult, SortError> {
        let count = values.len();
        if count == 0 {
            return Ok(IndexedSortResult {
                values: Vec::new(),
                indices: Vec::new(),
            });
        }

        let value_buffer = self
            .context
            .create_storage_init("indexed input buffer", values)?;
        let index_buffer = self.context.create_storage(
            "index output buffer",
            checked_byte_count(count, std::mem::size_of::<u32>())?,
        )?;
        self.sort_buffer_with_indices(&value_buffer, &index_buffer, count, true)?;

        let device = &self.context.device;
        let queue = &self.context.queue;
        Ok(IndexedSortResult {
            values: read_buffer_blocking(device, queue, &value_buffer, count)?,
            indices: read_buffer_blocking(device, queue, &index_buffer, count)?,
        })
    }

    /// In-place variant of [`RadixSorter::sort_with_indices`]; the permutation
    /// is returned, the values are overwritten.
    pub fn sort_with_indices_in_place(&self, values: &mut [u32]) -> Result<Vec<u32>, SortError> {
        let result = self.sort_with_indices(values)?;
        values.copy_from_slice(&result.values);
        Ok(result.indices)
    }

    /// Gather `values[indices[i]]` into a new vector for any `Pod` element
    /// type. `indices` must name exactly one source slot per output slot.
    pub fn reorder<T: bytemuck::Pod>(
        &self,
        values: &[T],
        indices: &[u32],
    ) -> Result<Vec<T>, SortError> {
        if values.len() != indices.len() {
            return Err(SortError::MismatchedElementCount {
                expected: values.len(),
                got: indices.len(),
            });
        }
        let count = values.len();
        if count == 0 {
            return Ok(Vec::new());
        }

        let element_stride = std::mem::size_of::<T>();
        let source = self
            .context
            .create_storage_init("array reorder values buffer", values)?;
        let destination = self.context.create_storage(
            "array reorder output buffer",
            checked_byte_count(count, element_stride)?,
        )?;
        let index_buffer = self
            .context
            .create_storage_init("array reorder index buffer", indices)?;

        self.reorder_buffer_to(&source, &destination, &index_buffer, count, element_stride)?;
        read_buffer_blocking(&self.context.device, &self.context.queue, &destination, count)
    }

    /// In-place variant of [`RadixSorter::reorder`].
    pub fn reorder_in_place<T: bytemuck::Pod>(
        &self,
        values: &mut [T],
        indices: &[u32],
    ) -> Result<(), SortError> {
        let reordered = self.reorder(values, indices)?;
        values.copy_from_slice(&reordered);
        Ok(())
    }
}
