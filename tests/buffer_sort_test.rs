//! Buffer-tier sort: caller-owned wgpu buffers, validation, index staging.

mod common;

use common::{cpu_sort_with_indices, sorter_or_skip};
use radix_sort_wgpu::buffers::{create_buffer, create_buffer_init, read_buffer_blocking};
use radix_sort_wgpu::{Lcg, RadixSorter, SortError};
use wgpu::BufferUsages;

const STORAGE_READBACK: BufferUsages = BufferUsages::STORAGE.union(BufferUsages::COPY_SRC);

fn upload(sorter: &RadixSorter, label: &str, data: &[u32]) -> wgpu::Buffer {
    create_buffer_init(&sorter.context().device, label, data, STORAGE_READBACK)
}

fn download(sorter: &RadixSorter, buffer: &wgpu::Buffer, count: usize) -> Vec<u32> {
    let context = sorter.context();
    read_buffer_blocking(&context.device, &context.queue, buffer, count).expect("readback failed")
}

#[test]
fn test_sort_buffer_matches_cpu() {
    let Some(sorter) = sorter_or_skip("test_sort_buffer_matches_cpu") else {
        return;
    };

    let input = Lcg::new(3).fill(6000);
    let mut expected = input.clone();
    expected.sort_unstable();

    let buffer = upload(&sorter, "test values", &input);
    sorter.sort_buffer(&buffer, input.len()).expect("sort failed");
    assert_eq!(download(&sorter, &buffer, input.len()), expected);
}

#[test]
fn test_sort_buffer_prefix_leaves_tail_untouched() {
    let Some(sorter) = sorter_or_skip("test_sort_buffer_prefix_leaves_tail_untouched") else {
        return;
    };

    // Sort only the first half of the buffer; the tail must survive verbatim.
    let input = Lcg::new(11).fill(4000);
    let buffer = upload(&sorter, "test values", &input);
    sorter.sort_buffer(&buffer, 2000).expect("sort failed");

    let output = download(&sorter, &buffer, input.len());
    let mut expected_head = input[..2000].to_vec();
    expected_head.sort_unstable();
    assert_eq!(&output[..2000], &expected_head[..]);
    assert_eq!(&output[2000..], &input[2000..]);
}

#[test]
fn test_sort_buffer_with_initialized_indices() {
    let Some(sorter) = sorter_or_skip("test_sort_buffer_with_initialized_indices") else {
        return;
    };

    let mut rng = Lcg::new(21);
    let input: Vec<u32> = (0..5000).map(|_| rng.next_u32() % 64).collect();
    let (expected_values, expected_indices) = cpu_sort_with_indices(&input);

    let values = upload(&sorter, "test values", &input);
    let indices = create_buffer(
        &sorter.context().device,
        "test indices",
        (input.len() * 4) as u64,
        STORAGE_READBACK,
    );
    sorter
        .sort_buffer_with_indices(&values, &indices, input.len(), true)
        .expect("sort failed");

    assert_eq!(download(&sorter, &values, input.len()), expected_values);
    assert_eq!(download(&sorter, &indices, input.len()), expected_indices);
}

#[test]
fn test_sort_buffer_composes_with_staged_indices() {
    let Some(sorter) = sorter_or_skip("test_sort_buffer_composes_with_staged_indices") else {
        return;
    };

    // All keys equal: a stable sort must carry the caller-staged index lane
    // through unchanged.
    let count = 3000usize;
    let keys = vec![7u32; count];
    let staged: Vec<u32> = (0..count as u32).map(|i| i.wrapping_mul(2654435761)).collect();

    let values = upload(&sorter, "test values", &keys);
    let indices = upload(&sorter, "test indices", &staged);
    sorter
        .sort_buffer_with_indices(&values, &indices, count, false)
        .expect("sort failed");

    assert_eq!(download(&sorter, &indices, count), staged);
}

#[test]
fn test_sort_buffer_validation_errors() {
    let Some(sorter) = sorter_or_skip("test_sort_buffer_validation_errors") else {
        return;
    };

    let buffer = upload(&sorter, "test values", &[1u32, 2, 3, 4]);

    let result = sorter.sort_buffer(&buffer, 5);
    assert!(matches!(result, Err(SortError::BufferTooSmall { .. })));

    let result = sorter.sort_buffer(&buffer, u32::MAX as usize + 1);
    assert!(matches!(result, Err(SortError::UnsupportedCount(_))));

    let small_indices = upload(&sorter, "test indices", &[0u32, 0]);
    let result = sorter.sort_buffer_with_indices(&buffer, &small_indices, 4, true);
    assert!(matches!(
        result,
        Err(SortError::IndexBufferTooSmall {
            required: 4,
            available: 2
        })
    ));
}

#[test]
fn test_sort_buffer_trivial_counts_are_no_ops() {
    let Some(sorter) = sorter_or_skip("test_sort_buffer_trivial_counts_are_no_ops") else {
        return;
    };

    let input = vec![9u32, 1, 5];
    let buffer = upload(&sorter, "test values", &input);

    sorter.sort_buffer(&buffer, 0).expect("sort failed");
    sorter.sort_buffer(&buffer, 1).expect("sort failed");
    assert_eq!(download(&sorter, &buffer, input.len()), input);
}

#[test]
fn test_single_element_indexed_sort_still_initializes() {
    let Some(sorter) = sorter_or_skip("test_single_element_indexed_sort_still_initializes") else {
        return;
    };

    let values = upload(&sorter, "test values", &[42u32]);
    let indices = upload(&sorter, "test indices", &[u32::MAX]);
    sorter
        .sort_buffer_with_indices(&values, &indices, 1, true)
        .expect("sort failed");

    assert_eq!(download(&sorter, &indices, 1), vec![0]);
}
