//! Shared helpers for GPU integration tests.

// Not every test binary uses every helper.
#![allow(dead_code)]

use radix_sort_wgpu::{RadixSorter, SortError};

/// Build a sorter, or return `None` to skip the test on machines without a
/// usable GPU adapter. Any other setup failure is a real bug and panics.
pub fn sorter_or_skip(test: &str) -> Option<RadixSorter> {
    match RadixSorter::new() {
        Ok(sorter) => Some(sorter),
        Err(SortError::DeviceUnavailable) => {
            eprintln!("skipping {test}: no GPU adapter available");
            None
        }
        Err(e) => panic!("GPU setup failed: {e}"),
    }
}

/// CPU reference: stable ascending sort returning (values, original indices).
pub fn cpu_sort_with_indices(values: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let mut order: Vec<u32> = (0..values.len() as u32).collect();
    order.sort_by_key(|&i| values[i as usize]);
    let sorted = order.iter().map(|&i| values[i as usize]).collect();
    (sorted, order)
}
