//! GPU buffer management, overflow-checked size math, and readback.

use wgpu::{Buffer, BufferUsages, Device, Queue};

use crate::error::SortError;

/// Upload data to a GPU buffer.
///
/// Creates a buffer with the given usage flags and copies data from CPU to GPU.
pub fn create_buffer_init<T: bytemuck::Pod>(
    device: &Device,
    label: &str,
    data: &[T],
    usage: BufferUsages,
) -> Buffer {
    use wgpu::util::DeviceExt;

    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(data),
        usage,
    })
}

/// Create an empty buffer of the given byte size.
pub fn create_buffer(device: &Device, label: &str, size: u64, usage: BufferUsages) -> Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage,
        mapped_at_creation: false,
    })
}

/// `count * stride` with overflow checking.
pub(crate) fn checked_byte_count(count: usize, stride: usize) -> Result<u64, SortError> {
    let bytes = (count as u128) * (stride as u128);
    if bytes > u64::MAX as u128 {
        return Err(SortError::UnsupportedByteCount(bytes));
    }
    Ok(bytes as u64)
}

/// Round a byte size up to whole u32 words. Storage bindings and buffer
/// copies are word granular, so capacities are always measured this way.
pub(crate) fn round_up_to_word(bytes: u64) -> u64 {
    bytes.div_ceil(4) * 4
}

/// Read data back from a GPU buffer to the CPU.
///
/// Copies into a staging buffer, maps it, and returns the first `count`
/// elements. The source buffer needs `COPY_SRC` usage and a capacity rounded
/// up to whole words.
pub async fn read_buffer<T: bytemuck::Pod>(
    device: &Device,
    queue: &Queue,
    buffer: &Buffer,
    count: usize,
) -> Result<Vec<T>, SortError> {
    let byte_count = checked_byte_count(count, std::mem::size_of::<T>())?;
    let padded = round_up_to_word(byte_count);

    let staging = create_buffer(
        device,
        "readback staging buffer",
        padded,
        BufferUsages::MAP_READ | BufferUsages::COPY_DST,
    );

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("readback encoder"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, padded);
    queue.submit(Some(encoder.finish()));

    let (tx, rx) = futures::channel::oneshot::channel();
    staging
        .slice(..)
        .map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
    let _ = device.poll(wgpu::Maintain::Wait);

    rx.await
        .map_err(|_| SortError::ExecutionFailed("readback channel closed".to_string()))?
        .map_err(|e| SortError::ExecutionFailed(format!("buffer mapping failed: {e:?}")))?;

    let data = staging.slice(..).get_mapped_range();
    let result = bytemuck::cast_slice::<u8, T>(&data[..byte_count as usize]).to_vec();
    drop(data);
    staging.unmap();

    Ok(result)
}

/// Blocking wrapper for [`read_buffer`].
pub fn read_buffer_blocking<T: bytemuck::Pod>(
    device: &Device,
    queue: &Queue,
    buffer: &Buffer,
    count: usize,
) -> Result<Vec<T>, SortError> {
    pollster::block_on(read_buffer(device, queue, buffer, count))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_byte_count() {
        assert_eq!(checked_byte_count(0, 4).unwrap(), 0);
        assert_eq!(checked_byte_count(2048, 4).unwrap(), 8192);
        assert_eq!(
            checked_byte_count(u32::MAX as usize, 4).unwrap(),
            (u32::MAX as u64) * 4
        );
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_checked_byte_count_overflow() {
        let result = checked_byte_count(usize::MAX, usize::MAX);
        assert!(matches!(result, Err(SortError::UnsupportedByteCount(_))));
    }

    #[test]
    fn test_round_up_to_word() {
        assert_eq!(round_up_to_word(0), 0);
        assert_eq!(round_up_to_word(1), 4);
        assert_eq!(round_up_to_word(4), 4);
        assert_eq!(round_up_to_word(5), 8);
        assert_eq!(round_up_to_word(8191), 8192);
    }
}
