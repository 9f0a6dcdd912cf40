//! GPU context management - wgpu device, queue, and compiled sort pipelines.

use wgpu::{
    Buffer, BufferUsages, ComputePipeline, Device, Features, Instance, Limits, Queue,
    RequestAdapterOptions,
};

use crate::buffers::{checked_byte_count, create_buffer, create_buffer_init, round_up_to_word};
use crate::error::SortError;
use crate::shaders;
use crate::sort::THREADS_PER_WORKGROUP;

/// Entry point names, shared between pipeline construction and diagnostics.
pub(crate) mod kernel {
    pub const INITIALIZE_INDICES: &str = "initialize_indices";
    pub const CLEAR_HISTOGRAM: &str = "clear_histogram_256";
    pub const COPY_UINT: &str = "copy_uint_buffer";
    pub const COPY_BYTES: &str = "copy_byte_buffer";
    pub const REORDER_BY_INDEX: &str = "reorder_by_index_bytes";
    pub const COUNT_HISTOGRAM: &str = "count_block_histograms";
    pub const SCAN_HISTOGRAM: &str = "scan_total_histogram";
    pub const BUILD_BLOCK_OFFSETS: &str = "build_block_offsets";
    pub const SCATTER_VALUES: &str = "scatter_values_stable";
    pub const SCATTER_KEY_INDEX: &str = "scatter_key_index_stable";
}

/// One compiled compute pipeline per kernel. Built once, read-only afterwards.
pub(crate) struct Pipelines {
    pub initialize_indices: ComputePipeline,
    pub clear_histogram: ComputePipeline,
    pub copy_uint: ComputePipeline,
    pub copy_bytes: ComputePipeline,
    pub reorder_by_index: ComputePipeline,
    pub count_histogram: ComputePipeline,
    pub scan_histogram: ComputePipeline,
    pub build_block_offsets: ComputePipeline,
    pub scatter_values: ComputePipeline,
    pub scatter_key_index: ComputePipeline,
}

impl Pipelines {
    /// Compile all ten kernels. Construction is transactional: the first
    /// failure discards everything built so far.
    fn new(device: &Device, limits: &Limits) -> Result<Self, SortError> {
        let max_supported = limits
            .max_compute_invocations_per_workgroup
            .min(limits.max_compute_workgroup_size_x);

        Ok(Self {
            initialize_indices: build_pipeline(
                device,
                kernel::INITIALIZE_INDICES,
                shaders::INITIALIZE_INDICES,
                max_supported,
            )?,
            clear_histogram: build_pipeline(
                device,
                kernel::CLEAR_HISTOGRAM,
                shaders::CLEAR_HISTOGRAM,
                max_supported,
            )?,
            copy_uint: build_pipeline(device, kernel::COPY_UINT, shaders::COPY_UINT, max_supported)?,
            copy_bytes: build_pipeline(
                device,
                kernel::COPY_BYTES,
                shaders::COPY_BYTES,
                max_supported,
            )?,
            reorder_by_index: build_pipeline(
                device,
                kernel::REORDER_BY_INDEX,
                shaders::REORDER_BY_INDEX,
                max_supported,
            )?,
            count_histogram: build_pipeline(
                device,
                kernel::COUNT_HISTOGRAM,
                shaders::COUNT_HISTOGRAM,
                max_supported,
            )?,
            scan_histogram: build_pipeline(
                device,
                kernel::SCAN_HISTOGRAM,
                shaders::SCAN_HISTOGRAM,
                max_supported,
            )?,
            build_block_offsets: build_pipeline(
                device,
                kernel::BUILD_BLOCK_OFFSETS,
                shaders::BUILD_BLOCK_OFFSETS,
                max_supported,
            )?,
            scatter_values: build_pipeline(
                device,
                kernel::SCATTER_VALUES,
                shaders::SCATTER_VALUES,
                max_supported,
            )?,
            scatter_key_index: build_pipeline(
                device,
                kernel::SCATTER_KEY_INDEX,
                shaders::SCATTER_KEY_INDEX,
                max_supported,
            )?,
        })
    }
}

/// Compile one kernel into a compute pipeline.
///
/// Shader and pipeline failures are captured with validation error scopes so
/// they surface as typed errors here instead of the uncaptured-error hook.
fn build_pipeline(
    device: &Device,
    kernel: &'static str,
    source: &'static str,
    max_supported: u32,
) -> Result<ComputePipeline, SortError> {
    if max_supported < THREADS_PER_WORKGROUP {
        return Err(SortError::UnsupportedWorkgroupSize {
            kernel,
            required: THREADS_PER_WORKGROUP,
            max_supported,
        });
    }

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(kernel),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(SortError::KernelCompilationFailed {
            kernel,
            message: err.to_string(),
        });
    }

    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(kernel),
        layout: None,
        module: &module,
        entry_point: Some(kernel),
        compilation_options: Default::default(),
        cache: None,
    });
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(SortError::PipelineCreationFailed {
            kernel,
            message: err.to_string(),
        });
    }

    Ok(pipeline)
}

/// Long-lived GPU binding: one device, one command queue, and the compiled
/// pipeline for each kernel. Immutable after construction; safe to share
/// across sequential calls (concurrent submission onto the one queue needs
/// external serialization).
pub struct GpuContext {
    pub device: Device,
    pub queue: Queue,
    pub(crate) limits: Limits,
    pub(crate) pipelines: Pipelines,
}

impl GpuContext {
    /// Initialize the GPU context asynchronously.
    ///
    /// Selects the first available GPU adapter, creates a device with compute
    /// shader support, and compiles all sort kernels.
    pub async fn new() -> Result<Self, SortError> {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: {
                #[cfg(target_os = "macos")]
                {
                    wgpu::Backends::METAL
                }
                #[cfg(not(target_os = "macos"))]
                {
                    wgpu::Backends::PRIMARY
                }
            },
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(SortError::DeviceUnavailable)?;

        let info = adapter.get_info();
        eprintln!("GPU: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Radix Sort Device"),
                    required_features: Features::empty(),
                    required_limits: Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| SortError::QueueCreationFailed(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|e| {
            eprintln!("[wgpu] uncaptured error: {e}");
        }));

        Self::from_device(device, queue)
    }

    /// Synchronous wrapper using pollster.
    pub fn new_blocking() -> Result<Self, SortError> {
        pollster::block_on(Self::new())
    }

    /// Build a context on a caller-supplied device and queue.
    ///
    /// All ten kernels must compile and pass the workgroup-width check before
    /// the context is usable; partial construction is discarded.
    pub fn from_device(device: Device, queue: Queue) -> Result<Self, SortError> {
        let limits = device.limits();
        let pipelines = Pipelines::new(&device, &limits)?;
        Ok(Self {
            device,
            queue,
            limits,
            pipelines,
        })
    }

    /// Device-only scratch, owned by the engine for the duration of one call.
    pub(crate) fn create_scratch(
        &self,
        label: &'static str,
        size: u64,
    ) -> Result<Buffer, SortError> {
        let size = round_up_to_word(size);
        self.check_allocation(label, size)?;
        Ok(create_buffer(&self.device, label, size, BufferUsages::STORAGE))
    }

    /// Host-staged storage buffer, readable back after execution.
    pub(crate) fn create_storage_init<T: bytemuck::Pod>(
        &self,
        label: &'static str,
        data: &[T],
    ) -> Result<Buffer, SortError> {
        let size = checked_byte_count(data.len(), std::mem::size_of::<T>())?;
        self.check_allocation(label, round_up_to_word(size))?;
        Ok(create_buffer_init(
            &self.device,
            label,
            data,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        ))
    }

    /// Uninitialized storage buffer for outputs the caller will read back.
    pub(crate) fn create_storage(
        &self,
        label: &'static str,
        size: u64,
    ) -> Result<Buffer, SortError> {
        let size = round_up_to_word(size);
        self.check_allocation(label, size)?;
        Ok(create_buffer(
            &self.device,
            label,
            size,
            BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        ))
    }

    fn check_allocation(&self, label: &'static str, size: u64) -> Result<(), SortError> {
        if size > self.limits.max_buffer_size
            || size > u64::from(self.limits.max_storage_buffer_binding_size)
        {
            return Err(SortError::BufferAllocationFailed(label));
        }
        Ok(())
    }
}
