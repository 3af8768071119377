use crate::error::StageError;

/// Headless GPU execution context shared by the stages of one pipeline.
///
/// Owns the wgpu device and queue. The context performs no locking; the
/// host that drives the stages must serialize all calls that use the same
/// context, mirroring the exclusive-GPU-access guarantee the stages assume.
pub struct GpuContext {
    _instance: wgpu::Instance,
    device: wgpu::Device,
    queue: wgpu::Queue,
    max_texture_dimension: u32,
}

impl GpuContext {
    /// Acquires an adapter and device without a presentation surface.
    pub fn new() -> Result<Self, StageError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .map_err(|err| StageError::GpuUnavailable(format!("no suitable GPU adapter: {err}")))?;

        let info = adapter.get_info();
        let limits = adapter.limits();
        tracing::debug!(
            name = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("hdrstack device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits.clone(),
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .map_err(|err| StageError::GpuUnavailable(format!("failed to create GPU device: {err}")))?;

        Ok(Self {
            _instance: instance,
            device,
            queue,
            max_texture_dimension: limits.max_texture_dimension_2d,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Largest 2D texture edge the adapter supports.
    pub fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    /// Blocks until all submitted work has completed, so downstream
    /// consumers never observe a partially written destination texture.
    pub(crate) fn wait(&self) -> Result<(), StageError> {
        self.device
            .poll(wgpu::PollType::Wait)
            .map_err(|err| StageError::GpuUnavailable(format!("device poll failed: {err}")))?;
        Ok(())
    }
}
