//! wgpu-backed implementation of the RHI contract.

use std::collections::HashMap;

use crate::error::{PipelineError, PipelineResult};

use super::types::{
    force_software_device_from_env, BufferId, GfxApi, ResourceUsage, RhiFactory, RhiRuntime,
};

/// RHI factory selecting a wgpu backend from the configured graphics API.
#[derive(Debug, Clone)]
pub struct WgpuRhiFactory {
    api: GfxApi,
    force_software: bool,
}

impl WgpuRhiFactory {
    pub fn new(api: GfxApi, force_software: bool) -> Self {
        Self { api, force_software }
    }

    /// Factory configured from `VDBSEQ_GFX_API` and
    /// `VDBSEQ_FORCE_SOFTWARE_DEVICE`.
    pub fn from_env() -> Self {
        Self::new(GfxApi::from_env(), force_software_device_from_env())
    }
}

impl RhiFactory for WgpuRhiFactory {
    fn create(&self) -> PipelineResult<Box<dyn RhiRuntime>> {
        Ok(Box::new(WgpuRuntime::new(self.api, self.force_software)?))
    }
}

fn backends_for_api(api: GfxApi) -> wgpu::Backends {
    match api {
        GfxApi::Auto => wgpu::Backends::PRIMARY,
        GfxApi::D3d12 => wgpu::Backends::DX12,
        GfxApi::Vulkan => wgpu::Backends::VULKAN,
        GfxApi::Metal => wgpu::Backends::METAL,
    }
}

/// GPU runtime over a wgpu device.
pub struct WgpuRuntime {
    device: wgpu::Device,
    queue: wgpu::Queue,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    next_buffer_id: u64,
    recording: bool,
}

impl WgpuRuntime {
    pub fn new(api: GfxApi, force_software: bool) -> PipelineResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: backends_for_api(api),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: force_software,
            compatible_surface: None,
        }))
        .ok_or_else(|| {
            PipelineError::Unsupported(format!("no {:?} adapter available", api))
        })?;

        log::info!(
            "[WgpuRuntime::new] Using adapter '{}' ({:?})",
            adapter.get_info().name,
            adapter.get_info().backend
        );

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("vdbseq decompression device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
            },
            None,
        ))
        .map_err(|e| PipelineError::Unsupported(format!("device creation failed: {}", e)))?;

        Ok(Self {
            device,
            queue,
            buffers: HashMap::new(),
            next_buffer_id: 1,
            recording: false,
        })
    }

    fn wgpu_usage(usage: ResourceUsage) -> wgpu::BufferUsages {
        let mut out = wgpu::BufferUsages::empty();
        if usage.intersects(ResourceUsage::UNORDERED_ACCESS | ResourceUsage::SHADER_RESOURCE) {
            out |= wgpu::BufferUsages::STORAGE;
        }
        if usage.contains(ResourceUsage::COPY_SOURCE) {
            out |= wgpu::BufferUsages::COPY_SRC;
        }
        if usage.contains(ResourceUsage::COPY_DEST) {
            out |= wgpu::BufferUsages::COPY_DST;
        }
        out
    }
}

impl RhiRuntime for WgpuRuntime {
    fn create_buffer(
        &mut self,
        size: u64,
        stride: u32,
        usage: ResourceUsage,
        name: &str,
    ) -> PipelineResult<BufferId> {
        if size == 0 {
            return Err(PipelineError::InvalidInput(format!(
                "zero-sized buffer '{}' requested",
                name
            )));
        }
        log::debug!(
            "[WgpuRuntime::create_buffer] '{}': {} bytes, stride {}",
            name,
            size,
            stride
        );
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(name),
            size,
            usage: Self::wgpu_usage(usage),
            mapped_at_creation: false,
        });
        let id = BufferId(self.next_buffer_id);
        self.next_buffer_id += 1;
        self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn release_buffer(&mut self, buffer: BufferId) -> PipelineResult<()> {
        self.buffers
            .remove(&buffer)
            .map(|b| b.destroy())
            .ok_or_else(|| PipelineError::Internal(format!("unknown buffer {:?}", buffer)))
    }

    fn read_buffer(
        &mut self,
        buffer: BufferId,
        dst: &mut [u8],
        offset: u64,
    ) -> PipelineResult<()> {
        let source = self
            .buffers
            .get(&buffer)
            .ok_or_else(|| PipelineError::Internal(format!("unknown buffer {:?}", buffer)))?;

        // Copy sizes must honor wgpu's alignment; the pipeline's layouts
        // are all 4-byte multiples already.
        let copy_size = (dst.len() as u64 + wgpu::COPY_BUFFER_ALIGNMENT - 1)
            / wgpu::COPY_BUFFER_ALIGNMENT
            * wgpu::COPY_BUFFER_ALIGNMENT;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("vdbseq readback staging"),
            size: copy_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("vdbseq readback"),
            });
        encoder.copy_buffer_to_buffer(source, offset, &staging, 0, copy_size);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| PipelineError::Internal("readback callback dropped".into()))?
            .map_err(|e| PipelineError::Internal(format!("buffer map failed: {:?}", e)))?;

        let mapped = slice.get_mapped_range();
        dst.copy_from_slice(&mapped[..dst.len()]);
        drop(mapped);
        staging.unmap();
        Ok(())
    }

    fn start_recording(&mut self) -> PipelineResult<()> {
        if self.recording {
            return Err(PipelineError::Internal("recording already started".into()));
        }
        self.recording = true;
        Ok(())
    }

    fn stop_recording(&mut self) -> PipelineResult<()> {
        if !self.recording {
            return Err(PipelineError::Internal("recording not started".into()));
        }
        self.recording = false;
        Ok(())
    }

    fn garbage_collect(&mut self) {
        // Readback staging buffers are dropped eagerly; this drains any
        // work the driver still holds.
        let _ = self.device.poll(wgpu::Maintain::Poll);
    }
}

impl Drop for WgpuRuntime {
    fn drop(&mut self) {
        for (_, buffer) in self.buffers.drain() {
            buffer.destroy();
        }
    }
}
