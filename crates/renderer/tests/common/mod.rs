//! Shared test host: a [`FrameHost`] backed by the recording device.

#![allow(dead_code)]

use std::sync::Arc;

use ash::vk::{self, Handle};
use triangle_renderer::FrameHost;
use triangle_renderer::pipeline::ShaderPaths;
use triangle_rhi::GpuDevice;
use triangle_rhi::mock::RecordingDevice;
use tempfile::TempDir;

pub const RENDER_PASS: u64 = 0x1000;
pub const FRAMEBUFFER: u64 = 0x2000;
pub const COMMAND_BUFFER: u64 = 0x3000;

/// Minimal SPIR-V header: magic, version, generator, bound, schema.
const SPIRV_STUB: [u32; 5] = [0x0723_0203, 0x0001_0000, 0, 1, 0];

pub struct MockHost {
    pub device: Arc<RecordingDevice>,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub min_alignment: vk::DeviceSize,
    pub frame_count: usize,
    pub samples: vk::SampleCountFlags,
    pub extent: vk::Extent2D,
    pub current_frame: usize,
    pub frames_ready: usize,
    pub updates_requested: usize,
}

impl MockHost {
    pub fn new(frame_count: usize) -> Self {
        let mut memory_properties = vk::PhysicalDeviceMemoryProperties::default();
        memory_properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        memory_properties.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        memory_properties.memory_type_count = 2;

        Self {
            device: RecordingDevice::new(),
            memory_properties,
            min_alignment: 256,
            frame_count,
            samples: vk::SampleCountFlags::TYPE_1,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            current_frame: 0,
            frames_ready: 0,
            updates_requested: 0,
        }
    }

    pub fn with_device(mut self, device: Arc<RecordingDevice>) -> Self {
        self.device = device;
        self
    }
}

impl FrameHost for MockHost {
    fn device(&self) -> Arc<dyn GpuDevice> {
        self.device.clone()
    }

    fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.min_alignment
    }

    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    fn concurrent_frame_count(&self) -> usize {
        self.frame_count
    }

    fn sample_count(&self) -> vk::SampleCountFlags {
        self.samples
    }

    fn render_pass(&self) -> vk::RenderPass {
        vk::RenderPass::from_raw(RENDER_PASS)
    }

    fn current_framebuffer(&self) -> vk::Framebuffer {
        vk::Framebuffer::from_raw(FRAMEBUFFER)
    }

    fn current_command_buffer(&self) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(COMMAND_BUFFER + self.current_frame as u64)
    }

    fn current_frame(&self) -> usize {
        self.current_frame
    }

    fn swapchain_image_size(&self) -> vk::Extent2D {
        self.extent
    }

    fn frame_ready(&mut self) {
        self.frames_ready += 1;
    }

    fn request_update(&mut self) {
        self.updates_requested += 1;
    }
}

/// Temporary directory holding stub shader binaries, removed on drop.
pub struct ShaderDir {
    dir: TempDir,
}

impl ShaderDir {
    pub fn new() -> Self {
        Self::with_stages(true, true)
    }

    pub fn with_stages(vertex: bool, fragment: bool) -> Self {
        let dir = tempfile::Builder::new()
            .prefix("triangle_shaders")
            .tempdir()
            .unwrap();
        let bytes: &[u8] = bytemuck::cast_slice(&SPIRV_STUB);
        if vertex {
            std::fs::write(dir.path().join("triangle.vert.spv"), bytes).unwrap();
        }
        if fragment {
            std::fs::write(dir.path().join("triangle.frag.spv"), bytes).unwrap();
        }
        Self { dir }
    }

    pub fn paths(&self) -> ShaderPaths {
        ShaderPaths {
            vertex: self.dir.path().join("triangle.vert.spv"),
            fragment: self.dir.path().join("triangle.frag.spv"),
        }
    }
}
