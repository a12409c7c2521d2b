//! The renderer core: one colored triangle under an orbiting camera.

use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;
use tracing::{debug, error, info, warn};

use triangle_core::RenderConfig;
use triangle_rhi::vertex::ColorVertex;
use triangle_rhi::{GpuDevice, RhiResult};
use triangle_scene::OrbitCamera;

use crate::allocator::GpuAllocation;
use crate::descriptors::DescriptorBundle;
use crate::frame::{FrameCommands, clear_values, record_frame};
use crate::frame_slots::FrameSlots;
use crate::lifecycle::{FrameHost, FrameLifecycle};
use crate::pipeline::{PipelineBundle, PipelineDesc, ShaderPaths};

/// Values fixed for the renderer's lifetime.
#[derive(Clone, Debug, PartialEq)]
pub struct TriangleSettings {
    pub clear_color: [f32; 4],
    pub shaders: ShaderPaths,
}

impl Default for TriangleSettings {
    fn default() -> Self {
        Self::from(&RenderConfig::default())
    }
}

impl From<&RenderConfig> for TriangleSettings {
    fn from(config: &RenderConfig) -> Self {
        Self {
            clear_color: config.clear_color,
            shaders: ShaderPaths {
                vertex: config.vertex_shader.clone(),
                fragment: config.fragment_shader.clone(),
            },
        }
    }
}

/// Device objects created by `on_init_resources`.
///
/// Field order is teardown order: pipeline, cache, pipeline layout,
/// descriptor set layout, descriptor pool, memory, buffer.
struct Resources {
    pipeline: PipelineBundle,
    descriptors: DescriptorBundle,
    allocation: GpuAllocation,
    clear_values: SmallVec<[vk::ClearValue; 3]>,
    device: Arc<dyn GpuDevice>,
}

/// Draws the triangle through a [`FrameHost`].
pub struct TriangleRenderer {
    settings: TriangleSettings,
    camera: OrbitCamera,
    aspect: f32,
    resources: Option<Resources>,
}

impl TriangleRenderer {
    pub fn new(settings: TriangleSettings, camera: OrbitCamera) -> Self {
        Self {
            settings,
            camera,
            aspect: 1.0,
            resources: None,
        }
    }

    #[inline]
    pub fn camera(&self) -> &OrbitCamera {
        &self.camera
    }

    #[inline]
    pub fn camera_mut(&mut self) -> &mut OrbitCamera {
        &mut self.camera
    }

    /// Width over height of the swapchain images, as of the last resize.
    #[inline]
    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    #[inline]
    pub fn settings(&self) -> &TriangleSettings {
        &self.settings
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.resources.is_some()
    }

    pub fn allocation(&self) -> Option<&GpuAllocation> {
        self.resources.as_ref().map(|r| &r.allocation)
    }

    pub fn descriptors(&self) -> Option<&DescriptorBundle> {
        self.resources.as_ref().map(|r| &r.descriptors)
    }

    pub fn pipeline(&self) -> Option<&PipelineBundle> {
        self.resources.as_ref().map(|r| &r.pipeline)
    }

    fn update_aspect(&mut self, extent: vk::Extent2D) {
        if extent.width == 0 || extent.height == 0 {
            debug!("Ignoring empty extent {}x{}", extent.width, extent.height);
            return;
        }
        self.aspect = extent.width as f32 / extent.height as f32;
    }

    fn create_resources(&self, host: &dyn FrameHost) -> RhiResult<Resources> {
        let device = host.device();
        let frame_count = FrameSlots::<()>::check_count(host.concurrent_frame_count())?;

        let allocation = GpuAllocation::new(
            device.clone(),
            host.memory_properties(),
            host.min_uniform_buffer_offset_alignment(),
            frame_count,
        )?;

        let descriptors = DescriptorBundle::new(device.clone(), &allocation)?;

        let attributes = ColorVertex::attribute_descriptions();
        let samples = host.sample_count();
        let pipeline = PipelineBundle::new(
            device.clone(),
            &PipelineDesc {
                shaders: &self.settings.shaders,
                vertex_binding: ColorVertex::binding_description(),
                vertex_attributes: &attributes,
                set_layout: descriptors.set_layout(),
                render_pass: host.render_pass(),
                samples,
            },
        )?;

        Ok(Resources {
            pipeline,
            descriptors,
            allocation,
            clear_values: clear_values(self.settings.clear_color, samples),
            device,
        })
    }
}

impl FrameLifecycle for TriangleRenderer {
    fn on_init_resources(&mut self, host: &dyn FrameHost) -> RhiResult<()> {
        if self.resources.is_some() {
            warn!("Triangle resources already initialized");
            return Ok(());
        }

        let resources = self.create_resources(host)?;
        info!(
            "Triangle resources initialized for {} frame slot(s)",
            resources.allocation.frame_count()
        );
        self.resources = Some(resources);
        self.update_aspect(host.swapchain_image_size());
        Ok(())
    }

    fn on_swapchain_resized(&mut self, host: &dyn FrameHost) {
        let extent = host.swapchain_image_size();
        self.update_aspect(extent);
        debug!(
            "Swapchain resized to {}x{}, aspect {:.3}",
            extent.width, extent.height, self.aspect
        );
    }

    fn on_frame(&mut self, host: &mut dyn FrameHost) {
        if let Some(resources) = &self.resources {
            let slot = resources
                .descriptors
                .sets()
                .slot_for_frame(host.current_frame());

            let transform = self.camera.transform(self.aspect);
            if let Err(e) = resources.allocation.write_transform(slot, &transform) {
                error!("Transform upload for frame slot {} failed: {}", slot, e);
            }

            record_frame(
                resources.device.as_ref(),
                &FrameCommands {
                    command_buffer: host.current_command_buffer(),
                    render_pass: host.render_pass(),
                    framebuffer: host.current_framebuffer(),
                    extent: host.swapchain_image_size(),
                    clear_values: &resources.clear_values,
                    pipeline: resources.pipeline.pipeline().handle(),
                    pipeline_layout: resources.pipeline.layout(),
                    descriptor_set: resources.descriptors.set(slot),
                    vertex_buffer: resources.allocation.buffer(),
                    vertex_offset: resources.allocation.vertex_offset(),
                },
            );
        } else {
            warn!("Frame requested before resources were initialized");
        }

        host.frame_ready();
        host.request_update();
    }

    fn on_release_resources(&mut self) {
        if self.resources.take().is_some() {
            info!("Triangle resources released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let mut config = RenderConfig::default();
        config.clear_color = [0.5, 0.25, 0.0, 1.0];
        config.vertex_shader = "a.spv".into();
        config.fragment_shader = "b.spv".into();

        let settings = TriangleSettings::from(&config);
        assert_eq!(settings.clear_color, [0.5, 0.25, 0.0, 1.0]);
        assert_eq!(settings.shaders.vertex, std::path::PathBuf::from("a.spv"));
        assert_eq!(settings.shaders.fragment, std::path::PathBuf::from("b.spv"));
    }

    #[test]
    fn test_default_settings() {
        let settings = TriangleSettings::default();
        assert_eq!(settings.clear_color, [0.0, 0.0, 0.1, 1.0]);
        assert_eq!(settings.shaders, ShaderPaths::default());
    }

    #[test]
    fn test_aspect_ignores_empty_extent() {
        let mut renderer = TriangleRenderer::new(TriangleSettings::default(), OrbitCamera::default());
        renderer.update_aspect(vk::Extent2D {
            width: 1600,
            height: 800,
        });
        assert_eq!(renderer.aspect(), 2.0);

        renderer.update_aspect(vk::Extent2D {
            width: 0,
            height: 800,
        });
        assert_eq!(renderer.aspect(), 2.0);
    }

    #[test]
    fn test_release_without_init_is_noop() {
        let mut renderer = TriangleRenderer::new(TriangleSettings::default(), OrbitCamera::default());
        assert!(!renderer.is_initialized());
        renderer.on_release_resources();
        assert!(renderer.allocation().is_none());
    }
}
