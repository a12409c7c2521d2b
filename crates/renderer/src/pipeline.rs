//! The triangle's graphics pipeline.
//!
//! Built once at init against the host's render pass. Viewport and scissor
//! are dynamic, so a swapchain resize never rebuilds it.

use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use tracing::info;

use triangle_rhi::descriptor::DescriptorSetLayout;
use triangle_rhi::pipeline::{
    CompareOp, CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineCache,
    PipelineLayout, PolygonMode, PrimitiveTopology,
};
use triangle_rhi::shader::{ShaderModule, ShaderStage};
use triangle_rhi::{GpuDevice, RhiResult};

/// Paths of the compiled SPIR-V stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderPaths {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/triangle.vert.spv"),
            fragment: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// Everything the pipeline is built from besides the device.
pub struct PipelineDesc<'a> {
    pub shaders: &'a ShaderPaths,
    pub vertex_binding: vk::VertexInputBindingDescription,
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    pub set_layout: &'a DescriptorSetLayout,
    pub render_pass: vk::RenderPass,
    pub samples: vk::SampleCountFlags,
}

/// Pipeline plus the cache and layout it was created with.
///
/// Dropping it destroys the pipeline, then the cache, then the layout.
pub struct PipelineBundle {
    pipeline: Pipeline,
    cache: PipelineCache,
    layout: PipelineLayout,
}

impl PipelineBundle {
    /// Creates the cache and layout, loads both shader stages and builds the
    /// pipeline. The shader modules are destroyed before returning.
    ///
    /// A shader file that cannot be loaded only logs a warning here; the
    /// missing stage then fails the build.
    ///
    /// # Errors
    ///
    /// Returns an error if a stage is missing or any object creation fails.
    pub fn new(device: Arc<dyn GpuDevice>, desc: &PipelineDesc<'_>) -> RhiResult<Self> {
        let cache = PipelineCache::new(device.clone())?;
        let layout = PipelineLayout::new(device.clone(), &[desc.set_layout.handle()])?;

        let vertex_shader =
            ShaderModule::load(device.clone(), &desc.shaders.vertex, ShaderStage::Vertex);
        let fragment_shader =
            ShaderModule::load(device.clone(), &desc.shaders.fragment, ShaderStage::Fragment);

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(vertex_shader.as_ref())
            .fragment_shader(fragment_shader.as_ref())
            .vertex_binding(desc.vertex_binding)
            .vertex_attributes(desc.vertex_attributes)
            .topology(PrimitiveTopology::TriangleList)
            .polygon_mode(PolygonMode::Fill)
            .cull_mode(CullMode::None)
            .front_face(FrontFace::CounterClockwise)
            .line_width(1.0)
            .rasterization_samples(desc.samples)
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(CompareOp::LessOrEqual)
            .render_pass(desc.render_pass, 0)
            .cache(&cache)
            .build(device, &layout)?;

        drop(vertex_shader);
        drop(fragment_shader);

        info!("Triangle pipeline ready ({:?})", desc.samples);

        Ok(Self {
            pipeline,
            cache,
            layout,
        })
    }

    #[inline]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }

    #[inline]
    pub fn cache(&self) -> vk::PipelineCache {
        self.cache.handle()
    }
}

