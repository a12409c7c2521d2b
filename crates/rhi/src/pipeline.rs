//! Graphics pipeline objects.
//!
//! - [`PipelineCache`] wraps an in-memory `VkPipelineCache`
//! - [`PipelineLayout`] wraps `VkPipelineLayout`
//! - [`Pipeline`] wraps a graphics `VkPipeline`
//! - [`GraphicsPipelineBuilder`] collects fixed-function state and shader
//!   stages for a render-pass based pipeline
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use triangle_rhi::gpu::GpuDevice;
//! use triangle_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, PipelineCache, PipelineLayout};
//! use triangle_rhi::shader::ShaderModule;
//! use triangle_rhi::vertex::ColorVertex;
//!
//! # fn example(
//! #     device: Arc<dyn GpuDevice>,
//! #     vs: &ShaderModule,
//! #     fs: &ShaderModule,
//! #     render_pass: vk::RenderPass,
//! # ) -> Result<(), triangle_rhi::RhiError> {
//! let cache = PipelineCache::new(device.clone())?;
//! let layout = PipelineLayout::new(device.clone(), &[])?;
//!
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(vs)
//!     .fragment_shader(fs)
//!     .vertex_binding(ColorVertex::binding_description())
//!     .vertex_attributes(&ColorVertex::attribute_descriptions())
//!     .cull_mode(CullMode::None)
//!     .render_pass(render_pass, 0)
//!     .cache(&cache)
//!     .build(device, &layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;
use crate::shader::ShaderModule;

/// In-memory pipeline cache. Never serialized.
pub struct PipelineCache {
    device: Arc<dyn GpuDevice>,
    cache: vk::PipelineCache,
}

impl PipelineCache {
    /// Creates an empty cache.
    pub fn new(device: Arc<dyn GpuDevice>) -> RhiResult<Self> {
        let create_info = vk::PipelineCacheCreateInfo::default();
        let cache = device.create_pipeline_cache(&create_info)?;
        debug!("Created pipeline cache");
        Ok(Self { device, cache })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineCache {
        self.cache
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        self.device.destroy_pipeline_cache(self.cache);
        debug!("Pipeline cache destroyed");
    }
}

/// Vulkan pipeline layout wrapper.
///
/// Immutable after creation; destroyed on drop.
pub struct PipelineLayout {
    device: Arc<dyn GpuDevice>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a pipeline layout over `descriptor_set_layouts`, without push
    /// constants.
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Self> {
        let create_info =
            vk::PipelineLayoutCreateInfo::default().set_layouts(descriptor_set_layouts);

        let layout = device.create_pipeline_layout(&create_info)?;

        debug!(
            "Created pipeline layout with {} descriptor set layout(s)",
            descriptor_set_layouts.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        self.device.destroy_pipeline_layout(self.layout);
        debug!("Pipeline layout destroyed");
    }
}

/// Graphics pipeline wrapper.
pub struct Pipeline {
    device: Arc<dyn GpuDevice>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Returns the Vulkan pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        vk::PipelineBindPoint::GRAPHICS
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.device.destroy_pipeline(self.pipeline);
        info!("Graphics pipeline destroyed");
    }
}

/// Primitive topology for input assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

impl PrimitiveTopology {
    /// Converts to Vulkan primitive topology.
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

/// Polygon rasterization mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

impl PolygonMode {
    /// Converts to Vulkan polygon mode.
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
        }
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    /// Converts to Vulkan cull mode flags.
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Front face winding order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

impl FrontFace {
    /// Converts to Vulkan front face.
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Depth comparison operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    #[default]
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Always,
}

impl CompareOp {
    /// Converts to Vulkan compare op.
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Greater => vk::CompareOp::GREATER,
            CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Builder for render-pass based graphics pipelines.
///
/// Defaults:
///
/// - Primitive topology: Triangle list
/// - Polygon mode: Fill
/// - Cull mode: Back-face culling
/// - Front face: Counter-clockwise
/// - Depth test and write: Enabled, compare op Less
/// - Multisampling: 1 sample
/// - One color attachment, blending disabled, full RGBA write mask
/// - Dynamic states: Viewport and Scissor
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a ShaderModule>,
    fragment_shader: Option<&'a ShaderModule>,

    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,

    topology: PrimitiveTopology,

    polygon_mode: PolygonMode,
    cull_mode: CullMode,
    front_face: FrontFace,
    line_width: f32,

    rasterization_samples: vk::SampleCountFlags,

    depth_test_enable: bool,
    depth_write_enable: bool,
    depth_compare_op: CompareOp,

    color_attachment_count: u32,

    dynamic_states: Vec<vk::DynamicState>,

    render_pass: vk::RenderPass,
    subpass: u32,
    cache: vk::PipelineCache,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Creates a new graphics pipeline builder with default settings.
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,

            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),

            topology: PrimitiveTopology::TriangleList,

            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,
            line_width: 1.0,

            rasterization_samples: vk::SampleCountFlags::TYPE_1,

            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,

            color_attachment_count: 1,

            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],

            render_pass: vk::RenderPass::null(),
            subpass: 0,
            cache: vk::PipelineCache::null(),
        }
    }

    /// Sets the vertex stage. `None` leaves the stage missing, which makes
    /// [`build`](Self::build) fail.
    pub fn vertex_shader(mut self, shader: impl Into<Option<&'a ShaderModule>>) -> Self {
        self.vertex_shader = shader.into();
        self
    }

    /// Sets the fragment stage. `None` leaves the stage missing, which makes
    /// [`build`](Self::build) fail.
    pub fn fragment_shader(mut self, shader: impl Into<Option<&'a ShaderModule>>) -> Self {
        self.fragment_shader = shader.into();
        self
    }

    /// Adds a vertex input binding description.
    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    /// Adds vertex input attribute descriptions.
    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    pub fn polygon_mode(mut self, mode: PolygonMode) -> Self {
        self.polygon_mode = mode;
        self
    }

    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    pub fn front_face(mut self, face: FrontFace) -> Self {
        self.front_face = face;
        self
    }

    /// Sets the line width for line primitives.
    pub fn line_width(mut self, width: f32) -> Self {
        self.line_width = width;
        self
    }

    /// Sets the number of rasterization samples (MSAA).
    pub fn rasterization_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.rasterization_samples = samples;
        self
    }

    pub fn depth_test_enable(mut self, enable: bool) -> Self {
        self.depth_test_enable = enable;
        self
    }

    pub fn depth_write_enable(mut self, enable: bool) -> Self {
        self.depth_write_enable = enable;
        self
    }

    pub fn depth_compare_op(mut self, op: CompareOp) -> Self {
        self.depth_compare_op = op;
        self
    }

    /// Number of color attachments in the subpass, each opaque.
    pub fn color_attachment_count(mut self, count: u32) -> Self {
        self.color_attachment_count = count;
        self
    }

    /// Adds a dynamic state.
    pub fn dynamic_state(mut self, state: vk::DynamicState) -> Self {
        if !self.dynamic_states.contains(&state) {
            self.dynamic_states.push(state);
        }
        self
    }

    /// Render pass and subpass the pipeline is compatible with.
    pub fn render_pass(mut self, render_pass: vk::RenderPass, subpass: u32) -> Self {
        self.render_pass = render_pass;
        self.subpass = subpass;
        self
    }

    pub fn cache(mut self, cache: &PipelineCache) -> Self {
        self.cache = cache.handle();
        self
    }

    /// Builds the graphics pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vertex shader is not set
    /// - Fragment shader is not set
    /// - No render pass is set
    /// - Pipeline creation fails
    pub fn build(self, device: Arc<dyn GpuDevice>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_else(|| RhiError::PipelineError("Vertex shader is required".to_string()))?;

        let fragment_shader = self
            .fragment_shader
            .ok_or_else(|| RhiError::PipelineError("Fragment shader is required".to_string()))?;

        if self.render_pass == vk::RenderPass::null() {
            return Err(RhiError::PipelineError(
                "A render pass is required".to_string(),
            ));
        }

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology.to_vk())
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only the counts are baked in.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode.to_vk())
            .line_width(self.line_width)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(self.rasterization_samples);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test_enable)
            .depth_write_enable(self.depth_write_enable)
            .depth_compare_op(self.depth_compare_op.to_vk())
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = (0..self
            .color_attachment_count)
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect();

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(self.render_pass)
            .subpass(self.subpass);

        let pipeline = device.create_graphics_pipeline(self.cache, &pipeline_info)?;

        info!(
            "Graphics pipeline created ({:?}, {:?} samples)",
            self.topology, self.rasterization_samples
        );

        Ok(Pipeline { device, pipeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, RecordingDevice};
    use crate::shader::ShaderStage;
    use crate::vertex::ColorVertex;

    #[test]
    fn test_enum_conversions() {
        assert_eq!(
            PrimitiveTopology::TriangleList.to_vk(),
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
        assert_eq!(PolygonMode::Fill.to_vk(), vk::PolygonMode::FILL);
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(
            FrontFace::CounterClockwise.to_vk(),
            vk::FrontFace::COUNTER_CLOCKWISE
        );
        assert_eq!(
            CompareOp::LessOrEqual.to_vk(),
            vk::CompareOp::LESS_OR_EQUAL
        );
    }

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.topology, PrimitiveTopology::TriangleList);
        assert_eq!(builder.cull_mode, CullMode::Back);
        assert_eq!(builder.line_width, 1.0);
        assert_eq!(builder.rasterization_samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(
            builder.dynamic_states,
            vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }

    #[test]
    fn test_dynamic_state_is_not_duplicated() {
        let builder = GraphicsPipelineBuilder::new().dynamic_state(vk::DynamicState::VIEWPORT);
        assert_eq!(builder.dynamic_states.len(), 2);
    }

    #[test]
    fn test_missing_stage_is_a_pipeline_error() {
        let recorder = RecordingDevice::new();
        let layout = PipelineLayout::new(recorder.clone(), &[]).unwrap();
        let fs = ShaderModule::from_spirv_bytes(recorder.clone(), &[0u8; 4], ShaderStage::Fragment)
            .unwrap();

        let result = GraphicsPipelineBuilder::new()
            .vertex_shader(None::<&ShaderModule>)
            .fragment_shader(&fs)
            .render_pass(vk::RenderPass::null(), 0)
            .build(recorder.clone(), &layout);

        assert!(matches!(result, Err(RhiError::PipelineError(_))));
        assert!(!recorder
            .call_names()
            .contains(&"create_graphics_pipeline"));
    }

    #[test]
    fn test_build_passes_state_through() {
        use ash::vk::Handle;

        let recorder = RecordingDevice::new();
        let cache = PipelineCache::new(recorder.clone()).unwrap();
        let layout = PipelineLayout::new(recorder.clone(), &[]).unwrap();
        let vs = ShaderModule::from_spirv_bytes(recorder.clone(), &[0u8; 4], ShaderStage::Vertex)
            .unwrap();
        let fs = ShaderModule::from_spirv_bytes(recorder.clone(), &[0u8; 4], ShaderStage::Fragment)
            .unwrap();
        let render_pass = vk::RenderPass::from_raw(0xbeef);

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vs)
            .fragment_shader(&fs)
            .vertex_binding(ColorVertex::binding_description())
            .vertex_attributes(&ColorVertex::attribute_descriptions())
            .cull_mode(CullMode::None)
            .depth_compare_op(CompareOp::LessOrEqual)
            .rasterization_samples(vk::SampleCountFlags::TYPE_4)
            .render_pass(render_pass, 0)
            .cache(&cache)
            .build(recorder.clone(), &layout)
            .unwrap();

        let (cache_used, state) = recorder
            .calls()
            .into_iter()
            .find_map(|call| match call {
                Call::CreateGraphicsPipeline { cache, state, .. } => Some((cache, state)),
                _ => None,
            })
            .unwrap();

        assert_eq!(cache_used, cache.handle());
        assert_eq!(state.render_pass, render_pass);
        assert_eq!(state.layout, layout.handle());
        assert_eq!(state.stages.len(), 2);
        assert_eq!(state.stages[0].2, "main");
        assert_eq!(state.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(state.depth_compare, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(state.samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(state.vertex_bindings, vec![(0, 20, vk::VertexInputRate::VERTEX)]);
        assert_eq!(
            state.blend_attachments,
            vec![(false, vk::ColorComponentFlags::RGBA)]
        );

        drop(pipeline);
        assert!(recorder.call_names().ends_with(&["destroy_pipeline"]));
    }
}
