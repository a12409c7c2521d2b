//! A [`GpuDevice`] that records calls instead of talking to a driver.
//!
//! Handles are fresh non-null integers, mapped memory is backed by host
//! byte arrays, and every call is appended to an ordered log. Tests use it
//! to check creation and destruction order, descriptor writes, pipeline
//! state and the bytes written into uniform ranges.
//!
//! Enabled for this crate's own tests and, for dependents, through the
//! `mock` feature.

use std::collections::{HashMap, HashSet};
use std::ffi::CStr;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk::{self, Handle};

use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;

/// Granularity the mock pads buffer memory requirements to.
pub const MOCK_REQUIREMENT_ALIGNMENT: vk::DeviceSize = 1024;

/// Fixed-function and shader state captured from a `vkCreateGraphicsPipelines` call.
#[derive(Debug, Clone)]
pub struct PipelineSnapshot {
    pub stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule, String)>,
    pub vertex_bindings: Vec<(u32, u32, vk::VertexInputRate)>,
    /// `(location, binding, format, offset)`
    pub vertex_attributes: Vec<(u32, u32, vk::Format, u32)>,
    pub topology: vk::PrimitiveTopology,
    pub viewport_count: u32,
    pub scissor_count: u32,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub line_width: f32,
    pub samples: vk::SampleCountFlags,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare: vk::CompareOp,
    /// `(blend_enable, write_mask)` per color attachment
    pub blend_attachments: Vec<(bool, vk::ColorComponentFlags)>,
    pub dynamic_states: Vec<vk::DynamicState>,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

/// One recorded device call.
#[derive(Debug, Clone)]
pub enum Call {
    CreateBuffer {
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    },
    DestroyBuffer(vk::Buffer),
    AllocateMemory {
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
        type_index: u32,
    },
    FreeMemory(vk::DeviceMemory),
    BindBufferMemory {
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    },
    MapMemory {
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    },
    UnmapMemory(vk::DeviceMemory),
    FlushMappedRanges(Vec<(vk::DeviceMemory, vk::DeviceSize, vk::DeviceSize)>),
    CreateDescriptorPool {
        pool: vk::DescriptorPool,
        max_sets: u32,
        flags: vk::DescriptorPoolCreateFlags,
        pool_sizes: Vec<(vk::DescriptorType, u32)>,
    },
    DestroyDescriptorPool(vk::DescriptorPool),
    CreateDescriptorSetLayout {
        layout: vk::DescriptorSetLayout,
        /// `(binding, type, count, stages)`
        bindings: Vec<(u32, vk::DescriptorType, u32, vk::ShaderStageFlags)>,
    },
    DestroyDescriptorSetLayout(vk::DescriptorSetLayout),
    AllocateDescriptorSets {
        pool: vk::DescriptorPool,
        sets: Vec<vk::DescriptorSet>,
    },
    UpdateDescriptorSet {
        set: vk::DescriptorSet,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        buffer_infos: Vec<(vk::Buffer, vk::DeviceSize, vk::DeviceSize)>,
    },
    CreatePipelineCache(vk::PipelineCache),
    DestroyPipelineCache(vk::PipelineCache),
    CreatePipelineLayout {
        layout: vk::PipelineLayout,
        set_layouts: Vec<vk::DescriptorSetLayout>,
    },
    DestroyPipelineLayout(vk::PipelineLayout),
    CreateShaderModule {
        module: vk::ShaderModule,
        code_size: usize,
    },
    DestroyShaderModule(vk::ShaderModule),
    CreateGraphicsPipeline {
        pipeline: vk::Pipeline,
        cache: vk::PipelineCache,
        state: Box<PipelineSnapshot>,
    },
    DestroyPipeline(vk::Pipeline),
    BeginRenderPass {
        cmd: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_color: Option<[f32; 4]>,
        clear_depth: Option<(f32, u32)>,
        clear_value_count: u32,
    },
    EndRenderPass(vk::CommandBuffer),
    SetViewport(vk::CommandBuffer, Vec<vk::Viewport>),
    SetScissor(vk::CommandBuffer, Vec<vk::Rect2D>),
    BindPipeline(vk::CommandBuffer, vk::PipelineBindPoint, vk::Pipeline),
    BindDescriptorSets {
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    BindVertexBuffers {
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: Vec<vk::Buffer>,
        offsets: Vec<vk::DeviceSize>,
    },
    Draw {
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
}

impl Call {
    /// Short name of the Vulkan entry point, for order assertions.
    pub fn name(&self) -> &'static str {
        match self {
            Call::CreateBuffer { .. } => "create_buffer",
            Call::DestroyBuffer(_) => "destroy_buffer",
            Call::AllocateMemory { .. } => "allocate_memory",
            Call::FreeMemory(_) => "free_memory",
            Call::BindBufferMemory { .. } => "bind_buffer_memory",
            Call::MapMemory { .. } => "map_memory",
            Call::UnmapMemory(_) => "unmap_memory",
            Call::FlushMappedRanges(_) => "flush_mapped_memory_ranges",
            Call::CreateDescriptorPool { .. } => "create_descriptor_pool",
            Call::DestroyDescriptorPool(_) => "destroy_descriptor_pool",
            Call::CreateDescriptorSetLayout { .. } => "create_descriptor_set_layout",
            Call::DestroyDescriptorSetLayout(_) => "destroy_descriptor_set_layout",
            Call::AllocateDescriptorSets { .. } => "allocate_descriptor_sets",
            Call::UpdateDescriptorSet { .. } => "update_descriptor_sets",
            Call::CreatePipelineCache(_) => "create_pipeline_cache",
            Call::DestroyPipelineCache(_) => "destroy_pipeline_cache",
            Call::CreatePipelineLayout { .. } => "create_pipeline_layout",
            Call::DestroyPipelineLayout(_) => "destroy_pipeline_layout",
            Call::CreateShaderModule { .. } => "create_shader_module",
            Call::DestroyShaderModule(_) => "destroy_shader_module",
            Call::CreateGraphicsPipeline { .. } => "create_graphics_pipeline",
            Call::DestroyPipeline(_) => "destroy_pipeline",
            Call::BeginRenderPass { .. } => "cmd_begin_render_pass",
            Call::EndRenderPass(_) => "cmd_end_render_pass",
            Call::SetViewport(..) => "cmd_set_viewport",
            Call::SetScissor(..) => "cmd_set_scissor",
            Call::BindPipeline(..) => "cmd_bind_pipeline",
            Call::BindDescriptorSets { .. } => "cmd_bind_descriptor_sets",
            Call::BindVertexBuffers { .. } => "cmd_bind_vertex_buffers",
            Call::Draw { .. } => "cmd_draw",
        }
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    live: HashSet<u64>,
    memory: HashMap<u64, Box<[u8]>>,
    mapped: HashSet<u64>,
    /// Remaining set capacity per descriptor pool.
    pool_capacity: HashMap<u64, u32>,
    buffer_sizes: HashMap<u64, vk::DeviceSize>,
    fail_on: Option<&'static str>,
}

/// Recording implementation of [`GpuDevice`].
pub struct RecordingDevice {
    state: Mutex<State>,
    next_handle: AtomicU64,
    memory_type_bits: u32,
}

impl RecordingDevice {
    /// A device on which every call succeeds.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_state(State::default(), u32::MAX))
    }

    /// A device whose first call named `operation` (see [`Call::name`]) fails
    /// with `ERROR_OUT_OF_DEVICE_MEMORY`, or `ERROR_INITIALIZATION_FAILED`
    /// for pipeline and shader creation.
    pub fn failing_on(operation: &'static str) -> Arc<Self> {
        let state = State {
            fail_on: Some(operation),
            ..State::default()
        };
        Arc::new(Self::with_state(state, u32::MAX))
    }

    /// A device whose buffers only accept the memory types in `bits`.
    pub fn with_memory_type_bits(bits: u32) -> Arc<Self> {
        Arc::new(Self::with_state(State::default(), bits))
    }

    fn with_state(state: State, memory_type_bits: u32) -> Self {
        Self {
            state: Mutex::new(state),
            next_handle: AtomicU64::new(0x1000),
            memory_type_bits,
        }
    }

    /// Snapshot of every call so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Names of every call so far, in order.
    pub fn call_names(&self) -> Vec<&'static str> {
        self.lock().calls.iter().map(Call::name).collect()
    }

    /// Drops the call log, keeping object state.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of created objects not yet destroyed (descriptor sets excluded).
    pub fn live_objects(&self) -> usize {
        self.lock().live.len()
    }

    /// Host copy of a memory object's contents.
    pub fn memory_contents(&self, memory: vk::DeviceMemory) -> Option<Vec<u8>> {
        self.lock()
            .memory
            .get(&memory.as_raw())
            .map(|bytes| bytes.to_vec())
    }

    /// Whether `memory` is currently mapped.
    pub fn is_mapped(&self, memory: vk::DeviceMemory) -> bool {
        self.lock().mapped.contains(&memory.as_raw())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test must not cascade into every later assertion.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fresh<H: Handle>(&self, state: &mut State) -> H {
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        state.live.insert(raw);
        H::from_raw(raw)
    }

    fn check(&self, state: &mut State, operation: &'static str) -> RhiResult<()> {
        if state.fail_on == Some(operation) {
            state.fail_on = None;
            let code = match operation {
                "create_shader_module" | "create_graphics_pipeline" => {
                    vk::Result::ERROR_INITIALIZATION_FAILED
                }
                _ => vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            };
            return Err(RhiError::VulkanError(code));
        }
        Ok(())
    }

    fn retire<H: Handle>(state: &mut State, handle: H, what: &str) {
        let raw = handle.as_raw();
        assert!(
            state.live.remove(&raw),
            "{what} {raw:#x} destroyed twice or never created"
        );
    }
}

/// Views `len` elements at `ptr`, treating null or zero length as empty.
///
/// # Safety
///
/// A non-null `ptr` must point to `len` initialized elements that outlive `'a`.
unsafe fn slice<'a, T>(ptr: *const T, len: u32) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        unsafe { std::slice::from_raw_parts(ptr, len as usize) }
    }
}

fn snapshot(info: &vk::GraphicsPipelineCreateInfo<'_>) -> PipelineSnapshot {
    // SAFETY: the create info and everything it points to is borrowed for this call.
    unsafe {
        let stages = slice(info.p_stages, info.stage_count)
            .iter()
            .map(|stage| {
                let entry = if stage.p_name.is_null() {
                    String::new()
                } else {
                    CStr::from_ptr(stage.p_name).to_string_lossy().into_owned()
                };
                (stage.stage, stage.module, entry)
            })
            .collect();

        let vertex_input = info.p_vertex_input_state.as_ref();
        let vertex_bindings = vertex_input
            .map(|vi| {
                slice(
                    vi.p_vertex_binding_descriptions,
                    vi.vertex_binding_description_count,
                )
                .iter()
                .map(|b| (b.binding, b.stride, b.input_rate))
                .collect()
            })
            .unwrap_or_default();
        let vertex_attributes = vertex_input
            .map(|vi| {
                slice(
                    vi.p_vertex_attribute_descriptions,
                    vi.vertex_attribute_description_count,
                )
                .iter()
                .map(|a| (a.location, a.binding, a.format, a.offset))
                .collect()
            })
            .unwrap_or_default();

        let input_assembly = info.p_input_assembly_state.as_ref().copied().unwrap_or_default();
        let viewport = info.p_viewport_state.as_ref().copied().unwrap_or_default();
        let raster = info.p_rasterization_state.as_ref().copied().unwrap_or_default();
        let multisample = info.p_multisample_state.as_ref().copied().unwrap_or_default();
        let depth = info.p_depth_stencil_state.as_ref().copied().unwrap_or_default();

        let blend_attachments = info
            .p_color_blend_state
            .as_ref()
            .map(|cb| {
                slice(cb.p_attachments, cb.attachment_count)
                    .iter()
                    .map(|a| (a.blend_enable == vk::TRUE, a.color_write_mask))
                    .collect()
            })
            .unwrap_or_default();

        let dynamic_states = info
            .p_dynamic_state
            .as_ref()
            .map(|d| slice(d.p_dynamic_states, d.dynamic_state_count).to_vec())
            .unwrap_or_default();

        PipelineSnapshot {
            stages,
            vertex_bindings,
            vertex_attributes,
            topology: input_assembly.topology,
            viewport_count: viewport.viewport_count,
            scissor_count: viewport.scissor_count,
            polygon_mode: raster.polygon_mode,
            cull_mode: raster.cull_mode,
            front_face: raster.front_face,
            line_width: raster.line_width,
            samples: multisample.rasterization_samples,
            depth_test: depth.depth_test_enable == vk::TRUE,
            depth_write: depth.depth_write_enable == vk::TRUE,
            depth_compare: depth.depth_compare_op,
            blend_attachments,
            dynamic_states,
            layout: info.layout,
            render_pass: info.render_pass,
            subpass: info.subpass,
        }
    }
}

impl GpuDevice for RecordingDevice {
    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> RhiResult<vk::Buffer> {
        let mut state = self.lock();
        self.check(&mut state, "create_buffer")?;
        let buffer: vk::Buffer = self.fresh(&mut state);
        state.buffer_sizes.insert(buffer.as_raw(), info.size);
        state.calls.push(Call::CreateBuffer {
            buffer,
            size: info.size,
            usage: info.usage,
        });
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        let mut state = self.lock();
        Self::retire(&mut state, buffer, "buffer");
        state.buffer_sizes.remove(&buffer.as_raw());
        state.calls.push(Call::DestroyBuffer(buffer));
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let state = self.lock();
        let size = state.buffer_sizes.get(&buffer.as_raw()).copied().unwrap_or(0);
        vk::MemoryRequirements {
            size: size.div_ceil(MOCK_REQUIREMENT_ALIGNMENT) * MOCK_REQUIREMENT_ALIGNMENT,
            alignment: MOCK_REQUIREMENT_ALIGNMENT,
            memory_type_bits: self.memory_type_bits,
        }
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> RhiResult<vk::DeviceMemory> {
        let mut state = self.lock();
        self.check(&mut state, "allocate_memory")?;
        let memory: vk::DeviceMemory = self.fresh(&mut state);
        state.memory.insert(
            memory.as_raw(),
            vec![0u8; info.allocation_size as usize].into_boxed_slice(),
        );
        state.calls.push(Call::AllocateMemory {
            memory,
            size: info.allocation_size,
            type_index: info.memory_type_index,
        });
        Ok(memory)
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.lock();
        Self::retire(&mut state, memory, "memory");
        state.memory.remove(&memory.as_raw());
        state.mapped.remove(&memory.as_raw());
        state.calls.push(Call::FreeMemory(memory));
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> RhiResult<()> {
        let mut state = self.lock();
        self.check(&mut state, "bind_buffer_memory")?;
        state.calls.push(Call::BindBufferMemory {
            buffer,
            memory,
            offset,
        });
        Ok(())
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> RhiResult<NonNull<u8>> {
        let mut state = self.lock();
        self.check(&mut state, "map_memory")?;
        let raw = memory.as_raw();
        if !state.mapped.insert(raw) {
            return Err(RhiError::VulkanError(vk::Result::ERROR_MEMORY_MAP_FAILED));
        }
        let Some(bytes) = state.memory.get_mut(&raw) else {
            return Err(RhiError::InvalidHandle(format!("memory {raw:#x}")));
        };
        let len = bytes.len() as vk::DeviceSize;
        let end = if size == vk::WHOLE_SIZE { len } else { offset + size };
        if offset > len || end > len {
            return Err(RhiError::VulkanError(vk::Result::ERROR_MEMORY_MAP_FAILED));
        }
        // SAFETY: offset is within the boxed slice, which is never reallocated.
        let ptr = unsafe { bytes.as_mut_ptr().add(offset as usize) };
        state.calls.push(Call::MapMemory {
            memory,
            offset,
            size,
        });
        NonNull::new(ptr).ok_or_else(|| RhiError::InvalidHandle("null mapping".to_string()))
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.lock();
        state.mapped.remove(&memory.as_raw());
        state.calls.push(Call::UnmapMemory(memory));
    }

    fn flush_mapped_memory_ranges(&self, ranges: &[vk::MappedMemoryRange<'_>]) -> RhiResult<()> {
        let mut state = self.lock();
        self.check(&mut state, "flush_mapped_memory_ranges")?;
        state.calls.push(Call::FlushMappedRanges(
            ranges.iter().map(|r| (r.memory, r.offset, r.size)).collect(),
        ));
        Ok(())
    }

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> RhiResult<vk::DescriptorPool> {
        let mut state = self.lock();
        self.check(&mut state, "create_descriptor_pool")?;
        let pool: vk::DescriptorPool = self.fresh(&mut state);
        state.pool_capacity.insert(pool.as_raw(), info.max_sets);
        // SAFETY: pool sizes are borrowed for the call.
        let pool_sizes = unsafe { slice(info.p_pool_sizes, info.pool_size_count) }
            .iter()
            .map(|s| (s.ty, s.descriptor_count))
            .collect();
        state.calls.push(Call::CreateDescriptorPool {
            pool,
            max_sets: info.max_sets,
            flags: info.flags,
            pool_sizes,
        });
        Ok(pool)
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.lock();
        Self::retire(&mut state, pool, "descriptor pool");
        state.pool_capacity.remove(&pool.as_raw());
        state.calls.push(Call::DestroyDescriptorPool(pool));
    }

    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> RhiResult<vk::DescriptorSetLayout> {
        let mut state = self.lock();
        self.check(&mut state, "create_descriptor_set_layout")?;
        let layout: vk::DescriptorSetLayout = self.fresh(&mut state);
        // SAFETY: bindings are borrowed for the call.
        let bindings = unsafe { slice(info.p_bindings, info.binding_count) }
            .iter()
            .map(|b| (b.binding, b.descriptor_type, b.descriptor_count, b.stage_flags))
            .collect();
        state
            .calls
            .push(Call::CreateDescriptorSetLayout { layout, bindings });
        Ok(layout)
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        let mut state = self.lock();
        Self::retire(&mut state, layout, "descriptor set layout");
        state.calls.push(Call::DestroyDescriptorSetLayout(layout));
    }

    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let mut state = self.lock();
        self.check(&mut state, "allocate_descriptor_sets")?;
        let requested = info.descriptor_set_count;
        let remaining = state
            .pool_capacity
            .get_mut(&info.descriptor_pool.as_raw())
            .ok_or_else(|| RhiError::InvalidHandle("unknown descriptor pool".to_string()))?;
        if *remaining < requested {
            return Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_POOL_MEMORY));
        }
        *remaining -= requested;

        let sets: Vec<vk::DescriptorSet> = (0..requested)
            .map(|_| {
                let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
                vk::DescriptorSet::from_raw(raw)
            })
            .collect();
        state.calls.push(Call::AllocateDescriptorSets {
            pool: info.descriptor_pool,
            sets: sets.clone(),
        });
        Ok(sets)
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        let mut state = self.lock();
        for write in writes {
            // SAFETY: buffer infos are borrowed for the call.
            let buffer_infos = unsafe { slice(write.p_buffer_info, write.descriptor_count) }
                .iter()
                .map(|b| (b.buffer, b.offset, b.range))
                .collect();
            state.calls.push(Call::UpdateDescriptorSet {
                set: write.dst_set,
                binding: write.dst_binding,
                descriptor_type: write.descriptor_type,
                buffer_infos,
            });
        }
    }

    fn create_pipeline_cache(
        &self,
        _info: &vk::PipelineCacheCreateInfo<'_>,
    ) -> RhiResult<vk::PipelineCache> {
        let mut state = self.lock();
        self.check(&mut state, "create_pipeline_cache")?;
        let cache: vk::PipelineCache = self.fresh(&mut state);
        state.calls.push(Call::CreatePipelineCache(cache));
        Ok(cache)
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        let mut state = self.lock();
        Self::retire(&mut state, cache, "pipeline cache");
        state.calls.push(Call::DestroyPipelineCache(cache));
    }

    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> RhiResult<vk::PipelineLayout> {
        let mut state = self.lock();
        self.check(&mut state, "create_pipeline_layout")?;
        let layout: vk::PipelineLayout = self.fresh(&mut state);
        // SAFETY: set layouts are borrowed for the call.
        let set_layouts = unsafe { slice(info.p_set_layouts, info.set_layout_count) }.to_vec();
        state.calls.push(Call::CreatePipelineLayout {
            layout,
            set_layouts,
        });
        Ok(layout)
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        let mut state = self.lock();
        Self::retire(&mut state, layout, "pipeline layout");
        state.calls.push(Call::DestroyPipelineLayout(layout));
    }

    fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> RhiResult<vk::ShaderModule> {
        let mut state = self.lock();
        self.check(&mut state, "create_shader_module")?;
        let module: vk::ShaderModule = self.fresh(&mut state);
        state.calls.push(Call::CreateShaderModule {
            module,
            code_size: info.code_size,
        });
        Ok(module)
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        let mut state = self.lock();
        Self::retire(&mut state, module, "shader module");
        state.calls.push(Call::DestroyShaderModule(module));
    }

    fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> RhiResult<vk::Pipeline> {
        let mut state = self.lock();
        self.check(&mut state, "create_graphics_pipeline")?;
        let pipeline: vk::Pipeline = self.fresh(&mut state);
        state.calls.push(Call::CreateGraphicsPipeline {
            pipeline,
            cache,
            state: Box::new(snapshot(info)),
        });
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        let mut state = self.lock();
        Self::retire(&mut state, pipeline, "pipeline");
        state.calls.push(Call::DestroyPipeline(pipeline));
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
        _contents: vk::SubpassContents,
    ) {
        // SAFETY: clear values are borrowed for the call; the union members
        // read match the attachment order color, depth.
        let clear_values = unsafe { slice(info.p_clear_values, info.clear_value_count) };
        let clear_color = clear_values.first().map(|v| unsafe { v.color.float32 });
        let clear_depth = clear_values.get(1).map(|v| unsafe {
            (v.depth_stencil.depth, v.depth_stencil.stencil)
        });

        self.lock().calls.push(Call::BeginRenderPass {
            cmd,
            render_pass: info.render_pass,
            framebuffer: info.framebuffer,
            render_area: info.render_area,
            clear_color,
            clear_depth,
            clear_value_count: info.clear_value_count,
        });
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.lock().calls.push(Call::EndRenderPass(cmd));
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewports: &[vk::Viewport]) {
        self.lock()
            .calls
            .push(Call::SetViewport(cmd, viewports.to_vec()));
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissors: &[vk::Rect2D]) {
        self.lock()
            .calls
            .push(Call::SetScissor(cmd, scissors.to_vec()));
    }

    fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        self.lock()
            .calls
            .push(Call::BindPipeline(cmd, bind_point, pipeline));
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        _bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.lock().calls.push(Call::BindDescriptorSets {
            cmd,
            layout,
            first_set,
            sets: sets.to_vec(),
        });
    }

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        self.lock().calls.push(Call::BindVertexBuffers {
            cmd,
            first_binding,
            buffers: buffers.to_vec(),
            offsets: offsets.to_vec(),
        });
    }

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        self.lock().calls.push(Call::Draw {
            cmd,
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_are_unique_and_tracked() {
        let device = RecordingDevice::new();
        let info = vk::BufferCreateInfo::default()
            .size(64)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER);

        let a = device.create_buffer(&info).unwrap();
        let b = device.create_buffer(&info).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, vk::Buffer::null());
        assert_eq!(device.live_objects(), 2);

        device.destroy_buffer(a);
        device.destroy_buffer(b);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    #[should_panic(expected = "destroyed twice")]
    fn test_double_destroy_panics() {
        let device = RecordingDevice::new();
        let buffer = device
            .create_buffer(&vk::BufferCreateInfo::default().size(4))
            .unwrap();
        device.destroy_buffer(buffer);
        device.destroy_buffer(buffer);
    }

    #[test]
    fn test_failing_on_fails_once() {
        let device = RecordingDevice::failing_on("create_buffer");
        let info = vk::BufferCreateInfo::default().size(4);
        assert!(device.create_buffer(&info).is_err());
        assert!(device.create_buffer(&info).is_ok());
    }

    #[test]
    fn test_requirements_are_padded() {
        let device = RecordingDevice::new();
        let buffer = device
            .create_buffer(&vk::BufferCreateInfo::default().size(768))
            .unwrap();
        let requirements = device.buffer_memory_requirements(buffer);
        assert_eq!(requirements.size, MOCK_REQUIREMENT_ALIGNMENT);
    }

    #[test]
    fn test_mapped_memory_is_observable() {
        let device = RecordingDevice::new();
        let memory = device
            .allocate_memory(&vk::MemoryAllocateInfo::default().allocation_size(16))
            .unwrap();

        let ptr = device.map_memory(memory, 4, vk::WHOLE_SIZE).unwrap();
        unsafe { ptr.as_ptr().write(0xAB) };
        assert!(device.is_mapped(memory));
        assert!(device.map_memory(memory, 0, 4).is_err());

        device.unmap_memory(memory);
        assert_eq!(device.memory_contents(memory).unwrap()[4], 0xAB);
    }

    #[test]
    fn test_pool_capacity_is_enforced() {
        let device = RecordingDevice::new();
        let pool = device
            .create_descriptor_pool(&vk::DescriptorPoolCreateInfo::default().max_sets(1))
            .unwrap();
        let layouts = [vk::DescriptorSetLayout::from_raw(1)];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        assert!(device.allocate_descriptor_sets(&info).is_ok());
        assert!(matches!(
            device.allocate_descriptor_sets(&info),
            Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_POOL_MEMORY))
        ));
    }
}
