//! The device surface the renderer core records against.
//!
//! [`GpuDevice`] lists the Vulkan entry points the triangle core needs:
//! buffer and memory management, descriptors, pipeline objects and the
//! handful of `vkCmd*` calls issued per frame. The ash-backed [`Device`]
//! implements it directly; tests substitute a recording implementation
//! (see the `mock` feature).
//!
//! Handles passed to these methods must have been created by the same
//! device and must not be in use by the GPU when destroyed.

use std::ffi::c_void;
use std::ptr::NonNull;

use ash::vk;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan device operations used by the renderer core.
pub trait GpuDevice: Send + Sync {
    // Buffers and memory

    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> RhiResult<vk::Buffer>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> RhiResult<vk::DeviceMemory>;
    fn free_memory(&self, memory: vk::DeviceMemory);
    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> RhiResult<()>;
    /// Maps `size` bytes of `memory` starting at `offset` into host address space.
    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> RhiResult<NonNull<u8>>;
    fn unmap_memory(&self, memory: vk::DeviceMemory);
    fn flush_mapped_memory_ranges(&self, ranges: &[vk::MappedMemoryRange<'_>]) -> RhiResult<()>;

    // Descriptors

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> RhiResult<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> RhiResult<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> RhiResult<Vec<vk::DescriptorSet>>;
    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]);

    // Pipelines

    fn create_pipeline_cache(
        &self,
        info: &vk::PipelineCacheCreateInfo<'_>,
    ) -> RhiResult<vk::PipelineCache>;
    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache);
    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> RhiResult<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> RhiResult<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> RhiResult<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // Command recording

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
        contents: vk::SubpassContents,
    );
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewports: &[vk::Viewport]);
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissors: &[vk::Rect2D]);
    fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    );
    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );
    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    );
    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );
}

// SAFETY (all methods below): handles come from this device per the module
// contract; create-info structs are borrowed for the duration of the call.
impl GpuDevice for Device {
    fn create_buffer(&self, info: &vk::BufferCreateInfo<'_>) -> RhiResult<vk::Buffer> {
        Ok(unsafe { self.handle().create_buffer(info, None)? })
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.handle().destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.handle().get_buffer_memory_requirements(buffer) }
    }

    fn allocate_memory(&self, info: &vk::MemoryAllocateInfo<'_>) -> RhiResult<vk::DeviceMemory> {
        Ok(unsafe { self.handle().allocate_memory(info, None)? })
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.handle().free_memory(memory, None) }
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
    ) -> RhiResult<()> {
        unsafe { self.handle().bind_buffer_memory(buffer, memory, offset)? };
        Ok(())
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> RhiResult<NonNull<u8>> {
        let ptr: *mut c_void = unsafe {
            self.handle()
                .map_memory(memory, offset, size, vk::MemoryMapFlags::empty())?
        };
        NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| RhiError::InvalidHandle("vkMapMemory returned null".to_string()))
    }

    fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.handle().unmap_memory(memory) }
    }

    fn flush_mapped_memory_ranges(&self, ranges: &[vk::MappedMemoryRange<'_>]) -> RhiResult<()> {
        unsafe { self.handle().flush_mapped_memory_ranges(ranges)? };
        Ok(())
    }

    fn create_descriptor_pool(
        &self,
        info: &vk::DescriptorPoolCreateInfo<'_>,
    ) -> RhiResult<vk::DescriptorPool> {
        Ok(unsafe { self.handle().create_descriptor_pool(info, None)? })
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.handle().destroy_descriptor_pool(pool, None) }
    }

    fn create_descriptor_set_layout(
        &self,
        info: &vk::DescriptorSetLayoutCreateInfo<'_>,
    ) -> RhiResult<vk::DescriptorSetLayout> {
        Ok(unsafe { self.handle().create_descriptor_set_layout(info, None)? })
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.handle().destroy_descriptor_set_layout(layout, None) }
    }

    fn allocate_descriptor_sets(
        &self,
        info: &vk::DescriptorSetAllocateInfo<'_>,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        Ok(unsafe { self.handle().allocate_descriptor_sets(info)? })
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet<'_>]) {
        unsafe { self.handle().update_descriptor_sets(writes, &[]) }
    }

    fn create_pipeline_cache(
        &self,
        info: &vk::PipelineCacheCreateInfo<'_>,
    ) -> RhiResult<vk::PipelineCache> {
        Ok(unsafe { self.handle().create_pipeline_cache(info, None)? })
    }

    fn destroy_pipeline_cache(&self, cache: vk::PipelineCache) {
        unsafe { self.handle().destroy_pipeline_cache(cache, None) }
    }

    fn create_pipeline_layout(
        &self,
        info: &vk::PipelineLayoutCreateInfo<'_>,
    ) -> RhiResult<vk::PipelineLayout> {
        Ok(unsafe { self.handle().create_pipeline_layout(info, None)? })
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.handle().destroy_pipeline_layout(layout, None) }
    }

    fn create_shader_module(
        &self,
        info: &vk::ShaderModuleCreateInfo<'_>,
    ) -> RhiResult<vk::ShaderModule> {
        Ok(unsafe { self.handle().create_shader_module(info, None)? })
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.handle().destroy_shader_module(module, None) }
    }

    fn create_graphics_pipeline(
        &self,
        cache: vk::PipelineCache,
        info: &vk::GraphicsPipelineCreateInfo<'_>,
    ) -> RhiResult<vk::Pipeline> {
        let pipelines = unsafe {
            self.handle()
                .create_graphics_pipelines(cache, std::slice::from_ref(info), None)
                .map_err(|(_, e)| e)?
        };
        pipelines.into_iter().next().ok_or_else(|| {
            RhiError::PipelineError("vkCreateGraphicsPipelines returned no pipeline".to_string())
        })
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.handle().destroy_pipeline(pipeline, None) }
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        info: &vk::RenderPassBeginInfo<'_>,
        contents: vk::SubpassContents,
    ) {
        unsafe { self.handle().cmd_begin_render_pass(cmd, info, contents) }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.handle().cmd_end_render_pass(cmd) }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewports: &[vk::Viewport]) {
        unsafe { self.handle().cmd_set_viewport(cmd, 0, viewports) }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissors: &[vk::Rect2D]) {
        unsafe { self.handle().cmd_set_scissor(cmd, 0, scissors) }
    }

    fn cmd_bind_pipeline(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        pipeline: vk::Pipeline,
    ) {
        unsafe { self.handle().cmd_bind_pipeline(cmd, bind_point, pipeline) }
    }

    fn cmd_bind_descriptor_sets(
        &self,
        cmd: vk::CommandBuffer,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.handle()
                .cmd_bind_descriptor_sets(cmd, bind_point, layout, first_set, sets, &[])
        }
    }

    fn cmd_bind_vertex_buffers(
        &self,
        cmd: vk::CommandBuffer,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe {
            self.handle()
                .cmd_bind_vertex_buffers(cmd, first_binding, buffers, offsets)
        }
    }

    fn cmd_draw(
        &self,
        cmd: vk::CommandBuffer,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.handle()
                .cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance)
        }
    }
}
