//! Descriptor set layouts, pools and uniform-buffer writes.
//!
//! - [`DescriptorSetLayout`] describes the bindings a shader reads
//! - [`DescriptorPool`] hands out sets of a fixed total capacity
//! - [`write_uniform_buffer`] points a set's binding at a buffer range
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use triangle_rhi::descriptor::{self, DescriptorPool, DescriptorSetLayout};
//! use triangle_rhi::gpu::GpuDevice;
//!
//! # fn example(device: Arc<dyn GpuDevice>, buffer: vk::Buffer) -> Result<(), triangle_rhi::RhiError> {
//! let binding = descriptor::uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX);
//! let layout = DescriptorSetLayout::new(device.clone(), &[binding])?;
//!
//! let pool_size = vk::DescriptorPoolSize::default()
//!     .ty(vk::DescriptorType::UNIFORM_BUFFER)
//!     .descriptor_count(2);
//! let pool = DescriptorPool::new(device.clone(), 2, &[pool_size])?;
//!
//! let sets = pool.allocate(&[layout.handle(); 2])?;
//! descriptor::write_uniform_buffer(device.as_ref(), sets[0], 0, buffer, 0, 64);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::error::RhiResult;
use crate::gpu::GpuDevice;

/// Descriptor set layout wrapper.
///
/// Immutable after creation and destroyed on drop.
pub struct DescriptorSetLayout {
    device: Arc<dyn GpuDevice>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a layout from `bindings`.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = device.create_descriptor_set_layout(&create_info)?;

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.device.destroy_descriptor_set_layout(self.layout);
        debug!("Destroyed descriptor set layout");
    }
}

/// Descriptor pool with a fixed number of sets.
///
/// Sets are never freed individually; they are reclaimed when the pool is
/// destroyed.
pub struct DescriptorPool {
    device: Arc<dyn GpuDevice>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a pool able to hold `max_sets` sets drawing from `pool_sizes`.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = device.create_descriptor_pool(&create_info)?;

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Allocates one set per entry in `layouts`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails (e.g., pool exhausted).
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = self.device.allocate_descriptor_sets(&alloc_info)?;

        debug!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    /// Returns the Vulkan descriptor pool handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.pool);
        debug!("Destroyed descriptor pool");
    }
}

/// A single uniform buffer binding visible to `stage_flags`.
#[inline]
pub fn uniform_buffer_binding(
    binding: u32,
    stage_flags: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(stage_flags)
}

/// Creates a buffer info for descriptor set updates.
#[inline]
pub fn buffer_info(
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)
}

/// Points `binding` of `set` at `range` bytes of `buffer` starting at `offset`.
pub fn write_uniform_buffer(
    device: &dyn GpuDevice,
    set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) {
    let buffer_infos = [buffer_info(buffer, offset, range)];
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(&buffer_infos);

    device.update_descriptor_sets(&[write]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{Call, RecordingDevice};

    #[test]
    fn test_uniform_buffer_binding() {
        let binding = uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_buffer_info_helper() {
        let info = buffer_info(vk::Buffer::null(), 64, 128);
        assert_eq!(info.buffer, vk::Buffer::null());
        assert_eq!(info.offset, 64);
        assert_eq!(info.range, 128);
    }

    #[test]
    fn test_pool_is_created_without_free_flag() {
        let recorder = RecordingDevice::new();
        let pool_size = vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(3);
        let pool = DescriptorPool::new(recorder.clone(), 3, &[pool_size]).unwrap();
        assert_eq!(pool.max_sets(), 3);

        match &recorder.calls()[0] {
            Call::CreateDescriptorPool {
                max_sets,
                flags,
                pool_sizes,
                ..
            } => {
                assert_eq!(*max_sets, 3);
                assert!(flags.is_empty());
                assert_eq!(pool_sizes, &[(vk::DescriptorType::UNIFORM_BUFFER, 3)]);
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn test_write_uniform_buffer_records_range() {
        let recorder = RecordingDevice::new();
        let layout = DescriptorSetLayout::new(
            recorder.clone(),
            &[uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX)],
        )
        .unwrap();
        let pool_size = vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1);
        let pool = DescriptorPool::new(recorder.clone(), 1, &[pool_size]).unwrap();
        let sets = pool.allocate(&[layout.handle()]).unwrap();

        let buffer = vk::Buffer::null();
        write_uniform_buffer(recorder.as_ref(), sets[0], 0, buffer, 256, 64);

        let update = recorder.calls().into_iter().find_map(|call| match call {
            Call::UpdateDescriptorSet {
                set,
                binding,
                descriptor_type,
                buffer_infos,
            } => Some((set, binding, descriptor_type, buffer_infos)),
            _ => None,
        });
        assert_eq!(
            update,
            Some((
                sets[0],
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                vec![(buffer, 256, 64)]
            ))
        );
    }

    #[test]
    fn test_layout_and_pool_are_destroyed() {
        let recorder = RecordingDevice::new();
        {
            let _layout = DescriptorSetLayout::new(
                recorder.clone(),
                &[uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX)],
            )
            .unwrap();
            let _pool = DescriptorPool::new(recorder.clone(), 1, &[]).unwrap();
        }
        assert_eq!(recorder.live_objects(), 0);
    }
}
