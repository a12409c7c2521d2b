//! Descriptor sets binding each frame slot's uniform block to the vertex stage.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use triangle_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, uniform_buffer_binding, write_uniform_buffer,
};
use triangle_rhi::{GpuDevice, RhiResult};

use crate::allocator::GpuAllocation;
use crate::frame_slots::FrameSlots;

/// Binding of the transform uniform in set 0.
pub const TRANSFORM_BINDING: u32 = 0;

/// Pool, layout and one descriptor set per frame slot.
///
/// Dropping it destroys the set layout, then the pool (which frees the sets).
pub struct DescriptorBundle {
    sets: FrameSlots<vk::DescriptorSet>,
    set_layout: DescriptorSetLayout,
    pool: DescriptorPool,
}

impl DescriptorBundle {
    /// Builds one set per frame slot of `allocation`, each pointing at that
    /// slot's uniform block.
    ///
    /// The pool holds exactly that many sets and uniform-buffer descriptors.
    ///
    /// # Errors
    ///
    /// Returns an error if pool, layout or set creation fails.
    pub fn new(device: Arc<dyn GpuDevice>, allocation: &GpuAllocation) -> RhiResult<Self> {
        let infos = allocation.uniform_buffer_infos();
        let frame_count = infos.len() as u32;

        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(frame_count)];
        let pool = DescriptorPool::new(device.clone(), frame_count, &pool_sizes)?;

        let bindings = [uniform_buffer_binding(
            TRANSFORM_BINDING,
            vk::ShaderStageFlags::VERTEX,
        )];
        let set_layout = DescriptorSetLayout::new(device.clone(), &bindings)?;

        let layouts = vec![set_layout.handle(); infos.len()];
        let sets = FrameSlots::from_vec(pool.allocate(&layouts)?)?;

        for (set, info) in sets.iter().zip(infos) {
            write_uniform_buffer(
                device.as_ref(),
                *set,
                TRANSFORM_BINDING,
                info.buffer,
                info.offset,
                info.range,
            );
        }

        info!("Descriptor sets ready for {} frame slot(s)", sets.len());

        Ok(Self {
            sets,
            set_layout,
            pool,
        })
    }

    /// The set bound for `slot`.
    #[inline]
    pub fn set(&self, slot: usize) -> vk::DescriptorSet {
        self.sets[slot]
    }

    #[inline]
    pub fn sets(&self) -> &FrameSlots<vk::DescriptorSet> {
        &self.sets
    }

    #[inline]
    pub fn set_layout(&self) -> &DescriptorSetLayout {
        &self.set_layout
    }

    #[inline]
    pub fn pool(&self) -> vk::DescriptorPool {
        self.pool.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triangle_rhi::mock::{Call, RecordingDevice};

    fn allocation(device: &Arc<RecordingDevice>, frame_count: usize) -> GpuAllocation {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        props.memory_types[0].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_type_count = 1;
        GpuAllocation::new(device.clone(), &props, 256, frame_count).unwrap()
    }

    #[test]
    fn test_pool_is_sized_exactly() {
        let device = RecordingDevice::new();
        let allocation = allocation(&device, 2);
        device.clear_calls();

        let _bundle = DescriptorBundle::new(device.clone(), &allocation).unwrap();

        let pool_call = device
            .calls()
            .into_iter()
            .find(|c| matches!(c, Call::CreateDescriptorPool { .. }))
            .unwrap();
        let Call::CreateDescriptorPool {
            max_sets,
            flags,
            pool_sizes,
            ..
        } = pool_call
        else {
            unreachable!()
        };
        assert_eq!(max_sets, 2);
        assert_eq!(flags, vk::DescriptorPoolCreateFlags::empty());
        assert_eq!(pool_sizes, vec![(vk::DescriptorType::UNIFORM_BUFFER, 2)]);
    }

    #[test]
    fn test_layout_is_one_vertex_uniform() {
        let device = RecordingDevice::new();
        let allocation = allocation(&device, 1);
        let _bundle = DescriptorBundle::new(device.clone(), &allocation).unwrap();

        let bindings = device
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::CreateDescriptorSetLayout { bindings, .. } => Some(bindings),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            bindings,
            vec![(
                0,
                vk::DescriptorType::UNIFORM_BUFFER,
                1,
                vk::ShaderStageFlags::VERTEX
            )]
        );
    }

    #[test]
    fn test_each_set_points_at_its_slot() {
        let device = RecordingDevice::new();
        let allocation = allocation(&device, 3);
        let bundle = DescriptorBundle::new(device.clone(), &allocation).unwrap();
        assert_eq!(bundle.sets().len(), 3);

        let writes: Vec<_> = device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::UpdateDescriptorSet {
                    set,
                    binding,
                    descriptor_type,
                    buffer_infos,
                } => Some((set, binding, descriptor_type, buffer_infos)),
                _ => None,
            })
            .collect();
        assert_eq!(writes.len(), 3);

        for (slot, (set, binding, ty, infos)) in writes.into_iter().enumerate() {
            assert_eq!(set, bundle.set(slot));
            assert_eq!(binding, TRANSFORM_BINDING);
            assert_eq!(ty, vk::DescriptorType::UNIFORM_BUFFER);
            assert_eq!(
                infos,
                vec![(allocation.buffer(), 256 * (slot as u64 + 1), 256)]
            );
        }
    }

    #[test]
    fn test_sets_are_distinct() {
        let device = RecordingDevice::new();
        let allocation = allocation(&device, 3);
        let bundle = DescriptorBundle::new(device, &allocation).unwrap();
        let sets = bundle.sets().as_slice();
        assert_ne!(sets[0], sets[1]);
        assert_ne!(sets[1], sets[2]);
        assert_ne!(sets[0], sets[2]);
    }

    #[test]
    fn test_failed_layout_releases_pool() {
        let device = RecordingDevice::failing_on("create_descriptor_set_layout");
        let allocation = allocation(&device, 2);
        device.clear_calls();

        assert!(DescriptorBundle::new(device.clone(), &allocation).is_err());
        assert_eq!(
            device.call_names(),
            vec!["create_descriptor_pool", "destroy_descriptor_pool"]
        );
    }

    #[test]
    fn test_drop_order() {
        let device = RecordingDevice::new();
        let allocation = allocation(&device, 2);
        let bundle = DescriptorBundle::new(device.clone(), &allocation).unwrap();
        device.clear_calls();

        drop(bundle);

        assert_eq!(
            device.call_names(),
            vec!["destroy_descriptor_set_layout", "destroy_descriptor_pool"]
        );
    }
}
