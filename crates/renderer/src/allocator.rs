//! The single host-visible allocation behind the triangle.
//!
//! One buffer, bound at offset 0 to one memory object, holds the vertex
//! block followed by one uniform block per frame slot:
//!
//! ```text
//! 0                      vertex_aligned            + uniform_aligned     ...
//! | vertices (60 bytes)  | slot 0 transform (64)   | slot 1 transform   | ...
//! ```
//!
//! Every block starts on a multiple of the device's
//! `minUniformBufferOffsetAlignment`. The memory stays mapped from
//! creation to drop so the per-frame transform upload cannot fail on a map.

use std::sync::Arc;

use ash::vk;
use glam::{Mat4, Vec2, Vec3};
use tracing::{debug, info};

use triangle_rhi::buffer::{Buffer, DeviceMemory};
use triangle_rhi::vertex::ColorVertex;
use triangle_rhi::{GpuDevice, RhiError, RhiResult};

use crate::frame_slots::FrameSlots;
use crate::ubo::TransformUbo;

/// The triangle: red top, green bottom-left, blue bottom-right.
pub const TRIANGLE_VERTICES: [ColorVertex; 3] = [
    ColorVertex::new(Vec2::new(0.0, 0.5), Vec3::new(1.0, 0.0, 0.0)),
    ColorVertex::new(Vec2::new(-0.5, -0.5), Vec3::new(0.0, 1.0, 0.0)),
    ColorVertex::new(Vec2::new(0.5, -0.5), Vec3::new(0.0, 0.0, 1.0)),
];

/// Bytes of vertex data at the start of the buffer.
pub const VERTEX_DATA_SIZE: vk::DeviceSize = std::mem::size_of::<[ColorVertex; 3]>() as vk::DeviceSize;

/// Bytes of uniform data per frame slot.
pub const UNIFORM_DATA_SIZE: vk::DeviceSize = TransformUbo::SIZE as vk::DeviceSize;

/// Rounds `value` up to a multiple of `alignment`, which must be a power of two.
#[inline]
pub const fn align(value: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Byte layout of the shared allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationLayout {
    pub vertex_aligned_size: vk::DeviceSize,
    pub uniform_aligned_size: vk::DeviceSize,
    pub frame_count: usize,
}

impl AllocationLayout {
    /// Lays out `frame_count` uniform blocks after the vertex block.
    ///
    /// A zero alignment is treated as 1.
    pub fn new(
        vertex_size: vk::DeviceSize,
        uniform_size: vk::DeviceSize,
        min_alignment: vk::DeviceSize,
        frame_count: usize,
    ) -> Self {
        let alignment = min_alignment.max(1);
        debug_assert!(alignment.is_power_of_two());
        Self {
            vertex_aligned_size: align(vertex_size, alignment),
            uniform_aligned_size: align(uniform_size, alignment),
            frame_count,
        }
    }

    /// Byte offset of `slot`'s uniform block.
    #[inline]
    pub fn uniform_offset(&self, slot: usize) -> vk::DeviceSize {
        self.vertex_aligned_size + slot as vk::DeviceSize * self.uniform_aligned_size
    }

    /// Size of the buffer covering the vertex block and every uniform block.
    #[inline]
    pub fn total_size(&self) -> vk::DeviceSize {
        self.uniform_offset(self.frame_count)
    }
}

/// Picks a host-visible memory type, preferring one that is also host-coherent.
///
/// Returns the type index and that type's property flags.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableMemoryType`] if no allowed type is host-visible.
pub fn select_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
) -> RhiResult<(u32, vk::MemoryPropertyFlags)> {
    let preferred = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    let required = vk::MemoryPropertyFlags::HOST_VISIBLE;

    let index = triangle_rhi::buffer::find_memory_type(props, type_bits, preferred)
        .or_else(|| triangle_rhi::buffer::find_memory_type(props, type_bits, required))
        .ok_or(RhiError::NoSuitableMemoryType(required, type_bits))?;

    Ok((index, props.memory_types[index as usize].property_flags))
}

/// The buffer/memory pair shared by the vertex block and the frame slots.
///
/// Dropping it unmaps and frees the memory, then destroys the buffer.
pub struct GpuAllocation {
    layout: AllocationLayout,
    uniform_buffer_infos: FrameSlots<vk::DescriptorBufferInfo>,
    memory: DeviceMemory,
    buffer: Buffer,
}

impl GpuAllocation {
    /// Creates, binds and maps the allocation, then writes the triangle
    /// vertices and an identity transform into every frame slot.
    ///
    /// # Errors
    ///
    /// Fails if `frame_count` is out of range, no host-visible memory type
    /// fits, or any buffer, allocation, bind or map call fails. Objects
    /// created before the failure are released.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        min_alignment: vk::DeviceSize,
        frame_count: usize,
    ) -> RhiResult<Self> {
        FrameSlots::<()>::check_count(frame_count)?;
        let layout = AllocationLayout::new(
            VERTEX_DATA_SIZE,
            UNIFORM_DATA_SIZE,
            min_alignment,
            frame_count,
        );

        let buffer = Buffer::new(
            device.clone(),
            layout.total_size(),
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::UNIFORM_BUFFER,
        )?;

        let requirements = buffer.memory_requirements();
        let (type_index, property_flags) =
            select_memory_type(memory_properties, requirements.memory_type_bits)?;

        let mut memory =
            DeviceMemory::allocate(device, requirements.size, type_index, property_flags)?;
        memory.bind_buffer(&buffer, 0)?;
        memory.map()?;

        memory.write(0, bytemuck::cast_slice(&TRIANGLE_VERTICES))?;

        let identity = TransformUbo::default();
        let uniform_buffer_infos = FrameSlots::try_from_fn(frame_count, |slot| {
            let offset = layout.uniform_offset(slot);
            memory.write(offset, identity.as_bytes())?;
            debug!(
                "Frame slot {}: uniform range {}..{}",
                slot,
                offset,
                offset + layout.uniform_aligned_size
            );
            Ok(vk::DescriptorBufferInfo::default()
                .buffer(buffer.handle())
                .offset(offset)
                .range(layout.uniform_aligned_size))
        })?;
        memory.flush()?;

        info!(
            "Shared allocation: {} bytes requested, {} allocated, {} frame slot(s), {}",
            layout.total_size(),
            requirements.size,
            frame_count,
            if memory.is_coherent() {
                "host-coherent"
            } else {
                "flushed explicitly"
            }
        );

        Ok(Self {
            layout,
            uniform_buffer_infos,
            memory,
            buffer,
        })
    }

    /// Overwrites `slot`'s uniform block with `transform`.
    ///
    /// # Errors
    ///
    /// Returns an error if `slot` is not a frame slot of this allocation or
    /// the flush of non-coherent memory fails.
    pub fn write_transform(&self, slot: usize, transform: &Mat4) -> RhiResult<()> {
        if slot >= self.layout.frame_count {
            return Err(RhiError::InvalidHandle(format!(
                "frame slot {} of {}",
                slot, self.layout.frame_count
            )));
        }
        let ubo = TransformUbo::new(*transform);
        self.memory
            .write(self.layout.uniform_offset(slot), ubo.as_bytes())?;
        self.memory.flush()
    }

    #[inline]
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    #[inline]
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory.handle()
    }

    /// Offset of the vertex block inside [`buffer`](Self::buffer).
    #[inline]
    pub fn vertex_offset(&self) -> vk::DeviceSize {
        0
    }

    #[inline]
    pub fn layout(&self) -> &AllocationLayout {
        &self.layout
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.layout.frame_count
    }

    /// `(buffer, offset, range)` of every frame slot's uniform block.
    #[inline]
    pub fn uniform_buffer_infos(&self) -> &FrameSlots<vk::DescriptorBufferInfo> {
        &self.uniform_buffer_infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triangle_rhi::mock::{Call, RecordingDevice};

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        for (i, &property_flags) in flags.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags,
                heap_index: 0,
            };
        }
        props.memory_type_count = flags.len() as u32;
        props
    }

    fn host_coherent() -> vk::PhysicalDeviceMemoryProperties {
        memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ])
    }

    #[test]
    fn test_align() {
        assert_eq!(align(0, 256), 0);
        assert_eq!(align(1, 256), 256);
        assert_eq!(align(60, 256), 256);
        assert_eq!(align(256, 256), 256);
        assert_eq!(align(257, 256), 512);
        assert_eq!(align(60, 1), 60);
        assert_eq!(align(60, 64), 64);
    }

    #[test]
    fn test_align_properties() {
        for shift in 0..10 {
            let a = 1u64 << shift;
            for v in 0..600 {
                let aligned = align(v, a);
                assert!(aligned >= v);
                assert_eq!(aligned % a, 0);
                assert!(aligned - v < a);
                assert_eq!(align(aligned, a), aligned);
            }
        }
    }

    #[test]
    fn test_vertex_and_uniform_sizes() {
        assert_eq!(VERTEX_DATA_SIZE, 60);
        assert_eq!(UNIFORM_DATA_SIZE, 64);
    }

    #[test]
    fn test_layout_two_frames_256() {
        let layout = AllocationLayout::new(60, 64, 256, 2);
        assert_eq!(layout.vertex_aligned_size, 256);
        assert_eq!(layout.uniform_aligned_size, 256);
        assert_eq!(layout.uniform_offset(0), 256);
        assert_eq!(layout.uniform_offset(1), 512);
        assert_eq!(layout.total_size(), 768);
    }

    #[test]
    fn test_layout_zero_alignment_is_tight() {
        let layout = AllocationLayout::new(60, 64, 0, 3);
        assert_eq!(layout.uniform_offset(0), 60);
        assert_eq!(layout.uniform_offset(2), 188);
        assert_eq!(layout.total_size(), 252);
    }

    #[test]
    fn test_select_prefers_coherent() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let (index, flags) = select_memory_type(&props, u32::MAX).unwrap();
        assert_eq!(index, 2);
        assert!(flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
    }

    #[test]
    fn test_select_falls_back_to_host_visible() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        // Type 1 is not allowed for this buffer.
        let (index, flags) = select_memory_type(&props, 0b01).unwrap();
        assert_eq!(index, 0);
        assert!(!flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
    }

    #[test]
    fn test_new_honors_buffer_memory_type_bits() {
        let device = RecordingDevice::with_memory_type_bits(0b01);
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let allocation = GpuAllocation::new(device.clone(), &props, 256, 2).unwrap();

        assert!(device.calls().iter().any(|c| matches!(
            c,
            Call::AllocateMemory { type_index: 0, .. }
        )));
        // The initial writes land in non-coherent memory.
        assert!(device.call_names().contains(&"flush_mapped_memory_ranges"));
        assert!(device.is_mapped(allocation.memory()));
    }

    #[test]
    fn test_select_without_host_visible_fails() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert!(matches!(
            select_memory_type(&props, u32::MAX),
            Err(RhiError::NoSuitableMemoryType(_, u32::MAX))
        ));
    }

    #[test]
    fn test_new_creates_binds_and_maps() {
        let device = RecordingDevice::new();
        let allocation = GpuAllocation::new(device.clone(), &host_coherent(), 256, 2).unwrap();

        let calls = device.calls();
        assert!(matches!(
            calls[0],
            Call::CreateBuffer { size: 768, usage, .. }
                if usage == vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::UNIFORM_BUFFER
        ));
        // Requirements are padded by the device; the allocation follows them.
        assert!(matches!(
            calls[1],
            Call::AllocateMemory { size: 1024, type_index: 1, .. }
        ));
        assert!(matches!(calls[2], Call::BindBufferMemory { offset: 0, .. }));
        assert!(matches!(calls[3], Call::MapMemory { offset: 0, size: vk::WHOLE_SIZE, .. }));
        // Coherent memory is never flushed.
        assert!(!device.call_names().contains(&"flush_mapped_memory_ranges"));
        assert!(device.is_mapped(allocation.memory()));
    }

    #[test]
    fn test_initial_contents() {
        let device = RecordingDevice::new();
        let allocation = GpuAllocation::new(device.clone(), &host_coherent(), 256, 2).unwrap();
        let bytes = device.memory_contents(allocation.memory()).unwrap();

        assert_eq!(&bytes[..60], bytemuck::cast_slice::<_, u8>(&TRIANGLE_VERTICES));
        let identity = TransformUbo::default();
        assert_eq!(&bytes[256..320], identity.as_bytes());
        assert_eq!(&bytes[512..576], identity.as_bytes());
        // Padding between blocks is untouched.
        assert!(bytes[60..256].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_uniform_buffer_infos() {
        let device = RecordingDevice::new();
        let allocation = GpuAllocation::new(device, &host_coherent(), 256, 3).unwrap();
        let infos = allocation.uniform_buffer_infos();

        assert_eq!(infos.len(), 3);
        for (slot, info) in infos.iter().enumerate() {
            assert_eq!(info.buffer, allocation.buffer());
            assert_eq!(info.offset, 256 * (slot as u64 + 1));
            assert_eq!(info.range, 256);
        }
    }

    #[test]
    fn test_write_transform_targets_slot() {
        let device = RecordingDevice::new();
        let allocation = GpuAllocation::new(device.clone(), &host_coherent(), 256, 2).unwrap();
        let transform = Mat4::from_scale(Vec3::splat(2.0));

        allocation.write_transform(1, &transform).unwrap();

        let bytes = device.memory_contents(allocation.memory()).unwrap();
        assert_eq!(&bytes[512..576], bytemuck::bytes_of(&transform));
        assert_eq!(&bytes[256..320], TransformUbo::default().as_bytes());
        assert!(allocation.write_transform(2, &transform).is_err());
    }

    #[test]
    fn test_non_coherent_memory_is_flushed() {
        let device = RecordingDevice::new();
        let props = memory_properties(&[vk::MemoryPropertyFlags::HOST_VISIBLE]);
        let allocation = GpuAllocation::new(device.clone(), &props, 64, 1).unwrap();
        device.clear_calls();

        allocation.write_transform(0, &Mat4::IDENTITY).unwrap();

        let calls = device.calls();
        assert_eq!(calls.len(), 1);
        assert!(matches!(
            &calls[0],
            Call::FlushMappedRanges(ranges)
                if ranges == &[(allocation.memory(), 0, vk::WHOLE_SIZE)]
        ));
    }

    #[test]
    fn test_rejects_frame_count_out_of_range() {
        let device = RecordingDevice::new();
        assert!(matches!(
            GpuAllocation::new(device.clone(), &host_coherent(), 256, 4),
            Err(RhiError::FrameCountOutOfRange { requested: 4, max: 3 })
        ));
        assert!(GpuAllocation::new(device.clone(), &host_coherent(), 256, 0).is_err());
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_failed_allocation_releases_buffer() {
        let device = RecordingDevice::failing_on("allocate_memory");
        assert!(GpuAllocation::new(device.clone(), &host_coherent(), 256, 2).is_err());
        assert_eq!(device.call_names(), vec!["create_buffer", "destroy_buffer"]);
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn test_failed_map_releases_memory_then_buffer() {
        let device = RecordingDevice::failing_on("map_memory");
        assert!(GpuAllocation::new(device.clone(), &host_coherent(), 256, 2).is_err());
        assert_eq!(
            device.call_names(),
            vec![
                "create_buffer",
                "allocate_memory",
                "bind_buffer_memory",
                "free_memory",
                "destroy_buffer"
            ]
        );
        assert_eq!(device.live_objects(), 0);
    }

    #[test]
    fn test_drop_order() {
        let device = RecordingDevice::new();
        let allocation = GpuAllocation::new(device.clone(), &host_coherent(), 256, 2).unwrap();
        device.clear_calls();

        drop(allocation);

        assert_eq!(
            device.call_names(),
            vec!["unmap_memory", "free_memory", "destroy_buffer"]
        );
        assert_eq!(device.live_objects(), 0);
    }
}
