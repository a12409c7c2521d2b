//! Buffers and raw device memory.
//!
//! [`Buffer`] owns a `VkBuffer`; [`DeviceMemory`] owns a single
//! `VkDeviceMemory` block that one or more buffers bind into and that can
//! stay mapped for its whole lifetime. Both release their handle on drop,
//! so a struct holding the memory before the buffer tears down in the
//! order unmap, free, destroy.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use triangle_rhi::buffer::{Buffer, DeviceMemory, find_memory_type};
//! use triangle_rhi::gpu::GpuDevice;
//!
//! # fn example(
//! #     device: Arc<dyn GpuDevice>,
//! #     props: &vk::PhysicalDeviceMemoryProperties,
//! # ) -> Result<(), triangle_rhi::RhiError> {
//! let buffer = Buffer::new(device.clone(), 256, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
//! let requirements = buffer.memory_requirements();
//! let flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
//! let type_index = find_memory_type(props, requirements.memory_type_bits, flags)
//!     .ok_or(triangle_rhi::RhiError::NoSuitableMemoryType(flags, requirements.memory_type_bits))?;
//!
//! let mut memory = DeviceMemory::allocate(device, requirements.size, type_index, flags)?;
//! memory.bind_buffer(&buffer, 0)?;
//! memory.map()?;
//! memory.write(0, &[0u8; 64])?;
//! memory.flush()?;
//! # Ok(())
//! # }
//! ```

use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;

/// A `VkBuffer` without memory of its own.
pub struct Buffer {
    device: Arc<dyn GpuDevice>,
    handle: vk::Buffer,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
}

impl Buffer {
    /// Creates an exclusive-sharing buffer of `size` bytes.
    pub fn new(
        device: Arc<dyn GpuDevice>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> RhiResult<Self> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = device.create_buffer(&create_info)?;
        debug!("Created buffer: {} bytes, usage {:?}", size, usage);

        Ok(Self {
            device,
            handle,
            size,
            usage,
        })
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Returns the size requested at creation.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Queries the driver's size, alignment and memory-type requirements.
    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        self.device.buffer_memory_requirements(self.handle)
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        self.device.destroy_buffer(self.handle);
        debug!("Destroyed buffer");
    }
}

/// Finds the first memory type allowed by `type_bits` whose property flags
/// contain all of `required`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = (props.memory_type_count as usize).min(props.memory_types.len());
    props.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(i, memory_type)| {
            type_bits & (1 << i) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(i, _)| i as u32)
}

/// A single device memory allocation, optionally persistently mapped.
pub struct DeviceMemory {
    device: Arc<dyn GpuDevice>,
    handle: vk::DeviceMemory,
    size: vk::DeviceSize,
    type_index: u32,
    property_flags: vk::MemoryPropertyFlags,
    mapped: Option<NonNull<u8>>,
}

// SAFETY: the mapped pointer is only dereferenced through `&self`/`&mut self`
// methods and stays valid until `unmap` or drop.
unsafe impl Send for DeviceMemory {}

impl DeviceMemory {
    /// Allocates `size` bytes from memory type `type_index`.
    ///
    /// `property_flags` are the flags of that memory type; they decide
    /// whether [`flush`](Self::flush) has any work to do.
    pub fn allocate(
        device: Arc<dyn GpuDevice>,
        size: vk::DeviceSize,
        type_index: u32,
        property_flags: vk::MemoryPropertyFlags,
    ) -> RhiResult<Self> {
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(type_index);

        let handle = device.allocate_memory(&allocate_info)?;
        debug!(
            "Allocated {} bytes of device memory (type {}, {:?})",
            size, type_index, property_flags
        );

        Ok(Self {
            device,
            handle,
            size,
            type_index,
            property_flags,
            mapped: None,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DeviceMemory {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn type_index(&self) -> u32 {
        self.type_index
    }

    /// Returns true if host writes are visible without an explicit flush.
    #[inline]
    pub fn is_coherent(&self) -> bool {
        self.property_flags
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Binds `buffer` at byte `offset` of this allocation.
    pub fn bind_buffer(&self, buffer: &Buffer, offset: vk::DeviceSize) -> RhiResult<()> {
        self.device
            .bind_buffer_memory(buffer.handle(), self.handle, offset)
    }

    /// Maps the whole allocation. Mapping an already mapped block is a no-op.
    pub fn map(&mut self) -> RhiResult<()> {
        if self.mapped.is_none() {
            let ptr = self.device.map_memory(self.handle, 0, vk::WHOLE_SIZE)?;
            self.mapped = Some(ptr);
        }
        Ok(())
    }

    pub fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            self.device.unmap_memory(self.handle);
        }
    }

    /// Copies `bytes` into the mapped range at `offset`.
    pub fn write(&self, offset: vk::DeviceSize, bytes: &[u8]) -> RhiResult<()> {
        let Some(ptr) = self.mapped else {
            return Err(RhiError::InvalidHandle(
                "write to unmapped device memory".to_string(),
            ));
        };

        let end = offset.checked_add(bytes.len() as vk::DeviceSize);
        if end.is_none_or(|end| end > self.size) {
            return Err(RhiError::InvalidHandle(format!(
                "write of {} bytes at offset {} exceeds {} byte allocation",
                bytes.len(),
                offset,
                self.size
            )));
        }

        // SAFETY: the range was bounds-checked against the mapped allocation
        // and host memory never overlaps the source slice.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                ptr.as_ptr().add(offset as usize),
                bytes.len(),
            );
        }
        Ok(())
    }

    /// Flushes the whole mapped range when the memory is not host-coherent.
    pub fn flush(&self) -> RhiResult<()> {
        if self.is_coherent() || self.mapped.is_none() {
            return Ok(());
        }
        let range = vk::MappedMemoryRange::default()
            .memory(self.handle)
            .offset(0)
            .size(vk::WHOLE_SIZE);
        self.device.flush_mapped_memory_ranges(&[range])
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        self.unmap();
        self.device.free_memory(self.handle);
        debug!("Freed device memory");
    }
}
