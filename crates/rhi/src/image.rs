//! Device-local attachment images (depth buffer, MSAA color target).
//!
//! Memory comes from the device's gpu-allocator instance.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth formats in order of preference.
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Picks the first depth format usable as an optimally tiled depth attachment.
///
/// # Errors
///
/// Returns [`RhiError::InvalidHandle`] if none of the candidates is supported.
pub fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<vk::Format> {
    DEPTH_FORMAT_CANDIDATES
        .into_iter()
        .find(|&format| {
            let props =
                unsafe { instance.get_physical_device_format_properties(physical_device, format) };
            props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| RhiError::InvalidHandle("no supported depth format".to_string()))
}

/// A 2D image plus view used only as a render pass attachment.
pub struct AttachmentImage {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl AttachmentImage {
    /// Creates a depth attachment.
    ///
    /// # Errors
    ///
    /// See [`AttachmentImage::new`].
    pub fn depth(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        Self::new(
            device,
            "depth_attachment",
            extent,
            format,
            samples,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
        )
    }

    /// Creates a transient multisampled color attachment.
    ///
    /// # Errors
    ///
    /// See [`AttachmentImage::new`].
    pub fn msaa_color(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        Self::new(
            device,
            "msaa_color_attachment",
            extent,
            format,
            samples,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
        )
    }

    /// Creates an image with GPU-only memory and a matching view.
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is empty or any Vulkan or allocator call fails.
    /// Partially created objects are released.
    pub fn new(
        device: Arc<Device>,
        name: &'static str,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "{name}: extent must be non-zero"
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        // From here on `attachment` owns what exists so far; early returns drop it.
        let mut attachment = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: None,
            format,
            extent,
        };

        let requirements = unsafe {
            attachment
                .device
                .handle()
                .get_image_memory_requirements(image)
        };
        let allocation = attachment.device.allocator()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        let (memory, offset) = unsafe { (allocation.memory(), allocation.offset()) };
        attachment.allocation = Some(allocation);

        unsafe {
            attachment
                .device
                .handle()
                .bind_image_memory(image, memory, offset)?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .level_count(1)
                    .layer_count(1),
            );
        attachment.view = unsafe { attachment.device.handle().create_image_view(&view_info, None)? };

        info!(
            "Created {}: {}x{} {:?} {:?}",
            name, extent.width, extent.height, format, samples
        );
        Ok(attachment)
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for AttachmentImage {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free attachment allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking attachment allocation: {}", e),
            }
        }

        debug!(
            "Destroyed attachment image {}x{}",
            self.extent.width, self.extent.height
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_candidates_are_depth_formats() {
        for format in DEPTH_FORMAT_CANDIDATES {
            assert!(matches!(
                format,
                vk::Format::D32_SFLOAT | vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
            ));
        }
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_attachment_image_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AttachmentImage>();
    }
}
