//! The boundary between the presentation layer and the renderer core.
//!
//! The presentation layer owns the window, swapchain, render pass and
//! command buffers. It exposes them through [`FrameHost`] and drives a
//! [`FrameLifecycle`] implementation through its hooks:
//!
//! ```text
//! on_init_resources        once, after the device and render pass exist
//! on_swapchain_resized     after every swapchain (re)creation
//! on_frame                 once per presented frame, inside a begun command buffer
//! on_release_resources     before the device goes away
//! ```

use std::sync::Arc;

use ash::vk;
use triangle_rhi::{GpuDevice, RhiResult};

/// What the presentation layer provides to the renderer core.
pub trait FrameHost {
    /// Device used for resource creation and command recording.
    fn device(&self) -> Arc<dyn GpuDevice>;

    /// `VkPhysicalDeviceLimits::minUniformBufferOffsetAlignment`.
    fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize;

    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties;

    /// Maximum number of frames recorded but not yet consumed by the GPU.
    fn concurrent_frame_count(&self) -> usize;

    /// Sample count of the render pass's color and depth attachments.
    fn sample_count(&self) -> vk::SampleCountFlags;

    fn render_pass(&self) -> vk::RenderPass;

    /// Framebuffer of the swapchain image being rendered this frame.
    fn current_framebuffer(&self) -> vk::Framebuffer;

    /// Command buffer in the recording state for this frame.
    fn current_command_buffer(&self) -> vk::CommandBuffer;

    /// Frame-in-flight index, `0..concurrent_frame_count()`.
    fn current_frame(&self) -> usize;

    fn swapchain_image_size(&self) -> vk::Extent2D;

    /// Recording for the current frame is finished; submit and present it.
    fn frame_ready(&mut self);

    /// Schedule another frame.
    fn request_update(&mut self);
}

/// Hooks the presentation layer calls on the renderer core.
pub trait FrameLifecycle {
    /// Creates every device resource the renderer needs.
    ///
    /// # Errors
    ///
    /// Any failure is fatal; resources created before the failure are released.
    fn on_init_resources(&mut self, host: &dyn FrameHost) -> RhiResult<()>;

    /// The swapchain was created or recreated with a new extent.
    fn on_swapchain_resized(&mut self, host: &dyn FrameHost);

    /// Records the current frame's commands and hands the frame back to the host.
    fn on_frame(&mut self, host: &mut dyn FrameHost);

    /// Releases every resource created by `on_init_resources`.
    ///
    /// The caller makes sure the GPU is no longer using them.
    fn on_release_resources(&mut self);
}
