//! The windowed [`FrameHost`]: swapchain, render pass and frames in flight.
//!
//! [`WindowPresenter`] owns everything between the window and the renderer
//! core. Each call to [`WindowPresenter::render`] runs one frame:
//!
//! ```text
//! 1. Recreate the swapchain if a resize or out-of-date result is pending
//!    (then FrameLifecycle::on_swapchain_resized)
//! 2. Wait on the frame slot's fence
//! 3. Acquire a swapchain image (signals the slot's image-available semaphore)
//! 4. Reset the fence, begin the slot's command buffer
//! 5. FrameLifecycle::on_frame records into it and calls frame_ready()
//! 6. End and submit: wait image-available at COLOR_ATTACHMENT_OUTPUT,
//!    signal the image's render-finished semaphore and the slot's fence
//! 7. Present, then advance to the next frame slot
//! ```
//!
//! Render-finished semaphores are per swapchain image, not per frame slot,
//! because presentation may still hold one after the slot's fence signals.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use triangle_core::RenderConfig;
use triangle_platform::{Surface, Window};
use triangle_rhi::command::{CommandBuffer, CommandPool};
use triangle_rhi::device::Device;
use triangle_rhi::image::{AttachmentImage, find_depth_format};
use triangle_rhi::instance::Instance;
use triangle_rhi::physical_device::{PhysicalDeviceInfo, select_physical_device};
use triangle_rhi::render_pass::{Framebuffer, RenderPass};
use triangle_rhi::swapchain::Swapchain;
use triangle_rhi::sync::{Fence, Semaphore};
use triangle_rhi::{GpuDevice, RhiError, RhiResult};

use crate::frame_slots::FrameSlots;
use crate::lifecycle::{FrameHost, FrameLifecycle};

/// Per-frame-slot recording and synchronization objects.
struct FrameSync {
    command_buffer: CommandBuffer,
    image_available: Semaphore,
    in_flight: Fence,
}

impl FrameSync {
    fn new(device: &Arc<Device>, command_buffer: CommandBuffer) -> RhiResult<Self> {
        Ok(Self {
            command_buffer,
            image_available: Semaphore::new(device.clone())?,
            // Signaled so the first wait on this slot returns immediately
            in_flight: Fence::new(device.clone(), true)?,
        })
    }
}

/// Images and framebuffers that follow the swapchain extent.
struct SwapchainTargets {
    framebuffers: Vec<Framebuffer>,
    msaa_color: Option<AttachmentImage>,
    depth: AttachmentImage,
}

impl SwapchainTargets {
    fn new(
        device: &Arc<Device>,
        swapchain: &Swapchain,
        render_pass: &RenderPass,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let extent = swapchain.extent();
        let samples = render_pass.samples();

        let depth = AttachmentImage::depth(device.clone(), extent, depth_format, samples)?;
        let msaa_color = if render_pass.is_multisampled() {
            Some(AttachmentImage::msaa_color(
                device.clone(),
                extent,
                swapchain.format(),
                samples,
            )?)
        } else {
            None
        };

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                let attachments = match &msaa_color {
                    Some(color) => vec![color.view(), depth.view(), view],
                    None => vec![view, depth.view()],
                };
                Framebuffer::new(device.clone(), render_pass, &attachments, extent)
            })
            .collect::<RhiResult<Vec<_>>>()?;

        debug!(
            "Created {} framebuffer(s) at {}x{}",
            framebuffers.len(),
            extent.width,
            extent.height
        );

        Ok(Self {
            framebuffers,
            msaa_color,
            depth,
        })
    }
}

/// Window-backed implementation of [`FrameHost`].
pub struct WindowPresenter {
    frames: Vec<FrameSync>,
    render_finished: Vec<Semaphore>,
    targets: ManuallyDrop<SwapchainTargets>,
    render_pass: ManuallyDrop<RenderPass>,
    swapchain: ManuallyDrop<Swapchain>,
    command_pool: ManuallyDrop<CommandPool>,
    device: ManuallyDrop<Arc<Device>>,
    physical_device: PhysicalDeviceInfo,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,

    depth_format: vk::Format,
    requested_extent: vk::Extent2D,
    current_frame: usize,
    image_index: u32,
    needs_recreate: bool,
    frame_ready: bool,
    update_requested: bool,
}

impl WindowPresenter {
    /// Creates the instance, device, swapchain and per-frame objects for `window`.
    ///
    /// Validation layers are requested in debug builds. The sample count is
    /// the highest the device supports up to `config.sample_count`.
    ///
    /// # Errors
    ///
    /// Returns an error if no suitable GPU is found, `config.frames_in_flight`
    /// is out of range, or any Vulkan object creation fails.
    pub fn new(window: &Window, config: &RenderConfig) -> RhiResult<Self> {
        let frame_count = FrameSlots::<()>::check_count(config.frames_in_flight as usize)?;

        let display = window
            .raw_display_handle()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Instance::new(display, cfg!(debug_assertions))?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        let (width, height) = window.size();
        let requested_extent = vk::Extent2D { width, height };
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            requested_extent,
        )?;

        let samples = physical_device.usable_sample_count(config.sample_count);
        let depth_format = find_depth_format(instance.handle(), physical_device.device)?;
        let render_pass =
            RenderPass::new(device.clone(), swapchain.format(), depth_format, samples)?;
        let targets = SwapchainTargets::new(&device, &swapchain, &render_pass, depth_format)?;

        let graphics_family = device
            .queue_families()
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let frames = command_pool
            .allocate(frame_count as u32)?
            .into_iter()
            .map(|command_buffer| FrameSync::new(&device, command_buffer))
            .collect::<RhiResult<Vec<_>>>()?;

        let render_finished = Self::create_render_finished(&device, swapchain.image_count())?;

        info!(
            "Presenter ready: '{}', {} swapchain image(s), {} frame(s) in flight, {:?}",
            physical_device.device_name(),
            swapchain.image_count(),
            frame_count,
            samples
        );

        Ok(Self {
            frames,
            render_finished,
            targets: ManuallyDrop::new(targets),
            render_pass: ManuallyDrop::new(render_pass),
            swapchain: ManuallyDrop::new(swapchain),
            command_pool: ManuallyDrop::new(command_pool),
            device: ManuallyDrop::new(device),
            physical_device,
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            depth_format,
            requested_extent,
            current_frame: 0,
            image_index: 0,
            needs_recreate: false,
            frame_ready: false,
            update_requested: true,
        })
    }

    fn create_render_finished(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Semaphore>> {
        (0..count).map(|_| Semaphore::new(device.clone())).collect()
    }

    /// Name of the selected GPU.
    pub fn device_name(&self) -> String {
        self.physical_device.device_name().into_owned()
    }

    /// Records the new window size; the swapchain is rebuilt before the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.requested_extent = vk::Extent2D { width, height };
        self.needs_recreate = true;
    }

    /// Returns and clears the renderer's request for another frame.
    pub fn take_update_request(&mut self) -> bool {
        std::mem::take(&mut self.update_requested)
    }

    /// Blocks until the GPU has finished all submitted work.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    /// Initializes `lifecycle`'s resources against this presenter.
    ///
    /// # Errors
    ///
    /// Propagates the lifecycle's initialization error.
    pub fn init(&mut self, lifecycle: &mut dyn FrameLifecycle) -> RhiResult<()> {
        lifecycle.on_init_resources(self)?;
        lifecycle.on_swapchain_resized(self);
        Ok(())
    }

    /// Waits for the GPU, then releases `lifecycle`'s resources.
    pub fn release(&mut self, lifecycle: &mut dyn FrameLifecycle) {
        if let Err(e) = self.wait_idle() {
            error!("Failed to wait for device idle before release: {}", e);
        }
        lifecycle.on_release_resources();
    }

    /// Runs one frame of `lifecycle`. Skips the frame while the window has
    /// no drawable area or the swapchain is out of date. A skipped frame
    /// leaves an update pending, so the caller schedules another attempt
    /// through [`Self::take_update_request`].
    ///
    /// # Errors
    ///
    /// Returns an error on device loss or any other non-recoverable
    /// Vulkan failure.
    pub fn render(&mut self, lifecycle: &mut dyn FrameLifecycle) -> RhiResult<()> {
        let drawn = self.draw(lifecycle)?;
        self.update_requested = update_pending(drawn, self.update_requested);
        Ok(())
    }

    /// Returns `false` when the frame was skipped.
    fn draw(&mut self, lifecycle: &mut dyn FrameLifecycle) -> RhiResult<bool> {
        if self.needs_recreate {
            if !self.recreate_swapchain()? {
                debug!("Swapchain recreation deferred, skipping frame");
                return Ok(false);
            }
            lifecycle.on_swapchain_resized(self);
        }

        if !self.begin_frame()? {
            return Ok(false);
        }

        lifecycle.on_frame(self);
        if !self.frame_ready {
            warn!("Frame {} submitted without frame_ready", self.current_frame);
        }

        self.end_frame()?;
        Ok(true)
    }

    /// Returns `false` when the extent is empty and recreation has to wait.
    fn recreate_swapchain(&mut self) -> RhiResult<bool> {
        let extent = self.requested_extent;
        if extent.width == 0 || extent.height == 0 {
            return Ok(false);
        }

        self.device.wait_idle()?;

        // Framebuffers reference the old image views.
        self.targets.framebuffers.clear();
        self.swapchain
            .recreate(&self.instance, self.surface.handle(), extent)?;

        *self.targets = SwapchainTargets::new(
            &self.device,
            &self.swapchain,
            &self.render_pass,
            self.depth_format,
        )?;
        self.render_finished =
            Self::create_render_finished(&self.device, self.swapchain.image_count())?;

        self.needs_recreate = false;
        info!(
            "Swapchain recreated at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(true)
    }

    /// Returns `false` if no image could be acquired this frame.
    fn begin_frame(&mut self) -> RhiResult<bool> {
        let frame = &self.frames[self.current_frame];
        frame.in_flight.wait()?;

        match self
            .swapchain
            .acquire_next_image(frame.image_available.handle())
        {
            Ok((index, suboptimal)) => {
                self.image_index = index;
                if suboptimal {
                    self.needs_recreate = true;
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire");
                self.needs_recreate = true;
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        }

        // Only reset once work is certain to be submitted.
        frame.in_flight.reset()?;
        frame.command_buffer.begin()?;
        self.frame_ready = false;
        Ok(true)
    }

    fn end_frame(&mut self) -> RhiResult<()> {
        let frame = &self.frames[self.current_frame];
        frame.command_buffer.end()?;

        let render_finished = self
            .render_finished
            .get(self.image_index as usize)
            .ok_or_else(|| {
                RhiError::SwapchainError(format!("image index {} out of range", self.image_index))
            })?
            .handle();

        let wait_semaphores = [frame.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let command_buffers = [frame.command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                frame.in_flight.handle(),
            )?;
        }

        match self.swapchain.present(
            self.device.present_queue(),
            self.image_index,
            render_finished,
        ) {
            Ok(false) => {}
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Swapchain needs recreation after present");
                self.needs_recreate = true;
            }
            Err(e) => return Err(e.into()),
        }

        self.current_frame = (self.current_frame + 1) % self.frames.len();
        Ok(())
    }
}

impl FrameHost for WindowPresenter {
    fn device(&self) -> Arc<dyn GpuDevice> {
        let device: Arc<Device> = Arc::clone(&*self.device);
        device
    }

    fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.physical_device.min_uniform_buffer_offset_alignment()
    }

    fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    fn concurrent_frame_count(&self) -> usize {
        self.frames.len()
    }

    fn sample_count(&self) -> vk::SampleCountFlags {
        self.render_pass.samples()
    }

    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    fn current_framebuffer(&self) -> vk::Framebuffer {
        self.targets
            .framebuffers
            .get(self.image_index as usize)
            .map_or(vk::Framebuffer::null(), Framebuffer::handle)
    }

    fn current_command_buffer(&self) -> vk::CommandBuffer {
        self.frames[self.current_frame].command_buffer.handle()
    }

    fn current_frame(&self) -> usize {
        self.current_frame
    }

    fn swapchain_image_size(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn frame_ready(&mut self) {
        self.frame_ready = true;
    }

    fn request_update(&mut self) {
        self.update_requested = true;
    }
}

impl Drop for WindowPresenter {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during presenter drop: {}", e);
        }

        self.frames.clear();
        self.render_finished.clear();

        unsafe {
            ManuallyDrop::drop(&mut self.targets);
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.command_pool);
        }

        if Arc::strong_count(&*self.device) > 1 {
            error!(
                "Device still has {} other owner(s) at presenter drop; release renderer resources first",
                Arc::strong_count(&*self.device) - 1
            );
        }

        // The device must be gone before the surface and instance.
        unsafe {
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Presenter destroyed");
    }
}

/// Whether another frame should be scheduled after a render attempt.
///
/// A drawn frame keeps only what the renderer requested. A skipped frame
/// never ran the renderer, so it always asks to be retried.
fn update_pending(drawn: bool, requested: bool) -> bool {
    !drawn || requested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skipped_frame_keeps_update_pending() {
        assert!(update_pending(false, false));
        assert!(update_pending(false, true));
    }

    #[test]
    fn test_drawn_frame_follows_renderer_request() {
        assert!(update_pending(true, true));
        assert!(!update_pending(true, false));
    }
}
