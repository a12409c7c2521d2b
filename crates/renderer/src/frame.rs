//! Per-frame command recording.
//!
//! One call to [`record_frame`] takes the frame from idle, through an
//! active render pass, back to idle:
//!
//! ```text
//! begin render pass (clear) -> viewport/scissor -> bind pipeline, set, vertices
//!     -> draw 3 -> end render pass
//! ```

use ash::vk;
use smallvec::SmallVec;

use triangle_rhi::GpuDevice;

/// Vertices in the triangle.
pub const VERTEX_COUNT: u32 = 3;

/// Depth/stencil clear: far plane, stencil 0.
pub const CLEAR_DEPTH_STENCIL: vk::ClearDepthStencilValue = vk::ClearDepthStencilValue {
    depth: 1.0,
    stencil: 0,
};

/// Clear values in attachment order: color, depth, and when multisampled
/// the resolve target.
pub fn clear_values(
    color: [f32; 4],
    samples: vk::SampleCountFlags,
) -> SmallVec<[vk::ClearValue; 3]> {
    let color = vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    };
    let depth = vk::ClearValue {
        depth_stencil: CLEAR_DEPTH_STENCIL,
    };

    let mut values = SmallVec::new();
    values.push(color);
    values.push(depth);
    if samples != vk::SampleCountFlags::TYPE_1 {
        values.push(color);
    }
    values
}

/// Full-extent viewport with depth range `0..1`.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Full-extent scissor and render area.
pub fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Handles and state for one frame's draw.
#[derive(Clone, Copy)]
pub struct FrameCommands<'a> {
    pub command_buffer: vk::CommandBuffer,
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_values: &'a [vk::ClearValue],
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
    pub vertex_buffer: vk::Buffer,
    pub vertex_offset: vk::DeviceSize,
}

/// Records the triangle's render pass into `frame.command_buffer`.
pub fn record_frame(device: &dyn GpuDevice, frame: &FrameCommands<'_>) {
    let cmd = frame.command_buffer;
    let area = full_rect(frame.extent);

    let begin_info = vk::RenderPassBeginInfo::default()
        .render_pass(frame.render_pass)
        .framebuffer(frame.framebuffer)
        .render_area(area)
        .clear_values(frame.clear_values);
    device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);

    device.cmd_set_viewport(cmd, &[full_viewport(frame.extent)]);
    device.cmd_set_scissor(cmd, &[area]);

    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, frame.pipeline);
    device.cmd_bind_descriptor_sets(
        cmd,
        vk::PipelineBindPoint::GRAPHICS,
        frame.pipeline_layout,
        0,
        &[frame.descriptor_set],
    );
    device.cmd_bind_vertex_buffers(cmd, 0, &[frame.vertex_buffer], &[frame.vertex_offset]);

    device.cmd_draw(cmd, VERTEX_COUNT, 1, 0, 0);

    device.cmd_end_render_pass(cmd);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use triangle_rhi::mock::{Call, RecordingDevice};

    fn extent() -> vk::Extent2D {
        vk::Extent2D {
            width: 800,
            height: 600,
        }
    }

    #[test]
    fn test_clear_values_single_sample() {
        let values = clear_values([0.0, 0.0, 0.1, 1.0], vk::SampleCountFlags::TYPE_1);
        assert_eq!(values.len(), 2);
        unsafe {
            assert_eq!(values[0].color.float32, [0.0, 0.0, 0.1, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn test_clear_values_multisampled_adds_resolve() {
        let values = clear_values([0.2, 0.3, 0.4, 1.0], vk::SampleCountFlags::TYPE_4);
        assert_eq!(values.len(), 3);
        unsafe {
            assert_eq!(values[2].color.float32, [0.2, 0.3, 0.4, 1.0]);
        }
    }

    #[test]
    fn test_viewport_and_rect() {
        let viewport = full_viewport(extent());
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
        assert_eq!(full_rect(extent()).extent, extent());
    }

    #[test]
    fn test_record_frame_sequence() {
        let device = RecordingDevice::new();
        let clear = clear_values([0.0, 0.0, 0.1, 1.0], vk::SampleCountFlags::TYPE_1);
        let frame = FrameCommands {
            command_buffer: vk::CommandBuffer::from_raw(1),
            render_pass: vk::RenderPass::from_raw(2),
            framebuffer: vk::Framebuffer::from_raw(3),
            extent: extent(),
            clear_values: &clear,
            pipeline: vk::Pipeline::from_raw(4),
            pipeline_layout: vk::PipelineLayout::from_raw(5),
            descriptor_set: vk::DescriptorSet::from_raw(6),
            vertex_buffer: vk::Buffer::from_raw(7),
            vertex_offset: 0,
        };

        record_frame(device.as_ref(), &frame);

        assert_eq!(
            device.call_names(),
            vec![
                "cmd_begin_render_pass",
                "cmd_set_viewport",
                "cmd_set_scissor",
                "cmd_bind_pipeline",
                "cmd_bind_descriptor_sets",
                "cmd_bind_vertex_buffers",
                "cmd_draw",
                "cmd_end_render_pass"
            ]
        );

        let calls = device.calls();
        let Call::BeginRenderPass {
            render_pass,
            framebuffer,
            render_area,
            clear_color,
            clear_depth,
            clear_value_count,
            ..
        } = &calls[0]
        else {
            panic!("expected a render pass begin, got {:?}", calls[0]);
        };
        assert_eq!(*render_pass, frame.render_pass);
        assert_eq!(*framebuffer, frame.framebuffer);
        assert_eq!(*render_area, full_rect(extent()));
        assert_eq!(*clear_color, Some([0.0, 0.0, 0.1, 1.0]));
        assert_eq!(*clear_depth, Some((1.0, 0)));
        assert_eq!(*clear_value_count, 2);

        assert!(matches!(
            &calls[4],
            Call::BindDescriptorSets { first_set: 0, sets, .. } if sets == &[frame.descriptor_set]
        ));
        assert!(matches!(
            &calls[5],
            Call::BindVertexBuffers { first_binding: 0, buffers, offsets, .. }
                if buffers == &[frame.vertex_buffer] && offsets == &[0]
        ));
        assert!(matches!(
            calls[6],
            Call::Draw {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
                ..
            }
        ));
    }
}
