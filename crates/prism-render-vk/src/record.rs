// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::negotiate::GpuDevice;

pub const TRIANGLE_VERTEX_COUNT: u32 = 3;

pub fn clear_value(rgba: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: rgba },
    }
}

/// Everything one recording needs. The framebuffer picks the image.
#[derive(Clone, Copy, Debug)]
pub struct RecordTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub clear_color: [f32; 4],
}

/// reset → begin → render pass (clear) → bind → draw 3 → end.
/// The caller guarantees the buffer is no longer pending on the GPU.
pub unsafe fn record_frame(
    device: &GpuDevice,
    cmd: vk::CommandBuffer,
    target: &RecordTarget,
) -> Result<()> {
    let d = &device.raw;
    d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        .context("reset_command_buffer")?;
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        ..Default::default()
    };
    d.begin_command_buffer(cmd, &begin)
        .context("begin_command_buffer")?;

    let clear = clear_value(target.clear_color);
    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: target.render_pass,
        framebuffer: target.framebuffer,
        render_area: vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent,
        },
        clear_value_count: 1,
        p_clear_values: &clear,
        ..Default::default()
    };
    d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
    d.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
    d.cmd_draw(cmd, TRIANGLE_VERTEX_COUNT, 1, 0, 0);
    d.cmd_end_render_pass(cmd);

    d.end_command_buffer(cmd).context("end_command_buffer")?;
    Ok(())
}
