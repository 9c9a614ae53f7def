// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::vk;
use tracing::debug;

use crate::negotiate::GpuDevice;
use crate::shaders::ShaderBinaries;

/// Makes the first color write wait for the acquire semaphore, which is only
/// waited on at COLOR_ATTACHMENT_OUTPUT.
pub fn external_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dependency_flags: vk::DependencyFlags::empty(),
    }
}

pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    }
}

/// Single subpass, single color attachment, ends in PRESENT_SRC.
pub unsafe fn create_render_pass(device: &GpuDevice, format: vk::Format) -> Result<vk::RenderPass> {
    let attachment = color_attachment(format);
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        ..Default::default()
    };
    let dependency = external_dependency();

    let info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &attachment,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    let rp = device
        .raw
        .create_render_pass(&info, None)
        .context("create_render_pass")?;
    debug!("render pass created for {:?}", format);
    Ok(rp)
}

pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PipelineObjects {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl PipelineObjects {
    pub unsafe fn destroy(&mut self, device: &GpuDevice) {
        device.raw.destroy_pipeline(std::mem::take(&mut self.pipeline), None);
        device
            .raw
            .destroy_pipeline_layout(std::mem::take(&mut self.layout), None);
    }
}

unsafe fn create_shader_module(device: &GpuDevice, code: &[u32]) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: std::mem::size_of_val(code),
        ..Default::default()
    };
    device
        .raw
        .create_shader_module(&info, None)
        .context("create_shader_module")
}

/// Viewport and scissor are baked in at `extent`, so a new extent means a new
/// pipeline. Shader modules only live for the duration of this call.
pub unsafe fn create_graphics_pipeline(
    device: &GpuDevice,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    shaders: &ShaderBinaries,
) -> Result<PipelineObjects> {
    let vs = create_shader_module(device, &shaders.vertex)?;
    let fs = match create_shader_module(device, &shaders.fragment) {
        Ok(m) => m,
        Err(e) => {
            device.raw.destroy_shader_module(vs, None);
            return Err(e);
        }
    };

    let result = build_pipeline(device, render_pass, extent, vs, fs);

    device.raw.destroy_shader_module(vs, None);
    device.raw.destroy_shader_module(fs, None);
    result
}

unsafe fn build_pipeline(
    device: &GpuDevice,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    vs: vk::ShaderModule,
    fs: vk::ShaderModule,
) -> Result<PipelineObjects> {
    let entry = c"main";
    let stages = [
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::VERTEX,
            module: vs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
        vk::PipelineShaderStageCreateInfo {
            s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
            stage: vk::ShaderStageFlags::FRAGMENT,
            module: fs,
            p_name: entry.as_ptr(),
            ..Default::default()
        },
    ];

    // Positions come from gl_VertexIndex; no vertex buffers.
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: vk::PrimitiveTopology::TRIANGLE_LIST,
        primitive_restart_enable: vk::FALSE,
        ..Default::default()
    };

    let viewport = viewport_for(extent);
    let scissor = scissor_for(extent);
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        p_viewports: &viewport,
        scissor_count: 1,
        p_scissors: &scissor,
        ..Default::default()
    };

    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: vk::FrontFace::CLOCKWISE,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: vk::SampleCountFlags::TYPE_1,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
        blend_enable: vk::FALSE,
        ..Default::default()
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        ..Default::default()
    };
    let layout = device
        .raw
        .create_pipeline_layout(&layout_info, None)
        .context("create_pipeline_layout")?;

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        stage_count: stages.len() as u32,
        p_stages: stages.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_color_blend_state: &color_blend,
        layout,
        render_pass,
        subpass: 0,
        ..Default::default()
    };

    let pipelines = match device.raw.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&pipeline_info),
        None,
    ) {
        Ok(p) => p,
        Err((_, err)) => {
            device.raw.destroy_pipeline_layout(layout, None);
            return Err(anyhow!("create_graphics_pipelines failed: {:?}", err));
        }
    };

    debug!("graphics pipeline built for {}x{}", extent.width, extent.height);
    Ok(PipelineObjects {
        layout,
        pipeline: pipelines[0],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_dependency_guards_color_output() {
        let dep = external_dependency();
        assert_eq!(dep.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dep.dst_subpass, 0);
        assert_eq!(dep.src_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(dep.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert!(dep.src_access_mask.is_empty());
        assert_eq!(dep.dst_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn attachment_clears_and_ends_presentable() {
        let a = color_attachment(vk::Format::B8G8R8A8_UNORM);
        assert_eq!(a.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(a.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(a.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(a.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(a.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn viewport_and_scissor_cover_extent() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let vp = viewport_for(extent);
        assert_eq!((vp.x, vp.y, vp.width, vp.height), (0.0, 0.0, 1280.0, 720.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));

        let sc = scissor_for(extent);
        assert_eq!((sc.offset.x, sc.offset.y), (0, 0));
        assert_eq!(sc.extent, extent);
    }
}
