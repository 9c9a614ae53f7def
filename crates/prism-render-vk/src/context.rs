// SPDX-License-Identifier: CEPL-1.0
use anyhow::{anyhow, Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

use prism_render::{CycleOutcome, RenderSettings, RenderSize, Renderer, ShaderStore, WindowSystem};

use crate::chain::{
    choose_extent, choose_surface_format, ChainRequest, ChainState, SurfaceSupport,
};
use crate::frame::{Acquire, FrameBackend, FrameScheduler, Present};
use crate::instance::GpuInstance;
use crate::negotiate::GpuDevice;
use crate::pipeline::{create_graphics_pipeline, create_render_pass, PipelineObjects};
use crate::record::{record_frame, RecordTarget};
use crate::recreate::{rebuild_when_drawable, ChainRebuild};
use crate::shaders::ShaderBinaries;
use crate::sync::{
    create_command_pool, create_frame_slots, destroy_frame_slots, FrameSlot, MAX_FRAMES_IN_FLIGHT,
};

/// Owns every Vulkan object the triangle needs.
///
/// Fields holding raw handles are destroyed in `Drop`; `device` and
/// `instance` clean up after themselves and are declared last so they
/// outlive everything created from them.
pub struct VkRenderer {
    scheduler: FrameScheduler,
    slots: [FrameSlot; MAX_FRAMES_IN_FLIGHT],
    command_pool: vk::CommandPool,
    chain: ChainState,
    pipeline: PipelineObjects,
    render_pass: vk::RenderPass,
    shaders: ShaderBinaries,
    settings: RenderSettings,

    device: GpuDevice,
    instance: GpuInstance,
}

// Teardown order:
// - idle the device so nothing is pending
// - sync objects, then the pool (frees its command buffers)
// - framebuffers → views → swapchain
// - pipeline → layout → render pass
// - device, then surface/messenger/instance via their own Drop
impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.raw.device_wait_idle() {
                warn!("device_wait_idle during teardown: {e:?}");
            }
            destroy_frame_slots(&self.device, &mut self.slots);
            self.device
                .raw
                .destroy_command_pool(std::mem::take(&mut self.command_pool), None);
            self.chain.destroy(&self.device);
            self.pipeline.destroy(&self.device);
            self.device
                .raw
                .destroy_render_pass(std::mem::take(&mut self.render_pass), None);
        }
        info!("renderer resources released");
    }
}

impl VkRenderer {
    // STRICT ORDER: shaders are decoded before any GPU object exists. Once
    // `this` is assembled, an early return drops it and Drop releases
    // whatever was created.
    unsafe fn build(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        store: &dyn ShaderStore,
        settings: &RenderSettings,
    ) -> Result<Self> {
        let shaders = ShaderBinaries::load(store).context("load shaders")?;
        let instance =
            GpuInstance::new(window, display, &settings.app_name, settings.validation)?;
        let device = GpuDevice::new(&instance)?;

        let mut this = Self {
            scheduler: FrameScheduler::new(),
            slots: [FrameSlot::default(); MAX_FRAMES_IN_FLIGHT],
            command_pool: vk::CommandPool::null(),
            chain: ChainState::default(),
            pipeline: PipelineObjects::default(),
            render_pass: vk::RenderPass::null(),
            shaders,
            settings: settings.clone(),
            device,
            instance,
        };

        this.command_pool = create_command_pool(&this.device)?;
        this.slots = create_frame_slots(&this.device, this.command_pool)?;
        this.rebuild_chain(size)?;

        info!(
            "vk: ready on \"{}\" ({}x{}, {} images, {:?})",
            this.device.name,
            this.chain.extent.width,
            this.chain.extent.height,
            this.chain.images.len(),
            this.chain.present_mode
        );
        Ok(this)
    }

    /// Builds the chain for `size`, retiring the current one. The render pass
    /// is replaced only when the surface format changed; the pipeline always
    /// is, since its viewport is fixed.
    unsafe fn rebuild_chain(&mut self, size: RenderSize) -> Result<()> {
        let support = SurfaceSupport::query(
            &self.instance.surface_loader,
            self.device.physical,
            self.instance.surface,
        )?;
        let surface_format =
            choose_surface_format(&support.formats).context("surface reports no formats")?;

        let new_render_pass = if self.render_pass == vk::RenderPass::null()
            || surface_format.format != self.chain.format.format
        {
            Some(create_render_pass(&self.device, surface_format.format)?)
        } else {
            None
        };
        let render_pass = new_render_pass.unwrap_or(self.render_pass);

        let request = ChainRequest {
            surface: self.instance.surface,
            surface_format,
            vsync: self.settings.vsync_mode,
            extent_hint: size,
            old_swapchain: self.chain.swapchain,
        };
        let chain = match ChainState::build(&self.device, &support, &request, render_pass) {
            Ok(chain) => chain,
            Err(e) => {
                if let Some(rp) = new_render_pass {
                    self.device.raw.destroy_render_pass(rp, None);
                }
                return Err(e);
            }
        };

        let mut old = std::mem::replace(&mut self.chain, chain);
        old.destroy(&self.device);
        self.pipeline.destroy(&self.device);
        if let Some(rp) = new_render_pass {
            self.device.raw.destroy_render_pass(self.render_pass, None);
            self.render_pass = rp;
        }

        self.pipeline = create_graphics_pipeline(
            &self.device,
            self.render_pass,
            self.chain.extent,
            &self.shaders,
        )?;
        Ok(())
    }

    fn recreate_chain(&mut self, window: &mut dyn WindowSystem) -> Result<()> {
        if rebuild_when_drawable(self, window)?.is_some() {
            info!(
                "vk: chain rebuilt at {}x{}",
                self.chain.extent.width, self.chain.extent.height
            );
        }
        Ok(())
    }
}

impl ChainRebuild for VkRenderer {
    fn idle(&mut self) -> Result<()> {
        unsafe { self.device.raw.device_wait_idle() }.context("device_wait_idle")
    }

    fn surface_extent(&mut self, hint: RenderSize) -> Result<vk::Extent2D> {
        let caps = unsafe {
            self.instance.surface_loader.get_physical_device_surface_capabilities(
                self.device.physical,
                self.instance.surface,
            )
        }
        .context("get_physical_device_surface_capabilities")?;
        Ok(choose_extent(&caps, hint))
    }

    fn build(&mut self, size: RenderSize) -> Result<()> {
        unsafe { self.rebuild_chain(size) }
    }
}

/// One frame's view of the renderer plus the window it draws into.
struct FrameDriver<'a> {
    ctx: &'a mut VkRenderer,
    window: &'a mut dyn WindowSystem,
}

impl FrameBackend for FrameDriver<'_> {
    fn wait_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.ctx.slots[slot].in_flight;
        unsafe {
            self.ctx
                .device
                .raw
                .wait_for_fences(&[fence], true, u64::MAX)
                .context("wait_for_fences")
        }
    }

    fn acquire(&mut self, slot: usize) -> Result<Acquire> {
        let semaphore = self.ctx.slots[slot].image_available;
        let acquired = unsafe {
            self.ctx.device.swapchain_loader.acquire_next_image(
                self.ctx.chain.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        match acquired {
            Ok((image_index, suboptimal)) => Ok(Acquire::Ready {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquire::Stale),
            Err(e) => Err(anyhow!("acquire_next_image: {e:?}")),
        }
    }

    fn reset_slot(&mut self, slot: usize) -> Result<()> {
        let fence = self.ctx.slots[slot].in_flight;
        unsafe {
            self.ctx
                .device
                .raw
                .reset_fences(&[fence])
                .context("reset_fences")
        }
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let ctx = &*self.ctx;
        let framebuffer = *ctx
            .chain
            .framebuffers
            .get(image_index as usize)
            .with_context(|| format!("no framebuffer for image {image_index}"))?;
        let target = RecordTarget {
            render_pass: ctx.render_pass,
            framebuffer,
            extent: ctx.chain.extent,
            pipeline: ctx.pipeline.pipeline,
            clear_color: ctx.settings.clear_color,
        };
        unsafe { record_frame(&ctx.device, ctx.slots[slot].command_buffer, &target) }
    }

    fn submit(&mut self, slot: usize) -> Result<()> {
        let s = &self.ctx.slots[slot];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.image_available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &s.command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &s.render_finished,
            ..Default::default()
        };
        unsafe {
            self.ctx
                .device
                .raw
                .queue_submit(
                    self.ctx.device.graphics_queue,
                    std::slice::from_ref(&submit),
                    s.in_flight,
                )
                .context("queue_submit")
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> Result<Present> {
        let s = &self.ctx.slots[slot];
        let info = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &s.render_finished,
            swapchain_count: 1,
            p_swapchains: &self.ctx.chain.swapchain,
            p_image_indices: &image_index,
            ..Default::default()
        };
        let presented = unsafe {
            self.ctx
                .device
                .swapchain_loader
                .queue_present(self.ctx.device.present_queue, &info)
        };
        match presented {
            Ok(false) => Ok(Present::Presented),
            Ok(true) => Ok(Present::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Present::Stale),
            Err(e) => Err(anyhow!("queue_present: {e:?}")),
        }
    }

    fn recreate(&mut self) -> Result<()> {
        self.ctx.recreate_chain(&mut *self.window)
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        shaders: &dyn ShaderStore,
        settings: &RenderSettings,
    ) -> Result<Self> {
        unsafe { Self::build(window, display, size, shaders, settings) }
    }

    fn draw_frame(&mut self, window: &mut dyn WindowSystem) -> Result<CycleOutcome> {
        let resize = window.resize_flag();
        let mut scheduler = std::mem::take(&mut self.scheduler);
        let outcome = scheduler.run_cycle(&mut FrameDriver { ctx: self, window }, &resize);
        self.scheduler = scheduler;
        if let Ok(o) = &outcome {
            if *o != CycleOutcome::Presented {
                debug!("cycle: {o:?}");
            }
        }
        outcome
    }
}
