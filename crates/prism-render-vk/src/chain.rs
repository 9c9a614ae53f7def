// SPDX-License-Identifier: CEPL-1.0
use anyhow::{bail, Context, Result};
use ash::khr::surface;
use ash::vk;
use prism_render::{RenderSize, VsyncMode};
use tracing::{debug, info};

use crate::negotiate::{GpuDevice, QueueFamilies};

/// Fresh snapshot of what the surface supports. Re-queried on every build
/// since a resize can change it.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub unsafe fn query(
        surface_loader: &surface::Instance,
        physical: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        Ok(Self {
            capabilities: surface_loader
                .get_physical_device_surface_capabilities(physical, surface)
                .context("get_physical_device_surface_capabilities")?,
            formats: surface_loader
                .get_physical_device_surface_formats(physical, surface)
                .context("get_physical_device_surface_formats")?,
            present_modes: surface_loader
                .get_physical_device_surface_present_modes(physical, surface)
                .context("get_physical_device_surface_present_modes")?,
        })
    }
}

/// 8-bit BGRA in the standard non-linear color space, else whatever the
/// surface lists first. `None` only for an empty list.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_UNORM
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: VsyncMode) -> vk::PresentModeKHR {
    match vsync {
        VsyncMode::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        // FIFO is the one mode every surface must offer.
        _ => vk::PresentModeKHR::FIFO,
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// A minimized surface may report 0x0 as its current extent. No swapchain
/// can be created at that size.
pub fn is_drawable(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}

/// One more than the minimum, capped by the maximum (0 == "no max").
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

/// Exclusive when one family does both jobs, concurrent over both otherwise.
pub fn choose_sharing(families: &QueueFamilies) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, families.unique())
    }
}

pub(crate) fn framebuffer_info<'a>(
    render_pass: vk::RenderPass,
    view: &'a vk::ImageView,
    extent: vk::Extent2D,
) -> vk::FramebufferCreateInfo<'a> {
    vk::FramebufferCreateInfo {
        s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
        render_pass,
        attachment_count: 1,
        p_attachments: view,
        width: extent.width,
        height: extent.height,
        layers: 1,
        ..Default::default()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ChainRequest {
    pub surface: vk::SurfaceKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub vsync: VsyncMode,
    pub extent_hint: RenderSize,
    pub old_swapchain: vk::SwapchainKHR,
}

/// The swapchain and everything sized or formatted after it. Built and torn
/// down as a unit.
#[derive(Debug, Default)]
pub struct ChainState {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl ChainState {
    pub unsafe fn build(
        device: &GpuDevice,
        support: &SurfaceSupport,
        request: &ChainRequest,
        render_pass: vk::RenderPass,
    ) -> Result<Self> {
        let caps = &support.capabilities;
        let present_mode = choose_present_mode(&support.present_modes, request.vsync);
        let extent = choose_extent(caps, request.extent_hint);
        if !is_drawable(extent) {
            bail!("surface extent is {}x{}, nothing to build", extent.width, extent.height);
        }
        let image_count = choose_image_count(caps);
        let (sharing_mode, family_indices) = choose_sharing(&device.families);

        info!(
            "chain: format {:?} / {:?}, present_mode {:?}, extent {}x{}, images(min={} → picked={}), sharing {:?}",
            request.surface_format.format,
            request.surface_format.color_space,
            present_mode,
            extent.width,
            extent.height,
            caps.min_image_count,
            image_count,
            sharing_mode
        );

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: request.surface,
            min_image_count: image_count,
            image_format: request.surface_format.format,
            image_color_space: request.surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing_mode,
            queue_family_index_count: family_indices.len() as u32,
            p_queue_family_indices: family_indices.as_ptr(),
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: request.old_swapchain,
            ..Default::default()
        };

        let swapchain = device
            .swapchain_loader
            .create_swapchain(&swap_info, None)
            .context("create_swapchain")?;

        let mut chain = ChainState {
            swapchain,
            format: request.surface_format,
            present_mode,
            extent,
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
        };

        if let Err(e) = chain.create_dependents(device, render_pass) {
            chain.destroy(device);
            return Err(e);
        }
        debug_assert!(chain.is_consistent());
        Ok(chain)
    }

    unsafe fn create_dependents(&mut self, device: &GpuDevice, render_pass: vk::RenderPass) -> Result<()> {
        self.images = device
            .swapchain_loader
            .get_swapchain_images(self.swapchain)
            .context("get_swapchain_images")?;

        self.views.reserve(self.images.len());
        for &image in &self.images {
            let iv_info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: self.format.format,
                components: vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                },
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            self.views.push(
                device
                    .raw
                    .create_image_view(&iv_info, None)
                    .context("create_image_view")?,
            );
        }

        self.framebuffers.reserve(self.views.len());
        for view in &self.views {
            let fb_info = framebuffer_info(render_pass, view, self.extent);
            self.framebuffers.push(
                device
                    .raw
                    .create_framebuffer(&fb_info, None)
                    .context("create_framebuffer")?,
            );
        }

        debug!("chain has {} images", self.images.len());
        Ok(())
    }

    /// Framebuffers → views → swapchain. The images belong to the swapchain.
    /// Leaves `self` empty, so calling it twice is fine.
    pub unsafe fn destroy(&mut self, device: &GpuDevice) {
        for fb in self.framebuffers.drain(..) {
            device.raw.destroy_framebuffer(fb, None);
        }
        for iv in self.views.drain(..) {
            device.raw.destroy_image_view(iv, None);
        }
        self.images.clear();
        device
            .swapchain_loader
            .destroy_swapchain(std::mem::take(&mut self.swapchain), None);
    }

    pub fn is_consistent(&self) -> bool {
        self.images.len() == self.views.len() && self.views.len() == self.framebuffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fmt(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            ..Default::default()
        }
    }

    #[test]
    fn format_prefers_bgra8_srgb_nonlinear() {
        let formats = [
            fmt(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
            fmt(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        let picked = choose_surface_format(&formats).unwrap();
        assert_eq!(picked, formats[2]);
        // same input, same answer
        assert_eq!(choose_surface_format(&formats), Some(picked));
    }

    #[test]
    fn format_falls_back_to_first() {
        let formats = [
            fmt(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            fmt(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_policy() {
        let both = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        let fifo_only = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];

        assert_eq!(choose_present_mode(&both, VsyncMode::Mailbox), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&fifo_only, VsyncMode::Mailbox), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&both, VsyncMode::Fifo), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn extent_from_surface_is_authoritative() {
        let c = caps((1024, 768), (1, 1), (4096, 4096));
        let e = choose_extent(&c, RenderSize::new(10, 10));
        assert_eq!((e.width, e.height), (1024, 768));
    }

    #[test]
    fn minimized_surface_extent_is_not_drawable() {
        // The surface decides and says 0x0, whatever the window claims.
        let c = caps((0, 0), (0, 0), (4096, 4096));
        let e = choose_extent(&c, RenderSize::new(800, 600));
        assert_eq!((e.width, e.height), (0, 0));
        assert!(!is_drawable(e));

        let c = caps((1280, 0), (0, 0), (4096, 4096));
        assert!(!is_drawable(choose_extent(&c, RenderSize::new(800, 600))));

        let c = caps((1280, 720), (1, 1), (4096, 4096));
        assert!(is_drawable(choose_extent(&c, RenderSize::new(800, 600))));
    }

    #[test]
    fn extent_is_clamped_when_window_decides() {
        let c = caps((u32::MAX, u32::MAX), (100, 50), (1920, 1080));

        let e = choose_extent(&c, RenderSize::new(4000, 10));
        assert_eq!((e.width, e.height), (1920, 50));

        let e = choose_extent(&c, RenderSize::new(1, 5000));
        assert_eq!((e.width, e.height), (100, 1080));

        for (w, h) in [(0, 0), (99, 1081), (5000, 5000), (1, 1)] {
            let e = choose_extent(&c, RenderSize::new(w, h));
            assert!((100..=1920).contains(&e.width), "{w}x{h} → {e:?}");
            assert!((50..=1080).contains(&e.height), "{w}x{h} → {e:?}");
        }
    }

    #[test]
    fn extent_inside_bounds_is_unchanged() {
        let c = caps((u32::MAX, u32::MAX), (100, 50), (1920, 1080));
        let e = choose_extent(&c, RenderSize::new(800, 600));
        assert_eq!((e.width, e.height), (800, 600));
    }

    #[test]
    fn image_count_respects_max() {
        let mut c = caps((1, 1), (1, 1), (1, 1));
        c.min_image_count = 2;
        c.max_image_count = 0;
        assert_eq!(choose_image_count(&c), 3);

        c.max_image_count = 8;
        assert_eq!(choose_image_count(&c), 3);

        c.min_image_count = 3;
        c.max_image_count = 3;
        assert_eq!(choose_image_count(&c), 3);
    }

    #[test]
    fn sharing_mode_follows_queue_families() {
        let (mode, indices) = choose_sharing(&QueueFamilies {
            graphics: 1,
            present: 1,
        });
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());

        let (mode, indices) = choose_sharing(&QueueFamilies {
            graphics: 0,
            present: 2,
        });
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn framebuffer_matches_chain_extent() {
        let view = vk::ImageView::from_raw(7);
        let extent = vk::Extent2D {
            width: 640,
            height: 360,
        };
        let info = framebuffer_info(vk::RenderPass::from_raw(3), &view, extent);
        assert_eq!((info.width, info.height, info.layers), (640, 360, 1));
        assert_eq!(info.attachment_count, 1);
        assert_eq!(info.render_pass, vk::RenderPass::from_raw(3));
    }

    #[test]
    fn empty_chain_is_consistent() {
        let chain = ChainState::default();
        assert!(chain.is_consistent());
        assert_eq!(chain.swapchain, vk::SwapchainKHR::null());
    }

    #[test]
    fn mismatched_chain_is_flagged() {
        let chain = ChainState {
            images: vec![vk::Image::from_raw(1), vk::Image::from_raw(2)],
            views: vec![vk::ImageView::from_raw(1), vk::ImageView::from_raw(2)],
            framebuffers: vec![vk::Framebuffer::from_raw(1)],
            ..Default::default()
        };
        assert!(!chain.is_consistent());
    }
}
