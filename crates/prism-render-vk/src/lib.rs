// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: instance and device negotiation, the swapchain and its
//! dependents, the triangle pipeline and the frames-in-flight loop.

mod chain;
mod context;
mod error;
mod frame;
mod instance;
mod negotiate;
mod pipeline;
mod record;
mod recreate;
mod shaders;
mod sync;

pub use chain::{
    choose_extent, choose_image_count, choose_present_mode, choose_sharing, choose_surface_format,
    is_drawable,
};
pub use context::VkRenderer;
pub use error::SetupError;
pub use frame::{needs_recreate, Acquire, FrameBackend, FrameScheduler, Present};
pub use negotiate::{
    select_device, DeviceCandidate, QueueFamilies, QueueFamilyIndices, QueueFamilySupport,
    REQUIRED_DEVICE_EXTENSIONS,
};
pub use recreate::{rebuild_when_drawable, ChainRebuild};
pub use shaders::{decode_spirv, EmbeddedShaders, ShaderBinaries};
pub use sync::MAX_FRAMES_IN_FLIGHT;
