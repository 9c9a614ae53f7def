// SPDX-License-Identifier: CEPL-1.0
use anyhow::{Context, Result};
use ash::vk;

use crate::negotiate::GpuDevice;

/// How many frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Per-frame-slot objects. A slot is reused every `MAX_FRAMES_IN_FLIGHT`
/// cycles and only after its `in_flight` fence has signaled.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

pub unsafe fn create_command_pool(device: &GpuDevice) -> Result<vk::CommandPool> {
    let info = vk::CommandPoolCreateInfo {
        s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
        flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        queue_family_index: device.families.graphics,
        ..Default::default()
    };
    device
        .raw
        .create_command_pool(&info, None)
        .context("create_command_pool")
}

/// Fences start signaled so the first wait on each slot returns at once.
/// On failure, whatever was created so far is destroyed.
pub unsafe fn create_frame_slots(
    device: &GpuDevice,
    pool: vk::CommandPool,
) -> Result<[FrameSlot; MAX_FRAMES_IN_FLIGHT]> {
    let alloc_info = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: MAX_FRAMES_IN_FLIGHT as u32,
        ..Default::default()
    };
    let buffers = device
        .raw
        .allocate_command_buffers(&alloc_info)
        .context("allocate_command_buffers")?;

    let mut slots = [FrameSlot::default(); MAX_FRAMES_IN_FLIGHT];
    for (slot, &cmd) in slots.iter_mut().zip(&buffers) {
        slot.command_buffer = cmd;
    }
    if let Err(e) = create_slot_sync(device, &mut slots) {
        destroy_frame_slots(device, &mut slots);
        return Err(e);
    }
    Ok(slots)
}

unsafe fn create_slot_sync(device: &GpuDevice, slots: &mut [FrameSlot]) -> Result<()> {
    let sem_ci = vk::SemaphoreCreateInfo::default();
    let fence_ci = vk::FenceCreateInfo {
        s_type: vk::StructureType::FENCE_CREATE_INFO,
        flags: vk::FenceCreateFlags::SIGNALED,
        ..Default::default()
    };
    for slot in slots {
        slot.image_available = device
            .raw
            .create_semaphore(&sem_ci, None)
            .context("create_semaphore (image available)")?;
        slot.render_finished = device
            .raw
            .create_semaphore(&sem_ci, None)
            .context("create_semaphore (render finished)")?;
        slot.in_flight = device
            .raw
            .create_fence(&fence_ci, None)
            .context("create_fence")?;
    }
    Ok(())
}

/// Command buffers go away with their pool, so only sync objects are
/// destroyed here. The device must be idle.
pub unsafe fn destroy_frame_slots(device: &GpuDevice, slots: &mut [FrameSlot]) {
    for slot in slots {
        device.raw.destroy_fence(slot.in_flight, None);
        device.raw.destroy_semaphore(slot.render_finished, None);
        device.raw.destroy_semaphore(slot.image_available, None);
        *slot = FrameSlot::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_frames_in_flight() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn default_slot_is_all_null() {
        let slot = FrameSlot::default();
        assert_eq!(slot.command_buffer, vk::CommandBuffer::null());
        assert_eq!(slot.image_available, vk::Semaphore::null());
        assert_eq!(slot.render_finished, vk::Semaphore::null());
        assert_eq!(slot.in_flight, vk::Fence::null());
    }
}
