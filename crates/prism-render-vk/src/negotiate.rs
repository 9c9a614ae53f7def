// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, CStr, CString};

use anyhow::{Context, Result};
use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::{debug, info, warn};

use crate::instance::GpuInstance;
use crate::SetupError;

pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[swapchain::NAME];

/// What one queue family can do for us.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilySupport {
    pub graphics: bool,
    pub present: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

/// Both indices resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// First graphics-capable and first present-capable family, in index
    /// order, picked independently.
    pub fn resolve(families: &[QueueFamilySupport]) -> Self {
        let mut indices = Self::default();
        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            if indices.graphics.is_none() && family.graphics {
                indices.graphics = Some(i);
            }
            if indices.present.is_none() && family.present {
                indices.present = Some(i);
            }
            if indices.is_complete() {
                break;
            }
        }
        indices
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn complete(self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

impl QueueFamilies {
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// A physical device plus everything the suitability check looks at.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: Vec<QueueFamilySupport>,
    pub extensions: Vec<CString>,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
}

impl DeviceCandidate {
    pub unsafe fn query(
        instance: &ash::Instance,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
        handle: vk::PhysicalDevice,
    ) -> Result<Self> {
        let props = instance.get_physical_device_properties(handle);
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unnamed>".to_owned());

        let queue_families = instance
            .get_physical_device_queue_family_properties(handle)
            .iter()
            .enumerate()
            .map(|(i, q)| QueueFamilySupport {
                graphics: q.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present: surface_loader
                    .get_physical_device_surface_support(handle, i as u32, surface)
                    .unwrap_or(false),
            })
            .collect();

        let extensions = instance
            .enumerate_device_extension_properties(handle)
            .with_context(|| format!("enumerate_device_extension_properties({name})"))?
            .iter()
            .filter_map(|e| e.extension_name_as_c_str().ok().map(CStr::to_owned))
            .collect();

        let surface_format_count = surface_loader
            .get_physical_device_surface_formats(handle, surface)
            .map(|f| f.len())
            .unwrap_or(0);
        let present_mode_count = surface_loader
            .get_physical_device_surface_present_modes(handle, surface)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(Self {
            handle,
            name,
            device_type: props.device_type,
            queue_families,
            extensions,
            surface_format_count,
            present_mode_count,
        })
    }

    pub fn supports_extensions(&self, required: &[&CStr]) -> bool {
        required
            .iter()
            .all(|r| self.extensions.iter().any(|e| e.as_c_str() == *r))
    }

    /// The suitability predicate. `Some` only when the device can draw,
    /// present to the surface, has every required extension and the surface
    /// offers at least one format and one present mode.
    pub fn evaluate(&self, required: &[&CStr]) -> Option<QueueFamilies> {
        let families = QueueFamilyIndices::resolve(&self.queue_families).complete()?;
        if !self.supports_extensions(required) {
            return None;
        }
        if self.surface_format_count == 0 || self.present_mode_count == 0 {
            return None;
        }
        Some(families)
    }
}

/// First suitable candidate in enumeration order. A device whose properties
/// could not be queried is logged and skipped; it still counts as checked.
pub fn select_device(
    candidates: impl IntoIterator<Item = Result<DeviceCandidate>>,
    required: &[&CStr],
) -> Result<(DeviceCandidate, QueueFamilies), SetupError> {
    let mut checked = 0;
    for queried in candidates {
        checked += 1;
        let candidate = match queried {
            Ok(c) => c,
            Err(e) => {
                warn!("skipping device: {e:#}");
                continue;
            }
        };
        debug!(
            "candidate {} ({:?}): families={:?} formats={} modes={}",
            candidate.name,
            candidate.device_type,
            QueueFamilyIndices::resolve(&candidate.queue_families),
            candidate.surface_format_count,
            candidate.present_mode_count
        );
        match candidate.evaluate(required) {
            Some(families) => return Ok((candidate, families)),
            None => debug!("rejecting {} ({:?})", candidate.name, candidate.device_type),
        }
    }
    if checked == 0 {
        Err(SetupError::NoDevices)
    } else {
        Err(SetupError::NoSuitableDevice { checked })
    }
}

/// The logical device, its queues and the swapchain loader bound to it.
pub struct GpuDevice {
    pub raw: ash::Device,
    pub physical: vk::PhysicalDevice,
    pub name: String,
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub swapchain_loader: swapchain::Device,
}

impl Drop for GpuDevice {
    fn drop(&mut self) {
        unsafe {
            self.raw.destroy_device(None);
        }
        debug!("device destroyed");
    }
}

impl GpuDevice {
    pub unsafe fn new(instance: &GpuInstance) -> Result<Self> {
        let handles = instance
            .raw
            .enumerate_physical_devices()
            .context("enumerate_physical_devices")?;

        let mut candidates = Vec::with_capacity(handles.len());
        for handle in handles {
            candidates.push(DeviceCandidate::query(
                &instance.raw,
                &instance.surface_loader,
                instance.surface,
                handle,
            ));
        }

        let (chosen, families) = select_device(candidates, REQUIRED_DEVICE_EXTENSIONS)?;
        info!(
            "Selected GPU: {} ({:?}), graphics family {}, present family {}",
            chosen.name, chosen.device_type, families.graphics, families.present
        );

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let device_exts: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|e| e.as_ptr())
            .collect();
        let features = vk::PhysicalDeviceFeatures::default();

        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };

        let raw = instance
            .raw
            .create_device(chosen.handle, &dinfo, None)
            .context("create_device")?;

        let graphics_queue = raw.get_device_queue(families.graphics, 0);
        let present_queue = raw.get_device_queue(families.present, 0);
        if !families.is_shared() {
            warn!("graphics and present use different queue families, chain images are shared");
        }
        let swapchain_loader = swapchain::Device::new(&instance.raw, &raw);

        Ok(Self {
            raw,
            physical: chosen.handle,
            name: chosen.name,
            families,
            graphics_queue,
            present_queue,
            swapchain_loader,
        })
    }
}
