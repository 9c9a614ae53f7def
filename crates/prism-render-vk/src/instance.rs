// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, CStr, CString};

use anyhow::{anyhow, Context, Result};
use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, error, info, trace, warn};

use crate::SetupError;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance-scoped objects: the instance itself, the optional validation
/// messenger and the window surface. Destroyed surface → messenger →
/// instance.
pub struct GpuInstance {
    pub entry: Entry,
    pub raw: ash::Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    pub surface_loader: surface::Instance,
    pub surface: vk::SurfaceKHR,
}

impl Drop for GpuInstance {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, messenger)) = self.debug.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.raw.destroy_instance(None);
        }
        debug!("instance destroyed");
    }
}

impl GpuInstance {
    // STRICT ORDER: instance → messenger → surface. The surface must come from
    // this instance or present support queries against it are meaningless.
    pub unsafe fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        app_name: &str,
        validation: bool,
    ) -> Result<Self> {
        let dh = display
            .display_handle()
            .map_err(|e| anyhow!("display_handle: {e}"))?
            .as_raw();
        let wh = window
            .window_handle()
            .map_err(|e| anyhow!("window_handle: {e}"))?
            .as_raw();

        let entry = Entry::linked();
        let raw = create_instance(&entry, dh, app_name, validation)?;
        let surface_loader = surface::Instance::new(&entry, &raw);

        // From here on a failure drops `this`, which cleans up what exists.
        let mut this = Self {
            entry,
            raw,
            debug: None,
            surface_loader,
            surface: vk::SurfaceKHR::null(),
        };

        if validation {
            let loader = debug_utils::Instance::new(&this.entry, &this.raw);
            let messenger = create_debug_messenger(&loader)?;
            this.debug = Some((loader, messenger));
        }

        this.surface = ash_window::create_surface(&this.entry, &this.raw, dh, wh, None)
            .context("ash_window::create_surface")?;

        Ok(this)
    }
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    app_name: &str,
    validation: bool,
) -> Result<ash::Instance> {
    let available_exts = entry
        .enumerate_instance_extension_properties(None)
        .context("enumerate_instance_extension_properties")?;
    debug!("available instance extensions:");
    for e in &available_exts {
        if let Ok(name) = e.extension_name_as_c_str() {
            debug!("\t{}", name.to_string_lossy());
        }
    }

    let mut ext_vec: Vec<*const c_char> = ash_window::enumerate_required_extensions(display_raw)
        .context("enumerate_required_extensions")?
        .to_vec();

    let layers: Vec<*const c_char> = if validation {
        let available_layers = entry
            .enumerate_instance_layer_properties()
            .context("enumerate_instance_layer_properties")?;
        let names: Vec<&CStr> = available_layers
            .iter()
            .filter_map(|l| l.layer_name_as_c_str().ok())
            .collect();
        debug!("available layers:");
        for name in &names {
            debug!("\t{}", name.to_string_lossy());
        }

        let missing = missing_layers(&names, &[VALIDATION_LAYER]);
        if !missing.is_empty() {
            return Err(SetupError::MissingValidationLayers {
                missing: missing.join(", "),
            }
            .into());
        }

        ext_vec.push(debug_utils::NAME.as_ptr());
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let app = CString::new(app_name).context("application name contains a NUL byte")?;
    let engine = c"No Engine";

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: engine.as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: ext_vec.len() as u32,
        pp_enabled_extension_names: ext_vec.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .context("failed to create instance")?;
    info!(
        "Vulkan instance ready ({} extensions, validation={})",
        ext_vec.len(),
        validation
    );
    Ok(instance)
}

/// Names in `wanted` that are absent from `available`.
fn missing_layers(available: &[&CStr], wanted: &[&CStr]) -> Vec<String> {
    wanted
        .iter()
        .filter(|w| !available.contains(*w))
        .map(|w| w.to_string_lossy().into_owned())
        .collect()
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    match severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[Vulkan] {msg}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("[Vulkan] {msg}"),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => debug!("[Vulkan] {msg}"),
        _ => trace!("[Vulkan] {msg}"),
    }
    vk::FALSE
}

unsafe fn create_debug_messenger(
    loader: &debug_utils::Instance,
) -> Result<vk::DebugUtilsMessengerEXT> {
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    loader
        .create_debug_utils_messenger(&ci, None)
        .context("create_debug_utils_messenger")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_layer_present() {
        let available = [c"VK_LAYER_MESA_overlay", VALIDATION_LAYER];
        assert!(missing_layers(&available, &[VALIDATION_LAYER]).is_empty());
    }

    #[test]
    fn validation_layer_missing() {
        let available = [c"VK_LAYER_MESA_overlay"];
        assert_eq!(
            missing_layers(&available, &[VALIDATION_LAYER]),
            vec!["VK_LAYER_KHRONOS_validation".to_string()]
        );
    }
}
