// SPDX-License-Identifier: CEPL-1.0
use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, CStr, CString};
use tracing::{debug, error, info, warn};

use crate::error::{ApiResultExt, VkResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Application name and version reported to the driver.
#[derive(Clone, Debug)]
pub struct AppInfo {
    pub name: String,
    pub version: (u32, u32, u32),
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            name: "CubicEngine".to_owned(),
            version: (0, 1, 0),
        }
    }
}

/// Loader entry, instance and the surface extension loader.
pub struct VkInstance {
    pub(crate) entry: Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) surface_loader: surface::Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut std::os::raw::c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[Vulkan] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[Vulkan] {msg}");
    } else {
        debug!("[Vulkan] {msg}");
    }
    vk::FALSE
}

unsafe fn has_layer(entry: &Entry, name: &CStr) -> bool {
    entry
        .enumerate_instance_layer_properties()
        .unwrap_or_default()
        .iter()
        .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == name)
}

unsafe fn has_instance_extension(entry: &Entry, name: &CStr) -> bool {
    entry
        .enumerate_instance_extension_properties(None)
        .unwrap_or_default()
        .iter()
        .any(|e| CStr::from_ptr(e.extension_name.as_ptr()) == name)
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
) -> VkResult<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = loader
        .create_debug_utils_messenger(&ci, None)
        .during("create_debug_utils_messenger")?;
    Ok((loader, messenger))
}

impl VkInstance {
    /// Loads the Vulkan library and creates an instance with `extensions`.
    ///
    /// Debug builds additionally enable the Khronos validation layer and route
    /// its messages into `tracing`, but only when the layer is installed.
    pub fn new(app: &AppInfo, extensions: &[*const c_char]) -> VkResult<Self> {
        unsafe {
            let entry = Entry::load()?;

            let validation = cfg!(debug_assertions)
                && has_layer(&entry, VALIDATION_LAYER)
                && has_instance_extension(&entry, debug_utils::NAME);

            let mut ext_vec = extensions.to_vec();
            if validation {
                ext_vec.push(debug_utils::NAME.as_ptr());
            }
            let layers = [VALIDATION_LAYER.as_ptr()];
            let (enabled_layer_count, pp_enabled_layer_names) = if validation {
                (layers.len() as u32, layers.as_ptr())
            } else {
                (0, std::ptr::null())
            };

            let name = CString::new(app.name.replace('\0', "")).unwrap_or_default();
            let (major, minor, patch) = app.version;
            let app_info = vk::ApplicationInfo {
                s_type: vk::StructureType::APPLICATION_INFO,
                p_application_name: name.as_ptr(),
                application_version: vk::make_api_version(0, major, minor, patch),
                p_engine_name: c"CubicEngine".as_ptr(),
                engine_version: 0,
                api_version: vk::API_VERSION_1_0,
                ..Default::default()
            };

            let create_info = vk::InstanceCreateInfo {
                s_type: vk::StructureType::INSTANCE_CREATE_INFO,
                p_application_info: &app_info,
                enabled_extension_count: ext_vec.len() as u32,
                pp_enabled_extension_names: ext_vec.as_ptr(),
                enabled_layer_count,
                pp_enabled_layer_names,
                ..Default::default()
            };

            let instance = entry
                .create_instance(&create_info, None)
                .during("create_instance")?;

            let messenger = if validation {
                match create_debug_messenger(&entry, &instance) {
                    Ok(d) => Some(d),
                    Err(e) => {
                        warn!("validation messenger unavailable: {e}");
                        None
                    }
                }
            } else {
                None
            };

            let surface_loader = surface::Instance::new(&entry, &instance);
            info!(
                "Vulkan instance ready (app {:?}, {} extensions, validation={})",
                app.name,
                ext_vec.len(),
                messenger.is_some()
            );

            Ok(Self {
                entry,
                instance,
                surface_loader,
                debug: messenger,
            })
        }
    }

    /// Instance with the WSI extensions the platform needs for `display`.
    pub fn for_display(app: &AppInfo, display: RawDisplayHandle) -> VkResult<Self> {
        let required =
            ash_window::enumerate_required_extensions(display).during("enumerate_required_extensions")?;
        Self::new(app, required)
    }

    /// Creates a presentation surface for a native window. The caller owns it
    /// and must release it with [`VkInstance::destroy_surface`].
    ///
    /// # Safety
    /// The window must outlive the returned surface.
    pub unsafe fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR> {
        ash_window::create_surface(&self.entry, &self.instance, display, window, None)
            .during("create_surface")
    }

    /// # Safety
    /// Nothing created from `surface` may still be alive.
    pub unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        if surface != vk::SurfaceKHR::null() {
            self.surface_loader.destroy_surface(surface, None);
        }
    }

    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn surface_loader(&self) -> &surface::Instance {
        &self.surface_loader
    }

    /// # Safety
    /// Every device and surface created from this instance must be gone, and
    /// this must be the last call on `self`.
    pub unsafe fn destroy(&mut self) {
        if let Some((loader, messenger)) = self.debug.take() {
            loader.destroy_debug_utils_messenger(messenger, None);
        }
        self.instance.destroy_instance(None);
    }
}
