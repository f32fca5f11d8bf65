// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, c_void, CStr, CString};

use ash::{ext::debug_utils, khr::surface, vk, Entry};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle};
use tracing::{debug, error, info, warn};

use crate::error::{Result, VkResultExt};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"prism";

/// Instance-scoped objects: loader entry, instance, optional debug
/// messenger and the window surface.
///
/// Everything device-scoped holds an `Arc` to this, so it is torn down last.
pub struct Instance {
    _entry: Entry,
    raw: ash::Instance,
    messenger: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
}

/// Surface properties, queried fresh whenever a swapchain is (re)built.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl Instance {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        app_name: &str,
        validation: bool,
    ) -> Result<Self> {
        // STRICT ORDER:
        // 1) instance with WSI extensions (+ debug utils when validating)
        // 2) surface FROM THIS INSTANCE
        // 3) adapters are later scored against THIS surface
        let dh = display.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();

        let entry = unsafe { Entry::load()? };
        let validation = validation && validation_layer_present(&entry);
        let raw = unsafe { create_instance(&entry, dh, app_name, validation)? };

        let messenger = if validation {
            match unsafe { create_debug_messenger(&entry, &raw) } {
                Ok(pair) => Some(pair),
                Err(e) => {
                    warn!("debug messenger unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = surface::Instance::new(&entry, &raw);
        let surface = unsafe { ash_window::create_surface(&entry, &raw, dh, wh, None) }
            .check("vkCreateSurfaceKHR")?;

        let validating = messenger.is_some();
        info!("Vulkan instance ready (validation={validating})");
        Ok(Instance {
            _entry: entry,
            raw,
            messenger,
            surface_loader,
            surface,
        })
    }

    pub fn raw(&self) -> &ash::Instance {
        &self.raw
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn surface_loader(&self) -> &surface::Instance {
        &self.surface_loader
    }

    pub fn supports_present(&self, phys: vk::PhysicalDevice, family: u32) -> Result<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(phys, family, self.surface)
        }
        .check("vkGetPhysicalDeviceSurfaceSupportKHR")
    }

    pub fn surface_support(&self, phys: vk::PhysicalDevice) -> Result<SurfaceSupport> {
        let s = &self.surface_loader;
        unsafe {
            Ok(SurfaceSupport {
                capabilities: s
                    .get_physical_device_surface_capabilities(phys, self.surface)
                    .check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
                formats: s
                    .get_physical_device_surface_formats(phys, self.surface)
                    .check("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
                present_modes: s
                    .get_physical_device_surface_present_modes(phys, self.surface)
                    .check("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
            })
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
            if let Some((loader, handle)) = self.messenger.take() {
                loader.destroy_debug_utils_messenger(handle, None);
            }
            self.raw.destroy_instance(None);
        }
    }
}

fn validation_layer_present(entry: &Entry) -> bool {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
    let found = layers
        .iter()
        .any(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) } == VALIDATION_LAYER);
    if !found {
        warn!("validation requested but {VALIDATION_LAYER:?} is not installed");
    }
    found
}

unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    app_name: &str,
    validation: bool,
) -> Result<ash::Instance> {
    // Config validation rejects interior NULs; fall back rather than fail.
    let app = CString::new(app_name).unwrap_or_else(|_| ENGINE_NAME.to_owned());

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app.as_ptr(),
        application_version: 0,
        p_engine_name: ENGINE_NAME.as_ptr(),
        engine_version: 0,
        api_version: vk::API_VERSION_1_1,
        ..Default::default()
    };

    let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display_raw)
        .check("enumerate_required_extensions")?
        .to_vec();
    let layers: Vec<*const c_char> = if validation {
        extensions.push(debug_utils::NAME.as_ptr());
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layers.len() as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        ..Default::default()
    };

    unsafe { entry.create_instance(&create_info, None) }.check("vkCreateInstance")
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe {
        let p = (*data).p_message;
        if p.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr(p).to_string_lossy()
    };
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan {types:?}] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan {types:?}] {msg}");
    } else {
        debug!("[vulkan {types:?}] {msg}");
    }
    vk::FALSE
}

unsafe fn create_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
) -> Result<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
    let loader = debug_utils::Instance::new(entry, instance);
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    };
    let messenger = unsafe { loader.create_debug_utils_messenger(&ci, None) }
        .check("vkCreateDebugUtilsMessengerEXT")?;
    Ok((loader, messenger))
}
