// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_char, c_void, CStr, CString};

use ash::ext::debug_utils;
use ash::{vk, Entry, Instance};
use mercury_rhi::{RhiError, RhiResult};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, warn};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Validation output goes to tracing. Never affects control flow.
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader hands us a valid callback-data struct for the
    // duration of the call.
    let p_message = unsafe { (*data).p_message };
    if p_message.is_null() {
        return vk::FALSE;
    }
    let msg = unsafe { CStr::from_ptr(p_message) }.to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("[vulkan {types:?}] {msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("[vulkan {types:?}] {msg}");
    } else {
        debug!("[vulkan {types:?}] {msg}");
    }
    vk::FALSE
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

pub(crate) struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub(crate) unsafe fn new(entry: &Entry, instance: &Instance) -> RhiResult<Self> {
        let loader = debug_utils::Instance::new(entry, instance);
        let messenger = unsafe { loader.create_debug_utils_messenger(&messenger_info(), None) }
            .map_err(|e| RhiError::creation("debug messenger", e))?;
        Ok(Self { loader, messenger })
    }

    pub(crate) unsafe fn destroy(&self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.messenger, None) };
    }
}

/// What the instance ended up with after checking availability.
pub(crate) struct InstanceBundle {
    pub instance: Instance,
    pub validation: bool,
    pub debug_utils: bool,
}

pub(crate) fn load_entry() -> RhiResult<Entry> {
    // SAFETY: the loader library stays loaded for as long as `Entry` lives,
    // and `Entry` outlives every object created from it.
    unsafe { Entry::load() }.map_err(|e| RhiError::device("load vulkan loader", e))
}

/// Capability queries degrade to "unsupported" on failure, but never quietly.
pub(crate) fn query_or_default<T: Default>(result: Result<T, vk::Result>, query: &str) -> T {
    result.unwrap_or_else(|e| {
        warn!("{query} failed ({e:?}); treating as unsupported");
        T::default()
    })
}

unsafe fn has_layer(entry: &Entry, name: &CStr) -> bool {
    query_or_default(
        unsafe { entry.enumerate_instance_layer_properties() },
        "vkEnumerateInstanceLayerProperties",
    )
        .iter()
        .any(|l| l.layer_name_as_c_str() == Ok(name))
}

unsafe fn has_instance_extension(entry: &Entry, name: &CStr) -> bool {
    query_or_default(
        unsafe { entry.enumerate_instance_extension_properties(None) },
        "vkEnumerateInstanceExtensionProperties",
    )
        .iter()
        .any(|e| e.extension_name_as_c_str() == Ok(name))
}

pub(crate) unsafe fn create_instance(
    entry: &Entry,
    display: RawDisplayHandle,
    app_name: &str,
    want_validation: bool,
    want_labels: bool,
) -> RhiResult<InstanceBundle> {
    // STRICT ORDER:
    // 1) Resolve layers/extensions against what the loader reports
    // 2) Create VkInstance, chaining the messenger info so creation itself is covered
    // 3) (Caller) messenger, surface, then physical devices against that surface
    let validation = want_validation && unsafe { has_layer(entry, VALIDATION_LAYER) };
    if want_validation && !validation {
        warn!("validation requested but {VALIDATION_LAYER:?} is not installed; continuing without it");
    }
    let debug_utils =
        (validation || want_labels) && unsafe { has_instance_extension(entry, debug_utils::NAME) };

    let app = CString::new(app_name).map_err(|e| RhiError::creation("instance", e))?;
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app)
        .application_version(vk::make_api_version(0, 0, 1, 0))
        .engine_name(&app)
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_0);

    let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
        .map_err(|e| RhiError::surface("enumerate_required_extensions", e))?
        .to_vec();
    if debug_utils {
        extensions.push(debug_utils::NAME.as_ptr());
    }
    let layers: Vec<*const c_char> = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let mut chained = messenger_info();
    let mut create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layers)
        .enabled_extension_names(&extensions);
    if validation && debug_utils {
        create_info = create_info.push_next(&mut chained);
    }

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(|e| RhiError::creation("instance", e))?;
    info!("vulkan instance: validation={validation} debug_utils={debug_utils}");

    Ok(InstanceBundle {
        instance,
        validation,
        debug_utils,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_query_reads_as_unsupported() {
        let layers: Vec<vk::LayerProperties> =
            query_or_default(Err(vk::Result::ERROR_INITIALIZATION_FAILED), "layers");
        assert!(layers.is_empty());
        assert!(!query_or_default(Err(vk::Result::ERROR_SURFACE_LOST_KHR), "surface support"));
    }

    #[test]
    fn successful_query_passes_through() {
        assert!(query_or_default(Ok(true), "surface support"));
        assert_eq!(query_or_default(Ok(vec![1u32, 2]), "modes"), vec![1, 2]);
    }
}
