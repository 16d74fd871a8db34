// SPDX-License-Identifier: CEPL-1.0
use ash::khr::{surface, swapchain};
use ash::{vk, Instance};
use mercury_rhi::{
    select_adapter, AdapterInfo, QueueFamilyIndices, QueueFamilyInfo, RhiError, RhiResult,
    REQUIRED_DEVICE_EXTENSIONS,
};
use tracing::info;

use crate::convert;
use crate::instance::query_or_default;

pub(crate) struct DeviceBundle {
    pub phys: vk::PhysicalDevice,
    pub adapter: AdapterInfo,
    pub families: QueueFamilyIndices,
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    /// Resolved and retrieved; nothing submits to it yet.
    pub compute_queue: vk::Queue,
}

unsafe fn describe(
    instance: &Instance,
    surf: &surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
) -> AdapterInfo {
    let props = unsafe { instance.get_physical_device_properties(phys) };
    let name = props
        .device_name_as_c_str()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unnamed>".to_string());

    let queue_families = unsafe { instance.get_physical_device_queue_family_properties(phys) }
        .iter()
        .enumerate()
        .map(|(i, q)| QueueFamilyInfo {
            flags: convert::queue_flags(q.queue_flags),
            queue_count: q.queue_count,
            present_support: query_or_default(
                unsafe { surf.get_physical_device_surface_support(phys, i as u32, surface) },
                "vkGetPhysicalDeviceSurfaceSupportKHR",
            ),
        })
        .collect();

    let extensions = query_or_default(
        unsafe { instance.enumerate_device_extension_properties(phys) },
        "vkEnumerateDeviceExtensionProperties",
    )
        .iter()
        .filter_map(|e| e.extension_name_as_c_str().ok())
        .map(|s| s.to_string_lossy().into_owned())
        .collect();

    let surface_formats = query_or_default(
        unsafe { surf.get_physical_device_surface_formats(phys, surface) },
        "vkGetPhysicalDeviceSurfaceFormatsKHR",
    )
        .into_iter()
        .map(convert::surface_format)
        .collect();
    let present_modes = convert::present_modes(&query_or_default(
        unsafe { surf.get_physical_device_surface_present_modes(phys, surface) },
        "vkGetPhysicalDeviceSurfacePresentModesKHR",
    ));
    let features = unsafe { instance.get_physical_device_features(phys) };

    AdapterInfo {
        name,
        device_type: convert::device_type(props.device_type),
        queue_families,
        extensions,
        surface_formats,
        present_modes,
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
    }
}

pub(crate) unsafe fn create_device(
    instance: &Instance,
    surf: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> RhiResult<DeviceBundle> {
    // STRICT ORDER:
    // 1) Describe every physical device AGAINST THIS SURFACE (present support, formats)
    // 2) Score + filter (shared policy)
    // 3) One queue-create-info per unique family, then VkDevice
    let physical = unsafe { instance.enumerate_physical_devices() }
        .map_err(|e| RhiError::device("enumerate_physical_devices", e))?;
    let adapters: Vec<AdapterInfo> = physical
        .iter()
        .map(|&p| unsafe { describe(instance, surf, surface, p) })
        .collect();

    let selected = select_adapter(&adapters, REQUIRED_DEVICE_EXTENSIONS)?;
    let phys = physical[selected.index];
    let adapter = adapters[selected.index].clone();
    let families = QueueFamilyIndices {
        graphics: Some(selected.graphics_family),
        present: Some(selected.present_family),
        compute: Some(selected.compute_family),
    };

    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&priorities)
        })
        .collect();

    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: vk::TRUE,
        ..Default::default()
    };
    let extensions = [swapchain::NAME.as_ptr()];
    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);

    let device = unsafe { instance.create_device(phys, &create_info, None) }
        .map_err(|e| RhiError::creation("logical device", e))?;

    let (graphics_queue, present_queue, compute_queue) = unsafe {
        (
            device.get_device_queue(selected.graphics_family, 0),
            device.get_device_queue(selected.present_family, 0),
            device.get_device_queue(selected.compute_family, 0),
        )
    };
    info!(
        "queues: graphics={} present={} compute={}",
        selected.graphics_family, selected.present_family, selected.compute_family
    );

    Ok(DeviceBundle {
        phys,
        adapter,
        families,
        device,
        graphics_queue,
        present_queue,
        compute_queue,
    })
}
