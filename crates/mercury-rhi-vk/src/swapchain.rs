// SPDX-License-Identifier: CEPL-1.0
use ash::khr::{surface, swapchain};
use ash::{vk, Instance};
use mercury_rhi::{
    choose_image_count, choose_present_mode, choose_surface_format, choose_swap_extent, Format,
    ImageSharing, ImageViewHandle, PresentModePreference, QueueFamilyIndices, RenderSize, RhiError,
    RhiResult, SwapchainInfo,
};
use slotmap::{Key, SlotMap};
use tracing::{info, warn};

use crate::convert;

const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Borrowed device-level objects the swapchain is built against.
pub(crate) struct SurfaceTarget<'a> {
    pub instance: &'a Instance,
    pub device: &'a ash::Device,
    pub surface_loader: &'a surface::Instance,
    pub surface: vk::SurfaceKHR,
    pub phys: vk::PhysicalDevice,
}

struct DepthTarget {
    image: vk::Image,
    memory: vk::DeviceMemory,
}

/// Owns the swapchain, its image views and the depth attachment. Views live
/// in the shared image-view table so framebuffers can reference them.
pub(crate) struct SwapchainManager {
    loader: swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    depth: DepthTarget,
    present_pref: PresentModePreference,
    info: SwapchainInfo,
}

unsafe fn pick_depth_format(instance: &Instance, phys: vk::PhysicalDevice) -> RhiResult<vk::Format> {
    DEPTH_CANDIDATES
        .into_iter()
        .find(|&fmt| {
            let props = unsafe { instance.get_physical_device_format_properties(phys, fmt) };
            props
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or_else(|| RhiError::creation("depth attachment", "no supported depth format"))
}

unsafe fn create_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> RhiResult<vk::ImageView> {
    let view_ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    unsafe { device.create_image_view(&view_ci, None) }.map_err(|e| RhiError::creation("image view", e))
}

unsafe fn create_depth(
    t: &SurfaceTarget<'_>,
    extent: vk::Extent2D,
    format: vk::Format,
) -> RhiResult<(DepthTarget, vk::ImageView)> {
    let img_ci = vk::ImageCreateInfo {
        s_type: vk::StructureType::IMAGE_CREATE_INFO,
        image_type: vk::ImageType::TYPE_2D,
        format,
        extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
        mip_levels: 1,
        array_layers: 1,
        samples: vk::SampleCountFlags::TYPE_1,
        tiling: vk::ImageTiling::OPTIMAL,
        usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        sharing_mode: vk::SharingMode::EXCLUSIVE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        ..Default::default()
    };
    let image = unsafe { t.device.create_image(&img_ci, None) }
        .map_err(|e| RhiError::creation("depth image", e))?;

    let req = unsafe { t.device.get_image_memory_requirements(image) };
    let mem_props = unsafe { t.instance.get_physical_device_memory_properties(t.phys) };
    let type_index = (0..mem_props.memory_type_count).find(|&i| {
        req.memory_type_bits & (1 << i) != 0
            && mem_props.memory_types[i as usize]
                .property_flags
                .contains(vk::MemoryPropertyFlags::DEVICE_LOCAL)
    });
    let Some(type_index) = type_index else {
        unsafe { t.device.destroy_image(image, None) };
        return Err(RhiError::creation("depth memory", "no device-local memory type"));
    };

    let alloc = vk::MemoryAllocateInfo {
        s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
        allocation_size: req.size,
        memory_type_index: type_index,
        ..Default::default()
    };
    let memory = match unsafe { t.device.allocate_memory(&alloc, None) } {
        Ok(m) => m,
        Err(e) => {
            unsafe { t.device.destroy_image(image, None) };
            return Err(RhiError::creation("depth memory", e));
        }
    };
    let depth = DepthTarget { image, memory };
    let bound = unsafe { t.device.bind_image_memory(image, memory, 0) }
        .map_err(|e| RhiError::creation("depth memory binding", e))
        .and_then(|()| unsafe { create_view(t.device, image, format, vk::ImageAspectFlags::DEPTH) });
    match bound {
        Ok(view) => Ok((depth, view)),
        Err(e) => {
            unsafe { depth.destroy(t.device) };
            Err(e)
        }
    }
}

impl DepthTarget {
    unsafe fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

impl SwapchainManager {
    pub(crate) unsafe fn new(
        t: &SurfaceTarget<'_>,
        views: &mut SlotMap<ImageViewHandle, vk::ImageView>,
        families: QueueFamilyIndices,
        present_pref: PresentModePreference,
        size: RenderSize,
    ) -> RhiResult<Self> {
        let depth_format = unsafe { pick_depth_format(t.instance, t.phys) }?;
        let sharing = match (families.graphics, families.present) {
            (Some(g), Some(p)) => ImageSharing::for_families(g, p),
            _ => ImageSharing::Exclusive,
        };
        let mut manager = Self {
            loader: swapchain::Device::new(t.instance, t.device),
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            depth: DepthTarget {
                image: vk::Image::null(),
                memory: vk::DeviceMemory::null(),
            },
            present_pref,
            info: SwapchainInfo {
                format: Format::UNDEFINED,
                color_space: mercury_rhi::ColorSpace::SRGB_NONLINEAR,
                extent: Default::default(),
                present_mode: mercury_rhi::PresentMode::Fifo,
                image_count: 0,
                image_views: Vec::new(),
                depth_format: Format(depth_format.as_raw()),
                depth_view: ImageViewHandle::null(),
                sharing,
            },
        };
        let size = RenderSize::new(size.width.max(1), size.height.max(1));
        unsafe { manager.build(t, views, size) }?;
        Ok(manager)
    }

    pub(crate) fn info(&self) -> &SwapchainInfo {
        &self.info
    }

    pub(crate) fn loader(&self) -> &swapchain::Device {
        &self.loader
    }

    pub(crate) fn raw(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    unsafe fn build(
        &mut self,
        t: &SurfaceTarget<'_>,
        views: &mut SlotMap<ImageViewHandle, vk::ImageView>,
        size: RenderSize,
    ) -> RhiResult<()> {
        // capabilities: image counts, transforms, current extent (or UINT_MAX for free-size)
        let caps = unsafe {
            t.surface_loader
                .get_physical_device_surface_capabilities(t.phys, t.surface)
        }
        .map_err(|e| RhiError::surface("get_physical_device_surface_capabilities", e))?;
        let formats: Vec<_> = unsafe {
            t.surface_loader
                .get_physical_device_surface_formats(t.phys, t.surface)
        }
        .map_err(|e| RhiError::surface("get_physical_device_surface_formats", e))?
        .into_iter()
        .map(convert::surface_format)
        .collect();
        let modes = unsafe {
            t.surface_loader
                .get_physical_device_surface_present_modes(t.phys, t.surface)
        }
        .map_err(|e| RhiError::surface("get_physical_device_surface_present_modes", e))?;

        let neutral_caps = convert::capabilities(&caps);
        let surf_format = choose_surface_format(&formats)
            .ok_or_else(|| RhiError::creation("swapchain", "surface reports no formats"))?;
        let present_mode = choose_present_mode(&convert::present_modes(&modes), self.present_pref);
        let extent = choose_swap_extent(&neutral_caps, size);
        let image_count = choose_image_count(&neutral_caps);

        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let concurrent_families;
        let mut swap_info = vk::SwapchainCreateInfoKHR::default()
            .surface(t.surface)
            .min_image_count(image_count)
            .image_format(convert::format(surf_format.format))
            .image_color_space(convert::color_space(surf_format.color_space))
            .image_extent(convert::extent(extent))
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(convert::present_mode(present_mode))
            .clipped(true);
        swap_info = match self.info.sharing {
            ImageSharing::Exclusive => swap_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE),
            ImageSharing::Concurrent(pair) => {
                concurrent_families = pair;
                swap_info
                    .image_sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(&concurrent_families)
            }
        };

        let swapchain = unsafe { self.loader.create_swapchain(&swap_info, None) }
            .map_err(|e| RhiError::creation("swapchain", e))?;
        let images = match unsafe { self.loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { self.loader.destroy_swapchain(swapchain, None) };
                return Err(RhiError::creation("swapchain images", e));
            }
        };
        self.swapchain = swapchain;
        self.images = images;

        // View format MUST match swapchain image format for direct rendering.
        let color_format = convert::format(surf_format.format);
        let mut image_views = Vec::with_capacity(self.images.len());
        for &image in &self.images {
            let view = unsafe { create_view(t.device, image, color_format, vk::ImageAspectFlags::COLOR) }?;
            image_views.push(views.insert(view));
        }

        let depth_format = convert::format(self.info.depth_format);
        let (depth, depth_view) = unsafe { create_depth(t, convert::extent(extent), depth_format) }?;
        self.depth = depth;

        info!(
            "swapchain: {:?}/{:?} {}x{} mode={:?} images={} (min={} max={})",
            surf_format.format,
            surf_format.color_space,
            extent.width,
            extent.height,
            present_mode,
            self.images.len(),
            caps.min_image_count,
            caps.max_image_count,
        );

        self.info = SwapchainInfo {
            format: surf_format.format,
            color_space: surf_format.color_space,
            extent,
            present_mode,
            image_count: self.images.len() as u32,
            image_views,
            depth_format: self.info.depth_format,
            depth_view: views.insert(depth_view),
            sharing: self.info.sharing,
        };
        Ok(())
    }

    /// Depth first, then color views, then the swapchain itself.
    pub(crate) unsafe fn destroy(
        &mut self,
        device: &ash::Device,
        views: &mut SlotMap<ImageViewHandle, vk::ImageView>,
    ) {
        unsafe {
            if let Some(view) = views.remove(self.info.depth_view) {
                device.destroy_image_view(view, None);
            }
            self.depth.destroy(device);
            self.depth = DepthTarget {
                image: vk::Image::null(),
                memory: vk::DeviceMemory::null(),
            };
            for handle in self.info.image_views.drain(..) {
                if let Some(view) = views.remove(handle) {
                    device.destroy_image_view(view, None);
                }
            }
            self.info.depth_view = ImageViewHandle::null();
            if self.swapchain != vk::SwapchainKHR::null() {
                self.loader.destroy_swapchain(self.swapchain, None);
                self.swapchain = vk::SwapchainKHR::null();
            }
            self.images.clear();
        }
    }

    // STRICT ORDER (recreate):
    // 1) device_wait_idle() so nothing still references the old images
    // 2) Destroy depth view/image/memory, then color views
    // 3) Destroy the old swapchain
    // 4) Rebuild swapchain, views and depth at the surface's current size
    // No retry loop here: a failed or skipped rebuild is retried by the next frame.
    pub(crate) unsafe fn recreate(
        &mut self,
        t: &SurfaceTarget<'_>,
        views: &mut SlotMap<ImageViewHandle, vk::ImageView>,
        size: RenderSize,
    ) -> RhiResult<()> {
        if size.is_empty() {
            warn!("recreate skipped: surface is {}x{}", size.width, size.height);
            return Ok(());
        }
        unsafe { t.device.device_wait_idle() }.map_err(|e| RhiError::device("device_wait_idle", e))?;
        unsafe {
            self.destroy(t.device, views);
            self.build(t, views, size)
        }
    }
}
