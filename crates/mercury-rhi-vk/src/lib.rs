// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan backend for the Mercury RHI, built on `ash`.

mod convert;
mod device;
mod instance;
mod resources;
mod swapchain;

use std::ffi::CString;
use std::sync::Arc;
use std::time::Duration;

use ash::ext::debug_utils;
use ash::khr::surface;
use ash::{vk, Entry, Instance};
use mercury_rhi::handle::*;
use mercury_rhi::rhi::push_constant_in_range;
use mercury_rhi::{
    AdapterInfo, CommandRecorder, DescriptorSetLayoutDesc, FramebufferDesc, GraphicsPipelineDesc,
    PipelineLayoutDesc, QueueFamilyIndices, Rect2D, RenderPassBeginDesc, RenderPassDesc,
    ResourceStats, Rhi, RhiError, RhiInitInfo, RhiResult, ShaderStageFlags, SubmitDesc,
    SurfaceProvider, SwapchainInfo, UsageError, Viewport,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{info, warn};

use crate::instance::DebugMessenger;
use crate::resources::{lookup, CommandBufferEntry, LayoutEntry, PoolEntry, ResourceTables};
use crate::swapchain::{SurfaceTarget, SwapchainManager};

pub struct VulkanRhi {
    _entry: Entry,
    instance: Instance,
    debug: Option<DebugMessenger>,
    labels: Option<debug_utils::Device>,

    surface_provider: Arc<dyn SurfaceProvider>,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,

    phys: vk::PhysicalDevice,
    adapter: AdapterInfo,
    families: QueueFamilyIndices,
    device: ash::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    _compute_queue: vk::Queue,

    swapchain: SwapchainManager,
    tables: ResourceTables,
    fence_wait_warning: Duration,
}

impl VulkanRhi {
    pub fn new(info: &RhiInitInfo) -> RhiResult<Self> {
        // STRICT ORDER:
        // 1) Entry + Instance (extensions from the display handle)
        // 2) Debug messenger (only if validation resolved on)
        // 3) Surface, BEFORE device selection: present support is per surface
        // 4) Physical device + logical device + queues
        // 5) Swapchain, views and depth at the window's framebuffer size
        let entry = instance::load_entry()?;
        let display = info
            .surface
            .display_handle()
            .map_err(|e| RhiError::surface("display_handle", e))?
            .as_raw();
        let window = info
            .surface
            .window_handle()
            .map_err(|e| RhiError::surface("window_handle", e))?
            .as_raw();

        let bundle = unsafe {
            instance::create_instance(
                &entry,
                display,
                &info.app_name,
                info.enable_validation,
                info.enable_debug_utils_label,
            )
        }?;
        let instance = bundle.instance;

        let debug = if bundle.validation && bundle.debug_utils {
            match unsafe { DebugMessenger::new(&entry, &instance) } {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("continuing without debug messenger: {e}");
                    None
                }
            }
        } else {
            None
        };

        let teardown_instance = |debug: &Option<DebugMessenger>, instance: &Instance| unsafe {
            if let Some(m) = debug {
                m.destroy();
            }
            instance.destroy_instance(None);
        };

        let surface = match unsafe { ash_window::create_surface(&entry, &instance, display, window, None) } {
            Ok(s) => s,
            Err(e) => {
                teardown_instance(&debug, &instance);
                return Err(RhiError::surface("create_surface", e));
            }
        };
        let surface_loader = surface::Instance::new(&entry, &instance);

        let dev = match unsafe { device::create_device(&instance, &surface_loader, surface) } {
            Ok(d) => d,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                teardown_instance(&debug, &instance);
                return Err(e);
            }
        };
        info!("vulkan device: {} ({:?})", dev.adapter.name, dev.adapter.device_type);

        let labels = (info.enable_debug_utils_label && bundle.debug_utils)
            .then(|| debug_utils::Device::new(&instance, &dev.device));

        let mut tables = ResourceTables::default();
        let target = SurfaceTarget {
            instance: &instance,
            device: &dev.device,
            surface_loader: &surface_loader,
            surface,
            phys: dev.phys,
        };
        let swapchain = match unsafe {
            SwapchainManager::new(
                &target,
                &mut tables.image_views,
                dev.families,
                info.present_mode,
                info.surface.framebuffer_size(),
            )
        } {
            Ok(s) => s,
            Err(e) => {
                unsafe {
                    tables.destroy_all(&dev.device);
                    dev.device.destroy_device(None);
                    surface_loader.destroy_surface(surface, None);
                }
                teardown_instance(&debug, &instance);
                return Err(e);
            }
        };

        Ok(Self {
            _entry: entry,
            instance,
            debug,
            labels,
            surface_provider: info.surface.clone(),
            surface_loader,
            surface,
            phys: dev.phys,
            adapter: dev.adapter,
            families: dev.families,
            device: dev.device,
            graphics_queue: dev.graphics_queue,
            present_queue: dev.present_queue,
            _compute_queue: dev.compute_queue,
            swapchain,
            tables,
            fence_wait_warning: info.fence_wait_warning,
        })
    }

    fn recorder(&mut self, cb: CommandBufferHandle, op: &'static str) -> RhiResult<&mut CommandBufferEntry> {
        self.tables
            .command_buffers
            .get_mut(cb)
            .ok_or_else(|| RhiError::usage(op, UsageError::UnknownHandle("command buffer")))
    }

    /// Validates against the recorder, then returns the raw buffer for the
    /// native call.
    fn record(
        &mut self,
        cb: CommandBufferHandle,
        op: &'static str,
        f: impl FnOnce(&mut CommandRecorder) -> Result<(), UsageError>,
    ) -> RhiResult<vk::CommandBuffer> {
        let entry = self.recorder(cb, op)?;
        f(&mut entry.recorder).map_err(|e| RhiError::usage(op, e))?;
        Ok(entry.raw)
    }
}

impl Rhi for VulkanRhi {
    fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn queue_families(&self) -> QueueFamilyIndices {
        self.families
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(|e| RhiError::device("device_wait_idle", e))
    }

    fn resource_stats(&self) -> ResourceStats {
        self.tables.stats()
    }

    fn swapchain(&self) -> &SwapchainInfo {
        self.swapchain.info()
    }

    fn recreate_swapchain(&mut self) -> RhiResult<()> {
        let size = self.surface_provider.framebuffer_size();
        let target = SurfaceTarget {
            instance: &self.instance,
            device: &self.device,
            surface_loader: &self.surface_loader,
            surface: self.surface,
            phys: self.phys,
        };
        unsafe { self.swapchain.recreate(&target, &mut self.tables.image_views, size) }
    }

    fn create_shader_module(&mut self, code: &[u8]) -> RhiResult<ShaderModuleHandle> {
        let raw = unsafe { resources::create_shader_module(&self.device, code) }?;
        Ok(self.tables.shader_modules.insert(raw))
    }

    fn destroy_shader_module(&mut self, h: ShaderModuleHandle) {
        if let Some(raw) = self.tables.shader_modules.remove(h) {
            unsafe { self.device.destroy_shader_module(raw, None) };
        }
    }

    fn create_descriptor_set_layout(
        &mut self,
        desc: &DescriptorSetLayoutDesc,
    ) -> RhiResult<DescriptorSetLayoutHandle> {
        let raw = unsafe { resources::create_descriptor_set_layout(&self.device, desc) }?;
        Ok(self.tables.set_layouts.insert(raw))
    }

    fn destroy_descriptor_set_layout(&mut self, h: DescriptorSetLayoutHandle) {
        if let Some(raw) = self.tables.set_layouts.remove(h) {
            unsafe { self.device.destroy_descriptor_set_layout(raw, None) };
        }
    }

    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> RhiResult<PipelineLayoutHandle> {
        let raw = unsafe { resources::create_pipeline_layout(&self.device, &self.tables, desc) }?;
        Ok(self.tables.pipeline_layouts.insert(LayoutEntry {
            raw,
            push_ranges: desc.push_constant_ranges.clone(),
        }))
    }

    fn destroy_pipeline_layout(&mut self, h: PipelineLayoutHandle) {
        if let Some(l) = self.tables.pipeline_layouts.remove(h) {
            unsafe { self.device.destroy_pipeline_layout(l.raw, None) };
        }
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RhiResult<RenderPassHandle> {
        let raw = unsafe { resources::create_render_pass(&self.device, desc) }?;
        Ok(self.tables.render_passes.insert(raw))
    }

    fn destroy_render_pass(&mut self, h: RenderPassHandle) {
        if let Some(raw) = self.tables.render_passes.remove(h) {
            unsafe { self.device.destroy_render_pass(raw, None) };
        }
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RhiResult<FramebufferHandle> {
        let raw = unsafe { resources::create_framebuffer(&self.device, &self.tables, desc) }?;
        Ok(self.tables.framebuffers.insert(raw))
    }

    fn destroy_framebuffer(&mut self, h: FramebufferHandle) {
        if let Some(raw) = self.tables.framebuffers.remove(h) {
            unsafe { self.device.destroy_framebuffer(raw, None) };
        }
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> RhiResult<PipelineHandle> {
        let entry = unsafe { resources::create_graphics_pipeline(&self.device, &self.tables, desc) }?;
        Ok(self.tables.pipelines.insert(entry))
    }

    fn destroy_pipeline(&mut self, h: PipelineHandle) {
        if let Some(p) = self.tables.pipelines.remove(h) {
            unsafe { self.device.destroy_pipeline(p.raw, None) };
        }
    }

    fn create_fence(&mut self, signaled: bool) -> RhiResult<FenceHandle> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let ci = vk::FenceCreateInfo::default().flags(flags);
        let raw = unsafe { self.device.create_fence(&ci, None) }.map_err(|e| RhiError::creation("fence", e))?;
        Ok(self.tables.fences.insert(raw))
    }

    fn destroy_fence(&mut self, h: FenceHandle) {
        if let Some(raw) = self.tables.fences.remove(h) {
            unsafe { self.device.destroy_fence(raw, None) };
        }
    }

    fn create_semaphore(&mut self) -> RhiResult<SemaphoreHandle> {
        let ci = vk::SemaphoreCreateInfo::default();
        let raw =
            unsafe { self.device.create_semaphore(&ci, None) }.map_err(|e| RhiError::creation("semaphore", e))?;
        Ok(self.tables.semaphores.insert(raw))
    }

    fn destroy_semaphore(&mut self, h: SemaphoreHandle) {
        if let Some(raw) = self.tables.semaphores.remove(h) {
            unsafe { self.device.destroy_semaphore(raw, None) };
        }
    }

    fn create_command_pool(&mut self) -> RhiResult<CommandPoolHandle> {
        let family = self
            .families
            .graphics
            .ok_or_else(|| RhiError::creation("command pool", "no graphics queue family"))?;
        let ci = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(family);
        let raw = unsafe { self.device.create_command_pool(&ci, None) }
            .map_err(|e| RhiError::creation("command pool", e))?;
        Ok(self.tables.command_pools.insert(PoolEntry {
            raw,
            buffers: Vec::new(),
        }))
    }

    fn destroy_command_pool(&mut self, h: CommandPoolHandle) {
        if let Some(pool) = self.tables.command_pools.remove(h) {
            for cb in pool.buffers {
                self.tables.command_buffers.remove(cb);
            }
            // Destroying the pool frees its buffers.
            unsafe { self.device.destroy_command_pool(pool.raw, None) };
        }
    }

    fn allocate_command_buffer(&mut self, pool: CommandPoolHandle) -> RhiResult<CommandBufferHandle> {
        let raw_pool = self
            .tables
            .command_pools
            .get(pool)
            .map(|p| p.raw)
            .ok_or_else(|| RhiError::creation("command buffer", "unknown command pool"))?;
        let ai = vk::CommandBufferAllocateInfo::default()
            .command_pool(raw_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let raw = unsafe { self.device.allocate_command_buffers(&ai) }
            .map_err(|e| RhiError::creation("command buffer", e))?
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::creation("command buffer", "driver returned no buffer"))?;
        let cb = self.tables.command_buffers.insert(CommandBufferEntry {
            raw,
            recorder: CommandRecorder::new(),
        });
        if let Some(p) = self.tables.command_pools.get_mut(pool) {
            p.buffers.push(cb);
        }
        Ok(cb)
    }

    fn wait_for_fence(&mut self, fence: FenceHandle) -> RhiResult<()> {
        let raw = *lookup(&self.tables.fences, fence, "fence", "wait_for_fence")?;
        let timeout = u64::try_from(self.fence_wait_warning.as_nanos()).unwrap_or(u64::MAX);
        let mut waited = Duration::ZERO;
        loop {
            match unsafe { self.device.wait_for_fences(&[raw], true, timeout) } {
                Ok(()) => return Ok(()),
                Err(vk::Result::TIMEOUT) => {
                    waited += self.fence_wait_warning;
                    warn!("fence wait exceeded {waited:?}; still waiting");
                }
                Err(e) => return Err(RhiError::device("wait_for_fences", e)),
            }
        }
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> RhiResult<()> {
        let raw = *lookup(&self.tables.fences, fence, "fence", "reset_fence")?;
        unsafe { self.device.reset_fences(&[raw]) }.map_err(|e| RhiError::device("reset_fences", e))
    }

    fn reset_command_pool(&mut self, pool: CommandPoolHandle) -> RhiResult<()> {
        let entry = lookup(&self.tables.command_pools, pool, "command pool", "reset_command_pool")?;
        let raw = entry.raw;
        let buffers = entry.buffers.clone();
        unsafe { self.device.reset_command_pool(raw, vk::CommandPoolResetFlags::empty()) }
            .map_err(|e| RhiError::device("reset_command_pool", e))?;
        for cb in buffers {
            if let Some(c) = self.tables.command_buffers.get_mut(cb) {
                c.recorder.reset();
            }
        }
        Ok(())
    }

    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> RhiResult<u32> {
        let sem = *lookup(&self.tables.semaphores, signal, "semaphore", "acquire_next_image")?;
        let result = unsafe {
            self.swapchain
                .loader()
                .acquire_next_image(self.swapchain.raw(), u64::MAX, sem, vk::Fence::null())
        };
        match result {
            Ok((index, false)) => Ok(index),
            // Suboptimal still signals the semaphore; the caller replaces it.
            Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RhiError::SwapchainStale),
            Err(e) => Err(RhiError::device("acquire_next_image", e)),
        }
    }

    fn queue_submit(&mut self, submit: &SubmitDesc) -> RhiResult<()> {
        const OP: &str = "queue_submit";
        let cb = lookup(&self.tables.command_buffers, submit.command_buffer, "command buffer", OP)?;
        if cb.recorder.buffer_state() != mercury_rhi::recording::BufferState::Executable {
            return Err(RhiError::usage(OP, UsageError::CommandBufferNotRecording));
        }
        let command_buffers = [cb.raw];
        let wait_semaphores = [*lookup(&self.tables.semaphores, submit.wait_semaphore, "semaphore", OP)?];
        let signal_semaphores = [*lookup(&self.tables.semaphores, submit.signal_semaphore, "semaphore", OP)?];
        let wait_stages = [convert::pipeline_stages(submit.wait_stage)];
        let fence = *lookup(&self.tables.fences, submit.fence, "fence", OP)?;

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe { self.device.queue_submit(self.graphics_queue, &[submit_info], fence) }
            .map_err(|e| RhiError::device("queue_submit", e))
    }

    fn queue_present(&mut self, wait: SemaphoreHandle, image_index: u32) -> RhiResult<()> {
        if image_index >= self.swapchain.info().image_count {
            return Err(RhiError::usage("queue_present", UsageError::OutOfRange("image index")));
        }
        let wait_semaphores = [*lookup(&self.tables.semaphores, wait, "semaphore", "queue_present")?];
        let swapchains = [self.swapchain.raw()];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);
        match unsafe { self.swapchain.loader().queue_present(self.present_queue, &present_info) } {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(RhiError::SwapchainStale),
            Err(e) => Err(RhiError::device("queue_present", e)),
        }
    }

    fn begin_command_buffer(&mut self, cb: CommandBufferHandle) -> RhiResult<()> {
        let raw = self.record(cb, "begin_command_buffer", |r| r.begin())?;
        let bi = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(raw, &bi) }
            .map_err(|e| RhiError::device("begin_command_buffer", e))
    }

    fn end_command_buffer(&mut self, cb: CommandBufferHandle) -> RhiResult<()> {
        let raw = self.record(cb, "end_command_buffer", |r| r.end())?;
        unsafe { self.device.end_command_buffer(raw) }.map_err(|e| RhiError::device("end_command_buffer", e))
    }

    fn cmd_begin_render_pass(&mut self, cb: CommandBufferHandle, begin: &RenderPassBeginDesc) -> RhiResult<()> {
        const OP: &str = "cmd_begin_render_pass";
        let render_pass = *lookup(&self.tables.render_passes, begin.render_pass, "render pass", OP)?;
        let framebuffer = *lookup(&self.tables.framebuffers, begin.framebuffer, "framebuffer", OP)?;
        let clear_values: Vec<vk::ClearValue> = begin.clear_values.iter().copied().map(convert::clear_value).collect();
        let raw = self.record(cb, OP, |r| r.begin_render_pass())?;
        let bi = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(convert::rect(begin.render_area))
            .clear_values(&clear_values);
        unsafe {
            self.device
                .cmd_begin_render_pass(raw, &bi, vk::SubpassContents::INLINE)
        };
        Ok(())
    }

    fn cmd_end_render_pass(&mut self, cb: CommandBufferHandle) -> RhiResult<()> {
        let raw = self.record(cb, "cmd_end_render_pass", |r| r.end_render_pass())?;
        unsafe { self.device.cmd_end_render_pass(raw) };
        Ok(())
    }

    fn cmd_bind_pipeline(&mut self, cb: CommandBufferHandle, pipeline: PipelineHandle) -> RhiResult<()> {
        let p = lookup(&self.tables.pipelines, pipeline, "pipeline", "cmd_bind_pipeline")?;
        let (pipe, vp, sc) = (p.raw, p.dynamic_viewport, p.dynamic_scissor);
        let raw = self.record(cb, "cmd_bind_pipeline", |r| r.bind_pipeline(vp, sc))?;
        unsafe {
            self.device
                .cmd_bind_pipeline(raw, vk::PipelineBindPoint::GRAPHICS, pipe)
        };
        Ok(())
    }

    fn cmd_set_viewport(&mut self, cb: CommandBufferHandle, viewport: Viewport) -> RhiResult<()> {
        if viewport.width <= 0.0 || viewport.height == 0.0 {
            return Err(RhiError::usage("cmd_set_viewport", UsageError::OutOfRange("viewport")));
        }
        let raw = self.record(cb, "cmd_set_viewport", |r| r.set_viewport())?;
        unsafe { self.device.cmd_set_viewport(raw, 0, &[convert::viewport(viewport)]) };
        Ok(())
    }

    fn cmd_set_scissor(&mut self, cb: CommandBufferHandle, scissor: Rect2D) -> RhiResult<()> {
        let raw = self.record(cb, "cmd_set_scissor", |r| r.set_scissor())?;
        unsafe { self.device.cmd_set_scissor(raw, 0, &[convert::rect(scissor)]) };
        Ok(())
    }

    fn cmd_push_constants(
        &mut self,
        cb: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> RhiResult<()> {
        const OP: &str = "cmd_push_constants";
        let l = lookup(&self.tables.pipeline_layouts, layout, "pipeline layout", OP)?;
        if !push_constant_in_range(&l.push_ranges, stages, offset, data.len()) {
            return Err(RhiError::usage(OP, UsageError::OutOfRange("push constant range")));
        }
        let raw_layout = l.raw;
        let raw = self.record(cb, OP, |r| r.push_constants())?;
        unsafe {
            self.device
                .cmd_push_constants(raw, raw_layout, convert::shader_stages(stages), offset, data)
        };
        Ok(())
    }

    fn cmd_draw(
        &mut self,
        cb: CommandBufferHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> RhiResult<()> {
        let raw = self.record(cb, "cmd_draw", |r| r.draw())?;
        unsafe {
            self.device
                .cmd_draw(raw, vertex_count, instance_count, first_vertex, first_instance)
        };
        Ok(())
    }

    fn cmd_push_event(&mut self, cb: CommandBufferHandle, name: &str, color: [f32; 4]) -> RhiResult<()> {
        let raw = self.record(cb, "cmd_push_event", |r| r.push_label())?;
        if let Some(labels) = &self.labels {
            let name = label_name(name);
            let label = vk::DebugUtilsLabelEXT::default().label_name(&name).color(color);
            unsafe { labels.cmd_begin_debug_utils_label(raw, &label) };
        }
        Ok(())
    }

    fn cmd_pop_event(&mut self, cb: CommandBufferHandle) -> RhiResult<()> {
        let entry = self.recorder(cb, "cmd_pop_event")?;
        let raw = entry.raw;
        let popped = entry
            .recorder
            .pop_label()
            .map_err(|e| RhiError::usage("cmd_pop_event", e))?;
        if let (true, Some(labels)) = (popped, &self.labels) {
            unsafe { labels.cmd_end_debug_utils_label(raw) };
        }
        Ok(())
    }
}

/// Debug label text; interior NULs are dropped rather than losing the label.
fn label_name(name: &str) -> CString {
    CString::new(name).unwrap_or_else(|e| {
        warn!("debug label {name:?} contains NUL at byte {}", e.nul_position());
        let mut bytes = e.into_vec();
        bytes.retain(|&b| b != 0);
        CString::new(bytes).unwrap_or_default()
    })
}

impl Drop for VulkanRhi {
    fn drop(&mut self) {
        // STRICT ORDER:
        // 1) Wait idle so nothing is in flight
        // 2) Swapchain depth + views + swapchain
        // 3) Everything the renderer leaked (pipelines, framebuffers, sync...)
        // 4) Device
        // 5) Debug messenger, surface
        // 6) Instance last
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                warn!("device_wait_idle at teardown failed ({e:?}); destroying anyway");
            }
            self.swapchain.destroy(&self.device, &mut self.tables.image_views);
            self.tables.destroy_all(&self.device);
            self.device.destroy_device(None);
            if let Some(m) = self.debug.take() {
                m.destroy();
            }
            self.surface_loader.destroy_surface(self.surface, None);
            self.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_keeps_text_around_nul() {
        assert_eq!(label_name("debug draw").as_bytes(), b"debug draw");
        assert_eq!(label_name("debug\0draw").as_bytes(), b"debugdraw");
    }
}
