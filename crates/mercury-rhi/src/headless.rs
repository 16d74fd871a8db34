// SPDX-License-Identifier: CEPL-1.0
//! Software-simulated backend.
//!
//! `HeadlessRhi` validates every call the way a driver with validation layers
//! would, but executes nothing. The simulated GPU queue only retires work when
//! the CPU waits on a fence (or the device), which makes backpressure and
//! in-flight bounds directly observable through [`HeadlessEvent`]s.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use slotmap::{Key, SlotMap};
use tracing::{debug, info};

use crate::device::{
    select_adapter, AdapterInfo, DeviceType, QueueFamilyIndices, QueueFamilyInfo, QueueFlags,
    REQUIRED_DEVICE_EXTENSIONS,
};
use crate::error::{RhiError, RhiResult, UsageError};
use crate::handle::*;
use crate::recording::{BufferState, CommandRecorder};
use crate::rhi::{push_constant_in_range, ResourceStats, Rhi, RhiInitInfo, SubmitDesc, SurfaceProvider};
use crate::swapchain::{
    choose_image_count, choose_present_mode, choose_surface_format, choose_swap_extent, ImageSharing,
    PresentModePreference, SurfaceCapabilities, SwapchainInfo,
};
use crate::types::*;
use crate::RenderSize;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// A window stand-in whose size tests can change at will.
#[derive(Debug)]
pub struct HeadlessSurface {
    size: Mutex<RenderSize>,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            size: Mutex::new(RenderSize::new(width, height)),
        })
    }

    pub fn resize(&self, width: u32, height: u32) {
        let mut size = self.size.lock().unwrap_or_else(|e| e.into_inner());
        *size = RenderSize::new(width, height);
    }
}

impl HasWindowHandle for HeadlessSurface {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl HasDisplayHandle for HeadlessSurface {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        Err(HandleError::Unavailable)
    }
}

impl SurfaceProvider for HeadlessSurface {
    fn framebuffer_size(&self) -> RenderSize {
        *self.size.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// What the simulated machine looks like.
#[derive(Clone, Debug)]
pub struct HeadlessConfig {
    pub adapters: Vec<AdapterInfo>,
    pub capabilities: SurfaceCapabilities,
}

impl HeadlessConfig {
    pub fn default_adapter() -> AdapterInfo {
        AdapterInfo {
            name: "Mercury Headless".to_string(),
            device_type: DeviceType::DiscreteGpu,
            queue_families: vec![QueueFamilyInfo {
                flags: QueueFlags::GRAPHICS | QueueFlags::COMPUTE | QueueFlags::TRANSFER,
                queue_count: 1,
                present_support: true,
            }],
            extensions: REQUIRED_DEVICE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            surface_formats: vec![
                SurfaceFormat {
                    format: Format::R8G8B8A8_SRGB,
                    color_space: ColorSpace::SRGB_NONLINEAR,
                },
                SurfaceFormat {
                    format: Format::B8G8R8A8_UNORM,
                    color_space: ColorSpace::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![PresentMode::Fifo, PresentMode::Mailbox],
            sampler_anisotropy: true,
        }
    }
}

impl Default for HeadlessConfig {
    fn default() -> Self {
        Self {
            adapters: vec![Self::default_adapter()],
            capabilities: SurfaceCapabilities {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: Extent2D::new(u32::MAX, u32::MAX),
                min_image_extent: Extent2D::new(1, 1),
                max_image_extent: Extent2D::new(4096, 4096),
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadlessEvent {
    /// `blocked` is true when the fence was unsignaled and the CPU had to
    /// wait for the simulated GPU.
    FenceWait { fence: FenceHandle, blocked: bool },
    FenceReset { fence: FenceHandle },
    Acquire { image_index: u32 },
    AcquireStale,
    ResetCommandPool { pool: CommandPoolHandle },
    Submit { fence: FenceHandle, in_flight: usize },
    Present { image_index: u32 },
    PresentStale,
    RecreateSwapchain { extent: Extent2D },
    WaitIdle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StaleInjection {
    None,
    OutOfDate,
    /// Signals the semaphore, then reports stale.
    Suboptimal,
}

struct SimPipeline {
    dynamic_viewport: bool,
    dynamic_scissor: bool,
}

struct SimCommandBuffer {
    pool: CommandPoolHandle,
    recorder: CommandRecorder,
}

pub struct HeadlessRhi {
    surface: Arc<dyn SurfaceProvider>,
    adapter: AdapterInfo,
    families: QueueFamilyIndices,
    caps: SurfaceCapabilities,
    present_pref: PresentModePreference,
    swapchain: SwapchainInfo,
    next_image: u32,

    shader_modules: SlotMap<ShaderModuleHandle, usize>,
    set_layouts: SlotMap<DescriptorSetLayoutHandle, DescriptorSetLayoutDesc>,
    pipeline_layouts: SlotMap<PipelineLayoutHandle, PipelineLayoutDesc>,
    render_passes: SlotMap<RenderPassHandle, RenderPassDesc>,
    framebuffers: SlotMap<FramebufferHandle, FramebufferDesc>,
    pipelines: SlotMap<PipelineHandle, SimPipeline>,
    image_views: SlotMap<ImageViewHandle, Extent2D>,
    fences: SlotMap<FenceHandle, bool>,
    semaphores: SlotMap<SemaphoreHandle, bool>,
    command_pools: SlotMap<CommandPoolHandle, Vec<CommandBufferHandle>>,
    command_buffers: SlotMap<CommandBufferHandle, SimCommandBuffer>,

    gpu_queue: VecDeque<FenceHandle>,
    max_in_flight: usize,
    pipelines_created: usize,
    draws_recorded: u64,
    acquire_injection: StaleInjection,
    present_injection: bool,
    submit_failure: bool,
    events: Vec<HeadlessEvent>,
}

fn lookup<'a, K: Key, V>(map: &'a SlotMap<K, V>, key: K, what: &'static str, op: &'static str) -> RhiResult<&'a V> {
    map.get(key)
        .ok_or_else(|| RhiError::usage(op, UsageError::UnknownHandle(what)))
}

/// `offset..offset + len` lies inside `0..limit`.
fn span_fits(offset: i32, len: u32, limit: u32) -> bool {
    u32::try_from(offset)
        .ok()
        .and_then(|start| start.checked_add(len))
        .is_some_and(|end| end <= limit)
}

impl HeadlessRhi {
    pub fn new(info: &RhiInitInfo, config: HeadlessConfig) -> RhiResult<Self> {
        let selected = select_adapter(&config.adapters, REQUIRED_DEVICE_EXTENSIONS)?;
        let adapter = config.adapters[selected.index].clone();
        let families = QueueFamilyIndices {
            graphics: Some(selected.graphics_family),
            present: Some(selected.present_family),
            compute: Some(selected.compute_family),
        };
        info!("headless device: {}", adapter.name);

        let mut rhi = Self {
            surface: info.surface.clone(),
            families,
            caps: config.capabilities,
            present_pref: info.present_mode,
            swapchain: SwapchainInfo {
                format: Format::UNDEFINED,
                color_space: ColorSpace::SRGB_NONLINEAR,
                extent: Extent2D::default(),
                present_mode: PresentMode::Fifo,
                image_count: 0,
                image_views: Vec::new(),
                depth_format: Format::D32_SFLOAT,
                depth_view: ImageViewHandle::null(),
                sharing: ImageSharing::for_families(selected.graphics_family, selected.present_family),
            },
            adapter,
            next_image: 0,
            shader_modules: SlotMap::with_key(),
            set_layouts: SlotMap::with_key(),
            pipeline_layouts: SlotMap::with_key(),
            render_passes: SlotMap::with_key(),
            framebuffers: SlotMap::with_key(),
            pipelines: SlotMap::with_key(),
            image_views: SlotMap::with_key(),
            fences: SlotMap::with_key(),
            semaphores: SlotMap::with_key(),
            command_pools: SlotMap::with_key(),
            command_buffers: SlotMap::with_key(),
            gpu_queue: VecDeque::new(),
            max_in_flight: 0,
            pipelines_created: 0,
            draws_recorded: 0,
            acquire_injection: StaleInjection::None,
            present_injection: false,
            submit_failure: false,
            events: Vec::new(),
        };
        rhi.build_swapchain()?;
        Ok(rhi)
    }

    pub fn events(&self) -> &[HeadlessEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<HeadlessEvent> {
        std::mem::take(&mut self.events)
    }

    /// Submissions the simulated GPU has not yet retired.
    pub fn in_flight(&self) -> usize {
        self.gpu_queue.len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// Total graphics pipelines ever created.
    pub fn pipelines_created(&self) -> usize {
        self.pipelines_created
    }

    pub fn draws_recorded(&self) -> u64 {
        self.draws_recorded
    }

    /// Next acquire reports out-of-date.
    pub fn inject_out_of_date(&mut self) {
        self.acquire_injection = StaleInjection::OutOfDate;
    }

    /// Next acquire signals its semaphore and reports suboptimal.
    pub fn inject_suboptimal(&mut self) {
        self.acquire_injection = StaleInjection::Suboptimal;
    }

    /// Next present reports stale.
    pub fn inject_stale_present(&mut self) {
        self.present_injection = true;
    }

    /// Next submit is rejected by the simulated driver.
    pub fn inject_submit_failure(&mut self) {
        self.submit_failure = true;
    }

    pub fn framebuffer_extent(&self, h: FramebufferHandle) -> Option<Extent2D> {
        self.framebuffers
            .get(h)
            .map(|fb| Extent2D::new(fb.width, fb.height))
    }

    fn wanted_extent(&self) -> Extent2D {
        let size = self.surface.framebuffer_size();
        let want = RenderSize::new(size.width.max(1), size.height.max(1));
        choose_swap_extent(&self.caps, want)
    }

    fn surface_changed(&self) -> bool {
        self.wanted_extent() != self.swapchain.extent
    }

    fn build_swapchain(&mut self) -> RhiResult<()> {
        let format = choose_surface_format(&self.adapter.surface_formats)
            .ok_or_else(|| RhiError::creation("swapchain", "surface reports no formats"))?;
        let present_mode = choose_present_mode(&self.adapter.present_modes, self.present_pref);
        let extent = self.wanted_extent();
        let image_count = choose_image_count(&self.caps);

        let image_views: Vec<ImageViewHandle> = (0..image_count).map(|_| self.image_views.insert(extent)).collect();
        let depth_view = self.image_views.insert(extent);

        self.swapchain = SwapchainInfo {
            format: format.format,
            color_space: format.color_space,
            extent,
            present_mode,
            image_count,
            image_views,
            depth_format: Format::D32_SFLOAT,
            depth_view,
            sharing: self.swapchain.sharing,
        };
        self.next_image = 0;
        debug!(
            "headless swapchain {}x{} images={image_count} mode={present_mode:?}",
            extent.width, extent.height
        );
        Ok(())
    }

    fn destroy_swapchain(&mut self) {
        for view in self.swapchain.image_views.drain(..) {
            self.image_views.remove(view);
        }
        self.image_views.remove(self.swapchain.depth_view);
        self.swapchain.depth_view = ImageViewHandle::null();
    }

    /// Retires queued submissions in order up to and including `fence`.
    fn retire_until(&mut self, fence: FenceHandle) {
        while let Some(done) = self.gpu_queue.pop_front() {
            if let Some(signaled) = self.fences.get_mut(done) {
                *signaled = true;
            }
            if done == fence {
                break;
            }
        }
    }

    fn recorder(&mut self, cb: CommandBufferHandle, op: &'static str) -> RhiResult<&mut CommandRecorder> {
        self.command_buffers
            .get_mut(cb)
            .map(|c| &mut c.recorder)
            .ok_or_else(|| RhiError::usage(op, UsageError::UnknownHandle("command buffer")))
    }

    fn record(
        &mut self,
        cb: CommandBufferHandle,
        op: &'static str,
        f: impl FnOnce(&mut CommandRecorder) -> Result<(), UsageError>,
    ) -> RhiResult<()> {
        let rec = self.recorder(cb, op)?;
        f(rec).map_err(|e| RhiError::usage(op, e))
    }
}

impl Rhi for HeadlessRhi {
    fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn queue_families(&self) -> QueueFamilyIndices {
        self.families
    }

    fn wait_idle(&mut self) -> RhiResult<()> {
        while let Some(done) = self.gpu_queue.pop_front() {
            if let Some(signaled) = self.fences.get_mut(done) {
                *signaled = true;
            }
        }
        self.events.push(HeadlessEvent::WaitIdle);
        Ok(())
    }

    fn resource_stats(&self) -> ResourceStats {
        ResourceStats {
            shader_modules: self.shader_modules.len(),
            descriptor_set_layouts: self.set_layouts.len(),
            pipeline_layouts: self.pipeline_layouts.len(),
            render_passes: self.render_passes.len(),
            framebuffers: self.framebuffers.len(),
            pipelines: self.pipelines.len(),
            image_views: self.image_views.len(),
            fences: self.fences.len(),
            semaphores: self.semaphores.len(),
            command_pools: self.command_pools.len(),
            command_buffers: self.command_buffers.len(),
        }
    }

    fn swapchain(&self) -> &SwapchainInfo {
        &self.swapchain
    }

    fn recreate_swapchain(&mut self) -> RhiResult<()> {
        self.wait_idle()?;
        self.destroy_swapchain();
        self.build_swapchain()?;
        self.events.push(HeadlessEvent::RecreateSwapchain {
            extent: self.swapchain.extent,
        });
        Ok(())
    }

    fn create_shader_module(&mut self, code: &[u8]) -> RhiResult<ShaderModuleHandle> {
        if code.is_empty() || code.len() % 4 != 0 {
            return Err(RhiError::creation(
                "shader module",
                format!("byte length {} is not a positive multiple of 4", code.len()),
            ));
        }
        let magic = u32::from_le_bytes([code[0], code[1], code[2], code[3]]);
        if magic != SPIRV_MAGIC {
            return Err(RhiError::creation("shader module", format!("bad magic {magic:#010x}")));
        }
        Ok(self.shader_modules.insert(code.len() / 4))
    }

    fn destroy_shader_module(&mut self, h: ShaderModuleHandle) {
        self.shader_modules.remove(h);
    }

    fn create_descriptor_set_layout(
        &mut self,
        desc: &DescriptorSetLayoutDesc,
    ) -> RhiResult<DescriptorSetLayoutHandle> {
        for (i, b) in desc.bindings.iter().enumerate() {
            if desc.bindings[..i].iter().any(|o| o.binding == b.binding) {
                return Err(RhiError::creation(
                    "descriptor set layout",
                    format!("binding {} declared twice", b.binding),
                ));
            }
        }
        Ok(self.set_layouts.insert(desc.clone()))
    }

    fn destroy_descriptor_set_layout(&mut self, h: DescriptorSetLayoutHandle) {
        self.set_layouts.remove(h);
    }

    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> RhiResult<PipelineLayoutHandle> {
        if desc.set_layouts.iter().any(|&h| !self.set_layouts.contains_key(h)) {
            return Err(RhiError::creation("pipeline layout", "unknown descriptor set layout"));
        }
        if desc.push_constant_ranges.iter().any(|r| r.size == 0 || r.size % 4 != 0 || r.offset % 4 != 0) {
            return Err(RhiError::creation("pipeline layout", "push constant range must be 4-byte aligned"));
        }
        Ok(self.pipeline_layouts.insert(desc.clone()))
    }

    fn destroy_pipeline_layout(&mut self, h: PipelineLayoutHandle) {
        self.pipeline_layouts.remove(h);
    }

    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RhiResult<RenderPassHandle> {
        if desc.subpasses.is_empty() {
            return Err(RhiError::creation("render pass", "no subpasses"));
        }
        let count = desc.attachments.len() as u32;
        let bad_ref = desc.subpasses.iter().any(|s| {
            s.color_attachments
                .iter()
                .chain(s.input_attachments.iter())
                .chain(s.depth_stencil_attachment.iter())
                .any(|r| r.attachment >= count)
        });
        if bad_ref {
            return Err(RhiError::creation("render pass", "attachment reference out of range"));
        }
        Ok(self.render_passes.insert(desc.clone()))
    }

    fn destroy_render_pass(&mut self, h: RenderPassHandle) {
        self.render_passes.remove(h);
    }

    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RhiResult<FramebufferHandle> {
        let pass = self
            .render_passes
            .get(desc.render_pass)
            .ok_or_else(|| RhiError::creation("framebuffer", "unknown render pass"))?;
        if pass.attachments.len() != desc.attachments.len() {
            return Err(RhiError::creation(
                "framebuffer",
                format!(
                    "{} views for {} render pass attachments",
                    desc.attachments.len(),
                    pass.attachments.len()
                ),
            ));
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::creation("framebuffer", "zero extent"));
        }
        for &view in &desc.attachments {
            let extent = self
                .image_views
                .get(view)
                .ok_or_else(|| RhiError::creation("framebuffer", "unknown image view"))?;
            if extent.width < desc.width || extent.height < desc.height {
                return Err(RhiError::creation("framebuffer", "attachment smaller than framebuffer"));
            }
        }
        Ok(self.framebuffers.insert(desc.clone()))
    }

    fn destroy_framebuffer(&mut self, h: FramebufferHandle) {
        self.framebuffers.remove(h);
    }

    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> RhiResult<PipelineHandle> {
        if !self.pipeline_layouts.contains_key(desc.layout) {
            return Err(RhiError::creation("graphics pipeline", "unknown pipeline layout"));
        }
        let pass = self
            .render_passes
            .get(desc.render_pass)
            .ok_or_else(|| RhiError::creation("graphics pipeline", "unknown render pass"))?;
        if desc.subpass as usize >= pass.subpasses.len() {
            return Err(RhiError::creation("graphics pipeline", "subpass out of range"));
        }
        if desc.stages.is_empty() || desc.stages.iter().any(|s| !self.shader_modules.contains_key(s.module)) {
            return Err(RhiError::creation("graphics pipeline", "missing or unknown shader stage"));
        }
        let dynamic_viewport = desc.is_dynamic(DynamicState::Viewport);
        let dynamic_scissor = desc.is_dynamic(DynamicState::Scissor);
        if (!dynamic_viewport && desc.viewport.viewports.is_empty())
            || (!dynamic_scissor && desc.viewport.scissors.is_empty())
        {
            return Err(RhiError::creation("graphics pipeline", "static viewport/scissor missing"));
        }
        self.pipelines_created += 1;
        Ok(self.pipelines.insert(SimPipeline {
            dynamic_viewport,
            dynamic_scissor,
        }))
    }

    fn destroy_pipeline(&mut self, h: PipelineHandle) {
        self.pipelines.remove(h);
    }

    fn create_fence(&mut self, signaled: bool) -> RhiResult<FenceHandle> {
        Ok(self.fences.insert(signaled))
    }

    fn destroy_fence(&mut self, h: FenceHandle) {
        self.gpu_queue.retain(|&f| f != h);
        self.fences.remove(h);
    }

    fn create_semaphore(&mut self) -> RhiResult<SemaphoreHandle> {
        Ok(self.semaphores.insert(false))
    }

    fn destroy_semaphore(&mut self, h: SemaphoreHandle) {
        self.semaphores.remove(h);
    }

    fn create_command_pool(&mut self) -> RhiResult<CommandPoolHandle> {
        Ok(self.command_pools.insert(Vec::new()))
    }

    fn destroy_command_pool(&mut self, h: CommandPoolHandle) {
        if let Some(buffers) = self.command_pools.remove(h) {
            for cb in buffers {
                self.command_buffers.remove(cb);
            }
        }
    }

    fn allocate_command_buffer(&mut self, pool: CommandPoolHandle) -> RhiResult<CommandBufferHandle> {
        if !self.command_pools.contains_key(pool) {
            return Err(RhiError::creation("command buffer", "unknown command pool"));
        }
        let cb = self.command_buffers.insert(SimCommandBuffer {
            pool,
            recorder: CommandRecorder::new(),
        });
        if let Some(list) = self.command_pools.get_mut(pool) {
            list.push(cb);
        }
        Ok(cb)
    }

    fn wait_for_fence(&mut self, fence: FenceHandle) -> RhiResult<()> {
        let signaled = *lookup(&self.fences, fence, "fence", "wait_for_fence")?;
        self.events.push(HeadlessEvent::FenceWait {
            fence,
            blocked: !signaled,
        });
        if signaled {
            return Ok(());
        }
        if !self.gpu_queue.contains(&fence) {
            // Nothing will ever signal it; a real driver would hang here.
            return Err(RhiError::device("wait_for_fence", "fence is unsignaled and not pending"));
        }
        self.retire_until(fence);
        Ok(())
    }

    fn reset_fence(&mut self, fence: FenceHandle) -> RhiResult<()> {
        if self.gpu_queue.contains(&fence) {
            return Err(RhiError::device("reset_fence", "fence is still pending on the queue"));
        }
        let signaled = self
            .fences
            .get_mut(fence)
            .ok_or_else(|| RhiError::usage("reset_fence", UsageError::UnknownHandle("fence")))?;
        *signaled = false;
        self.events.push(HeadlessEvent::FenceReset { fence });
        Ok(())
    }

    fn reset_command_pool(&mut self, pool: CommandPoolHandle) -> RhiResult<()> {
        let buffers = lookup(&self.command_pools, pool, "command pool", "reset_command_pool")?.clone();
        for cb in buffers {
            if let Some(c) = self.command_buffers.get_mut(cb) {
                c.recorder.reset();
            }
        }
        self.events.push(HeadlessEvent::ResetCommandPool { pool });
        Ok(())
    }

    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> RhiResult<u32> {
        let injection = std::mem::replace(&mut self.acquire_injection, StaleInjection::None);
        let sem = self
            .semaphores
            .get_mut(signal)
            .ok_or_else(|| RhiError::usage("acquire_next_image", UsageError::UnknownHandle("semaphore")))?;
        if *sem {
            return Err(RhiError::device(
                "acquire_next_image",
                "semaphore already has a pending signal",
            ));
        }
        match injection {
            StaleInjection::OutOfDate => {
                self.events.push(HeadlessEvent::AcquireStale);
                return Err(RhiError::SwapchainStale);
            }
            StaleInjection::Suboptimal => {
                *sem = true;
                self.events.push(HeadlessEvent::AcquireStale);
                return Err(RhiError::SwapchainStale);
            }
            StaleInjection::None => {}
        }
        if self.surface_changed() {
            self.events.push(HeadlessEvent::AcquireStale);
            return Err(RhiError::SwapchainStale);
        }
        if let Some(sem) = self.semaphores.get_mut(signal) {
            *sem = true;
        }
        let image_index = self.next_image;
        self.next_image = (self.next_image + 1) % self.swapchain.image_count.max(1);
        self.events.push(HeadlessEvent::Acquire { image_index });
        Ok(image_index)
    }

    fn queue_submit(&mut self, submit: &SubmitDesc) -> RhiResult<()> {
        if std::mem::take(&mut self.submit_failure) {
            return Err(RhiError::device("queue_submit", "device lost"));
        }
        let cb = lookup(&self.command_buffers, submit.command_buffer, "command buffer", "queue_submit")?;
        if cb.recorder.buffer_state() != BufferState::Executable {
            return Err(RhiError::usage("queue_submit", UsageError::CommandBufferNotRecording));
        }
        if !self.command_pools.contains_key(cb.pool) {
            return Err(RhiError::usage("queue_submit", UsageError::UnknownHandle("command pool")));
        }
        match self.fences.get(submit.fence) {
            None => return Err(RhiError::usage("queue_submit", UsageError::UnknownHandle("fence"))),
            Some(true) => return Err(RhiError::device("queue_submit", "fence is already signaled")),
            Some(false) => {}
        }
        let wait = self
            .semaphores
            .get_mut(submit.wait_semaphore)
            .ok_or_else(|| RhiError::usage("queue_submit", UsageError::UnknownHandle("semaphore")))?;
        if !*wait {
            return Err(RhiError::device("queue_submit", "wait semaphore was never signaled"));
        }
        *wait = false;
        let signal = self
            .semaphores
            .get_mut(submit.signal_semaphore)
            .ok_or_else(|| RhiError::usage("queue_submit", UsageError::UnknownHandle("semaphore")))?;
        *signal = true;

        self.gpu_queue.push_back(submit.fence);
        self.max_in_flight = self.max_in_flight.max(self.gpu_queue.len());
        self.events.push(HeadlessEvent::Submit {
            fence: submit.fence,
            in_flight: self.gpu_queue.len(),
        });
        Ok(())
    }

    fn queue_present(&mut self, wait: SemaphoreHandle, image_index: u32) -> RhiResult<()> {
        if image_index >= self.swapchain.image_count {
            return Err(RhiError::usage("queue_present", UsageError::OutOfRange("image index")));
        }
        let sem = self
            .semaphores
            .get_mut(wait)
            .ok_or_else(|| RhiError::usage("queue_present", UsageError::UnknownHandle("semaphore")))?;
        if !*sem {
            return Err(RhiError::device("queue_present", "wait semaphore was never signaled"));
        }
        *sem = false;
        if std::mem::take(&mut self.present_injection) || self.surface_changed() {
            self.events.push(HeadlessEvent::PresentStale);
            return Err(RhiError::SwapchainStale);
        }
        self.events.push(HeadlessEvent::Present { image_index });
        Ok(())
    }

    fn begin_command_buffer(&mut self, cb: CommandBufferHandle) -> RhiResult<()> {
        self.record(cb, "begin_command_buffer", |r| r.begin())
    }

    fn end_command_buffer(&mut self, cb: CommandBufferHandle) -> RhiResult<()> {
        self.record(cb, "end_command_buffer", |r| r.end())
    }

    fn cmd_begin_render_pass(&mut self, cb: CommandBufferHandle, begin: &RenderPassBeginDesc) -> RhiResult<()> {
        const OP: &str = "cmd_begin_render_pass";
        let fb = lookup(&self.framebuffers, begin.framebuffer, "framebuffer", OP)?;
        let pass = lookup(&self.render_passes, begin.render_pass, "render pass", OP)?;
        if fb.attachments.iter().any(|&v| !self.image_views.contains_key(v)) {
            return Err(RhiError::usage(OP, UsageError::UnknownHandle("framebuffer attachment")));
        }
        let area = begin.render_area;
        if !span_fits(area.offset.x, area.extent.width, fb.width)
            || !span_fits(area.offset.y, area.extent.height, fb.height)
        {
            return Err(RhiError::usage(OP, UsageError::OutOfRange("render area")));
        }
        let clears_needed = pass
            .attachments
            .iter()
            .rposition(|a| a.load_op == AttachmentLoadOp::Clear)
            .map_or(0, |i| i + 1);
        if begin.clear_values.len() < clears_needed {
            return Err(RhiError::usage(OP, UsageError::OutOfRange("clear values")));
        }
        self.record(cb, OP, |r| r.begin_render_pass())
    }

    fn cmd_end_render_pass(&mut self, cb: CommandBufferHandle) -> RhiResult<()> {
        self.record(cb, "cmd_end_render_pass", |r| r.end_render_pass())
    }

    fn cmd_bind_pipeline(&mut self, cb: CommandBufferHandle, pipeline: PipelineHandle) -> RhiResult<()> {
        let p = lookup(&self.pipelines, pipeline, "pipeline", "cmd_bind_pipeline")?;
        let (vp, sc) = (p.dynamic_viewport, p.dynamic_scissor);
        self.record(cb, "cmd_bind_pipeline", |r| r.bind_pipeline(vp, sc))
    }

    fn cmd_set_viewport(&mut self, cb: CommandBufferHandle, viewport: Viewport) -> RhiResult<()> {
        if viewport.width <= 0.0 || viewport.height == 0.0 {
            return Err(RhiError::usage("cmd_set_viewport", UsageError::OutOfRange("viewport")));
        }
        self.record(cb, "cmd_set_viewport", |r| r.set_viewport())
    }

    fn cmd_set_scissor(&mut self, cb: CommandBufferHandle, _scissor: Rect2D) -> RhiResult<()> {
        self.record(cb, "cmd_set_scissor", |r| r.set_scissor())
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
        let l = lookup(&self.pipeline_layouts, layout, "pipeline layout", OP)?;
        if !push_constant_in_range(&l.push_constant_ranges, stages, offset, data.len()) {
            return Err(RhiError::usage(OP, UsageError::OutOfRange("push constant range")));
        }
        self.record(cb, OP, |r| r.push_constants())
    }

    fn cmd_draw(
        &mut self,
        cb: CommandBufferHandle,
        _vertex_count: u32,
        _instance_count: u32,
        _first_vertex: u32,
        _first_instance: u32,
    ) -> RhiResult<()> {
        self.record(cb, "cmd_draw", |r| r.draw())?;
        self.draws_recorded += 1;
        Ok(())
    }

    fn cmd_push_event(&mut self, cb: CommandBufferHandle, _name: &str, _color: [f32; 4]) -> RhiResult<()> {
        self.record(cb, "cmd_push_event", |r| r.push_label())
    }

    fn cmd_pop_event(&mut self, cb: CommandBufferHandle) -> RhiResult<()> {
        let rec = self.recorder(cb, "cmd_pop_event")?;
        rec.pop_label().map_err(|e| RhiError::usage("cmd_pop_event", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rhi() -> (Arc<HeadlessSurface>, HeadlessRhi) {
        let surface = HeadlessSurface::new(1280, 720);
        let info = RhiInitInfo::new(surface.clone());
        let rhi = HeadlessRhi::new(&info, HeadlessConfig::default()).unwrap();
        (surface, rhi)
    }

    #[test]
    fn negotiates_preferred_swapchain() {
        let (_s, rhi) = rhi();
        let sc = rhi.swapchain();
        assert_eq!(sc.format, Format::B8G8R8A8_UNORM);
        assert_eq!(sc.present_mode, PresentMode::Mailbox);
        assert_eq!(sc.extent, Extent2D::new(1280, 720));
        assert_eq!(sc.image_count, 3);
        assert_eq!(sc.sharing, ImageSharing::Exclusive);
        assert_eq!(rhi.resource_stats().image_views, 4);
    }

    #[test]
    fn fifo_preference_honored() {
        let surface = HeadlessSurface::new(64, 64);
        let mut info = RhiInitInfo::new(surface);
        info.present_mode = PresentModePreference::Fifo;
        let rhi = HeadlessRhi::new(&info, HeadlessConfig::default()).unwrap();
        assert_eq!(rhi.swapchain().present_mode, PresentMode::Fifo);
    }

    #[test]
    fn rejects_non_spirv() {
        let (_s, mut rhi) = rhi();
        assert!(matches!(
            rhi.create_shader_module(&[1, 2, 3]),
            Err(RhiError::ResourceCreation { op: "shader module", .. })
        ));
        assert!(rhi.create_shader_module(&[0, 0, 0, 0]).is_err());
        let ok = rhi.create_shader_module(&SPIRV_MAGIC.to_le_bytes()).unwrap();
        rhi.destroy_shader_module(ok);
        assert_eq!(rhi.resource_stats().shader_modules, 0);
    }

    #[test]
    fn destroy_pool_frees_buffers() {
        let (_s, mut rhi) = rhi();
        let pool = rhi.create_command_pool().unwrap();
        rhi.allocate_command_buffer(pool).unwrap();
        rhi.allocate_command_buffer(pool).unwrap();
        assert_eq!(rhi.resource_stats().command_buffers, 2);
        rhi.destroy_command_pool(pool);
        assert_eq!(rhi.resource_stats().command_buffers, 0);
        assert_eq!(rhi.resource_stats().command_pools, 0);
    }

    #[test]
    fn waiting_on_unsubmitted_fence_is_an_error() {
        let (_s, mut rhi) = rhi();
        let f = rhi.create_fence(false).unwrap();
        assert!(matches!(rhi.wait_for_fence(f), Err(RhiError::Device { .. })));
    }

    #[test]
    fn acquire_stale_after_resize() {
        let (surface, mut rhi) = rhi();
        let sem = rhi.create_semaphore().unwrap();
        surface.resize(640, 480);
        assert!(rhi.acquire_next_image(sem).unwrap_err().is_stale());
        rhi.recreate_swapchain().unwrap();
        assert_eq!(rhi.swapchain().extent, Extent2D::new(640, 480));
        assert_eq!(rhi.acquire_next_image(sem).unwrap(), 0);
    }

    #[test]
    fn extent_is_clamped_to_capabilities() {
        let surface = HeadlessSurface::new(100, 100);
        let info = RhiInitInfo::new(surface.clone());
        let mut cfg = HeadlessConfig::default();
        cfg.capabilities.min_image_extent = Extent2D::new(200, 200);
        cfg.capabilities.max_image_extent = Extent2D::new(1024, 1024);
        let mut rhi = HeadlessRhi::new(&info, cfg).unwrap();
        assert_eq!(rhi.swapchain().extent, Extent2D::new(200, 200));
        surface.resize(5000, 300);
        rhi.recreate_swapchain().unwrap();
        assert_eq!(rhi.swapchain().extent, Extent2D::new(1024, 300));
    }

    fn color_pass(rhi: &mut HeadlessRhi) -> (RenderPassHandle, FramebufferHandle) {
        let sc = rhi.swapchain().clone();
        let pass = rhi
            .create_render_pass(&RenderPassDesc {
                attachments: vec![AttachmentDescription {
                    format: sc.format,
                    samples: SampleCountFlags::TYPE_1,
                    load_op: AttachmentLoadOp::Load,
                    store_op: AttachmentStoreOp::Store,
                    stencil_load_op: AttachmentLoadOp::DontCare,
                    stencil_store_op: AttachmentStoreOp::DontCare,
                    initial_layout: ImageLayout::ColorAttachmentOptimal,
                    final_layout: ImageLayout::PresentSrc,
                }],
                subpasses: vec![SubpassDescription {
                    bind_point: PipelineBindPoint::Graphics,
                    input_attachments: Vec::new(),
                    color_attachments: vec![AttachmentReference {
                        attachment: 0,
                        layout: ImageLayout::ColorAttachmentOptimal,
                    }],
                    depth_stencil_attachment: None,
                }],
                dependencies: Vec::new(),
            })
            .unwrap();
        let fb = rhi
            .create_framebuffer(&FramebufferDesc {
                render_pass: pass,
                attachments: vec![sc.image_views[0]],
                width: sc.extent.width,
                height: sc.extent.height,
                layers: 1,
            })
            .unwrap();
        (pass, fb)
    }

    #[test]
    fn render_area_must_lie_inside_framebuffer() {
        let (_s, mut rhi) = rhi();
        let (pass, fb) = color_pass(&mut rhi);
        assert_eq!(rhi.framebuffer_extent(fb), Some(Extent2D::new(1280, 720)));
        let pool = rhi.create_command_pool().unwrap();
        let cb = rhi.allocate_command_buffer(pool).unwrap();
        rhi.begin_command_buffer(cb).unwrap();

        let begin = |offset: Offset2D, extent: Extent2D| RenderPassBeginDesc {
            render_pass: pass,
            framebuffer: fb,
            render_area: Rect2D { offset, extent },
            clear_values: Vec::new(),
        };
        for (offset, extent) in [
            (Offset2D { x: 1, y: 0 }, Extent2D::new(u32::MAX, 720)),
            (Offset2D { x: 0, y: -1 }, Extent2D::new(1280, 720)),
            (Offset2D { x: i32::MAX, y: 0 }, Extent2D::new(u32::MAX, 1)),
            (Offset2D { x: 0, y: 0 }, Extent2D::new(1281, 720)),
        ] {
            assert!(matches!(
                rhi.cmd_begin_render_pass(cb, &begin(offset, extent)),
                Err(RhiError::InvalidState(UsageError::OutOfRange("render area")))
            ));
        }
        rhi.cmd_begin_render_pass(cb, &begin(Offset2D { x: 0, y: 0 }, Extent2D::new(1280, 720)))
            .unwrap();
    }

    #[test]
    fn span_check_never_wraps() {
        assert!(span_fits(0, 10, 10));
        assert!(span_fits(4, 6, 10));
        assert!(!span_fits(4, 7, 10));
        assert!(!span_fits(-1, 1, 10));
        assert!(!span_fits(1, u32::MAX, u32::MAX));
    }

    #[test]
    fn no_devices() {
        let surface = HeadlessSurface::new(1, 1);
        let info = RhiInitInfo::new(surface);
        let cfg = HeadlessConfig {
            adapters: Vec::new(),
            ..HeadlessConfig::default()
        };
        assert!(matches!(
            HeadlessRhi::new(&info, cfg),
            Err(RhiError::DeviceSelection(crate::DeviceSelectionError::NoCompatibleDevice))
        ));
    }
}
