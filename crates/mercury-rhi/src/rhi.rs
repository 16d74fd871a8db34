// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;
use std::time::Duration;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::device::{AdapterInfo, QueueFamilyIndices};
use crate::error::RhiResult;
use crate::handle::*;
use crate::swapchain::{PresentModePreference, SwapchainInfo};
use crate::types::*;
use crate::RenderSize;

/// The window side of the contract: native handles for surface creation plus
/// the current framebuffer size, re-read on every swapchain recreation.
pub trait SurfaceProvider: HasWindowHandle + HasDisplayHandle + Send + Sync {
    fn framebuffer_size(&self) -> RenderSize;
}

pub struct RhiInitInfo {
    pub surface: Arc<dyn SurfaceProvider>,
    pub app_name: String,
    pub enable_validation: bool,
    pub enable_debug_utils_label: bool,
    pub present_mode: PresentModePreference,
    /// Fence waits longer than this log a warning and keep waiting.
    pub fence_wait_warning: Duration,
}

impl RhiInitInfo {
    pub fn new(surface: Arc<dyn SurfaceProvider>) -> Self {
        Self {
            surface,
            app_name: "Mercury".to_string(),
            enable_validation: cfg!(debug_assertions),
            enable_debug_utils_label: cfg!(debug_assertions),
            present_mode: PresentModePreference::default(),
            fence_wait_warning: Duration::from_secs(2),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitDesc {
    pub command_buffer: CommandBufferHandle,
    pub wait_semaphore: SemaphoreHandle,
    pub wait_stage: PipelineStageFlags,
    pub signal_semaphore: SemaphoreHandle,
    pub fence: FenceHandle,
}

/// Live object counts per handle table. Swapchain image views and the depth
/// view are included in `image_views`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceStats {
    pub shader_modules: usize,
    pub descriptor_set_layouts: usize,
    pub pipeline_layouts: usize,
    pub render_passes: usize,
    pub framebuffers: usize,
    pub pipelines: usize,
    pub image_views: usize,
    pub fences: usize,
    pub semaphores: usize,
    pub command_pools: usize,
    pub command_buffers: usize,
}

/// The operation set a renderer drives.
///
/// Creation calls translate a description into a backend object and hand back
/// a handle; nothing from the description is retained. Every handle must be
/// released by its paired `destroy_*`, or it is reclaimed when the backend is
/// dropped. Destroying an unknown handle is a no-op.
pub trait Rhi {
    fn adapter(&self) -> &AdapterInfo;
    fn queue_families(&self) -> QueueFamilyIndices;
    fn wait_idle(&mut self) -> RhiResult<()>;
    fn resource_stats(&self) -> ResourceStats;

    // swapchain
    fn swapchain(&self) -> &SwapchainInfo;
    /// Wait idle, tear down depth + views + swapchain, rebuild at the
    /// surface's current framebuffer size.
    fn recreate_swapchain(&mut self) -> RhiResult<()>;

    // resources
    fn create_shader_module(&mut self, code: &[u8]) -> RhiResult<ShaderModuleHandle>;
    fn destroy_shader_module(&mut self, h: ShaderModuleHandle);
    fn create_descriptor_set_layout(
        &mut self,
        desc: &DescriptorSetLayoutDesc,
    ) -> RhiResult<DescriptorSetLayoutHandle>;
    fn destroy_descriptor_set_layout(&mut self, h: DescriptorSetLayoutHandle);
    fn create_pipeline_layout(&mut self, desc: &PipelineLayoutDesc) -> RhiResult<PipelineLayoutHandle>;
    fn destroy_pipeline_layout(&mut self, h: PipelineLayoutHandle);
    fn create_render_pass(&mut self, desc: &RenderPassDesc) -> RhiResult<RenderPassHandle>;
    fn destroy_render_pass(&mut self, h: RenderPassHandle);
    fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> RhiResult<FramebufferHandle>;
    fn destroy_framebuffer(&mut self, h: FramebufferHandle);
    fn create_graphics_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> RhiResult<PipelineHandle>;
    fn destroy_pipeline(&mut self, h: PipelineHandle);

    // sync + command pools
    fn create_fence(&mut self, signaled: bool) -> RhiResult<FenceHandle>;
    fn destroy_fence(&mut self, h: FenceHandle);
    fn create_semaphore(&mut self) -> RhiResult<SemaphoreHandle>;
    fn destroy_semaphore(&mut self, h: SemaphoreHandle);
    /// Pool on the graphics family; its buffers are reset in bulk.
    fn create_command_pool(&mut self) -> RhiResult<CommandPoolHandle>;
    /// Also frees every buffer allocated from the pool.
    fn destroy_command_pool(&mut self, h: CommandPoolHandle);
    fn allocate_command_buffer(&mut self, pool: CommandPoolHandle) -> RhiResult<CommandBufferHandle>;

    /// Blocks without a deadline until the fence signals.
    fn wait_for_fence(&mut self, fence: FenceHandle) -> RhiResult<()>;
    fn reset_fence(&mut self, fence: FenceHandle) -> RhiResult<()>;
    fn reset_command_pool(&mut self, pool: CommandPoolHandle) -> RhiResult<()>;

    // frame
    /// `Err(SwapchainStale)` on out-of-date or suboptimal.
    fn acquire_next_image(&mut self, signal: SemaphoreHandle) -> RhiResult<u32>;
    fn queue_submit(&mut self, submit: &SubmitDesc) -> RhiResult<()>;
    /// `Err(SwapchainStale)` on out-of-date or suboptimal.
    fn queue_present(&mut self, wait: SemaphoreHandle, image_index: u32) -> RhiResult<()>;

    // recording
    fn begin_command_buffer(&mut self, cb: CommandBufferHandle) -> RhiResult<()>;
    fn end_command_buffer(&mut self, cb: CommandBufferHandle) -> RhiResult<()>;
    fn cmd_begin_render_pass(&mut self, cb: CommandBufferHandle, begin: &RenderPassBeginDesc) -> RhiResult<()>;
    fn cmd_end_render_pass(&mut self, cb: CommandBufferHandle) -> RhiResult<()>;
    fn cmd_bind_pipeline(&mut self, cb: CommandBufferHandle, pipeline: PipelineHandle) -> RhiResult<()>;
    fn cmd_set_viewport(&mut self, cb: CommandBufferHandle, viewport: Viewport) -> RhiResult<()>;
    fn cmd_set_scissor(&mut self, cb: CommandBufferHandle, scissor: Rect2D) -> RhiResult<()>;
    fn cmd_push_constants(
        &mut self,
        cb: CommandBufferHandle,
        layout: PipelineLayoutHandle,
        stages: ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) -> RhiResult<()>;
    fn cmd_draw(
        &mut self,
        cb: CommandBufferHandle,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> RhiResult<()>;
    /// Debug label region; a no-op unless labels are enabled.
    fn cmd_push_event(&mut self, cb: CommandBufferHandle, name: &str, color: [f32; 4]) -> RhiResult<()>;
    fn cmd_pop_event(&mut self, cb: CommandBufferHandle) -> RhiResult<()>;
}

/// Checks a push-constant write against a layout's declared ranges.
pub fn push_constant_in_range(
    ranges: &[PushConstantRange],
    stages: ShaderStageFlags,
    offset: u32,
    size: usize,
) -> bool {
    let Ok(size) = u32::try_from(size) else {
        return false;
    };
    let Some(end) = offset.checked_add(size) else {
        return false;
    };
    ranges
        .iter()
        .any(|r| r.stage_flags.contains(stages) && offset >= r.offset && end <= r.offset + r.size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constant_bounds() {
        let ranges = [PushConstantRange {
            stage_flags: ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: 80,
        }];
        let vf = ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT;
        assert!(push_constant_in_range(&ranges, vf, 0, 80));
        assert!(push_constant_in_range(&ranges, ShaderStageFlags::VERTEX, 64, 16));
        assert!(!push_constant_in_range(&ranges, vf, 64, 32));
        assert!(!push_constant_in_range(&ranges, ShaderStageFlags::COMPUTE, 0, 4));
        assert!(!push_constant_in_range(&[], vf, 0, 4));
    }
}
