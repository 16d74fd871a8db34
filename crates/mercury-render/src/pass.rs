// SPDX-License-Identifier: CEPL-1.0
use mercury_rhi::{FrameContext, Rhi, RhiResult};

/// A unit of recording inside the frame. Passes only ever talk to the RHI:
/// they get the current command buffer and swapchain image through
/// [`FrameContext`] and never see the swapchain or device internals.
pub trait RenderPass<R: Rhi + ?Sized> {
    fn name(&self) -> &str;

    /// Records into `frame.command_buffer`.
    fn draw(&mut self, rhi: &mut R, frame: &FrameContext) -> RhiResult<()>;

    /// Called after the swapchain was rebuilt, before the next frame.
    fn on_swapchain_recreated(&mut self, rhi: &mut R) -> RhiResult<()>;

    /// Releases every RHI object the pass owns. The device is idle.
    fn destroy(&mut self, rhi: &mut R);
}
