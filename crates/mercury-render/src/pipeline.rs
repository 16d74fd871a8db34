// SPDX-License-Identifier: CEPL-1.0
use mercury_rhi::{FrameOrchestrator, FrameStatus, PresentStatus, Rhi, RhiResult};
use tracing::{debug, info};

use crate::pass::RenderPass;

/// How one `forward_render` call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// Acquire found the surface stale; the swapchain was rebuilt and the
    /// frame skipped.
    Skipped,
    /// Submitted, but present found the surface stale and rebuilt it.
    PresentedAndRecreated,
}

fn notify_recreated<R: Rhi + ?Sized>(passes: &mut [Box<dyn RenderPass<R>>], rhi: &mut R) -> RhiResult<()> {
    for pass in passes.iter_mut() {
        debug!("swapchain recreated → {}", pass.name());
        pass.on_swapchain_recreated(rhi)?;
    }
    Ok(())
}

/// Ordered pass list on top of the frame orchestrator.
pub struct RenderPipeline<R: Rhi + ?Sized> {
    frames: FrameOrchestrator,
    passes: Vec<Box<dyn RenderPass<R>>>,
}

impl<R: Rhi + ?Sized> RenderPipeline<R> {
    pub fn new(rhi: &mut R, frames_in_flight: usize) -> RhiResult<Self> {
        Ok(Self {
            frames: FrameOrchestrator::new(rhi, frames_in_flight)?,
            passes: Vec::new(),
        })
    }

    pub fn add_pass(&mut self, pass: Box<dyn RenderPass<R>>) {
        info!("render pipeline: + {}", pass.name());
        self.passes.push(pass);
    }

    pub fn pass_names(&self) -> Vec<&str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    pub fn frames(&self) -> &FrameOrchestrator {
        &self.frames
    }

    /// begin_frame → every pass in order → end_frame. Recreation callbacks
    /// reach every pass.
    pub fn forward_render(&mut self, rhi: &mut R) -> RhiResult<FrameOutcome> {
        let passes = &mut self.passes;
        let frame = match self
            .frames
            .begin_frame(rhi, |rhi| notify_recreated(passes, rhi))?
        {
            FrameStatus::Ready(frame) => frame,
            FrameStatus::NeedsRecreate => return Ok(FrameOutcome::Skipped),
        };

        for pass in self.passes.iter_mut() {
            pass.draw(rhi, &frame)?;
        }

        let passes = &mut self.passes;
        match self
            .frames
            .end_frame(rhi, |rhi| notify_recreated(passes, rhi))?
        {
            PresentStatus::Presented => Ok(FrameOutcome::Presented),
            PresentStatus::Recreated => Ok(FrameOutcome::PresentedAndRecreated),
        }
    }

    /// Rebuilds the swapchain outside the frame and lets every pass follow.
    pub fn recreate_swapchain(&mut self, rhi: &mut R) -> RhiResult<()> {
        rhi.recreate_swapchain()?;
        notify_recreated(&mut self.passes, rhi)
    }

    /// Passes first, then the frame slots (which waits for the device).
    pub fn destroy(mut self, rhi: &mut R) -> RhiResult<()> {
        rhi.wait_idle()?;
        for pass in self.passes.iter_mut().rev() {
            debug!("destroy pass {}", pass.name());
            pass.destroy(rhi);
        }
        self.frames.destroy(rhi)
    }
}
