// SPDX-License-Identifier: CEPL-1.0
use mercury_rhi::{Rhi, RhiResult};
use tracing::{info, warn};

use crate::debug_draw::DebugDrawManager;
use crate::pass::RenderPass;
use crate::pipeline::{FrameOutcome, RenderPipeline};
use crate::shaders::ShaderBinaries;
use crate::RenderResult;

pub struct RenderSystemDesc {
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub shaders: ShaderBinaries,
}

/// Owns the backend and the render pipeline built on it.
///
/// Teardown is explicit through [`RenderSystem::shutdown`]: passes, then frame
/// slots, then the backend is handed back (its own drop releases the
/// swapchain, device and instance).
pub struct RenderSystem<R: Rhi> {
    rhi: R,
    pipeline: RenderPipeline<R>,
    resize_pending: bool,
}

impl<R: Rhi + 'static> RenderSystem<R> {
    pub fn new(mut rhi: R, desc: RenderSystemDesc) -> RenderResult<Self> {
        let mut pipeline = RenderPipeline::new(&mut rhi, desc.frames_in_flight)?;
        match DebugDrawManager::new(&mut rhi, &desc.shaders, desc.clear_color) {
            Ok(debug_draw) => pipeline.add_pass(Box::new(debug_draw)),
            Err(e) => {
                if let Err(teardown) = pipeline.destroy(&mut rhi) {
                    warn!("teardown after failed init: {teardown}");
                }
                return Err(e.into());
            }
        }
        let sc = rhi.swapchain();
        info!(
            "render system ready: {}x{} {:?}, {} frames in flight, passes {:?}",
            sc.extent.width,
            sc.extent.height,
            sc.present_mode,
            desc.frames_in_flight,
            pipeline.pass_names()
        );
        Ok(Self {
            rhi,
            pipeline,
            resize_pending: false,
        })
    }

    pub fn rhi(&self) -> &R {
        &self.rhi
    }

    pub fn rhi_mut(&mut self) -> &mut R {
        &mut self.rhi
    }

    pub fn pipeline(&self) -> &RenderPipeline<R> {
        &self.pipeline
    }

    pub fn add_pass(&mut self, pass: Box<dyn RenderPass<R>>) {
        self.pipeline.add_pass(pass);
    }

    /// Some surfaces never report out-of-date on resize; the window tells us
    /// instead and the next tick rebuilds up front.
    pub fn notify_resized(&mut self) {
        self.resize_pending = true;
    }

    pub fn tick(&mut self) -> RhiResult<FrameOutcome> {
        if std::mem::take(&mut self.resize_pending) {
            self.pipeline.recreate_swapchain(&mut self.rhi)?;
        }
        self.pipeline.forward_render(&mut self.rhi)
    }

    pub fn shutdown(self) -> RhiResult<R> {
        let Self {
            mut rhi, pipeline, ..
        } = self;
        pipeline.destroy(&mut rhi)?;
        info!("render system shut down");
        Ok(rhi)
    }
}
