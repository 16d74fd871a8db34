// SPDX-License-Identifier: CEPL-1.0
use std::time::Duration;

use anyhow::{Context, Result};
use mercury_core::FpsCounter;
use mercury_render::{FrameOutcome, RenderSystem};
use mercury_rhi::Rhi;
use tracing::{debug, info};

/// One engine tick: time the frame, render it, keep the FPS average.
pub struct Engine<R: Rhi + 'static> {
    render: Option<RenderSystem<R>>,
    fps: FpsCounter,
    title: String,
}

impl<R: Rhi + 'static> Engine<R> {
    pub fn new(render: RenderSystem<R>, title: impl Into<String>) -> Self {
        Self {
            render: Some(render),
            fps: FpsCounter::new(),
            title: title.into(),
        }
    }

    pub fn tick(&mut self) -> Result<FrameOutcome> {
        let dt = self.fps.delta_time();
        let render = self.render.as_mut().context("engine already shut down")?;
        let outcome = render.tick().context("render tick")?;
        if outcome == FrameOutcome::Skipped {
            debug!("frame skipped (swapchain rebuilt)");
        } else {
            self.fps.record(dt);
        }
        Ok(outcome)
    }

    pub fn notify_resized(&mut self) {
        if let Some(render) = self.render.as_mut() {
            render.notify_resized();
        }
    }

    pub fn window_title(&self) -> String {
        format!("{} - {} FPS", self.title, self.fps.fps())
    }

    pub fn frames(&self) -> u64 {
        self.fps.frame_count()
    }

    pub fn average_frame_time(&self) -> Duration {
        self.fps.average_frame_time()
    }

    /// Idempotent; the backend is dropped last.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(render) = self.render.take() {
            let rhi = render.shutdown().context("render shutdown")?;
            info!(
                "shutdown after {} frames (avg {:.2} ms)",
                self.fps.frame_count(),
                self.average_frame_time().as_secs_f64() * 1000.0
            );
            drop(rhi);
        }
        Ok(())
    }
}

impl<R: Rhi + 'static> Drop for Engine<R> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!("engine shutdown: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercury_render::{RenderSystemDesc, ShaderBinaries};
    use mercury_rhi::headless::{HeadlessConfig, HeadlessRhi, HeadlessSurface};
    use mercury_rhi::RhiInitInfo;

    fn engine() -> Engine<HeadlessRhi> {
        let surface = HeadlessSurface::new(320, 240);
        let rhi = HeadlessRhi::new(&RhiInitInfo::new(surface), HeadlessConfig::default()).unwrap();
        let spirv = 0x0723_0203u32.to_le_bytes().to_vec();
        let render = RenderSystem::new(
            rhi,
            RenderSystemDesc {
                frames_in_flight: 2,
                clear_color: [0.0; 4],
                shaders: ShaderBinaries::new(spirv.clone(), spirv),
            },
        )
        .unwrap();
        Engine::new(render, "Mercury")
    }

    #[test]
    fn title_carries_fps() {
        let mut e = engine();
        assert_eq!(e.window_title(), "Mercury - 0 FPS");
        assert_eq!(e.average_frame_time(), Duration::ZERO);
        e.tick().unwrap();
        assert!(e.window_title().starts_with("Mercury - "));
        assert!(e.window_title().ends_with(" FPS"));
        assert_eq!(e.frames(), 1);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut e = engine();
        e.tick().unwrap();
        e.shutdown().unwrap();
        e.shutdown().unwrap();
        assert!(e.tick().is_err());
    }

    #[test]
    fn skipped_frames_stay_out_of_the_average() {
        let surface = HeadlessSurface::new(320, 240);
        let rhi = HeadlessRhi::new(&RhiInitInfo::new(surface.clone()), HeadlessConfig::default()).unwrap();
        let spirv = 0x0723_0203u32.to_le_bytes().to_vec();
        let desc = RenderSystemDesc {
            frames_in_flight: 2,
            clear_color: [0.0; 4],
            shaders: ShaderBinaries::new(spirv.clone(), spirv),
        };
        let mut e = Engine::new(RenderSystem::new(rhi, desc).unwrap(), "Mercury");
        surface.resize(200, 100);
        assert_eq!(e.tick().unwrap(), FrameOutcome::Skipped);
        assert_eq!(e.frames(), 0);
        assert_eq!(e.average_frame_time(), Duration::ZERO);
        assert_eq!(e.tick().unwrap(), FrameOutcome::Presented);
        assert_eq!(e.frames(), 1);
    }
}
