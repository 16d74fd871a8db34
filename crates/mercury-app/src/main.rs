// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod engine;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use mercury_core::{config::DEFAULT_CONFIG_PATH, init_tracing, EngineConfig, PresentModeCfg};
use mercury_platform::{WindowCreateInfo, WindowSignal, WindowSystem};
use mercury_render::{RenderSystem, RenderSystemDesc, ShaderBinaries};
use mercury_rhi::headless::{HeadlessConfig, HeadlessRhi, HeadlessSurface};
use mercury_rhi::{PresentModePreference, RhiInitInfo, SurfaceProvider};
use mercury_rhi_vk::VulkanRhi;
use tracing::{error, info, warn};

use mercury_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::WindowId,
};

use crate::engine::Engine;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Vk,
    Headless,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Renderer backend: vk | headless
    #[arg(long, value_enum, default_value_t = Backend::Vk)]
    backend: Backend,

    /// Engine config (TOML). Missing file means defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Frames to run with the headless backend.
    #[arg(long, default_value_t = 120)]
    frames: u64,

    /// Disable validation layers even if the config enables them.
    #[arg(long)]
    no_validation: bool,
}

fn rhi_init_info(surface: Arc<dyn SurfaceProvider>, cfg: &EngineConfig) -> RhiInitInfo {
    let mut info = RhiInitInfo::new(surface);
    info.app_name = cfg.window.title.clone();
    info.enable_validation = cfg.render.enable_validation;
    info.enable_debug_utils_label = cfg.render.enable_debug_utils_label;
    info.present_mode = match cfg.render.present_mode {
        PresentModeCfg::Fifo => PresentModePreference::Fifo,
        PresentModeCfg::Mailbox => PresentModePreference::LowLatency,
    };
    info.fence_wait_warning = Duration::from_millis(cfg.render.fence_wait_warn_ms.max(1));
    info
}

fn render_desc(cfg: &EngineConfig, shaders: ShaderBinaries) -> RenderSystemDesc {
    RenderSystemDesc {
        frames_in_flight: cfg.render.frames_in_flight,
        clear_color: cfg.render.clear_color,
        shaders,
    }
}

struct App {
    cfg: EngineConfig,
    // engine before window: the swapchain must go before the surface's window
    engine: Option<Engine<VulkanRhi>>,
    window: Option<WindowSystem>,
    last_title: String,
    paused: bool,
    exiting: bool,
    fatal: Option<anyhow::Error>,
}

impl App {
    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let create_info = WindowCreateInfo {
            width: self.cfg.window.width,
            height: self.cfg.window.height,
            title: self.cfg.window.title.clone(),
            fullscreen: self.cfg.window.fullscreen,
        };
        let window = WindowSystem::create(event_loop, &create_info)?;

        // STRICT ORDER:
        // 1) Shaders (fail before touching the GPU)
        // 2) Backend: instance, surface, device, swapchain
        // 3) Render system: frame slots, then passes
        let shaders = ShaderBinaries::load_debug_draw(&self.cfg.render.shader_dir)
            .context("load debug-draw shaders")?;
        let rhi = VulkanRhi::new(&rhi_init_info(window.surface(), &self.cfg)).context("vulkan init")?;
        info!("backend = vk ({})", mercury_rhi::Rhi::adapter(&rhi).name);
        let render = RenderSystem::new(rhi, render_desc(&self.cfg, shaders)).context("render system init")?;

        let size = window.framebuffer_size();
        self.paused = size.is_empty();
        self.engine = Some(Engine::new(render, self.cfg.window.title.clone()));
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.fatal = Some(err);
        self.close(event_loop);
    }

    fn close(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        if let Some(mut engine) = self.engine.take() {
            if let Err(e) = engine.shutdown() {
                error!("{e:#}");
            }
        }
        self.window = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.start(event_loop) {
                self.fail(event_loop, e);
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Wait);
        info!("resumed → paused={}", self.paused);
        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(window) = self.window.as_mut() else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        match window.handle_event(&event) {
            WindowSignal::CloseRequested => {
                info!("CloseRequested");
                self.close(event_loop);
            }
            WindowSignal::Resized(size) => {
                let now_paused = size.is_empty();
                if self.paused != now_paused {
                    self.paused = now_paused;
                }
                info!("Resized → {}x{} (paused={})", size.width, size.height, self.paused);
                if !self.paused {
                    if let Some(engine) = &mut self.engine {
                        engine.notify_resized();
                    }
                    window.request_redraw();
                }
            }
            WindowSignal::Occluded(occluded) => {
                let now_paused = occluded || window.framebuffer_size().is_empty();
                if self.paused != now_paused {
                    self.paused = now_paused;
                    info!("Occluded={} → paused={}", occluded, self.paused);
                }
            }
            WindowSignal::Redraw => {
                if self.exiting || self.paused {
                    return;
                }
                let Some(engine) = &mut self.engine else {
                    return;
                };
                match engine.tick() {
                    Ok(_) => {
                        let title = engine.window_title();
                        if title != self.last_title {
                            window.set_title(&title);
                            self.last_title = title;
                        }
                    }
                    Err(e) => self.fail(event_loop, e),
                }
            }
            WindowSignal::Ignored => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if self.window.as_ref().is_some_and(|w| w.should_close()) {
            self.close(event_loop);
            return;
        }
        // Present mode paces us; keep one redraw queued unless paused.
        event_loop.set_control_flow(ControlFlow::Wait);
        if !self.paused {
            if let Some(w) = &self.window {
                w.request_redraw();
            }
        }
    }
}

fn run_windowed(cfg: EngineConfig) -> Result<()> {
    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        cfg,
        engine: None,
        window: None,
        last_title: String::new(),
        paused: false,
        exiting: false,
        fatal: None,
    };
    event_loop.run_app(&mut app)?;
    match app.fatal.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn run_headless(cfg: EngineConfig, frames: u64) -> Result<()> {
    let surface = HeadlessSurface::new(cfg.window.width, cfg.window.height);
    let rhi = HeadlessRhi::new(&rhi_init_info(surface, &cfg), HeadlessConfig::default())
        .context("headless init")?;
    // Headless never runs shader code; any module header will do.
    let shaders = ShaderBinaries::load_debug_draw(&cfg.render.shader_dir).unwrap_or_else(|e| {
        warn!("{e}; headless run continues with placeholder modules");
        let header = 0x0723_0203u32.to_le_bytes().to_vec();
        ShaderBinaries::new(header.clone(), header)
    });
    let render = RenderSystem::new(rhi, render_desc(&cfg, shaders)).context("render system init")?;
    let mut engine = Engine::new(render, cfg.window.title.clone());

    for _ in 0..frames {
        engine.tick()?;
    }
    info!(
        "{} ({} frames presented, avg {:?} per frame)",
        engine.window_title(),
        engine.frames(),
        engine.average_frame_time()
    );
    engine.shutdown()
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = EngineConfig::load(&args.config).context("load config")?;
    if args.no_validation {
        cfg.render.enable_validation = false;
    }
    info!(
        "config: {}x{} '{}' frames_in_flight={} present={:?} validation={}",
        cfg.window.width,
        cfg.window.height,
        cfg.window.title,
        cfg.render.frames_in_flight,
        cfg.render.present_mode,
        cfg.render.enable_validation
    );

    match args.backend {
        Backend::Vk => run_windowed(cfg),
        Backend::Headless => run_headless(cfg, args.frames),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults() {
        let args = Args::parse_from(["mercury"]);
        assert_eq!(args.backend, Backend::Vk);
        assert_eq!(args.config, PathBuf::from("mercury.toml"));
        assert!(!args.no_validation);
    }

    #[test]
    fn cli_headless_with_frames() {
        let args = Args::parse_from(["mercury", "--backend", "headless", "--frames", "10", "--no-validation"]);
        assert_eq!(args.backend, Backend::Headless);
        assert_eq!(args.frames, 10);
        assert!(args.no_validation);
    }

    #[test]
    fn fifo_config_maps_to_fifo_preference() {
        let cfg = EngineConfig::from_toml_str("[render]\npresent_mode = \"fifo\"\nfence_wait_warn_ms = 250\n").unwrap();
        let info = rhi_init_info(HeadlessSurface::new(8, 8), &cfg);
        assert_eq!(info.present_mode, PresentModePreference::Fifo);
        assert_eq!(info.fence_wait_warning, Duration::from_millis(250));
    }

    #[test]
    fn headless_run_completes() {
        let cfg = EngineConfig::from_toml_str("[window]\nwidth = 64\nheight = 64\n").unwrap();
        run_headless(cfg, 8).unwrap();
    }
}
