// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Window system on top of winit. The window is the RHI's surface provider.

use std::sync::Arc;

use anyhow::{Context, Result};
use mercury_rhi::{RenderSize, SurfaceProvider};
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use tracing::info;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window, WindowId};

pub use winit;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowCreateInfo {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub fullscreen: bool,
}

impl Default for WindowCreateInfo {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Mercury".to_string(),
            fullscreen: false,
        }
    }
}

/// The part of the window the renderer holds on to.
pub struct WindowSurface {
    window: Arc<Window>,
}

impl HasWindowHandle for WindowSurface {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window.window_handle()
    }
}

impl HasDisplayHandle for WindowSurface {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window.display_handle()
    }
}

impl SurfaceProvider for WindowSurface {
    fn framebuffer_size(&self) -> RenderSize {
        let size = self.window.inner_size();
        RenderSize::new(size.width, size.height)
    }
}

/// What the engine tick needs to know about a window event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowSignal {
    CloseRequested,
    Resized(RenderSize),
    Redraw,
    Occluded(bool),
    Ignored,
}

pub struct WindowSystem {
    surface: Arc<WindowSurface>,
    should_close: bool,
}

impl WindowSystem {
    pub fn create(event_loop: &ActiveEventLoop, info: &WindowCreateInfo) -> Result<Self> {
        let mut attrs = Window::default_attributes()
            .with_title(info.title.clone())
            .with_inner_size(PhysicalSize::new(info.width.max(1), info.height.max(1)));
        if info.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = event_loop
            .create_window(attrs)
            .context("create_window")?;
        let size = window.inner_size();
        info!("window '{}' created: {}x{}", info.title, size.width, size.height);
        Ok(Self {
            surface: Arc::new(WindowSurface {
                window: Arc::new(window),
            }),
            should_close: false,
        })
    }

    pub fn id(&self) -> WindowId {
        self.surface.window.id()
    }

    /// Shared with the RHI for surface creation and swapchain sizing.
    pub fn surface(&self) -> Arc<dyn SurfaceProvider> {
        self.surface.clone()
    }

    pub fn framebuffer_size(&self) -> RenderSize {
        self.surface.framebuffer_size()
    }

    pub fn set_title(&self, title: &str) {
        self.surface.window.set_title(title);
    }

    pub fn request_redraw(&self) {
        self.surface.window.request_redraw();
    }

    pub fn should_close(&self) -> bool {
        self.should_close
    }

    pub fn handle_event(&mut self, event: &WindowEvent) -> WindowSignal {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                self.should_close = true;
                WindowSignal::CloseRequested
            }
            WindowEvent::Resized(size) => WindowSignal::Resized(RenderSize::new(size.width, size.height)),
            WindowEvent::RedrawRequested => WindowSignal::Redraw,
            WindowEvent::Occluded(occluded) => WindowSignal::Occluded(*occluded),
            _ => WindowSignal::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_info_defaults() {
        let info = WindowCreateInfo::default();
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.title, "Mercury");
        assert!(!info.fullscreen);
    }
}
