// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Backend-neutral render hardware interface.
//!
//! Renderers talk to a backend through [`Rhi`]; all backend objects stay behind
//! the small-integer handles in [`handle`]. The [`frame::FrameOrchestrator`]
//! drives the frame-in-flight protocol on top of any backend.

pub mod device;
pub mod error;
pub mod frame;
pub mod handle;
pub mod headless;
pub mod recording;
pub mod rhi;
pub mod swapchain;
pub mod types;

pub use device::{
    select_adapter, AdapterInfo, DeviceType, QueueFamilyIndices, QueueFamilyInfo, QueueFlags,
    SelectedAdapter, REQUIRED_DEVICE_EXTENSIONS,
};
pub use error::{DeviceSelectionError, RhiError, RhiResult, UsageError};
pub use frame::{FrameContext, FrameOrchestrator, FrameRing, FrameStatus, PresentStatus};
pub use handle::*;
pub use recording::CommandRecorder;
pub use rhi::{Rhi, RhiInitInfo, ResourceStats, SubmitDesc, SurfaceProvider};
pub use swapchain::{
    choose_image_count, choose_present_mode, choose_surface_format, choose_swap_extent,
    ImageSharing, PresentModePreference, SurfaceCapabilities, SwapchainInfo,
};
pub use types::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
