// SPDX-License-Identifier: CEPL-1.0
//! Swapchain negotiation: format, present mode, extent, image count, sharing.

use crate::handle::ImageViewHandle;
use crate::types::{ColorSpace, Extent2D, Format, PresentMode, Rect2D, SurfaceFormat, Viewport};
use crate::RenderSize;

/// What the surface reports it can do, backend-neutral.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceCapabilities {
    pub min_image_count: u32,
    /// 0 means "no upper limit".
    pub max_image_count: u32,
    /// `u32::MAX` in both components lets the application choose.
    pub current_extent: Extent2D,
    pub min_image_extent: Extent2D,
    pub max_image_extent: Extent2D,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentModePreference {
    /// Mailbox when available, FIFO otherwise.
    #[default]
    LowLatency,
    /// Always FIFO.
    Fifo,
}

/// `B8G8R8A8_UNORM` + sRGB-nonlinear if offered, else the first entry.
pub fn choose_surface_format(formats: &[SurfaceFormat]) -> Option<SurfaceFormat> {
    formats
        .iter()
        .copied()
        .find(|f| f.format == Format::B8G8R8A8_UNORM && f.color_space == ColorSpace::SRGB_NONLINEAR)
        .or_else(|| formats.first().copied())
}

/// FIFO is always supported, so it is the only fallback.
pub fn choose_present_mode(modes: &[PresentMode], pref: PresentModePreference) -> PresentMode {
    match pref {
        PresentModePreference::LowLatency if modes.contains(&PresentMode::Mailbox) => {
            PresentMode::Mailbox
        }
        _ => PresentMode::Fifo,
    }
}

pub fn choose_swap_extent(caps: &SurfaceCapabilities, want: RenderSize) -> Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        Extent2D {
            width: want.width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// `min + 1`, capped by `max` when the surface reports one.
pub fn choose_image_count(caps: &SurfaceCapabilities) -> u32 {
    let desired = caps.min_image_count.saturating_add(1);
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageSharing {
    Exclusive,
    /// Graphics and present families differ; images are shared by both.
    Concurrent([u32; 2]),
}

impl ImageSharing {
    pub fn for_families(graphics: u32, present: u32) -> Self {
        if graphics == present {
            ImageSharing::Exclusive
        } else {
            ImageSharing::Concurrent([graphics, present])
        }
    }
}

/// The live swapchain as seen by passes.
#[derive(Clone, Debug, PartialEq)]
pub struct SwapchainInfo {
    pub format: Format,
    pub color_space: ColorSpace,
    pub extent: Extent2D,
    pub present_mode: PresentMode,
    pub image_count: u32,
    pub image_views: Vec<ImageViewHandle>,
    pub depth_format: Format,
    pub depth_view: ImageViewHandle,
    pub sharing: ImageSharing,
}

impl SwapchainInfo {
    pub fn viewport(&self) -> Viewport {
        Viewport::from_extent(self.extent)
    }

    pub fn scissor(&self) -> Rect2D {
        Rect2D::from_extent(self.extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> SurfaceCapabilities {
        SurfaceCapabilities {
            min_image_count: min,
            max_image_count: max,
            current_extent: Extent2D::new(u32::MAX, u32::MAX),
            min_image_extent: Extent2D::new(1, 1),
            max_image_extent: Extent2D::new(4096, 4096),
        }
    }

    fn sf(format: Format, color_space: ColorSpace) -> SurfaceFormat {
        SurfaceFormat { format, color_space }
    }

    #[test]
    fn image_count_within_bounds() {
        for min in 1..8 {
            for max in 0..10 {
                if max != 0 && max < min {
                    continue;
                }
                let n = choose_image_count(&caps(min, max));
                assert!(n >= min, "min={min} max={max} n={n}");
                if max > 0 {
                    assert!(n <= max, "min={min} max={max} n={n}");
                }
            }
        }
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(3, 3)), 3);
    }

    #[test]
    fn preferred_format_wins_regardless_of_position() {
        let wanted = sf(Format::B8G8R8A8_UNORM, ColorSpace::SRGB_NONLINEAR);
        let list = [
            sf(Format::R8G8B8A8_SRGB, ColorSpace::SRGB_NONLINEAR),
            sf(Format::B8G8R8A8_UNORM, ColorSpace::HDR10_ST2084),
            wanted,
        ];
        assert_eq!(choose_surface_format(&list), Some(wanted));
        assert_eq!(choose_surface_format(&list), choose_surface_format(&list));
    }

    #[test]
    fn format_falls_back_to_first() {
        let list = [
            sf(Format::R8G8B8A8_SRGB, ColorSpace::SRGB_NONLINEAR),
            sf(Format(1_000_156_000), ColorSpace::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&list), Some(list[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn present_mode_is_mailbox_or_fifo() {
        use PresentMode::*;
        let pref = PresentModePreference::LowLatency;
        assert_eq!(choose_present_mode(&[Fifo, Mailbox], pref), Mailbox);
        assert_eq!(choose_present_mode(&[Immediate, FifoRelaxed, Fifo], pref), Fifo);
        assert_eq!(choose_present_mode(&[Immediate], pref), Fifo);
        assert_eq!(choose_present_mode(&[Mailbox], PresentModePreference::Fifo), Fifo);
    }

    #[test]
    fn extent_clamped_only_on_sentinel() {
        let mut c = caps(2, 3);
        c.min_image_extent = Extent2D::new(800, 600);
        c.max_image_extent = Extent2D::new(1920, 1080);
        assert_eq!(choose_swap_extent(&c, RenderSize::new(640, 480)), Extent2D::new(800, 600));
        assert_eq!(choose_swap_extent(&c, RenderSize::new(4000, 900)), Extent2D::new(1920, 900));

        c.current_extent = Extent2D::new(1024, 768);
        assert_eq!(choose_swap_extent(&c, RenderSize::new(640, 480)), Extent2D::new(1024, 768));
    }

    #[test]
    fn sharing_depends_on_family_split() {
        assert_eq!(ImageSharing::for_families(0, 0), ImageSharing::Exclusive);
        assert_eq!(ImageSharing::for_families(0, 2), ImageSharing::Concurrent([0, 2]));
    }
}
