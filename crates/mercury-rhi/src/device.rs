// SPDX-License-Identifier: CEPL-1.0
//! Physical-device description and selection policy.
//!
//! Backends enumerate their adapters into [`AdapterInfo`] and hand the list to
//! [`select_adapter`]; the policy itself never touches a native API.

use crate::error::DeviceSelectionError;
use crate::types::{PresentMode, SurfaceFormat};
use bitflags::bitflags;
use tracing::{debug, info, warn};

pub const REQUIRED_DEVICE_EXTENSIONS: &[&str] = &["VK_KHR_swapchain"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceType {
    DiscreteGpu,
    IntegratedGpu,
    VirtualGpu,
    Cpu,
    Other,
}

impl DeviceType {
    /// Discrete beats integrated beats everything else.
    pub fn score(self) -> u32 {
        match self {
            DeviceType::DiscreteGpu => 3,
            DeviceType::IntegratedGpu => 2,
            _ => 1,
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct QueueFlags: u32 {
        const GRAPHICS = 0x1;
        const COMPUTE = 0x2;
        const TRANSFER = 0x4;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub flags: QueueFlags,
    pub queue_count: u32,
    /// Whether this family can present to the target surface.
    pub present_support: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: DeviceType,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub extensions: Vec<String>,
    pub surface_formats: Vec<SurfaceFormat>,
    pub present_modes: Vec<PresentMode>,
    pub sampler_anisotropy: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub compute: Option<u32>,
}

impl QueueFamilyIndices {
    /// First family per role wins; the scan stops once every role is filled.
    pub fn find(families: &[QueueFamilyInfo]) -> Self {
        let mut indices = Self::default();
        for (i, family) in families.iter().enumerate() {
            if family.queue_count == 0 {
                continue;
            }
            let i = i as u32;
            if indices.graphics.is_none() && family.flags.contains(QueueFlags::GRAPHICS) {
                indices.graphics = Some(i);
            }
            if indices.present.is_none() && family.present_support {
                indices.present = Some(i);
            }
            if indices.compute.is_none() && family.flags.contains(QueueFlags::COMPUTE) {
                indices.compute = Some(i);
            }
            if indices.is_complete() {
                break;
            }
        }
        indices
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some() && self.compute.is_some()
    }

    /// Distinct family indices, in graphics/present/compute order.
    pub fn unique(&self) -> Vec<u32> {
        let mut out = Vec::with_capacity(3);
        for idx in [self.graphics, self.present, self.compute].into_iter().flatten() {
            if !out.contains(&idx) {
                out.push(idx);
            }
        }
        out
    }
}

/// The winning adapter plus its resolved queue families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SelectedAdapter {
    pub index: usize,
    pub graphics_family: u32,
    pub present_family: u32,
    pub compute_family: u32,
}

fn rejection(adapter: &AdapterInfo, indices: &QueueFamilyIndices, required: &[&str]) -> Option<String> {
    if !indices.is_complete() {
        return Some(format!("incomplete queue families {indices:?}"));
    }
    if let Some(missing) = required
        .iter()
        .find(|ext| !adapter.extensions.iter().any(|have| have == *ext))
    {
        return Some(format!("missing device extension {missing}"));
    }
    if adapter.surface_formats.is_empty() {
        return Some("no surface formats".into());
    }
    if adapter.present_modes.is_empty() {
        return Some("no present modes".into());
    }
    if !adapter.sampler_anisotropy {
        return Some("sampler anisotropy unsupported".into());
    }
    None
}

/// Picks the highest-scoring adapter that passes every suitability check.
/// Ties keep enumeration order.
pub fn select_adapter(
    adapters: &[AdapterInfo],
    required_extensions: &[&str],
) -> Result<SelectedAdapter, DeviceSelectionError> {
    if adapters.is_empty() {
        warn!("no physical devices enumerated");
        return Err(DeviceSelectionError::NoCompatibleDevice);
    }

    let mut order: Vec<usize> = (0..adapters.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(adapters[i].device_type.score()));

    for i in order {
        let adapter = &adapters[i];
        let indices = QueueFamilyIndices::find(&adapter.queue_families);
        match rejection(adapter, &indices, required_extensions) {
            Some(reason) => debug!("rejecting {}: {reason}", adapter.name),
            None => {
                info!("GPU: {} ({:?})", adapter.name, adapter.device_type);
                // is_complete() held, so every index is set.
                if let (Some(graphics_family), Some(present_family), Some(compute_family)) =
                    (indices.graphics, indices.present, indices.compute)
                {
                    return Ok(SelectedAdapter {
                        index: i,
                        graphics_family,
                        present_family,
                        compute_family,
                    });
                }
            }
        }
    }

    warn!("{} physical device(s) enumerated, none suitable", adapters.len());
    Err(DeviceSelectionError::NoSuitableDevice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColorSpace, Format};

    fn family(flags: QueueFlags, present: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            flags,
            queue_count: 1,
            present_support: present,
        }
    }

    fn adapter(name: &str, device_type: DeviceType) -> AdapterInfo {
        AdapterInfo {
            name: name.into(),
            device_type,
            queue_families: vec![family(QueueFlags::GRAPHICS | QueueFlags::COMPUTE, true)],
            extensions: vec!["VK_KHR_swapchain".into()],
            surface_formats: vec![SurfaceFormat {
                format: Format::B8G8R8A8_UNORM,
                color_space: ColorSpace::SRGB_NONLINEAR,
            }],
            present_modes: vec![PresentMode::Fifo],
            sampler_anisotropy: true,
        }
    }

    #[test]
    fn empty_list_is_no_compatible_device() {
        assert_eq!(
            select_adapter(&[], REQUIRED_DEVICE_EXTENSIONS),
            Err(DeviceSelectionError::NoCompatibleDevice)
        );
    }

    #[test]
    fn discrete_preferred_over_integrated() {
        let adapters = [
            adapter("igpu", DeviceType::IntegratedGpu),
            adapter("cpu", DeviceType::Cpu),
            adapter("dgpu", DeviceType::DiscreteGpu),
        ];
        let picked = select_adapter(&adapters, REQUIRED_DEVICE_EXTENSIONS).unwrap();
        assert_eq!(picked.index, 2);
    }

    #[test]
    fn unsuitable_high_score_falls_through() {
        let mut dgpu = adapter("dgpu", DeviceType::DiscreteGpu);
        dgpu.sampler_anisotropy = false;
        let mut igpu = adapter("igpu", DeviceType::IntegratedGpu);
        igpu.extensions.clear();
        let other = adapter("soft", DeviceType::Other);
        let picked = select_adapter(&[dgpu, igpu, other], REQUIRED_DEVICE_EXTENSIONS).unwrap();
        assert_eq!(picked.index, 2);
    }

    #[test]
    fn none_suitable() {
        let mut a = adapter("a", DeviceType::DiscreteGpu);
        a.present_modes.clear();
        let mut b = adapter("b", DeviceType::IntegratedGpu);
        b.surface_formats.clear();
        assert_eq!(
            select_adapter(&[a, b], REQUIRED_DEVICE_EXTENSIONS),
            Err(DeviceSelectionError::NoSuitableDevice)
        );
    }

    #[test]
    fn missing_compute_family_rejects() {
        let mut a = adapter("a", DeviceType::DiscreteGpu);
        a.queue_families = vec![family(QueueFlags::GRAPHICS, true)];
        assert_eq!(
            select_adapter(&[a], REQUIRED_DEVICE_EXTENSIONS),
            Err(DeviceSelectionError::NoSuitableDevice)
        );
    }

    #[test]
    fn queue_families_split_across_indices() {
        let families = [
            family(QueueFlags::TRANSFER, false),
            family(QueueFlags::GRAPHICS, false),
            family(QueueFlags::COMPUTE, true),
            family(QueueFlags::GRAPHICS | QueueFlags::COMPUTE, true),
        ];
        let idx = QueueFamilyIndices::find(&families);
        assert!(idx.is_complete());
        assert_eq!(idx.graphics, Some(1));
        assert_eq!(idx.present, Some(2));
        assert_eq!(idx.compute, Some(2));
        assert_eq!(idx.unique(), vec![1, 2]);
    }

    #[test]
    fn empty_families_are_skipped() {
        let mut dead = family(QueueFlags::GRAPHICS | QueueFlags::COMPUTE, true);
        dead.queue_count = 0;
        let idx = QueueFamilyIndices::find(&[dead]);
        assert_eq!(idx, QueueFamilyIndices::default());
        assert!(!idx.is_complete());
    }
}
