// SPDX-License-Identifier: CEPL-1.0
//! Neutral type <-> ash translation. Neutral discriminants already carry the
//! Vulkan numbering, so most of these are raw casts.

use ash::vk;
use mercury_rhi::{
    AccessFlags, AttachmentDescription, AttachmentReference, ClearValue, ColorBlendAttachment,
    ColorComponentFlags, ColorSpace, CullModeFlags, DependencyFlags, DeviceType, Extent2D, Format,
    ImageLayout, PipelineStageFlags, PresentMode, QueueFlags, Rect2D, SampleCountFlags,
    ShaderStageFlags, SubpassDependency, SurfaceCapabilities, SurfaceFormat, Viewport,
};

pub(crate) fn format(f: Format) -> vk::Format {
    vk::Format::from_raw(f.0)
}

pub(crate) fn surface_format(f: vk::SurfaceFormatKHR) -> SurfaceFormat {
    SurfaceFormat {
        format: Format(f.format.as_raw()),
        color_space: ColorSpace(f.color_space.as_raw()),
    }
}

pub(crate) fn color_space(cs: ColorSpace) -> vk::ColorSpaceKHR {
    vk::ColorSpaceKHR::from_raw(cs.0)
}

pub(crate) fn present_mode(m: PresentMode) -> vk::PresentModeKHR {
    vk::PresentModeKHR::from_raw(m as i32)
}

/// Modes we have no name for are dropped; they are never selected anyway.
pub(crate) fn present_modes(modes: &[vk::PresentModeKHR]) -> Vec<PresentMode> {
    modes
        .iter()
        .filter_map(|m| PresentMode::from_raw(m.as_raw()))
        .collect()
}

pub(crate) fn device_type(t: vk::PhysicalDeviceType) -> DeviceType {
    match t {
        vk::PhysicalDeviceType::DISCRETE_GPU => DeviceType::DiscreteGpu,
        vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceType::IntegratedGpu,
        vk::PhysicalDeviceType::VIRTUAL_GPU => DeviceType::VirtualGpu,
        vk::PhysicalDeviceType::CPU => DeviceType::Cpu,
        _ => DeviceType::Other,
    }
}

pub(crate) fn queue_flags(f: vk::QueueFlags) -> QueueFlags {
    QueueFlags::from_bits_truncate(f.as_raw())
}

pub(crate) fn capabilities(c: &vk::SurfaceCapabilitiesKHR) -> SurfaceCapabilities {
    SurfaceCapabilities {
        min_image_count: c.min_image_count,
        max_image_count: c.max_image_count,
        current_extent: extent_back(c.current_extent),
        min_image_extent: extent_back(c.min_image_extent),
        max_image_extent: extent_back(c.max_image_extent),
    }
}

pub(crate) fn extent(e: Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: e.width,
        height: e.height,
    }
}

pub(crate) fn extent_back(e: vk::Extent2D) -> Extent2D {
    Extent2D::new(e.width, e.height)
}

pub(crate) fn rect(r: Rect2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D {
            x: r.offset.x,
            y: r.offset.y,
        },
        extent: extent(r.extent),
    }
}

pub(crate) fn viewport(v: Viewport) -> vk::Viewport {
    vk::Viewport {
        x: v.x,
        y: v.y,
        width: v.width,
        height: v.height,
        min_depth: v.min_depth,
        max_depth: v.max_depth,
    }
}

pub(crate) fn samples(s: SampleCountFlags) -> vk::SampleCountFlags {
    vk::SampleCountFlags::from_raw(s.bits())
}

pub(crate) fn shader_stages(s: ShaderStageFlags) -> vk::ShaderStageFlags {
    vk::ShaderStageFlags::from_raw(s.bits())
}

pub(crate) fn cull_mode(c: CullModeFlags) -> vk::CullModeFlags {
    vk::CullModeFlags::from_raw(c.bits())
}

pub(crate) fn color_components(c: ColorComponentFlags) -> vk::ColorComponentFlags {
    vk::ColorComponentFlags::from_raw(c.bits())
}

pub(crate) fn pipeline_stages(s: PipelineStageFlags) -> vk::PipelineStageFlags {
    vk::PipelineStageFlags::from_raw(s.bits())
}

fn access(a: AccessFlags) -> vk::AccessFlags {
    vk::AccessFlags::from_raw(a.bits())
}

fn dependency_flags(d: DependencyFlags) -> vk::DependencyFlags {
    vk::DependencyFlags::from_raw(d.bits())
}

fn layout(l: ImageLayout) -> vk::ImageLayout {
    vk::ImageLayout::from_raw(l as i32)
}

pub(crate) fn attachment(a: &AttachmentDescription) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format: format(a.format),
        samples: samples(a.samples),
        load_op: vk::AttachmentLoadOp::from_raw(a.load_op as i32),
        store_op: vk::AttachmentStoreOp::from_raw(a.store_op as i32),
        stencil_load_op: vk::AttachmentLoadOp::from_raw(a.stencil_load_op as i32),
        stencil_store_op: vk::AttachmentStoreOp::from_raw(a.stencil_store_op as i32),
        initial_layout: layout(a.initial_layout),
        final_layout: layout(a.final_layout),
        ..Default::default()
    }
}

pub(crate) fn attachment_ref(r: &AttachmentReference) -> vk::AttachmentReference {
    vk::AttachmentReference {
        attachment: r.attachment,
        layout: layout(r.layout),
    }
}

pub(crate) fn dependency(d: &SubpassDependency) -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: d.src_subpass,
        dst_subpass: d.dst_subpass,
        src_stage_mask: pipeline_stages(d.src_stage_mask),
        dst_stage_mask: pipeline_stages(d.dst_stage_mask),
        src_access_mask: access(d.src_access_mask),
        dst_access_mask: access(d.dst_access_mask),
        dependency_flags: dependency_flags(d.dependency_flags),
    }
}

pub(crate) fn blend_attachment(b: &ColorBlendAttachment) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: b.blend_enable.into(),
        src_color_blend_factor: vk::BlendFactor::from_raw(b.src_color_blend_factor as i32),
        dst_color_blend_factor: vk::BlendFactor::from_raw(b.dst_color_blend_factor as i32),
        color_blend_op: vk::BlendOp::from_raw(b.color_blend_op as i32),
        src_alpha_blend_factor: vk::BlendFactor::from_raw(b.src_alpha_blend_factor as i32),
        dst_alpha_blend_factor: vk::BlendFactor::from_raw(b.dst_alpha_blend_factor as i32),
        alpha_blend_op: vk::BlendOp::from_raw(b.alpha_blend_op as i32),
        color_write_mask: color_components(b.color_write_mask),
    }
}

pub(crate) fn clear_value(c: ClearValue) -> vk::ClearValue {
    match c {
        ClearValue::Color(rgba) => vk::ClearValue {
            color: vk::ClearColorValue { float32: rgba },
        },
        ClearValue::DepthStencil { depth, stencil } => vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mercury_rhi::{
        AttachmentLoadOp, AttachmentStoreOp, BlendFactor, CompareOp, DescriptorType, DynamicState,
        PrimitiveTopology,
    };

    #[test]
    fn neutral_numbering_matches_vulkan() {
        assert_eq!(format(Format::B8G8R8A8_UNORM), vk::Format::B8G8R8A8_UNORM);
        assert_eq!(format(Format::D24_UNORM_S8_UINT), vk::Format::D24_UNORM_S8_UINT);
        assert_eq!(layout(ImageLayout::PresentSrc), vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(
            layout(ImageLayout::DepthStencilAttachmentOptimal),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
        assert_eq!(present_mode(PresentMode::Mailbox), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            vk::AttachmentLoadOp::from_raw(AttachmentLoadOp::DontCare as i32),
            vk::AttachmentLoadOp::DONT_CARE
        );
        assert_eq!(
            vk::AttachmentStoreOp::from_raw(AttachmentStoreOp::DontCare as i32),
            vk::AttachmentStoreOp::DONT_CARE
        );
        assert_eq!(vk::CompareOp::from_raw(CompareOp::LessOrEqual as i32), vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(
            vk::BlendFactor::from_raw(BlendFactor::OneMinusSrcAlpha as i32),
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(
            vk::PrimitiveTopology::from_raw(PrimitiveTopology::LineList as i32),
            vk::PrimitiveTopology::LINE_LIST
        );
        assert_eq!(vk::DynamicState::from_raw(DynamicState::Scissor as i32), vk::DynamicState::SCISSOR);
        assert_eq!(
            vk::DescriptorType::from_raw(DescriptorType::UniformBuffer as i32),
            vk::DescriptorType::UNIFORM_BUFFER
        );
    }

    #[test]
    fn flag_bits_match_vulkan() {
        assert_eq!(
            pipeline_stages(PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT),
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(
            access(AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE),
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(
            shader_stages(ShaderStageFlags::VERTEX | ShaderStageFlags::FRAGMENT),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(color_components(ColorComponentFlags::RGBA), vk::ColorComponentFlags::RGBA);
        assert_eq!(cull_mode(CullModeFlags::BACK), vk::CullModeFlags::BACK);
        assert_eq!(
            queue_flags(vk::QueueFlags::GRAPHICS | vk::QueueFlags::SPARSE_BINDING),
            QueueFlags::GRAPHICS
        );
    }

    #[test]
    fn unknown_present_modes_dropped() {
        let modes = [
            vk::PresentModeKHR::SHARED_DEMAND_REFRESH,
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(present_modes(&modes), vec![PresentMode::Fifo, PresentMode::Mailbox]);
    }
}
