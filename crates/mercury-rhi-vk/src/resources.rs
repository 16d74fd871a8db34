// SPDX-License-Identifier: CEPL-1.0
//! Handle tables and description -> Vulkan translation for every object the
//! renderer creates through the RHI.

use std::ffi::CString;
use std::io::Cursor;

use ash::{util::read_spv, vk};
use mercury_rhi::handle::*;
use mercury_rhi::{
    CommandRecorder, DescriptorSetLayoutDesc, DynamicState, FramebufferDesc, GraphicsPipelineDesc,
    PipelineLayoutDesc, PushConstantRange, RenderPassDesc, ResourceStats, RhiError, RhiResult,
    UsageError,
};
use slotmap::{Key, SlotMap};

use crate::convert;

pub(crate) struct LayoutEntry {
    pub raw: vk::PipelineLayout,
    pub push_ranges: Vec<PushConstantRange>,
}

pub(crate) struct PipelineEntry {
    pub raw: vk::Pipeline,
    pub dynamic_viewport: bool,
    pub dynamic_scissor: bool,
}

pub(crate) struct PoolEntry {
    pub raw: vk::CommandPool,
    pub buffers: Vec<CommandBufferHandle>,
}

pub(crate) struct CommandBufferEntry {
    pub raw: vk::CommandBuffer,
    pub recorder: CommandRecorder,
}

#[derive(Default)]
pub(crate) struct ResourceTables {
    pub shader_modules: SlotMap<ShaderModuleHandle, vk::ShaderModule>,
    pub set_layouts: SlotMap<DescriptorSetLayoutHandle, vk::DescriptorSetLayout>,
    pub pipeline_layouts: SlotMap<PipelineLayoutHandle, LayoutEntry>,
    pub render_passes: SlotMap<RenderPassHandle, vk::RenderPass>,
    pub framebuffers: SlotMap<FramebufferHandle, vk::Framebuffer>,
    pub pipelines: SlotMap<PipelineHandle, PipelineEntry>,
    pub image_views: SlotMap<ImageViewHandle, vk::ImageView>,
    pub fences: SlotMap<FenceHandle, vk::Fence>,
    pub semaphores: SlotMap<SemaphoreHandle, vk::Semaphore>,
    pub command_pools: SlotMap<CommandPoolHandle, PoolEntry>,
    pub command_buffers: SlotMap<CommandBufferHandle, CommandBufferEntry>,
}

pub(crate) fn lookup<'a, K: Key, V>(
    map: &'a SlotMap<K, V>,
    key: K,
    what: &'static str,
    op: &'static str,
) -> RhiResult<&'a V> {
    map.get(key)
        .ok_or_else(|| RhiError::usage(op, UsageError::UnknownHandle(what)))
}

impl ResourceTables {
    pub(crate) fn stats(&self) -> ResourceStats {
        ResourceStats {
            shader_modules: self.shader_modules.len(),
            descriptor_set_layouts: self.set_layouts.len(),
            pipeline_layouts: self.pipeline_layouts.len(),
            render_passes: self.render_passes.len(),
            framebuffers: self.framebuffers.len(),
            pipelines: self.pipelines.len(),
            image_views: self.image_views.len(),
            fences: self.fences.len(),
            semaphores: self.semaphores.len(),
            command_pools: self.command_pools.len(),
            command_buffers: self.command_buffers.len(),
        }
    }

    /// Reclaims whatever the caller leaked. Swapchain views must already be
    /// gone; anything left in `image_views` is destroyed here too.
    pub(crate) unsafe fn destroy_all(&mut self, device: &ash::Device) {
        let leaked = self.stats();
        if leaked != ResourceStats::default() {
            tracing::warn!("reclaiming leaked RHI objects at shutdown: {leaked:?}");
        }
        unsafe {
            for (_, p) in self.pipelines.drain() {
                device.destroy_pipeline(p.raw, None);
            }
            for (_, fb) in self.framebuffers.drain() {
                device.destroy_framebuffer(fb, None);
            }
            for (_, v) in self.image_views.drain() {
                device.destroy_image_view(v, None);
            }
            for (_, rp) in self.render_passes.drain() {
                device.destroy_render_pass(rp, None);
            }
            for (_, l) in self.pipeline_layouts.drain() {
                device.destroy_pipeline_layout(l.raw, None);
            }
            for (_, l) in self.set_layouts.drain() {
                device.destroy_descriptor_set_layout(l, None);
            }
            for (_, m) in self.shader_modules.drain() {
                device.destroy_shader_module(m, None);
            }
            self.command_buffers.clear();
            for (_, pool) in self.command_pools.drain() {
                device.destroy_command_pool(pool.raw, None);
            }
            for (_, s) in self.semaphores.drain() {
                device.destroy_semaphore(s, None);
            }
            for (_, f) in self.fences.drain() {
                device.destroy_fence(f, None);
            }
        }
    }
}

pub(crate) unsafe fn create_shader_module(device: &ash::Device, code: &[u8]) -> RhiResult<vk::ShaderModule> {
    // read_spv handles alignment and rejects lengths that are not a multiple of 4.
    let words = read_spv(&mut Cursor::new(code)).map_err(|e| RhiError::creation("shader module", e))?;
    if words.first() != Some(&0x0723_0203) {
        return Err(RhiError::creation("shader module", "missing SPIR-V magic number"));
    }
    let ci = vk::ShaderModuleCreateInfo::default().code(&words);
    unsafe { device.create_shader_module(&ci, None) }.map_err(|e| RhiError::creation("shader module", e))
}

pub(crate) unsafe fn create_descriptor_set_layout(
    device: &ash::Device,
    desc: &DescriptorSetLayoutDesc,
) -> RhiResult<vk::DescriptorSetLayout> {
    let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
        .bindings
        .iter()
        .map(|b| {
            vk::DescriptorSetLayoutBinding::default()
                .binding(b.binding)
                .descriptor_type(vk::DescriptorType::from_raw(b.descriptor_type as i32))
                .descriptor_count(b.descriptor_count)
                .stage_flags(convert::shader_stages(b.stage_flags))
        })
        .collect();
    let ci = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
    unsafe { device.create_descriptor_set_layout(&ci, None) }
        .map_err(|e| RhiError::creation("descriptor set layout", e))
}

pub(crate) unsafe fn create_pipeline_layout(
    device: &ash::Device,
    tables: &ResourceTables,
    desc: &PipelineLayoutDesc,
) -> RhiResult<vk::PipelineLayout> {
    let set_layouts = desc
        .set_layouts
        .iter()
        .map(|&h| lookup(&tables.set_layouts, h, "descriptor set layout", "create_pipeline_layout").copied())
        .collect::<RhiResult<Vec<_>>>()?;
    let ranges: Vec<vk::PushConstantRange> = desc
        .push_constant_ranges
        .iter()
        .map(|r| vk::PushConstantRange {
            stage_flags: convert::shader_stages(r.stage_flags),
            offset: r.offset,
            size: r.size,
        })
        .collect();
    let ci = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&ranges);
    unsafe { device.create_pipeline_layout(&ci, None) }.map_err(|e| RhiError::creation("pipeline layout", e))
}

pub(crate) unsafe fn create_render_pass(device: &ash::Device, desc: &RenderPassDesc) -> RhiResult<vk::RenderPass> {
    if desc.subpasses.is_empty() {
        return Err(RhiError::creation("render pass", "at least one subpass is required"));
    }
    let attachments: Vec<_> = desc.attachments.iter().map(convert::attachment).collect();

    // Reference arrays must outlive the subpass descriptions pointing into them.
    struct SubpassRefs {
        inputs: Vec<vk::AttachmentReference>,
        colors: Vec<vk::AttachmentReference>,
        depth: Option<vk::AttachmentReference>,
    }
    let refs: Vec<SubpassRefs> = desc
        .subpasses
        .iter()
        .map(|s| SubpassRefs {
            inputs: s.input_attachments.iter().map(convert::attachment_ref).collect(),
            colors: s.color_attachments.iter().map(convert::attachment_ref).collect(),
            depth: s.depth_stencil_attachment.as_ref().map(convert::attachment_ref),
        })
        .collect();
    let subpasses: Vec<vk::SubpassDescription> = desc
        .subpasses
        .iter()
        .zip(&refs)
        .map(|(s, r)| {
            let mut sd = vk::SubpassDescription::default()
                .pipeline_bind_point(vk::PipelineBindPoint::from_raw(s.bind_point as i32))
                .input_attachments(&r.inputs)
                .color_attachments(&r.colors);
            if let Some(depth) = r.depth.as_ref() {
                sd = sd.depth_stencil_attachment(depth);
            }
            sd
        })
        .collect();
    let dependencies: Vec<_> = desc.dependencies.iter().map(convert::dependency).collect();

    let ci = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    unsafe { device.create_render_pass(&ci, None) }.map_err(|e| RhiError::creation("render pass", e))
}

pub(crate) unsafe fn create_framebuffer(
    device: &ash::Device,
    tables: &ResourceTables,
    desc: &FramebufferDesc,
) -> RhiResult<vk::Framebuffer> {
    const OP: &str = "create_framebuffer";
    if desc.width == 0 || desc.height == 0 {
        return Err(RhiError::creation("framebuffer", "zero-sized framebuffer"));
    }
    let render_pass = *lookup(&tables.render_passes, desc.render_pass, "render pass", OP)?;
    let views = desc
        .attachments
        .iter()
        .map(|&v| lookup(&tables.image_views, v, "image view", OP).copied())
        .collect::<RhiResult<Vec<_>>>()?;
    let ci = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(&views)
        .width(desc.width)
        .height(desc.height)
        .layers(desc.layers.max(1));
    unsafe { device.create_framebuffer(&ci, None) }.map_err(|e| RhiError::creation("framebuffer", e))
}

pub(crate) unsafe fn create_graphics_pipeline(
    device: &ash::Device,
    tables: &ResourceTables,
    desc: &GraphicsPipelineDesc,
) -> RhiResult<PipelineEntry> {
    const OP: &str = "create_graphics_pipeline";
    let layout = lookup(&tables.pipeline_layouts, desc.layout, "pipeline layout", OP)?.raw;
    let render_pass = *lookup(&tables.render_passes, desc.render_pass, "render pass", OP)?;

    let entry_points = desc
        .stages
        .iter()
        .map(|s| CString::new(s.entry_point.as_str()).map_err(|e| RhiError::creation("pipeline", e)))
        .collect::<RhiResult<Vec<_>>>()?;
    let stages = desc
        .stages
        .iter()
        .zip(&entry_points)
        .map(|(s, name)| {
            let module = *lookup(&tables.shader_modules, s.module, "shader module", OP)?;
            Ok(vk::PipelineShaderStageCreateInfo::default()
                .stage(convert::shader_stages(s.stage))
                .module(module)
                .name(name))
        })
        .collect::<RhiResult<Vec<_>>>()?;

    let bindings: Vec<_> = desc
        .vertex_input
        .bindings
        .iter()
        .map(|b| vk::VertexInputBindingDescription {
            binding: b.binding,
            stride: b.stride,
            input_rate: vk::VertexInputRate::from_raw(b.input_rate as i32),
        })
        .collect();
    let attributes: Vec<_> = desc
        .vertex_input
        .attributes
        .iter()
        .map(|a| vk::VertexInputAttributeDescription {
            location: a.location,
            binding: a.binding,
            format: convert::format(a.format),
            offset: a.offset,
        })
        .collect();
    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::from_raw(desc.input_assembly.topology as i32))
        .primitive_restart_enable(desc.input_assembly.primitive_restart);

    // Counts are always set; arrays only when static values were given.
    let viewports: Vec<_> = desc.viewport.viewports.iter().copied().map(convert::viewport).collect();
    let scissors: Vec<_> = desc.viewport.scissors.iter().copied().map(convert::rect).collect();
    let mut viewport_state = vk::PipelineViewportStateCreateInfo {
        viewport_count: desc.viewport.viewport_count,
        scissor_count: desc.viewport.scissor_count,
        ..Default::default()
    };
    if !viewports.is_empty() {
        viewport_state = viewport_state.viewports(&viewports);
    }
    if !scissors.is_empty() {
        viewport_state = viewport_state.scissors(&scissors);
    }

    let r = &desc.rasterization;
    let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(r.depth_clamp)
        .rasterizer_discard_enable(r.rasterizer_discard)
        .polygon_mode(vk::PolygonMode::from_raw(r.polygon_mode as i32))
        .cull_mode(convert::cull_mode(r.cull_mode))
        .front_face(vk::FrontFace::from_raw(r.front_face as i32))
        .depth_bias_enable(r.depth_bias)
        .line_width(r.line_width);

    let multisample = vk::PipelineMultisampleStateCreateInfo::default()
        .rasterization_samples(convert::samples(desc.multisample.samples))
        .sample_shading_enable(desc.multisample.sample_shading)
        .min_sample_shading(desc.multisample.min_sample_shading);

    let depth_stencil = desc.depth_stencil.as_ref().map(|d| {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(d.depth_test)
            .depth_write_enable(d.depth_write)
            .depth_compare_op(vk::CompareOp::from_raw(d.compare_op as i32))
            .depth_bounds_test_enable(d.depth_bounds_test)
            .stencil_test_enable(d.stencil_test)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
    });

    let blend_attachments: Vec<_> = desc
        .color_blend
        .attachments
        .iter()
        .map(convert::blend_attachment)
        .collect();
    let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
        .attachments(&blend_attachments)
        .blend_constants(desc.color_blend.blend_constants);

    let dynamic: Vec<_> = desc
        .dynamic_states
        .iter()
        .map(|&d| vk::DynamicState::from_raw(d as i32))
        .collect();
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic);

    let mut ci = vk::GraphicsPipelineCreateInfo::default()
        .stages(&stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterization)
        .multisample_state(&multisample)
        .color_blend_state(&color_blend)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(desc.subpass);
    if let Some(ds) = depth_stencil.as_ref() {
        ci = ci.depth_stencil_state(ds);
    }

    let raw = unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[ci], None) }
        .map_err(|(_, e)| RhiError::creation("graphics pipeline", e))?
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::creation("graphics pipeline", "driver returned no pipeline"))?;

    Ok(PipelineEntry {
        raw,
        dynamic_viewport: desc.is_dynamic(DynamicState::Viewport),
        dynamic_scissor: desc.is_dynamic(DynamicState::Scissor),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_borrows_from_the_table() {
        let mut table: SlotMap<FenceHandle, u32> = SlotMap::with_key();
        let live = table.insert(7);
        let gone = table.insert(9);
        table.remove(gone);

        let value: &u32 = lookup(&table, live, "fence", "wait_for_fence").unwrap();
        assert_eq!(*value, 7);
        assert!(matches!(
            lookup(&table, gone, "fence", "wait_for_fence"),
            Err(RhiError::InvalidState(UsageError::UnknownHandle("fence")))
        ));
    }

    #[test]
    fn empty_tables_report_no_live_objects() {
        assert_eq!(ResourceTables::default().stats(), ResourceStats::default());
    }
}
