// SPDX-License-Identifier: CEPL-1.0
//! Debug-draw pass: one render pass (color + depth), a framebuffer per
//! swapchain image and six pipelines sharing one push-constant layout.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use mercury_rhi::{
    AccessFlags, AttachmentDescription, AttachmentLoadOp, AttachmentReference, AttachmentStoreOp,
    ClearValue, ColorBlendState, CompareOp, CullModeFlags, DependencyFlags, DepthStencilState,
    DynamicState, Extent2D, FrameContext, FramebufferDesc, FramebufferHandle, GraphicsPipelineDesc,
    ImageLayout, InputAssemblyState, MultisampleState, PipelineBindPoint, PipelineHandle,
    PipelineLayoutDesc, PipelineLayoutHandle, PipelineStageFlags, PrimitiveTopology,
    PushConstantRange, RasterizationState, RenderPassBeginDesc, RenderPassDesc, RenderPassHandle,
    Rhi, RhiResult, SampleCountFlags, ShaderStageDesc, ShaderStageFlags, SubpassDependency,
    SubpassDescription, SwapchainInfo, VertexInputState, ViewportState, SUBPASS_EXTERNAL,
};
use tracing::{debug, info};

use crate::pass::RenderPass;
use crate::shaders::ShaderBinaries;

const LABEL_COLOR: [f32; 4] = [0.2, 0.8, 0.2, 1.0];

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DebugDrawPushConstants {
    pub proj_view: [[f32; 4]; 4],
    pub color: [f32; 4],
}

impl DebugDrawPushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;
    pub const STAGES: ShaderStageFlags = ShaderStageFlags::VERTEX.union(ShaderStageFlags::FRAGMENT);

    pub fn new(proj_view: Mat4, color: Vec4) -> Self {
        Self {
            proj_view: proj_view.to_cols_array_2d(),
            color: color.to_array(),
        }
    }
}

/// Orthographic projection keeping unit-square content undistorted: the
/// shorter axis spans [-1, 1], the longer one is widened by the aspect ratio.
pub fn aspect_projection(extent: Extent2D) -> Mat4 {
    let w = extent.width.max(1) as f32;
    let h = extent.height.max(1) as f32;
    let (x, y) = if w >= h { (w / h, 1.0) } else { (1.0, h / w) };
    Mat4::orthographic_rh(-x, x, -y, y, 0.0, 1.0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DebugDrawPipeline {
    Point,
    Line,
    Triangle,
    PointNoDepth,
    LineNoDepth,
    TriangleNoDepth,
}

impl DebugDrawPipeline {
    pub const ALL: [DebugDrawPipeline; 6] = [
        Self::Point,
        Self::Line,
        Self::Triangle,
        Self::PointNoDepth,
        Self::LineNoDepth,
        Self::TriangleNoDepth,
    ];

    pub fn topology(self) -> PrimitiveTopology {
        match self {
            Self::Point | Self::PointNoDepth => PrimitiveTopology::PointList,
            Self::Line | Self::LineNoDepth => PrimitiveTopology::LineList,
            Self::Triangle | Self::TriangleNoDepth => PrimitiveTopology::TriangleList,
        }
    }

    pub fn depth_tested(self) -> bool {
        matches!(self, Self::Point | Self::Line | Self::Triangle)
    }
}

fn render_pass_desc(sc: &SwapchainInfo) -> RenderPassDesc {
    RenderPassDesc {
        attachments: vec![
            AttachmentDescription {
                format: sc.format,
                samples: SampleCountFlags::TYPE_1,
                load_op: AttachmentLoadOp::Clear,
                store_op: AttachmentStoreOp::Store,
                stencil_load_op: AttachmentLoadOp::DontCare,
                stencil_store_op: AttachmentStoreOp::DontCare,
                initial_layout: ImageLayout::Undefined,
                final_layout: ImageLayout::PresentSrc,
            },
            AttachmentDescription {
                format: sc.depth_format,
                samples: SampleCountFlags::TYPE_1,
                load_op: AttachmentLoadOp::Clear,
                store_op: AttachmentStoreOp::DontCare,
                stencil_load_op: AttachmentLoadOp::DontCare,
                stencil_store_op: AttachmentStoreOp::DontCare,
                initial_layout: ImageLayout::Undefined,
                final_layout: ImageLayout::DepthStencilAttachmentOptimal,
            },
        ],
        subpasses: vec![SubpassDescription {
            bind_point: PipelineBindPoint::Graphics,
            input_attachments: Vec::new(),
            color_attachments: vec![AttachmentReference {
                attachment: 0,
                layout: ImageLayout::ColorAttachmentOptimal,
            }],
            depth_stencil_attachment: Some(AttachmentReference {
                attachment: 1,
                layout: ImageLayout::DepthStencilAttachmentOptimal,
            }),
        }],
        // Image-available is waited at COLOR_ATTACHMENT_OUTPUT; the layout
        // transition has to wait there too.
        dependencies: vec![SubpassDependency {
            src_subpass: SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            dst_stage_mask: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            src_access_mask: AccessFlags::empty(),
            dst_access_mask: AccessFlags::COLOR_ATTACHMENT_WRITE
                | AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dependency_flags: DependencyFlags::empty(),
        }],
    }
}

fn pipeline_desc(
    kind: DebugDrawPipeline,
    stages: &[ShaderStageDesc],
    layout: PipelineLayoutHandle,
    render_pass: RenderPassHandle,
) -> GraphicsPipelineDesc {
    let depth = if kind.depth_tested() {
        DepthStencilState {
            compare_op: CompareOp::LessOrEqual,
            ..DepthStencilState::default()
        }
    } else {
        DepthStencilState {
            depth_test: false,
            depth_write: false,
            compare_op: CompareOp::Always,
            ..DepthStencilState::default()
        }
    };
    GraphicsPipelineDesc {
        stages: stages.to_vec(),
        vertex_input: VertexInputState::default(),
        input_assembly: InputAssemblyState {
            topology: kind.topology(),
            primitive_restart: false,
        },
        viewport: ViewportState::dynamic_single(),
        rasterization: RasterizationState {
            cull_mode: CullModeFlags::empty(),
            ..RasterizationState::default()
        },
        multisample: MultisampleState::default(),
        depth_stencil: Some(depth),
        color_blend: ColorBlendState::default(),
        dynamic_states: vec![DynamicState::Viewport, DynamicState::Scissor],
        layout,
        render_pass,
        subpass: 0,
    }
}

pub struct DebugDrawManager {
    render_pass: RenderPassHandle,
    layout: PipelineLayoutHandle,
    pipelines: Vec<(DebugDrawPipeline, PipelineHandle)>,
    framebuffers: Vec<FramebufferHandle>,
    clear_color: [f32; 4],
    push: DebugDrawPushConstants,
}

impl DebugDrawManager {
    pub fn new<R: Rhi + ?Sized>(rhi: &mut R, shaders: &ShaderBinaries, clear_color: [f32; 4]) -> RhiResult<Self> {
        let pass_desc = render_pass_desc(rhi.swapchain());
        let render_pass = rhi.create_render_pass(&pass_desc)?;
        let layout = match rhi.create_pipeline_layout(&PipelineLayoutDesc {
            set_layouts: Vec::new(),
            push_constant_ranges: vec![PushConstantRange {
                stage_flags: DebugDrawPushConstants::STAGES,
                offset: 0,
                size: DebugDrawPushConstants::SIZE,
            }],
        }) {
            Ok(l) => l,
            Err(e) => {
                rhi.destroy_render_pass(render_pass);
                return Err(e);
            }
        };

        let mut manager = Self {
            render_pass,
            layout,
            pipelines: Vec::with_capacity(DebugDrawPipeline::ALL.len()),
            framebuffers: Vec::new(),
            clear_color,
            push: DebugDrawPushConstants::new(Mat4::IDENTITY, Vec4::ONE),
        };
        manager.set_view_projection(aspect_projection(rhi.swapchain().extent));
        if let Err(e) = manager.build(rhi, shaders) {
            manager.destroy(rhi);
            return Err(e);
        }
        info!(
            "debug draw: {} pipelines, {} framebuffers",
            manager.pipelines.len(),
            manager.framebuffers.len()
        );
        Ok(manager)
    }

    fn build<R: Rhi + ?Sized>(&mut self, rhi: &mut R, shaders: &ShaderBinaries) -> RhiResult<()> {
        let vert = rhi.create_shader_module(&shaders.vertex)?;
        let frag = match rhi.create_shader_module(&shaders.fragment) {
            Ok(m) => m,
            Err(e) => {
                rhi.destroy_shader_module(vert);
                return Err(e);
            }
        };
        let stages = [
            ShaderStageDesc::main(ShaderStageFlags::VERTEX, vert),
            ShaderStageDesc::main(ShaderStageFlags::FRAGMENT, frag),
        ];
        let mut built = Ok(());
        for kind in DebugDrawPipeline::ALL {
            match rhi.create_graphics_pipeline(&pipeline_desc(kind, &stages, self.layout, self.render_pass)) {
                Ok(p) => self.pipelines.push((kind, p)),
                Err(e) => {
                    built = Err(e);
                    break;
                }
            }
        }
        // Modules are only needed while pipelines are created.
        rhi.destroy_shader_module(vert);
        rhi.destroy_shader_module(frag);
        built?;
        self.create_framebuffers(rhi)
    }

    fn create_framebuffers<R: Rhi + ?Sized>(&mut self, rhi: &mut R) -> RhiResult<()> {
        let sc = rhi.swapchain();
        let descs: Vec<FramebufferDesc> = sc
            .image_views
            .iter()
            .map(|&view| FramebufferDesc {
                render_pass: self.render_pass,
                attachments: vec![view, sc.depth_view],
                width: sc.extent.width,
                height: sc.extent.height,
                layers: 1,
            })
            .collect();
        for desc in &descs {
            let fb = rhi.create_framebuffer(desc)?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    fn destroy_framebuffers<R: Rhi + ?Sized>(&mut self, rhi: &mut R) {
        for fb in self.framebuffers.drain(..) {
            rhi.destroy_framebuffer(fb);
        }
    }

    /// Framebuffers follow the swapchain; pipelines keep dynamic viewport and
    /// scissor and are not rebuilt.
    pub fn update_after_recreate_swapchain<R: Rhi + ?Sized>(&mut self, rhi: &mut R) -> RhiResult<()> {
        self.destroy_framebuffers(rhi);
        self.create_framebuffers(rhi)?;
        self.set_view_projection(aspect_projection(rhi.swapchain().extent));
        debug!(
            "debug draw framebuffers rebuilt at {}x{}",
            rhi.swapchain().extent.width,
            rhi.swapchain().extent.height
        );
        Ok(())
    }

    pub fn pipeline(&self, kind: DebugDrawPipeline) -> Option<PipelineHandle> {
        self.pipelines.iter().find(|(k, _)| *k == kind).map(|&(_, p)| p)
    }

    /// What the next `draw` pushes.
    pub fn push_constants(&self) -> &DebugDrawPushConstants {
        &self.push
    }

    fn set_view_projection(&mut self, proj_view: Mat4) {
        self.push.proj_view = proj_view.to_cols_array_2d();
    }
}

impl<R: Rhi + ?Sized> RenderPass<R> for DebugDrawManager {
    fn name(&self) -> &str {
        "DebugDrawManager"
    }

    fn draw(&mut self, rhi: &mut R, frame: &FrameContext) -> RhiResult<()> {
        let cb = frame.command_buffer;
        let (viewport, scissor) = {
            let sc = rhi.swapchain();
            (sc.viewport(), sc.scissor())
        };
        let framebuffer = *self
            .framebuffers
            .get(frame.image_index as usize)
            .ok_or_else(|| {
                mercury_rhi::RhiError::usage(
                    "DebugDrawManager::draw",
                    mercury_rhi::UsageError::OutOfRange("swapchain image index"),
                )
            })?;
        let pipeline = self
            .pipeline(DebugDrawPipeline::Triangle)
            .ok_or_else(|| {
                mercury_rhi::RhiError::usage(
                    "DebugDrawManager::draw",
                    mercury_rhi::UsageError::UnknownHandle("pipeline"),
                )
            })?;

        rhi.cmd_push_event(cb, "DebugDrawManager", LABEL_COLOR)?;
        rhi.cmd_set_viewport(cb, viewport)?;
        rhi.cmd_set_scissor(cb, scissor)?;
        rhi.cmd_begin_render_pass(
            cb,
            &RenderPassBeginDesc {
                render_pass: self.render_pass,
                framebuffer,
                render_area: scissor,
                clear_values: vec![
                    ClearValue::Color(self.clear_color),
                    ClearValue::DepthStencil {
                        depth: 1.0,
                        stencil: 0,
                    },
                ],
            },
        )?;
        rhi.cmd_bind_pipeline(cb, pipeline)?;
        rhi.cmd_push_constants(
            cb,
            self.layout,
            DebugDrawPushConstants::STAGES,
            0,
            bytemuck::bytes_of(&self.push),
        )?;
        rhi.cmd_draw(cb, 3, 1, 0, 0)?;
        rhi.cmd_end_render_pass(cb)?;
        rhi.cmd_pop_event(cb)
    }

    fn on_swapchain_recreated(&mut self, rhi: &mut R) -> RhiResult<()> {
        self.update_after_recreate_swapchain(rhi)
    }

    fn destroy(&mut self, rhi: &mut R) {
        self.destroy_framebuffers(rhi);
        for (_, p) in self.pipelines.drain(..) {
            rhi.destroy_pipeline(p);
        }
        rhi.destroy_pipeline_layout(self.layout);
        rhi.destroy_render_pass(self.render_pass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constants_are_80_bytes() {
        assert_eq!(DebugDrawPushConstants::SIZE, 80);
        let pc = DebugDrawPushConstants::new(Mat4::IDENTITY, Vec4::new(1.0, 0.0, 0.0, 1.0));
        let bytes = bytemuck::bytes_of(&pc);
        assert_eq!(bytes.len(), 80);
        assert_eq!(&bytes[64..68], &1.0f32.to_ne_bytes());
    }

    #[test]
    fn projection_undoes_aspect() {
        let wide = aspect_projection(Extent2D::new(1280, 720));
        let corner = wide.project_point3(glam::Vec3::new(1280.0 / 720.0, 1.0, 0.0));
        assert!((corner.x - 1.0).abs() < 1e-5);
        assert!((corner.y - 1.0).abs() < 1e-5);

        let tall = aspect_projection(Extent2D::new(480, 640));
        assert!((tall.x_axis.x - 1.0).abs() < 1e-6);
        assert!((tall.y_axis.y - 0.75).abs() < 1e-6);
        assert_eq!(aspect_projection(Extent2D::new(0, 0)), aspect_projection(Extent2D::new(1, 1)));
    }

    #[test]
    fn view_projection_follows_swapchain() {
        use mercury_rhi::headless::{HeadlessConfig, HeadlessRhi, HeadlessSurface};
        use mercury_rhi::RhiInitInfo;

        let surface = HeadlessSurface::new(1280, 720);
        let mut rhi = HeadlessRhi::new(&RhiInitInfo::new(surface.clone()), HeadlessConfig::default()).unwrap();
        let spirv = 0x0723_0203u32.to_le_bytes().to_vec();
        let mut dd = DebugDrawManager::new(&mut rhi, &ShaderBinaries::new(spirv.clone(), spirv), [0.0; 4]).unwrap();
        let expected = aspect_projection(Extent2D::new(1280, 720)).to_cols_array_2d();
        assert_eq!(dd.push_constants().proj_view, expected);

        surface.resize(640, 640);
        rhi.recreate_swapchain().unwrap();
        dd.update_after_recreate_swapchain(&mut rhi).unwrap();
        let square = aspect_projection(Extent2D::new(640, 640)).to_cols_array_2d();
        assert_eq!(dd.push_constants().proj_view, square);
        assert_ne!(square, expected);
        RenderPass::<HeadlessRhi>::destroy(&mut dd, &mut rhi);
        assert_eq!(rhi.resource_stats().pipelines, 0);
    }

    #[test]
    fn six_variants_half_depth_tested() {
        assert_eq!(DebugDrawPipeline::ALL.len(), 6);
        let tested = DebugDrawPipeline::ALL.iter().filter(|k| k.depth_tested()).count();
        assert_eq!(tested, 3);
        assert_eq!(DebugDrawPipeline::LineNoDepth.topology(), PrimitiveTopology::LineList);
    }
}
