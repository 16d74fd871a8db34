// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Renderer on top of the RHI: a pass list driven by the frame orchestrator,
//! plus the debug-draw pass.

pub mod debug_draw;
pub mod pass;
pub mod pipeline;
pub mod shaders;
pub mod system;

use std::path::PathBuf;

use mercury_rhi::RhiError;
use thiserror::Error;

pub use debug_draw::{DebugDrawManager, DebugDrawPipeline, DebugDrawPushConstants};
pub use pass::RenderPass;
pub use pipeline::{FrameOutcome, RenderPipeline};
pub use shaders::ShaderBinaries;
pub use system::{RenderSystem, RenderSystemDesc};

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error("failed to read shader {path}: {source}")]
    ShaderRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
