// SPDX-License-Identifier: CEPL-1.0
use std::fmt::Display;
use thiserror::Error;
use tracing::error;

pub type RhiResult<T> = Result<T, RhiError>;

#[derive(Debug, Error)]
pub enum RhiError {
    #[error(transparent)]
    DeviceSelection(#[from] DeviceSelectionError),

    #[error("surface failure in {op}: {reason}")]
    Surface { op: &'static str, reason: String },

    #[error("failed to create {op}: {reason}")]
    ResourceCreation { op: &'static str, reason: String },

    /// The surface no longer matches the swapchain (out-of-date or suboptimal).
    /// Recoverable: the frame orchestrator recreates and reports a retry.
    #[error("swapchain is stale")]
    SwapchainStale,

    #[error("invalid state: {0}")]
    InvalidState(#[from] UsageError),

    #[error("device failure in {op}: {reason}")]
    Device { op: &'static str, reason: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceSelectionError {
    #[error("no physical devices were enumerated")]
    NoCompatibleDevice,
    #[error("physical devices were found, but none satisfies the renderer's requirements")]
    NoSuitableDevice,
}

/// Caller misuse of the recording or frame API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("command buffer is not recording")]
    CommandBufferNotRecording,
    #[error("command buffer is already recording")]
    CommandBufferAlreadyRecording,
    #[error("render pass already active (double begin)")]
    RenderPassAlreadyActive,
    #[error("no active render pass")]
    NoActiveRenderPass,
    #[error("render pass still active at end of recording")]
    RenderPassStillActive,
    #[error("draw issued outside a render pass")]
    DrawOutsideRenderPass,
    #[error("draw issued without a bound pipeline")]
    PipelineNotBound,
    #[error("dynamic state `{0}` not set before draw")]
    DynamicStateMissing(&'static str),
    #[error("frame already begun")]
    FrameAlreadyBegun,
    #[error("no frame in progress")]
    NoFrameInProgress,
    #[error("unknown {0} handle")]
    UnknownHandle(&'static str),
    #[error("{0} is out of range")]
    OutOfRange(&'static str),
}

impl RhiError {
    /// Backend object creation failed. Logged here so no path forgets to.
    pub fn creation(op: &'static str, reason: impl Display) -> Self {
        let reason = reason.to_string();
        error!("create {op} failed: {reason}");
        RhiError::ResourceCreation { op, reason }
    }

    pub fn surface(op: &'static str, reason: impl Display) -> Self {
        let reason = reason.to_string();
        error!("surface {op} failed: {reason}");
        RhiError::Surface { op, reason }
    }

    pub fn device(op: &'static str, reason: impl Display) -> Self {
        let reason = reason.to_string();
        error!("{op} failed: {reason}");
        RhiError::Device { op, reason }
    }

    pub fn usage(op: &'static str, err: UsageError) -> Self {
        error!("{op}: {err}");
        RhiError::InvalidState(err)
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, RhiError::SwapchainStale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_messages_tell_empty_from_unsuitable() {
        let none = RhiError::from(DeviceSelectionError::NoCompatibleDevice).to_string();
        let unsuitable = RhiError::from(DeviceSelectionError::NoSuitableDevice).to_string();
        assert_eq!(none, "no physical devices were enumerated");
        assert!(unsuitable.starts_with("physical devices were found"));
        assert_ne!(none, unsuitable);
    }
}
