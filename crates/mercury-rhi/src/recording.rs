// SPDX-License-Identifier: CEPL-1.0
//! Command-buffer and render-pass scope state machine.
//!
//! Every backend keeps one [`CommandRecorder`] per command buffer and checks
//! each recording call against it before touching the native API, so misuse
//! surfaces as [`UsageError`] instead of undefined driver behavior.
//!
//! ```text
//! buffer: Initial --begin--> Recording --end--> Executable --reset--> Initial
//! pass:   Inactive --begin_render_pass--> Recording --end_render_pass--> Inactive
//! ```

use crate::error::UsageError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BufferState {
    #[default]
    Initial,
    Recording,
    Executable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PassScope {
    #[default]
    Inactive,
    Recording,
}

#[derive(Clone, Copy, Debug, Default)]
struct BoundPipeline {
    needs_viewport: bool,
    needs_scissor: bool,
}

#[derive(Clone, Debug, Default)]
pub struct CommandRecorder {
    buffer: BufferState,
    pass: PassScope,
    pipeline: Option<BoundPipeline>,
    viewport_set: bool,
    scissor_set: bool,
    label_depth: u32,
    draws: u32,
}

impl CommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_state(&self) -> BufferState {
        self.buffer
    }

    pub fn pass_scope(&self) -> PassScope {
        self.pass
    }

    /// Draws recorded since the last `begin`.
    pub fn draw_count(&self) -> u32 {
        self.draws
    }

    pub fn is_recording(&self) -> bool {
        self.buffer == BufferState::Recording
    }

    fn recording(&self) -> Result<(), UsageError> {
        if self.is_recording() {
            Ok(())
        } else {
            Err(UsageError::CommandBufferNotRecording)
        }
    }

    /// Begin implies a reset of all bound state.
    pub fn begin(&mut self) -> Result<(), UsageError> {
        if self.is_recording() {
            return Err(UsageError::CommandBufferAlreadyRecording);
        }
        *self = Self {
            buffer: BufferState::Recording,
            ..Self::default()
        };
        Ok(())
    }

    pub fn end(&mut self) -> Result<(), UsageError> {
        self.recording()?;
        if self.pass == PassScope::Recording {
            return Err(UsageError::RenderPassStillActive);
        }
        self.buffer = BufferState::Executable;
        Ok(())
    }

    /// Pool reset returns the buffer to `Initial` from any state, including
    /// an abandoned recording.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn begin_render_pass(&mut self) -> Result<(), UsageError> {
        self.recording()?;
        if self.pass == PassScope::Recording {
            return Err(UsageError::RenderPassAlreadyActive);
        }
        self.pass = PassScope::Recording;
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<(), UsageError> {
        self.recording()?;
        if self.pass != PassScope::Recording {
            return Err(UsageError::NoActiveRenderPass);
        }
        self.pass = PassScope::Inactive;
        Ok(())
    }

    /// `needs_*` mirror the pipeline's dynamic states.
    pub fn bind_pipeline(&mut self, needs_viewport: bool, needs_scissor: bool) -> Result<(), UsageError> {
        self.recording()?;
        self.pipeline = Some(BoundPipeline {
            needs_viewport,
            needs_scissor,
        });
        Ok(())
    }

    pub fn set_viewport(&mut self) -> Result<(), UsageError> {
        self.recording()?;
        self.viewport_set = true;
        Ok(())
    }

    pub fn set_scissor(&mut self) -> Result<(), UsageError> {
        self.recording()?;
        self.scissor_set = true;
        Ok(())
    }

    pub fn push_constants(&mut self) -> Result<(), UsageError> {
        self.recording()?;
        if self.pipeline.is_none() {
            return Err(UsageError::PipelineNotBound);
        }
        Ok(())
    }

    pub fn draw(&mut self) -> Result<(), UsageError> {
        self.recording()?;
        if self.pass != PassScope::Recording {
            return Err(UsageError::DrawOutsideRenderPass);
        }
        let pipeline = self.pipeline.ok_or(UsageError::PipelineNotBound)?;
        if pipeline.needs_viewport && !self.viewport_set {
            return Err(UsageError::DynamicStateMissing("viewport"));
        }
        if pipeline.needs_scissor && !self.scissor_set {
            return Err(UsageError::DynamicStateMissing("scissor"));
        }
        self.draws += 1;
        Ok(())
    }

    pub fn push_label(&mut self) -> Result<(), UsageError> {
        self.recording()?;
        self.label_depth += 1;
        Ok(())
    }

    /// Returns false when there was no open label to close.
    pub fn pop_label(&mut self) -> Result<bool, UsageError> {
        self.recording()?;
        if self.label_depth == 0 {
            return Ok(false);
        }
        self.label_depth -= 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> CommandRecorder {
        let mut r = CommandRecorder::new();
        r.begin().unwrap();
        r
    }

    #[test]
    fn happy_path() {
        let mut r = ready();
        assert_eq!(r.pass_scope(), PassScope::Inactive);
        r.begin_render_pass().unwrap();
        assert_eq!(r.pass_scope(), PassScope::Recording);
        r.bind_pipeline(true, true).unwrap();
        r.set_viewport().unwrap();
        r.set_scissor().unwrap();
        r.draw().unwrap();
        r.draw().unwrap();
        r.end_render_pass().unwrap();
        assert_eq!(r.pass_scope(), PassScope::Inactive);
        r.end().unwrap();
        assert_eq!(r.buffer_state(), BufferState::Executable);
        assert_eq!(r.draw_count(), 2);
    }

    #[test]
    fn double_begin_render_pass() {
        let mut r = ready();
        r.begin_render_pass().unwrap();
        assert_eq!(r.begin_render_pass(), Err(UsageError::RenderPassAlreadyActive));
    }

    #[test]
    fn draw_outside_pass() {
        let mut r = ready();
        r.bind_pipeline(false, false).unwrap();
        assert_eq!(r.draw(), Err(UsageError::DrawOutsideRenderPass));
        r.begin_render_pass().unwrap();
        r.end_render_pass().unwrap();
        assert_eq!(r.draw(), Err(UsageError::DrawOutsideRenderPass));
    }

    #[test]
    fn draw_needs_pipeline_and_dynamic_state() {
        let mut r = ready();
        r.begin_render_pass().unwrap();
        assert_eq!(r.draw(), Err(UsageError::PipelineNotBound));
        r.bind_pipeline(true, true).unwrap();
        assert_eq!(r.draw(), Err(UsageError::DynamicStateMissing("viewport")));
        r.set_viewport().unwrap();
        assert_eq!(r.draw(), Err(UsageError::DynamicStateMissing("scissor")));
        r.set_scissor().unwrap();
        assert!(r.draw().is_ok());
    }

    #[test]
    fn static_state_pipeline_draws_without_dynamic_calls() {
        let mut r = ready();
        r.begin_render_pass().unwrap();
        r.bind_pipeline(false, false).unwrap();
        assert!(r.draw().is_ok());
    }

    #[test]
    fn end_with_open_pass() {
        let mut r = ready();
        r.begin_render_pass().unwrap();
        assert_eq!(r.end(), Err(UsageError::RenderPassStillActive));
        assert!(r.is_recording());
    }

    #[test]
    fn commands_rejected_when_not_recording() {
        let mut r = CommandRecorder::new();
        assert_eq!(r.begin_render_pass(), Err(UsageError::CommandBufferNotRecording));
        assert_eq!(r.end_render_pass(), Err(UsageError::CommandBufferNotRecording));
        assert_eq!(r.set_viewport(), Err(UsageError::CommandBufferNotRecording));
        assert_eq!(r.end(), Err(UsageError::CommandBufferNotRecording));
        assert_eq!(r.end_render_pass(), Err(UsageError::CommandBufferNotRecording));
    }

    #[test]
    fn begin_clears_bound_state() {
        let mut r = ready();
        r.begin_render_pass().unwrap();
        r.bind_pipeline(true, true).unwrap();
        r.set_viewport().unwrap();
        r.set_scissor().unwrap();
        r.draw().unwrap();
        r.end_render_pass().unwrap();
        r.end().unwrap();

        assert_eq!(ready().begin(), Err(UsageError::CommandBufferAlreadyRecording));
        r.reset();
        assert_eq!(r.buffer_state(), BufferState::Initial);
        r.begin().unwrap();
        r.begin_render_pass().unwrap();
        assert_eq!(r.draw(), Err(UsageError::PipelineNotBound));
        assert_eq!(r.draw_count(), 0);
    }

    #[test]
    fn label_balance() {
        let mut r = ready();
        assert_eq!(r.pop_label(), Ok(false));
        r.push_label().unwrap();
        assert_eq!(r.pop_label(), Ok(true));
    }
}
