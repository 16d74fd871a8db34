// SPDX-License-Identifier: CEPL-1.0
//! Frame-in-flight orchestration.
//!
//! Each of the N slots owns an image-available/render-finished semaphore
//! pair, an in-flight fence, and a command pool with one primary buffer. A
//! frame runs:
//!
//! 1. wait on the slot's fence (backpressure: at most N frames in flight)
//! 2. acquire the next image, signalling the slot's image-available semaphore
//! 3. reset the slot's pool and begin recording
//! 4. caller records passes
//! 5. end recording, reset the fence, submit
//! 6. present; recreate on a stale surface
//! 7. advance the slot modulo N
//!
//! A stale acquire recreates the swapchain and skips the frame; the caller
//! simply tries again next tick.

use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult, UsageError};
use crate::handle::*;
use crate::rhi::{Rhi, SubmitDesc};
use crate::types::PipelineStageFlags;

/// Slot index rotating modulo the frames-in-flight count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRing {
    index: usize,
    count: usize,
}

impl FrameRing {
    pub fn new(count: usize) -> Self {
        Self {
            index: 0,
            count: count.max(1),
        }
    }

    pub fn current(&self) -> usize {
        self.index
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn advance(&mut self) -> usize {
        self.index = (self.index + 1) % self.count;
        self.index
    }
}

#[derive(Clone, Copy, Debug)]
struct FrameSlot {
    image_available: SemaphoreHandle,
    render_finished: SemaphoreHandle,
    in_flight: FenceHandle,
    command_pool: CommandPoolHandle,
    command_buffer: CommandBufferHandle,
}

impl FrameSlot {
    fn create<R: Rhi + ?Sized>(rhi: &mut R) -> RhiResult<Self> {
        let image_available = rhi.create_semaphore()?;
        let render_finished = rhi.create_semaphore()?;
        // Signaled so the very first wait on this slot returns immediately.
        let in_flight = rhi.create_fence(true)?;
        let command_pool = rhi.create_command_pool()?;
        let command_buffer = rhi.allocate_command_buffer(command_pool)?;
        Ok(Self {
            image_available,
            render_finished,
            in_flight,
            command_pool,
            command_buffer,
        })
    }

    fn destroy<R: Rhi + ?Sized>(self, rhi: &mut R) {
        rhi.destroy_command_pool(self.command_pool);
        rhi.destroy_fence(self.in_flight);
        rhi.destroy_semaphore(self.render_finished);
        rhi.destroy_semaphore(self.image_available);
    }
}

/// What a pass needs to record into the current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameContext {
    pub slot: usize,
    pub image_index: u32,
    pub command_buffer: CommandBufferHandle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Ready(FrameContext),
    /// The swapchain was rebuilt; nothing was recorded. Retry next tick.
    NeedsRecreate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// Present found the surface stale and the swapchain was rebuilt.
    Recreated,
}

pub struct FrameOrchestrator {
    slots: Vec<FrameSlot>,
    ring: FrameRing,
    current: Option<FrameContext>,
    frames_submitted: u64,
}

impl FrameOrchestrator {
    pub fn new<R: Rhi + ?Sized>(rhi: &mut R, frames_in_flight: usize) -> RhiResult<Self> {
        if frames_in_flight < 2 {
            return Err(RhiError::usage(
                "FrameOrchestrator::new",
                UsageError::OutOfRange("frames_in_flight"),
            ));
        }

        let mut slots = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            match FrameSlot::create(rhi) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    for slot in slots {
                        slot.destroy(rhi);
                    }
                    return Err(e);
                }
            }
        }
        info!("frame orchestrator: {frames_in_flight} frames in flight");

        Ok(Self {
            slots,
            ring: FrameRing::new(frames_in_flight),
            current: None,
            frames_submitted: 0,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.ring.count()
    }

    pub fn current_slot(&self) -> usize {
        self.ring.current()
    }

    pub fn frame_in_progress(&self) -> Option<FrameContext> {
        self.current
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Steps 1-3. On a stale acquire, recreates the swapchain, runs
    /// `on_recreate` and reports [`FrameStatus::NeedsRecreate`].
    pub fn begin_frame<R, F>(&mut self, rhi: &mut R, on_recreate: F) -> RhiResult<FrameStatus>
    where
        R: Rhi + ?Sized,
        F: FnOnce(&mut R) -> RhiResult<()>,
    {
        if self.current.is_some() {
            return Err(RhiError::usage("begin_frame", UsageError::FrameAlreadyBegun));
        }
        let idx = self.ring.current();
        let slot = self.slots[idx];

        rhi.wait_for_fence(slot.in_flight)?;

        let image_index = match rhi.acquire_next_image(slot.image_available) {
            Ok(i) => i,
            Err(e) if e.is_stale() => {
                debug!("acquire stale on slot {idx}, recreating");
                rhi.recreate_swapchain()?;
                // A suboptimal acquire still signals the semaphore, which
                // nothing will wait on now. Swap in a fresh one.
                let fresh = rhi.create_semaphore()?;
                rhi.destroy_semaphore(slot.image_available);
                self.slots[idx].image_available = fresh;
                on_recreate(rhi)?;
                return Ok(FrameStatus::NeedsRecreate);
            }
            Err(e) => return Err(e),
        };

        rhi.reset_command_pool(slot.command_pool)?;
        rhi.begin_command_buffer(slot.command_buffer)?;

        let ctx = FrameContext {
            slot: idx,
            image_index,
            command_buffer: slot.command_buffer,
        };
        self.current = Some(ctx);
        Ok(FrameStatus::Ready(ctx))
    }

    /// Steps 5-7.
    pub fn end_frame<R, F>(&mut self, rhi: &mut R, on_recreate: F) -> RhiResult<PresentStatus>
    where
        R: Rhi + ?Sized,
        F: FnOnce(&mut R) -> RhiResult<()>,
    {
        let ctx = self
            .current
            .take()
            .ok_or_else(|| RhiError::usage("end_frame", UsageError::NoFrameInProgress))?;
        let slot = self.slots[ctx.slot];

        rhi.end_command_buffer(ctx.command_buffer)?;
        rhi.reset_fence(slot.in_flight)?;
        let submitted = rhi.queue_submit(&SubmitDesc {
            command_buffer: ctx.command_buffer,
            wait_semaphore: slot.image_available,
            wait_stage: PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            signal_semaphore: slot.render_finished,
            fence: slot.in_flight,
        });
        if let Err(e) = submitted {
            warn!("submit failed on slot {}, replacing its fence and semaphore", ctx.slot);
            if let Err(replace) = self.replace_sync(rhi, ctx.slot) {
                warn!("slot {} left unusable: {replace}", ctx.slot);
            }
            return Err(e);
        }
        self.frames_submitted += 1;

        let status = match rhi.queue_present(slot.render_finished, ctx.image_index) {
            Ok(()) => PresentStatus::Presented,
            Err(e) if e.is_stale() => {
                debug!("present stale on slot {}, recreating", ctx.slot);
                rhi.recreate_swapchain()?;
                on_recreate(rhi)?;
                PresentStatus::Recreated
            }
            Err(e) => return Err(e),
        };

        self.ring.advance();
        Ok(status)
    }

    /// A rejected submit leaves the slot's fence reset with nothing queued to
    /// signal it, and its image-available semaphore signaled with no waiter.
    /// Swap both for fresh objects so the next frame on the slot proceeds.
    fn replace_sync<R: Rhi + ?Sized>(&mut self, rhi: &mut R, idx: usize) -> RhiResult<()> {
        let fence = rhi.create_fence(true)?;
        let semaphore = match rhi.create_semaphore() {
            Ok(s) => s,
            Err(e) => {
                rhi.destroy_fence(fence);
                return Err(e);
            }
        };
        let slot = &mut self.slots[idx];
        rhi.destroy_fence(slot.in_flight);
        rhi.destroy_semaphore(slot.image_available);
        slot.in_flight = fence;
        slot.image_available = semaphore;
        Ok(())
    }

    /// Waits for the device, then releases every slot.
    pub fn destroy<R: Rhi + ?Sized>(self, rhi: &mut R) -> RhiResult<()> {
        rhi.wait_idle()?;
        for slot in self.slots {
            slot.destroy(rhi);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_returns_to_start_after_n() {
        for n in 2..6 {
            let mut ring = FrameRing::new(n);
            let start = ring.current();
            let visited: Vec<usize> = (0..n).map(|_| ring.advance()).collect();
            assert_eq!(ring.current(), start);
            assert_eq!(visited.last(), Some(&start));
            let mut sorted = visited.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..n).collect::<Vec<_>>());
        }
    }

    #[test]
    fn ring_is_pure_function_of_calls() {
        let mut ring = FrameRing::new(3);
        for calls in 1..=10 {
            ring.advance();
            assert_eq!(ring.current(), calls % 3);
        }
    }
}
