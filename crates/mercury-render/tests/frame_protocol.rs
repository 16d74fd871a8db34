// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use mercury_render::{FrameOutcome, RenderSystem, RenderSystemDesc, ShaderBinaries};
use mercury_rhi::headless::{HeadlessConfig, HeadlessEvent, HeadlessRhi, HeadlessSurface};
use mercury_rhi::{Extent2D, FenceHandle, Rhi, RhiError, RhiInitInfo};

fn spirv() -> Vec<u8> {
    let mut words = 0x0723_0203u32.to_le_bytes().to_vec();
    words.extend_from_slice(&[0; 16]);
    words
}

fn system_with(frames_in_flight: usize) -> (Arc<HeadlessSurface>, RenderSystem<HeadlessRhi>) {
    let surface = HeadlessSurface::new(1280, 720);
    let info = RhiInitInfo::new(surface.clone());
    let rhi = HeadlessRhi::new(&info, HeadlessConfig::default()).unwrap();
    let system = RenderSystem::new(
        rhi,
        RenderSystemDesc {
            frames_in_flight,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shaders: ShaderBinaries::new(spirv(), spirv()),
        },
    )
    .unwrap();
    (surface, system)
}

fn submitted_fences(events: &[HeadlessEvent]) -> Vec<FenceHandle> {
    events
        .iter()
        .filter_map(|e| match e {
            HeadlessEvent::Submit { fence, .. } => Some(*fence),
            _ => None,
        })
        .collect()
}

fn blocked_waits(events: &[HeadlessEvent]) -> Vec<FenceHandle> {
    events
        .iter()
        .filter_map(|e| match e {
            HeadlessEvent::FenceWait { fence, blocked: true } => Some(*fence),
            _ => None,
        })
        .collect()
}

#[test]
fn first_n_frames_never_block() {
    let (_surface, mut system) = system_with(3);
    system.rhi_mut().take_events();
    for _ in 0..3 {
        assert_eq!(system.tick().unwrap(), FrameOutcome::Presented);
    }
    let events = system.rhi_mut().take_events();
    assert!(blocked_waits(&events).is_empty());
    assert_eq!(submitted_fences(&events).len(), 3);
    assert_eq!(system.rhi().in_flight(), 3);
}

#[test]
fn frame_after_n_waits_on_slot_zero_fence() {
    let (_surface, mut system) = system_with(3);
    system.rhi_mut().take_events();
    for _ in 0..3 {
        system.tick().unwrap();
    }
    let first_three = system.rhi_mut().take_events();
    let slot0_fence = submitted_fences(&first_three)[0];

    system.tick().unwrap();
    let fourth = system.rhi_mut().take_events();
    assert_eq!(blocked_waits(&fourth), vec![slot0_fence]);
    // The blocking wait comes before anything else in the frame.
    assert!(matches!(fourth[0], HeadlessEvent::FenceWait { blocked: true, .. }));
}

#[test]
fn in_flight_never_exceeds_slot_count() {
    for n in [2usize, 3, 4] {
        let (_surface, mut system) = system_with(n);
        for _ in 0..(n * 5) {
            system.tick().unwrap();
        }
        assert_eq!(system.rhi().max_in_flight(), n);
    }
}

#[test]
fn slot_returns_to_start_after_n_presents() {
    let (_surface, mut system) = system_with(3);
    let start = system.pipeline().frames().current_slot();
    for i in 1..=3 {
        system.tick().unwrap();
        let slot = system.pipeline().frames().current_slot();
        if i < 3 {
            assert_ne!(slot, start);
        } else {
            assert_eq!(slot, start);
        }
    }
    assert_eq!(system.pipeline().frames().frames_submitted(), 3);
}

#[test]
fn resize_rebuilds_swapchain_without_pipeline_rebuild() {
    let (surface, mut system) = system_with(3);
    for _ in 0..4 {
        system.tick().unwrap();
    }
    let pipelines_before = system.rhi().pipelines_created();
    assert_eq!(pipelines_before, 6);

    surface.resize(640, 480);
    assert_eq!(system.tick().unwrap(), FrameOutcome::Skipped);
    assert_eq!(system.rhi().swapchain().extent, Extent2D::new(640, 480));
    assert!(system
        .rhi()
        .events()
        .contains(&HeadlessEvent::RecreateSwapchain {
            extent: Extent2D::new(640, 480)
        }));

    for _ in 0..3 {
        assert_eq!(system.tick().unwrap(), FrameOutcome::Presented);
    }
    let sc = system.rhi().swapchain();
    assert_eq!(sc.viewport().width, 640.0);
    assert_eq!(sc.viewport().height, 480.0);
    assert_eq!(sc.scissor().extent, Extent2D::new(640, 480));
    assert_eq!(system.rhi().pipelines_created(), pipelines_before);
    assert_eq!(
        system.rhi().resource_stats().framebuffers,
        system.rhi().swapchain().image_count as usize
    );
}

#[test]
fn resize_beyond_capabilities_is_clamped() {
    let surface = HeadlessSurface::new(800, 600);
    let info = RhiInitInfo::new(surface.clone());
    let mut cfg = HeadlessConfig::default();
    cfg.capabilities.max_image_extent = Extent2D::new(1024, 1024);
    let rhi = HeadlessRhi::new(&info, cfg).unwrap();
    let mut system = RenderSystem::new(
        rhi,
        RenderSystemDesc {
            frames_in_flight: 2,
            clear_color: [0.0; 4],
            shaders: ShaderBinaries::new(spirv(), spirv()),
        },
    )
    .unwrap();

    surface.resize(3000, 700);
    assert_eq!(system.tick().unwrap(), FrameOutcome::Skipped);
    assert_eq!(system.rhi().swapchain().extent, Extent2D::new(1024, 700));
    assert_eq!(system.tick().unwrap(), FrameOutcome::Presented);
}

#[test]
fn repeated_recreation_does_not_leak_views() {
    let (_surface, mut system) = system_with(3);
    let image_count = system.rhi().swapchain().image_count as usize;
    for _ in 0..5 {
        system.notify_resized();
        system.tick().unwrap();
        let stats = system.rhi().resource_stats();
        // color views plus the depth view
        assert_eq!(stats.image_views, image_count + 1);
        assert_eq!(stats.framebuffers, image_count);
    }
    for _ in 0..3 {
        system.rhi_mut().recreate_swapchain().unwrap();
    }
    assert_eq!(system.rhi().resource_stats().image_views, image_count + 1);
}

#[test]
fn suboptimal_acquire_skips_frame_and_recovers() {
    let (_surface, mut system) = system_with(3);
    system.tick().unwrap();
    system.rhi_mut().inject_suboptimal();
    assert_eq!(system.tick().unwrap(), FrameOutcome::Skipped);
    // The slot's image-available semaphore was replaced; acquiring on it
    // again must not trip over the stale signal.
    for _ in 0..4 {
        assert_eq!(system.tick().unwrap(), FrameOutcome::Presented);
    }
}

#[test]
fn out_of_date_acquire_skips_without_advancing() {
    let (_surface, mut system) = system_with(3);
    system.tick().unwrap();
    let slot = system.pipeline().frames().current_slot();
    let submitted = system.pipeline().frames().frames_submitted();

    system.rhi_mut().inject_out_of_date();
    assert_eq!(system.tick().unwrap(), FrameOutcome::Skipped);
    assert_eq!(system.pipeline().frames().current_slot(), slot);
    assert_eq!(system.pipeline().frames().frames_submitted(), submitted);
    assert_eq!(system.tick().unwrap(), FrameOutcome::Presented);
}

#[test]
fn stale_present_recreates_after_submission() {
    let (_surface, mut system) = system_with(2);
    system.rhi_mut().inject_stale_present();
    assert_eq!(system.tick().unwrap(), FrameOutcome::PresentedAndRecreated);
    assert_eq!(system.pipeline().frames().frames_submitted(), 1);
    assert_eq!(system.tick().unwrap(), FrameOutcome::Presented);
}

#[test]
fn failed_submit_does_not_wedge_the_slot() {
    let (_surface, mut system) = system_with(2);
    system.tick().unwrap();
    let slot = system.pipeline().frames().current_slot();
    let before = system.rhi().resource_stats();

    system.rhi_mut().inject_submit_failure();
    assert!(matches!(
        system.tick(),
        Err(RhiError::Device { op: "queue_submit", .. })
    ));
    assert_eq!(system.pipeline().frames().current_slot(), slot);
    assert!(system.pipeline().frames().frame_in_progress().is_none());

    // The retry lands on the same slot; its fence must not be left waiting
    // on a submission that never happened.
    system.rhi_mut().take_events();
    assert_eq!(system.tick().unwrap(), FrameOutcome::Presented);
    let events = system.rhi_mut().take_events();
    assert!(blocked_waits(&events).is_empty());
    for _ in 0..4 {
        assert_eq!(system.tick().unwrap(), FrameOutcome::Presented);
    }

    let after = system.rhi().resource_stats();
    assert_eq!(after.fences, before.fences);
    assert_eq!(after.semaphores, before.semaphores);
}

#[test]
fn each_frame_draws_once() {
    let (_surface, mut system) = system_with(3);
    assert_eq!(system.pipeline().pass_names(), vec!["DebugDrawManager"]);
    for _ in 0..7 {
        system.tick().unwrap();
    }
    assert_eq!(system.rhi().draws_recorded(), 7);
}

#[test]
fn shutdown_releases_everything_but_the_swapchain() {
    let (_surface, mut system) = system_with(3);
    for _ in 0..5 {
        system.tick().unwrap();
    }
    let rhi = system.shutdown().unwrap();
    let stats = rhi.resource_stats();
    assert_eq!(stats.pipelines, 0);
    assert_eq!(stats.pipeline_layouts, 0);
    assert_eq!(stats.render_passes, 0);
    assert_eq!(stats.framebuffers, 0);
    assert_eq!(stats.shader_modules, 0);
    assert_eq!(stats.fences, 0);
    assert_eq!(stats.semaphores, 0);
    assert_eq!(stats.command_pools, 0);
    assert_eq!(stats.command_buffers, 0);
    assert_eq!(stats.image_views, rhi.swapchain().image_count as usize + 1);
    assert_eq!(rhi.in_flight(), 0);
}
