// SPDX-License-Identifier: CEPL-1.0
use mercury_rhi::headless::{HeadlessConfig, HeadlessRhi, HeadlessSurface};
use mercury_rhi::{
    DeviceSelectionError, FrameOrchestrator, FrameStatus, Rhi, RhiError, RhiInitInfo, UsageError,
};

fn rhi() -> HeadlessRhi {
    let surface = HeadlessSurface::new(1280, 720);
    HeadlessRhi::new(&RhiInitInfo::new(surface), HeadlessConfig::default()).unwrap()
}

#[test]
fn zero_devices_fails_before_swapchain_work() {
    let info = RhiInitInfo::new(HeadlessSurface::new(1280, 720));
    let cfg = HeadlessConfig {
        adapters: Vec::new(),
        ..HeadlessConfig::default()
    };
    let err = HeadlessRhi::new(&info, cfg).err().unwrap();
    assert!(matches!(
        err,
        RhiError::DeviceSelection(DeviceSelectionError::NoCompatibleDevice)
    ));
}

#[test]
fn adapter_without_anisotropy_is_unsuitable() {
    let info = RhiInitInfo::new(HeadlessSurface::new(1280, 720));
    let mut adapter = HeadlessConfig::default_adapter();
    adapter.sampler_anisotropy = false;
    let cfg = HeadlessConfig {
        adapters: vec![adapter],
        ..HeadlessConfig::default()
    };
    assert!(matches!(
        HeadlessRhi::new(&info, cfg),
        Err(RhiError::DeviceSelection(DeviceSelectionError::NoSuitableDevice))
    ));
}

#[test]
fn draw_outside_render_pass_is_invalid_state() {
    let mut rhi = rhi();
    let pool = rhi.create_command_pool().unwrap();
    let cb = rhi.allocate_command_buffer(pool).unwrap();
    rhi.begin_command_buffer(cb).unwrap();
    assert!(matches!(
        rhi.cmd_draw(cb, 3, 1, 0, 0),
        Err(RhiError::InvalidState(UsageError::DrawOutsideRenderPass))
    ));
}

#[test]
fn recording_into_unbegun_buffer_is_invalid_state() {
    let mut rhi = rhi();
    let pool = rhi.create_command_pool().unwrap();
    let cb = rhi.allocate_command_buffer(pool).unwrap();
    assert!(matches!(
        rhi.cmd_end_render_pass(cb),
        Err(RhiError::InvalidState(UsageError::CommandBufferNotRecording))
    ));
    assert!(matches!(
        rhi.end_command_buffer(cb),
        Err(RhiError::InvalidState(UsageError::CommandBufferNotRecording))
    ));
}

#[test]
fn double_begin_frame_is_rejected() {
    let mut rhi = rhi();
    let mut frames = FrameOrchestrator::new(&mut rhi, 2).unwrap();
    let first = frames.begin_frame(&mut rhi, |_| Ok(())).unwrap();
    assert!(matches!(first, FrameStatus::Ready(_)));
    assert!(matches!(
        frames.begin_frame(&mut rhi, |_| Ok(())),
        Err(RhiError::InvalidState(UsageError::FrameAlreadyBegun))
    ));
    frames.end_frame(&mut rhi, |_| Ok(())).unwrap();
    frames.destroy(&mut rhi).unwrap();
}

#[test]
fn end_without_begin_is_rejected() {
    let mut rhi = rhi();
    let mut frames = FrameOrchestrator::new(&mut rhi, 3).unwrap();
    assert!(matches!(
        frames.end_frame(&mut rhi, |_| Ok(())),
        Err(RhiError::InvalidState(UsageError::NoFrameInProgress))
    ));
    frames.destroy(&mut rhi).unwrap();
}

#[test]
fn single_buffering_is_rejected() {
    let mut rhi = rhi();
    assert!(matches!(
        FrameOrchestrator::new(&mut rhi, 1),
        Err(RhiError::InvalidState(UsageError::OutOfRange("frames_in_flight")))
    ));
    assert_eq!(rhi.resource_stats().fences, 0);
}

#[test]
fn destroying_unknown_handles_is_a_no_op() {
    let mut rhi = rhi();
    let pool = rhi.create_command_pool().unwrap();
    rhi.destroy_command_pool(pool);
    rhi.destroy_command_pool(pool);
    assert_eq!(rhi.resource_stats().command_pools, 0);
}
