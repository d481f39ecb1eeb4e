//! Integration tests for dpu_pipeline
//!
//! Tests the commit protocol end to end against the simulated hardware:
//! scaling scenarios, capture backpressure, repeater buffers, partial
//! updates and diagnostics

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use dpu_hw::{
    DestinationMode, DeviceClass, ErrorKind, FrameUpdate, HardwareConfig, HwFactory, LayerDescriptor,
    PixelFormat, Rect, SimEvent, SimHw, RATIO_UNITY,
};
use dpu_pipeline::*;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn registry(hw: &SimHw) -> DeviceRegistry {
    DeviceRegistry::from_config(&DpuConfig::default(), hw).unwrap()
}

fn last_frame(hw: &SimHw) -> Option<FrameUpdate> {
    hw.events().into_iter().rev().find_map(|event| match event {
        SimEvent::DeconUpdate { frame, .. } => Some(*frame),
        _ => None,
    })
}

fn last_dpp_config(hw: &SimHw, dpp: u32) -> Option<HardwareConfig> {
    hw.events().into_iter().rev().find_map(|event| match event {
        SimEvent::DppProgram { id, config } if id == dpp => Some(*config),
        _ => None,
    })
}

/// Commit and let the simulated panel latch the frame
fn present(registry: &DeviceRegistry, request: CommitRequest) -> Completion {
    let done = registry.commit(0, request).unwrap();
    let irq = registry.output_irq(0).unwrap();
    irq.on_frame_done();
    irq.on_frame_sync(irq.now_ns());
    done
}

#[test]
fn scenario_valid_scaled_layer() {
    let hw = SimHw::new();
    let mode = DestinationMode::new(3840, 2160);
    let desc = LayerDescriptor::new(PixelFormat::Argb8888, 1920, 1080, 0x1000_0000)
        .with_dst(Rect::from_size(3840, 2160));

    let vgs = LayerProcessor::new(0, DeviceClass::Vgs, hw.dpp(0, DeviceClass::Vgs), DeferredHandle::inline());
    let config = vgs.validate(&desc, &mode).unwrap();
    assert_eq!(config.h_ratio, 1 << 19);
    assert_eq!(config.v_ratio, 1 << 19);
    assert!(config.is_scaled);

    let gf = LayerProcessor::new(1, DeviceClass::Gf, hw.dpp(1, DeviceClass::Gf), DeferredHandle::inline());
    let err = gf.validate(&desc, &mode).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert_eq!(err.field(), Some("scale"));
}

#[test]
fn scenario_unsupported_downscale() {
    let hw = SimHw::new();
    let vgrfs = LayerProcessor::new(0, DeviceClass::Vgrfs, hw.dpp(0, DeviceClass::Vgrfs), DeferredHandle::inline());
    assert_eq!(vgrfs.restriction().scale_down, 4);

    let desc = LayerDescriptor::new(PixelFormat::Argb8888, 4096, 4096, 0).with_dst(Rect::from_size(64, 64));
    let err = vgrfs.validate(&desc, &DestinationMode::new(1920, 1080)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRange);
    assert!(hw.events().is_empty());
}

#[test]
fn scenario_capture_busy() {
    init_logging();
    let hw = SimHw::new();
    let registry = registry(&hw);
    let buffer = CaptureBuffer::new(PixelFormat::Argb8888, 1080, 2400, 0x6000_0000);

    let request_a = CommitRequest::new().with_capture(CaptureRequest::standalone(buffer));
    registry.commit(0, request_a).unwrap();
    let capture_a = registry.output(0).unwrap().lock().capture_completion().unwrap();
    assert!(!capture_a.is_complete());

    let request_b = CommitRequest::new().with_capture(CaptureRequest::standalone(buffer));
    let err = registry.commit(0, request_b.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Busy);

    registry.capture(0).unwrap().on_complete(CompletionStatus::Done);
    assert_eq!(capture_a.status(), Some(CompletionStatus::Done));

    registry.commit(0, request_b).unwrap();
    assert!(registry.capture(0).unwrap().is_busy());
}

#[test]
fn scenario_diagnostic_overflow() {
    let hw = SimHw::new();
    let config = DpuConfig {
        diag_ring_capacity: 4,
        ..DpuConfig::default()
    };
    let registry = DeviceRegistry::from_config(&config, &hw).unwrap();
    let output = registry.output(0).unwrap();
    output.lock().checksum().start(CHECKSUM_SOURCE).unwrap();

    present(&registry, CommitRequest::new().with_active(true));
    for _ in 0..6 {
        present(&registry, CommitRequest::new());
    }

    let output = output.lock();
    let ring = output.checksum().ring();
    assert_eq!(ring.len(), 4);
    assert!(ring.overflowed());
    let frames: Vec<Option<u64>> = ring.snapshot().iter().map(|e| e.frame_number).collect();
    assert_eq!(frames, vec![Some(4), Some(5), Some(6), Some(7)]);

    let first = output.checksum().read();
    assert_eq!(first.frame_number, Some(4));
    assert_eq!(output.checksum().values_per_entry(), 3);
}

#[test]
fn test_checksum_feed_sources() {
    let feed = ChecksumFeed::new(8);
    let err = feed.start("crc32").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(!feed.is_running());

    feed.record(Some(1), [1, 2, 3]);
    assert!(feed.ring().is_empty());

    feed.start("auto").unwrap();
    feed.record(Some(2), [4, 5, 6]);
    assert_eq!(feed.read_timeout(Duration::from_millis(10)).unwrap().values, [4, 5, 6]);
    feed.stop();
}

#[test]
fn test_repeater_buffers_reach_consumer() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    let capture = registry.capture(0).unwrap();
    capture
        .set_property("use_shared_buffer", &PropertyValue::Bool(true))
        .unwrap();
    let consumer = capture.pool().subscribe();

    let buffer = CaptureBuffer::new(PixelFormat::Argb8888, 1080, 2400, 0x6000_0000);
    registry
        .commit(0, CommitRequest::new().with_capture(CaptureRequest::standalone(buffer)))
        .unwrap();
    let programmed = capture.last_config().unwrap();
    assert_eq!(programmed.planes[0], 0xa000_0000);
    assert_eq!(capture.pool().in_use(), 1);

    capture.on_complete(CompletionStatus::Done);
    let frame = consumer.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(frame.buffer.addr, 0xa000_0000);
    assert_eq!(capture.pool().in_use(), 1);

    capture.pool().release(frame.index);
    assert_eq!(capture.pool().in_use(), 0);
}

#[test]
fn test_failed_capture_recycles_repeater_buffer() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    let capture = registry.capture(0).unwrap();
    capture
        .set_property("use_shared_buffer", &PropertyValue::Bool(true))
        .unwrap();

    let buffer = CaptureBuffer::new(PixelFormat::Argb8888, 1080, 2400, 0x6000_0000);
    registry
        .commit(0, CommitRequest::new().with_capture(CaptureRequest::standalone(buffer)))
        .unwrap();
    capture.on_error();
    registry.deferred().flush();

    assert_eq!(capture.pool().in_use(), 0);
    assert!(capture.pool().subscribe().try_recv().is_err());
}

#[test]
fn test_concurrent_capture_reads_back() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    present(&registry, CommitRequest::new().with_active(true));

    let buffer = CaptureBuffer::new(PixelFormat::Argb8888, 1080, 2400, 0x6000_0000);
    registry
        .commit(0, CommitRequest::new().with_capture(CaptureRequest::concurrent(buffer)))
        .unwrap();
    assert!(last_frame(&hw).unwrap().readback);
    assert_eq!(hw.count(|e| matches!(e, SimEvent::DeconReadback { enabled: true, .. })), 1);

    registry.capture(0).unwrap().on_complete(CompletionStatus::Done);
    assert_eq!(hw.count(|e| matches!(e, SimEvent::DeconReadback { enabled: false, .. })), 1);
    let output = registry.output(0).unwrap();
    assert!(!output.lock().readback().is_enabled());
}

#[test]
fn test_concurrent_capture_needs_display_sized_buffer() {
    let hw = SimHw::new();
    let registry = registry(&hw);

    let small = CaptureBuffer::new(PixelFormat::Argb8888, 720, 1600, 0);
    let err = registry
        .commit(0, CommitRequest::new().with_capture(CaptureRequest::concurrent(small)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    present(&registry, CommitRequest::new().with_active(true));
    let err = registry
        .commit(0, CommitRequest::new().with_capture(CaptureRequest::concurrent(small)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRange);
}

#[test]
fn test_mode_change_only_capture() {
    let hw = SimHw::new();
    let registry = registry(&hw);

    let request = CommitRequest::new().with_capture(CaptureRequest::mode_change(CaptureType::Standalone));
    let err = registry.commit(0, request.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    present(&registry, CommitRequest::new().with_active(true));
    registry.commit(0, request).unwrap();
    let capture_done = registry.output(0).unwrap().lock().capture_completion().unwrap();
    assert_eq!(capture_done.status(), Some(CompletionStatus::Done));
    assert_eq!(hw.count(|e| matches!(e, SimEvent::WbProgram { .. })), 0);
}

#[test]
fn test_partial_update_programs_redraw_rect() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    let desc = LayerDescriptor::new(PixelFormat::Argb8888, 1080, 2400, 0x1000_0000);
    present(&registry, CommitRequest::new().with_active(true).with_layer(0, desc.clone()));

    let first = region_from_corners(0, 0, 100, 100).unwrap();
    present(
        &registry,
        CommitRequest::new()
            .with_layer(0, desc.clone())
            .with_property("partial_region", PropertyValue::Region(Some(first))),
    );
    assert_eq!(last_frame(&hw).unwrap().partial, None);

    let second = region_from_corners(201, 201, 250, 250).unwrap();
    present(
        &registry,
        CommitRequest::new()
            .with_layer(0, desc.clone())
            .with_property("partial_region", PropertyValue::Region(Some(second))),
    );
    assert_eq!(last_frame(&hw).unwrap().partial, Some(Rect::new(0, 0, 252, 252)));

    let output = registry.output(0).unwrap();
    assert_eq!(
        output.lock().property("partial_region").unwrap(),
        PropertyValue::Region(Some(second))
    );

    present(
        &registry,
        CommitRequest::new()
            .with_layer(0, desc)
            .with_property("partial_region", PropertyValue::Region(None)),
    );
    assert_eq!(last_frame(&hw).unwrap().partial, None);
}

#[test]
fn test_program_failure_is_reported_and_recovered() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    let desc = LayerDescriptor::new(PixelFormat::Argb8888, 1080, 2400, 0);

    hw.fail_next_decon_update(0);
    let err = registry
        .commit(0, CommitRequest::new().with_active(true).with_layer(0, desc.clone()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProgramFailed);
    {
        let output = registry.output(0).unwrap();
        let output = output.lock();
        assert!(!output.is_enabled());
        assert_eq!(
            output.last_frame_status(),
            Some(CompletionStatus::Failed(ErrorKind::ProgramFailed))
        );
    }

    let done = present(&registry, CommitRequest::new().with_active(true).with_layer(0, desc));
    assert_eq!(done.status(), Some(CompletionStatus::Done));
}

#[test]
fn test_layers_switch_with_participation() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    let full = LayerDescriptor::new(PixelFormat::Argb8888, 1080, 2400, 0x1000_0000);
    let video = LayerDescriptor::new(PixelFormat::Nv12, 1920, 1080, 0x2000_0000)
        .with_dst(Rect::new(0, 0, 1080, 608))
        .with_zpos(1);

    present(
        &registry,
        CommitRequest::new()
            .with_active(true)
            .with_layer(0, full.clone())
            .with_layer(3, video),
    );
    assert!(registry.layer(3).unwrap().lock().is_on());
    let config = last_dpp_config(&hw, 3).unwrap();
    assert!(config.is_scaled);
    assert_eq!(last_frame(&hw).unwrap().layers, vec![0, 3]);

    present(&registry, CommitRequest::new().with_layer(0, full));
    assert!(!registry.layer(3).unwrap().lock().is_on());
    assert!(registry.layer(0).unwrap().lock().is_on());
    assert_eq!(last_frame(&hw).unwrap().layers, vec![0]);
}

#[test]
fn test_layer_not_attached_is_not_found() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    let desc = LayerDescriptor::new(PixelFormat::Argb8888, 64, 64, 0);
    let err = registry
        .commit(0, CommitRequest::new().with_layer(7, desc))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn test_protected_layer_path() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    let desc = LayerDescriptor::new(PixelFormat::Argb8888, 1080, 2400, 0).with_protected(true);

    present(&registry, CommitRequest::new().with_active(true).with_layer(1, desc));
    assert!(registry.layer(1).unwrap().lock().is_protected());
    assert_eq!(
        hw.count(|e| matches!(e, SimEvent::DppProtection { id: 1, enabled: true })),
        1
    );

    registry.output(0).unwrap().lock().disable().unwrap();
    assert!(!registry.layer(1).unwrap().lock().is_protected());
    assert_eq!(
        hw.count(|e| matches!(e, SimEvent::DppProtection { id: 1, enabled: false })),
        1
    );
}

#[test]
fn test_modeset_only_skips_layer_programming() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    present(&registry, CommitRequest::new().with_active(true));
    let programs = hw.count(|e| matches!(e, SimEvent::DppProgram { .. }));

    let desc = LayerDescriptor::new(PixelFormat::Argb8888, 1080, 2400, 0);
    let done = registry
        .commit(
            0,
            CommitRequest::new()
                .with_layer(0, desc)
                .with_property("modeset_only", PropertyValue::Bool(true)),
        )
        .unwrap();
    assert_eq!(done.status(), Some(CompletionStatus::Done));
    assert_eq!(hw.count(|e| matches!(e, SimEvent::DppProgram { .. })), programs);

    // One-shot: the next commit programs layers again
    let output = registry.output(0).unwrap();
    assert_eq!(output.lock().property("modeset_only").unwrap(), PropertyValue::Bool(true));
    drop(output);
    present(
        &registry,
        CommitRequest::new().with_layer(0, LayerDescriptor::new(PixelFormat::Argb8888, 1080, 2400, 0)),
    );
    assert_eq!(hw.count(|e| matches!(e, SimEvent::DppProgram { .. })), programs + 1);
}

#[test]
fn test_layer_error_interrupts() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    let irq = registry.layer_irq(2).unwrap();

    irq.handle_irq(DppIrq::FrameDone);
    irq.handle_irq(DppIrq::ReadError);
    irq.handle_irq(DppIrq::Deadlock);
    registry.deferred().flush();

    assert_eq!(irq.frames_done(), 1);
    assert_eq!(irq.errors(), 2);
    assert_eq!(irq.last_error(), Some(DppIrq::Deadlock));
}

#[test]
fn test_layer_deadlock_abandons_frame() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    present(&registry, CommitRequest::new().with_active(true));

    let desc = LayerDescriptor::new(PixelFormat::Argb8888, 1080, 2400, 0);
    let done = registry
        .commit(0, CommitRequest::new().with_layer(0, desc))
        .unwrap();
    registry.layer_irq(0).unwrap().handle_irq(DppIrq::Deadlock);
    registry.deferred().flush();

    assert_eq!(done.status(), Some(CompletionStatus::Failed(ErrorKind::Hardware)));
    assert!(registry.output(0).unwrap().lock().is_enabled());
}

#[test]
fn test_output_properties() {
    let hw = SimHw::new();
    let registry = registry(&hw);
    let output = registry.output(0).unwrap();

    assert_eq!(
        output.lock().property("operation_mode").unwrap(),
        PropertyValue::Int(OperationMode::Command.id())
    );
    assert_eq!(
        output.lock().property("color_pipeline_handle").unwrap(),
        PropertyValue::Int(-1)
    );
    drop(output);

    registry
        .commit(
            0,
            CommitRequest::new()
                .with_property("color_pipeline_handle", PropertyValue::Int(7))
                .with_property("render_intent", PropertyValue::Int(1)),
        )
        .unwrap();
    let output = registry.output(0).unwrap();
    let output = output.lock();
    assert_eq!(output.property("color_pipeline_handle").unwrap(), PropertyValue::Int(7));
    assert_eq!(output.property("render_intent").unwrap(), PropertyValue::Int(1));
    assert!(output.property("brightness").is_err());
}

#[test]
fn test_toml_topology_end_to_end() {
    let content = r#"
[runtime]
commit_queue_depth = 2
frame_done_timeout_ms = 50

[[layers]]
id = 0
class = "vgs"

[[outputs]]
id = 0
width = 3840
height = 2160
refresh_hz = 120
operation_mode = "video"
layers = [0]
"#;
    let config = DpuConfig::from_toml_str(content).unwrap();
    let hw = SimHw::new();
    let registry = DeviceRegistry::from_config(&config, &hw).unwrap();
    assert!(registry.capture_ids().next().is_none());

    let desc = LayerDescriptor::new(PixelFormat::Argb8888, 1920, 1080, 0).with_dst(Rect::from_size(3840, 2160));
    present(&registry, CommitRequest::new().with_active(true).with_layer(0, desc));

    let config = last_dpp_config(&hw, 0).unwrap();
    assert_eq!(config.h_ratio, RATIO_UNITY / 2);
    assert_eq!(config.v_ratio, RATIO_UNITY / 2);
}

#[test]
fn test_commit_worker_serializes_one_output() {
    let hw = SimHw::new();
    let mut output = OutputController::new(5, DestinationMode::new(640, 480), hw.decon(5), DeferredHandle::inline());
    let layer = LayerProcessor::new(0, DeviceClass::Gf, hw.dpp(0, DeviceClass::Gf), DeferredHandle::inline());
    output.attach_layer(Arc::new(Mutex::new(layer))).unwrap();

    let output = Arc::new(Mutex::new(output));
    let mut worker = CommitWorker::spawn(Arc::clone(&output), 8).unwrap();
    assert_eq!(worker.output(), 5);

    let receivers: Vec<_> = (0..4)
        .map(|_| {
            let desc = LayerDescriptor::new(PixelFormat::Argb8888, 640, 480, 0);
            worker.submit(CommitRequest::new().with_layer(0, desc)).unwrap()
        })
        .collect();
    for receiver in receivers {
        let done = receiver.recv().unwrap().unwrap();
        assert_eq!(done.status(), Some(CompletionStatus::Done));
    }

    let frames = hw.count(|e| matches!(e, SimEvent::DeconUpdate { .. }));
    assert_eq!(frames, 0);
    worker.stop();
    assert!(worker.commit(CommitRequest::new()).is_err());
}
