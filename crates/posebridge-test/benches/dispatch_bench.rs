//! Benchmarks for the control channel and the per-frame layout pass

use std::collections::HashMap;
use std::time::{Duration, Instant};

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use posebridge_core::{
    BodyPart, BridgeResult, ContainerId, ControllerId, EventThrottle, PropValue, Rect,
    SharedConfiguration, Size,
};
use posebridge_runtime::{
    decode_message, CommandDispatcher, Container, FrameLayoutLoop, HostTree, UiHandle,
};

struct NullHost;

impl HostTree for NullHost {
    fn activity_reachable(&self) -> bool {
        true
    }
    fn parent_bounds(&self, _: ContainerId) -> Option<Rect> {
        Some(Rect::new(0, 0, 1080, 1920))
    }
    fn measure(&self, _: ContainerId, size: Size) {
        black_box(size);
    }
    fn layout(&self, _: ContainerId, frame: Rect) {
        black_box(frame);
    }
    fn notify_layout_changed(&self, _: ContainerId) {}
    fn embed_controller(&self, _: ContainerId, _: ControllerId) -> BridgeResult<()> {
        Ok(())
    }
    fn remove_controller(&self, _: ContainerId, _: ControllerId) {}
}

fn bench_set_property(c: &mut Criterion) {
    let (ui, mut rx) = UiHandle::detached();
    let dispatcher = CommandDispatcher::new(SharedConfiguration::shared(), ui);
    let root = ContainerId::new(7);

    c.bench_function("set_property_config", |b| {
        b.iter(|| {
            dispatcher.set_property(root, black_box("face"), PropValue::Bool(true));
            dispatcher.set_property(root, black_box("model"), PropValue::from("heavy"));
        })
    });

    c.bench_function("set_property_geometry", |b| {
        b.iter(|| {
            dispatcher.set_property(root, black_box("width"), PropValue::Int(480));
            while rx.try_recv().is_ok() {}
        })
    });
}

fn bench_decode_message(c: &mut Criterion) {
    let json = r#"{"type":"setProperty","container":7,"key":"minDetectionConfidence","value":0.6}"#;

    c.bench_function("decode_control_message", |b| {
        b.iter(|| black_box(decode_message(black_box(json))))
    });
}

fn bench_frame_pass(c: &mut Criterion) {
    let mut frame_loop = FrameLayoutLoop::new();
    let mut containers = HashMap::new();
    for tag in 0..16 {
        let id = ContainerId::new(tag);
        let mut container = Container::new(id);
        container.set_width(480);
        container.set_height(640);
        containers.insert(id, container);
        frame_loop.start(id);
    }
    let host = NullHost;

    c.bench_function("frame_pass_16_containers", |b| {
        b.iter(|| black_box(frame_loop.run_frame(&mut containers, &host)))
    });
}

fn bench_throttle(c: &mut Criterion) {
    let throttle = EventThrottle::new();
    let start = Instant::now();
    let mut step = 0u64;

    c.bench_function("event_throttle_acquire", |b| {
        b.iter(|| {
            step += 1;
            let now = start + Duration::from_millis(step);
            black_box(throttle.try_acquire(now, black_box(30)))
        })
    });
}

fn bench_config_snapshot(c: &mut Criterion) {
    let config = SharedConfiguration::shared();
    config.set_body_part(BodyPart::Face, true);
    config.set_body_part(BodyPart::LeftArm, true);

    c.bench_function("config_snapshot", |b| b.iter(|| black_box(config.snapshot())));

    c.bench_function("enabled_segments", |b| {
        b.iter(|| black_box(config.enabled_segments()))
    });
}

criterion_group!(
    benches,
    bench_set_property,
    bench_decode_message,
    bench_frame_pass,
    bench_throttle,
    bench_config_snapshot
);
criterion_main!(benches);
