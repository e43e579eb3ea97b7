//! Criterion benchmarks for the scene codec and command frames.
//!
//! Measures how long it takes to stream a scene of a few thousand entities
//! out and back in, and to frame the individual `add` commands a flush emits.
//!
//! Run with:
//! ```bash
//! cargo bench --package drawlink-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use drawlink_core::gp::{Group, Line, Point, Polyline};
use drawlink_core::protocol::{decode_frame, write_frame};
use drawlink_core::{Command, Handle, Scene};
use glam::DVec3;

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// A scene of `groups` groups, each holding a point, a line, and a
/// 16-vertex polyline.
fn make_scene(groups: usize) -> Scene {
    let mut scene = Scene::new("bench");
    for i in 0..groups {
        let x = i as f64;
        let g = scene.add(Group::new(), Handle::NONE);
        scene.add(Point::new(DVec3::new(x, 0.0, 0.0)), g);
        scene.add(Line::new(DVec3::ZERO, DVec3::new(x, 1.0, 0.0)), g);
        let vertices = (0..16).map(|k| DVec3::new(x, k as f64, 0.0)).collect();
        scene.add(Polyline::new(vertices), g);
    }
    scene
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_scene_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_stream");
    for groups in [10usize, 100, 1000] {
        let mut scene = make_scene(groups);
        let bytes = scene.to_bytes().expect("encode must succeed for benchmark setup");

        group.bench_with_input(BenchmarkId::new("encode", groups), &groups, |b, _| {
            b.iter(|| black_box(&mut scene).to_bytes().unwrap())
        });
        group.bench_with_input(BenchmarkId::new("decode", groups), &bytes, |b, bytes| {
            b.iter(|| Scene::from_bytes(black_box(bytes)).unwrap())
        });
    }
    group.finish();
}

fn bench_flush_frames(c: &mut Criterion) {
    let mut scene = make_scene(250);
    let mut frames = Vec::new();
    for gp in scene.unsent_mut() {
        let payload = gp.to_bytes().expect("encode must succeed for benchmark setup");
        write_frame(&mut frames, &Command::Add { scene: Handle(1), payload });
    }

    c.bench_function("decode_add_frames_1000", |b| {
        b.iter(|| {
            let mut rest = black_box(frames.as_slice());
            while !rest.is_empty() {
                let (_, n) = decode_frame(rest).unwrap();
                rest = &rest[n..];
            }
        })
    });
}

criterion_group!(benches, bench_scene_stream, bench_flush_frames);
criterion_main!(benches);
