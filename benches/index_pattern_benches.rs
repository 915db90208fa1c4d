use bevy_gpu_trail::debug::vertex_rung_lines;
use bevy_gpu_trail::gpu::ffi::TrailVertex;
use bevy_gpu_trail::lod::{build_index_pattern, lod_distance_ranges, LodGeometry};
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bench_index_pattern(c: &mut Criterion) {
    // rebuilt on every LOD buffer reallocation
    let geometry = LodGeometry::new(10_000, 1024, 1).unwrap();
    c.bench_function("index_pattern_1024_nodes", |b| {
        b.iter(|| build_index_pattern(black_box(geometry.node_num_per_trail_with_lod())))
    });

    let distances = [0.0, 20.0, 50.0, 100.0, 200.0];
    c.bench_function("lod_distance_ranges_5", |b| {
        b.iter(|| lod_distance_ranges(black_box(&distances)))
    });
}

fn bench_debug_lines(c: &mut Criterion) {
    let geometry = LodGeometry::new(1_000, 64, 1).unwrap();
    let vertices: Vec<TrailVertex> = (0..geometry.vertex_buffer_size())
        .map(|i| TrailVertex {
            pos: [i as f32, 0.0, 0.0],
            uv_x: 0.0,
        })
        .collect();
    c.bench_function("vertex_rung_lines_128k", |b| {
        b.iter(|| vertex_rung_lines(black_box(&vertices)))
    });
}

criterion_group!(benches, bench_index_pattern, bench_debug_lines);
criterion_main!(benches);
