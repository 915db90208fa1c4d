use bevy_gpu_trail::config::{GpuTrail, StereoRenderingMode};
use bevy_gpu_trail::error::TrailConfigError;
use bevy_gpu_trail::gpu::ffi::{workgroup_count, DispatchIndirectArgs, TrailDrawArgs, TrailVertex};
use bevy_gpu_trail::gpu::lod_builder::zeroed_vertices;
use bevy_gpu_trail::gpu::trail_store::node_slot;
use bevy_gpu_trail::lod::{build_index_pattern, lod_distance_ranges, LodGeometry, LodStepCheck};

#[test]
fn full_detail_sizes() {
    let geometry = LodGeometry::new(100, 64, 1).unwrap();
    assert_eq!(geometry.node_num_per_trail_with_lod(), 64);
    assert_eq!(geometry.vertex_num_per_trail(), 128); // 2 per node
    assert_eq!(geometry.vertex_buffer_size(), 12_800);
    assert_eq!(geometry.index_num_per_trail(), 378); // 63 segments * 6
}

#[test]
fn stepped_sizes_round_down() {
    let geometry = LodGeometry::new(10, 64, 3).unwrap();
    assert_eq!(geometry.node_num_per_trail_with_lod(), 21); // 64 / 3
    assert_eq!(geometry.vertex_num_per_trail(), 42);
    assert_eq!(geometry.index_num_per_trail(), 120);
}

#[test]
fn step_one_below_node_num_keeps_one_segment() {
    let geometry = LodGeometry::new(1, 4, 2).unwrap();
    assert_eq!(geometry.node_num_per_trail_with_lod(), 2);
    assert_eq!(geometry.index_num_per_trail(), 6);
}

#[test]
fn invalid_steps_are_rejected() {
    for step in [0, 64, 65] {
        assert_eq!(
            LodGeometry::new(10, 64, step),
            Err(TrailConfigError::InvalidLodNodeStep {
                lod_node_step: step,
                node_num_per_trail: 64,
            })
        );
    }
}

#[test]
fn zero_trails_is_a_valid_geometry() {
    let geometry = LodGeometry::new(0, 64, 1).unwrap();
    assert_eq!(geometry.vertex_buffer_size(), 0);
    assert_eq!(
        TrailDrawArgs::reset(&geometry, StereoRenderingMode::Mono).instance_count,
        0
    );
}

#[test]
fn size_key_follows_retained_node_count() {
    let a = LodGeometry::new(8, 60, 5).unwrap();
    let b = LodGeometry::new(8, 60, 6).unwrap();
    assert_eq!(a.node_num_per_trail_with_lod(), 12);
    assert_eq!(b.node_num_per_trail_with_lod(), 10);
    assert_ne!(a.size_key(), b.size_key());

    let c = LodGeometry::new(8, 64, 7).unwrap(); // 9 nodes
    let d = LodGeometry::new(8, 63, 7).unwrap(); // 9 nodes
    assert_eq!(c.size_key(), d.size_key());
}

#[test]
fn index_pattern_matches_ribbon_layout() {
    assert_eq!(build_index_pattern(3), vec![0, 1, 2, 2, 1, 3, 2, 3, 4, 4, 3, 5]);
}

#[test]
fn index_pattern_of_a_single_node_is_empty() {
    assert!(build_index_pattern(1).is_empty());
    assert!(build_index_pattern(0).is_empty());
}

#[test]
fn index_pattern_stays_inside_the_trail() {
    let nodes = 50;
    let indices = build_index_pattern(nodes);
    assert_eq!(indices.len() as u32, (nodes - 1) * 6);
    assert_eq!(indices.iter().max().copied(), Some(nodes * 2 - 1));
}

#[test]
fn lod_ranges_cover_all_distances() {
    let ranges = lod_distance_ranges(&[5.0, 20.0, 50.0]);
    assert_eq!(ranges, vec![(0.0, 20.0), (20.0, 50.0), (50.0, f32::MAX)]);
}

#[test]
fn unsorted_lod_distances_never_overlap() {
    // LOD 2 would otherwise also claim [20, 50) from LOD 0
    let ranges = lod_distance_ranges(&[0.0, 50.0, 20.0]);
    assert_eq!(ranges, vec![(0.0, 50.0), (50.0, 50.0), (50.0, f32::MAX)]);
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0);
    }
}

#[test]
fn single_lod_range_is_unbounded() {
    assert_eq!(lod_distance_ranges(&[10.0]), vec![(0.0, f32::MAX)]);
    assert!(lod_distance_ranges(&[]).is_empty());
}

#[test]
fn reset_args_draw_every_trail() {
    let geometry = LodGeometry::new(100, 64, 2).unwrap();
    let args = TrailDrawArgs::reset(&geometry, StereoRenderingMode::Mono);
    assert_eq!(
        args,
        TrailDrawArgs {
            index_count: 186, // (32 - 1) * 6
            instance_count: 100,
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    );
}

#[test]
fn reset_args_double_instances_for_single_pass_stereo() {
    let geometry = LodGeometry::new(100, 64, 1).unwrap();
    let args = TrailDrawArgs::reset(&geometry, StereoRenderingMode::SinglePassInstanced);
    assert_eq!(args.instance_count, 200);
    assert_eq!(args.index_count, 378);
}

#[test]
fn live_count_lands_on_instance_count() {
    assert_eq!(TrailDrawArgs::INSTANCE_COUNT_OFFSET, 4);
    assert_eq!(std::mem::size_of::<TrailDrawArgs>(), 20);
}

#[test]
fn dispatch_args_round_up_to_workgroups() {
    assert_eq!(workgroup_count(0), 0);
    assert_eq!(workgroup_count(1), 1);
    assert_eq!(workgroup_count(64), 1);
    assert_eq!(workgroup_count(65), 2);
    assert_eq!(DispatchIndirectArgs::default(), DispatchIndirectArgs { x: 0, y: 1, z: 1 });
}

#[test]
fn node_slots_wrap_inside_their_trail() {
    assert_eq!(node_slot(0, 0, 8), 0);
    assert_eq!(node_slot(0, 9, 8), 1);
    assert_eq!(node_slot(3, 7, 8), 31);
    assert_eq!(node_slot(3, 8, 8), 24);
}

#[test]
fn small_trail_sizes() {
    let full = LodGeometry::new(4, 8, 1).unwrap();
    assert_eq!(full.vertex_num_per_trail(), 16);
    assert_eq!(full.vertex_buffer_size(), 64);
    assert_eq!(full.index_num_per_trail(), 42);

    let half = LodGeometry::new(4, 8, 2).unwrap();
    assert_eq!(half.node_num_per_trail_with_lod(), 4);
    assert_eq!(half.vertex_num_per_trail(), 8);
    assert_eq!(half.index_num_per_trail(), 18);

    assert!(LodGeometry::new(4, 8, 8).is_err());
}

#[test]
fn vertex_buffer_starts_zeroed() {
    let vertices = zeroed_vertices(&LodGeometry::new(4, 8, 2).unwrap());
    assert_eq!(vertices.len(), 32);
    assert!(vertices.iter().all(|v| *v == TrailVertex::default()));

    // never bind an empty buffer
    assert_eq!(zeroed_vertices(&LodGeometry::new(0, 8, 1).unwrap()).len(), 1);
}

#[test]
fn oversized_vertex_buffer_is_rejected() {
    assert_eq!(
        LodGeometry::new(u32::MAX, 64, 1),
        Err(TrailConfigError::BufferSizeOverflow {
            trail_num: u32::MAX,
            per_trail: 128,
        })
    );
    assert_eq!(
        LodGeometry::new(1, u32::MAX, 1),
        Err(TrailConfigError::BufferSizeOverflow {
            trail_num: 1,
            per_trail: u32::MAX,
        })
    );
}

#[test]
fn oversized_trail_store_is_rejected() {
    let trail = GpuTrail {
        trail_num: 1 << 20,
        node_num_per_trail: 1 << 12,
        ..Default::default()
    };
    assert_eq!(
        trail.node_capacity(),
        Err(TrailConfigError::BufferSizeOverflow {
            trail_num: 1 << 20,
            per_trail: 1 << 12,
        })
    );
    assert_eq!(GpuTrail::default().node_capacity(), Ok(64));
}

#[test]
fn rejected_step_stays_rejected_until_edited() {
    let mut check = LodStepCheck::default();
    let rejected: Result<LodGeometry, TrailConfigError> = Err(TrailConfigError::InvalidLodNodeStep {
        lod_node_step: 8,
        node_num_per_trail: 8,
    });

    assert_eq!(check.validate(4, 8, 8), rejected);
    assert!(check.is_rejected());

    // a grown store would fit the step, the LOD still stays off
    assert_eq!(check.validate(4, 16, 8), rejected);

    check.step_changed();
    let geometry = check.validate(4, 8, 2);
    assert_eq!(geometry.map(|g| g.node_num_per_trail_with_lod()), Ok(4));
    assert!(!check.is_rejected());
}
