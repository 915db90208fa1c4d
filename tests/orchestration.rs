use std::collections::HashMap;

use bevy::prelude::*;
use bevy::render::view::RenderLayers;
use bevy_gpu_trail::config::{
    GpuTrail, GpuTrailRenderer, LodSetting, StereoRenderingMode, TrailBlendMode, TrailInput,
    TrailMaterial,
};
use bevy_gpu_trail::debug::vertex_rung_lines;
use bevy_gpu_trail::gpu::draw_pipeline::blend_state;
use bevy_gpu_trail::gpu::extract::{
    pick_trail_camera, CameraCandidate, ExtractedTrailRenderer, TrailCamera,
};
use bevy_gpu_trail::gpu::ffi::TrailVertex;
use bevy_gpu_trail::gpu::renderer::{
    release_stale_states, resolve_trail_index_buffer, sync_lod_list,
};

fn lod(step: u32) -> LodSetting {
    LodSetting {
        lod_node_step: step,
        ..default()
    }
}

// ---------------- LOD list ----------------

#[derive(Debug, PartialEq)]
struct FakeBuilder {
    step: u32,
    disposed: bool,
}

fn sync(list: &mut Vec<FakeBuilder>, settings: &[LodSetting], disposed: &mut u32) -> bool {
    sync_lod_list(
        list,
        settings,
        |builder| {
            builder.disposed = true;
            *disposed += 1;
        },
        |setting| FakeBuilder {
            step: setting.lod_node_step,
            disposed: false,
        },
        |builder, setting| builder.step = setting.lod_node_step,
    )
}

#[test]
fn lod_list_follows_setting_count() {
    let mut list = Vec::new();
    let mut disposed = 0;

    assert!(sync(&mut list, &[lod(1), lod(2)], &mut disposed));
    assert_eq!(list.len(), 2);
    assert_eq!(disposed, 0);

    // count changed: every old builder disposed, list rebuilt
    assert!(sync(&mut list, &[lod(1), lod(2), lod(4)], &mut disposed));
    assert_eq!(disposed, 2);
    assert_eq!(list.iter().map(|b| b.step).collect::<Vec<_>>(), vec![1, 2, 4]);
    assert!(list.iter().all(|b| !b.disposed));
}

#[test]
fn lod_list_edits_in_place_when_count_matches() {
    let mut list = Vec::new();
    let mut disposed = 0;

    sync(&mut list, &[lod(1), lod(2)], &mut disposed);
    assert!(!sync(&mut list, &[lod(1), lod(3)], &mut disposed));
    assert_eq!(disposed, 0);
    assert_eq!(list[1].step, 3);
}

#[test]
fn empty_settings_dispose_everything() {
    let mut list = Vec::new();
    let mut disposed = 0;

    sync(&mut list, &[lod(1)], &mut disposed);
    sync(&mut list, &[], &mut disposed);
    assert!(list.is_empty());
    assert_eq!(disposed, 1);
}

// ---------------- index buffer fallback ----------------

#[test]
fn lod_buffer_wins_over_culling() {
    let lod_buffers = ["lod0", "lod1"];
    assert_eq!(
        resolve_trail_index_buffer(Some(&lod_buffers[..]), Some(&"culling"), 1),
        Some(&"lod1")
    );
}

#[test]
fn culling_buffer_is_the_fallback() {
    assert_eq!(
        resolve_trail_index_buffer::<&str>(None, Some(&"culling"), 0),
        Some(&"culling")
    );
    // fewer LOD buffers than LODs
    let lod_buffers = ["lod0"];
    assert_eq!(
        resolve_trail_index_buffer(Some(&lod_buffers[..]), Some(&"culling"), 1),
        Some(&"culling")
    );
}

#[test]
fn no_buffer_means_draw_everything() {
    assert_eq!(resolve_trail_index_buffer::<&str>(None, None, 0), None);
}

// ---------------- renderer lifetime ----------------

fn extracted(entity: Entity, visibility: InheritedVisibility) -> ExtractedTrailRenderer {
    ExtractedTrailRenderer::new(
        entity,
        &GpuTrailRenderer::default(),
        &GpuTrail::default(),
        None,
        None,
        &visibility,
    )
}

#[test]
fn hidden_renderer_is_still_extracted() {
    let input = TrailInput {
        positions: vec![Vec3::ONE],
    };
    let renderer = ExtractedTrailRenderer::new(
        Entity::from_raw(1),
        &GpuTrailRenderer::default(),
        &GpuTrail::default(),
        Some(&input),
        None,
        &InheritedVisibility::HIDDEN,
    );
    assert!(!renderer.visible);
    assert_eq!(renderer.input, vec![Vec3::ONE]);
    assert_eq!(renderer.layers, RenderLayers::default());

    assert!(extracted(Entity::from_raw(1), InheritedVisibility::VISIBLE).visible);
}

#[test]
fn hidden_renderer_keeps_its_state() {
    let visible = Entity::from_raw(1);
    let hidden = Entity::from_raw(2);
    let despawned = Entity::from_raw(3);
    let mut states: HashMap<Entity, &str> = [(visible, "a"), (hidden, "b"), (despawned, "c")]
        .into_iter()
        .collect();

    let mut disposed = Vec::new();
    release_stale_states(
        &mut states,
        &[
            extracted(visible, InheritedVisibility::VISIBLE),
            extracted(hidden, InheritedVisibility::HIDDEN),
        ],
        |entity, _| disposed.push(entity),
    );

    assert_eq!(disposed, vec![despawned]);
    assert_eq!(states.len(), 2);
    assert_eq!(states.get(&hidden), Some(&"b"));
}

// ---------------- camera ----------------

fn camera_at(x: f32, orthographic: bool) -> TrailCamera {
    TrailCamera {
        position: Vec3::new(x, 0.0, 0.0),
        forward: Vec3::NEG_Z,
        orthographic,
        frustum_planes: [Vec4::ZERO; 6],
    }
}

fn candidate(x: f32, order: isize, is_active: bool, targeted: bool) -> CameraCandidate {
    CameraCandidate {
        order,
        is_active,
        targeted,
        camera: camera_at(x, false),
    }
}

#[test]
fn targeted_camera_is_preferred() {
    let picked = pick_trail_camera([
        candidate(1.0, 0, true, false),
        candidate(2.0, 5, true, true),
    ]);
    assert_eq!(picked.map(|c| c.position.x), Some(2.0));
}

#[test]
fn first_rendering_active_camera_otherwise() {
    let picked = pick_trail_camera([
        candidate(1.0, 3, true, false),
        candidate(2.0, -1, false, true), // inactive
        candidate(3.0, 1, true, false),
    ]);
    assert_eq!(picked.map(|c| c.position.x), Some(3.0));
}

#[test]
fn no_active_camera() {
    assert!(pick_trail_camera([candidate(1.0, 0, false, true)]).is_none());
}

#[test]
fn only_orthographic_cameras_fix_the_facing() {
    assert_eq!(camera_at(0.0, false).to_camera_dir(), Vec3::ZERO);
    assert_eq!(camera_at(0.0, true).to_camera_dir(), Vec3::Z);
}

// ---------------- config ----------------

#[test]
fn culling_width_is_the_wider_end() {
    let renderer = GpuTrailRenderer {
        start_width: 0.3,
        end_width: 0.7,
        ..default()
    };
    assert_eq!(renderer.culling_width(), 0.7);
}

#[test]
fn lod_material_falls_back_to_default() {
    let red = TrailMaterial {
        color: LinearRgba::RED,
        ..default()
    };
    let renderer = GpuTrailRenderer::default().with_lod(lod(1)).with_lod(LodSetting {
        material: Some(red),
        ..lod(2)
    });

    assert_eq!(renderer.material_for(0).color, LinearRgba::WHITE);
    assert_eq!(renderer.material_for(1).color, LinearRgba::RED);
    assert_eq!(renderer.material_for(7).color, LinearRgba::WHITE);
}

#[test]
fn stereo_multiplier() {
    assert_eq!(StereoRenderingMode::Mono.instance_multiplier(), 1);
    assert_eq!(StereoRenderingMode::SinglePassInstanced.instance_multiplier(), 2);
    assert!(!StereoRenderingMode::default().is_single_pass_instanced());
}

#[test]
fn opaque_passes_do_not_blend() {
    assert!(blend_state(TrailBlendMode::Opaque).is_none());
    assert!(blend_state(TrailBlendMode::Alpha).is_some());
    assert!(blend_state(TrailBlendMode::Additive).is_some());
}

// ---------------- debug lines ----------------

fn vertex(x: f32) -> TrailVertex {
    TrailVertex {
        pos: [x, 0.0, 0.0],
        uv_x: 0.0,
    }
}

#[test]
fn rung_lines_color_first_and_last() {
    let vertices: Vec<TrailVertex> = (0..6).map(|i| vertex(i as f32)).collect();
    let lines = vertex_rung_lines(&vertices);

    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0].start, Vec3::new(0.0, 0.0, 0.0));
    assert_eq!(lines[0].end, Vec3::new(1.0, 0.0, 0.0));
    assert_eq!(lines[0].color, Color::srgb(1.0, 0.0, 0.0));
    assert_eq!(lines[1].color, Color::srgb(1.0, 0.92, 0.016));
    assert_eq!(lines[2].color, Color::srgb(0.0, 1.0, 0.0));
}

#[test]
fn single_rung_is_green() {
    let lines = vertex_rung_lines(&[vertex(0.0), vertex(1.0)]);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].color, Color::srgb(0.0, 1.0, 0.0));
}

#[test]
fn dangling_vertex_is_ignored() {
    assert!(vertex_rung_lines(&[vertex(0.0)]).is_empty());
}
