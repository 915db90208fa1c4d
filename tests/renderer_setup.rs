use bevy::prelude::*;
use bevy_gpu_trail::config::{GpuTrail, GpuTrailRenderer, LodSetting};
use bevy_gpu_trail::init_trail_renderers;

fn app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_systems(Update, init_trail_renderers);
    app
}

#[test]
fn empty_lod_list_gets_a_full_detail_lod() {
    let mut app = app();
    let entity = app
        .world_mut()
        .spawn((GpuTrailRenderer::default(), GpuTrail::default()))
        .id();
    app.update();

    let renderer = app.world().get::<GpuTrailRenderer>(entity).unwrap();
    assert_eq!(renderer.lod_settings.len(), 1);
    assert_eq!(renderer.lod_settings[0].lod_node_step, 1);
    assert_eq!(renderer.lod_settings[0].distance, 0.0);
}

#[test]
fn configured_lods_are_kept() {
    let mut app = app();
    let renderer = GpuTrailRenderer::default()
        .with_lod(LodSetting::default())
        .with_lod(LodSetting {
            distance: 30.0,
            lod_node_step: 4,
            ..default()
        });
    let entity = app.world_mut().spawn((renderer, GpuTrail::default())).id();
    app.update();

    let renderer = app.world().get::<GpuTrailRenderer>(entity).unwrap();
    assert_eq!(renderer.lod_settings.len(), 2);
    assert_eq!(renderer.lod_settings[1].lod_node_step, 4);
}

#[test]
fn renderer_is_visible_by_default() {
    let mut app = app();
    let entity = app
        .world_mut()
        .spawn((GpuTrailRenderer::default(), GpuTrail::default()))
        .id();
    app.update();

    assert!(app.world().get::<Visibility>(entity).is_some());
}

#[test]
#[should_panic]
fn renderer_without_trail_store_fails() {
    let mut app = app();
    app.world_mut().spawn(GpuTrailRenderer::default());
    app.update();
}
