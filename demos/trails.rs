use bevy::prelude::*;
use bevy_gpu_trail::config::{
    GpuTrail, GpuTrailRenderer, LodSetting, TrailBlendMode, TrailInput, TrailMaterial,
    TrailMaterialPass, TrailTargetCamera,
};
use bevy_gpu_trail::GpuTrailPlugin;

const TRAIL_NUM: u32 = 10_000;
const FIELD_RADIUS: f32 = 60.0;

#[derive(Component)]
struct Swarm {
    seeds: Vec<Vec3>,
}

fn main() {
    App::new()
        .add_plugins(DefaultPlugins)
        .insert_resource(ClearColor(Color::Srgba(
            bevy::color::palettes::css::DARK_SLATE_GRAY,
        )))
        .add_plugins(GpuTrailPlugin)
        .add_systems(Startup, setup)
        .add_systems(Update, (move_emitters, toggle_debug, orbit_camera))
        .run();
}

fn setup(mut commands: Commands) {
    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 30.0, 120.0).looking_at(Vec3::ZERO, Vec3::Y),
        TrailTargetCamera,
    ));

    let additive = TrailMaterial {
        color: LinearRgba::rgb(0.2, 0.8, 1.0),
        passes: vec![TrailMaterialPass {
            blend: TrailBlendMode::Additive,
            ..default()
        }],
        ..default()
    };

    // cheap golden-angle spread, deterministic
    let seeds = (0..TRAIL_NUM)
        .map(|i| {
            let t = i as f32 / TRAIL_NUM as f32;
            let angle = i as f32 * 2.399_963;
            Vec3::new(angle.cos() * t.sqrt(), t * 2.0 - 1.0, angle.sin() * t.sqrt()) * FIELD_RADIUS
        })
        .collect();

    commands.spawn((
        GpuTrail {
            trail_num: TRAIL_NUM,
            node_num_per_trail: 64,
            life: 3.0,
            min_node_distance: 0.2,
        },
        GpuTrailRenderer {
            start_width: 0.4,
            end_width: 0.05,
            default_material: additive,
            ..default()
        }
        .with_lod(LodSetting::default())
        .with_lod(LodSetting {
            distance: 80.0,
            lod_node_step: 2,
            ..default()
        })
        .with_lod(LodSetting {
            distance: 150.0,
            lod_node_step: 4,
            ..default()
        }),
        TrailInput::default(),
        Swarm { seeds },
    ));
}

fn move_emitters(time: Res<Time>, mut swarms: Query<(&Swarm, &mut TrailInput)>) {
    let t = time.elapsed_secs();
    for (swarm, mut input) in &mut swarms {
        input.positions.clear();
        input.positions.extend(swarm.seeds.iter().enumerate().map(|(i, seed)| {
            let phase = i as f32 * 0.37;
            *seed + Vec3::new((t + phase).sin(), (t * 1.3 + phase).cos(), (t * 0.7).sin()) * 5.0
        }));
    }
}

// C: culling, V: vertex update, R: rendering
fn toggle_debug(keys: Res<ButtonInput<KeyCode>>, mut renderers: Query<&mut GpuTrailRenderer>) {
    for mut renderer in &mut renderers {
        if keys.just_pressed(KeyCode::KeyC) {
            renderer.culling_enable = !renderer.culling_enable;
            info!("culling: {}", renderer.culling_enable);
        }
        if keys.just_pressed(KeyCode::KeyV) {
            renderer.update_vertex_enable = !renderer.update_vertex_enable;
            info!("update vertex: {}", renderer.update_vertex_enable);
        }
        if keys.just_pressed(KeyCode::KeyR) {
            renderer.rendering_enable = !renderer.rendering_enable;
            info!("rendering: {}", renderer.rendering_enable);
        }
    }
}

fn orbit_camera(time: Res<Time>, mut cameras: Query<&mut Transform, With<TrailTargetCamera>>) {
    for mut transform in &mut cameras {
        let angle = time.elapsed_secs() * 0.1;
        let distance = 120.0 + 80.0 * (time.elapsed_secs() * 0.05).sin();
        transform.translation = Vec3::new(angle.sin() * distance, 30.0, angle.cos() * distance);
        transform.look_at(Vec3::ZERO, Vec3::Y);
    }
}
