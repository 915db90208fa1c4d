// Headless GPU checks of the count-driven paths: instance counts copied from
// a visible-index buffer, single-pass stereo doubling, indirect dispatch
// sizing and LOD bucket release. Exits with success once every check passed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bevy::app::{AppExit, ScheduleRunnerPlugin};
use bevy::prelude::*;
use bevy::render::render_resource::{CommandEncoder, CommandEncoderDescriptor};
use bevy::render::renderer::{RenderDevice, RenderQueue};
use bevy::render::{Render, RenderApp, RenderSet};
use bevy::window::ExitCondition;
use bevy::winit::WinitPlugin;
use bevy_gpu_trail::config::{GpuTrail, LodSetting, StereoRenderingMode};
use bevy_gpu_trail::gpu::buffers::{TrailBindGroupLayouts, TrailIndexBuffer};
use bevy_gpu_trail::gpu::calc_lod::{DefaultCalcLod, LodStrategy};
use bevy_gpu_trail::gpu::extract::TrailCamera;
use bevy_gpu_trail::gpu::ffi::{workgroup_count, DispatchIndirectArgs, TrailDrawArgs};
use bevy_gpu_trail::gpu::lod_builder::LodGeometryBuilder;
use bevy_gpu_trail::gpu::pipeline::{TrailComputePipelines, TrailPrepareContext};
use bevy_gpu_trail::gpu::readback::read_buffer;
use bevy_gpu_trail::gpu::trail_store::TrailStore;
use bevy_gpu_trail::GpuTrailPlugin;

const TRAIL_NUM: u32 = 256;
const NODE_NUM: u32 = 8;

/// Set by the render world, read by the main world to exit.
#[derive(Resource, Clone, Default)]
struct ChecksDone(Arc<AtomicBool>);

fn main() {
    let done = ChecksDone::default();

    let mut app = App::new();
    app.add_plugins(
        DefaultPlugins
            .set(WindowPlugin {
                primary_window: None,
                exit_condition: ExitCondition::DontExit,
                ..default()
            })
            .disable::<WinitPlugin>(),
    )
    .add_plugins(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 60.0)))
    .add_plugins(GpuTrailPlugin)
    .insert_resource(done.clone())
    .add_systems(Update, exit_when_done);

    app.sub_app_mut(RenderApp)
        .insert_resource(done)
        .add_systems(Render, run_checks.in_set(RenderSet::Cleanup));

    app.run();
}

fn exit_when_done(done: Res<ChecksDone>, mut exit: EventWriter<AppExit>) {
    if done.0.load(Ordering::SeqCst) {
        exit.write(AppExit::Success);
    }
}

fn run_checks(
    render_device: Res<RenderDevice>,
    render_queue: Res<RenderQueue>,
    layouts: Option<Res<TrailBindGroupLayouts>>,
    pipelines: Option<Res<TrailComputePipelines>>,
    done: Res<ChecksDone>,
    mut ran: Local<bool>,
) {
    if *ran {
        return;
    }
    // pipelines still compiling
    let (Some(layouts), Some(pipelines)) = (layouts, pipelines) else {
        return;
    };
    *ran = true;

    let ctx = TrailPrepareContext {
        device: &render_device,
        queue: &render_queue,
        layouts: &layouts,
    };
    let trail = GpuTrail {
        trail_num: TRAIL_NUM,
        node_num_per_trail: NODE_NUM,
        ..default()
    };
    let store = TrailStore::new(ctx.device, ctx.layouts, &trail).expect("store fits in u32");
    store.write_params(ctx.queue, &trail, 0.0);

    check_instance_count(&ctx, &pipelines, &store, StereoRenderingMode::Mono);
    check_instance_count(&ctx, &pipelines, &store, StereoRenderingMode::SinglePassInstanced);
    check_indirect_dispatch(&ctx, &pipelines, &store);
    check_lod_bucket_release(&ctx, &store);

    store.destroy();
    info!("gpu parity: all checks passed");
    done.0.store(true, Ordering::SeqCst);
}

// ==================== helpers ========================================

/// Index buffer holding trails `0..live` with a live count of `live`.
fn live_indices(ctx: &TrailPrepareContext, live: u32) -> TrailIndexBuffer {
    let buffer = TrailIndexBuffer::new(ctx.device, "gpu_parity", TRAIL_NUM);
    let indices: Vec<u32> = (0..live).collect();
    ctx.queue
        .write_buffer(&buffer.indices, 0, bytemuck::cast_slice(&indices));
    ctx.queue.write_buffer(&buffer.count, 0, bytemuck::bytes_of(&live));
    buffer
}

fn submit(ctx: &TrailPrepareContext, record: impl FnOnce(&mut CommandEncoder)) {
    let mut encoder = ctx
        .device
        .create_command_encoder(&CommandEncoderDescriptor {
            label: Some("gpu_parity_encoder"),
        });
    record(&mut encoder);
    ctx.queue.submit([encoder.finish()]);
}

fn camera() -> TrailCamera {
    TrailCamera {
        position: Vec3::new(0.0, 0.0, 10.0),
        forward: Vec3::NEG_Z,
        orthographic: false,
        frustum_planes: [Vec4::ZERO; 6],
    }
}

// ==================== checks =========================================

/// Draw args must carry the live count, doubled for single-pass stereo.
fn check_instance_count(
    ctx: &TrailPrepareContext,
    pipelines: &TrailComputePipelines,
    store: &TrailStore,
    stereo: StereoRenderingMode,
) {
    const LIVE: u32 = 37;

    let mut builder = LodGeometryBuilder::new(
        ctx.device,
        &LodSetting {
            lod_node_step: 2,
            ..default()
        },
    );
    builder
        .ensure_buffers(ctx.device, ctx.layouts, store, stereo)
        .expect("step 2 fits 8 nodes");
    let index_buffer = live_indices(ctx, LIVE);

    builder.prepare_args_buffer_update(ctx.queue, stereo);
    submit(ctx, |encoder| {
        builder.update_args_buffer(encoder, pipelines, &index_buffer, stereo)
    });

    let args = builder
        .buffers()
        .and_then(|buffers| read_buffer::<TrailDrawArgs>(ctx.device, ctx.queue, &buffers.args_buffer))
        .expect("args readback");
    info!("{stereo:?}: instance_count = {}", args[0].instance_count);
    assert_eq!(
        args[0].instance_count,
        LIVE * stereo.instance_multiplier(),
        "FAIL: instance count under {stereo:?}"
    );
    // 4 retained nodes, 3 segments
    assert_eq!(args[0].index_count, 18, "FAIL: index count");

    index_buffer.destroy();
    builder.dispose();
}

/// The vertex kernel is sized from the GPU-side count, never from `trail_num`.
fn check_indirect_dispatch(
    ctx: &TrailPrepareContext,
    pipelines: &TrailComputePipelines,
    store: &TrailStore,
) {
    const LIVE: u32 = 70;

    let mut builder = LodGeometryBuilder::new(ctx.device, &LodSetting::default());
    builder
        .ensure_buffers(ctx.device, ctx.layouts, store, StereoRenderingMode::Mono)
        .expect("step 1 fits 8 nodes");
    let index_buffer = live_indices(ctx, LIVE);

    builder.prepare_vertex_buffer_update(
        ctx.device,
        ctx.queue,
        ctx.layouts,
        &camera(),
        0.1,
        0.1,
        Some(&index_buffer),
    );
    submit(ctx, |encoder| {
        builder.update_vertex_buffer(encoder, pipelines, store, Some(&index_buffer))
    });

    let args = read_buffer::<DispatchIndirectArgs>(
        ctx.device,
        ctx.queue,
        builder.dispatcher().args_buffer(),
    )
    .expect("dispatch args readback");
    info!("indirect dispatch: {:?}", args[0]);
    assert_eq!(
        args[0],
        DispatchIndirectArgs {
            x: workgroup_count(LIVE),
            y: 1,
            z: 1,
        },
        "FAIL: indirect dispatch size"
    );
    assert_ne!(workgroup_count(LIVE), workgroup_count(TRAIL_NUM));

    index_buffer.destroy();
    builder.dispose();
}

/// Buckets are freed while a single LOD is drawn and come back on demand.
fn check_lod_bucket_release(ctx: &TrailPrepareContext, store: &TrailStore) {
    let mut calc_lod = DefaultCalcLod::new(ctx);
    let distances = [0.0, 50.0];

    assert_eq!(calc_lod.prepare(ctx, store, &distances, &camera(), None).len(), 2);
    assert_eq!(calc_lod.bucket_count(), 2);

    calc_lod.release_buckets();
    assert_eq!(calc_lod.bucket_count(), 0, "FAIL: buckets kept after release");

    assert_eq!(calc_lod.prepare(ctx, store, &distances, &camera(), None).len(), 2);
    calc_lod.dispose();
}
