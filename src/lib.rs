use bevy::core_pipeline::core_3d::graph::{Core3d, Node3d};
use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResourcePlugin;
use bevy::render::render_graph::{RenderGraphApp, ViewNodeRunner};
use bevy::render::{ExtractSchedule, Render, RenderApp, RenderSet};

pub mod config;
pub mod debug;
pub mod error;
pub mod lod;

pub mod gpu {
    pub mod ffi;
    pub mod buffers;
    pub mod resource_cache;
    pub mod index_dispatcher;
    pub mod trail_store;
    pub mod pipeline;
    pub mod culling;
    pub mod calc_lod;
    pub mod lod_builder;
    pub mod extract;
    pub mod renderer;
    pub mod draw_pipeline;
    pub mod draw_pass;
    pub mod readback;
}

use crate::config::{
    GpuTrail, GpuTrailRenderer, GpuTrailShaders, LodSetting, StereoRenderingMode, TrailInput,
    TrailTargetCamera,
};
use crate::error::TrailConfigError;
use crate::gpu::buffers::TrailBindGroupLayouts;
use crate::gpu::draw_pass::{TrailDrawNode, TrailDrawPassLabel};
use crate::gpu::draw_pipeline::{
    prepare_trail_view_bind_group, queue_trail_draw_pipelines, TrailDrawPipelines,
};
use crate::gpu::extract::{extract_trail_renderers, ExtractedTrailRenderers};
use crate::gpu::pipeline::prepare_trail_pipelines;
use crate::gpu::renderer::{add_trail_compute_node_to_graph, prepare_trail_renderers, TrailRenderStates};

// ========================== systems ==================================

/// Validates new renderers. A renderer without a `GpuTrail` is a setup bug
/// and fails the app; an empty LOD list gets a single full-detail LOD.
pub fn init_trail_renderers(
    mut renderers: Query<(Entity, &mut GpuTrailRenderer, Has<GpuTrail>), Added<GpuTrailRenderer>>,
) -> bevy::ecs::error::Result {
    for (entity, mut renderer, has_trail) in &mut renderers {
        if !has_trail {
            return Err(TrailConfigError::MissingTrailStore(entity).into());
        }
        if renderer.lod_settings.is_empty() {
            renderer.lod_settings.push(LodSetting::default());
        }
    }
    Ok(())
}

// =====================================================================

// Plugin

pub struct GpuTrailPlugin;

impl Plugin for GpuTrailPlugin {
    fn build(&self, app: &mut App) {
        // App
        app.register_type::<GpuTrailRenderer>()
            .register_type::<GpuTrail>()
            .register_type::<TrailInput>()
            .register_type::<TrailTargetCamera>()
            .register_type::<StereoRenderingMode>()
            .init_resource::<StereoRenderingMode>()
            .init_resource::<GpuTrailShaders>()
            .add_plugins((
                ExtractResourcePlugin::<StereoRenderingMode>::default(),
                ExtractResourcePlugin::<GpuTrailShaders>::default(),
            ))
            .add_systems(PostUpdate, init_trail_renderers);

        #[cfg(feature = "debug-readback")]
        app.add_plugins(debug::TrailDebugDrawPlugin);

        // Render
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };
        render_app
            .init_resource::<ExtractedTrailRenderers>()
            .init_resource::<TrailRenderStates>()
            .init_resource::<TrailDrawPipelines>()
            .add_systems(ExtractSchedule, extract_trail_renderers)
            .add_systems(
                Render,
                (
                    prepare_trail_pipelines.in_set(RenderSet::Prepare),
                    (prepare_trail_renderers, queue_trail_draw_pipelines)
                        .chain()
                        .in_set(RenderSet::PrepareResources),
                    prepare_trail_view_bind_group.in_set(RenderSet::PrepareBindGroups),
                ),
            )
            .add_render_graph_node::<ViewNodeRunner<TrailDrawNode>>(Core3d, TrailDrawPassLabel)
            .add_render_graph_edges(
                Core3d,
                (Node3d::MainTransparentPass, TrailDrawPassLabel, Node3d::EndMainPass),
            );

        add_trail_compute_node_to_graph(render_app);
    }

    // layouts need the RenderDevice, which only exists once the renderer is up
    fn finish(&self, app: &mut App) {
        let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
            return;
        };
        render_app.init_resource::<TrailBindGroupLayouts>();
    }
}
