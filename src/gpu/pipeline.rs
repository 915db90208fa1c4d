use std::borrow::Cow;

use bevy::prelude::*;
use bevy::render::render_resource::{
    BindGroupLayout, CachedComputePipelineId, CachedPipelineState, ComputePipeline,
    ComputePipelineDescriptor, PipelineCache, PushConstantRange, ShaderDefVal,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};

use crate::config::GpuTrailShaders;
use crate::gpu::buffers::TrailBindGroupLayouts;

/// Kernels reading a visible-index buffer are compiled with this def.
pub const TRAIL_INDEX_INPUT_DEF: &str = "TRAIL_INDEX_INPUT";
/// Selects `args_buffer_multiply` out of the vertex update shader.
pub const TRAIL_ARGS_MULTIPLY_DEF: &str = "TRAIL_ARGS_MULTIPLY";

// ==================== resources ======================================

/// Every compute kernel of the trail pipeline, compiled.
#[derive(Resource, Clone)]
pub struct TrailComputePipelines {
    pub append: ComputePipeline,
    pub culling: ComputePipeline,
    pub calc_lod: ComputePipeline,
    pub calc_lod_indexed: ComputePipeline,
    pub update_vertex: ComputePipeline,
    pub update_vertex_indexed: ComputePipeline,
    pub args_multiply: ComputePipeline,
    pub index_dispatch: ComputePipeline,
}

/// Host-side handles the `prepare` half of every trail component needs.
pub struct TrailPrepareContext<'a> {
    pub device: &'a RenderDevice,
    pub queue: &'a RenderQueue,
    pub layouts: &'a TrailBindGroupLayouts,
}

// ==================== queueing =======================================

#[derive(Clone, Copy)]
pub struct TrailPipelineIds {
    append: CachedComputePipelineId,
    culling: CachedComputePipelineId,
    calc_lod: CachedComputePipelineId,
    calc_lod_indexed: CachedComputePipelineId,
    update_vertex: CachedComputePipelineId,
    update_vertex_indexed: CachedComputePipelineId,
    args_multiply: CachedComputePipelineId,
    index_dispatch: CachedComputePipelineId,
}

impl TrailPipelineIds {
    fn all(&self) -> [(&'static str, CachedComputePipelineId); 8] {
        [
            ("trail_append", self.append),
            ("trail_culling", self.culling),
            ("trail_calc_lod", self.calc_lod),
            ("trail_calc_lod_indexed", self.calc_lod_indexed),
            ("trail_update_vertex", self.update_vertex),
            ("trail_update_vertex_indexed", self.update_vertex_indexed),
            ("trail_args_multiply", self.args_multiply),
            ("trail_index_dispatch", self.index_dispatch),
        ]
    }

    fn resolve(&self, cache: &PipelineCache) -> Option<TrailComputePipelines> {
        let get = |id| cache.get_compute_pipeline(id).cloned();
        Some(TrailComputePipelines {
            append: get(self.append)?,
            culling: get(self.culling)?,
            calc_lod: get(self.calc_lod)?,
            calc_lod_indexed: get(self.calc_lod_indexed)?,
            update_vertex: get(self.update_vertex)?,
            update_vertex_indexed: get(self.update_vertex_indexed)?,
            args_multiply: get(self.args_multiply)?,
            index_dispatch: get(self.index_dispatch)?,
        })
    }
}

fn queue_kernel(
    cache: &PipelineCache,
    label: &'static str,
    layout: Vec<BindGroupLayout>,
    shader: &Handle<Shader>,
    entry_point: &'static str,
    defs: &[&'static str],
) -> CachedComputePipelineId {
    let shader_defs = defs.iter().map(|def| ShaderDefVal::from(*def)).collect();
    cache.queue_compute_pipeline(ComputePipelineDescriptor {
        label: Some(label.into()),
        layout,
        push_constant_ranges: Vec::<PushConstantRange>::new(),
        shader: shader.clone(),
        shader_defs,
        entry_point: Cow::from(entry_point),
        zero_initialize_workgroup_memory: false,
    })
}

pub fn prepare_trail_pipelines(
    mut commands: Commands,
    cache: Res<PipelineCache>,
    layouts: Res<TrailBindGroupLayouts>,
    shaders: Option<Res<GpuTrailShaders>>,
    ready: Option<Res<TrailComputePipelines>>,
    mut ids: Local<Option<TrailPipelineIds>>,
    mut reported: Local<bool>,
) {
    if ready.is_some() {
        return;
    }
    let Some(shaders) = shaders else {
        return;
    };

    let Some(queued) = *ids else {
        let l = &*layouts;
        *ids = Some(TrailPipelineIds {
            append: queue_kernel(
                &cache,
                "trail_append_pipeline",
                vec![l.append.clone()],
                &shaders.append,
                "append_node",
                &[],
            ),
            culling: queue_kernel(
                &cache,
                "trail_culling_pipeline",
                vec![l.trail.clone(), l.index_output.clone()],
                &shaders.culling,
                "culling",
                &[],
            ),
            calc_lod: queue_kernel(
                &cache,
                "trail_calc_lod_pipeline",
                vec![l.trail.clone(), l.index_output.clone()],
                &shaders.calc_lod,
                "calc_lod",
                &[],
            ),
            calc_lod_indexed: queue_kernel(
                &cache,
                "trail_calc_lod_indexed_pipeline",
                vec![l.trail.clone(), l.index_output.clone(), l.index_input.clone()],
                &shaders.calc_lod,
                "calc_lod",
                &[TRAIL_INDEX_INPUT_DEF],
            ),
            update_vertex: queue_kernel(
                &cache,
                "trail_update_vertex_pipeline",
                vec![l.trail.clone(), l.vertex_output.clone()],
                &shaders.update_vertex,
                "update_vertex",
                &[],
            ),
            update_vertex_indexed: queue_kernel(
                &cache,
                "trail_update_vertex_indexed_pipeline",
                vec![l.trail.clone(), l.vertex_output.clone(), l.index_input.clone()],
                &shaders.update_vertex,
                "update_vertex",
                &[TRAIL_INDEX_INPUT_DEF],
            ),
            args_multiply: queue_kernel(
                &cache,
                "trail_args_multiply_pipeline",
                vec![l.args_multiply.clone()],
                &shaders.update_vertex,
                "args_buffer_multiply",
                &[TRAIL_ARGS_MULTIPLY_DEF],
            ),
            index_dispatch: queue_kernel(
                &cache,
                "trail_index_dispatch_pipeline",
                vec![l.dispatch.clone()],
                &shaders.index_dispatch,
                "calc_dispatch_args",
                &[],
            ),
        });
        info!("trail compute pipelines QUEUED");
        return; // waits for compilation
    };

    if let Some(pipelines) = queued.resolve(&cache) {
        info!("trail compute pipelines READY");
        commands.insert_resource(pipelines);
        return;
    }

    if !*reported {
        for (name, id) in queued.all() {
            if let CachedPipelineState::Err(err) = cache.get_compute_pipeline_state(id) {
                error!("{name} pipeline ERROR: {err:?}");
                *reported = true;
            }
        }
    }
}
