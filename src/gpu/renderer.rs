use std::collections::HashMap;

use bevy::app::SubApp;
use bevy::prelude::*;
use bevy::render::graph::CameraDriverLabel;
use bevy::render::render_graph::{
    Node, NodeRunError, RenderGraph, RenderGraphContext, RenderLabel,
};
use bevy::render::render_resource::CommandEncoder;
use bevy::render::renderer::{RenderContext, RenderDevice, RenderQueue};
use bevy::render::view::RenderLayers;

use crate::config::{GpuTrailShaders, LodSetting, StereoRenderingMode, TrailMaterialPass};
use crate::error::TrailConfigError;
use crate::gpu::buffers::{TrailBindGroupLayouts, TrailIndexBuffer};
use crate::gpu::calc_lod::{DefaultCalcLod, LodStrategy};
use crate::gpu::culling::{CullingStrategy, DefaultCulling};
use crate::gpu::extract::{ExtractedTrailRenderer, ExtractedTrailRenderers, TrailCamera};
use crate::gpu::lod_builder::LodGeometryBuilder;
use crate::gpu::pipeline::{TrailComputePipelines, TrailPrepareContext};
use crate::gpu::trail_store::{GpuTrailAppendNode, TrailStore};

// ==================== helpers ========================================

/// Keeps one builder per LOD setting. A changed LOD count rebuilds the whole
/// list (old builders disposed first); otherwise each builder takes over the
/// edited setting in place. Returns whether the list was rebuilt.
pub fn sync_lod_list<T>(
    list: &mut Vec<T>,
    settings: &[LodSetting],
    mut dispose: impl FnMut(&mut T),
    mut create: impl FnMut(&LodSetting) -> T,
    mut update: impl FnMut(&mut T, &LodSetting),
) -> bool {
    if list.len() != settings.len() {
        for item in list.iter_mut() {
            dispose(item);
        }
        list.clear();
        list.extend(settings.iter().map(&mut create));
        return true;
    }
    for (item, setting) in list.iter_mut().zip(settings) {
        update(item, setting);
    }
    false
}

/// Visible-index buffer feeding LOD `lod`: its own LOD bucket when LODs are
/// computed, else the culling result, else none (draw every trail).
pub fn resolve_trail_index_buffer<'a, T>(
    lod_buffers: Option<&'a [T]>,
    culling_buffer: Option<&'a T>,
    lod: usize,
) -> Option<&'a T> {
    lod_buffers
        .and_then(|buffers| buffers.get(lod))
        .or(culling_buffer)
}

/// Disposes and drops the state of every renderer missing from `extracted`
/// (despawned, or its `GpuTrailRenderer` or `GpuTrail` removed). Hidden
/// renderers are still extracted and keep their state.
pub fn release_stale_states<T>(
    states: &mut HashMap<Entity, T>,
    extracted: &[ExtractedTrailRenderer],
    mut dispose: impl FnMut(Entity, &mut T),
) {
    states.retain(|entity, state| {
        let alive = extracted.iter().any(|renderer| renderer.entity == *entity);
        if !alive {
            dispose(*entity, state);
        }
        alive
    });
}

// ==================== per renderer state =============================

/// Material of one LOD with the default shader filled in.
#[derive(Clone, Debug)]
pub struct ResolvedTrailMaterial {
    pub shader: Handle<Shader>,
    pub color: LinearRgba,
    pub passes: Vec<TrailMaterialPass>,
}

/// What the compute node records this frame, decided during prepare.
#[derive(Default)]
struct TrailFramePlan {
    active: bool,
    culling: Option<TrailIndexBuffer>,
    lod: Option<Vec<TrailIndexBuffer>>,
    update_vertex: bool,
    stereo: StereoRenderingMode,
}

impl TrailFramePlan {
    fn index_buffer(&self, lod: usize) -> Option<&TrailIndexBuffer> {
        resolve_trail_index_buffer(self.lod.as_deref(), self.culling.as_ref(), lod)
    }
}

/// Render world side of one `GpuTrailRenderer`: the trail store, one geometry
/// builder per LOD and the visibility strategies.
pub struct TrailRendererState {
    store: Option<(TrailStore, GpuTrailAppendNode)>,
    store_error: Option<TrailConfigError>,
    lod_list: Vec<LodGeometryBuilder>,
    culling: Option<Box<dyn CullingStrategy>>,
    calc_lod: Option<Box<dyn LodStrategy>>,
    materials: Vec<ResolvedTrailMaterial>,
    layers: RenderLayers,
    rendering: bool,
    plan: TrailFramePlan,
}

impl Default for TrailRendererState {
    fn default() -> Self {
        Self {
            store: None,
            store_error: None,
            lod_list: Vec::new(),
            culling: None,
            calc_lod: None,
            materials: Vec::new(),
            layers: RenderLayers::default(),
            rendering: false,
            plan: TrailFramePlan::default(),
        }
    }
}

impl TrailRendererState {
    /// Replaces the default frustum culling. The previous strategy is disposed.
    pub fn set_culling_strategy(&mut self, strategy: Box<dyn CullingStrategy>) {
        if let Some(mut old) = self.culling.replace(strategy) {
            old.dispose();
        }
    }

    /// Replaces the default distance bucketing. The previous strategy is disposed.
    pub fn set_lod_strategy(&mut self, strategy: Box<dyn LodStrategy>) {
        if let Some(mut old) = self.calc_lod.replace(strategy) {
            old.dispose();
        }
    }

    pub fn lod_list(&self) -> &[LodGeometryBuilder] {
        &self.lod_list
    }

    pub fn materials(&self) -> &[ResolvedTrailMaterial] {
        &self.materials
    }

    pub fn store(&self) -> Option<&TrailStore> {
        self.store.as_ref().map(|(store, _)| store)
    }

    /// Whether this renderer draws into views on `view_layers` this frame.
    pub fn is_drawn_by(&self, view_layers: &RenderLayers) -> bool {
        self.plan.active && self.rendering && self.layers.intersects(view_layers)
    }

    fn prepare(
        &mut self,
        ctx: &TrailPrepareContext,
        extracted: &ExtractedTrailRenderer,
        camera: Option<&TrailCamera>,
        time: f32,
        stereo: StereoRenderingMode,
        default_shader: &Handle<Shader>,
    ) {
        let config = &extracted.config;
        self.plan = TrailFramePlan {
            stereo,
            ..default()
        };
        self.layers = extracted.layers.clone();
        self.rendering = config.rendering_enable;

        sync_lod_list(
            &mut self.lod_list,
            &config.lod_settings,
            LodGeometryBuilder::dispose,
            |setting| LodGeometryBuilder::new(ctx.device, setting),
            LodGeometryBuilder::set_setting,
        );
        self.materials = (0..self.lod_list.len())
            .map(|lod| {
                let material = config.material_for(lod);
                ResolvedTrailMaterial {
                    shader: material.shader.clone().unwrap_or_else(|| default_shader.clone()),
                    color: material.color,
                    passes: material.passes.clone(),
                }
            })
            .collect();

        // trail store
        if !matches!(&self.store, Some((store, _)) if store.matches(&extracted.trail)) {
            if let Some((store, append)) = self.store.take() {
                store.destroy();
                append.destroy();
            }
            match TrailStore::new(ctx.device, ctx.layouts, &extracted.trail) {
                Ok(store) => {
                    let append = GpuTrailAppendNode::new(ctx.device, ctx.layouts, &store);
                    self.store = Some((store, append));
                    self.store_error = None;
                }
                Err(err) => {
                    if self.store_error.as_ref() != Some(&err) {
                        error!("trail store disabled: {err}");
                    }
                    self.store_error = Some(err);
                    return;
                }
            }
        }
        let Some((store, append)) = &mut self.store else {
            return;
        };
        store.write_params(ctx.queue, &extracted.trail, time);
        append.update_input_buffer(ctx.queue, &extracted.input);

        // hidden: history keeps growing, nothing else runs
        if !extracted.visible {
            return;
        }
        let Some(camera) = camera else {
            return;
        };
        self.plan.active = true;

        // visibility
        if config.culling_enable {
            let culling = self
                .culling
                .get_or_insert_with(|| Box::new(DefaultCulling::new(ctx)));
            self.plan.culling = culling.prepare(ctx, store, camera, config.culling_width());
        }
        if self.lod_list.len() > 1 {
            let distances: Vec<f32> = config.lod_settings.iter().map(|lod| lod.distance).collect();
            let calc_lod = self
                .calc_lod
                .get_or_insert_with(|| Box::new(DefaultCalcLod::new(ctx)));
            self.plan.lod = Some(calc_lod.prepare(
                ctx,
                store,
                &distances,
                camera,
                self.plan.culling.as_ref(),
            ));
        } else if let Some(calc_lod) = &mut self.calc_lod {
            calc_lod.release_buckets();
        }
        self.plan.update_vertex = config.update_vertex_enable;

        // geometry
        for (lod, builder) in self.lod_list.iter_mut().enumerate() {
            if builder
                .ensure_buffers(ctx.device, ctx.layouts, store, stereo)
                .is_err()
            {
                continue;
            }
            let index_buffer = self.plan.index_buffer(lod);

            if self.plan.update_vertex {
                builder.prepare_vertex_buffer_update(
                    ctx.device,
                    ctx.queue,
                    ctx.layouts,
                    camera,
                    config.start_width,
                    config.end_width,
                    index_buffer,
                );
            }

            match index_buffer {
                Some(_) => builder.prepare_args_buffer_update(ctx.queue, stereo),
                None => builder.reset_args_buffer(ctx.queue, stereo),
            }

            builder.prepare_render(
                ctx.queue,
                self.materials[lod].color,
                config.start_width,
                config.end_width,
                stereo,
            );
        }
    }

    /// append -> culling -> LOD buckets -> vertices -> indirect args.
    fn record(&self, pipelines: &TrailComputePipelines, encoder: &mut CommandEncoder) {
        let Some((store, append)) = &self.store else {
            return;
        };
        append.append_node(encoder, &pipelines.append, store);

        if !self.plan.active {
            return;
        }

        if self.plan.culling.is_some() {
            if let Some(culling) = &self.culling {
                culling.calc_trail_index_buffer(pipelines, encoder, store);
            }
        }
        if self.plan.lod.is_some() {
            if let Some(calc_lod) = &self.calc_lod {
                calc_lod.calc_trail_index_buffers(
                    pipelines,
                    encoder,
                    store,
                    self.plan.culling.as_ref(),
                );
            }
        }

        if self.plan.update_vertex {
            for (lod, builder) in self.lod_list.iter().enumerate() {
                builder.update_vertex_buffer(encoder, pipelines, store, self.plan.index_buffer(lod));
            }
        }

        for (lod, builder) in self.lod_list.iter().enumerate() {
            if let Some(index_buffer) = self.plan.index_buffer(lod) {
                builder.update_args_buffer(encoder, pipelines, index_buffer, self.plan.stereo);
            }
        }
    }

    pub fn dispose(&mut self) {
        for builder in &mut self.lod_list {
            builder.dispose();
        }
        self.lod_list.clear();
        if let Some(mut culling) = self.culling.take() {
            culling.dispose();
        }
        if let Some(mut calc_lod) = self.calc_lod.take() {
            calc_lod.dispose();
        }
        if let Some((store, append)) = self.store.take() {
            store.destroy();
            append.destroy();
        }
        self.plan = TrailFramePlan::default();
    }
}

// ==================== resources ======================================

/// GPU state of every live `GpuTrailRenderer`, keyed by main world entity.
#[derive(Resource, Default)]
pub struct TrailRenderStates {
    states: HashMap<Entity, TrailRendererState>,
}

impl TrailRenderStates {
    pub fn get(&self, entity: Entity) -> Option<&TrailRendererState> {
        self.states.get(&entity)
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut TrailRendererState> {
        self.states.get_mut(&entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Entity, &TrailRendererState)> {
        self.states.iter()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

// ==================== systems ========================================

pub fn prepare_trail_renderers(
    render_device: Res<RenderDevice>,
    render_queue: Res<RenderQueue>,
    layouts: Res<TrailBindGroupLayouts>,
    extracted: Res<ExtractedTrailRenderers>,
    stereo: Option<Res<StereoRenderingMode>>,
    shaders: Option<Res<GpuTrailShaders>>,
    mut states: ResMut<TrailRenderStates>,
) {
    let Some(shaders) = shaders else {
        return;
    };
    let stereo = stereo.map(|mode| *mode).unwrap_or_default();
    let ctx = TrailPrepareContext {
        device: &render_device,
        queue: &render_queue,
        layouts: &layouts,
    };

    release_stale_states(&mut states.states, &extracted.renderers, |entity, state| {
        debug!("trail renderer {entity} released");
        state.dispose();
    });

    for renderer in &extracted.renderers {
        let state = states.states.entry(renderer.entity).or_default();
        state.prepare(
            &ctx,
            renderer,
            extracted.camera.as_ref(),
            extracted.time,
            stereo,
            &shaders.draw,
        );
    }
}

// ==================== compute node ===================================

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct TrailComputePassLabel;

#[derive(Default)]
struct TrailComputeNode;

impl Node for TrailComputeNode {
    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
        world: &World,
    ) -> Result<(), NodeRunError> {
        // pipelines still compiling
        let Some(pipelines) = world.get_resource::<TrailComputePipelines>() else {
            return Ok(());
        };
        let Some(states) = world.get_resource::<TrailRenderStates>() else {
            return Ok(());
        };

        let encoder = render_context.command_encoder();
        for state in states.states.values() {
            state.record(pipelines, encoder);
        }
        Ok(())
    }
}

pub fn add_trail_compute_node_to_graph(render_app: &mut SubApp) {
    let mut graph = render_app.world_mut().resource_mut::<RenderGraph>();
    graph.add_node(TrailComputePassLabel, TrailComputeNode);
    graph.add_node_edge(TrailComputePassLabel, CameraDriverLabel);
}
