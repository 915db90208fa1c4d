use std::collections::{HashMap, HashSet};

use bevy::core_pipeline::core_3d::CORE_3D_DEPTH_FORMAT;
use bevy::image::BevyDefault;
use bevy::prelude::*;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BlendComponent, BlendFactor, BlendOperation, BlendState,
    CachedPipelineState, CachedRenderPipelineId, ColorTargetState, ColorWrites, CompareFunction,
    DepthStencilState, FragmentState, MultisampleState, PipelineCache, PrimitiveState,
    RenderPipelineDescriptor, TextureFormat, VertexState,
};
use bevy::render::renderer::RenderDevice;
use bevy::render::view::{ExtractedView, Msaa, ViewTarget, ViewUniforms};

use crate::config::{TrailBlendMode, TrailMaterialPass};
use crate::gpu::buffers::TrailBindGroupLayouts;
use crate::gpu::renderer::TrailRenderStates;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TrailDrawPipelineKey {
    pub shader: AssetId<Shader>,
    pub pass: TrailMaterialPass,
    pub hdr: bool,
    pub samples: u32,
}

/// Render pipelines per (material shader, pass, view target format).
#[derive(Resource, Default)]
pub struct TrailDrawPipelines {
    ids: HashMap<TrailDrawPipelineKey, CachedRenderPipelineId>,
    reported: HashSet<CachedRenderPipelineId>,
}

impl TrailDrawPipelines {
    pub fn get(&self, key: &TrailDrawPipelineKey) -> Option<CachedRenderPipelineId> {
        self.ids.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Group 1 of every trail draw: the view uniform, dynamic offset per view.
#[derive(Resource)]
pub struct TrailViewBindGroup(pub BindGroup);

pub fn blend_state(mode: TrailBlendMode) -> Option<BlendState> {
    match mode {
        TrailBlendMode::Alpha => Some(BlendState::ALPHA_BLENDING),
        TrailBlendMode::Additive => Some(BlendState {
            color: BlendComponent {
                src_factor: BlendFactor::SrcAlpha,
                dst_factor: BlendFactor::One,
                operation: BlendOperation::Add,
            },
            alpha: BlendComponent::OVER,
        }),
        TrailBlendMode::Opaque => None,
    }
}

fn trail_draw_descriptor(
    layouts: &TrailBindGroupLayouts,
    shader: Handle<Shader>,
    key: &TrailDrawPipelineKey,
) -> RenderPipelineDescriptor {
    let format = if key.hdr {
        ViewTarget::TEXTURE_FORMAT_HDR
    } else {
        TextureFormat::bevy_default()
    };

    RenderPipelineDescriptor {
        label: Some("trail_draw_pipeline".into()),
        layout: vec![layouts.draw.clone(), layouts.view.clone()],
        push_constant_ranges: vec![],
        // no vertex buffers: vertices are fetched from storage
        vertex: VertexState {
            shader: shader.clone(),
            entry_point: key.pass.vertex_entry_point.clone(),
            shader_defs: vec![],
            buffers: vec![],
        },
        fragment: Some(FragmentState {
            shader,
            entry_point: key.pass.fragment_entry_point.clone(),
            shader_defs: vec![],
            targets: vec![Some(ColorTargetState {
                format,
                blend: blend_state(key.pass.blend),
                write_mask: ColorWrites::ALL,
            })],
        }),
        // ribbons are seen from both sides
        primitive: PrimitiveState {
            cull_mode: None,
            ..default()
        },
        depth_stencil: Some(DepthStencilState {
            format: CORE_3D_DEPTH_FORMAT,
            depth_write_enabled: key.pass.blend == TrailBlendMode::Opaque,
            depth_compare: CompareFunction::GreaterEqual,
            stencil: default(),
            bias: default(),
        }),
        multisample: MultisampleState {
            count: key.samples,
            ..default()
        },
        zero_initialize_workgroup_memory: false,
    }
}

/// Queues a pipeline for every material pass each view may draw.
pub fn queue_trail_draw_pipelines(
    cache: Res<PipelineCache>,
    layouts: Res<TrailBindGroupLayouts>,
    states: Res<TrailRenderStates>,
    views: Query<(&ExtractedView, &Msaa)>,
    mut pipelines: ResMut<TrailDrawPipelines>,
) {
    for (view, msaa) in &views {
        for (_, state) in states.iter() {
            for material in state.materials() {
                for pass in &material.passes {
                    let key = TrailDrawPipelineKey {
                        shader: material.shader.id(),
                        pass: pass.clone(),
                        hdr: view.hdr,
                        samples: msaa.samples(),
                    };
                    if pipelines.ids.contains_key(&key) {
                        continue;
                    }
                    let id = cache.queue_render_pipeline(trail_draw_descriptor(
                        &layouts,
                        material.shader.clone(),
                        &key,
                    ));
                    info!("trail draw pipeline QUEUED ({} / {})", pass.vertex_entry_point, pass.fragment_entry_point);
                    pipelines.ids.insert(key, id);
                }
            }
        }
    }

    let TrailDrawPipelines { ids, reported } = &mut *pipelines;
    for id in ids.values() {
        if reported.contains(id) {
            continue;
        }
        if let CachedPipelineState::Err(err) = cache.get_render_pipeline_state(*id) {
            error!("trail draw pipeline ERROR: {err:?}");
            reported.insert(*id);
        }
    }
}

pub fn prepare_trail_view_bind_group(
    mut commands: Commands,
    render_device: Res<RenderDevice>,
    layouts: Res<TrailBindGroupLayouts>,
    view_uniforms: Res<ViewUniforms>,
) {
    let Some(binding) = view_uniforms.uniforms.binding() else {
        return;
    };
    let bind_group = render_device.create_bind_group(
        Some("trail_view_bg"),
        &layouts.view,
        &[BindGroupEntry {
            binding: 0,
            resource: binding,
        }],
    );
    commands.insert_resource(TrailViewBindGroup(bind_group));
}
