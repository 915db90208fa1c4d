use bevy::ecs::query::QueryItem;
use bevy::prelude::*;
use bevy::render::render_graph::{NodeRunError, RenderGraphContext, RenderLabel, ViewNode};
use bevy::render::render_resource::{PipelineCache, RenderPassDescriptor, RenderPipeline, StoreOp};
use bevy::render::renderer::RenderContext;
use bevy::render::view::{
    ExtractedView, Msaa, RenderLayers, ViewDepthTexture, ViewTarget, ViewUniformOffset,
};

use crate::gpu::draw_pipeline::{TrailDrawPipelineKey, TrailDrawPipelines, TrailViewBindGroup};
use crate::gpu::lod_builder::LodGeometryBuilder;
use crate::gpu::renderer::TrailRenderStates;

#[derive(Debug, Hash, PartialEq, Eq, Clone, RenderLabel)]
pub struct TrailDrawPassLabel;

/// Draws every trail LOD visible to the view, after the transparent pass.
#[derive(Default)]
pub struct TrailDrawNode;

impl ViewNode for TrailDrawNode {
    type ViewQuery = (
        &'static ExtractedView,
        &'static ViewTarget,
        &'static ViewDepthTexture,
        &'static ViewUniformOffset,
        &'static Msaa,
        Option<&'static RenderLayers>,
    );

    fn run<'w>(
        &self,
        _graph: &mut RenderGraphContext,
        rcx: &mut RenderContext<'w>,
        (view, target, depth, view_offset, msaa, layers): QueryItem<'w, Self::ViewQuery>,
        world: &'w World,
    ) -> Result<(), NodeRunError> {
        let Some(states) = world.get_resource::<TrailRenderStates>() else {
            return Ok(());
        };
        let Some(draw_pipelines) = world.get_resource::<TrailDrawPipelines>() else {
            return Ok(());
        };
        let Some(view_bind_group) = world.get_resource::<TrailViewBindGroup>() else {
            return Ok(());
        };
        let cache = world.resource::<PipelineCache>();
        let view_layers = layers.cloned().unwrap_or_default();

        let mut draws: Vec<(&LodGeometryBuilder, Vec<&RenderPipeline>)> = Vec::new();
        for (_, state) in states.iter() {
            if !state.is_drawn_by(&view_layers) {
                continue;
            }
            for (builder, material) in state.lod_list().iter().zip(state.materials()) {
                if builder.buffers().is_none() {
                    continue;
                }
                // every pass compiled, or the LOD is skipped this frame
                let passes: Option<Vec<&RenderPipeline>> = material
                    .passes
                    .iter()
                    .map(|pass| {
                        let key = TrailDrawPipelineKey {
                            shader: material.shader.id(),
                            pass: pass.clone(),
                            hdr: view.hdr,
                            samples: msaa.samples(),
                        };
                        draw_pipelines
                            .get(&key)
                            .and_then(|id| cache.get_render_pipeline(id))
                    })
                    .collect();
                if let Some(passes) = passes {
                    draws.push((builder, passes));
                }
            }
        }
        if draws.is_empty() {
            return Ok(());
        }

        let mut pass = rcx.begin_tracked_render_pass(RenderPassDescriptor {
            label: Some("trail_draw_pass"),
            color_attachments: &[Some(target.get_color_attachment())],
            depth_stencil_attachment: Some(depth.get_attachment(StoreOp::Store)),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for (builder, passes) in &draws {
            builder.render(&mut pass, passes, &view_bind_group.0, view_offset.offset);
        }
        Ok(())
    }
}
