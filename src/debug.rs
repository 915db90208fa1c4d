//! Vertex buffer visualization for `LodSetting::debug_draw_vertex_buffer`.
//! The GPU readback is only compiled with the `debug-readback` feature.

use bevy::prelude::*;

use crate::gpu::ffi::TrailVertex;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DebugLine {
    pub start: Vec3,
    pub end: Vec3,
    pub color: Color,
}

/// One line per left/right vertex pair: first pair red, last green (wins
/// for a single pair), the rest yellow.
pub fn vertex_rung_lines(vertices: &[TrailVertex]) -> Vec<DebugLine> {
    let rungs = vertices.len() / 2;
    vertices
        .chunks_exact(2)
        .enumerate()
        .map(|(i, pair)| {
            let color = if i == rungs - 1 {
                Color::srgb(0.0, 1.0, 0.0)
            } else if i == 0 {
                Color::srgb(1.0, 0.0, 0.0)
            } else {
                Color::srgb(1.0, 0.92, 0.016)
            };
            DebugLine {
                start: Vec3::from_array(pair[0].pos),
                end: Vec3::from_array(pair[1].pos),
                color,
            }
        })
        .collect()
}

#[cfg(feature = "debug-readback")]
pub use readback::{TrailDebugDrawPlugin, TrailDebugLines};

#[cfg(feature = "debug-readback")]
mod readback {
    use std::sync::{Arc, Mutex};

    use bevy::prelude::*;
    use bevy::render::renderer::{RenderDevice, RenderQueue};
    use bevy::render::{Render, RenderApp, RenderSet};

    use super::{vertex_rung_lines, DebugLine};
    use crate::gpu::renderer::TrailRenderStates;

    /// Lines read back by the render world, drawn by the main world next frame.
    #[derive(Resource, Clone, Default)]
    pub struct TrailDebugLines(pub Arc<Mutex<Vec<DebugLine>>>);

    // blocks on the GPU every frame a flagged LOD exists
    fn readback_trail_debug_vertices(
        render_device: Res<RenderDevice>,
        render_queue: Res<RenderQueue>,
        states: Res<TrailRenderStates>,
        lines: Res<TrailDebugLines>,
    ) {
        let mut collected = Vec::new();
        for (_, state) in states.iter() {
            for builder in state.lod_list() {
                if !builder.setting().debug_draw_vertex_buffer {
                    continue;
                }
                if let Some(vertices) = builder.read_vertex_buffer(&render_device, &render_queue) {
                    collected.extend(vertex_rung_lines(&vertices));
                }
            }
        }
        match lines.0.lock() {
            Ok(mut shared) => *shared = collected,
            Err(_) => warn!("trail debug lines poisoned"),
        }
    }

    fn draw_trail_debug_gizmos(mut gizmos: Gizmos, lines: Res<TrailDebugLines>) {
        let Ok(shared) = lines.0.lock() else {
            return;
        };
        for line in shared.iter() {
            gizmos.line(line.start, line.end, line.color);
        }
    }

    pub struct TrailDebugDrawPlugin;

    impl Plugin for TrailDebugDrawPlugin {
        fn build(&self, app: &mut App) {
            let lines = TrailDebugLines::default();
            app.insert_resource(lines.clone())
                .add_systems(Update, draw_trail_debug_gizmos);

            let Some(render_app) = app.get_sub_app_mut(RenderApp) else {
                return;
            };
            render_app
                .insert_resource(lines)
                .add_systems(Render, readback_trail_debug_vertices.in_set(RenderSet::Cleanup));
        }
    }
}
