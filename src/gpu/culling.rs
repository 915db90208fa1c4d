use bevy::prelude::*;
use bevy::render::render_resource::{
    BindGroup, Buffer, BufferInitDescriptor, BufferUsages, CommandEncoder, ComputePassDescriptor,
};

use crate::gpu::buffers::TrailIndexBuffer;
use crate::gpu::extract::TrailCamera;
use crate::gpu::ffi::{workgroup_count, CullingParams};
use crate::gpu::pipeline::{TrailComputePipelines, TrailPrepareContext};
use crate::gpu::trail_store::TrailStore;

/// Produces the visible-index buffer of a renderer. Swappable per renderer
/// through `TrailRendererState::set_culling_strategy`.
pub trait CullingStrategy: Send + Sync + 'static {
    /// Host-side work for this frame. The returned buffer is filled by
    /// `calc_trail_index_buffer`; `None` means "no culling this frame".
    fn prepare(
        &mut self,
        ctx: &TrailPrepareContext,
        store: &TrailStore,
        camera: &TrailCamera,
        width: f32,
    ) -> Option<TrailIndexBuffer>;

    /// Records the GPU work filling the buffer returned by `prepare`.
    fn calc_trail_index_buffer(
        &self,
        pipelines: &TrailComputePipelines,
        encoder: &mut CommandEncoder,
        store: &TrailStore,
    );

    fn dispose(&mut self);
}

/// Frustum test of every trail's node bounds, inflated by the ribbon width.
pub struct DefaultCulling {
    params_buffer: Buffer,
    output: Option<(TrailIndexBuffer, BindGroup)>,
    trail_num: u32,
}

impl DefaultCulling {
    pub fn new(ctx: &TrailPrepareContext) -> Self {
        let params_buffer = ctx.device.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_culling_params"),
            contents: bytemuck::bytes_of(&CullingParams::default()),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        Self {
            params_buffer,
            output: None,
            trail_num: 0,
        }
    }
}

impl CullingStrategy for DefaultCulling {
    fn prepare(
        &mut self,
        ctx: &TrailPrepareContext,
        store: &TrailStore,
        camera: &TrailCamera,
        width: f32,
    ) -> Option<TrailIndexBuffer> {
        if !matches!(&self.output, Some((buffer, _)) if buffer.capacity == store.trail_num) {
            if let Some((old, _)) = self.output.take() {
                old.destroy();
            }
            let buffer = TrailIndexBuffer::new(ctx.device, "trail_culling", store.trail_num);
            let bind_group = buffer.output_bind_group(ctx.device, ctx.layouts, &self.params_buffer);
            self.output = Some((buffer, bind_group));
        }
        self.trail_num = store.trail_num;

        let params = CullingParams {
            planes: camera.culling_planes(),
            width,
            _pad: [0.0; 3],
        };
        ctx.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));

        self.output.as_ref().map(|(buffer, _)| buffer.clone())
    }

    fn calc_trail_index_buffer(
        &self,
        pipelines: &TrailComputePipelines,
        encoder: &mut CommandEncoder,
        store: &TrailStore,
    ) {
        let Some((buffer, bind_group)) = &self.output else {
            return;
        };
        buffer.clear_count(encoder);
        if self.trail_num == 0 {
            return;
        }

        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("trail_culling_pass"),
            ..default()
        });
        pass.set_pipeline(&pipelines.culling);
        pass.set_bind_group(0, store.bind_group(), &[]);
        pass.set_bind_group(1, bind_group, &[]);
        pass.dispatch_workgroups(workgroup_count(self.trail_num), 1, 1);
    }

    fn dispose(&mut self) {
        if let Some((buffer, _)) = self.output.take() {
            buffer.destroy();
        }
        self.params_buffer.destroy();
    }
}
