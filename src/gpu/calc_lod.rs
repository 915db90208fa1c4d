use bevy::prelude::*;
use bevy::render::render_resource::{
    BindGroup, Buffer, BufferId, BufferInitDescriptor, BufferUsages, CommandEncoder,
    ComputePassDescriptor,
};

use crate::gpu::buffers::TrailIndexBuffer;
use crate::gpu::extract::TrailCamera;
use crate::gpu::ffi::CalcLodParams;
use crate::gpu::index_dispatcher::{DispatchSize, IndexDispatcher};
use crate::gpu::pipeline::{TrailComputePipelines, TrailPrepareContext};
use crate::gpu::trail_store::TrailStore;
use crate::lod::lod_distance_ranges;

/// Splits trails into one visible-index buffer per LOD distance threshold.
pub trait LodStrategy: Send + Sync + 'static {
    /// One buffer per entry of `distances`, in the same order. `input`
    /// restricts the candidates (usually the culling result).
    fn prepare(
        &mut self,
        ctx: &TrailPrepareContext,
        store: &TrailStore,
        distances: &[f32],
        camera: &TrailCamera,
        input: Option<&TrailIndexBuffer>,
    ) -> Vec<TrailIndexBuffer>;

    fn calc_trail_index_buffers(
        &self,
        pipelines: &TrailComputePipelines,
        encoder: &mut CommandEncoder,
        store: &TrailStore,
        input: Option<&TrailIndexBuffer>,
    );

    /// Frees per-bucket buffers while LODs are not computed; the next
    /// `prepare` reallocates them.
    fn release_buckets(&mut self) {}

    fn dispose(&mut self);
}

struct LodBucket {
    index_buffer: TrailIndexBuffer,
    params_buffer: Buffer,
    output_bind_group: BindGroup,
}

impl LodBucket {
    fn destroy(&self) {
        self.index_buffer.destroy();
        self.params_buffer.destroy();
    }
}

/// Buckets trails by the camera distance of their newest node.
/// A trail lands in bucket `i` when `distances[i] <= d < distances[i + 1]`.
pub struct DefaultCalcLod {
    buckets: Vec<LodBucket>,
    input: Option<(BufferId, BindGroup)>,
    dispatcher: IndexDispatcher,
    trail_num: u32,
}

impl DefaultCalcLod {
    pub fn new(ctx: &TrailPrepareContext) -> Self {
        Self {
            buckets: Vec::new(),
            input: None,
            dispatcher: IndexDispatcher::new(ctx.device),
            trail_num: 0,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn destroy_buckets(&mut self) {
        for bucket in self.buckets.drain(..) {
            bucket.destroy();
        }
    }
}

impl LodStrategy for DefaultCalcLod {
    fn prepare(
        &mut self,
        ctx: &TrailPrepareContext,
        store: &TrailStore,
        distances: &[f32],
        camera: &TrailCamera,
        input: Option<&TrailIndexBuffer>,
    ) -> Vec<TrailIndexBuffer> {
        if self.buckets.len() != distances.len() || self.trail_num != store.trail_num {
            self.destroy_buckets();
            self.trail_num = store.trail_num;
            for i in 0..distances.len() {
                let index_buffer =
                    TrailIndexBuffer::new(ctx.device, &format!("trail_lod{i}"), store.trail_num);
                let params_buffer = ctx.device.create_buffer_with_data(&BufferInitDescriptor {
                    label: Some("trail_calc_lod_params"),
                    contents: bytemuck::bytes_of(&CalcLodParams::default()),
                    usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
                });
                let output_bind_group =
                    index_buffer.output_bind_group(ctx.device, ctx.layouts, &params_buffer);
                self.buckets.push(LodBucket {
                    index_buffer,
                    params_buffer,
                    output_bind_group,
                });
            }
        }

        for (bucket, (min_distance, max_distance)) in
            self.buckets.iter().zip(lod_distance_ranges(distances))
        {
            let params = CalcLodParams {
                camera_pos: camera.position.to_array(),
                min_distance,
                max_distance,
                _pad: [0.0; 3],
            };
            ctx.queue
                .write_buffer(&bucket.params_buffer, 0, bytemuck::bytes_of(&params));
        }

        match input {
            Some(input) => {
                self.dispatcher.prepare(ctx.device, ctx.layouts, input);
                let id = input.indices.id();
                if !matches!(&self.input, Some((bound, _)) if *bound == id) {
                    self.input = Some((id, input.input_bind_group(ctx.device, ctx.layouts)));
                }
            }
            None => self.input = None,
        }

        self.buckets
            .iter()
            .map(|bucket| bucket.index_buffer.clone())
            .collect()
    }

    fn calc_trail_index_buffers(
        &self,
        pipelines: &TrailComputePipelines,
        encoder: &mut CommandEncoder,
        store: &TrailStore,
        input: Option<&TrailIndexBuffer>,
    ) {
        if self.buckets.is_empty() {
            return;
        }
        for bucket in &self.buckets {
            bucket.index_buffer.clear_count(encoder);
        }

        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("trail_calc_lod_pass"),
            ..default()
        });
        for bucket in &self.buckets {
            match (input, &self.input) {
                (Some(input), Some((_, input_bind_group))) => self.dispatcher.dispatch(
                    &mut pass,
                    &pipelines.index_dispatch,
                    &pipelines.calc_lod_indexed,
                    &[store.bind_group(), &bucket.output_bind_group, input_bind_group],
                    DispatchSize::Indirect(input),
                ),
                _ => self.dispatcher.dispatch(
                    &mut pass,
                    &pipelines.index_dispatch,
                    &pipelines.calc_lod,
                    &[store.bind_group(), &bucket.output_bind_group],
                    DispatchSize::Known(self.trail_num),
                ),
            }
        }
    }

    fn release_buckets(&mut self) {
        self.destroy_buckets();
        self.input = None;
    }

    fn dispose(&mut self) {
        self.destroy_buckets();
        self.input = None;
        self.dispatcher.destroy();
    }
}
