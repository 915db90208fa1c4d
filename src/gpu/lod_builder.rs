use bevy::prelude::*;
use bevy::render::render_phase::TrackedRenderPass;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, Buffer, BufferId, BufferInitDescriptor, BufferUsages,
    CommandEncoder, ComputePassDescriptor, IndexFormat, RenderPipeline,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};

use crate::config::{LodSetting, StereoRenderingMode};
use crate::error::TrailConfigError;
use crate::gpu::buffers::{TrailBindGroupLayouts, TrailIndexBuffer};
use crate::gpu::extract::TrailCamera;
use crate::gpu::ffi::{
    ArgsMultiplyParams, TrailDrawArgs, TrailDrawParams, TrailVertex, UpdateVertexParams,
};
use crate::gpu::index_dispatcher::{DispatchSize, IndexDispatcher};
use crate::gpu::pipeline::TrailComputePipelines;
use crate::gpu::resource_cache::{LodBufferCache, ReleaseBuffers};
use crate::gpu::trail_store::TrailStore;
use crate::lod::{build_index_pattern, LodGeometry, LodStepCheck};

// ==================== owned buffers ==================================

/// Vertex, static index and indirect args buffers of one LOD.
pub struct LodBuffers {
    pub geometry: LodGeometry,
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub args_buffer: Buffer,
}

/// Initial vertex buffer content. Never empty: zero-sized buffers can't be bound.
pub fn zeroed_vertices(geometry: &LodGeometry) -> Vec<TrailVertex> {
    vec![TrailVertex::default(); geometry.vertex_buffer_size().max(1) as usize]
}

impl LodBuffers {
    pub fn new(rd: &RenderDevice, geometry: &LodGeometry, stereo: StereoRenderingMode) -> Self {
        // 1 node to 2 vertices (left, right)
        let vertex_buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_lod_vertex_buffer"),
            contents: bytemuck::cast_slice(&zeroed_vertices(geometry)),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC,
        });

        // 1 segment to 2 triangles (6 indices)
        let mut indices = build_index_pattern(geometry.node_num_per_trail_with_lod());
        if indices.is_empty() {
            indices.push(0);
        }
        let index_buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_lod_index_buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: BufferUsages::INDEX,
        });

        let args_buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_lod_args_buffer"),
            contents: bytemuck::bytes_of(&TrailDrawArgs::reset(geometry, stereo)),
            usage: BufferUsages::INDIRECT
                | BufferUsages::STORAGE
                | BufferUsages::COPY_SRC
                | BufferUsages::COPY_DST,
        });

        Self {
            geometry: *geometry,
            vertex_buffer,
            index_buffer,
            args_buffer,
        }
    }
}

impl ReleaseBuffers for LodBuffers {
    fn release(&mut self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
        self.args_buffer.destroy();
    }
}

// ==================== builder ========================================

/// Per-LOD geometry: regenerates the ribbon vertices on the GPU every frame
/// and draws them with one indirect call per material pass.
///
/// Host-side work (allocation, uniforms, bind groups) happens in the
/// `prepare_*` methods; the others only record GPU commands.
pub struct LodGeometryBuilder {
    setting: LodSetting,
    buffers: LodBufferCache<LodBuffers>,
    dispatcher: IndexDispatcher,
    update_params_buffer: Buffer,
    draw_params_buffer: Buffer,
    multiply_params_buffer: Buffer,
    vertex_bind_group: Option<BindGroup>,
    args_multiply_bind_group: Option<BindGroup>,
    draw_bind_group: Option<BindGroup>,
    index_input: Option<(BufferId, BindGroup)>,
    // last validated geometry; the node step may change without reallocation
    geometry: Option<LodGeometry>,
    step_check: LodStepCheck,
}

impl LodGeometryBuilder {
    pub fn new(rd: &RenderDevice, setting: &LodSetting) -> Self {
        let update_params_buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_update_vertex_params"),
            contents: bytemuck::bytes_of(&UpdateVertexParams::default()),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let draw_params_buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_draw_params"),
            contents: bytemuck::bytes_of(&TrailDrawParams::default()),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });
        let multiply_params_buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_args_multiply_params"),
            contents: bytemuck::bytes_of(&ArgsMultiplyParams::default()),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        Self {
            setting: setting.clone(),
            buffers: LodBufferCache::default(),
            dispatcher: IndexDispatcher::new(rd),
            update_params_buffer,
            draw_params_buffer,
            multiply_params_buffer,
            vertex_bind_group: None,
            args_multiply_bind_group: None,
            draw_bind_group: None,
            index_input: None,
            geometry: None,
            step_check: LodStepCheck::default(),
        }
    }

    pub fn setting(&self) -> &LodSetting {
        &self.setting
    }

    /// Takes over edits of the setting. A new node step gets validated again.
    pub fn set_setting(&mut self, setting: &LodSetting) {
        if setting.lod_node_step != self.setting.lod_node_step {
            self.step_check.step_changed();
        }
        self.setting = setting.clone();
    }

    pub fn buffers(&self) -> Option<&LodBuffers> {
        if self.step_check.is_rejected() {
            return None;
        }
        self.buffers.get()
    }

    pub fn dispatcher(&self) -> &IndexDispatcher {
        &self.dispatcher
    }

    pub fn geometry(&self) -> Option<LodGeometry> {
        self.buffers().and(self.geometry)
    }

    /// (Re)allocates the buffers when the trail population or node step no
    /// longer matches them. `Ok(true)` means new buffers were created.
    pub fn ensure_buffers(
        &mut self,
        rd: &RenderDevice,
        layouts: &TrailBindGroupLayouts,
        store: &TrailStore,
        stereo: StereoRenderingMode,
    ) -> Result<bool, TrailConfigError> {
        let was_rejected = self.step_check.is_rejected();
        let geometry = match self.step_check.validate(
            store.trail_num,
            store.node_num_per_trail,
            self.setting.lod_node_step,
        ) {
            Ok(geometry) => geometry,
            Err(err) => {
                if !was_rejected {
                    error!("trail LOD disabled: {err}");
                    debug_assert!(false, "{err}");
                    self.release_buffers();
                }
                return Err(err);
            }
        };

        self.geometry = Some(geometry);
        let (buffers, reallocated) = self
            .buffers
            .ensure(&geometry, |geometry| LodBuffers::new(rd, geometry, stereo));
        if !reallocated {
            return Ok(false);
        }

        debug!(
            "trail LOD buffers allocated: {} vertices, {} indices per trail",
            geometry.vertex_buffer_size(),
            geometry.index_num_per_trail()
        );

        let vertex_bind_group = rd.create_bind_group(
            Some("trail_vertex_output_bg"),
            &layouts.vertex_output,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: buffers.vertex_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: self.update_params_buffer.as_entire_binding(),
                },
            ],
        );
        let args_multiply_bind_group = rd.create_bind_group(
            Some("trail_args_multiply_bg"),
            &layouts.args_multiply,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: buffers.args_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: self.multiply_params_buffer.as_entire_binding(),
                },
            ],
        );
        let draw_bind_group = rd.create_bind_group(
            Some("trail_draw_bg"),
            &layouts.draw,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: buffers.vertex_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: self.draw_params_buffer.as_entire_binding(),
                },
            ],
        );

        self.vertex_bind_group = Some(vertex_bind_group);
        self.args_multiply_bind_group = Some(args_multiply_bind_group);
        self.draw_bind_group = Some(draw_bind_group);
        Ok(true)
    }

    // ---------------- vertex update ----------------

    pub fn prepare_vertex_buffer_update(
        &mut self,
        rd: &RenderDevice,
        rq: &RenderQueue,
        layouts: &TrailBindGroupLayouts,
        camera: &TrailCamera,
        start_width: f32,
        end_width: f32,
        trail_index_buffer: Option<&TrailIndexBuffer>,
    ) {
        let Some(geometry) = self.geometry() else {
            return;
        };

        let params = UpdateVertexParams {
            to_camera_dir: camera.to_camera_dir().to_array(),
            start_width,
            camera_pos: camera.position.to_array(),
            end_width,
            lod_node_step: geometry.lod_node_step,
            node_num_per_trail_with_lod: geometry.node_num_per_trail_with_lod(),
            _pad: [0; 2],
        };
        rq.write_buffer(&self.update_params_buffer, 0, bytemuck::bytes_of(&params));

        if let Some(index_buffer) = trail_index_buffer {
            self.dispatcher.prepare(rd, layouts, index_buffer);
            let id = index_buffer.indices.id();
            if !matches!(&self.index_input, Some((bound, _)) if *bound == id) {
                self.index_input = Some((id, index_buffer.input_bind_group(rd, layouts)));
            }
        }
    }

    /// One thread per trail: per visible trail when `trail_index_buffer` is
    /// given (indirect, compacted into the first vertex slots), else per trail
    /// of the store. Slots of trails not processed keep last frame's vertices.
    pub fn update_vertex_buffer(
        &self,
        encoder: &mut CommandEncoder,
        pipelines: &TrailComputePipelines,
        store: &TrailStore,
        trail_index_buffer: Option<&TrailIndexBuffer>,
    ) {
        let Some(vertex_bind_group) = self.ready_bind_group(&self.vertex_bind_group) else {
            return;
        };

        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("trail_update_vertex_pass"),
            ..default()
        });

        match (trail_index_buffer, &self.index_input) {
            (Some(index_buffer), Some((_, index_bind_group))) => {
                self.dispatcher.dispatch(
                    &mut pass,
                    &pipelines.index_dispatch,
                    &pipelines.update_vertex_indexed,
                    &[store.bind_group(), vertex_bind_group, index_bind_group],
                    DispatchSize::Indirect(index_buffer),
                );
            }
            _ => {
                self.dispatcher.dispatch(
                    &mut pass,
                    &pipelines.index_dispatch,
                    &pipelines.update_vertex,
                    &[store.bind_group(), vertex_bind_group],
                    DispatchSize::Known(store.trail_num),
                );
            }
        }
    }

    // ---------------- indirect args ----------------

    pub fn prepare_args_buffer_update(&self, rq: &RenderQueue, stereo: StereoRenderingMode) {
        if !stereo.is_single_pass_instanced() || self.buffers().is_none() {
            return;
        }
        let params = ArgsMultiplyParams {
            multiplier: stereo.instance_multiplier(),
            _pad: [0; 3],
        };
        rq.write_buffer(&self.multiply_params_buffer, 0, bytemuck::bytes_of(&params));
    }

    /// Instance count := live count of `trail_index_buffer`, copied on the GPU.
    /// Single-pass instanced stereo then doubles it in place.
    pub fn update_args_buffer(
        &self,
        encoder: &mut CommandEncoder,
        pipelines: &TrailComputePipelines,
        trail_index_buffer: &TrailIndexBuffer,
        stereo: StereoRenderingMode,
    ) {
        let Some(buffers) = self.buffers() else {
            return;
        };

        trail_index_buffer.copy_count(
            encoder,
            &buffers.args_buffer,
            TrailDrawArgs::INSTANCE_COUNT_OFFSET,
        );

        // SinglePassInstanced requires the instance count to be doubled manually
        if stereo.is_single_pass_instanced() {
            let Some(bind_group) = &self.args_multiply_bind_group else {
                return;
            };
            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("trail_args_multiply_pass"),
                ..default()
            });
            pass.set_pipeline(&pipelines.args_multiply);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(1, 1, 1);
        }
    }

    /// Draw every trail: `{ index_num_per_trail, trail_num (x2 stereo), 0, 0, 0 }`.
    pub fn reset_args_buffer(&self, rq: &RenderQueue, stereo: StereoRenderingMode) {
        let Some(buffers) = self.buffers() else {
            return;
        };
        let args = TrailDrawArgs::reset(&buffers.geometry, stereo);
        rq.write_buffer(&buffers.args_buffer, 0, bytemuck::bytes_of(&args));
    }

    // ---------------- draw ----------------

    pub fn prepare_render(
        &self,
        rq: &RenderQueue,
        color: LinearRgba,
        start_width: f32,
        end_width: f32,
        stereo: StereoRenderingMode,
    ) {
        let Some(geometry) = self.geometry() else {
            return;
        };
        let params = TrailDrawParams {
            color: color.to_f32_array(),
            start_width,
            end_width,
            vertex_num_per_trail: geometry.vertex_num_per_trail(),
            instance_divisor: stereo.instance_multiplier(),
        };
        rq.write_buffer(&self.draw_params_buffer, 0, bytemuck::bytes_of(&params));
    }

    /// One indirect draw per material pass. Vertex fetch is procedural: the
    /// shader derives trail and node from `instance_index` and `vertex_index`.
    pub fn render<'w>(
        &'w self,
        pass: &mut TrackedRenderPass<'w>,
        material_passes: &[&'w RenderPipeline],
        view_bind_group: &'w BindGroup,
        view_offset: u32,
    ) {
        let (Some(buffers), Some(draw_bind_group)) = (self.buffers(), &self.draw_bind_group) else {
            return;
        };

        for pipeline in material_passes {
            pass.set_render_pipeline(pipeline);
            pass.set_bind_group(0, draw_bind_group, &[]);
            pass.set_bind_group(1, view_bind_group, &[view_offset]);
            pass.set_index_buffer(buffers.index_buffer.slice(..), 0, IndexFormat::Uint32);
            pass.draw_indexed_indirect(&buffers.args_buffer, 0);
        }
    }

    // ---------------- lifecycle ----------------

    fn ready_bind_group<'a>(&self, bind_group: &'a Option<BindGroup>) -> Option<&'a BindGroup> {
        self.buffers()?;
        bind_group.as_ref()
    }

    fn release_buffers(&mut self) {
        self.buffers.release();
        self.geometry = None;
        self.vertex_bind_group = None;
        self.args_multiply_bind_group = None;
        self.draw_bind_group = None;
    }

    pub fn dispose(&mut self) {
        self.release_buffers();
        self.index_input = None;
        self.dispatcher.destroy();
        self.update_params_buffer.destroy();
        self.draw_params_buffer.destroy();
        self.multiply_params_buffer.destroy();
    }

    #[cfg(feature = "debug-readback")]
    pub fn read_vertex_buffer(&self, rd: &RenderDevice, rq: &RenderQueue) -> Option<Vec<TrailVertex>> {
        crate::gpu::readback::read_buffer(rd, rq, &self.buffers()?.vertex_buffer)
    }
}
