use bevy::prelude::*;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, Buffer, BufferInitDescriptor, BufferUsages, CommandEncoder,
    ComputePassDescriptor, ComputePipeline,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};

use crate::config::GpuTrail;
use crate::error::TrailConfigError;
use crate::gpu::buffers::TrailBindGroupLayouts;
use crate::gpu::ffi::{workgroup_count, GpuInputNode, GpuTrailNode, GpuTrailState, TrailParams};

/// Ring-buffer slot the `write_count`-th node of a trail lands in.
pub fn node_slot(trail_index: u32, write_count: u32, node_num_per_trail: u32) -> u32 {
    trail_index * node_num_per_trail + write_count % node_num_per_trail
}

// ==================== store ==========================================

/// GPU-resident trail history shared by every LOD of one renderer.
/// Read-only for everything but `GpuTrailAppendNode`.
pub struct TrailStore {
    pub trail_num: u32,
    pub node_num_per_trail: u32,
    pub trail_buffer: Buffer,
    pub node_buffer: Buffer,
    pub params_buffer: Buffer,
    bind_group: BindGroup,
}

impl TrailStore {
    pub fn new(
        rd: &RenderDevice,
        layouts: &TrailBindGroupLayouts,
        config: &GpuTrail,
    ) -> Result<Self, TrailConfigError> {
        let trail_num = config.trail_num;
        let node_num_per_trail = config.node_num_per_trail;
        let node_capacity = config.node_capacity()?;

        let trails = vec![GpuTrailState::default(); trail_num.max(1) as usize];
        let trail_buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_buffer"),
            contents: bytemuck::cast_slice(&trails),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        });

        let nodes = vec![GpuTrailNode::default(); node_capacity.max(1) as usize];
        let node_buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_node_buffer"),
            contents: bytemuck::cast_slice(&nodes),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        });

        let params_buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_params"),
            contents: bytemuck::bytes_of(&TrailParams::default()),
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        });

        let bind_group = rd.create_bind_group(
            Some("trail_store_bg"),
            &layouts.trail,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: params_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: trail_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: node_buffer.as_entire_binding(),
                },
            ],
        );

        debug!(
            "trail store allocated: {} trails x {} nodes",
            trail_num, node_num_per_trail
        );

        Ok(Self {
            trail_num,
            node_num_per_trail,
            trail_buffer,
            node_buffer,
            params_buffer,
            bind_group,
        })
    }

    pub fn matches(&self, config: &GpuTrail) -> bool {
        self.trail_num == config.trail_num && self.node_num_per_trail == config.node_num_per_trail
    }

    pub fn write_params(&self, rq: &RenderQueue, config: &GpuTrail, time: f32) {
        let params = TrailParams {
            trail_num: self.trail_num,
            node_num_per_trail: self.node_num_per_trail,
            life: config.life,
            time,
            min_node_distance: config.min_node_distance,
            _pad: [0; 3],
        };
        rq.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&params));
    }

    /// Group 0 of every kernel reading trails.
    pub fn bind_group(&self) -> &BindGroup {
        &self.bind_group
    }

    pub fn destroy(&self) {
        self.trail_buffer.destroy();
        self.node_buffer.destroy();
        self.params_buffer.destroy();
    }
}

// ==================== append =========================================

/// Appends at most one node per trail per frame from the latest emitter
/// positions.
pub struct GpuTrailAppendNode {
    input_buffer: Buffer,
    bind_group: BindGroup,
    staging: Vec<GpuInputNode>,
}

impl GpuTrailAppendNode {
    pub fn new(rd: &RenderDevice, layouts: &TrailBindGroupLayouts, store: &TrailStore) -> Self {
        let staging = vec![GpuInputNode::default(); store.trail_num.max(1) as usize];
        let input_buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_input_buffer"),
            contents: bytemuck::cast_slice(&staging),
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
        });

        let bind_group = rd.create_bind_group(
            Some("trail_append_bg"),
            &layouts.append,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: store.params_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: store.trail_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: store.node_buffer.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 3,
                    resource: input_buffer.as_entire_binding(),
                },
            ],
        );

        Self {
            input_buffer,
            bind_group,
            staging,
        }
    }

    /// Uploads this frame's samples. Trails without a sample are skipped by the kernel.
    pub fn update_input_buffer(&mut self, rq: &RenderQueue, positions: &[Vec3]) {
        for (i, input) in self.staging.iter_mut().enumerate() {
            *input = match positions.get(i) {
                Some(pos) => GpuInputNode {
                    pos: pos.to_array(),
                    enabled: 1,
                },
                None => GpuInputNode::default(),
            };
        }
        rq.write_buffer(&self.input_buffer, 0, bytemuck::cast_slice(&self.staging));
    }

    pub fn append_node(&self, encoder: &mut CommandEncoder, pipeline: &ComputePipeline, store: &TrailStore) {
        if store.trail_num == 0 {
            return;
        }
        let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
            label: Some("trail_append_pass"),
            ..default()
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(workgroup_count(store.trail_num), 1, 1);
    }

    pub fn destroy(&self) {
        self.input_buffer.destroy();
    }
}
