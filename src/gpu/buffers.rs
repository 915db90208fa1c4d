use bevy::prelude::*;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, BindGroupLayout, BindGroupLayoutEntry, BindingType, Buffer,
    BufferBindingType, BufferDescriptor, BufferUsages, CommandEncoder, ShaderStages, ShaderType,
};
use bevy::render::renderer::RenderDevice;
use bevy::render::view::ViewUniform;

// ==================== layouts ========================================

/* Group layout of every trail kernel:
   trail kernels:     0 = trail store (read),  1 = output,         2 = index input
   append kernel:     0 = trail store (rw)
   dispatch helpers:  0 = own layout
   draw:              0 = vertices + draw params, 1 = view uniform */
#[derive(Resource, Clone)]
pub struct TrailBindGroupLayouts {
    pub trail: BindGroupLayout,
    pub append: BindGroupLayout,
    pub vertex_output: BindGroupLayout,
    pub index_output: BindGroupLayout,
    pub index_input: BindGroupLayout,
    pub dispatch: BindGroupLayout,
    pub args_multiply: BindGroupLayout,
    pub draw: BindGroupLayout,
    pub view: BindGroupLayout,
}

fn storage_entry(binding: u32, read_only: bool, visibility: ShaderStages) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32, visibility: ShaderStages) -> BindGroupLayoutEntry {
    BindGroupLayoutEntry {
        binding,
        visibility,
        ty: BindingType::Buffer {
            ty: BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl FromWorld for TrailBindGroupLayouts {
    fn from_world(world: &mut World) -> Self {
        let rd = world.resource::<RenderDevice>();
        let cs = ShaderStages::COMPUTE;

        // binding 0: TrailParams, 1: trails, 2: nodes
        let trail = rd.create_bind_group_layout(
            Some("trail_store_bgl"),
            &[uniform_entry(0, cs), storage_entry(1, true, cs), storage_entry(2, true, cs)],
        );
        // same as above but writable, plus 3: input nodes
        let append = rd.create_bind_group_layout(
            Some("trail_append_bgl"),
            &[
                uniform_entry(0, cs),
                storage_entry(1, false, cs),
                storage_entry(2, false, cs),
                storage_entry(3, true, cs),
            ],
        );
        // binding 0: vertices, 1: UpdateVertexParams
        let vertex_output = rd.create_bind_group_layout(
            Some("trail_vertex_output_bgl"),
            &[storage_entry(0, false, cs), uniform_entry(1, cs)],
        );
        // binding 0: indices, 1: count (atomic), 2: provider params
        let index_output = rd.create_bind_group_layout(
            Some("trail_index_output_bgl"),
            &[storage_entry(0, false, cs), storage_entry(1, false, cs), uniform_entry(2, cs)],
        );
        // binding 0: indices, 1: count
        let index_input = rd.create_bind_group_layout(
            Some("trail_index_input_bgl"),
            &[storage_entry(0, true, cs), storage_entry(1, true, cs)],
        );
        // binding 0: count, 1: dispatch args
        let dispatch = rd.create_bind_group_layout(
            Some("trail_index_dispatch_bgl"),
            &[storage_entry(0, true, cs), storage_entry(1, false, cs)],
        );
        // binding 0: draw args, 1: ArgsMultiplyParams
        let args_multiply = rd.create_bind_group_layout(
            Some("trail_args_multiply_bgl"),
            &[storage_entry(0, false, cs), uniform_entry(1, cs)],
        );
        // binding 0: vertices (vertex fetch), 1: TrailDrawParams
        let draw = rd.create_bind_group_layout(
            Some("trail_draw_bgl"),
            &[
                storage_entry(0, true, ShaderStages::VERTEX),
                uniform_entry(1, ShaderStages::VERTEX | ShaderStages::FRAGMENT),
            ],
        );
        let view = rd.create_bind_group_layout(
            Some("trail_view_bgl"),
            &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: Some(ViewUniform::min_size()),
                },
                count: None,
            }],
        );

        Self {
            trail,
            append,
            vertex_output,
            index_output,
            index_input,
            dispatch,
            args_multiply,
            draw,
            view,
        }
    }
}

// ==================== visible-index buffers ==========================

/// GPU list of trail indices that passed a filter. The live element count
/// sits in `count` and is never read back: it can only feed GPU-side copies
/// (`copy_count`) and indirect dispatches (`IndexDispatcher`).
#[derive(Clone)]
pub struct TrailIndexBuffer {
    pub indices: Buffer,
    pub count: Buffer,
    pub capacity: u32,
}

impl TrailIndexBuffer {
    pub fn new(rd: &RenderDevice, label: &str, capacity: u32) -> Self {
        let indices = rd.create_buffer(&BufferDescriptor {
            label: Some(&format!("{label}_indices")),
            size: (capacity.max(1) as usize * std::mem::size_of::<u32>()) as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let count = rd.create_buffer(&BufferDescriptor {
            label: Some(&format!("{label}_count")),
            size: std::mem::size_of::<u32>() as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_SRC | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            indices,
            count,
            capacity,
        }
    }

    /// Must be recorded before the pass that appends into this buffer.
    pub fn clear_count(&self, encoder: &mut CommandEncoder) {
        encoder.clear_buffer(&self.count, 0, None);
    }

    /// GPU-to-GPU copy of the live count into `dst` at `dst_offset`.
    pub fn copy_count(&self, encoder: &mut CommandEncoder, dst: &Buffer, dst_offset: u64) {
        encoder.copy_buffer_to_buffer(
            &self.count,
            0,
            dst,
            dst_offset,
            std::mem::size_of::<u32>() as u64,
        );
    }

    /// Read-only view for kernels consuming this buffer (index input group).
    pub fn input_bind_group(&self, rd: &RenderDevice, layouts: &TrailBindGroupLayouts) -> BindGroup {
        rd.create_bind_group(
            Some("trail_index_input_bg"),
            &layouts.index_input,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: self.indices.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: self.count.as_entire_binding(),
                },
            ],
        )
    }

    /// Writable view for the provider filling this buffer.
    pub fn output_bind_group(
        &self,
        rd: &RenderDevice,
        layouts: &TrailBindGroupLayouts,
        params: &Buffer,
    ) -> BindGroup {
        rd.create_bind_group(
            Some("trail_index_output_bg"),
            &layouts.index_output,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: self.indices.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: self.count.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        )
    }

    pub fn destroy(&self) {
        self.indices.destroy();
        self.count.destroy();
    }
}
