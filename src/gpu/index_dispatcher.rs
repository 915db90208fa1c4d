use bevy::prelude::*;
use bevy::render::render_resource::{
    BindGroup, BindGroupEntry, Buffer, BufferId, BufferInitDescriptor, BufferUsages, ComputePass,
    ComputePipeline,
};
use bevy::render::renderer::RenderDevice;

use crate::gpu::buffers::{TrailBindGroupLayouts, TrailIndexBuffer};
use crate::gpu::ffi::{workgroup_count, DispatchIndirectArgs};

/// How many threads a kernel needs.
#[derive(Clone, Copy)]
pub enum DispatchSize<'a> {
    /// Host-known thread count, dispatched directly.
    Known(u32),
    /// One thread per live element; the count never leaves the GPU.
    Indirect(&'a TrailIndexBuffer),
}

/// Dispatches kernels sized by a host integer or by the live count of a
/// `TrailIndexBuffer`. The indirect path runs a one-thread kernel turning the
/// count into workgroup counts, then `dispatch_workgroups_indirect`.
pub struct IndexDispatcher {
    args_buffer: Buffer,
    bind_group: Option<(BufferId, BindGroup)>,
}

impl IndexDispatcher {
    pub fn new(rd: &RenderDevice) -> Self {
        let args_buffer = rd.create_buffer_with_data(&BufferInitDescriptor {
            label: Some("trail_dispatch_args"),
            contents: bytemuck::bytes_of(&DispatchIndirectArgs::default()),
            usage: BufferUsages::STORAGE | BufferUsages::INDIRECT | BufferUsages::COPY_SRC,
        });
        Self {
            args_buffer,
            bind_group: None,
        }
    }

    /// Binds `source` for the next indirect dispatch. Cheap when unchanged.
    pub fn prepare(&mut self, rd: &RenderDevice, layouts: &TrailBindGroupLayouts, source: &TrailIndexBuffer) {
        let id = source.count.id();
        if matches!(&self.bind_group, Some((bound, _)) if *bound == id) {
            return;
        }
        let bind_group = rd.create_bind_group(
            Some("trail_index_dispatch_bg"),
            &layouts.dispatch,
            &[
                BindGroupEntry {
                    binding: 0,
                    resource: source.count.as_entire_binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: self.args_buffer.as_entire_binding(),
                },
            ],
        );
        self.bind_group = Some((id, bind_group));
    }

    /// `bind_groups` are set at groups 0.. for `kernel`.
    pub fn dispatch(
        &self,
        pass: &mut ComputePass<'_>,
        calc_args: &ComputePipeline,
        kernel: &ComputePipeline,
        bind_groups: &[&BindGroup],
        size: DispatchSize,
    ) {
        match size {
            DispatchSize::Known(threads) => {
                if threads == 0 {
                    return;
                }
                set_kernel(pass, kernel, bind_groups);
                pass.dispatch_workgroups(workgroup_count(threads), 1, 1);
            }
            DispatchSize::Indirect(source) => {
                let Some((bound, dispatch_bg)) = &self.bind_group else {
                    warn!("indirect dispatch skipped: dispatcher was never prepared");
                    return;
                };
                if *bound != source.count.id() {
                    warn!("indirect dispatch skipped: dispatcher prepared for another index buffer");
                    return;
                }
                pass.set_pipeline(calc_args);
                pass.set_bind_group(0, dispatch_bg, &[]);
                pass.dispatch_workgroups(1, 1, 1);

                set_kernel(pass, kernel, bind_groups);
                pass.dispatch_workgroups_indirect(&self.args_buffer, 0);
            }
        }
    }

    /// `DispatchIndirectArgs` written by the last indirect dispatch.
    pub fn args_buffer(&self) -> &Buffer {
        &self.args_buffer
    }

    pub fn destroy(&self) {
        self.args_buffer.destroy();
    }
}

fn set_kernel(pass: &mut ComputePass<'_>, kernel: &ComputePipeline, bind_groups: &[&BindGroup]) {
    pass.set_pipeline(kernel);
    for (index, bind_group) in bind_groups.iter().enumerate() {
        pass.set_bind_group(index as u32, *bind_group, &[]);
    }
}
