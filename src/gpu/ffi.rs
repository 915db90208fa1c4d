//! Plain-old-data mirrors of the WGSL structs. Field order and padding must
//! match the shaders under `assets/shaders/`.

use bytemuck::{Pod, Zeroable};

use crate::config::StereoRenderingMode;
use crate::lod::LodGeometry;

pub const WORKGROUP_SIZE: u32 = 64;

pub fn workgroup_count(threads: u32) -> u32 {
    threads.div_ceil(WORKGROUP_SIZE)
}

// ---------------- trail store ----------------

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuTrailState {
    pub total_input_num: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuTrailNode {
    pub pos: [f32; 3],
    pub time: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuInputNode {
    pub pos: [f32; 3],
    pub enabled: u32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct TrailParams {
    pub trail_num: u32,
    pub node_num_per_trail: u32,
    pub life: f32,
    pub time: f32,
    pub min_node_distance: f32,
    pub _pad: [u32; 3],
}

// ---------------- geometry ----------------

/// One ribbon edge vertex. `uv_x` runs 0 (newest node) to 1 (oldest).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TrailVertex {
    pub pos: [f32; 3],
    pub uv_x: f32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct UpdateVertexParams {
    /// Zero for perspective cameras: the kernel faces every vertex toward `camera_pos`.
    pub to_camera_dir: [f32; 3],
    pub start_width: f32,
    pub camera_pos: [f32; 3],
    pub end_width: f32,
    pub lod_node_step: u32,
    pub node_num_per_trail_with_lod: u32,
    pub _pad: [u32; 2],
}

// ---------------- index providers ----------------

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CullingParams {
    /// Inward-facing frustum half spaces as `(normal, d)`.
    pub planes: [[f32; 4]; 6],
    pub width: f32,
    pub _pad: [f32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CalcLodParams {
    pub camera_pos: [f32; 3],
    pub min_distance: f32,
    pub max_distance: f32,
    pub _pad: [f32; 3],
}

// ---------------- indirect args ----------------

/// Layout expected by `draw_indexed_indirect`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TrailDrawArgs {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl TrailDrawArgs {
    /// Byte offset the live count of a visible-index buffer is copied to.
    pub const INSTANCE_COUNT_OFFSET: u64 = std::mem::offset_of!(TrailDrawArgs, instance_count) as u64;

    /// Draw every trail, unfiltered.
    pub fn reset(geometry: &LodGeometry, stereo: StereoRenderingMode) -> Self {
        Self {
            index_count: geometry.index_num_per_trail(),
            instance_count: geometry.trail_num * stereo.instance_multiplier(),
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }
}

/// Layout expected by `dispatch_workgroups_indirect`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchIndirectArgs {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl Default for DispatchIndirectArgs {
    fn default() -> Self {
        Self { x: 0, y: 1, z: 1 }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ArgsMultiplyParams {
    pub multiplier: u32,
    pub _pad: [u32; 3],
}

// ---------------- draw ----------------

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct TrailDrawParams {
    pub color: [f32; 4],
    pub start_width: f32,
    pub end_width: f32,
    pub vertex_num_per_trail: u32,
    /// 2 under single-pass stereo: both eyes share one vertex slot.
    pub instance_divisor: u32,
}

const _: () = assert!(std::mem::size_of::<TrailParams>() == 32);
const _: () = assert!(std::mem::size_of::<UpdateVertexParams>() == 48);
const _: () = assert!(std::mem::size_of::<CullingParams>() == 112);
const _: () = assert!(std::mem::size_of::<CalcLodParams>() == 32);
const _: () = assert!(std::mem::size_of::<TrailDrawArgs>() == 20);
const _: () = assert!(std::mem::size_of::<TrailDrawParams>() == 32);
