use std::borrow::Cow;

use bevy::prelude::*;
use bevy::render::extract_resource::ExtractResource;

use crate::error::{checked_buffer_len, TrailConfigError};

// ==================== materials ======================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Reflect)]
pub enum TrailBlendMode {
    #[default]
    Alpha,
    Additive,
    Opaque,
}

/// One draw per pass; the same indirect args feed every pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Reflect)]
pub struct TrailMaterialPass {
    pub vertex_entry_point: Cow<'static, str>,
    pub fragment_entry_point: Cow<'static, str>,
    pub blend: TrailBlendMode,
}

impl Default for TrailMaterialPass {
    fn default() -> Self {
        Self {
            vertex_entry_point: Cow::Borrowed("vs_main"),
            fragment_entry_point: Cow::Borrowed("fs_main"),
            blend: TrailBlendMode::Alpha,
        }
    }
}

#[derive(Debug, Clone, Reflect)]
pub struct TrailMaterial {
    /// `None` draws with `GpuTrailShaders::draw`.
    pub shader: Option<Handle<Shader>>,
    pub color: LinearRgba,
    pub passes: Vec<TrailMaterialPass>,
}

impl Default for TrailMaterial {
    fn default() -> Self {
        Self {
            shader: None,
            color: LinearRgba::WHITE,
            passes: vec![TrailMaterialPass::default()],
        }
    }
}

// ==================== renderer config ================================

#[derive(Debug, Clone, Reflect)]
pub struct LodSetting {
    /// Camera distance from which this LOD is used.
    pub distance: f32,
    /// Node steps to generate a vertex. 1: all nodes, 2: 1/2 nodes, 3: 1/3 nodes...
    pub lod_node_step: u32,
    /// Falls back to `GpuTrailRenderer::default_material`.
    pub material: Option<TrailMaterial>,
    pub debug_draw_vertex_buffer: bool,
}

impl Default for LodSetting {
    fn default() -> Self {
        Self {
            distance: 0.0,
            lod_node_step: 1,
            material: None,
            debug_draw_vertex_buffer: false,
        }
    }
}

/// Draws the trails of the `GpuTrail` on the same entity.
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
#[require(Visibility)]
pub struct GpuTrailRenderer {
    pub lod_settings: Vec<LodSetting>,
    pub default_material: TrailMaterial,
    pub start_width: f32,
    pub end_width: f32,

    // debug toggles
    pub culling_enable: bool,
    pub update_vertex_enable: bool,
    pub rendering_enable: bool,
}

impl Default for GpuTrailRenderer {
    fn default() -> Self {
        Self {
            lod_settings: Vec::new(),
            default_material: TrailMaterial::default(),
            start_width: 0.1,
            end_width: 0.1,
            culling_enable: true,
            update_vertex_enable: true,
            rendering_enable: true,
        }
    }
}

impl GpuTrailRenderer {
    pub fn with_lod(mut self, setting: LodSetting) -> Self {
        self.lod_settings.push(setting);
        self
    }

    /// Conservative width used to inflate trail bounds for culling.
    pub fn culling_width(&self) -> f32 {
        self.start_width.max(self.end_width)
    }

    pub fn material_for(&self, lod: usize) -> &TrailMaterial {
        self.lod_settings
            .get(lod)
            .and_then(|setting| setting.material.as_ref())
            .unwrap_or(&self.default_material)
    }
}

// ==================== trail store config =============================

/// Trail population backing a `GpuTrailRenderer`.
#[derive(Component, Debug, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct GpuTrail {
    pub trail_num: u32,
    pub node_num_per_trail: u32,
    /// Seconds a node stays visible.
    pub life: f32,
    /// The emitter has to move this far before a new node is appended.
    pub min_node_distance: f32,
}

impl Default for GpuTrail {
    fn default() -> Self {
        Self {
            trail_num: 1,
            node_num_per_trail: 64,
            life: 10.0,
            min_node_distance: 0.1,
        }
    }
}

impl GpuTrail {
    /// Node slots of the whole store, `trail_num * node_num_per_trail`.
    pub fn node_capacity(&self) -> Result<u32, TrailConfigError> {
        checked_buffer_len(self.trail_num, self.node_num_per_trail)
    }
}

/// Latest emitter position of every trail, written by gameplay each frame.
/// Missing entries leave their trail untouched.
#[derive(Component, Debug, Clone, Default, Reflect)]
#[reflect(Component)]
pub struct TrailInput {
    pub positions: Vec<Vec3>,
}

/// Camera used for culling, LOD distances and ribbon facing. Without one the
/// first active camera is used.
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct TrailTargetCamera;

// ==================== global resources ===============================

#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq, Default, Reflect, ExtractResource)]
#[reflect(Resource)]
pub enum StereoRenderingMode {
    #[default]
    Mono,
    /// Each instance is drawn once per eye, so instance counts are doubled.
    SinglePassInstanced,
}

impl StereoRenderingMode {
    pub fn instance_multiplier(self) -> u32 {
        match self {
            StereoRenderingMode::Mono => 1,
            StereoRenderingMode::SinglePassInstanced => 2,
        }
    }

    pub fn is_single_pass_instanced(self) -> bool {
        self == StereoRenderingMode::SinglePassInstanced
    }
}

#[derive(Resource, Debug, Clone, ExtractResource)]
pub struct GpuTrailShaders {
    pub append: Handle<Shader>,
    pub culling: Handle<Shader>,
    pub calc_lod: Handle<Shader>,
    pub update_vertex: Handle<Shader>,
    pub index_dispatch: Handle<Shader>,
    /// Default material shader.
    pub draw: Handle<Shader>,
}

impl FromWorld for GpuTrailShaders {
    fn from_world(world: &mut World) -> Self {
        let assets = world.resource::<AssetServer>();
        Self {
            append: assets.load("shaders/trail_append.wgsl"),
            culling: assets.load("shaders/trail_culling.wgsl"),
            calc_lod: assets.load("shaders/trail_calc_lod.wgsl"),
            update_vertex: assets.load("shaders/trail_update_vertex.wgsl"),
            index_dispatch: assets.load("shaders/trail_index_dispatch.wgsl"),
            draw: assets.load("shaders/trail_draw.wgsl"),
        }
    }
}
