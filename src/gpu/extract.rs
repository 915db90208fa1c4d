use bevy::prelude::*;
use bevy::render::primitives::Frustum;
use bevy::render::view::RenderLayers;
use bevy::render::Extract;

use crate::config::{GpuTrail, GpuTrailRenderer, TrailInput, TrailTargetCamera};

// ==================== camera =========================================

/// Camera driving culling, LOD distances and ribbon facing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrailCamera {
    pub position: Vec3,
    pub forward: Vec3,
    pub orthographic: bool,
    /// Inward-facing half spaces `(normal, d)`: a point `p` is inside when
    /// `normal.dot(p) + d >= 0` for all six.
    pub frustum_planes: [Vec4; 6],
}

impl TrailCamera {
    /// Orthographic cameras face every ribbon the same way; perspective ones
    /// get zero and the kernel faces each vertex toward `position` instead.
    pub fn to_camera_dir(&self) -> Vec3 {
        if self.orthographic {
            -self.forward
        } else {
            Vec3::ZERO
        }
    }

    pub fn culling_planes(&self) -> [[f32; 4]; 6] {
        self.frustum_planes.map(|plane| plane.to_array())
    }
}

pub struct CameraCandidate {
    pub order: isize,
    pub is_active: bool,
    pub targeted: bool,
    pub camera: TrailCamera,
}

/// Active `TrailTargetCamera` first, then the active camera rendering first.
pub fn pick_trail_camera(candidates: impl IntoIterator<Item = CameraCandidate>) -> Option<TrailCamera> {
    candidates
        .into_iter()
        .filter(|candidate| candidate.is_active)
        .min_by_key(|candidate| (!candidate.targeted, candidate.order))
        .map(|candidate| candidate.camera)
}

// ==================== render world copies ============================

pub struct ExtractedTrailRenderer {
    /// Main world entity, the key of the renderer's GPU state.
    pub entity: Entity,
    pub config: GpuTrailRenderer,
    pub trail: GpuTrail,
    pub input: Vec<Vec3>,
    pub layers: RenderLayers,
    /// Hidden renderers keep their trail history but skip the frame.
    pub visible: bool,
}

impl ExtractedTrailRenderer {
    pub fn new(
        entity: Entity,
        config: &GpuTrailRenderer,
        trail: &GpuTrail,
        input: Option<&TrailInput>,
        layers: Option<&RenderLayers>,
        visibility: &InheritedVisibility,
    ) -> Self {
        Self {
            entity,
            config: config.clone(),
            trail: *trail,
            input: input.map(|input| input.positions.clone()).unwrap_or_default(),
            layers: layers.cloned().unwrap_or_default(),
            visible: visibility.get(),
        }
    }
}

#[derive(Resource, Default)]
pub struct ExtractedTrailRenderers {
    pub renderers: Vec<ExtractedTrailRenderer>,
    pub camera: Option<TrailCamera>,
    /// Seconds since startup, the clock node lifetimes are measured with.
    pub time: f32,
}

pub fn extract_trail_renderers(
    mut extracted: ResMut<ExtractedTrailRenderers>,
    time: Extract<Res<Time>>,
    renderers: Extract<
        Query<(
            Entity,
            &GpuTrailRenderer,
            &GpuTrail,
            Option<&TrailInput>,
            Option<&RenderLayers>,
            &InheritedVisibility,
        )>,
    >,
    cameras: Extract<
        Query<(
            &Camera,
            &GlobalTransform,
            &Projection,
            &Frustum,
            Has<TrailTargetCamera>,
        )>,
    >,
) {
    extracted.time = time.elapsed_secs();

    extracted.renderers.clear();
    extracted.renderers.extend(renderers.iter().map(
        |(entity, config, trail, input, layers, visibility)| {
            ExtractedTrailRenderer::new(entity, config, trail, input, layers, visibility)
        },
    ));

    extracted.camera = pick_trail_camera(cameras.iter().map(
        |(camera, transform, projection, frustum, targeted)| CameraCandidate {
            order: camera.order,
            is_active: camera.is_active,
            targeted,
            camera: TrailCamera {
                position: transform.translation(),
                forward: transform.forward().as_vec3(),
                orthographic: matches!(projection, Projection::Orthographic(_)),
                frustum_planes: frustum.half_spaces.map(|half_space| half_space.normal_d()),
            },
        },
    ));
}
