use bevy::log::warn;

use crate::error::{checked_buffer_len, TrailConfigError};

/// Sizes derived from the trail population and one LOD's node step.
///
/// Every retained node turns into two vertices (left/right ribbon edge) and
/// every node-to-next-node segment into two triangles. The last node of a trail
/// never connects to the first node of the next one, hence the `- 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LodGeometry {
    pub trail_num: u32,
    pub node_num_per_trail: u32,
    pub lod_node_step: u32,
}

impl LodGeometry {
    pub fn new(
        trail_num: u32,
        node_num_per_trail: u32,
        lod_node_step: u32,
    ) -> Result<Self, TrailConfigError> {
        if lod_node_step == 0 || lod_node_step >= node_num_per_trail {
            return Err(TrailConfigError::InvalidLodNodeStep {
                lod_node_step,
                node_num_per_trail,
            });
        }
        // 6 indices per node bounds the vertex count (2 per node) as well
        let node_num_with_lod = node_num_per_trail / lod_node_step;
        let vertex_num_per_trail = node_num_with_lod
            .checked_mul(6)
            .map(|_| node_num_with_lod * 2)
            .ok_or(TrailConfigError::BufferSizeOverflow {
                trail_num,
                per_trail: node_num_with_lod,
            })?;
        checked_buffer_len(trail_num, vertex_num_per_trail)?;

        Ok(Self {
            trail_num,
            node_num_per_trail,
            lod_node_step,
        })
    }

    pub fn node_num_per_trail_with_lod(&self) -> u32 {
        self.node_num_per_trail / self.lod_node_step
    }

    pub fn vertex_num_per_trail(&self) -> u32 {
        self.node_num_per_trail_with_lod() * 2
    }

    pub fn vertex_buffer_size(&self) -> u32 {
        self.trail_num * self.vertex_num_per_trail()
    }

    pub fn index_num_per_trail(&self) -> u32 {
        (self.node_num_per_trail_with_lod() - 1) * 6
    }

    /// Buffers only need rebuilding when this changes.
    pub fn size_key(&self) -> (u32, u32) {
        (self.trail_num, self.node_num_per_trail_with_lod())
    }
}

/// Static per-trail triangle list. Indices are trail-local; the vertex shader
/// offsets them by `instance * vertex_num_per_trail`.
pub fn build_index_pattern(node_num_per_trail_with_lod: u32) -> Vec<u32> {
    let segments = node_num_per_trail_with_lod.saturating_sub(1);
    let mut indices = Vec::with_capacity(segments as usize * 6);
    for node in 0..segments {
        let offset = node * 2;
        indices.extend_from_slice(&[
            offset,
            offset + 1,
            offset + 2,
            offset + 2,
            offset + 1,
            offset + 3,
        ]);
    }
    indices
}

/// `[min, max)` camera-distance range of each LOD bucket. The first bucket
/// starts at zero whatever its configured distance is, the last one is open.
///
/// Thresholds are expected ascending. One lower than a previous threshold is
/// raised to it, which leaves that LOD an empty range instead of overlapping
/// its neighbours.
pub fn lod_distance_ranges(distances: &[f32]) -> Vec<(f32, f32)> {
    let mut thresholds = Vec::with_capacity(distances.len());
    let mut highest = f32::MIN;
    for (i, &distance) in distances.iter().enumerate() {
        if distance < highest {
            warn!("LOD {i} distance {distance} is below a previous LOD distance {highest}; raised to it");
        }
        highest = highest.max(distance);
        thresholds.push(highest);
    }

    thresholds
        .iter()
        .enumerate()
        .map(|(i, &distance)| {
            let min = if i == 0 { 0.0 } else { distance };
            let max = thresholds.get(i + 1).copied().unwrap_or(f32::MAX);
            (min, max)
        })
        .collect()
}

// ==================== step validation ================================

/// Validates one LOD's node step against its trail store. A rejected step
/// stays rejected until `step_changed`, even if the store later fits it.
#[derive(Debug, Default)]
pub struct LodStepCheck {
    error: Option<TrailConfigError>,
}

impl LodStepCheck {
    pub fn validate(
        &mut self,
        trail_num: u32,
        node_num_per_trail: u32,
        lod_node_step: u32,
    ) -> Result<LodGeometry, TrailConfigError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        LodGeometry::new(trail_num, node_num_per_trail, lod_node_step).inspect_err(|err| {
            self.error = Some(err.clone());
        })
    }

    pub fn is_rejected(&self) -> bool {
        self.error.is_some()
    }

    pub fn step_changed(&mut self) {
        self.error = None;
    }
}
