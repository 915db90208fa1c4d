use bevy::prelude::Entity;
use thiserror::Error;

/// Misconfiguration of a trail renderer. These are contract violations, not
/// transient conditions: the affected LOD (or renderer) stays disabled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrailConfigError {
    #[error("invalid lod_node_step [{lod_node_step}]: must be in (0, {node_num_per_trail})")]
    InvalidLodNodeStep {
        lod_node_step: u32,
        node_num_per_trail: u32,
    },

    #[error("{trail_num} trails x {per_trail} elements overflows a u32 buffer index")]
    BufferSizeOverflow { trail_num: u32, per_trail: u32 },

    #[error("GpuTrailRenderer on {0} requires a GpuTrail component")]
    MissingTrailStore(Entity),
}

/// `trail_num * per_trail`, the element count of a per-trail GPU buffer.
pub fn checked_buffer_len(trail_num: u32, per_trail: u32) -> Result<u32, TrailConfigError> {
    trail_num
        .checked_mul(per_trail)
        .ok_or(TrailConfigError::BufferSizeOverflow {
            trail_num,
            per_trail,
        })
}
