use bevy::prelude::*;
use bevy::render::render_resource::{
    Buffer, BufferDescriptor, BufferUsages, CommandEncoderDescriptor, Maintain, MapMode,
};
use bevy::render::renderer::{RenderDevice, RenderQueue};
use bytemuck::Pod;

/// Copies `source` into a mappable buffer and blocks until it can be read.
/// `source` needs `COPY_SRC`. Stalls the GPU: debugging and checks only.
pub fn read_buffer<T: Pod>(rd: &RenderDevice, rq: &RenderQueue, source: &Buffer) -> Option<Vec<T>> {
    let size = source.size();
    let readback = rd.create_buffer(&BufferDescriptor {
        label: Some("trail_readback"),
        size,
        usage: BufferUsages::MAP_READ | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let mut encoder = rd.create_command_encoder(&CommandEncoderDescriptor {
        label: Some("trail_readback_encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &readback, 0, size);
    rq.submit([encoder.finish()]);

    let slice = readback.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    rd.poll(Maintain::Wait);
    if !matches!(rx.recv(), Ok(Ok(()))) {
        warn!("trail buffer readback failed");
        readback.destroy();
        return None;
    }

    let values = {
        let data = slice.get_mapped_range();
        let values: &[T] = bytemuck::cast_slice(&data);
        values.to_vec()
    };
    readback.unmap();
    readback.destroy();
    Some(values)
}
