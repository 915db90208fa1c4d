use crate::lod::LodGeometry;

/// GPU resources that must be released explicitly. Released buffers are never
/// touched again: the cache drops them right after.
pub trait ReleaseBuffers {
    fn release(&mut self);
}

/// Holds at most one resource set, keyed by `LodGeometry::size_key`.
/// A key change releases the old set before the new one is created; GPU
/// buffers are never resized in place.
pub struct LodBufferCache<B: ReleaseBuffers> {
    entry: Option<(LodKey, B)>,
}

type LodKey = (u32, u32);

impl<B: ReleaseBuffers> Default for LodBufferCache<B> {
    fn default() -> Self {
        Self { entry: None }
    }
}

impl<B: ReleaseBuffers> LodBufferCache<B> {
    /// Returns the resources for `geometry`, creating them when missing or
    /// sized for a different geometry. The flag is `true` on (re)allocation.
    pub fn ensure(&mut self, geometry: &LodGeometry, create: impl FnOnce(&LodGeometry) -> B) -> (&B, bool) {
        let key = geometry.size_key();
        let reallocated = !matches!(&self.entry, Some((cached, _)) if *cached == key);
        if reallocated {
            self.release();
        }
        let (_, buffers) = self.entry.get_or_insert_with(|| (key, create(geometry)));
        (buffers, reallocated)
    }

    pub fn get(&self) -> Option<&B> {
        self.entry.as_ref().map(|(_, buffers)| buffers)
    }

    pub fn release(&mut self) {
        if let Some((_, mut buffers)) = self.entry.take() {
            buffers.release();
        }
    }
}
