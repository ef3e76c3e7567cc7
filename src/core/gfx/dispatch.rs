use crate::core::gfx::VertexFormat;

/// Size of the shared quad index list: enough for every quad of a
/// 65536-vertex buffer.
pub const MAX_INDICES: usize = 65536 / 4 * 6;

/// Indices needed to draw `vertex_count` vertices as quads (two triangles
/// per four vertices).
#[inline(always)]
pub const fn index_count(vertex_count: u32) -> u32 {
    vertex_count * 3 / 2
}

/// Fills `indices` with 0,1,2, 2,3,0 per quad. A trailing partial quad is
/// left untouched.
pub fn make_indices(indices: &mut [u16]) {
    for (quad, chunk) in indices.chunks_exact_mut(6).enumerate() {
        let e = (quad * 4) as u16;
        chunk.copy_from_slice(&[e, e + 1, e + 2, e + 2, e + 3, e]);
    }
}

/// The shared index list, `MAX_INDICES` long.
pub fn default_indices() -> Vec<u16> {
    let mut indices = vec![0u16; MAX_INDICES];
    make_indices(&mut indices);
    indices
}

/// Pointer/attribute setup for the active vertex format.
///
/// A backend hands out one of these per format; the device swaps it whenever
/// the format changes and calls it right before each draw.
pub struct VertexLayout<B: ?Sized> {
    pub format: VertexFormat,
    /// Point the attribute streams at vertex 0 of the bound buffer.
    pub bind: fn(&mut B),
    /// Point the attribute streams at vertex `start` of the bound buffer.
    pub bind_range: fn(&mut B, u32),
}

impl<B: ?Sized> Clone for VertexLayout<B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: ?Sized> Copy for VertexLayout<B> {}

impl<B: ?Sized> std::fmt::Debug for VertexLayout<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexLayout")
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

/// Byte offset of vertex `start` in a buffer of `format`.
#[inline(always)]
pub const fn vertex_offset(format: VertexFormat, start: u32) -> usize {
    start as usize * format.stride()
}
