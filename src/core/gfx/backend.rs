//! The seam between the device facade and a concrete graphics API.

use crate::core::gfx::api_info::ApiInfo;
use crate::core::gfx::dispatch::VertexLayout;
use crate::core::gfx::error::GfxResult;
use crate::core::gfx::handle::{IndexBufferId, TextureId, VertexBufferId};
use crate::core::gfx::mipmap::MipPolicy;
use crate::core::gfx::state::StateChange;
use crate::core::gfx::{MatrixType, VertexFormat};
use glam::Mat4;
use image::RgbaImage;

/// What the facade needs to know to pick a strategy for a backend.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Capabilities {
    pub mip_policy: MipPolicy,
    /// Textures outside the managed pool must go through a staging copy.
    pub staged_uploads: bool,
    /// A window resize invalidates the device (lose + reset + recreate).
    pub resize_resets_device: bool,
    /// Toggling vsync invalidates the device.
    pub vsync_resets_device: bool,
    pub max_texture_size: u32,
    pub min_z_near: f32,
}

/// Answer to "can the lost device be brought back yet?".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Usable, nothing to do.
    Ready,
    /// Still lost; keep waiting.
    Lost,
    /// Lost but resettable now.
    NeedsReset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    DeviceLost,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TexturePool {
    /// Directly writable, survives device loss.
    Managed,
    /// CPU-visible scratch copy, only used as a copy source.
    Staging,
    /// GPU-only memory, filled by a copy from staging.
    Device,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    /// Levels below the base image (0 without mipmaps).
    pub mip_levels: u32,
    pub pool: TexturePool,
}

impl TextureDesc {
    #[inline(always)]
    pub const fn with_pool(self, pool: TexturePool) -> Self {
        Self { pool, ..self }
    }
}

/// Raw RGBA8 pixels read back from the back buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Framebuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    /// Row 0 is the bottom of the screen.
    pub bottom_up: bool,
}

/// Driver/backend combinations worth telling the user about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompatWarnings {
    pub lines: Vec<&'static str>,
    pub known_issues: bool,
}

/// Presentation surface owned by the host (window + GL context).
pub trait SwapChain {
    fn swap_buffers(&mut self) -> GfxResult<PresentOutcome>;
    fn set_vsync(&mut self, enabled: bool) -> GfxResult<()>;
    fn resize(&mut self, width: u32, height: u32);
}

/// One native graphics API. The device facade owns exactly one of these and
/// never branches on which one it is.
pub trait Backend {
    fn name(&self) -> &'static str;
    fn capabilities(&self) -> Capabilities;

    /// Attribute setup for `format`, swapped in by the facade on format change.
    fn vertex_layout(format: VertexFormat) -> VertexLayout<Self>
    where
        Self: Sized;

    // --- Device lifecycle ---
    fn poll_device(&mut self) -> DeviceStatus;
    /// Tries to reset a lost device. `Lost` means "not yet, wait and retry".
    fn reset_device(&mut self, width: u32, height: u32, vsync: bool) -> GfxResult<DeviceStatus>;
    /// Drops backend-owned objects that do not survive a device loss.
    fn release_device_objects(&mut self);
    fn set_default_state(&mut self) -> GfxResult<()>;
    fn resize(&mut self, width: u32, height: u32) -> GfxResult<()>;
    fn set_vsync(&mut self, enabled: bool) -> GfxResult<()>;
    fn shutdown(&mut self);

    // --- Frame ---
    fn begin_frame(&mut self) -> GfxResult<()>;
    fn clear(&mut self) -> GfxResult<()>;
    fn present(&mut self) -> GfxResult<PresentOutcome>;

    // --- State ---
    fn apply_state(&mut self, change: StateChange) -> GfxResult<()>;
    fn set_vertex_format(&mut self, format: VertexFormat) -> GfxResult<()>;
    fn load_matrix(&mut self, ty: MatrixType, matrix: &Mat4) -> GfxResult<()>;
    fn load_identity(&mut self, ty: MatrixType) -> GfxResult<()> {
        self.load_matrix(ty, &Mat4::IDENTITY)
    }
    /// Sampler-level mipmap toggle. Most APIs bake this into the texture.
    fn set_mipmaps(&mut self, _enabled: bool) -> GfxResult<()> {
        Ok(())
    }

    // --- Textures ---
    fn create_texture(&mut self, desc: &TextureDesc) -> GfxResult<TextureId>;
    fn upload_texture(&mut self, tex: TextureId, level: u32, image: &RgbaImage) -> GfxResult<()>;
    fn upload_texture_region(
        &mut self,
        tex: TextureId,
        level: u32,
        x: u32,
        y: u32,
        image: &RgbaImage,
    ) -> GfxResult<()>;
    fn copy_texture(&mut self, src: TextureId, dst: TextureId) -> GfxResult<()>;
    fn bind_texture(&mut self, tex: Option<TextureId>) -> GfxResult<()>;
    fn delete_texture(&mut self, tex: TextureId);

    // --- Buffers ---
    fn create_vertex_buffer(&mut self, format: VertexFormat, data: &[u8]) -> GfxResult<VertexBufferId>;
    fn create_dynamic_vertex_buffer(
        &mut self,
        format: VertexFormat,
        max_vertices: u32,
    ) -> GfxResult<VertexBufferId>;
    fn create_index_buffer(&mut self, indices: &[u16]) -> GfxResult<IndexBufferId>;
    fn bind_vertex_buffer(&mut self, vb: Option<VertexBufferId>) -> GfxResult<()>;
    fn bind_index_buffer(&mut self, ib: Option<IndexBufferId>) -> GfxResult<()>;
    /// Replaces the leading `data.len()` bytes of a dynamic buffer and leaves
    /// it bound.
    fn set_dynamic_data(&mut self, vb: VertexBufferId, data: &[u8]) -> GfxResult<()>;
    fn delete_vertex_buffer(&mut self, vb: VertexBufferId);
    fn delete_index_buffer(&mut self, ib: IndexBufferId);

    // --- Draws (vertex layout already bound by the facade) ---
    fn draw_lines(&mut self, vertex_count: u32);
    fn draw_indexed(&mut self, index_count: u32);
    /// Textured triangles from `start_vertex` of the bound buffer, binding
    /// its own layout.
    fn draw_textured_range(&mut self, vertex_count: u32, start_vertex: u32);

    // --- Diagnostics ---
    fn api_info(&mut self) -> ApiInfo;
    fn memory_usage(&mut self) -> Option<String>;
    fn compatibility_warnings(&self) -> CompatWarnings;
    fn read_framebuffer(&mut self, width: u32, height: u32) -> GfxResult<Framebuffer>;
}
