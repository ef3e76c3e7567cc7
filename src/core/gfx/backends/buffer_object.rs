//! OpenGL 1.5 backend: fixed-function pipeline fed from vertex and index
//! buffer objects.

use super::fixed::FixedFunction;
use super::gl::{self, GlContext};
use crate::core::gfx::api_info::ApiInfo;
use crate::core::gfx::backend::{
    Backend, Capabilities, CompatWarnings, DeviceStatus, Framebuffer, PresentOutcome, TextureDesc,
};
use crate::core::gfx::dispatch::{VertexLayout, vertex_offset};
use crate::core::gfx::error::{GfxError, GfxResult};
use crate::core::gfx::handle::{IndexBufferId, TextureId, VertexBufferId};
use crate::core::gfx::mipmap::MipPolicy;
use crate::core::gfx::state::StateChange;
use crate::core::gfx::{BackendType, MatrixType, VertexFormat, index_count};
use glam::Mat4;
use image::RgbaImage;
use log::info;
use std::ffi::{CStr, c_void};

const ARB_VBO: &str = "GL_ARB_vertex_buffer_object";

/// Buffer objects are core from 1.5 on, and an extension on 1.2 to 1.4.
#[inline(always)]
pub const fn supports_buffer_objects(major: u32, minor: u32, arb_extension: bool) -> bool {
    major > 1 || (major == 1 && minor >= 5) || (major == 1 && minor >= 2 && arb_extension)
}

pub struct BufferObjectBackend {
    ctx: GlContext,
    fixed: FixedFunction,
}

impl BufferObjectBackend {
    pub fn new(ctx: GlContext, loader: impl FnMut(&CStr) -> *const c_void) -> GfxResult<Self> {
        let (major, minor) = ctx.version();
        let arb = ctx.has_extension(ARB_VBO);
        if !supports_buffer_objects(major, minor, arb) {
            return Err(GfxError::Unsupported(format!(
                "OpenGL {major}.{minor} has no buffer objects; use the OpenGL 1.1 renderer"
            )));
        }
        info!("Vertex buffer objects on OpenGL {major}.{minor} (ARB extension: {arb}).");
        Ok(Self {
            ctx,
            fixed: FixedFunction::load(loader)?,
        })
    }

    fn point_bound(&self, format: VertexFormat, start: u32) {
        // Offsets into the bound ARRAY_BUFFER travel as pointers.
        let base = std::ptr::null::<u8>().wrapping_add(vertex_offset(format, start));
        unsafe { self.fixed.point_arrays(format, base) };
    }
}

fn bind_colored(b: &mut BufferObjectBackend) {
    b.point_bound(VertexFormat::Colored, 0);
}

fn bind_textured(b: &mut BufferObjectBackend) {
    b.point_bound(VertexFormat::Textured, 0);
}

fn bind_colored_range(b: &mut BufferObjectBackend, start: u32) {
    b.point_bound(VertexFormat::Colored, start);
}

fn bind_textured_range(b: &mut BufferObjectBackend, start: u32) {
    b.point_bound(VertexFormat::Textured, start);
}

impl Backend for BufferObjectBackend {
    fn name(&self) -> &'static str {
        "OpenGL"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            mip_policy: MipPolicy::Capped,
            staged_uploads: false,
            resize_resets_device: false,
            vsync_resets_device: false,
            max_texture_size: self.ctx.max_texture_size(),
            min_z_near: 0.1,
        }
    }

    fn vertex_layout(format: VertexFormat) -> VertexLayout<Self> {
        match format {
            VertexFormat::Colored => VertexLayout {
                format,
                bind: bind_colored,
                bind_range: bind_colored_range,
            },
            VertexFormat::Textured => VertexLayout {
                format,
                bind: bind_textured,
                bind_range: bind_textured_range,
            },
        }
    }

    fn poll_device(&mut self) -> DeviceStatus {
        DeviceStatus::NeedsReset
    }

    fn reset_device(&mut self, width: u32, height: u32, _vsync: bool) -> GfxResult<DeviceStatus> {
        self.ctx.resize(width, height);
        Ok(DeviceStatus::Ready)
    }

    fn release_device_objects(&mut self) {}

    fn set_default_state(&mut self) -> GfxResult<()> {
        self.fixed.set_default_state(&self.ctx);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> GfxResult<()> {
        self.ctx.resize(width, height);
        Ok(())
    }

    fn set_vsync(&mut self, enabled: bool) -> GfxResult<()> {
        self.ctx.set_vsync(enabled)
    }

    fn shutdown(&mut self) {
        self.ctx.bind_vertex_buffer(None);
        self.ctx.bind_index_buffer(None);
    }

    fn begin_frame(&mut self) -> GfxResult<()> {
        Ok(())
    }

    fn clear(&mut self) -> GfxResult<()> {
        self.ctx.clear();
        Ok(())
    }

    fn present(&mut self) -> GfxResult<PresentOutcome> {
        self.ctx.present()
    }

    fn apply_state(&mut self, change: StateChange) -> GfxResult<()> {
        self.fixed.apply_state(&self.ctx, change)
    }

    fn set_vertex_format(&mut self, format: VertexFormat) -> GfxResult<()> {
        self.fixed.set_vertex_format(format);
        Ok(())
    }

    fn load_matrix(&mut self, ty: MatrixType, matrix: &Mat4) -> GfxResult<()> {
        self.fixed.load_matrix(ty, matrix);
        Ok(())
    }

    fn load_identity(&mut self, ty: MatrixType) -> GfxResult<()> {
        self.fixed.load_identity(ty);
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> GfxResult<TextureId> {
        self.ctx.create_texture(desc, true)
    }

    fn upload_texture(&mut self, tex: TextureId, level: u32, image: &RgbaImage) -> GfxResult<()> {
        self.ctx.upload_texture_region(tex, level, 0, 0, image)
    }

    fn upload_texture_region(
        &mut self,
        tex: TextureId,
        level: u32,
        x: u32,
        y: u32,
        image: &RgbaImage,
    ) -> GfxResult<()> {
        self.ctx.upload_texture_region(tex, level, x, y, image)
    }

    fn copy_texture(&mut self, _src: TextureId, _dst: TextureId) -> GfxResult<()> {
        Err(GfxError::Unsupported("texture copies on OpenGL".into()))
    }

    fn bind_texture(&mut self, tex: Option<TextureId>) -> GfxResult<()> {
        self.ctx.bind_texture(tex);
        Ok(())
    }

    fn delete_texture(&mut self, tex: TextureId) {
        self.ctx.delete_texture(tex);
    }

    fn create_vertex_buffer(&mut self, _format: VertexFormat, data: &[u8]) -> GfxResult<VertexBufferId> {
        self.ctx.create_vertex_buffer(data)
    }

    fn create_dynamic_vertex_buffer(
        &mut self,
        format: VertexFormat,
        max_vertices: u32,
    ) -> GfxResult<VertexBufferId> {
        self.ctx.create_dynamic_vertex_buffer(format, max_vertices)
    }

    fn create_index_buffer(&mut self, indices: &[u16]) -> GfxResult<IndexBufferId> {
        self.ctx.create_index_buffer(indices)
    }

    fn bind_vertex_buffer(&mut self, vb: Option<VertexBufferId>) -> GfxResult<()> {
        self.ctx.bind_vertex_buffer(vb);
        Ok(())
    }

    fn bind_index_buffer(&mut self, ib: Option<IndexBufferId>) -> GfxResult<()> {
        self.ctx.bind_index_buffer(ib);
        Ok(())
    }

    fn set_dynamic_data(&mut self, vb: VertexBufferId, data: &[u8]) -> GfxResult<()> {
        self.ctx.set_dynamic_data(vb, data);
        Ok(())
    }

    fn delete_vertex_buffer(&mut self, vb: VertexBufferId) {
        self.ctx.delete_buffer(vb.get());
    }

    fn delete_index_buffer(&mut self, ib: IndexBufferId) {
        self.ctx.delete_buffer(ib.get());
    }

    fn draw_lines(&mut self, vertex_count: u32) {
        self.ctx.draw_lines(vertex_count);
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.ctx.draw_elements(index_count);
    }

    fn draw_textured_range(&mut self, vertex_count: u32, start_vertex: u32) {
        self.point_bound(VertexFormat::Textured, start_vertex);
        self.ctx.draw_elements(index_count(vertex_count));
    }

    fn api_info(&mut self) -> ApiInfo {
        self.ctx.api_info(BackendType::BufferObject)
    }

    fn memory_usage(&mut self) -> Option<String> {
        self.ctx.memory_usage()
    }

    fn compatibility_warnings(&self) -> CompatWarnings {
        gl::warnings_for(&self.ctx.renderer(), false)
    }

    fn read_framebuffer(&mut self, width: u32, height: u32) -> GfxResult<Framebuffer> {
        self.ctx.read_framebuffer(width, height)
    }
}

#[cfg(test)]
mod tests {
    use super::supports_buffer_objects;

    #[test]
    fn buffer_objects_are_core_from_gl_1_5() {
        assert!(!supports_buffer_objects(1, 1, false));
        assert!(!supports_buffer_objects(1, 4, false));
        assert!(supports_buffer_objects(1, 5, false));
        assert!(supports_buffer_objects(2, 0, false));
        assert!(supports_buffer_objects(4, 6, false));
    }

    #[test]
    fn arb_extension_unlocks_gl_1_2() {
        assert!(supports_buffer_objects(1, 2, true));
        assert!(supports_buffer_objects(1, 4, true));
        assert!(!supports_buffer_objects(1, 1, true), "1.1 drivers stay on display lists");
    }
}
