//! OpenGL 1.1 backend. Static vertex buffers are compiled into display lists;
//! dynamic ones live in client memory and are drawn through client arrays
//! with a client-side index list.

use super::fixed::FixedFunction;
use super::gl::{self, GlContext};
use crate::core::gfx::api_info::ApiInfo;
use crate::core::gfx::backend::{
    Backend, Capabilities, CompatWarnings, DeviceStatus, Framebuffer, PresentOutcome, TextureDesc,
};
use crate::core::gfx::dispatch::{VertexLayout, default_indices, index_count, vertex_offset};
use crate::core::gfx::error::{GfxError, GfxResult};
use crate::core::gfx::handle::{IndexBufferId, TextureId, VertexBufferId};
use crate::core::gfx::mipmap::MipPolicy;
use crate::core::gfx::state::StateChange;
use crate::core::gfx::{BackendType, MatrixType, VertexFormat};
use glam::Mat4;
use image::RgbaImage;
use log::{debug, trace};
use std::collections::HashMap;
use std::ffi::{CStr, c_void};
use std::num::NonZeroU32;

enum ListBuffer {
    /// A compiled display list replaying the whole buffer.
    Static(u32),
    /// Vertices kept in client memory, replaced wholesale on update.
    Dynamic(Vec<u8>),
}

pub struct DisplayListBackend {
    ctx: GlContext,
    fixed: FixedFunction,
    indices: Vec<u16>,
    buffers: HashMap<VertexBufferId, ListBuffer>,
    next_id: u32,
    active: Option<VertexBufferId>,
    format: VertexFormat,
    // Partial textured draws replay the whole list, so one replay per list.
    last_partial: Option<u32>,
}

impl DisplayListBackend {
    pub fn new(ctx: GlContext, loader: impl FnMut(&CStr) -> *const c_void) -> GfxResult<Self> {
        Ok(Self {
            ctx,
            fixed: FixedFunction::load(loader)?,
            indices: default_indices(),
            buffers: HashMap::new(),
            next_id: 0,
            active: None,
            format: VertexFormat::Colored,
            last_partial: None,
        })
    }

    fn next_raw(&mut self) -> NonZeroU32 {
        self.next_id = self.next_id.wrapping_add(1);
        NonZeroU32::new(self.next_id).unwrap_or_else(|| {
            self.next_id = 1;
            NonZeroU32::MIN
        })
    }

    fn allocate(&mut self, buffer: ListBuffer) -> VertexBufferId {
        let id = VertexBufferId::new(self.next_raw());
        self.buffers.insert(id, buffer);
        id
    }

    fn active_buffer(&self) -> Option<&ListBuffer> {
        self.active.and_then(|id| self.buffers.get(&id))
    }

    /// Client indices for `vertex_count` vertices, clamped to the shared list.
    fn indices_for(&self, vertex_count: u32) -> &[u16] {
        let n = (index_count(vertex_count) as usize).min(self.indices.len());
        &self.indices[..n]
    }

    fn point_dynamic(&self, format: VertexFormat, start: u32) {
        if let Some(ListBuffer::Dynamic(data)) = self.active_buffer() {
            let base = data.as_ptr().wrapping_add(vertex_offset(format, start));
            unsafe { self.fixed.point_arrays(format, base) };
        }
    }
}

fn bind_colored(b: &mut DisplayListBackend) {
    b.point_dynamic(VertexFormat::Colored, 0);
}

fn bind_textured(b: &mut DisplayListBackend) {
    b.point_dynamic(VertexFormat::Textured, 0);
}

fn bind_colored_range(b: &mut DisplayListBackend, start: u32) {
    b.point_dynamic(VertexFormat::Colored, start);
}

fn bind_textured_range(b: &mut DisplayListBackend, start: u32) {
    b.point_dynamic(VertexFormat::Textured, start);
}

impl Backend for DisplayListBackend {
    fn name(&self) -> &'static str {
        "OpenGL 1.1"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            mip_policy: MipPolicy::Full,
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

    // GL contexts are not lost the way a D3D device is; a reported loss is
    // recovered by replaying state into the same context.
    fn poll_device(&mut self) -> DeviceStatus {
        DeviceStatus::NeedsReset
    }

    fn reset_device(&mut self, width: u32, height: u32, _vsync: bool) -> GfxResult<DeviceStatus> {
        self.ctx.resize(width, height);
        Ok(DeviceStatus::Ready)
    }

    fn release_device_objects(&mut self) {
        self.last_partial = None;
    }

    fn set_default_state(&mut self) -> GfxResult<()> {
        self.fixed.set_default_state(&self.ctx);
        self.fixed.set_vertex_format(self.format);
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
        for (_, buffer) in self.buffers.drain() {
            if let ListBuffer::Static(list) = buffer {
                unsafe { self.fixed.ffi.delete_list(list) };
            }
        }
        self.active = None;
    }

    fn begin_frame(&mut self) -> GfxResult<()> {
        self.last_partial = None;
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
        self.format = format;
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

    // --- Textures ---

    fn create_texture(&mut self, desc: &TextureDesc) -> GfxResult<TextureId> {
        // TEXTURE_MAX_LEVEL is GL 1.2; the full chain is always uploaded.
        self.ctx.create_texture(desc, false)
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
        Err(GfxError::Unsupported("texture copies on OpenGL 1.1".into()))
    }

    fn bind_texture(&mut self, tex: Option<TextureId>) -> GfxResult<()> {
        self.ctx.bind_texture(tex);
        Ok(())
    }

    fn delete_texture(&mut self, tex: TextureId) {
        self.ctx.delete_texture(tex);
    }

    // --- Buffers ---

    fn create_vertex_buffer(&mut self, format: VertexFormat, data: &[u8]) -> GfxResult<VertexBufferId> {
        // Quads only: a trailing odd vertex has no partner.
        let count = (data.len() / format.stride()) as u32 & !1;
        let list = unsafe { self.fixed.ffi.gen_list() };
        if list == 0 {
            self.ctx.check("CreateVb")?;
            return Err(GfxError::OutOfVideoMemory { op: "CreateVb" });
        }

        // The list captures client state as it is while compiling.
        self.fixed.set_vertex_format(format);
        unsafe {
            self.fixed.ffi.new_list(list, super::ffi::COMPILE);
            self.fixed.point_arrays(format, data.as_ptr());
            self.fixed
                .ffi
                .draw_client_elements(glow::TRIANGLES, self.indices_for(count));
            self.fixed.ffi.end_list();
        }
        self.fixed.set_vertex_format(self.format);

        if let Err(e) = self.ctx.check("CreateVb") {
            unsafe { self.fixed.ffi.delete_list(list) };
            return Err(e);
        }
        trace!("Compiled display list {list} ({count} vertices).");
        Ok(self.allocate(ListBuffer::Static(list)))
    }

    fn create_dynamic_vertex_buffer(
        &mut self,
        format: VertexFormat,
        max_vertices: u32,
    ) -> GfxResult<VertexBufferId> {
        let data = Vec::with_capacity(max_vertices as usize * format.stride());
        Ok(self.allocate(ListBuffer::Dynamic(data)))
    }

    // Indices always come from the shared client-side quad list.
    fn create_index_buffer(&mut self, indices: &[u16]) -> GfxResult<IndexBufferId> {
        debug!("Index buffer of {} indices kept client-side.", indices.len());
        Ok(IndexBufferId::new(self.next_raw()))
    }

    fn bind_vertex_buffer(&mut self, vb: Option<VertexBufferId>) -> GfxResult<()> {
        self.active = vb;
        Ok(())
    }

    fn bind_index_buffer(&mut self, _ib: Option<IndexBufferId>) -> GfxResult<()> {
        Ok(())
    }

    fn set_dynamic_data(&mut self, vb: VertexBufferId, data: &[u8]) -> GfxResult<()> {
        if let Some(ListBuffer::Dynamic(buf)) = self.buffers.get_mut(&vb) {
            buf.clear();
            buf.extend_from_slice(data);
        }
        self.active = Some(vb);
        Ok(())
    }

    fn delete_vertex_buffer(&mut self, vb: VertexBufferId) {
        if let Some(ListBuffer::Static(list)) = self.buffers.remove(&vb) {
            unsafe { self.fixed.ffi.delete_list(list) };
            if self.last_partial == Some(list) {
                self.last_partial = None;
            }
        }
        if self.active == Some(vb) {
            self.active = None;
        }
    }

    fn delete_index_buffer(&mut self, _ib: IndexBufferId) {}

    // --- Draws ---

    fn draw_lines(&mut self, vertex_count: u32) {
        self.ctx.draw_lines(vertex_count);
    }

    fn draw_indexed(&mut self, index_count: u32) {
        match self.active_buffer() {
            Some(ListBuffer::Static(list)) => unsafe { self.fixed.ffi.call_list(*list) },
            Some(ListBuffer::Dynamic(_)) => {
                let n = (index_count as usize).min(self.indices.len());
                unsafe {
                    self.fixed
                        .ffi
                        .draw_client_elements(glow::TRIANGLES, &self.indices[..n]);
                }
            }
            None => trace!("No vertex buffer bound; skipping draw."),
        }
    }

    fn draw_textured_range(&mut self, vertex_count: u32, start_vertex: u32) {
        match self.active_buffer() {
            Some(&ListBuffer::Static(list)) => {
                if self.last_partial == Some(list) {
                    return;
                }
                unsafe { self.fixed.ffi.call_list(list) };
                self.last_partial = Some(list);
            }
            Some(ListBuffer::Dynamic(_)) => {
                self.point_dynamic(VertexFormat::Textured, start_vertex);
                unsafe {
                    self.fixed
                        .ffi
                        .draw_client_elements(glow::TRIANGLES, self.indices_for(vertex_count));
                }
            }
            None => trace!("No vertex buffer bound; skipping draw."),
        }
    }

    // --- Diagnostics ---

    fn api_info(&mut self) -> ApiInfo {
        self.ctx.api_info(BackendType::DisplayList)
    }

    fn memory_usage(&mut self) -> Option<String> {
        self.ctx.memory_usage()
    }

    fn compatibility_warnings(&self) -> CompatWarnings {
        gl::warnings_for(&self.ctx.renderer(), true)
    }

    fn read_framebuffer(&mut self, width: u32, height: u32) -> GfxResult<Framebuffer> {
        self.ctx.read_framebuffer(width, height)
    }
}
