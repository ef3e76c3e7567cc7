//! State and resources every OpenGL flavour shares: the glow context, the
//! presentation surface, textures, buffer objects, common render state and
//! diagnostics.

use crate::core::gfx::api_info::{self, ApiInfo};
use crate::core::gfx::backend::{CompatWarnings, Framebuffer, PresentOutcome, SwapChain, TextureDesc};
use crate::core::gfx::error::{GfxError, GfxResult};
use crate::core::gfx::handle::{IndexBufferId, TextureId, VertexBufferId};
use crate::core::gfx::state::{BlendFactor, CompareFunc, StateChange};
use crate::core::gfx::{BackendType, VertexFormat};
use glow::{HasContext, PixelPackData, PixelUnpackData};
use image::RgbaImage;
use log::{debug, warn};
use std::collections::HashMap;
use std::num::NonZeroU32;

const DEPTH_BITS: u32 = 0x0D56;
const GPU_MEMORY_INFO: &str = "GL_NVX_gpu_memory_info";
const GPU_MEMORY_TOTAL_KB: u32 = 0x9048;
const GPU_MEMORY_FREE_KB: u32 = 0x9049;

/// Stale errors drained before an allocation, so its own check is accurate.
const MAX_STALE_ERRORS: usize = 16;

pub const LEGACY_WARNINGS: [&str; 3] = [
    "&cYou are using the very outdated OpenGL backend.",
    "&cAs such you may experience poor performance.",
    "&cIt is likely you need to install video card drivers.",
];

pub const INTEL_WARNINGS: [&str; 3] = [
    "&cIntel graphics cards are known to have issues with the OpenGL build.",
    "&cVSync may not work, and you may see disappearing clouds and map edges.",
    "&cIf rendering glitches persist, try another VideoRenderer setting.",
];

#[inline(always)]
pub const fn compare_func(func: CompareFunc) -> u32 {
    match func {
        CompareFunc::Always => glow::ALWAYS,
        CompareFunc::NotEqual => glow::NOTEQUAL,
        CompareFunc::Never => glow::NEVER,
        CompareFunc::Less => glow::LESS,
        CompareFunc::LessEqual => glow::LEQUAL,
        CompareFunc::Equal => glow::EQUAL,
        CompareFunc::GreaterEqual => glow::GEQUAL,
        CompareFunc::Greater => glow::GREATER,
    }
}

#[inline(always)]
pub const fn blend_factor(factor: BlendFactor) -> u32 {
    match factor {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::InvSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::InvDstAlpha => glow::ONE_MINUS_DST_ALPHA,
    }
}

/// Chat lines for a renderer string. `legacy` adds the display-list notice.
pub fn warnings_for(renderer: &str, legacy: bool) -> CompatWarnings {
    let mut lines = Vec::new();
    if legacy {
        lines.extend(LEGACY_WARNINGS);
    }
    let known_issues = renderer.contains("Intel");
    if known_issues {
        lines.extend(INTEL_WARNINGS);
    }
    CompatWarnings { lines, known_issues }
}

#[inline(always)]
pub fn toggle(gl: &glow::Context, cap: u32, enabled: bool) {
    unsafe {
        if enabled {
            gl.enable(cap);
        } else {
            gl.disable(cap);
        }
    }
}

#[inline(always)]
fn texture_id(tex: glow::Texture) -> TextureId {
    TextureId::new(tex.0)
}

#[inline(always)]
fn native_texture(tex: TextureId) -> glow::Texture {
    glow::NativeTexture(tex.get())
}

#[inline(always)]
pub fn native_buffer(raw: NonZeroU32) -> glow::Buffer {
    glow::NativeBuffer(raw)
}

/// Bytes to re-specify before rewriting a dynamic buffer: its full capacity,
/// grown if a caller writes past it.
#[inline(always)]
pub fn orphan_size(capacity: Option<usize>, len: usize) -> usize {
    capacity.unwrap_or(0).max(len)
}

pub struct GlContext {
    pub gl: glow::Context,
    surface: Box<dyn SwapChain>,
    max_texture_size: u32,
    gpu_memory_info: bool,
    // Byte capacity of each dynamic vertex buffer, for orphaning on rewrite.
    dynamic_sizes: HashMap<NonZeroU32, usize>,
}

impl GlContext {
    pub fn new(gl: glow::Context, surface: Box<dyn SwapChain>) -> Self {
        let max_texture_size = unsafe { gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE) }.max(0) as u32;
        let gpu_memory_info = gl.supported_extensions().contains(GPU_MEMORY_INFO);
        let version = gl.version();
        debug!(
            "GL context {}.{} (embedded: {}), max texture size {max_texture_size}.",
            version.major, version.minor, version.is_embedded
        );
        Self {
            gl,
            surface,
            max_texture_size,
            gpu_memory_info,
            dynamic_sizes: HashMap::new(),
        }
    }

    #[inline(always)]
    pub const fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    pub fn version(&self) -> (u32, u32) {
        let v = self.gl.version();
        (v.major, v.minor)
    }

    pub fn has_extension(&self, name: &str) -> bool {
        self.gl.supported_extensions().contains(name)
    }

    // --- Errors ---

    fn drain_errors(&self) {
        for _ in 0..MAX_STALE_ERRORS {
            if unsafe { self.gl.get_error() } == glow::NO_ERROR {
                return;
            }
        }
    }

    /// Maps the pending GL error, if any, onto a `GfxError`.
    pub fn check(&self, op: &'static str) -> GfxResult<()> {
        match unsafe { self.gl.get_error() } {
            glow::NO_ERROR => Ok(()),
            glow::OUT_OF_MEMORY => Err(GfxError::OutOfVideoMemory { op }),
            code => Err(GfxError::Backend { op, code }),
        }
    }

    // --- State ---

    /// Defaults shared by every flavour; flavour-specific ones follow.
    pub fn set_default_state(&self) {
        unsafe {
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            self.gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            self.gl.depth_func(glow::LEQUAL);
        }
    }

    /// Applies the state every flavour handles the same way. Returns `false`
    /// for changes the caller must handle itself.
    pub fn apply_common(&self, change: StateChange) -> bool {
        let gl = &self.gl;
        unsafe {
            match change {
                StateChange::AlphaBlending(on) => toggle(gl, glow::BLEND, on),
                StateChange::BlendFunc(src, dst) => gl.blend_func(blend_factor(src), blend_factor(dst)),
                // GL has no separate alpha-argument blending.
                StateChange::AlphaArgBlend(_) => {}
                StateChange::DepthTest(on) => toggle(gl, glow::DEPTH_TEST, on),
                StateChange::DepthWrite(on) => gl.depth_mask(on),
                StateChange::DepthTestFunc(func) => gl.depth_func(compare_func(func)),
                StateChange::FaceCulling(on) => toggle(gl, glow::CULL_FACE, on),
                StateChange::ColorWrite(m) => gl.color_mask(m.r, m.g, m.b, m.a),
                StateChange::ClearColor(color) => {
                    let [r, g, b, a] = color.to_f32();
                    gl.clear_color(r, g, b, a);
                }
                _ => return false,
            }
        }
        true
    }

    // --- Frame ---

    pub fn clear(&self) {
        unsafe {
            self.gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
        }
    }

    pub fn present(&mut self) -> GfxResult<PresentOutcome> {
        self.surface.swap_buffers()
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        unsafe {
            self.gl.viewport(0, 0, width as i32, height as i32);
        }
        self.surface.resize(width, height);
    }

    pub fn set_vsync(&mut self, enabled: bool) -> GfxResult<()> {
        self.surface.set_vsync(enabled)
    }

    // --- Textures ---

    /// Allocates storage for every level of `desc`. With `cap_levels`, the
    /// sampler is told not to look past the last allocated level.
    pub fn create_texture(&self, desc: &TextureDesc, cap_levels: bool) -> GfxResult<TextureId> {
        let gl = &self.gl;
        self.drain_errors();
        let tex = unsafe { gl.create_texture() }.map_err(|message| GfxError::Driver {
            op: "CreateTexture",
            message,
        })?;

        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            if desc.mip_levels > 0 {
                gl.tex_parameter_i32(
                    glow::TEXTURE_2D,
                    glow::TEXTURE_MIN_FILTER,
                    glow::NEAREST_MIPMAP_LINEAR as i32,
                );
                if cap_levels {
                    gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAX_LEVEL, desc.mip_levels as i32);
                }
            } else {
                gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            }

            let (mut w, mut h) = (desc.width, desc.height);
            for level in 0..=desc.mip_levels {
                gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    level as i32,
                    glow::RGBA as i32,
                    w as i32,
                    h as i32,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    PixelUnpackData::Slice(None),
                );
                w = (w / 2).max(1);
                h = (h / 2).max(1);
            }
        }

        if let Err(e) = self.check("CreateTexture") {
            unsafe { gl.delete_texture(tex) };
            return Err(e);
        }
        Ok(texture_id(tex))
    }

    pub fn upload_texture_region(
        &self,
        tex: TextureId,
        level: u32,
        x: u32,
        y: u32,
        image: &RgbaImage,
    ) -> GfxResult<()> {
        self.drain_errors();
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, Some(native_texture(tex)));
            self.gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                level as i32,
                x as i32,
                y as i32,
                image.width() as i32,
                image.height() as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(Some(image.as_raw())),
            );
        }
        self.check("UpdateTexturePart")
    }

    pub fn bind_texture(&self, tex: Option<TextureId>) {
        unsafe {
            self.gl.bind_texture(glow::TEXTURE_2D, tex.map(native_texture));
        }
    }

    pub fn delete_texture(&self, tex: TextureId) {
        unsafe {
            self.gl.delete_texture(native_texture(tex));
        }
    }

    // --- Buffer objects ---

    fn create_buffer(
        &self,
        op: &'static str,
        target: u32,
        fill: impl FnOnce(&glow::Context),
    ) -> GfxResult<glow::Buffer> {
        let gl = &self.gl;
        self.drain_errors();
        let buffer = unsafe { gl.create_buffer() }.map_err(|message| GfxError::Driver { op, message })?;
        unsafe {
            gl.bind_buffer(target, Some(buffer));
        }
        fill(gl);
        if let Err(e) = self.check(op) {
            unsafe { gl.delete_buffer(buffer) };
            return Err(e);
        }
        Ok(buffer)
    }

    pub fn create_vertex_buffer(&self, data: &[u8]) -> GfxResult<VertexBufferId> {
        let buffer = self.create_buffer("CreateVb", glow::ARRAY_BUFFER, |gl| unsafe {
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, data, glow::STATIC_DRAW);
        })?;
        Ok(VertexBufferId::new(buffer.0))
    }

    pub fn create_dynamic_vertex_buffer(
        &mut self,
        format: VertexFormat,
        max_vertices: u32,
    ) -> GfxResult<VertexBufferId> {
        let size = max_vertices as usize * format.stride();
        let buffer = self.create_buffer("CreateDynamicVb", glow::ARRAY_BUFFER, |gl| unsafe {
            gl.buffer_data_size(glow::ARRAY_BUFFER, size as i32, glow::DYNAMIC_DRAW);
        })?;
        self.dynamic_sizes.insert(buffer.0, size);
        Ok(VertexBufferId::new(buffer.0))
    }

    pub fn create_index_buffer(&self, indices: &[u16]) -> GfxResult<IndexBufferId> {
        let data: &[u8] = bytemuck::cast_slice(indices);
        let buffer = self.create_buffer("CreateIb", glow::ELEMENT_ARRAY_BUFFER, |gl| unsafe {
            gl.buffer_data_u8_slice(glow::ELEMENT_ARRAY_BUFFER, data, glow::STATIC_DRAW);
        })?;
        Ok(IndexBufferId::new(buffer.0))
    }

    pub fn bind_vertex_buffer(&self, vb: Option<VertexBufferId>) {
        unsafe {
            self.gl
                .bind_buffer(glow::ARRAY_BUFFER, vb.map(|id| native_buffer(id.get())));
        }
    }

    pub fn bind_index_buffer(&self, ib: Option<IndexBufferId>) {
        unsafe {
            self.gl
                .bind_buffer(glow::ELEMENT_ARRAY_BUFFER, ib.map(|id| native_buffer(id.get())));
        }
    }

    /// Orphans the buffer's old storage, then writes `data` at the start.
    pub fn set_dynamic_data(&mut self, vb: VertexBufferId, data: &[u8]) {
        let size = orphan_size(self.dynamic_sizes.get(&vb.get()).copied(), data.len());
        unsafe {
            self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(native_buffer(vb.get())));
            self.gl
                .buffer_data_size(glow::ARRAY_BUFFER, size as i32, glow::DYNAMIC_DRAW);
            self.gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, data);
        }
        self.dynamic_sizes.insert(vb.get(), size);
    }

    pub fn delete_buffer(&mut self, raw: NonZeroU32) {
        self.dynamic_sizes.remove(&raw);
        unsafe {
            self.gl.delete_buffer(native_buffer(raw));
        }
    }

    /// Indexed triangles from the bound element buffer.
    pub fn draw_elements(&self, index_count: u32) {
        unsafe {
            self.gl
                .draw_elements(glow::TRIANGLES, index_count as i32, glow::UNSIGNED_SHORT, 0);
        }
    }

    pub fn draw_lines(&self, vertex_count: u32) {
        unsafe {
            self.gl.draw_arrays(glow::LINES, 0, vertex_count as i32);
        }
    }

    // --- Diagnostics ---

    pub fn read_framebuffer(&self, width: u32, height: u32) -> GfxResult<Framebuffer> {
        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        unsafe {
            self.gl.read_pixels(
                0,
                0,
                width as i32,
                height as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelPackData::Slice(Some(&mut pixels)),
            );
        }
        self.check("ReadPixels")?;
        Ok(Framebuffer {
            width,
            height,
            pixels,
            bottom_up: true,
        })
    }

    pub fn renderer(&self) -> String {
        unsafe { self.gl.get_parameter_string(glow::RENDERER) }
    }

    pub fn api_info(&self, kind: BackendType) -> ApiInfo {
        let gl = &self.gl;
        let (vendor, version, depth_bits) = unsafe {
            (
                gl.get_parameter_string(glow::VENDOR),
                gl.get_parameter_string(glow::VERSION),
                gl.get_parameter_i32(DEPTH_BITS),
            )
        };
        ApiInfo {
            backend: format!("-- Using {kind} ({} bit) --", usize::BITS),
            adapter: format!("Vendor: {vendor}"),
            driver: format!("Renderer: {}", self.renderer()),
            version: format!("GL version: {version}"),
            memory: String::new(),
            max_texture_size: format!(
                "Max texture size: ({0}, {0})",
                self.max_texture_size
            ),
            depth_buffer: format!("Depth buffer bits: {depth_bits}"),
        }
    }

    /// Only NVIDIA drivers expose free/total video memory.
    pub fn memory_usage(&self) -> Option<String> {
        if !self.gpu_memory_info {
            return None;
        }
        let (total, free) = unsafe {
            (
                self.gl.get_parameter_i32(GPU_MEMORY_TOTAL_KB),
                self.gl.get_parameter_i32(GPU_MEMORY_FREE_KB),
            )
        };
        let line = api_info::memory_line(total, free);
        if line.is_none() {
            warn!("Driver reported no usable video memory figures.");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::{
        INTEL_WARNINGS, LEGACY_WARNINGS, blend_factor, compare_func, orphan_size, warnings_for,
    };
    use crate::core::gfx::state::{BlendFactor, CompareFunc};

    #[test]
    fn compare_funcs_map_to_gl_enums() {
        assert_eq!(compare_func(CompareFunc::Always), glow::ALWAYS);
        assert_eq!(compare_func(CompareFunc::LessEqual), glow::LEQUAL);
        assert_eq!(compare_func(CompareFunc::GreaterEqual), glow::GEQUAL);
        assert_eq!(compare_func(CompareFunc::Greater), glow::GREATER);
    }

    #[test]
    fn blend_factors_map_to_gl_enums() {
        assert_eq!(blend_factor(BlendFactor::InvSrcAlpha), glow::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend_factor(BlendFactor::InvDstAlpha), glow::ONE_MINUS_DST_ALPHA);
        assert_eq!(blend_factor(BlendFactor::Zero), glow::ZERO);
    }

    #[test]
    fn intel_renderers_are_flagged() {
        let w = warnings_for("Intel(R) HD Graphics 620", false);
        assert!(w.known_issues);
        assert_eq!(w.lines, INTEL_WARNINGS.to_vec());

        let w = warnings_for("GeForce GTX 1060/PCIe/SSE2", false);
        assert!(!w.known_issues);
        assert!(w.lines.is_empty());
    }

    #[test]
    fn legacy_notice_comes_first() {
        let w = warnings_for("Mesa Intel(R) UHD Graphics", true);
        assert_eq!(w.lines.len(), 6);
        assert_eq!(w.lines[..3], LEGACY_WARNINGS);
        assert!(w.known_issues);
    }

    #[test]
    fn dynamic_rewrites_respecify_the_whole_buffer() {
        assert_eq!(orphan_size(Some(4096), 96), 4096);
        assert_eq!(orphan_size(Some(64), 96), 96);
        assert_eq!(orphan_size(None, 96), 96);
    }
}
