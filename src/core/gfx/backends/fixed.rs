//! Fixed-function pipeline state shared by the display-list and
//! buffer-object backends.

use super::ffi::{self, FixedFunctionGl};
use super::gl::{GlContext, compare_func, toggle};
use crate::core::gfx::error::GfxResult;
use crate::core::gfx::state::{FogMode, StateChange};
use crate::core::gfx::{MatrixType, VertexFormat};
use glow::HasContext;
use glam::Mat4;
use std::ffi::{CStr, c_void};

#[inline(always)]
pub const fn fog_mode(mode: FogMode) -> i32 {
    (match mode {
        FogMode::Linear => glow::LINEAR,
        FogMode::Exp => ffi::EXP,
        FogMode::Exp2 => ffi::EXP2,
    }) as i32
}

#[inline(always)]
pub const fn matrix_mode(ty: MatrixType) -> u32 {
    match ty {
        MatrixType::Projection => ffi::PROJECTION,
        MatrixType::View => ffi::MODELVIEW,
        MatrixType::Texture => ffi::TEXTURE,
    }
}

pub struct FixedFunction {
    pub ffi: FixedFunctionGl,
    // glMatrixMode is only re-issued when the target changes.
    current_matrix: Option<MatrixType>,
}

impl FixedFunction {
    pub fn load(loader: impl FnMut(&CStr) -> *const c_void) -> GfxResult<Self> {
        Ok(Self {
            ffi: FixedFunctionGl::load(loader)?,
            current_matrix: None,
        })
    }

    pub fn set_default_state(&mut self, ctx: &GlContext) {
        ctx.set_default_state();
        self.current_matrix = None;
        unsafe {
            ctx.gl.hint(ffi::FOG_HINT, glow::NICEST);
            self.ffi.alpha_func(glow::GREATER, 0.5);
            self.ffi.enable_client_state(ffi::VERTEX_ARRAY);
            self.ffi.enable_client_state(ffi::COLOR_ARRAY);
        }
    }

    pub fn apply_state(&self, ctx: &GlContext, change: StateChange) -> GfxResult<()> {
        if ctx.apply_common(change) {
            return Ok(());
        }
        let gl = &ctx.gl;
        unsafe {
            match change {
                StateChange::Fog(on) => toggle(gl, ffi::FOG, on),
                StateChange::FogColor(color) => self.ffi.fogfv(ffi::FOG_COLOR, &color.to_f32()),
                StateChange::FogDensity(d) => self.ffi.fogf(ffi::FOG_DENSITY, d),
                StateChange::FogEnd(end) => self.ffi.fogf(ffi::FOG_END, end),
                StateChange::FogMode(mode) => self.ffi.fogi(ffi::FOG_MODE, fog_mode(mode)),
                StateChange::AlphaTest(on) => toggle(gl, ffi::ALPHA_TEST, on),
                StateChange::AlphaTestFunc(func, reference) => {
                    self.ffi.alpha_func(compare_func(func), reference);
                }
                StateChange::Texturing(on) => toggle(gl, glow::TEXTURE_2D, on),
                _ => {}
            }
        }
        Ok(())
    }

    fn select_matrix(&mut self, ty: MatrixType) {
        if self.current_matrix != Some(ty) {
            self.current_matrix = Some(ty);
            unsafe { self.ffi.matrix_mode(matrix_mode(ty)) };
        }
    }

    pub fn load_matrix(&mut self, ty: MatrixType, matrix: &Mat4) {
        self.select_matrix(ty);
        unsafe { self.ffi.load_matrix(&matrix.to_cols_array()) };
    }

    pub fn load_identity(&mut self, ty: MatrixType) {
        self.select_matrix(ty);
        unsafe { self.ffi.load_identity() };
    }

    /// Toggles the texture coordinate stream for `format`.
    pub fn set_vertex_format(&self, format: VertexFormat) {
        unsafe {
            if format.has_uv() {
                self.ffi.enable_client_state(ffi::TEXTURE_COORD_ARRAY);
            } else {
                self.ffi.disable_client_state(ffi::TEXTURE_COORD_ARRAY);
            }
        }
    }

    /// Points the client arrays at a vertex of `format` starting at `base`.
    /// `base` is either client memory or an offset into the bound buffer.
    pub unsafe fn point_arrays(&self, format: VertexFormat, base: *const u8) {
        let stride = format.stride() as i32;
        unsafe {
            self.ffi.vertex_pointer(3, glow::FLOAT, stride, base);
            self.ffi.color_pointer(
                4,
                glow::UNSIGNED_BYTE,
                stride,
                base.wrapping_add(VertexFormat::COLOR_OFFSET),
            );
            if format.has_uv() {
                self.ffi
                    .tex_coord_pointer(2, glow::FLOAT, stride, base.wrapping_add(VertexFormat::UV_OFFSET));
            }
        }
    }
}
