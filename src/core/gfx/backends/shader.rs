//! OpenGL ES 2.0 backend. Fixed-function state is emulated by switching
//! between generated shader programs; fog and the texture matrix are not
//! supported.

use super::gl::{self, GlContext};
use crate::core::gfx::api_info::ApiInfo;
use crate::core::gfx::backend::{
    Backend, Capabilities, CompatWarnings, DeviceStatus, Framebuffer, PresentOutcome, TextureDesc,
};
use crate::core::gfx::dispatch::{VertexLayout, vertex_offset};
use crate::core::gfx::error::{GfxError, GfxResult, ShaderStage};
use crate::core::gfx::handle::{IndexBufferId, TextureId, VertexBufferId};
use crate::core::gfx::mipmap::MipPolicy;
use crate::core::gfx::shader_variants::{
    ATTRIB_COL, ATTRIB_POS, ATTRIB_UV, DirtyUniforms, ProgramApi, ShaderFeatures, ShaderVariant,
    ShaderVariants,
};
use crate::core::gfx::state::StateChange;
use crate::core::gfx::{BackendType, MatrixType, VertexFormat, index_count};
use glam::Mat4;
use glow::HasContext;
use image::RgbaImage;
use log::{debug, warn};

/// Combined transform sent to every program: projection after view.
#[inline(always)]
pub fn model_view_projection(projection: &Mat4, view: &Mat4) -> Mat4 {
    *projection * *view
}

/// glow calls backing the program cache.
struct Programs<'a>(&'a glow::Context);

impl Programs<'_> {
    fn compile_stage(&self, stage: ShaderStage, src: &str) -> GfxResult<glow::Shader> {
        let gl = self.0;
        let ty = match stage {
            ShaderStage::Vertex => glow::VERTEX_SHADER,
            ShaderStage::Fragment => glow::FRAGMENT_SHADER,
        };
        unsafe {
            let sh = gl
                .create_shader(ty)
                .map_err(|log| GfxError::ShaderCompile { stage, log })?;
            gl.shader_source(sh, src);
            gl.compile_shader(sh);
            if !gl.get_shader_compile_status(sh) {
                let log = gl.get_shader_info_log(sh);
                gl.delete_shader(sh);
                return Err(GfxError::ShaderCompile { stage, log });
            }
            Ok(sh)
        }
    }
}

impl ProgramApi for Programs<'_> {
    type Program = glow::Program;
    type Location = glow::UniformLocation;

    fn compile(&mut self, variant: ShaderVariant) -> GfxResult<(glow::Program, Option<glow::UniformLocation>)> {
        let gl = self.0;
        let vert = self.compile_stage(ShaderStage::Vertex, &variant.vertex_source())?;
        let frag = match self.compile_stage(ShaderStage::Fragment, &variant.fragment_source()) {
            Ok(f) => f,
            Err(e) => {
                unsafe { gl.delete_shader(vert) };
                return Err(e);
            }
        };

        unsafe {
            let detach = |program| {
                gl.detach_shader(program, vert);
                gl.detach_shader(program, frag);
                gl.delete_shader(vert);
                gl.delete_shader(frag);
            };
            let program = match gl.create_program() {
                Ok(p) => p,
                Err(log) => {
                    gl.delete_shader(vert);
                    gl.delete_shader(frag);
                    return Err(GfxError::ShaderLink { log });
                }
            };
            gl.attach_shader(program, vert);
            gl.attach_shader(program, frag);
            gl.bind_attrib_location(program, ATTRIB_POS, "in_pos");
            gl.bind_attrib_location(program, ATTRIB_COL, "in_col");
            if variant.features().contains(ShaderFeatures::TEXTURED) {
                gl.bind_attrib_location(program, ATTRIB_UV, "in_uv");
            }
            gl.link_program(program);
            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                detach(program);
                gl.delete_program(program);
                return Err(GfxError::ShaderLink { log });
            }
            detach(program);

            let mvp = gl.get_uniform_location(program, "mvp");
            if mvp.is_none() {
                warn!("{variant:?} program has no mvp uniform.");
            }
            Ok((program, mvp))
        }
    }

    fn use_program(&mut self, program: glow::Program) {
        unsafe { self.0.use_program(Some(program)) };
    }

    fn upload_mvp(&mut self, location: &glow::UniformLocation, mvp: &Mat4) {
        unsafe {
            self.0
                .uniform_matrix_4_f32_slice(Some(location), false, &mvp.to_cols_array());
        }
    }

    fn delete_program(&mut self, program: glow::Program) {
        unsafe { self.0.delete_program(program) };
    }
}

pub struct ShaderBackend {
    ctx: GlContext,
    programs: ShaderVariants<glow::Program, glow::UniformLocation>,
    alpha_test: bool,
    format: VertexFormat,
    view: Mat4,
    projection: Mat4,
    mvp: Mat4,
}

impl ShaderBackend {
    pub fn new(ctx: GlContext) -> Self {
        Self {
            ctx,
            programs: ShaderVariants::default(),
            alpha_test: false,
            format: VertexFormat::Colored,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            mvp: Mat4::IDENTITY,
        }
    }

    /// Selects the program matching the current format and alpha test.
    fn switch_program(&mut self) -> GfxResult<()> {
        let variant = ShaderVariant::select(self.format.has_uv(), self.alpha_test);
        let mut api = Programs(&self.ctx.gl);
        if self.programs.select(&mut api, variant, &self.mvp)? {
            debug!("Switched to {variant:?} program.");
        }
        Ok(())
    }

    fn attrib_pointers(&self, format: VertexFormat, start: u32) {
        let gl = &self.ctx.gl;
        let stride = format.stride() as i32;
        let offset = vertex_offset(format, start) as i32;
        unsafe {
            gl.vertex_attrib_pointer_f32(ATTRIB_POS, 3, glow::FLOAT, false, stride, offset);
            gl.vertex_attrib_pointer_f32(
                ATTRIB_COL,
                4,
                glow::UNSIGNED_BYTE,
                true,
                stride,
                offset + VertexFormat::COLOR_OFFSET as i32,
            );
            if format.has_uv() {
                gl.vertex_attrib_pointer_f32(
                    ATTRIB_UV,
                    2,
                    glow::FLOAT,
                    false,
                    stride,
                    offset + VertexFormat::UV_OFFSET as i32,
                );
            }
        }
    }
}

fn bind_colored(b: &mut ShaderBackend) {
    b.attrib_pointers(VertexFormat::Colored, 0);
}

fn bind_textured(b: &mut ShaderBackend) {
    b.attrib_pointers(VertexFormat::Textured, 0);
}

fn bind_colored_range(b: &mut ShaderBackend, start: u32) {
    b.attrib_pointers(VertexFormat::Colored, start);
}

fn bind_textured_range(b: &mut ShaderBackend, start: u32) {
    b.attrib_pointers(VertexFormat::Textured, start);
}

impl Backend for ShaderBackend {
    fn name(&self) -> &'static str {
        "OpenGL ES 2.0"
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

    fn poll_device(&mut self) -> DeviceStatus {
        DeviceStatus::NeedsReset
    }

    fn reset_device(&mut self, width: u32, height: u32, _vsync: bool) -> GfxResult<DeviceStatus> {
        self.ctx.resize(width, height);
        Ok(DeviceStatus::Ready)
    }

    fn release_device_objects(&mut self) {
        let mut api = Programs(&self.ctx.gl);
        self.programs.destroy(&mut api);
    }

    fn set_default_state(&mut self) -> GfxResult<()> {
        self.ctx.set_default_state();
        unsafe {
            self.ctx.gl.enable_vertex_attrib_array(ATTRIB_POS);
            self.ctx.gl.enable_vertex_attrib_array(ATTRIB_COL);
        }
        self.switch_program()
    }

    fn resize(&mut self, width: u32, height: u32) -> GfxResult<()> {
        self.ctx.resize(width, height);
        Ok(())
    }

    fn set_vsync(&mut self, enabled: bool) -> GfxResult<()> {
        self.ctx.set_vsync(enabled)
    }

    fn shutdown(&mut self) {
        self.release_device_objects();
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
        if self.ctx.apply_common(change) {
            return Ok(());
        }
        if let StateChange::AlphaTest(on) = change {
            self.alpha_test = on;
            return self.switch_program();
        }
        // Fog, texturing and the alpha function are baked into the programs.
        Ok(())
    }

    fn set_vertex_format(&mut self, format: VertexFormat) -> GfxResult<()> {
        self.format = format;
        unsafe {
            if format.has_uv() {
                self.ctx.gl.enable_vertex_attrib_array(ATTRIB_UV);
            } else {
                self.ctx.gl.disable_vertex_attrib_array(ATTRIB_UV);
            }
        }
        self.switch_program()
    }

    fn load_matrix(&mut self, ty: MatrixType, matrix: &Mat4) -> GfxResult<()> {
        match ty {
            MatrixType::View => self.view = *matrix,
            MatrixType::Projection => self.projection = *matrix,
            MatrixType::Texture => return Ok(()),
        }
        self.mvp = model_view_projection(&self.projection, &self.view);
        self.programs.mark_dirty(DirtyUniforms::MVP);
        let mut api = Programs(&self.ctx.gl);
        self.programs.reload_uniforms(&mut api, &self.mvp);
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> GfxResult<TextureId> {
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
        Err(GfxError::Unsupported("texture copies on OpenGL ES".into()))
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
        self.attrib_pointers(VertexFormat::Textured, start_vertex);
        self.ctx.draw_elements(index_count(vertex_count));
    }

    fn api_info(&mut self) -> ApiInfo {
        self.ctx.api_info(BackendType::Shader)
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
    use super::model_view_projection;
    use glam::{Mat4, Vec3, Vec4};

    #[test]
    fn view_is_applied_before_projection() {
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let proj = Mat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0);
        let mvp = model_view_projection(&proj, &view);

        let p = Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_eq!(mvp * p, proj * (view * p));
    }

    #[test]
    fn identity_view_leaves_projection_alone() {
        let proj = Mat4::orthographic_rh_gl(0.0, 640.0, 480.0, 0.0, -1.0, 1.0);
        assert_eq!(model_view_projection(&proj, &Mat4::IDENTITY), proj);
    }
}
