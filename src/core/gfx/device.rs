//! The device facade: one owned context object composing the render-state
//! cache, resource manager, draw dispatcher and lifecycle controller over a
//! single [`Backend`].

use crate::core::gfx::api_info::ApiInfo;
use crate::core::gfx::backend::{Backend, Capabilities, DeviceStatus, PresentOutcome, TextureDesc, TexturePool};
use crate::core::gfx::dispatch::{VertexLayout, default_indices, index_count};
use crate::core::gfx::error::{GfxError, GfxResult};
use crate::core::gfx::handle::{IndexBufferId, TextureId, VertexBufferId};
use crate::core::gfx::lifecycle::{self, ContextEvent, ContextState, LOST_CONTEXT_POLL, Lifecycle};
use crate::core::gfx::mipmap;
use crate::core::gfx::screenshot;
use crate::core::gfx::state::{BlendFactor, ColorMask, CompareFunc, FogMode, RenderState, StateChange};
use crate::core::gfx::{
    ColoredVertex, DrawPass, MatrixType, PackedColor, Texture, TexturedVertex, Vertex, VertexFormat,
};
use glam::Mat4;
use image::RgbaImage;
use log::{debug, error, info, trace, warn};
use std::io::Write;
use std::time::Duration;

/// Default cap on low-VRAM retries for a single allocation.
pub const LOW_VRAM_RETRIES: u32 = 16;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceSettings {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub mipmaps: bool,
    pub managed_textures: bool,
    pub lost_context_poll: Duration,
    pub low_vram_retries: u32,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            vsync: true,
            mipmaps: false,
            managed_textures: true,
            lost_context_poll: LOST_CONTEXT_POLL,
            low_vram_retries: LOW_VRAM_RETRIES,
        }
    }
}

/// Buffers the device owns for its own 2D helpers.
#[derive(Debug, Default)]
struct DefaultResources {
    quad_vb: Option<VertexBufferId>,
    tex_vb: Option<VertexBufferId>,
    index: Option<IndexBufferId>,
}

const MATRIX_SLOTS: [MatrixType; 3] = [MatrixType::Projection, MatrixType::View, MatrixType::Texture];

#[inline(always)]
const fn matrix_slot(ty: MatrixType) -> usize {
    match ty {
        MatrixType::Projection => 0,
        MatrixType::View => 1,
        MatrixType::Texture => 2,
    }
}

type FatalHook = Box<dyn FnMut(&GfxError)>;

fn log_fatal(err: &GfxError) {
    error!("Fatal graphics error (code {:#x}): {err}", err.code());
}

pub struct Device<B: Backend> {
    backend: B,
    caps: Capabilities,
    settings: DeviceSettings,
    lifecycle: Lifecycle,
    state: RenderState,
    format: Option<VertexFormat>,
    layout: Option<VertexLayout<B>>,
    defaults: DefaultResources,
    // 3D matrices restored by `mode_3d`.
    projection: Mat4,
    view: Mat4,
    // Last matrix loaded into each slot, re-issued after a reset.
    loaded: [Option<Mat4>; 3],
    had_fog: bool,
    size: (u32, u32),
    vsync: bool,
    api_info: ApiInfo,
    lost_tick: Option<Box<dyn FnMut()>>,
    on_fatal: FatalHook,
}

impl<B: Backend> Device<B> {
    /// Brings up the device: default state, shared buffers and API info.
    pub fn new(backend: B, settings: DeviceSettings) -> GfxResult<Self> {
        let caps = backend.capabilities();
        info!("Initializing {} graphics device...", backend.name());
        let mut device = Self {
            backend,
            caps,
            settings,
            lifecycle: Lifecycle::new(),
            state: RenderState::default(),
            format: None,
            layout: None,
            defaults: DefaultResources::default(),
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            loaded: [None; 3],
            had_fog: false,
            size: (settings.width, settings.height),
            vsync: settings.vsync,
            api_info: ApiInfo::default(),
            lost_tick: None,
            on_fatal: Box::new(log_fatal),
        };

        device
            .backend
            .set_default_state()
            .map_err(|e| device.report(e))?;
        device.init_default_resources()?;
        device.make_api_info();
        for line in device.api_info.lines().into_iter().filter(|l| !l.is_empty()) {
            info!("{line}");
        }
        info!("Graphics device initialized.");
        Ok(device)
    }

    /// Frees the shared buffers and the backend. The device is unusable
    /// afterwards.
    pub fn shutdown(&mut self) {
        if self.lifecycle.state() == ContextState::Freed {
            return;
        }
        info!("Shutting down graphics device...");
        self.free_default_resources();
        self.backend.shutdown();
        self.lifecycle.mark_freed();
    }

    // --- Accessors ---

    #[inline(always)]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    #[inline(always)]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline(always)]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    #[inline(always)]
    pub const fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    #[inline(always)]
    pub const fn render_state(&self) -> &RenderState {
        &self.state
    }

    #[inline(always)]
    pub const fn vertex_format(&self) -> Option<VertexFormat> {
        self.format
    }

    #[inline(always)]
    pub const fn context_state(&self) -> ContextState {
        self.lifecycle.state()
    }

    #[inline(always)]
    pub const fn is_lost(&self) -> bool {
        self.lifecycle.is_lost()
    }

    #[inline(always)]
    pub const fn size(&self) -> (u32, u32) {
        self.size
    }

    #[inline(always)]
    pub const fn vsync(&self) -> bool {
        self.vsync
    }

    #[inline(always)]
    pub const fn quad_vb(&self) -> Option<VertexBufferId> {
        self.defaults.quad_vb
    }

    #[inline(always)]
    pub const fn tex_vb(&self) -> Option<VertexBufferId> {
        self.defaults.tex_vb
    }

    #[inline(always)]
    pub const fn default_ib(&self) -> Option<IndexBufferId> {
        self.defaults.index
    }

    // --- Hooks ---

    pub fn subscribe(&mut self, listener: impl FnMut(ContextEvent) + 'static) {
        self.lifecycle.subscribe(listener);
    }

    /// Called on every retry while waiting for a lost device, so the host can
    /// keep its window alive.
    pub fn set_lost_context_tick(&mut self, tick: impl FnMut() + 'static) {
        self.lost_tick = Some(Box::new(tick));
    }

    /// Receives every unrecoverable error before it is returned.
    pub fn set_fatal_hook(&mut self, hook: impl FnMut(&GfxError) + 'static) {
        self.on_fatal = Box::new(hook);
    }

    fn report(&mut self, err: GfxError) -> GfxError {
        (self.on_fatal)(&err);
        err
    }

    /// Runs an allocation, raising `LowVram` and retrying while the backend
    /// reports exhausted video memory.
    fn with_vram_retry<T>(&mut self, mut op: impl FnMut(&mut B) -> GfxResult<T>) -> GfxResult<T> {
        let mut attempts = 0;
        loop {
            match op(&mut self.backend) {
                Ok(v) => return Ok(v),
                Err(e) if e.is_recoverable() && attempts < self.settings.low_vram_retries => {
                    attempts += 1;
                    warn!(
                        "{e}; retrying ({attempts}/{}).",
                        self.settings.low_vram_retries
                    );
                    self.lifecycle.raise(ContextEvent::LowVram);
                }
                Err(e) => return Err(self.report(e)),
            }
        }
    }

    // --- Context lifecycle ---

    fn init_default_resources(&mut self) -> GfxResult<()> {
        let indices = default_indices();
        let ib = self.with_vram_retry(|b| b.create_index_buffer(&indices))?;
        self.defaults.index = Some(ib);
        self.defaults.quad_vb =
            Some(self.with_vram_retry(|b| b.create_dynamic_vertex_buffer(VertexFormat::Colored, 4))?);
        self.defaults.tex_vb =
            Some(self.with_vram_retry(|b| b.create_dynamic_vertex_buffer(VertexFormat::Textured, 4))?);
        self.backend.bind_index_buffer(Some(ib)).map_err(|e| self.report(e))
    }

    fn free_default_resources(&mut self) {
        if let Some(vb) = self.defaults.quad_vb.take() {
            self.backend.delete_vertex_buffer(vb);
        }
        if let Some(vb) = self.defaults.tex_vb.take() {
            self.backend.delete_vertex_buffer(vb);
        }
        if let Some(ib) = self.defaults.index.take() {
            self.backend.delete_index_buffer(ib);
        }
    }

    /// Marks the context lost, tells listeners, and drops the shared buffers.
    /// Does nothing if the context is already lost.
    pub fn lose_context(&mut self, reason: &str) {
        if !self.lifecycle.mark_lost(reason) {
            return;
        }
        self.lifecycle.raise(ContextEvent::ContextLost);
        self.free_default_resources();
        self.backend.release_device_objects();
    }

    /// Re-issues all cached state to the (reset) device, tells listeners, and
    /// re-creates the shared buffers.
    pub fn recreate_context(&mut self) -> GfxResult<()> {
        if !self.lifecycle.is_lost() {
            debug!("Context is {:?}; nothing to recreate.", self.lifecycle.state());
            return Ok(());
        }
        self.lifecycle.begin_recreate();
        self.restore_device_state().map_err(|e| self.report(e))?;
        self.lifecycle.finish_recreate();

        self.lifecycle.raise(ContextEvent::ContextRecreated);
        self.init_default_resources()
    }

    fn restore_device_state(&mut self) -> GfxResult<()> {
        self.backend.set_default_state()?;
        for change in self.state.replay() {
            trace!("Replaying {change:?}");
            self.backend.apply_state(change)?;
        }
        if let Some(format) = self.format {
            self.backend.set_vertex_format(format)?;
        }
        for ty in MATRIX_SLOTS {
            if let Some(m) = self.loaded[matrix_slot(ty)] {
                self.backend.load_matrix(ty, &m)?;
            }
        }
        Ok(())
    }

    /// Sleeps and polls until the backend says the device can be reset.
    fn wait_for_device(&mut self) -> u32 {
        let backend = &mut self.backend;
        let tick = &mut self.lost_tick;
        lifecycle::wait_until_ready(
            || backend.poll_device() != DeviceStatus::Lost,
            || {
                if let Some(f) = tick.as_mut() {
                    f();
                }
            },
            self.settings.lost_context_poll,
        )
    }

    /// Resets the backend device (waiting out any loss) and recreates the
    /// context on top of it.
    pub fn recreate_device(&mut self) -> GfxResult<()> {
        let (width, height) = self.size;
        loop {
            match self.backend.reset_device(width, height, self.vsync) {
                Ok(DeviceStatus::Lost) => {
                    let ticks = self.wait_for_device();
                    debug!("Device became resettable after {ticks} tick(s).");
                }
                Ok(_) => break,
                Err(e) => return Err(self.report(e)),
            }
        }
        self.recreate_context()
    }

    pub fn on_window_resize(&mut self, width: u32, height: u32) -> GfxResult<()> {
        if width == 0 || height == 0 {
            warn!("Ignoring resize to zero dimensions.");
            return Ok(());
        }
        self.size = (width, height);
        if self.caps.resize_resets_device {
            self.lose_context(" (resizing window)");
            return self.recreate_device();
        }
        if self.is_lost() {
            return Ok(());
        }
        self.backend.resize(width, height).map_err(|e| self.report(e))
    }

    pub fn set_vsync(&mut self, enabled: bool) -> GfxResult<()> {
        if self.vsync == enabled {
            return Ok(());
        }
        self.vsync = enabled;
        info!("VSync {}", if enabled { "on" } else { "off" });
        if self.caps.vsync_resets_device {
            self.lose_context(" (toggling VSync)");
            return self.recreate_device();
        }
        if self.is_lost() {
            return Ok(());
        }
        self.backend.set_vsync(enabled).map_err(|e| self.report(e))
    }

    // --- Frame ---

    pub fn begin_frame(&mut self) -> GfxResult<()> {
        if self.is_lost() {
            return Ok(());
        }
        self.backend.begin_frame().map_err(|e| self.report(e))
    }

    pub fn clear(&mut self) -> GfxResult<()> {
        if self.is_lost() {
            return Ok(());
        }
        self.backend.clear().map_err(|e| self.report(e))
    }

    /// Presents the frame. A lost device is waited out and rebuilt here.
    pub fn end_frame(&mut self) -> GfxResult<()> {
        if self.is_lost() {
            return Ok(());
        }
        match self.backend.present() {
            Ok(PresentOutcome::Presented) => Ok(()),
            Ok(PresentOutcome::DeviceLost) => {
                self.lose_context(" (device lost)");
                self.wait_for_device();
                self.recreate_device()
            }
            Err(e) => Err(self.report(e)),
        }
    }

    // --- Render state ---

    fn change(&mut self, change: StateChange) -> GfxResult<()> {
        if !self.state.apply(change) {
            return Ok(());
        }
        if self.is_lost() {
            trace!("Deferring {change:?} until the context is recreated.");
            return Ok(());
        }
        self.backend.apply_state(change).map_err(|e| self.report(e))
    }

    pub fn set_fog(&mut self, enabled: bool) -> GfxResult<()> {
        self.change(StateChange::Fog(enabled))
    }
    pub fn set_fog_color(&mut self, color: PackedColor) -> GfxResult<()> {
        self.change(StateChange::FogColor(color))
    }
    pub fn set_fog_density(&mut self, density: f32) -> GfxResult<()> {
        self.change(StateChange::FogDensity(density))
    }
    pub fn set_fog_end(&mut self, end: f32) -> GfxResult<()> {
        self.change(StateChange::FogEnd(end))
    }
    pub fn set_fog_mode(&mut self, mode: FogMode) -> GfxResult<()> {
        self.change(StateChange::FogMode(mode))
    }

    #[inline(always)]
    pub fn fog_enabled(&self) -> bool {
        self.state.fog_enabled()
    }

    pub fn set_alpha_test(&mut self, enabled: bool) -> GfxResult<()> {
        self.change(StateChange::AlphaTest(enabled))
    }
    pub fn set_alpha_test_func(&mut self, func: CompareFunc, reference: f32) -> GfxResult<()> {
        self.change(StateChange::AlphaTestFunc(func, reference))
    }
    pub fn set_alpha_blending(&mut self, enabled: bool) -> GfxResult<()> {
        self.change(StateChange::AlphaBlending(enabled))
    }
    pub fn set_alpha_blend_func(&mut self, src: BlendFactor, dst: BlendFactor) -> GfxResult<()> {
        self.change(StateChange::BlendFunc(src, dst))
    }
    pub fn set_alpha_arg_blend(&mut self, enabled: bool) -> GfxResult<()> {
        self.change(StateChange::AlphaArgBlend(enabled))
    }
    pub fn set_depth_test(&mut self, enabled: bool) -> GfxResult<()> {
        self.change(StateChange::DepthTest(enabled))
    }
    pub fn set_depth_write(&mut self, enabled: bool) -> GfxResult<()> {
        self.change(StateChange::DepthWrite(enabled))
    }
    pub fn set_depth_test_func(&mut self, func: CompareFunc) -> GfxResult<()> {
        self.change(StateChange::DepthTestFunc(func))
    }
    pub fn set_face_culling(&mut self, enabled: bool) -> GfxResult<()> {
        self.change(StateChange::FaceCulling(enabled))
    }
    pub fn set_color_write_mask(&mut self, r: bool, g: bool, b: bool, a: bool) -> GfxResult<()> {
        self.change(StateChange::ColorWrite(ColorMask { r, g, b, a }))
    }
    pub fn clear_color(&mut self, color: PackedColor) -> GfxResult<()> {
        self.change(StateChange::ClearColor(color))
    }
    pub fn set_texturing(&mut self, enabled: bool) -> GfxResult<()> {
        self.change(StateChange::Texturing(enabled))
    }

    pub fn setup_alpha_state(&mut self, pass: DrawPass) -> GfxResult<()> {
        match pass {
            DrawPass::Translucent => self.set_alpha_blending(true),
            DrawPass::Transparent | DrawPass::TransparentThick | DrawPass::Sprite => {
                self.set_alpha_test(true)
            }
            DrawPass::Opaque | DrawPass::Gas => Ok(()),
        }
    }

    pub fn restore_alpha_state(&mut self, pass: DrawPass) -> GfxResult<()> {
        match pass {
            DrawPass::Translucent => self.set_alpha_blending(false),
            DrawPass::Transparent | DrawPass::TransparentThick | DrawPass::Sprite => {
                self.set_alpha_test(false)
            }
            DrawPass::Opaque | DrawPass::Gas => Ok(()),
        }
    }

    /// Switches the active vertex format, and with it the attribute setup
    /// used by the draw calls.
    pub fn set_vertex_format(&mut self, format: VertexFormat) -> GfxResult<()> {
        if self.format == Some(format) {
            return Ok(());
        }
        self.format = Some(format);
        self.layout = Some(B::vertex_layout(format));
        if self.is_lost() {
            return Ok(());
        }
        self.backend.set_vertex_format(format).map_err(|e| self.report(e))
    }

    // --- Matrices ---

    pub fn load_matrix(&mut self, ty: MatrixType, matrix: &Mat4) -> GfxResult<()> {
        self.loaded[matrix_slot(ty)] = Some(*matrix);
        if self.is_lost() {
            return Ok(());
        }
        self.backend.load_matrix(ty, matrix).map_err(|e| self.report(e))
    }

    pub fn load_identity(&mut self, ty: MatrixType) -> GfxResult<()> {
        self.loaded[matrix_slot(ty)] = Some(Mat4::IDENTITY);
        if self.is_lost() {
            return Ok(());
        }
        self.backend.load_identity(ty).map_err(|e| self.report(e))
    }

    /// Stores and loads the 3D projection.
    pub fn set_projection(&mut self, matrix: Mat4) -> GfxResult<()> {
        self.projection = matrix;
        self.load_matrix(MatrixType::Projection, &matrix)
    }

    /// Stores and loads the 3D view (camera) matrix.
    pub fn set_view(&mut self, matrix: Mat4) -> GfxResult<()> {
        self.view = matrix;
        self.load_matrix(MatrixType::View, &matrix)
    }

    #[inline(always)]
    pub const fn projection(&self) -> &Mat4 {
        &self.projection
    }

    #[inline(always)]
    pub const fn view(&self) -> &Mat4 {
        &self.view
    }

    /// Screen-space projection with (0, 0) at the top left.
    pub fn ortho_matrix(width: f32, height: f32) -> Mat4 {
        Mat4::orthographic_rh_gl(0.0, width, height, 0.0, -10000.0, 10000.0)
    }

    pub fn perspective_matrix(fov_y: f32, aspect: f32, z_near: f32, z_far: f32) -> Mat4 {
        Mat4::perspective_rh_gl(fov_y, aspect, z_near, z_far)
    }

    /// 2D overlay mode: pixel projection, no depth test, blending on, fog
    /// suspended.
    pub fn mode_2d(&mut self, width: u32, height: u32) -> GfxResult<()> {
        let ortho = Self::ortho_matrix(width as f32, height as f32);
        self.load_matrix(MatrixType::Projection, &ortho)?;
        self.load_identity(MatrixType::View)?;

        self.set_depth_test(false)?;
        self.set_alpha_blending(true)?;
        self.had_fog = self.fog_enabled();
        if self.had_fog {
            self.set_fog(false)?;
        }
        Ok(())
    }

    /// Undoes [`Self::mode_2d`].
    pub fn mode_3d(&mut self) -> GfxResult<()> {
        let (projection, view) = (self.projection, self.view);
        self.load_matrix(MatrixType::Projection, &projection)?;
        self.load_matrix(MatrixType::View, &view)?;

        self.set_depth_test(true)?;
        self.set_alpha_blending(false)?;
        if self.had_fog {
            self.set_fog(true)?;
        }
        Ok(())
    }

    // --- Textures ---

    /// Uploads `image` as a new texture. Dimensions must be powers of two.
    pub fn create_texture(&mut self, image: &RgbaImage, managed: bool, mipmaps: bool) -> GfxResult<TextureId> {
        let (width, height) = image.dimensions();
        if !width.is_power_of_two() || !height.is_power_of_two() {
            return Err(self.report(GfxError::NonPowerOfTwo { width, height }));
        }
        let mip_levels = if mipmaps {
            mipmap::level_count(width, height, self.caps.mip_policy)
        } else {
            0
        };
        let desc = TextureDesc {
            width,
            height,
            mip_levels,
            pool: TexturePool::Managed,
        };

        if managed || !self.caps.staged_uploads {
            let tex = self.with_vram_retry(|b| b.create_texture(&desc))?;
            if let Err(e) = self.upload_levels(tex, image, mip_levels) {
                self.backend.delete_texture(tex);
                return Err(e);
            }
            return Ok(tex);
        }

        let staging_desc = desc.with_pool(TexturePool::Staging);
        let staging = self.with_vram_retry(|b| b.create_texture(&staging_desc))?;
        if let Err(e) = self.upload_levels(staging, image, mip_levels) {
            self.backend.delete_texture(staging);
            return Err(e);
        }

        let gpu_desc = desc.with_pool(TexturePool::Device);
        let gpu = self.with_vram_retry(|b| b.create_texture(&gpu_desc))?;
        self.backend
            .copy_texture(staging, gpu)
            .map_err(|e| self.report(e))?;
        self.backend.delete_texture(staging);
        Ok(gpu)
    }

    fn upload_levels(&mut self, tex: TextureId, image: &RgbaImage, mip_levels: u32) -> GfxResult<()> {
        let backend = &mut self.backend;
        let res = backend.upload_texture(tex, 0, image).and_then(|()| {
            mipmap::for_each_level(image, 0, 0, mip_levels, |lvl| {
                backend.upload_texture(tex, lvl.level, lvl.image)
            })
        });
        res.map_err(|e| self.report(e))
    }

    /// Overwrites the `part`-sized region at (`x`, `y`). With `mipmaps`, the
    /// matching region of each reduced level is regenerated from `part`.
    pub fn update_texture_part(
        &mut self,
        tex: TextureId,
        x: u32,
        y: u32,
        part: &RgbaImage,
        mipmaps: bool,
    ) -> GfxResult<()> {
        let levels = if mipmaps {
            mipmap::level_count(part.width(), part.height(), self.caps.mip_policy)
        } else {
            0
        };
        let backend = &mut self.backend;
        let res = backend
            .upload_texture_region(tex, 0, x, y, part)
            .and_then(|()| {
                mipmap::for_each_level(part, x, y, levels, |lvl| {
                    backend.upload_texture_region(tex, lvl.level, lvl.x, lvl.y, lvl.image)
                })
            });
        res.map_err(|e| self.report(e))
    }

    pub fn bind_texture(&mut self, tex: Option<TextureId>) -> GfxResult<()> {
        if self.is_lost() {
            return Ok(());
        }
        self.backend.bind_texture(tex).map_err(|e| self.report(e))
    }

    /// Releases `tex` and resets it to `None`. A `None` handle is ignored.
    pub fn delete_texture(&mut self, tex: &mut Option<TextureId>) {
        if let Some(id) = tex.take() {
            self.backend.delete_texture(id);
        }
    }

    pub fn enable_mipmaps(&mut self) -> GfxResult<()> {
        self.backend.set_mipmaps(true).map_err(|e| self.report(e))
    }

    pub fn disable_mipmaps(&mut self) -> GfxResult<()> {
        self.backend.set_mipmaps(false).map_err(|e| self.report(e))
    }

    // --- Buffers ---

    pub fn create_dynamic_vb(&mut self, format: VertexFormat, max_vertices: u32) -> GfxResult<VertexBufferId> {
        self.with_vram_retry(|b| b.create_dynamic_vertex_buffer(format, max_vertices))
    }

    pub fn create_vb<V: Vertex>(&mut self, vertices: &[V]) -> GfxResult<VertexBufferId> {
        let data: &[u8] = bytemuck::cast_slice(vertices);
        self.with_vram_retry(|b| b.create_vertex_buffer(V::FORMAT, data))
    }

    pub fn create_ib(&mut self, indices: &[u16]) -> GfxResult<IndexBufferId> {
        self.with_vram_retry(|b| b.create_index_buffer(indices))
    }

    pub fn bind_vb(&mut self, vb: Option<VertexBufferId>) -> GfxResult<()> {
        if self.is_lost() {
            return Ok(());
        }
        self.backend.bind_vertex_buffer(vb).map_err(|e| self.report(e))
    }

    pub fn bind_ib(&mut self, ib: Option<IndexBufferId>) -> GfxResult<()> {
        if self.is_lost() {
            return Ok(());
        }
        self.backend.bind_index_buffer(ib).map_err(|e| self.report(e))
    }

    /// Replaces the contents of a dynamic buffer and leaves it bound.
    pub fn set_dynamic_vb_data<V: Vertex>(&mut self, vb: VertexBufferId, vertices: &[V]) -> GfxResult<()> {
        if self.is_lost() {
            return Ok(());
        }
        self.backend
            .set_dynamic_data(vb, bytemuck::cast_slice(vertices))
            .map_err(|e| self.report(e))
    }

    pub fn delete_vb(&mut self, vb: &mut Option<VertexBufferId>) {
        if let Some(id) = vb.take() {
            self.backend.delete_vertex_buffer(id);
        }
    }

    pub fn delete_ib(&mut self, ib: &mut Option<IndexBufferId>) {
        if let Some(id) = ib.take() {
            self.backend.delete_index_buffer(id);
        }
    }

    // --- Draws ---

    fn active_layout(&self) -> Option<VertexLayout<B>> {
        if self.is_lost() {
            return None;
        }
        if self.layout.is_none() {
            warn!("Draw issued before any vertex format was set; skipping.");
        }
        self.layout
    }

    pub fn draw_lines(&mut self, vertex_count: u32) {
        let Some(layout) = self.active_layout() else {
            return;
        };
        (layout.bind)(&mut self.backend);
        self.backend.draw_lines(vertex_count);
    }

    pub fn draw_indexed_tris(&mut self, vertex_count: u32) {
        let Some(layout) = self.active_layout() else {
            return;
        };
        (layout.bind)(&mut self.backend);
        self.backend.draw_indexed(index_count(vertex_count));
    }

    pub fn draw_indexed_tris_range(&mut self, vertex_count: u32, start_vertex: u32) {
        let Some(layout) = self.active_layout() else {
            return;
        };
        (layout.bind_range)(&mut self.backend, start_vertex);
        self.backend.draw_indexed(index_count(vertex_count));
    }

    /// Draws part of a textured buffer regardless of the active format.
    pub fn draw_indexed_textured_range(&mut self, vertex_count: u32, start_vertex: u32) {
        if self.is_lost() {
            return;
        }
        self.backend.draw_textured_range(vertex_count, start_vertex);
    }

    pub fn update_dynamic_lines<V: Vertex>(&mut self, vb: VertexBufferId, vertices: &[V]) -> GfxResult<()> {
        self.set_dynamic_vb_data(vb, vertices)?;
        self.draw_lines(vertices.len() as u32);
        Ok(())
    }

    pub fn update_dynamic_indexed_tris<V: Vertex>(
        &mut self,
        vb: VertexBufferId,
        vertices: &[V],
    ) -> GfxResult<()> {
        self.set_dynamic_vb_data(vb, vertices)?;
        self.draw_indexed_tris(vertices.len() as u32);
        Ok(())
    }

    // --- 2D helpers ---

    fn colored_quad(x: i32, y: i32, width: u32, height: u32, top: PackedColor, bottom: PackedColor) -> [ColoredVertex; 4] {
        let (x1, y1) = (x as f32, y as f32);
        let x2 = x.saturating_add_unsigned(width) as f32;
        let y2 = y.saturating_add_unsigned(height) as f32;
        [
            ColoredVertex::new(x1, y1, 0.0, top),
            ColoredVertex::new(x2, y1, 0.0, top),
            ColoredVertex::new(x2, y2, 0.0, bottom),
            ColoredVertex::new(x1, y2, 0.0, bottom),
        ]
    }

    pub fn draw_2d_flat(&mut self, x: i32, y: i32, width: u32, height: u32, color: PackedColor) -> GfxResult<()> {
        self.draw_2d_gradient(x, y, width, height, color, color)
    }

    pub fn draw_2d_gradient(
        &mut self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        top: PackedColor,
        bottom: PackedColor,
    ) -> GfxResult<()> {
        let Some(vb) = self.defaults.quad_vb else {
            return Ok(());
        };
        let verts = Self::colored_quad(x, y, width, height, top, bottom);
        self.set_vertex_format(VertexFormat::Colored)?;
        self.update_dynamic_indexed_tris(vb, &verts)
    }

    /// The four corners of `tex` as textured vertices tinted `color`.
    pub fn make_2d_quad(tex: &Texture, color: PackedColor) -> [TexturedVertex; 4] {
        let (x1, y1) = (tex.x as f32, tex.y as f32);
        let x2 = tex.x.saturating_add_unsigned(tex.width) as f32;
        let y2 = tex.y.saturating_add_unsigned(tex.height) as f32;
        let uv = tex.uv;
        [
            TexturedVertex::new(x1, y1, 0.0, color, uv.u1, uv.v1),
            TexturedVertex::new(x2, y1, 0.0, color, uv.u2, uv.v1),
            TexturedVertex::new(x2, y2, 0.0, color, uv.u2, uv.v2),
            TexturedVertex::new(x1, y2, 0.0, color, uv.u1, uv.v2),
        ]
    }

    pub fn draw_2d_texture(&mut self, tex: &Texture, color: PackedColor) -> GfxResult<()> {
        let Some(vb) = self.defaults.tex_vb else {
            return Ok(());
        };
        let verts = Self::make_2d_quad(tex, color);
        self.set_vertex_format(VertexFormat::Textured)?;
        self.update_dynamic_indexed_tris(vb, &verts)
    }

    pub fn render_texture(&mut self, tex: &Texture) -> GfxResult<()> {
        self.render_texture_shaded(tex, PackedColor::WHITE)
    }

    pub fn render_texture_shaded(&mut self, tex: &Texture, shade: PackedColor) -> GfxResult<()> {
        self.bind_texture(tex.id)?;
        self.draw_2d_texture(tex, shade)
    }

    // --- Diagnostics ---

    #[inline(always)]
    pub const fn api_info(&self) -> &ApiInfo {
        &self.api_info
    }

    /// Re-queries every info line from the backend.
    pub fn make_api_info(&mut self) {
        self.api_info = self.backend.api_info();
        self.update_api_info();
    }

    /// Refreshes the memory usage line, if the backend can report it.
    pub fn update_api_info(&mut self) {
        if let Some(line) = self.backend.memory_usage() {
            self.api_info.memory = line;
        }
    }

    /// Sends any compatibility warnings to `chat`. Returns whether the
    /// driver is known to misbehave.
    pub fn warn_if_necessary(&self, mut chat: impl FnMut(&str)) -> bool {
        let warnings = self.backend.compatibility_warnings();
        for line in &warnings.lines {
            chat(line);
        }
        warnings.known_issues
    }

    /// Reads back the front `width` x `height` pixels and writes them to
    /// `out` as PNG.
    pub fn take_screenshot<W: Write>(&mut self, out: W, width: u32, height: u32) -> GfxResult<()> {
        let fb = self.backend.read_framebuffer(width, height)?;
        screenshot::encode_png(&fb, out)
    }
}

impl<B: Backend> Drop for Device<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
