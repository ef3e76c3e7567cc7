//! Call-recording backend for exercising the device facade without a GPU.

use crate::core::gfx::api_info::ApiInfo;
use crate::core::gfx::backend::{
    Backend, Capabilities, CompatWarnings, DeviceStatus, Framebuffer, PresentOutcome, TextureDesc,
};
use crate::core::gfx::dispatch::VertexLayout;
use crate::core::gfx::error::{GfxError, GfxResult};
use crate::core::gfx::handle::{IndexBufferId, TextureId, VertexBufferId};
use crate::core::gfx::mipmap::MipPolicy;
use crate::core::gfx::state::StateChange;
use crate::core::gfx::{MatrixType, VertexFormat};
use glam::Mat4;
use image::RgbaImage;

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    PollDevice,
    ResetDevice,
    ReleaseDeviceObjects,
    SetDefaultState,
    Resize(u32, u32),
    SetVsync(bool),
    Shutdown,
    BeginFrame,
    Clear,
    Present,
    ApplyState(StateChange),
    SetVertexFormat(VertexFormat),
    LoadMatrix(MatrixType, Mat4),
    SetMipmaps(bool),
    Bind(VertexFormat),
    BindRange(VertexFormat, u32),
    CreateTexture(TextureDesc),
    UploadTexture { tex: TextureId, level: u32, size: (u32, u32) },
    UploadRegion { tex: TextureId, level: u32, x: u32, y: u32, size: (u32, u32) },
    CopyTexture(TextureId, TextureId),
    BindTexture(Option<TextureId>),
    DeleteTexture(TextureId),
    CreateVb(VertexFormat, usize),
    CreateDynamicVb(VertexFormat, u32),
    CreateIb(usize),
    BindVb(Option<VertexBufferId>),
    BindIb(Option<IndexBufferId>),
    SetDynamicData(VertexBufferId, usize),
    DeleteVb(VertexBufferId),
    DeleteIb(IndexBufferId),
    DrawLines(u32),
    DrawIndexed(u32),
    DrawTexturedRange(u32, u32),
}

pub struct RecordingBackend {
    pub calls: Vec<Call>,
    pub caps: Capabilities,
    /// The next N allocations fail with out-of-video-memory.
    pub oom_failures: u32,
    /// The next N uploads at or past `upload_failure_level` fail.
    pub upload_failures: u32,
    pub upload_failure_level: u32,
    /// `poll_device` answers `Lost` this many times before `NeedsReset`.
    pub lost_polls: u32,
    /// `reset_device` answers `Lost` this many times before succeeding.
    pub failed_resets: u32,
    /// The next `present` reports a lost device.
    pub lose_on_present: bool,
    pub warnings: CompatWarnings,
    next_id: u32,
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new(Capabilities {
            mip_policy: MipPolicy::Capped,
            staged_uploads: false,
            resize_resets_device: false,
            vsync_resets_device: false,
            max_texture_size: 4096,
            min_z_near: 0.1,
        })
    }
}

impl RecordingBackend {
    pub fn new(caps: Capabilities) -> Self {
        Self {
            calls: Vec::new(),
            caps,
            oom_failures: 0,
            upload_failures: 0,
            upload_failure_level: 0,
            lost_polls: 0,
            failed_resets: 0,
            lose_on_present: false,
            warnings: CompatWarnings::default(),
            next_id: 0,
        }
    }

    /// Same defaults, but device-resetting resize/vsync and staged uploads.
    pub fn resetting() -> Self {
        let mut backend = Self::default();
        backend.caps.resize_resets_device = true;
        backend.caps.vsync_resets_device = true;
        backend.caps.staged_uploads = true;
        backend
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn allocate(&mut self, call: Call) -> GfxResult<u32> {
        if self.oom_failures > 0 {
            self.oom_failures -= 1;
            return Err(GfxError::OutOfVideoMemory { op: "RecordingAlloc" });
        }
        self.calls.push(call);
        Ok(self.next())
    }

    fn fail_upload(&mut self, level: u32) -> GfxResult<()> {
        if self.upload_failures > 0 && level >= self.upload_failure_level {
            self.upload_failures -= 1;
            return Err(GfxError::Backend {
                op: "UpdateTexturePart",
                code: glow::INVALID_OPERATION,
            });
        }
        Ok(())
    }

    fn id<T>(raw: u32, wrap: fn(u32) -> Option<T>) -> GfxResult<T> {
        wrap(raw).ok_or(GfxError::Backend {
            op: "RecordingAlloc",
            code: 0,
        })
    }
}

fn bind(b: &mut RecordingBackend, format: VertexFormat) {
    b.calls.push(Call::Bind(format));
}

fn bind_colored(b: &mut RecordingBackend) {
    bind(b, VertexFormat::Colored);
}

fn bind_textured(b: &mut RecordingBackend) {
    bind(b, VertexFormat::Textured);
}

fn bind_colored_range(b: &mut RecordingBackend, start: u32) {
    b.calls.push(Call::BindRange(VertexFormat::Colored, start));
}

fn bind_textured_range(b: &mut RecordingBackend, start: u32) {
    b.calls.push(Call::BindRange(VertexFormat::Textured, start));
}

impl Backend for RecordingBackend {
    fn name(&self) -> &'static str {
        "Recording"
    }

    fn capabilities(&self) -> Capabilities {
        self.caps
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
        self.calls.push(Call::PollDevice);
        if self.lost_polls > 0 {
            self.lost_polls -= 1;
            return DeviceStatus::Lost;
        }
        DeviceStatus::NeedsReset
    }

    fn reset_device(&mut self, _width: u32, _height: u32, _vsync: bool) -> GfxResult<DeviceStatus> {
        self.calls.push(Call::ResetDevice);
        if self.failed_resets > 0 {
            self.failed_resets -= 1;
            return Ok(DeviceStatus::Lost);
        }
        Ok(DeviceStatus::Ready)
    }

    fn release_device_objects(&mut self) {
        self.calls.push(Call::ReleaseDeviceObjects);
    }

    fn set_default_state(&mut self) -> GfxResult<()> {
        self.calls.push(Call::SetDefaultState);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> GfxResult<()> {
        self.calls.push(Call::Resize(width, height));
        Ok(())
    }

    fn set_vsync(&mut self, enabled: bool) -> GfxResult<()> {
        self.calls.push(Call::SetVsync(enabled));
        Ok(())
    }

    fn shutdown(&mut self) {
        self.calls.push(Call::Shutdown);
    }

    fn begin_frame(&mut self) -> GfxResult<()> {
        self.calls.push(Call::BeginFrame);
        Ok(())
    }

    fn clear(&mut self) -> GfxResult<()> {
        self.calls.push(Call::Clear);
        Ok(())
    }

    fn present(&mut self) -> GfxResult<PresentOutcome> {
        self.calls.push(Call::Present);
        if std::mem::take(&mut self.lose_on_present) {
            return Ok(PresentOutcome::DeviceLost);
        }
        Ok(PresentOutcome::Presented)
    }

    fn apply_state(&mut self, change: StateChange) -> GfxResult<()> {
        self.calls.push(Call::ApplyState(change));
        Ok(())
    }

    fn set_vertex_format(&mut self, format: VertexFormat) -> GfxResult<()> {
        self.calls.push(Call::SetVertexFormat(format));
        Ok(())
    }

    fn load_matrix(&mut self, ty: MatrixType, matrix: &Mat4) -> GfxResult<()> {
        self.calls.push(Call::LoadMatrix(ty, *matrix));
        Ok(())
    }

    fn set_mipmaps(&mut self, enabled: bool) -> GfxResult<()> {
        self.calls.push(Call::SetMipmaps(enabled));
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> GfxResult<TextureId> {
        let raw = self.allocate(Call::CreateTexture(*desc))?;
        Self::id(raw, TextureId::from_raw)
    }

    fn upload_texture(&mut self, tex: TextureId, level: u32, image: &RgbaImage) -> GfxResult<()> {
        self.fail_upload(level)?;
        self.calls.push(Call::UploadTexture {
            tex,
            level,
            size: image.dimensions(),
        });
        Ok(())
    }

    fn upload_texture_region(
        &mut self,
        tex: TextureId,
        level: u32,
        x: u32,
        y: u32,
        image: &RgbaImage,
    ) -> GfxResult<()> {
        self.fail_upload(level)?;
        self.calls.push(Call::UploadRegion {
            tex,
            level,
            x,
            y,
            size: image.dimensions(),
        });
        Ok(())
    }

    fn copy_texture(&mut self, src: TextureId, dst: TextureId) -> GfxResult<()> {
        self.calls.push(Call::CopyTexture(src, dst));
        Ok(())
    }

    fn bind_texture(&mut self, tex: Option<TextureId>) -> GfxResult<()> {
        self.calls.push(Call::BindTexture(tex));
        Ok(())
    }

    fn delete_texture(&mut self, tex: TextureId) {
        self.calls.push(Call::DeleteTexture(tex));
    }

    fn create_vertex_buffer(&mut self, format: VertexFormat, data: &[u8]) -> GfxResult<VertexBufferId> {
        let raw = self.allocate(Call::CreateVb(format, data.len()))?;
        Self::id(raw, VertexBufferId::from_raw)
    }

    fn create_dynamic_vertex_buffer(
        &mut self,
        format: VertexFormat,
        max_vertices: u32,
    ) -> GfxResult<VertexBufferId> {
        let raw = self.allocate(Call::CreateDynamicVb(format, max_vertices))?;
        Self::id(raw, VertexBufferId::from_raw)
    }

    fn create_index_buffer(&mut self, indices: &[u16]) -> GfxResult<IndexBufferId> {
        let raw = self.allocate(Call::CreateIb(indices.len()))?;
        Self::id(raw, IndexBufferId::from_raw)
    }

    fn bind_vertex_buffer(&mut self, vb: Option<VertexBufferId>) -> GfxResult<()> {
        self.calls.push(Call::BindVb(vb));
        Ok(())
    }

    fn bind_index_buffer(&mut self, ib: Option<IndexBufferId>) -> GfxResult<()> {
        self.calls.push(Call::BindIb(ib));
        Ok(())
    }

    fn set_dynamic_data(&mut self, vb: VertexBufferId, data: &[u8]) -> GfxResult<()> {
        self.calls.push(Call::SetDynamicData(vb, data.len()));
        Ok(())
    }

    fn delete_vertex_buffer(&mut self, vb: VertexBufferId) {
        self.calls.push(Call::DeleteVb(vb));
    }

    fn delete_index_buffer(&mut self, ib: IndexBufferId) {
        self.calls.push(Call::DeleteIb(ib));
    }

    fn draw_lines(&mut self, vertex_count: u32) {
        self.calls.push(Call::DrawLines(vertex_count));
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.calls.push(Call::DrawIndexed(index_count));
    }

    fn draw_textured_range(&mut self, vertex_count: u32, start_vertex: u32) {
        self.calls.push(Call::DrawTexturedRange(vertex_count, start_vertex));
    }

    fn api_info(&mut self) -> ApiInfo {
        ApiInfo {
            backend: "-- Using Recording --".into(),
            max_texture_size: format!(
                "Max texture size: ({0}, {0})",
                self.caps.max_texture_size
            ),
            ..ApiInfo::default()
        }
    }

    fn memory_usage(&mut self) -> Option<String> {
        Some("Video memory: 1.00 MB total, 0.50 free".into())
    }

    fn compatibility_warnings(&self) -> CompatWarnings {
        self.warnings.clone()
    }

    fn read_framebuffer(&mut self, width: u32, height: u32) -> GfxResult<Framebuffer> {
        Ok(Framebuffer {
            width,
            height,
            pixels: vec![128; width as usize * height as usize * 4],
            bottom_up: true,
        })
    }
}
