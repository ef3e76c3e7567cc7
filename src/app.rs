use gfxlayer::config;
use gfxlayer::core::gfx::backends::{BufferObjectBackend, DisplayListBackend, GlContext, ShaderBackend};
use gfxlayer::core::gfx::{
    Backend, BackendType, ColoredVertex, Device, DeviceSettings, DrawPass, GfxError, GfxResult,
    PackedColor, PresentOutcome, SwapChain, TexCoords, Texture, TextureId, TexturedVertex,
    VertexBufferId, VertexFormat,
};
use glutin::{
    config::ConfigTemplateBuilder,
    context::{ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext, Version},
    display::{Display, DisplayApiPreference},
    prelude::*,
    surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface},
};
use image::{Rgba, RgbaImage};
use log::{error, info, trace, warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::{
    error::Error,
    ffi::CStr,
    fs::File,
    io::BufWriter,
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

const LINE_VERTICES: u32 = 64;
const CHECKER_SIZE: u32 = 64;
const SPRITE_SIZE: u32 = 96;

/* -------------------- swap chain -------------------- */

/// The window surface and its current context, handed to the GL backends.
struct GlutinSwapChain {
    surface: Surface<WindowSurface>,
    context: PossiblyCurrentContext,
}

impl SwapChain for GlutinSwapChain {
    fn swap_buffers(&mut self) -> GfxResult<PresentOutcome> {
        match self.surface.swap_buffers(&self.context) {
            Ok(()) => Ok(PresentOutcome::Presented),
            Err(e) if e.error_kind() == glutin::error::ErrorKind::ContextLost => {
                Ok(PresentOutcome::DeviceLost)
            }
            Err(e) => Err(GfxError::Driver {
                op: "swap_buffers",
                message: e.to_string(),
            }),
        }
    }

    fn set_vsync(&mut self, enabled: bool) -> GfxResult<()> {
        let interval = if enabled {
            SwapInterval::Wait(NonZeroU32::MIN)
        } else {
            SwapInterval::DontWait
        };
        self.surface
            .set_swap_interval(&self.context, interval)
            .map_err(|e| GfxError::Driver {
                op: "set_swap_interval",
                message: e.to_string(),
            })
    }

    fn resize(&mut self, width: u32, height: u32) {
        let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            warn!("Ignoring surface resize to zero dimensions.");
            return;
        };
        self.surface.resize(&self.context, w, h);
    }
}

fn create_gl_context(
    window: &Window,
    kind: BackendType,
    vsync: bool,
) -> Result<(GlutinSwapChain, glow::Context, Display), Box<dyn Error>> {
    let display_handle = window.display_handle()?.as_raw();

    #[cfg(target_os = "windows")]
    let preference = {
        info!("Using WGL for OpenGL context.");
        DisplayApiPreference::Wgl(None)
    };
    #[cfg(target_os = "macos")]
    let preference = {
        info!("Using CGL for OpenGL context.");
        DisplayApiPreference::Cgl
    };
    #[cfg(all(unix, not(target_os = "macos")))]
    let preference = {
        info!("Using EGL for OpenGL context.");
        DisplayApiPreference::Egl
    };

    let display = unsafe { Display::new(display_handle, preference)? };

    let template = ConfigTemplateBuilder::new()
        .with_alpha_size(0)
        .with_depth_size(24)
        .with_transparency(false)
        .build();
    let gl_config = unsafe { display.find_configs(template)?.next() }
        .ok_or("Failed to find a suitable GL config")?;

    let (width, height): (u32, u32) = window.inner_size().into();
    let (w, h) = (
        NonZeroU32::new(width).ok_or("window has zero width")?,
        NonZeroU32::new(height).ok_or("window has zero height")?,
    );
    let raw_window_handle = window.window_handle()?.as_raw();
    let surface_attributes =
        SurfaceAttributesBuilder::<WindowSurface>::new().build(raw_window_handle, w, h);
    let surface = unsafe { display.create_window_surface(&gl_config, &surface_attributes)? };

    // The fixed-function backends need a compatibility context.
    let context_attributes = match kind {
        BackendType::Shader => ContextAttributesBuilder::new()
            .with_context_api(ContextApi::Gles(Some(Version::new(2, 0))))
            .build(Some(raw_window_handle)),
        BackendType::DisplayList | BackendType::BufferObject => ContextAttributesBuilder::new()
            .with_context_api(ContextApi::OpenGl(Some(Version::new(2, 1))))
            .with_profile(GlProfile::Compatibility)
            .build(Some(raw_window_handle)),
    };
    let context =
        unsafe { display.create_context(&gl_config, &context_attributes)? }.make_current(&surface)?;

    let mut swap_chain = GlutinSwapChain { surface, context };
    if let Err(e) = swap_chain.set_vsync(vsync) {
        warn!("Failed to set swap interval (VSync): {e}");
    }

    let gl = unsafe { glow::Context::from_loader_function_cstr(|s: &CStr| display.get_proc_address(s)) };
    Ok((swap_chain, gl, display))
}

/* -------------------- demo scene -------------------- */

/// What the window drives each frame, independent of the backend type.
trait Scene {
    fn frame(&mut self, elapsed: f32) -> GfxResult<()>;
    fn resize(&mut self, width: u32, height: u32) -> GfxResult<()>;
    fn set_vsync(&mut self, enabled: bool) -> GfxResult<()>;
    fn screenshot(&mut self, path: &Path) -> GfxResult<()>;
    fn log_api_info(&mut self);
    fn shutdown(&mut self);
}

fn checkerboard(size: u32, a: PackedColor, b: PackedColor) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        let cell = ((x / 8) + (y / 8)) % 2 == 0;
        Rgba(if cell { a.0 } else { b.0 })
    })
}

/// Three textured quads side by side, drawn from one static buffer.
fn sprite_strip(x: f32, y: f32) -> Vec<TexturedVertex> {
    let s = SPRITE_SIZE as f32;
    let tints = [
        PackedColor::WHITE,
        PackedColor::rgb(255, 200, 120),
        PackedColor::rgb(120, 200, 255),
    ];
    let mut verts = Vec::with_capacity(tints.len() * 4);
    for (i, tint) in tints.into_iter().enumerate() {
        let x1 = x + i as f32 * (s + 16.0);
        let x2 = x1 + s;
        verts.push(TexturedVertex::new(x1, y, 0.0, tint, 0.0, 0.0));
        verts.push(TexturedVertex::new(x2, y, 0.0, tint, 1.0, 0.0));
        verts.push(TexturedVertex::new(x2, y + s, 0.0, tint, 1.0, 1.0));
        verts.push(TexturedVertex::new(x1, y + s, 0.0, tint, 0.0, 1.0));
    }
    verts
}

/// A sine wave as a line list across the lower half of the window.
fn wave(elapsed: f32, width: u32, height: u32) -> Vec<ColoredVertex> {
    let segments = LINE_VERTICES / 2;
    let step = width as f32 / segments as f32;
    let mid = height as f32 * 0.75;
    let amp = height as f32 * 0.1;
    let point = |i: u32| {
        let x = i as f32 * step;
        let y = mid + (x * 0.02 + elapsed * 3.0).sin() * amp;
        let g = (128 + (i * 127 / segments)) as u8;
        ColoredVertex::new(x, y, 0.0, PackedColor::rgb(64, g, 96))
    };
    (0..segments).flat_map(|i| [point(i), point(i + 1)]).collect()
}

struct Demo<B: Backend> {
    device: Device<B>,
    checker: Option<TextureId>,
    strip: Option<VertexBufferId>,
    lines: Option<VertexBufferId>,
}

impl<B: Backend> Demo<B> {
    fn new(backend: B, settings: DeviceSettings) -> GfxResult<Self> {
        let mut device = Device::new(backend, settings)?;
        device.subscribe(|event| info!("Graphics event: {event:?}"));
        device.set_lost_context_tick(|| trace!("Waiting for the graphics device..."));
        if device.warn_if_necessary(|line| warn!("{line}")) {
            warn!("This driver has known issues with the selected renderer.");
        }

        let image = checkerboard(CHECKER_SIZE, PackedColor::WHITE, PackedColor::rgba(40, 40, 40, 160));
        let checker = device.create_texture(&image, settings.managed_textures, settings.mipmaps)?;
        let strip = device.create_vb(&sprite_strip(32.0, 32.0))?;
        let lines = device.create_dynamic_vb(VertexFormat::Colored, LINE_VERTICES)?;

        Ok(Self {
            device,
            checker: Some(checker),
            strip: Some(strip),
            lines: Some(lines),
        })
    }
}

impl<B: Backend> Scene for Demo<B> {
    fn frame(&mut self, elapsed: f32) -> GfxResult<()> {
        let d = &mut self.device;
        let (width, height) = d.size();

        d.begin_frame()?;
        d.clear_color(PackedColor::rgb(16, 16, 24))?;
        d.clear()?;
        d.mode_2d(width, height)?;

        d.set_texturing(false)?;
        d.draw_2d_gradient(
            0,
            0,
            width,
            height / 2,
            PackedColor::rgb(24, 32, 64),
            PackedColor::rgb(16, 16, 24),
        )?;
        if let Some(lines) = self.lines {
            d.set_vertex_format(VertexFormat::Colored)?;
            d.update_dynamic_lines(lines, &wave(elapsed, width, height))?;
        }

        d.set_texturing(true)?;
        d.bind_texture(self.checker)?;
        if let Some(strip) = self.strip {
            d.setup_alpha_state(DrawPass::Sprite)?;
            d.set_vertex_format(VertexFormat::Textured)?;
            d.bind_vb(Some(strip))?;
            d.draw_indexed_tris(8);
            d.draw_indexed_textured_range(4, 8);
            d.restore_alpha_state(DrawPass::Sprite)?;
        }

        let travel = width.saturating_sub(SPRITE_SIZE) as f32;
        let sprite = Texture {
            id: self.checker,
            x: (((elapsed * 0.5).sin() * 0.5 + 0.5) * travel) as i32,
            y: (height / 2) as i32 - SPRITE_SIZE as i32 / 2,
            width: SPRITE_SIZE,
            height: SPRITE_SIZE,
            uv: TexCoords::default(),
        };
        d.setup_alpha_state(DrawPass::Translucent)?;
        d.render_texture_shaded(&sprite, PackedColor::rgba(255, 255, 255, 192))?;
        d.restore_alpha_state(DrawPass::Translucent)?;

        d.end_frame()
    }

    fn resize(&mut self, width: u32, height: u32) -> GfxResult<()> {
        self.device.on_window_resize(width, height)
    }

    fn set_vsync(&mut self, enabled: bool) -> GfxResult<()> {
        self.device.set_vsync(enabled)
    }

    fn screenshot(&mut self, path: &Path) -> GfxResult<()> {
        let (width, height) = self.device.size();
        let out = BufWriter::new(File::create(path)?);
        self.device.take_screenshot(out, width, height)
    }

    fn log_api_info(&mut self) {
        self.device.update_api_info();
        for line in self.device.api_info().lines().into_iter().filter(|l| !l.is_empty()) {
            info!("{line}");
        }
    }

    fn shutdown(&mut self) {
        self.device.delete_texture(&mut self.checker);
        self.device.delete_vb(&mut self.strip);
        self.device.delete_vb(&mut self.lines);
        self.device.shutdown();
    }
}

fn build_scene(
    kind: BackendType,
    swap_chain: GlutinSwapChain,
    gl: glow::Context,
    display: &Display,
    settings: DeviceSettings,
) -> Result<Box<dyn Scene>, Box<dyn Error>> {
    let ctx = GlContext::new(gl, Box::new(swap_chain));
    let loader = |s: &CStr| display.get_proc_address(s);
    let scene: Box<dyn Scene> = match kind {
        BackendType::DisplayList => Box::new(Demo::new(DisplayListBackend::new(ctx, loader)?, settings)?),
        BackendType::BufferObject => Box::new(Demo::new(BufferObjectBackend::new(ctx, loader)?, settings)?),
        BackendType::Shader => Box::new(Demo::new(ShaderBackend::new(ctx), settings)?),
    };
    Ok(scene)
}

fn screenshot_path() -> PathBuf {
    PathBuf::from(format!(
        "screenshot_{}.png",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/* -------------------- application -------------------- */

pub struct App {
    backend_type: BackendType,
    settings: DeviceSettings,
    // Dropped before the window it renders into.
    scene: Option<Box<dyn Scene>>,
    window: Option<Arc<Window>>,
    start_time: Instant,
    frame_count: u32,
    last_title_update: Instant,
}

impl App {
    fn new(backend_type: BackendType, settings: DeviceSettings) -> Self {
        let now = Instant::now();
        Self {
            backend_type,
            settings,
            scene: None,
            window: None,
            start_time: now,
            frame_count: 0,
            last_title_update: now,
        }
    }

    fn init_graphics(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let window_attributes = Window::default_attributes()
            .with_title(format!("gfxlayer - {}", self.backend_type))
            .with_resizable(true)
            .with_inner_size(PhysicalSize::new(self.settings.width, self.settings.height));
        let window = Arc::new(event_loop.create_window(window_attributes)?);

        let (width, height): (u32, u32) = window.inner_size().into();
        self.settings.width = width;
        self.settings.height = height;

        let (swap_chain, gl, display) = create_gl_context(&window, self.backend_type, self.settings.vsync)?;
        let scene = build_scene(self.backend_type, swap_chain, gl, &display, self.settings)?;

        self.scene = Some(scene);
        self.window = Some(window);
        info!("Starting event loop...");
        Ok(())
    }

    fn update_fps_title(&mut self, window: &Window, now: Instant) {
        self.frame_count += 1;
        let elapsed = now.duration_since(self.last_title_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            window.set_title(&format!("gfxlayer - {} | {fps:.2} FPS", self.backend_type));
            self.frame_count = 0;
            self.last_title_update = now;
        }
    }

    fn handle_key_event(&mut self, event_loop: &ActiveEventLoop, event: KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let Some(scene) = self.scene.as_mut() else {
            return;
        };
        match code {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::KeyV => {
                let enabled = !self.settings.vsync;
                match scene.set_vsync(enabled) {
                    Ok(()) => {
                        self.settings.vsync = enabled;
                        config::update_vsync(enabled);
                    }
                    Err(e) => {
                        error!("Failed to toggle VSync: {e}");
                        event_loop.exit();
                    }
                }
            }
            KeyCode::KeyI => scene.log_api_info(),
            KeyCode::F12 => {
                let path = screenshot_path();
                match scene.screenshot(&path) {
                    Ok(()) => info!("Saved screenshot to '{}'.", path.display()),
                    Err(e) => warn!("Failed to save screenshot: {e}"),
                }
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none()
            && let Err(e) = self.init_graphics(event_loop)
        {
            error!("Failed to initialize graphics: {e}");
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let Some(window) = self.window.as_ref().cloned() else {
            return;
        };
        if window_id != window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Shutting down.");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(scene) = self.scene.as_mut()
                    && let Err(e) = scene.resize(size.width, size.height)
                {
                    error!("Failed to resize: {e}");
                    event_loop.exit();
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key_event(event_loop, event),
            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let elapsed = now.duration_since(self.start_time).as_secs_f32();
                self.update_fps_title(&window, now);
                if let Some(scene) = self.scene.as_mut()
                    && let Err(e) = scene.frame(elapsed)
                {
                    error!("Failed to draw frame: {e}");
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut scene) = self.scene.take() {
            scene.shutdown();
        }
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let config = config::get();
    let event_loop = EventLoop::new()?;
    let mut app = App::new(config.video_renderer, config.device_settings());
    event_loop.run_app(&mut app)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{LINE_VERTICES, checkerboard, sprite_strip, wave};
    use gfxlayer::core::gfx::PackedColor;

    #[test]
    fn checkerboard_alternates_every_eight_pixels() {
        let img = checkerboard(16, PackedColor::WHITE, PackedColor::BLACK);
        assert_eq!(img.get_pixel(0, 0).0, PackedColor::WHITE.0);
        assert_eq!(img.get_pixel(8, 0).0, PackedColor::BLACK.0);
        assert_eq!(img.get_pixel(8, 8).0, PackedColor::WHITE.0);
    }

    #[test]
    fn sprite_strip_is_three_quads() {
        let verts = sprite_strip(0.0, 0.0);
        assert_eq!(verts.len(), 12);
        assert!(verts[4].pos[0] > verts[1].pos[0], "quads do not overlap");
    }

    #[test]
    fn wave_fills_the_dynamic_buffer_exactly() {
        let verts = wave(0.0, 640, 480);
        assert_eq!(verts.len() as u32, LINE_VERTICES);
        assert_eq!(verts[1].pos, verts[2].pos, "segments are joined");
    }
}
