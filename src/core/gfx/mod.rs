pub mod api_info;
pub mod backend;
pub mod backends;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod mipmap;
pub mod screenshot;
pub mod shader_variants;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use api_info::ApiInfo;
pub use backend::{Backend, Capabilities, PresentOutcome, SwapChain};
pub use device::{Device, DeviceSettings};
pub use dispatch::{MAX_INDICES, index_count, make_indices};
pub use error::{GfxError, GfxResult};
pub use handle::{IndexBufferId, TextureId, VertexBufferId};
pub use lifecycle::{ContextEvent, ContextState};
pub use mipmap::MipPolicy;
pub use state::{BlendFactor, ColorMask, CompareFunc, FogMode, StateChange};

use bytemuck::{Pod, Zeroable};
use std::str::FromStr;

// --- Public Data Contract ---

/// An RGBA8 color laid out in memory exactly as the GPU reads it.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct PackedColor(pub [u8; 4]);

impl PackedColor {
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    pub const BLACK: Self = Self::rgb(0, 0, 0);

    #[inline(always)]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self([r, g, b, a])
    }

    #[inline(always)]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self([r, g, b, 255])
    }

    #[inline(always)]
    pub const fn r(self) -> u8 {
        self.0[0]
    }
    #[inline(always)]
    pub const fn g(self) -> u8 {
        self.0[1]
    }
    #[inline(always)]
    pub const fn b(self) -> u8 {
        self.0[2]
    }
    #[inline(always)]
    pub const fn a(self) -> u8 {
        self.0[3]
    }

    /// Normalized channels, as `glClearColor` and `glFogfv` want them.
    #[inline(always)]
    pub fn to_f32(self) -> [f32; 4] {
        self.0.map(|c| f32::from(c) / 255.0)
    }
}

/// Position + color vertex (16 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ColoredVertex {
    pub pos: [f32; 3],
    pub color: PackedColor,
}

/// Position + color + texture coordinate vertex (24 bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub pos: [f32; 3],
    pub color: PackedColor,
    pub uv: [f32; 2],
}

impl ColoredVertex {
    #[inline(always)]
    pub const fn new(x: f32, y: f32, z: f32, color: PackedColor) -> Self {
        Self {
            pos: [x, y, z],
            color,
        }
    }
}

impl TexturedVertex {
    #[inline(always)]
    pub const fn new(x: f32, y: f32, z: f32, color: PackedColor, u: f32, v: f32) -> Self {
        Self {
            pos: [x, y, z],
            color,
            uv: [u, v],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Colored,
    Textured,
}

impl VertexFormat {
    pub const COLOR_OFFSET: usize = 12;
    pub const UV_OFFSET: usize = 16;

    #[inline(always)]
    pub const fn stride(self) -> usize {
        match self {
            Self::Colored => std::mem::size_of::<ColoredVertex>(),
            Self::Textured => std::mem::size_of::<TexturedVertex>(),
        }
    }

    #[inline(always)]
    pub const fn has_uv(self) -> bool {
        matches!(self, Self::Textured)
    }
}

/// Vertex records that can be handed to a buffer of the matching format.
pub trait Vertex: Pod {
    const FORMAT: VertexFormat;
}

impl Vertex for ColoredVertex {
    const FORMAT: VertexFormat = VertexFormat::Colored;
}

impl Vertex for TexturedVertex {
    const FORMAT: VertexFormat = VertexFormat::Textured;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatrixType {
    Projection,
    View,
    Texture,
}

/// Texture coordinates of the quad corners.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TexCoords {
    pub u1: f32,
    pub v1: f32,
    pub u2: f32,
    pub v2: f32,
}

impl Default for TexCoords {
    #[inline(always)]
    fn default() -> Self {
        Self {
            u1: 0.0,
            v1: 0.0,
            u2: 1.0,
            v2: 1.0,
        }
    }
}

/// A texture placed on screen for the 2D helpers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Texture {
    pub id: Option<TextureId>,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub uv: TexCoords,
}

/// Render pass of a batch, as far as alpha handling is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawPass {
    Opaque,
    Transparent,
    TransparentThick,
    Translucent,
    Gas,
    Sprite,
}

// --- Backend selection ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// OpenGL 1.1: static buffers are display lists, dynamic ones client arrays.
    DisplayList,
    /// OpenGL 1.5 fixed function with vertex/index buffer objects.
    BufferObject,
    /// OpenGL ES 2.0 shader pipeline emulating fixed function.
    Shader,
}

impl BackendType {
    pub const ALL: [Self; 3] = [Self::DisplayList, Self::BufferObject, Self::Shader];
}

// -- Boilerplate impls --
impl core::fmt::Display for BackendType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DisplayList => write!(f, "OpenGL 1.1"),
            Self::BufferObject => write!(f, "OpenGL"),
            Self::Shader => write!(f, "OpenGL ES 2.0"),
        }
    }
}

impl FromStr for BackendType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "displaylist" | "display-list" | "gl11" | "opengl 1.1" | "legacy" => {
                Ok(Self::DisplayList)
            }
            "bufferobject" | "buffer-object" | "opengl" | "vbo" => Ok(Self::BufferObject),
            "shader" | "gles2" | "opengl es 2.0" | "modern" => Ok(Self::Shader),
            _ => Err(format!("'{s}' is not a valid video renderer")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BackendType, ColoredVertex, PackedColor, TexturedVertex, VertexFormat};
    use std::mem::{offset_of, size_of};

    #[test]
    fn vertex_strides_match_their_formats() {
        assert_eq!(VertexFormat::Colored.stride(), 16);
        assert_eq!(VertexFormat::Textured.stride(), 24);
        assert_eq!(size_of::<ColoredVertex>(), VertexFormat::Colored.stride());
        assert_eq!(offset_of!(ColoredVertex, color), VertexFormat::COLOR_OFFSET);
        assert_eq!(offset_of!(TexturedVertex, color), VertexFormat::COLOR_OFFSET);
        assert_eq!(offset_of!(TexturedVertex, uv), VertexFormat::UV_OFFSET);
    }

    #[test]
    fn backend_type_round_trips_through_its_display_name() {
        for ty in BackendType::ALL {
            let parsed: BackendType = ty.to_string().parse().unwrap();
            assert_eq!(parsed, ty, "'{ty}' should parse back to itself");
        }
        assert!("directx".parse::<BackendType>().is_err());
    }

    #[test]
    fn packed_color_normalizes_channels() {
        let c = PackedColor::rgba(255, 0, 51, 255);
        assert_eq!(c.to_f32(), [1.0, 0.0, 0.2, 1.0]);
        assert_eq!(PackedColor::WHITE.a(), 255);
    }
}
