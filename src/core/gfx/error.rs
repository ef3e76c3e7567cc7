use std::fmt;
use thiserror::Error;

/// Shader pipeline stage reported in compile diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

#[derive(Debug, Error)]
pub enum GfxError {
    #[error("Textures must have power of two dimensions (got {width}x{height})")]
    NonPowerOfTwo { width: u32, height: u32 },

    /// Video memory is exhausted. Recoverable: the facade raises a low-memory
    /// event and retries the allocation.
    #[error("{op}: out of video memory")]
    OutOfVideoMemory { op: &'static str },

    #[error("{op} failed (result code {code:#x})")]
    Backend { op: &'static str, code: u32 },

    #[error("{op} failed: {message}")]
    Driver { op: &'static str, message: String },

    #[error("Failed to compile {stage} shader: {log}")]
    ShaderCompile { stage: ShaderStage, log: String },

    #[error("Failed to link shader program: {log}")]
    ShaderLink { log: String },

    #[error("Unsupported graphics backend: {0}")]
    Unsupported(String),

    #[error("Screenshot encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GfxError {
    /// Backend-specific result code, or 0 when the failure has none.
    pub const fn code(&self) -> u32 {
        match self {
            Self::Backend { code, .. } => *code,
            Self::OutOfVideoMemory { .. } => glow::OUT_OF_MEMORY,
            _ => 0,
        }
    }

    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutOfVideoMemory { .. })
    }
}

pub type GfxResult<T> = Result<T, GfxError>;

#[cfg(test)]
mod tests {
    use super::{GfxError, ShaderStage};

    #[test]
    fn only_video_memory_exhaustion_is_recoverable() {
        assert!(GfxError::OutOfVideoMemory { op: "CreateVb" }.is_recoverable());
        assert!(
            !GfxError::Backend {
                op: "CreateVb",
                code: 0x8876_086c
            }
            .is_recoverable()
        );
        assert!(!GfxError::NonPowerOfTwo {
            width: 100,
            height: 64
        }
        .is_recoverable());
    }

    #[test]
    fn messages_carry_operation_and_code() {
        let err = GfxError::Backend {
            op: "CreateIb",
            code: 0x10,
        };
        assert_eq!(err.code(), 0x10);
        assert_eq!(err.to_string(), "CreateIb failed (result code 0x10)");

        let err = GfxError::ShaderCompile {
            stage: ShaderStage::Fragment,
            log: "0:1: syntax error".into(),
        };
        assert!(err.to_string().contains("fragment shader"));
    }
}
