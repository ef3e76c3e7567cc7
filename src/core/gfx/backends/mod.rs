//! Concrete OpenGL flavours behind the `Backend` trait.

mod ffi;
mod fixed;
pub mod gl;

pub mod buffer_object;
pub mod display_list;
pub mod shader;

pub use buffer_object::BufferObjectBackend;
pub use display_list::DisplayListBackend;
pub use gl::GlContext;
pub use shader::ShaderBackend;
