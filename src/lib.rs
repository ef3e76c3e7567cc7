//! A graphics abstraction layer: one device facade over display-list,
//! buffer-object and shader OpenGL backends.

pub mod config;
pub mod core;
