//! Windowing and surface glue for the vk2d frontend.
//!
//! Everything here is one-time setup: the core rendering code only ever
//! sees the opaque `vk::SurfaceKHR` handle and its loader.

mod window;

pub use window::{Surface, Window};
