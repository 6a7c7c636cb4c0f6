//! Frame orchestration for the 2D presentation loop.
//!
//! This crate ties the platform and RHI layers together:
//! - Frame slot tracking across frames in flight
//! - Command recording for the fixed 2D pipeline
//! - Submission and presentation with per-slot synchronization

pub mod frame;
pub mod renderer;

pub use frame::{FrameCursor, FrameSlot};
pub use renderer::Renderer;
pub use vk2d_rhi::sync::DEFAULT_FRAMES_IN_FLIGHT;
