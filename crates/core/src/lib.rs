//! Core utilities for the vk2d frontend.
//!
//! This crate provides the foundational pieces shared across the workspace:
//! - Error types and result aliases
//! - Logging initialization

mod error;
mod logging;

pub use error::{Error, Result};
pub use logging::init_logging;
