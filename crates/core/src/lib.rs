//! Shared foundation for the triangle renderer crates.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - TOML configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{AppConfig, CameraConfig, RenderConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameTimer;
