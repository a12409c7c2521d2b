//! Platform layer for the triangle viewer.
//!
//! This crate provides:
//! - Window management via winit
//! - Vulkan surface creation for that window
//! - Keyboard state

mod input;
mod window;

pub use input::{InputState, KeyCode};
pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::EventLoop;
