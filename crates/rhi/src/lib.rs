//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance and device creation
//! - Swapchain, render pass and framebuffer management
//! - Command buffer recording and synchronization primitives
//! - Buffers, raw device memory and attachment images
//! - Descriptor sets, shader modules and graphics pipelines
//!
//! Everything the triangle core touches goes through the [`gpu::GpuDevice`]
//! trait, so it can be driven by a real [`device::Device`] or by the
//! recording device in [`mock`] (tests and the `mock` feature).

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod gpu;
pub mod image;
pub mod instance;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};
pub use gpu::GpuDevice;

// Re-export ash types that users might need
pub use ash::vk;
