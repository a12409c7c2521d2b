//! Triangle renderer core.
//!
//! This crate draws one colored triangle through a [`FrameHost`]:
//! - A single host-visible buffer holding the vertices and one uniform
//!   block per frame in flight ([`allocator`])
//! - One descriptor set per frame slot ([`descriptors`])
//! - The graphics pipeline ([`pipeline`])
//! - Per-frame command recording ([`frame`])
//!
//! [`WindowPresenter`] is the windowed host; tests drive the renderer
//! through a host backed by the recording device instead.

pub mod allocator;
pub mod descriptors;
pub mod frame;
pub mod frame_slots;
pub mod lifecycle;
pub mod pipeline;
pub mod presenter;
pub mod triangle;
pub mod ubo;

pub use frame_slots::FrameSlots;
pub use lifecycle::{FrameHost, FrameLifecycle};
pub use presenter::WindowPresenter;
pub use triangle::{TriangleRenderer, TriangleSettings};
pub use ubo::TransformUbo;

/// Upper bound on frames in flight, and so on per-frame uniform slots.
pub const MAX_CONCURRENT_FRAMES: usize = 3;
