//! Scene parameters for the triangle viewer.
//!
//! This crate provides:
//! - The projection/view/model transform ([`build_transform`])
//! - An orbit camera holding the scalar inputs to that transform

pub mod camera;
pub mod transform;

pub use camera::OrbitCamera;
pub use transform::build_transform;
