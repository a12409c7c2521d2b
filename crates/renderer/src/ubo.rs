//! Uniform buffer object definitions for shaders.
//!
//! These structures must match the GLSL uniform block layouts exactly.
//! All structures use `#[repr(C)]` for predictable memory layout and implement
//! `Pod` and `Zeroable` for safe byte casting.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-frame transform uniform.
///
/// This structure matches the vertex shader's `Transform` block (set 0, binding 0).
///
/// # Memory Layout
///
/// - Offset 0: combined projection * view * model matrix, column-major (64 bytes)
/// - Total size: 64 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TransformUbo {
    pub mvp: Mat4,
}

impl TransformUbo {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    #[inline]
    pub fn new(mvp: Mat4) -> Self {
        Self { mvp }
    }

    /// Returns the raw bytes for uploading to the GPU.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for TransformUbo {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_ubo_size() {
        assert_eq!(TransformUbo::SIZE, 64);
    }

    #[test]
    fn test_transform_ubo_alignment() {
        // std140 requires mat4 to start on a 16-byte boundary
        assert_eq!(std::mem::align_of::<TransformUbo>() % 4, 0);
        assert_eq!(std::mem::offset_of!(TransformUbo, mvp), 0);
    }

    #[test]
    fn test_default_is_identity() {
        let ubo = TransformUbo::default();
        assert_eq!(ubo.mvp, Mat4::IDENTITY);

        let floats: &[f32] = bytemuck::cast_slice(ubo.as_bytes());
        assert_eq!(floats[0], 1.0);
        assert_eq!(floats[5], 1.0);
        assert_eq!(floats[1], 0.0);
        assert_eq!(floats[15], 1.0);
    }

    #[test]
    fn test_bytes_are_column_major() {
        let mvp = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        let ubo = TransformUbo::new(mvp);
        let floats: &[f32] = bytemuck::cast_slice(ubo.as_bytes());
        assert_eq!(&floats[12..15], &[1.0, 2.0, 3.0]);
    }
}
