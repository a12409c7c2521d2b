//! Projection, view and model matrices for the triangle.
//!
//! Matrices are column-major `glam::Mat4`, the same layout the vertex
//! shader reads from its uniform block. Depth maps to `0..1`. Clip-space Y
//! is left as the right-handed projection produces it, so a vertex above
//! the origin stays above it after projection.

use std::f32::consts::FRAC_PI_4;

use glam::{Mat4, Vec3};

/// Vertical field of view in radians.
pub const FOV_Y: f32 = FRAC_PI_4;
/// Near clip plane distance.
pub const Z_NEAR: f32 = 0.1;
/// Far clip plane distance.
pub const Z_FAR: f32 = 100.0;

/// Perspective projection for `aspect` (width / height).
pub fn projection(aspect: f32) -> Mat4 {
    Mat4::perspective_rh(FOV_Y, aspect, Z_NEAR, Z_FAR)
}

/// Camera pulled back by `distance`, then pitched about -X and yawed about +Y.
pub fn view(distance: f32, pitch: f32, yaw: f32) -> Mat4 {
    Mat4::from_translation(Vec3::new(0.0, 0.0, -distance))
        * Mat4::from_axis_angle(Vec3::NEG_X, pitch)
        * Mat4::from_axis_angle(Vec3::Y, yaw)
}

/// Combined `projection * view * model` for the triangle, angles in radians.
///
/// The model matrix is the identity. `aspect` must be positive.
pub fn build_transform(aspect: f32, distance: f32, pitch: f32, yaw: f32) -> Mat4 {
    let model = Mat4::IDENTITY;
    projection(aspect) * view(distance, pitch, yaw) * model
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_build_transform_is_deterministic() {
        let a = build_transform(16.0 / 9.0, 2.5, 0.3, -1.2);
        let b = build_transform(16.0 / 9.0, 2.5, 0.3, -1.2);
        assert_eq!(a.to_cols_array(), b.to_cols_array());
    }

    #[test]
    fn test_zero_camera_reduces_to_projection() {
        assert_eq!(build_transform(1.0, 0.0, 0.0, 0.0), projection(1.0));
    }

    #[test]
    fn test_projection_keeps_y_sign() {
        let proj = projection(1.0);
        assert!(proj.y_axis.y > 0.0);
        assert_relative_eq!(proj.y_axis.y, proj.x_axis.x);
    }

    #[test]
    fn test_top_vertex_lands_above_center() {
        let clip = build_transform(1.0, 2.5, 0.0, 0.0) * Vec4::new(0.0, 0.5, 0.0, 1.0);
        let y = clip.y / clip.w;
        assert!(y > 0.0);
        // 0.5 / tan(FOV_Y / 2) / 2.5
        assert_relative_eq!(y, 0.482_842_7, epsilon = 1e-5);
    }

    #[test]
    fn test_projection_depth_range() {
        let near = projection(1.0) * Vec4::new(0.0, 0.0, -Z_NEAR, 1.0);
        let far = projection(1.0) * Vec4::new(0.0, 0.0, -Z_FAR, 1.0);
        assert_relative_eq!(near.z / near.w, 0.0, epsilon = 1e-6);
        assert_relative_eq!(far.z / far.w, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_view_translates_back_by_distance() {
        let origin = view(3.0, 0.0, 0.0) * Vec4::W;
        assert_relative_eq!(origin.z, -3.0);
        assert_relative_eq!(origin.x, 0.0);
        assert_relative_eq!(origin.y, 0.0);
    }

    #[test]
    fn test_view_yaw_rotates_about_y() {
        let x = view(0.0, 0.0, FRAC_PI_2) * Vec4::X;
        assert_relative_eq!(x.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(x.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_view_pitch_rotates_about_negative_x() {
        let y = view(0.0, FRAC_PI_2, 0.0) * Vec4::Y;
        assert_relative_eq!(y.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y.z, -1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_aspect_scales_x_only() {
        let square = projection(1.0);
        let wide = projection(2.0);
        assert_relative_eq!(wide.x_axis.x * 2.0, square.x_axis.x, epsilon = 1e-6);
        assert_relative_eq!(wide.y_axis.y, square.y_axis.y);
    }
}
