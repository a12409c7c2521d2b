//! Orbit camera parameters for the triangle viewer.

use std::f32::consts::{FRAC_PI_2, TAU};

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::transform::build_transform;

/// Pitch stays just short of straight up or down.
const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// Scalar camera state fed to [`build_transform`]. Angles are in radians.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitCamera {
    /// Distance from the camera to the origin.
    pub distance: f32,
    /// Rotation about -X.
    pub pitch: f32,
    /// Rotation about +Y, kept in `[0, 2π)`.
    pub yaw: f32,
    /// Spin about +Y every update.
    pub auto_rotate: bool,
    /// Radians per second, for auto-rotation and arrow keys.
    pub rotate_speed: f32,
    /// Distance units per second.
    pub zoom_speed: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            distance: 2.5,
            pitch: 0.0,
            yaw: 0.0,
            auto_rotate: true,
            rotate_speed: 45.0_f32.to_radians(),
            zoom_speed: 2.0,
        }
    }
}

impl OrbitCamera {
    pub fn new(distance: f32, pitch: f32, yaw: f32) -> Self {
        let mut camera = Self {
            distance: distance.max(0.0),
            ..Self::default()
        };
        camera.rotate(pitch, yaw);
        camera
    }

    /// Adds to pitch and yaw; pitch is clamped and yaw wrapped.
    pub fn rotate(&mut self, delta_pitch: f32, delta_yaw: f32) {
        self.pitch = (self.pitch + delta_pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        self.yaw = (self.yaw + delta_yaw).rem_euclid(TAU);
    }

    /// Moves the camera toward (negative) or away from (positive) the origin.
    pub fn zoom(&mut self, delta: f32) {
        self.distance = (self.distance + delta).max(0.0);
    }

    pub fn toggle_auto_rotate(&mut self) {
        self.auto_rotate = !self.auto_rotate;
    }

    /// Advances auto-rotation by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        if self.auto_rotate {
            self.rotate(0.0, self.rotate_speed * dt);
        }
    }

    /// The combined transform for a viewport with the given aspect ratio.
    pub fn transform(&self, aspect: f32) -> Mat4 {
        build_transform(aspect, self.distance, self.pitch, self.yaw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::PI;

    #[test]
    fn test_default_camera() {
        let camera = OrbitCamera::default();
        assert_eq!(camera.distance, 2.5);
        assert!(camera.auto_rotate);
        assert_relative_eq!(camera.rotate_speed, PI / 4.0);
    }

    #[test]
    fn test_rotate_clamps_pitch_and_wraps_yaw() {
        let mut camera = OrbitCamera::new(1.0, 0.0, 0.0);
        camera.rotate(10.0, -0.5);
        assert_relative_eq!(camera.pitch, PITCH_LIMIT);
        assert_relative_eq!(camera.yaw, TAU - 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_zoom_never_goes_negative() {
        let mut camera = OrbitCamera::new(1.0, 0.0, 0.0);
        camera.zoom(-5.0);
        assert_eq!(camera.distance, 0.0);
        camera.zoom(0.75);
        assert_relative_eq!(camera.distance, 0.75);
    }

    #[test]
    fn test_update_only_spins_when_enabled() {
        let mut camera = OrbitCamera::new(1.0, 0.0, 0.0);
        camera.update(1.0);
        assert_relative_eq!(camera.yaw, camera.rotate_speed);

        camera.toggle_auto_rotate();
        let yaw = camera.yaw;
        camera.update(1.0);
        assert_eq!(camera.yaw, yaw);
    }

    #[test]
    fn test_transform_matches_build_transform() {
        let camera = OrbitCamera::new(2.0, 0.25, 1.0);
        assert_eq!(
            camera.transform(1.5),
            build_transform(1.5, 2.0, 0.25, 1.0)
        );
    }
}
