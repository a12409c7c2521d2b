//! Keyboard state.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

/// Tracks which keys are held and which went down since the last frame.
#[derive(Debug, Default)]
pub struct InputState {
    /// Currently pressed keys
    pressed_keys: HashSet<KeyCode>,
    /// Keys that were just pressed this frame
    just_pressed_keys: HashSet<KeyCode>,
}

impl InputState {
    /// Create a new input state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Call at the beginning of each frame to clear per-frame state.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
    }

    /// Record a key press. Auto-repeat presses of a held key are ignored.
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    /// Forget everything, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.pressed_keys.clear();
        self.just_pressed_keys.clear();
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    /// `-1.0`, `0.0` or `1.0` depending on which side of the axis is held.
    pub fn axis(&self, negative: &[KeyCode], positive: &[KeyCode]) -> f32 {
        let held = |keys: &[KeyCode]| keys.iter().any(|k| self.is_key_pressed(*k));
        match (held(negative), held(positive)) {
            (true, false) => -1.0,
            (false, true) => 1.0,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_just_pressed_lasts_one_frame() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Space);
        assert!(input.is_key_just_pressed(KeyCode::Space));

        input.begin_frame();
        assert!(!input.is_key_just_pressed(KeyCode::Space));
        assert!(input.is_key_pressed(KeyCode::Space));
    }

    #[test]
    fn test_repeat_is_not_a_new_press() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Space);
        input.begin_frame();
        input.on_key_pressed(KeyCode::Space);
        assert!(!input.is_key_just_pressed(KeyCode::Space));
    }

    #[test]
    fn test_axis() {
        let mut input = InputState::new();
        let neg = [KeyCode::ArrowLeft];
        let pos = [KeyCode::ArrowRight];
        assert_eq!(input.axis(&neg, &pos), 0.0);

        input.on_key_pressed(KeyCode::ArrowLeft);
        assert_eq!(input.axis(&neg, &pos), -1.0);

        input.on_key_pressed(KeyCode::ArrowRight);
        assert_eq!(input.axis(&neg, &pos), 0.0);

        input.on_key_released(KeyCode::ArrowLeft);
        assert_eq!(input.axis(&neg, &pos), 1.0);
    }

    #[test]
    fn test_clear() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        input.clear();
        assert!(!input.is_key_pressed(KeyCode::KeyW));
    }
}
