//! Frame timing for animation and camera updates.

use std::time::{Duration, Instant};

/// Longest delta reported by [`FrameTimer::tick`].
///
/// Dragging or minimizing the window can stall the event loop for seconds;
/// the camera should not jump by that much on the next frame.
const MAX_DELTA: Duration = Duration::from_millis(100);

/// Measures per-frame delta time and counts frames.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    frames: u64,
}

impl FrameTimer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frames: 0,
        }
    }

    /// Time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Advance one frame and return the delta in seconds, capped at 100 ms.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now.duration_since(self.last_tick).min(MAX_DELTA);
        self.last_tick = now;
        self.frames += 1;
        delta.as_secs_f32()
    }

    /// Number of calls to [`tick`](Self::tick) so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Average frames per second since creation.
    pub fn average_fps(&self) -> f32 {
        let secs = self.elapsed().as_secs_f32();
        if secs > 0.0 {
            self.frames as f32 / secs
        } else {
            0.0
        }
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}
