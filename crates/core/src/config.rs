//! Application configuration loaded from TOML.
//!
//! Every field has a default, so a missing file or a partial file is valid:
//!
//! ```toml
//! [window]
//! title = "Triangle"
//! maximized = false
//!
//! [render]
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//! sample_count = 4
//!
//! [camera]
//! distance = 3.0
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Upper bound on frames in flight, matching the renderer's slot capacity.
const MAX_FRAMES_IN_FLIGHT: u32 = 3;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub camera: CameraConfig,
}

/// Window creation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    /// Open the window maximized, ignoring `width`/`height` once shown.
    pub maximized: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 1280,
            height: 720,
            maximized: true,
        }
    }
}

/// Settings consumed by the presenter and the triangle renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// RGBA clear color of the color attachment.
    pub clear_color: [f32; 4],
    /// Requested MSAA sample count; clamped to what the device supports.
    pub sample_count: u32,
    /// Frames the presenter may have in flight at once.
    pub frames_in_flight: u32,
    /// Compiled SPIR-V vertex shader.
    pub vertex_shader: PathBuf,
    /// Compiled SPIR-V fragment shader.
    pub fragment_shader: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.1, 1.0],
            sample_count: 4,
            frames_in_flight: 2,
            vertex_shader: PathBuf::from("shaders/triangle.vert.spv"),
            fragment_shader: PathBuf::from("shaders/triangle.frag.spv"),
        }
    }
}

/// Initial camera placement and input speeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub distance: f32,
    /// Degrees.
    pub pitch: f32,
    /// Degrees.
    pub yaw: f32,
    pub auto_rotate: bool,
    /// Degrees per second, for both arrow keys and auto-rotation.
    pub rotate_speed: f32,
    /// Units per second.
    pub zoom_speed: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            distance: 2.5,
            pitch: 0.0,
            yaw: 0.0,
            auto_rotate: true,
            rotate_speed: 45.0,
            zoom_speed: 2.0,
        }
    }
}

impl AppConfig {
    /// Parse configuration from a TOML string and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the TOML is malformed or a value is out of range.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or [`Error::Config`]
    /// if it does not parse or validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// A file that exists but cannot be parsed is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Serialize to pretty TOML.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        let samples = self.render.sample_count;
        if !samples.is_power_of_two() || samples > 64 {
            return Err(Error::Config(format!(
                "render.sample_count must be a power of two in 1..=64, got {samples}"
            )));
        }

        let frames = self.render.frames_in_flight;
        if frames == 0 || frames > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "render.frames_in_flight must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {frames}"
            )));
        }

        if self.render.clear_color.iter().any(|c| !c.is_finite()) {
            return Err(Error::Config("render.clear_color must be finite".to_string()));
        }

        if !(self.camera.distance.is_finite() && self.camera.distance >= 0.0) {
            return Err(Error::Config(format!(
                "camera.distance must be a non-negative number, got {}",
                self.camera.distance
            )));
        }

        Ok(())
    }
}
