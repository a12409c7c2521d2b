//! Error types shared by the application-facing crates.

use thiserror::Error;

/// Main error type outside the Vulkan layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors surfaced through the platform layer
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or out-of-range configuration
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using [`enum@Error`].
pub type Result<T> = std::result::Result<T, Error>;
