//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No memory type satisfies the requested property flags
    #[error("No memory type with {0:?} in type bits {1:#b}")]
    NoSuitableMemoryType(ash::vk::MemoryPropertyFlags, u32),

    /// Shader module creation or stage setup error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// The presentation layer asked for more frames in flight than the renderer has slots for
    #[error("Frame count {requested} outside 1..={max}")]
    FrameCountOutOfRange { requested: usize, max: usize },

    /// A mutex guarding device state was poisoned
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_vk_result_converts() {
        fn fails() -> RhiResult<()> {
            Err::<(), _>(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)?;
            Ok(())
        }

        assert!(matches!(
            fails(),
            Err(RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
        ));
    }

    #[test]
    fn test_frame_count_message() {
        let err = RhiError::FrameCountOutOfRange {
            requested: 5,
            max: 3,
        };
        assert_eq!(err.to_string(), "Frame count 5 outside 1..=3");
    }
}
