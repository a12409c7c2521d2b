//! SPIR-V shader modules.
//!
//! Shaders are opaque compiled blobs loaded by path. [`ShaderModule::load`]
//! treats a missing or malformed file as a warning and returns `None`; the
//! pipeline builder decides whether a missing stage is fatal.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use triangle_rhi::gpu::GpuDevice;
//! use triangle_rhi::shader::{ShaderModule, ShaderStage};
//!
//! # fn example(device: Arc<dyn GpuDevice>) {
//! let vertex = ShaderModule::load(device, Path::new("shaders/triangle.vert.spv"), ShaderStage::Vertex);
//! if let Some(module) = &vertex {
//!     let _stage_info = module.stage_create_info();
//! }
//! # }
//! ```

use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;

/// Entry point every stage is linked against.
pub const ENTRY_POINT: &CStr = c"main";

/// Programmable stage a module is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    /// Converts the shader stage to Vulkan shader stage flags.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Returns a human-readable name for the shader stage.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Converts little-endian SPIR-V bytes into code words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the input is empty or its length is
/// not a multiple of four.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be a non-empty multiple of 4 bytes, got {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// Owned `VkShaderModule` for a single stage, destroyed on drop.
pub struct ShaderModule {
    device: Arc<dyn GpuDevice>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl ShaderModule {
    /// Creates a shader module from SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not whole SPIR-V words or module
    /// creation fails.
    pub fn from_spirv_bytes(
        device: Arc<dyn GpuDevice>,
        bytes: &[u8],
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = device.create_shader_module(&create_info)?;

        info!("Created {} shader module ({} bytes)", stage, bytes.len());

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    /// Reads a SPIR-V file and creates a shader module from it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, or as for
    /// [`from_spirv_bytes`](Self::from_spirv_bytes).
    pub fn from_spirv_file(
        device: Arc<dyn GpuDevice>,
        path: &Path,
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage)
    }

    /// Loads a module, logging a warning and returning `None` on failure.
    pub fn load(device: Arc<dyn GpuDevice>, path: &Path, stage: ShaderStage) -> Option<Self> {
        match Self::from_spirv_file(device, path, stage) {
            Ok(module) => Some(module),
            Err(e) => {
                warn!("Could not load {} shader {:?}: {}", stage, path, e);
                None
            }
        }
    }

    /// Returns the Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage description for pipeline creation, entry point [`ENTRY_POINT`].
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        self.device.destroy_shader_module(self.module);
        debug!("Destroyed {} shader module", self.stage);
    }
}
