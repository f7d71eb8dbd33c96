//! Shader module management.
//!
//! This module handles SPIR-V loading and VkShaderModule creation.
//!
//! The engine compiles its shaders from a single Slang source into one
//! SPIR-V blob holding both the vertex and fragment entry points, so
//! [`Shader`] wraps one VkShaderModule and hands out two stage create
//! infos that differ only in stage flag and entry name.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use ember_rhi::device::Device;
//! use ember_rhi::shader::Shader;
//!
//! # fn example(device: Arc<Device>) -> Result<(), ember_rhi::RhiError> {
//! let shader = Shader::from_spirv_file(
//!     device,
//!     Path::new("shaders/mesh.spv"),
//!     "vertMain",
//!     "fragMain",
//! )?;
//!
//! // Both stages for pipeline creation
//! let _stages = shader.stage_infos();
//! # Ok(())
//! # }
//! ```

use std::ffi::{CStr, CString};
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// A SPIR-V module containing the vertex and fragment entry points.
///
/// # Thread Safety
///
/// The shader module is immutable after creation and can be safely
/// shared between threads.
pub struct Shader {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan shader module handle.
    module: vk::ShaderModule,
    /// Vertex entry point name.
    vertex_entry: CString,
    /// Fragment entry point name.
    fragment_entry: CString,
}

impl Shader {
    /// Creates a shader module from a SPIR-V file.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `path` - Path to the SPIR-V file
    /// * `vertex_entry` - Name of the vertex entry point function
    /// * `fragment_entry` - Name of the fragment entry point function
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The SPIR-V data is invalid
    /// - Shader module creation fails
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        vertex_entry: &str,
        fragment_entry: &str,
    ) -> RhiResult<Self> {
        debug!("Loading shader module from {:?}", path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, vertex_entry, fragment_entry)
    }

    /// Creates a shader module from SPIR-V bytes.
    ///
    /// The bytes must be valid SPIR-V code with 4-byte alignment.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The byte length is not a multiple of 4 (SPIR-V alignment requirement)
    /// - An entry point name contains null bytes
    /// - Shader module creation fails
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        vertex_entry: &str,
        fragment_entry: &str,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        let vertex_entry = CString::new(vertex_entry)
            .map_err(|e| RhiError::ShaderError(format!("Invalid vertex entry point: {}", e)))?;
        let fragment_entry = CString::new(fragment_entry)
            .map_err(|e| RhiError::ShaderError(format!("Invalid fragment entry point: {}", e)))?;

        info!(
            "Created shader module with entry points '{}' / '{}'",
            vertex_entry.to_string_lossy(),
            fragment_entry.to_string_lossy()
        );

        Ok(Self {
            device,
            module,
            vertex_entry,
            fragment_entry,
        })
    }

    /// Returns the Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Returns the vertex entry point name.
    #[inline]
    pub fn vertex_entry(&self) -> &CStr {
        &self.vertex_entry
    }

    /// Returns the fragment entry point name.
    #[inline]
    pub fn fragment_entry(&self) -> &CStr {
        &self.fragment_entry
    }

    /// Returns the vertex stage create info.
    ///
    /// The returned structure borrows from this shader and must not outlive it.
    pub fn vertex_stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(self.module)
            .name(&self.vertex_entry)
    }

    /// Returns the fragment stage create info.
    ///
    /// The returned structure borrows from this shader and must not outlive it.
    pub fn fragment_stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(self.module)
            .name(&self.fragment_entry)
    }

    /// Returns both stage create infos, vertex first.
    pub fn stage_infos(&self) -> [vk::PipelineShaderStageCreateInfo<'_>; 2] {
        [self.vertex_stage_info(), self.fragment_stage_info()]
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed shader module");
    }
}

/// Converts SPIR-V bytes to code words, validating alignment.
fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spirv_words_converts_little_endian() {
        // SPIR-V magic number in little-endian byte order
        let bytes = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];
        let words = spirv_words(&bytes).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn test_spirv_words_rejects_misaligned_input() {
        let bytes = [0u8; 5];
        let result = spirv_words(&bytes);
        assert!(matches!(result, Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_spirv_words_accepts_empty_input() {
        let words = spirv_words(&[]).unwrap();
        assert!(words.is_empty());
    }
}
