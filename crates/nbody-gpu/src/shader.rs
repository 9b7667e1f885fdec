//! SPIR-V loading and shader modules.

use crate::error::{GpuError, Result, VkCheck};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

/// Read a SPIR-V blob from disk.
pub fn load_spirv(path: &Path) -> Result<Vec<u32>> {
    let bytes = std::fs::read(path).map_err(|e| GpuError::AssetMissing {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_spirv(&bytes)
}

/// Decode SPIR-V already held in memory.
pub fn parse_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| GpuError::ShaderCompilation(e.to_string()))
}

/// Create a shader module from SPIR-V words.
///
/// # Safety
/// The device must be valid and the code must be valid SPIR-V.
pub unsafe fn create_shader_module(device: &ash::Device, code: &[u32]) -> Result<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo::default().code(code);
    device
        .create_shader_module(&info, None)
        .checked("vkCreateShaderModule")
}

/// Load a SPIR-V file and wrap it in a shader module.
///
/// # Safety
/// The device must be valid.
pub unsafe fn load_shader_module(device: &ash::Device, path: &Path) -> Result<vk::ShaderModule> {
    let code = load_spirv(path)?;
    tracing::debug!(path = %path.display(), words = code.len(), "Loaded shader");
    create_shader_module(device, &code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_names_the_path() {
        let err = load_spirv(Path::new("does/not/exist.spv")).unwrap_err();
        match err {
            GpuError::AssetMissing { path, .. } => assert!(path.ends_with("exist.spv")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn parses_words_in_native_order() {
        let magic: u32 = 0x0723_0203;
        let mut bytes = magic.to_le_bytes().to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        let words = parse_spirv(&bytes).unwrap();
        assert_eq!(words, vec![magic, 1]);
    }

    #[test]
    fn rejects_truncated_blobs() {
        assert!(parse_spirv(&[0x03, 0x02, 0x23]).is_err());
    }
}
