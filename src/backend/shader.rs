// Compute shader loading
//
// The ray tracing kernel is compiled to SPIR-V by build.rs and read from disk
// at startup. The module only needs to live until the pipeline is built.

use ash::vk;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use super::handle::Scoped;
use super::VulkanDevice;
use crate::error::ResourceError;

const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Read a SPIR-V binary into 32-bit words
pub fn load_spirv(path: &Path) -> Result<Vec<u32>, ResourceError> {
    let shader_load = |reason: String| ResourceError::ShaderLoad {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = std::fs::read(path).map_err(|e| shader_load(e.to_string()))?;
    let words = ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| shader_load(e.to_string()))?;

    match words.first() {
        Some(&SPIRV_MAGIC) => {
            log::debug!("Loaded {} SPIR-V words from {}", words.len(), path.display());
            Ok(words)
        }
        _ => Err(shader_load("missing SPIR-V magic number".to_string())),
    }
}

pub fn create_shader_module(
    device: &Arc<VulkanDevice>,
    code: &[u32],
) -> Result<Scoped<vk::ShaderModule>, ResourceError> {
    let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

    let module = unsafe { device.device.create_shader_module(&create_info, None) }
        .map_err(ResourceError::pipeline("shader module"))?;

    Ok(Scoped::new(device, module))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("{}-{}", std::process::id(), name));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn loads_words_in_file_order() {
        let words = [SPIRV_MAGIC, 0x0001_0000, 0, 8, 0];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let path = temp_file("valid.spv", &bytes);

        let loaded = load_spirv(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, words);
    }

    #[test]
    fn missing_file_is_a_shader_load_error() {
        let path = Path::new("does/not/exist/comp.spv");
        let err = load_spirv(path).unwrap_err();

        match err {
            ResourceError::ShaderLoad { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_files_that_are_not_spirv() {
        // Word-aligned, so only the magic number check can reject it
        let source = b"#version 450\nvoid main() {}\n\n\n\n\n";
        assert_eq!(source.len() % 4, 0);
        let path = temp_file("text.spv", source);
        let err = load_spirv(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        match err {
            ResourceError::ShaderLoad { reason, .. } => assert!(reason.contains("magic"), "{reason}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rejects_truncated_binaries() {
        let path = temp_file("short.spv", &[0x03, 0x02, 0x23]);
        let err = load_spirv(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, ResourceError::ShaderLoad { .. }));
    }
}
