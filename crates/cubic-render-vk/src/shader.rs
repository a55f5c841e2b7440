// SPDX-License-Identifier: CEPL-1.0
//! SPIR-V loading. Shader binaries come from an external build step; a
//! missing or malformed file is rejected here instead of reaching the driver.

use ash::util::read_spv;
use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::{ApiResultExt, VkResult};

pub const VERTEX_SHADER_FILE: &str = "vert.spv";
pub const FRAGMENT_SHADER_FILE: &str = "frag.spv";

const SPIRV_MAGIC: u32 = 0x0723_0203;

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader {path} is empty")]
    Empty { path: PathBuf },

    #[error("shader {path} is {len} bytes, not a multiple of 4")]
    Misaligned { path: PathBuf, len: usize },

    #[error("shader {path} is not SPIR-V")]
    BadMagic { path: PathBuf },
}

/// Validates a SPIR-V blob and returns its words in native endianness.
pub fn parse_spirv(path: &Path, bytes: &[u8]) -> Result<Vec<u32>, ShaderError> {
    if bytes.is_empty() {
        return Err(ShaderError::Empty {
            path: path.to_owned(),
        });
    }
    if bytes.len() % 4 != 0 {
        return Err(ShaderError::Misaligned {
            path: path.to_owned(),
            len: bytes.len(),
        });
    }
    let words = read_spv(&mut Cursor::new(bytes)).map_err(|_| ShaderError::BadMagic {
        path: path.to_owned(),
    })?;
    if words.first() != Some(&SPIRV_MAGIC) {
        return Err(ShaderError::BadMagic {
            path: path.to_owned(),
        });
    }
    Ok(words)
}

pub fn load_spirv(path: &Path) -> Result<Vec<u32>, ShaderError> {
    let bytes = std::fs::read(path).map_err(|source| ShaderError::Read {
        path: path.to_owned(),
        source,
    })?;
    parse_spirv(path, &bytes)
}

/// Vertex + fragment SPIR-V for the single graphics pipeline.
#[derive(Clone, Debug)]
pub struct ShaderPair {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderPair {
    pub fn load(dir: &Path) -> Result<Self, ShaderError> {
        let vertex = load_spirv(&dir.join(VERTEX_SHADER_FILE))?;
        let fragment = load_spirv(&dir.join(FRAGMENT_SHADER_FILE))?;
        tracing::debug!(
            "loaded shaders from {} ({} + {} words)",
            dir.display(),
            vertex.len(),
            fragment.len()
        );
        Ok(Self { vertex, fragment })
    }
}

/// Directory `build.rs` compiles `vert.spv` / `frag.spv` into.
pub fn default_shader_dir() -> PathBuf {
    PathBuf::from(env!("OUT_DIR"))
}

/// The configured directory, or the build output when none is set.
pub fn resolve_shader_dir(configured: Option<&Path>) -> PathBuf {
    configured.map_or_else(default_shader_dir, Path::to_path_buf)
}

pub(crate) unsafe fn create_shader_module(
    device: &ash::Device,
    code: &[u32],
) -> VkResult<vk::ShaderModule> {
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        code_size: code.len() * 4,
        p_code: code.as_ptr(),
        ..Default::default()
    };
    device
        .create_shader_module(&ci, None)
        .during("create_shader_module")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<u8> {
        let mut v = SPIRV_MAGIC.to_le_bytes().to_vec();
        v.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        v
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cubic-shader-{}-{}", tag, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_spirv_rejects_empty() {
        let err = parse_spirv(Path::new("vert.spv"), &[]).unwrap_err();
        assert!(matches!(err, ShaderError::Empty { .. }));
    }

    #[test]
    fn test_parse_spirv_rejects_misaligned() {
        let mut bytes = header();
        bytes.push(0);
        let err = parse_spirv(Path::new("vert.spv"), &bytes).unwrap_err();
        assert!(matches!(err, ShaderError::Misaligned { len: 9, .. }));
    }

    #[test]
    fn test_parse_spirv_rejects_bad_magic() {
        let err = parse_spirv(Path::new("vert.spv"), &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap_err();
        assert!(matches!(err, ShaderError::BadMagic { .. }));
    }

    #[test]
    fn test_parse_spirv_accepts_header() {
        let words = parse_spirv(Path::new("vert.spv"), &header()).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }

    #[test]
    fn test_parse_spirv_swaps_big_endian() {
        let mut bytes = SPIRV_MAGIC.to_be_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_be_bytes());
        let words = parse_spirv(Path::new("vert.spv"), &bytes).unwrap();
        assert_eq!(words[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_load_missing_file_is_read_error() {
        let dir = temp_dir("missing");
        let err = ShaderPair::load(&dir).unwrap_err();
        assert!(matches!(err, ShaderError::Read { .. }));
        assert!(err.to_string().contains(VERTEX_SHADER_FILE));
    }

    #[test]
    fn test_load_pair_from_dir() {
        let dir = temp_dir("pair");
        std::fs::write(dir.join(VERTEX_SHADER_FILE), header()).unwrap();
        std::fs::write(dir.join(FRAGMENT_SHADER_FILE), header()).unwrap();
        let pair = ShaderPair::load(&dir).unwrap();
        assert_eq!(pair.vertex.len(), 2);
        assert_eq!(pair.fragment.len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_built_shaders_load_from_default_dir() {
        let pair = ShaderPair::load(&default_shader_dir()).unwrap();
        assert_eq!(pair.vertex[0], SPIRV_MAGIC);
        assert_eq!(pair.fragment[0], SPIRV_MAGIC);
    }

    #[test]
    fn test_resolve_shader_dir() {
        assert_eq!(resolve_shader_dir(None), default_shader_dir());
        let custom = Path::new("assets/shaders");
        assert_eq!(resolve_shader_dir(Some(custom)), custom.to_path_buf());
    }

    #[test]
    fn test_empty_fragment_is_rejected_even_with_valid_vertex() {
        let dir = temp_dir("empty-frag");
        std::fs::write(dir.join(VERTEX_SHADER_FILE), header()).unwrap();
        std::fs::write(dir.join(FRAGMENT_SHADER_FILE), b"").unwrap();
        let err = ShaderPair::load(&dir).unwrap_err();
        assert!(matches!(err, ShaderError::Empty { .. }));
        std::fs::remove_dir_all(&dir).ok();
    }
}
