// SPDX-License-Identifier: CEPL-1.0
//! Precompiled SPIR-V loading.
use std::{fs::File, path::Path, sync::Arc};

use ash::vk;

use crate::{
    device::Device,
    error::{Result, VkError, VkResultExt},
};

/// Reads a SPIR-V blob. The length must be a whole number of words.
pub fn read_spirv(path: &Path) -> Result<Vec<u32>> {
    let asset = |source| VkError::Asset {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(asset)?;
    ash::util::read_spv(&mut file).map_err(asset)
}

pub struct ShaderModule {
    device: Arc<Device>,
    raw: vk::ShaderModule,
}

impl ShaderModule {
    pub fn load(device: &Arc<Device>, path: &Path) -> Result<Self> {
        let code = read_spirv(path)?;
        Self::from_words(device, &code)
    }

    pub fn from_words(device: &Arc<Device>, code: &[u32]) -> Result<Self> {
        let info = vk::ShaderModuleCreateInfo {
            s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
            code_size: code.len() * 4,
            p_code: code.as_ptr(),
            ..Default::default()
        };
        let raw = unsafe { device.raw().create_shader_module(&info, None) }
            .check("vkCreateShaderModule")?;
        Ok(ShaderModule {
            device: Arc::clone(device),
            raw,
        })
    }

    pub fn raw(&self) -> vk::ShaderModule {
        self.raw
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.raw().destroy_shader_module(self.raw, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("prism-{}-{name}", std::process::id()));
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        path
    }

    #[test]
    fn reads_valid_words() {
        let mut bytes = Vec::new();
        for w in [0x0723_0203u32, 0x0001_0000, 7] {
            bytes.extend_from_slice(&w.to_le_bytes());
        }
        let path = temp_file("ok.spv", &bytes);
        let words = read_spirv(&path).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000, 7]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn rejects_unaligned_blob() {
        let path = temp_file("short.spv", &[0x03, 0x02, 0x23, 0x07, 0x00]);
        assert!(matches!(read_spirv(&path), Err(VkError::Asset { .. })));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_names_path() {
        let path = Path::new("/nonexistent/prism/shader.spv");
        let err = read_spirv(path).unwrap_err();
        assert!(err.to_string().contains("shader.spv"));
    }
}
