// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn file_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "triangle.vert.spv",
            ShaderStage::Fragment => "triangle.frag.spv",
        }
    }
}

/// Source of compiled shader binaries. Blobs are opaque here; the backend
/// validates them.
pub trait ShaderStore {
    fn load(&self, stage: ShaderStage) -> Result<Vec<u8>>;
}

/// Reads `<root>/triangle.vert.spv` and `<root>/triangle.frag.spv`.
#[derive(Clone, Debug)]
pub struct DirShaderStore {
    root: PathBuf,
}

impl DirShaderStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ShaderStore for DirShaderStore {
    fn load(&self, stage: ShaderStage) -> Result<Vec<u8>> {
        let path = self.root.join(stage.file_name());
        let bytes =
            fs::read(&path).with_context(|| format!("read shader {}", path.display()))?;
        debug!("loaded {:?} shader {} ({} bytes)", stage, path.display(), bytes.len());
        Ok(bytes)
    }
}
