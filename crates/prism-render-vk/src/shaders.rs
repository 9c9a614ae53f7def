// SPDX-License-Identifier: CEPL-1.0
use std::io::Cursor;

use anyhow::Result;
use ash::util::read_spv;
use prism_render::{ShaderStage, ShaderStore};

use crate::SetupError;

const SPIRV_MAGIC: u32 = 0x0723_0203;

static TRIANGLE_VERT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.vert.spv"));
static TRIANGLE_FRAG: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/triangle.frag.spv"));

/// The triangle shaders compiled by the build script.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedShaders;

impl ShaderStore for EmbeddedShaders {
    fn load(&self, stage: ShaderStage) -> Result<Vec<u8>> {
        Ok(match stage {
            ShaderStage::Vertex => TRIANGLE_VERT,
            ShaderStage::Fragment => TRIANGLE_FRAG,
        }
        .to_vec())
    }
}

/// Decoded SPIR-V words for both stages. Loaded once; the pipeline is
/// rebuilt from these without touching the store again.
#[derive(Clone, Debug)]
pub struct ShaderBinaries {
    pub vertex: Vec<u32>,
    pub fragment: Vec<u32>,
}

impl ShaderBinaries {
    pub fn load(store: &dyn ShaderStore) -> Result<Self> {
        let vertex = decode_spirv(ShaderStage::Vertex, &store.load(ShaderStage::Vertex)?)?;
        let fragment = decode_spirv(ShaderStage::Fragment, &store.load(ShaderStage::Fragment)?)?;
        Ok(Self { vertex, fragment })
    }
}

fn stage_name(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vertex",
        ShaderStage::Fragment => "fragment",
    }
}

pub fn decode_spirv(stage: ShaderStage, bytes: &[u8]) -> Result<Vec<u32>, SetupError> {
    let invalid = |reason: String| SetupError::InvalidSpirv {
        stage: stage_name(stage),
        reason,
    };
    if bytes.is_empty() {
        return Err(invalid("empty blob".into()));
    }
    if bytes.len() % 4 != 0 {
        return Err(invalid(format!("length {} is not a multiple of 4", bytes.len())));
    }
    // read_spv fixes up endianness from the magic word, so check after.
    let words = read_spv(&mut Cursor::new(bytes)).map_err(|e| invalid(e.to_string()))?;
    match words.first() {
        Some(&SPIRV_MAGIC) => Ok(words),
        Some(other) => Err(invalid(format!("bad magic {other:#010x}"))),
        None => Err(invalid("empty blob".into())),
    }
}
