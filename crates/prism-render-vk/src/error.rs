// SPDX-License-Identifier: CEPL-1.0
use thiserror::Error;

/// Setup failures callers may want to tell apart. Everything else travels as
/// a plain `anyhow` error with the failing call in its context.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to find GPUs with Vulkan support")]
    NoDevices,

    #[error("failed to find a suitable GPU (checked {checked} device(s))")]
    NoSuitableDevice { checked: usize },

    #[error("validation layers requested but not available: {missing}")]
    MissingValidationLayers { missing: String },

    #[error("{stage} shader is not valid SPIR-V: {reason}")]
    InvalidSpirv { stage: &'static str, reason: String },
}
