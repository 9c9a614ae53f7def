// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

mod run;
mod shader;
mod window;

pub use run::{run, RunSummary};
pub use shader::{DirShaderStore, ShaderStage, ShaderStore};
pub use window::{wait_for_drawable_extent, ResizeFlag, WindowSystem, EXTENT_POLL_INTERVAL};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Zero in either dimension, e.g. a minimized window.
    pub fn is_degenerate(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum VsyncMode {
    Fifo,    // Target monitor refresh rate
    #[default]
    Mailbox, // Low latency, falls back to Fifo when missing
}

#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub app_name: String,
    pub clear_color: [f32; 4],
    pub vsync_mode: VsyncMode,
    pub validation: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            app_name: "prism".to_owned(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync_mode: VsyncMode::Mailbox,
            validation: cfg!(debug_assertions),
        }
    }
}

/// What one pass of the frame cycle ended up doing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Submitted and presented, chain untouched.
    Presented,
    /// Submitted and presented, then the chain was rebuilt.
    PresentedAndRecreated,
    /// Acquire found the chain stale. Rebuilt, nothing submitted.
    Abandoned,
}

impl CycleOutcome {
    pub fn presented(self) -> bool {
        !matches!(self, CycleOutcome::Abandoned)
    }

    pub fn recreated(self) -> bool {
        !matches!(self, CycleOutcome::Presented)
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        shaders: &dyn ShaderStore,
        settings: &RenderSettings,
    ) -> Result<Self>
    where
        Self: Sized;

    /// Runs one acquire → record → submit → present cycle.
    fn draw_frame(&mut self, window: &mut dyn WindowSystem) -> Result<CycleOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_sizes() {
        assert!(RenderSize::new(0, 0).is_degenerate());
        assert!(RenderSize::new(0, 600).is_degenerate());
        assert!(RenderSize::new(800, 0).is_degenerate());
        assert!(!RenderSize::new(1, 1).is_degenerate());
    }

    #[test]
    fn outcome_flags() {
        assert!(CycleOutcome::Presented.presented());
        assert!(!CycleOutcome::Presented.recreated());
        assert!(CycleOutcome::PresentedAndRecreated.presented());
        assert!(CycleOutcome::PresentedAndRecreated.recreated());
        assert!(!CycleOutcome::Abandoned.presented());
        assert!(CycleOutcome::Abandoned.recreated());
    }
}
