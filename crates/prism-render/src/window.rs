// SPDX-License-Identifier: CEPL-1.0
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::RenderSize;

/// How long a minimized window is left alone before its size is re-checked.
pub const EXTENT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Edge-triggered "the framebuffer changed size" notification.
///
/// Raised from the window's event callback, consumed by the frame loop when
/// it rebuilds the chain. Clones share the same flag.
#[derive(Clone, Debug, Default)]
pub struct ResizeFlag(Arc<AtomicBool>);

impl ResizeFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns whether the flag was raised and clears it.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

pub trait WindowSystem {
    /// Current framebuffer size in physical pixels.
    fn framebuffer_size(&self) -> RenderSize;

    /// Dispatches pending events without blocking.
    fn pump_events(&mut self);

    /// Blocks until an event arrives or `timeout` elapses, then dispatches.
    fn wait_events(&mut self, timeout: Duration);

    fn close_requested(&self) -> bool;

    fn resize_flag(&self) -> ResizeFlag;
}

/// Blocks until the framebuffer has a non-zero size.
///
/// Returns `None` if the window was asked to close while waiting.
pub fn wait_for_drawable_extent(window: &mut dyn WindowSystem) -> Option<RenderSize> {
    let mut size = window.framebuffer_size();
    if size.is_degenerate() {
        info!(
            "framebuffer is {}x{}, waiting for a drawable size",
            size.width, size.height
        );
    }

    while size.is_degenerate() {
        if window.close_requested() {
            return None;
        }
        window.wait_events(EXTENT_POLL_INTERVAL);
        size = window.framebuffer_size();
    }
    Some(size)
}
