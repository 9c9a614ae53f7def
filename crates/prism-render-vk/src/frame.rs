// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use prism_render::{CycleOutcome, ResizeFlag};
use tracing::{debug, trace};

use crate::sync::MAX_FRAMES_IN_FLIGHT;

/// Result of asking the chain for its next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquire {
    Ready { image_index: u32, suboptimal: bool },
    /// The chain no longer matches the surface. Nothing was signaled.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Present {
    Presented,
    Suboptimal,
    Stale,
}

/// The GPU-facing half of a frame cycle. The scheduler owns the ordering;
/// implementors only perform one step each.
pub trait FrameBackend {
    /// Block until the slot's previous submission has completed.
    fn wait_slot(&mut self, slot: usize) -> Result<()>;
    fn acquire(&mut self, slot: usize) -> Result<Acquire>;
    /// Unsignal the slot's fence. Only called once an image is in hand.
    fn reset_slot(&mut self, slot: usize) -> Result<()>;
    fn record(&mut self, slot: usize, image_index: u32) -> Result<()>;
    fn submit(&mut self, slot: usize) -> Result<()>;
    fn present(&mut self, slot: usize, image_index: u32) -> Result<Present>;
    /// Rebuild the chain and everything derived from it.
    fn recreate(&mut self) -> Result<()>;
}

/// True when the chain must be rebuilt after a present.
pub fn needs_recreate(present: Present, acquire_suboptimal: bool, resized: bool) -> bool {
    resized || acquire_suboptimal || present != Present::Presented
}

/// Walks the frame slots round-robin. Slot `frame_index` is the one the next
/// cycle will use.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    frame_index: usize,
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// wait → acquire → reset → record → submit → present, then rebuild the
    /// chain if anything said it is out of date.
    ///
    /// A stale acquire rebuilds and returns without touching the fence or
    /// advancing, so the same slot is retried next cycle.
    pub fn run_cycle(
        &mut self,
        backend: &mut dyn FrameBackend,
        resize: &ResizeFlag,
    ) -> Result<CycleOutcome> {
        let slot = self.frame_index;
        backend.wait_slot(slot)?;

        let (image_index, acquire_suboptimal) = match backend.acquire(slot)? {
            Acquire::Ready {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            Acquire::Stale => {
                debug!("acquire: chain out of date, rebuilding");
                resize.take();
                backend.recreate()?;
                return Ok(CycleOutcome::Abandoned);
            }
        };

        backend.reset_slot(slot)?;
        backend.record(slot, image_index)?;
        backend.submit(slot)?;
        let present = backend.present(slot, image_index)?;
        trace!("slot {slot} presented image {image_index}: {present:?}");

        self.frame_index = (slot + 1) % MAX_FRAMES_IN_FLIGHT;

        let resized = resize.take();
        if needs_recreate(present, acquire_suboptimal, resized) {
            debug!(
                "rebuilding chain (present={present:?}, acquire_suboptimal={acquire_suboptimal}, resized={resized})"
            );
            backend.recreate()?;
            Ok(CycleOutcome::PresentedAndRecreated)
        } else {
            Ok(CycleOutcome::Presented)
        }
    }
}
