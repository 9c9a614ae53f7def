// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use ash::vk;
use prism_render::{wait_for_drawable_extent, RenderSize, WindowSystem, EXTENT_POLL_INTERVAL};
use tracing::{debug, info};

use crate::chain::is_drawable;

/// The device-facing steps of a chain rebuild.
pub trait ChainRebuild {
    /// Block until nothing on the device still uses the current chain.
    fn idle(&mut self) -> Result<()>;
    /// The extent a chain built for `hint` would get from the surface now.
    fn surface_extent(&mut self, hint: RenderSize) -> Result<vk::Extent2D>;
    fn build(&mut self, size: RenderSize) -> Result<()>;
}

/// poll window → idle → check surface → build.
///
/// Both the window and the surface have to agree on a non-zero size before
/// `build` runs; while either says zero this keeps waiting in the window's
/// event pump. Returns the size built for, or `None` if close was requested
/// first (nothing is built then).
pub fn rebuild_when_drawable(
    target: &mut dyn ChainRebuild,
    window: &mut dyn WindowSystem,
) -> Result<Option<RenderSize>> {
    let mut idle = false;
    loop {
        let Some(size) = wait_for_drawable_extent(window) else {
            info!("close requested while minimized, skipping chain rebuild");
            return Ok(None);
        };
        if !idle {
            target.idle()?;
            idle = true;
        }

        let extent = target.surface_extent(size)?;
        if is_drawable(extent) {
            target.build(size)?;
            return Ok(Some(size));
        }

        debug!(
            "window is {}x{} but surface reports {}x{}, waiting",
            size.width, size.height, extent.width, extent.height
        );
        if window.close_requested() {
            info!("close requested while the surface is empty, skipping chain rebuild");
            return Ok(None);
        }
        window.wait_events(EXTENT_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use prism_render::ResizeFlag;

    use super::*;

    /// Window whose size changes only when events are waited for.
    struct ScriptedWindow {
        size: RenderSize,
        upcoming: VecDeque<RenderSize>,
        waits: usize,
        close_after_waits: Option<usize>,
        resize: ResizeFlag,
    }

    impl ScriptedWindow {
        fn new(size: RenderSize) -> Self {
            Self {
                size,
                upcoming: VecDeque::new(),
                waits: 0,
                close_after_waits: None,
                resize: ResizeFlag::new(),
            }
        }
    }

    impl WindowSystem for ScriptedWindow {
        fn framebuffer_size(&self) -> RenderSize {
            self.size
        }
        fn pump_events(&mut self) {}
        fn wait_events(&mut self, _timeout: Duration) {
            self.waits += 1;
            if let Some(next) = self.upcoming.pop_front() {
                self.size = next;
            }
        }
        fn close_requested(&self) -> bool {
            self.close_after_waits.is_some_and(|n| self.waits >= n)
        }
        fn resize_flag(&self) -> ResizeFlag {
            self.resize.clone()
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Step {
        Idle,
        Query(RenderSize),
        Build(RenderSize),
    }

    /// Surface that reports queued extents, then follows the window.
    #[derive(Default)]
    struct ScriptedChain {
        steps: Vec<Step>,
        surface: VecDeque<vk::Extent2D>,
    }

    impl ChainRebuild for ScriptedChain {
        fn idle(&mut self) -> Result<()> {
            self.steps.push(Step::Idle);
            Ok(())
        }

        fn surface_extent(&mut self, hint: RenderSize) -> Result<vk::Extent2D> {
            self.steps.push(Step::Query(hint));
            Ok(self.surface.pop_front().unwrap_or(vk::Extent2D {
                width: hint.width,
                height: hint.height,
            }))
        }

        fn build(&mut self, size: RenderSize) -> Result<()> {
            self.steps.push(Step::Build(size));
            Ok(())
        }
    }

    fn zero() -> vk::Extent2D {
        vk::Extent2D {
            width: 0,
            height: 0,
        }
    }

    #[test]
    fn visible_window_rebuilds_straight_away() {
        let mut window = ScriptedWindow::new(RenderSize::new(800, 600));
        let mut chain = ScriptedChain::default();

        let built = rebuild_when_drawable(&mut chain, &mut window).unwrap();
        assert_eq!(built, Some(RenderSize::new(800, 600)));
        assert_eq!(
            chain.steps,
            vec![
                Step::Idle,
                Step::Query(RenderSize::new(800, 600)),
                Step::Build(RenderSize::new(800, 600)),
            ]
        );
        assert_eq!(window.waits, 0);
    }

    #[test]
    fn minimized_window_is_waited_out_before_anything_happens() {
        let mut window = ScriptedWindow::new(RenderSize::new(0, 0));
        window.upcoming.extend([
            RenderSize::new(0, 0),
            RenderSize::new(0, 480),
            RenderSize::new(640, 480),
        ]);
        let mut chain = ScriptedChain::default();

        let built = rebuild_when_drawable(&mut chain, &mut window).unwrap();
        assert_eq!(built, Some(RenderSize::new(640, 480)));
        assert_eq!(window.waits, 3);
        assert_eq!(
            chain.steps,
            vec![
                Step::Idle,
                Step::Query(RenderSize::new(640, 480)),
                Step::Build(RenderSize::new(640, 480)),
            ]
        );
    }

    #[test]
    fn empty_surface_is_waited_out_even_when_window_has_a_size() {
        let mut window = ScriptedWindow::new(RenderSize::new(800, 600));
        let mut chain = ScriptedChain::default();
        chain.surface.extend([zero(), zero()]);

        let built = rebuild_when_drawable(&mut chain, &mut window).unwrap();
        assert_eq!(built, Some(RenderSize::new(800, 600)));
        assert_eq!(window.waits, 2);

        let builds: Vec<_> = chain
            .steps
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, Step::Build(_)))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(builds, vec![chain.steps.len() - 1]);
        assert_eq!(chain.steps.iter().filter(|s| **s == Step::Idle).count(), 1);
        assert_eq!(chain.steps[0], Step::Idle);
    }

    #[test]
    fn close_while_minimized_builds_nothing() {
        let mut window = ScriptedWindow::new(RenderSize::new(0, 0));
        window.close_after_waits = Some(2);
        let mut chain = ScriptedChain::default();

        let built = rebuild_when_drawable(&mut chain, &mut window).unwrap();
        assert_eq!(built, None);
        assert!(chain.steps.is_empty());
    }

    #[test]
    fn close_while_surface_is_empty_builds_nothing() {
        let mut window = ScriptedWindow::new(RenderSize::new(800, 600));
        window.close_after_waits = Some(1);
        let mut chain = ScriptedChain::default();
        chain.surface.extend([zero(), zero(), zero()]);

        let built = rebuild_when_drawable(&mut chain, &mut window).unwrap();
        assert_eq!(built, None);
        assert!(!chain.steps.iter().any(|s| matches!(s, Step::Build(_))));
    }
}
