// SPDX-License-Identifier: CEPL-1.0
use std::time::Instant;

use anyhow::{Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::info;

use crate::{wait_for_drawable_extent, Renderer, RenderSettings, ShaderStore, WindowSystem};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_presented: u64,
    pub recreations: u64,
}

/// Builds the renderer, drives it until the window asks to close, then drops
/// it (which tears the backend down).
pub fn run<R, W>(
    window: &mut W,
    shaders: &dyn ShaderStore,
    settings: &RenderSettings,
) -> Result<RunSummary>
where
    R: Renderer,
    W: WindowSystem + HasWindowHandle + HasDisplayHandle,
{
    let mut summary = RunSummary::default();
    let Some(size) = wait_for_drawable_extent(window) else {
        info!("closed before the first frame");
        return Ok(summary);
    };

    let mut renderer = R::new(&*window, &*window, size, shaders, settings)
        .context("renderer startup")?;
    info!("renderer ready ({}x{})", size.width, size.height);

    let mut frames_this_second = 0u32;
    let mut last_fps_instant = Instant::now();

    loop {
        window.pump_events();
        if window.close_requested() {
            info!("close requested");
            break;
        }

        let outcome = renderer.draw_frame(window)?;
        if outcome.presented() {
            summary.frames_presented += 1;
            frames_this_second = frames_this_second.saturating_add(1);
        }
        if outcome.recreated() {
            summary.recreations += 1;
        }

        let now = Instant::now();
        if now.duration_since(last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", frames_this_second);
            frames_this_second = 0;
            last_fps_instant = now;
        }
    }

    drop(renderer);
    info!(
        "shutdown after {} frames ({} chain rebuilds)",
        summary.frames_presented, summary.recreations
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::tests::ScriptedWindow;
    use crate::{CycleOutcome, RenderSize, ShaderStage};
    use raw_window_handle::{DisplayHandle, HandleError, WindowHandle};
    use std::cell::RefCell;

    impl HasWindowHandle for ScriptedWindow {
        fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    impl HasDisplayHandle for ScriptedWindow {
        fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
            Err(HandleError::Unavailable)
        }
    }

    struct NoShaders;

    impl ShaderStore for NoShaders {
        fn load(&self, _stage: ShaderStage) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct Log {
        created_with: Option<RenderSize>,
        frames: usize,
        dropped: bool,
    }

    thread_local! {
        static LOG: RefCell<Log> = RefCell::new(Log::default());
        static SCRIPT: RefCell<Vec<CycleOutcome>> = const { RefCell::new(Vec::new()) };
    }

    struct ScriptedRenderer;

    impl Renderer for ScriptedRenderer {
        fn new(
            _window: &dyn HasWindowHandle,
            _display: &dyn HasDisplayHandle,
            size: RenderSize,
            _shaders: &dyn ShaderStore,
            _settings: &RenderSettings,
        ) -> Result<Self> {
            LOG.with(|l| l.borrow_mut().created_with = Some(size));
            Ok(ScriptedRenderer)
        }

        fn draw_frame(&mut self, _window: &mut dyn WindowSystem) -> Result<CycleOutcome> {
            LOG.with(|l| l.borrow_mut().frames += 1);
            Ok(SCRIPT.with(|s| s.borrow_mut().pop()).unwrap_or(CycleOutcome::Presented))
        }
    }

    impl Drop for ScriptedRenderer {
        fn drop(&mut self) {
            LOG.with(|l| l.borrow_mut().dropped = true);
        }
    }

    fn reset() {
        LOG.with(|l| *l.borrow_mut() = Log::default());
        SCRIPT.with(|s| s.borrow_mut().clear());
    }

    #[test]
    fn loops_until_close_then_tears_down() {
        reset();
        // popped from the back: frame 2 abandons, frame 4 rebuilds after present
        SCRIPT.with(|s| {
            s.borrow_mut().extend([
                CycleOutcome::Presented,
                CycleOutcome::PresentedAndRecreated,
                CycleOutcome::Presented,
                CycleOutcome::Abandoned,
                CycleOutcome::Presented,
            ])
        });

        let mut window = ScriptedWindow::new(RenderSize::new(800, 600));
        window.close_after_pumps = Some(6);

        let summary =
            run::<ScriptedRenderer, _>(&mut window, &NoShaders, &RenderSettings::default())
                .unwrap();

        assert_eq!(
            summary,
            RunSummary {
                frames_presented: 4,
                recreations: 2
            }
        );
        LOG.with(|l| {
            let l = l.borrow();
            assert_eq!(l.frames, 5);
            assert_eq!(l.created_with, Some(RenderSize::new(800, 600)));
            assert!(l.dropped);
        });
    }

    #[test]
    fn startup_waits_for_visible_window() {
        reset();
        let mut window = ScriptedWindow::new(RenderSize::new(0, 0));
        window.upcoming.push_back(RenderSize::new(320, 240));
        window.close_after_pumps = Some(1);

        run::<ScriptedRenderer, _>(&mut window, &NoShaders, &RenderSettings::default()).unwrap();

        LOG.with(|l| assert_eq!(l.borrow().created_with, Some(RenderSize::new(320, 240))));
        assert_eq!(window.waits, 1);
    }
}
