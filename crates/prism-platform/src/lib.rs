// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use prism_render::{RenderSize, ResizeFlag, WindowSystem};
use tracing::{debug, info, warn};

pub use winit;

use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    raw_window_handle::{
        DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
    },
    window::{Window, WindowAttributes, WindowId},
};

#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

/// A single winit window driven by pumping its event loop from the caller's
/// thread instead of handing control to `run_app`.
pub struct PlatformWindow {
    state: WindowState,
    event_loop: EventLoop<()>,
}

struct WindowState {
    attributes: WindowAttributes,
    window: Option<Window>,
    create_error: Option<OsError>,
    size: RenderSize,
    resized: ResizeFlag,
    close_requested: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match event_loop.create_window(self.attributes.clone()) {
            Ok(window) => {
                let size = window.inner_size();
                self.size = RenderSize::new(size.width, size.height);
                info!("window created ({}x{})", size.width, size.height);
                self.window = Some(window);
            }
            Err(e) => self.create_error = Some(e),
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.close_requested = true;
            }
            WindowEvent::Resized(new_size) => {
                debug!("Resized → {}x{}", new_size.width, new_size.height);
                self.size = RenderSize::new(new_size.width, new_size.height);
                self.resized.raise();
            }
            _ => {}
        }
    }
}

impl PlatformWindow {
    pub fn open(cfg: &WindowConfig) -> Result<Self> {
        let event_loop = EventLoop::new().context("create event loop")?;
        let attributes = Window::default_attributes()
            .with_title(cfg.title.clone())
            .with_inner_size(PhysicalSize::new(cfg.width, cfg.height))
            .with_resizable(true);

        let mut this = Self {
            state: WindowState {
                attributes,
                window: None,
                create_error: None,
                size: RenderSize::new(cfg.width, cfg.height),
                resized: ResizeFlag::new(),
                close_requested: false,
            },
            event_loop,
        };

        // The window only exists once the loop has delivered `resumed`.
        while this.state.window.is_none() {
            this.pump(Some(Duration::from_millis(10)))?;
            if let Some(e) = this.state.create_error.take() {
                return Err(anyhow!("create_window: {e}"));
            }
            if this.state.close_requested {
                return Err(anyhow!("window closed before it was created"));
            }
        }
        Ok(this)
    }

    fn pump(&mut self, timeout: Option<Duration>) -> Result<()> {
        match self.event_loop.pump_app_events(timeout, &mut self.state) {
            PumpStatus::Continue => Ok(()),
            PumpStatus::Exit(code) => {
                self.state.close_requested = true;
                if code == 0 {
                    Ok(())
                } else {
                    Err(anyhow!("event loop exited with code {code}"))
                }
            }
        }
    }

    fn window(&self) -> Result<&Window, HandleError> {
        self.state.window.as_ref().ok_or(HandleError::Unavailable)
    }
}

impl WindowSystem for PlatformWindow {
    fn framebuffer_size(&self) -> RenderSize {
        match &self.state.window {
            Some(w) => {
                let size = w.inner_size();
                RenderSize::new(size.width, size.height)
            }
            None => self.state.size,
        }
    }

    fn pump_events(&mut self) {
        if let Err(e) = self.pump(Some(Duration::ZERO)) {
            warn!("{e:#}");
        }
    }

    fn wait_events(&mut self, timeout: Duration) {
        if let Err(e) = self.pump(Some(timeout)) {
            warn!("{e:#}");
        }
    }

    fn close_requested(&self) -> bool {
        self.state.close_requested
    }

    fn resize_flag(&self) -> ResizeFlag {
        self.state.resized.clone()
    }
}

impl HasWindowHandle for PlatformWindow {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.window()?.window_handle()
    }
}

impl HasDisplayHandle for PlatformWindow {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.window()?.display_handle()
    }
}
