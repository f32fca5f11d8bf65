// SPDX-License-Identifier: CEPL-1.0
//! Window and event pump.
//!
//! The frame loop is driven from `main`, so winit is pumped rather than run:
//! [`PlatformWindow::poll_events`] drains pending events, and
//! [`WindowSurface::wait_events`] blocks until at least one arrives.

mod input;

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use prism_render::{RenderSize, WindowSurface};
use tracing::{debug, info};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    error::OsError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

pub use input::InputState;

/// Event sink handed to winit while pumping.
struct WindowState {
    attributes: Option<WindowAttributes>,
    created: Option<Window>,
    create_error: Option<OsError>,
    size: RenderSize,
    resized: bool,
    close_requested: bool,
    input: InputState,
}

impl WindowState {
    fn new(attributes: WindowAttributes) -> Self {
        WindowState {
            attributes: Some(attributes),
            created: None,
            create_error: None,
            size: RenderSize::default(),
            resized: false,
            close_requested: false,
            input: InputState::default(),
        }
    }

    fn on_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                debug!("resized {}x{}", size.width, size.height);
                self.size = RenderSize::new(size.width, size.height);
                self.resized = true;
            }
            WindowEvent::KeyboardInput { event, .. } => self.input.handle_key(event),
            WindowEvent::Focused(false) => self.input.clear(),
            _ => {}
        }
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.attributes.take() else {
            return;
        };
        match event_loop.create_window(attributes) {
            Ok(window) => {
                let size = window.inner_size();
                self.size = RenderSize::new(size.width, size.height);
                self.created = Some(window);
            }
            Err(e) => {
                self.create_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        self.on_event(&event);
    }
}

pub struct PlatformWindow {
    window: Window,
    event_loop: EventLoop<()>,
    state: WindowState,
}

impl PlatformWindow {
    pub fn open(title: &str, width: u32, height: u32) -> Result<Self> {
        let mut event_loop = EventLoop::new().context("creating event loop")?;
        let attributes = Window::default_attributes()
            .with_title(title)
            .with_inner_size(LogicalSize::new(width, height));
        let mut state = WindowState::new(attributes);

        let window = loop {
            let status = event_loop.pump_app_events(Some(Duration::from_millis(16)), &mut state);
            if let Some(e) = state.create_error.take() {
                return Err(anyhow!(e).context("creating window"));
            }
            if let Some(window) = state.created.take() {
                break window;
            }
            if let PumpStatus::Exit(code) = status {
                bail!("event loop exited with {code} before the window was created");
            }
        };

        info!(
            "window '{}' {}x{} (framebuffer {}x{})",
            title, width, height, state.size.width, state.size.height
        );
        Ok(PlatformWindow {
            window,
            event_loop,
            state,
        })
    }

    /// Processes pending events without blocking.
    pub fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn input(&self) -> &InputState {
        &self.state.input
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        let status = self.event_loop.pump_app_events(timeout, &mut self.state);
        if let PumpStatus::Exit(_) = status {
            self.state.close_requested = true;
        }
    }
}

impl WindowSurface for PlatformWindow {
    fn framebuffer_size(&self) -> RenderSize {
        self.state.size
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn take_resized(&mut self) -> bool {
        self.state.take_resized()
    }

    fn close_requested(&self) -> bool {
        self.state.close_requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalSize;

    #[test]
    fn resize_is_sticky_until_consumed() {
        let mut state = WindowState::new(Window::default_attributes());
        state.on_event(&WindowEvent::Resized(PhysicalSize::new(0, 0)));
        assert!(state.size.is_empty());
        state.on_event(&WindowEvent::Resized(PhysicalSize::new(800, 600)));
        assert_eq!(state.size, RenderSize::new(800, 600));
        assert!(state.take_resized());
        assert!(!state.take_resized());
    }

    #[test]
    fn close_request_is_recorded() {
        let mut state = WindowState::new(Window::default_attributes());
        assert!(!state.close_requested);
        state.on_event(&WindowEvent::CloseRequested);
        assert!(state.close_requested);
    }
}
