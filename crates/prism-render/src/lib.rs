// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        RenderSize { width, height }
    }

    /// Minimised windows report a zero dimension.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// What a renderer needs to know at construction time.
#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub app_name: String,
    pub size: RenderSize,
    pub sample_count: u32,
    pub force_fifo: bool,
    pub present_wait_idle: bool,
    pub validation: bool,
}

/// The windowing side of the frame loop.
///
/// `take_resized` has read-and-clear semantics: a resize reported by the
/// windowing system stays pending until the frame loop consumes it.
pub trait WindowSurface {
    fn framebuffer_size(&self) -> RenderSize;
    /// Blocks until at least one window event has been processed.
    fn wait_events(&mut self);
    fn take_resized(&mut self) -> bool;
    fn close_requested(&self) -> bool;
}

/// Result of one tick of the frame loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented { image_index: u32 },
    /// Swapchain-dependent state was rebuilt. `presented` is the image that
    /// reached the screen before the rebuild, if any.
    Recreated { presented: Option<u32> },
    /// Window asked to close while we were waiting for it to become visible.
    Closed,
}

pub trait Renderer {
    /// Advances technique state; `time` is seconds since start.
    fn update(&mut self, time: f32);
    fn render(&mut self, window: &mut dyn WindowSurface) -> Result<FrameStatus>;
    /// Blocks until the GPU has retired all submitted work.
    fn wait_idle(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dimension_is_empty() {
        assert!(RenderSize::new(0, 600).is_empty());
        assert!(RenderSize::new(800, 0).is_empty());
        assert!(!RenderSize::new(1, 1).is_empty());
    }

    #[test]
    fn aspect_guards_zero_height() {
        assert_eq!(RenderSize::new(800, 0).aspect(), 1.0);
        assert_eq!(RenderSize::new(800, 400).aspect(), 2.0);
    }
}
