// SPDX-License-Identifier: CEPL-1.0
//! Extension point for demo rendering code.
//!
//! The backend owns the render pass, framebuffers and command buffers; a
//! technique only records draw commands into the pass the backend has begun.

use std::sync::Arc;

use ash::vk;

use crate::{device::Device, error::Result};

/// When a technique's command buffers are (re)recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RecordMode {
    /// Once at startup and after every swapchain recreation.
    #[default]
    Static,
    /// Before every submit, for techniques whose commands change per frame.
    PerFrame,
}

/// Everything a technique may need from the presentation setup.
pub struct TechniqueContext<'a> {
    pub device: &'a Arc<Device>,
    pub render_pass: vk::RenderPass,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub extent: vk::Extent2D,
    /// Usable MSAA count for targets the technique owns. The default pass
    /// is single-sampled, so pipelines used inside it take `TYPE_1`.
    pub samples: vk::SampleCountFlags,
    pub image_count: usize,
}

impl TechniqueContext<'_> {
    pub fn aspect(&self) -> f32 {
        if self.extent.height == 0 {
            1.0
        } else {
            self.extent.width as f32 / self.extent.height as f32
        }
    }

    /// Full-extent viewport with the usual 0..1 depth range.
    pub fn viewport(&self) -> vk::Viewport {
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: self.extent.width as f32,
            height: self.extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }

    pub fn scissor(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

pub trait Technique {
    fn name(&self) -> &str;

    fn record_mode(&self) -> RecordMode {
        RecordMode::Static
    }

    /// Called once after the device, swapchain and render pass exist.
    fn on_post_init(&mut self, ctx: &TechniqueContext<'_>) -> Result<()>;

    /// Called when the render pass was rebuilt; pipelines built against the
    /// old one must be recreated.
    fn on_render_pass_changed(&mut self, ctx: &TechniqueContext<'_>) -> Result<()> {
        let _ = ctx;
        Ok(())
    }

    /// Color then depth/stencil.
    fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.025, 0.025, 0.025, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ]
    }

    /// Records draw commands. The render pass is already begun on `cmd`.
    fn record(&mut self, ctx: &TechniqueContext<'_>, cmd: vk::CommandBuffer, image_index: usize);

    /// Called after every swapchain recreation, once new command buffers are recorded.
    fn view_changed(&mut self, ctx: &TechniqueContext<'_>) {
        let _ = ctx;
    }

    fn update(&mut self, time: f32) {
        let _ = time;
    }
}

/// Pushes a plain-old-data value as push constants.
///
/// # Safety
/// `cmd` must be recording and `layout` must declare a range covering
/// `offset..offset + size_of::<T>()` for `stages`.
pub unsafe fn push_constants<T: bytemuck::Pod>(
    device: &Device,
    cmd: vk::CommandBuffer,
    layout: vk::PipelineLayout,
    stages: vk::ShaderStageFlags,
    offset: u32,
    value: &T,
) {
    unsafe {
        device
            .raw()
            .cmd_push_constants(cmd, layout, stages, offset, bytemuck::bytes_of(value))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_mode_defaults_to_static() {
        assert_eq!(RecordMode::default(), RecordMode::Static);
    }
}
