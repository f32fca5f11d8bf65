// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]

pub mod backend;
pub mod command;
pub mod device;
pub mod error;
pub mod frame;
pub mod framebuffer;
pub mod instance;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod technique;

use anyhow::{Context, Result};
use prism_render::{FrameStatus, RenderSettings, Renderer, WindowSurface};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

pub use backend::VkBackend;
pub use device::Device;
pub use error::{VkError, VkResultExt};
pub use frame::{DriverOptions, FrameBackend, FrameDriver, MAX_FRAMES_IN_FLIGHT};
pub use shader::ShaderModule;
pub use technique::{push_constants, RecordMode, Technique, TechniqueContext};

pub struct VkRenderer {
    driver: FrameDriver<VkBackend>,
}

impl VkRenderer {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        settings: &RenderSettings,
        technique: Box<dyn Technique>,
    ) -> Result<Self> {
        let backend = VkBackend::new(window, display, settings, technique)
            .context("creating Vulkan backend")?;
        let options = DriverOptions {
            present_wait_idle: settings.present_wait_idle,
            ..Default::default()
        };
        let driver = FrameDriver::new(backend, options).context("creating frame sync objects")?;
        Ok(VkRenderer { driver })
    }

    pub fn frames_presented(&self) -> u64 {
        self.driver.frames_presented()
    }

    pub fn recreations(&self) -> u64 {
        self.driver.recreations()
    }

    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        self.driver.backend().swapchain().present_mode()
    }

    pub fn adapter_name(&self) -> String {
        self.driver.backend().device().name()
    }
}

impl Renderer for VkRenderer {
    fn update(&mut self, time: f32) {
        self.driver.backend_mut().update(time);
    }

    fn render(&mut self, window: &mut dyn WindowSurface) -> Result<FrameStatus> {
        Ok(self.driver.tick(window)?)
    }

    fn wait_idle(&mut self) -> Result<()> {
        Ok(self.driver.wait_idle()?)
    }
}
