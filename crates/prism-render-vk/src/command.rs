// SPDX-License-Identifier: CEPL-1.0
use std::sync::Arc;

use ash::vk;

use crate::{
    device::Device,
    error::{Result, VkResultExt},
};

/// Primary command buffers from the device's resettable pool, one per
/// swapchain image. Allocated and freed as a batch.
pub struct CommandBuffers {
    device: Arc<Device>,
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandBuffers {
    pub fn allocate(device: Arc<Device>, count: usize) -> Result<Self> {
        let mut cmds = CommandBuffers {
            device,
            buffers: Vec::new(),
        };
        cmds.reallocate(count)?;
        Ok(cmds)
    }

    /// Frees the current batch and allocates `count` fresh buffers.
    pub fn reallocate(&mut self, count: usize) -> Result<()> {
        self.free();
        if count == 0 {
            return Ok(());
        }
        let info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: self.device.command_pool(),
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count as u32,
            ..Default::default()
        };
        self.buffers = unsafe { self.device.raw().allocate_command_buffers(&info) }
            .check("vkAllocateCommandBuffers")?;
        Ok(())
    }

    pub fn get(&self, image_index: usize) -> vk::CommandBuffer {
        self.buffers[image_index]
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    fn free(&mut self) {
        if !self.buffers.is_empty() {
            unsafe {
                self.device
                    .raw()
                    .free_command_buffers(self.device.command_pool(), &self.buffers)
            };
            self.buffers.clear();
        }
    }
}

impl Drop for CommandBuffers {
    fn drop(&mut self) {
        self.free();
    }
}
