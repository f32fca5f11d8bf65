// SPDX-License-Identifier: CEPL-1.0
//! Depth attachment and per-image framebuffers.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::{
    device::{depth_aspect, Device},
    error::{Result, VkResultExt},
    render_pass::RenderPass,
    swapchain::Swapchain,
};

/// One depth-stencil image, its memory and view.
pub struct DepthStencil {
    device: Arc<Device>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl DepthStencil {
    pub fn new(device: Arc<Device>, extent: vk::Extent2D) -> Result<Self> {
        let format = device.depth_format();
        let raw = device.raw();

        let img_ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = unsafe { raw.create_image(&img_ci, None) }.check("vkCreateImage")?;

        // From here on, partial state is released by Drop on the error path.
        let mut depth = DepthStencil {
            device: Arc::clone(&device),
            image,
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
            format,
            extent,
        };

        let req = unsafe { raw.get_image_memory_requirements(image) };
        let alloc = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: device
                .memory_type_index(req.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL)?,
            ..Default::default()
        };
        depth.memory = unsafe { raw.allocate_memory(&alloc, None) }.check("vkAllocateMemory")?;
        unsafe { raw.bind_image_memory(image, depth.memory, 0) }.check("vkBindImageMemory")?;

        let view_ci = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            format,
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: depth_aspect(format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            },
            ..Default::default()
        };
        depth.view = unsafe { raw.create_image_view(&view_ci, None) }.check("vkCreateImageView")?;

        debug!("depth {:?} {}x{}", format, extent.width, extent.height);
        Ok(depth)
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for DepthStencil {
    fn drop(&mut self) {
        let d = self.device.raw();
        unsafe {
            d.destroy_image_view(self.view, None);
            d.destroy_image(self.image, None);
            d.free_memory(self.memory, None);
        }
    }
}

/// One framebuffer per swapchain image, all sharing the owned depth attachment.
///
/// Framebuffers are always destroyed before the depth they reference.
pub struct FramebufferSet {
    device: Arc<Device>,
    framebuffers: Vec<vk::Framebuffer>,
    depth: DepthStencil,
}

impl FramebufferSet {
    pub fn new(device: Arc<Device>, render_pass: &RenderPass, swapchain: &Swapchain) -> Result<Self> {
        let depth = DepthStencil::new(Arc::clone(&device), swapchain.extent())?;
        let mut set = FramebufferSet {
            device,
            framebuffers: Vec::new(),
            depth,
        };
        set.rebuild_framebuffers(render_pass, swapchain)?;
        Ok(set)
    }

    /// Drops every framebuffer and replaces the depth attachment for `extent`.
    pub fn rebuild_depth(&mut self, extent: vk::Extent2D) -> Result<()> {
        self.destroy_framebuffers();
        self.depth = DepthStencil::new(Arc::clone(&self.device), extent)?;
        Ok(())
    }

    /// One framebuffer per swapchain view, bound to the current depth view.
    pub fn rebuild_framebuffers(&mut self, render_pass: &RenderPass, swapchain: &Swapchain) -> Result<()> {
        self.destroy_framebuffers();
        let extent = swapchain.extent();
        for &color in swapchain.views() {
            let attachments = [color, self.depth.view()];
            let info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass: render_pass.raw(),
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: extent.width,
                height: extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = unsafe { self.device.raw().create_framebuffer(&info, None) }
                .check("vkCreateFramebuffer")?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    pub fn get(&self, image_index: usize) -> vk::Framebuffer {
        self.framebuffers[image_index]
    }

    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }

    fn destroy_framebuffers(&mut self) {
        for fb in self.framebuffers.drain(..) {
            unsafe { self.device.raw().destroy_framebuffer(fb, None) };
        }
    }
}

impl Drop for FramebufferSet {
    fn drop(&mut self) {
        self.destroy_framebuffers();
    }
}
