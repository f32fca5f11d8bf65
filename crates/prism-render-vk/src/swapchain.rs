// SPDX-License-Identifier: CEPL-1.0
//! Presentable image chain.
//!
//! The selection policy lives in free functions over plain surface data so
//! it can be exercised without a driver; [`Swapchain`] applies it.

use std::sync::Arc;

use ash::vk;
use prism_render::RenderSize;
use tracing::info;

use crate::{
    device::{Device, QueueFamilyIndices},
    error::{Result, VkError, VkResultExt},
    frame::{AcquireOutcome, PresentOutcome},
    instance::SurfaceSupport,
};

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    // A lone UNDEFINED entry means the surface has no preference.
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return PREFERRED_SURFACE_FORMAT;
        }
    }
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_SURFACE_FORMAT.format
                && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
        })
        .or_else(|| formats.first().copied())
        .unwrap_or(PREFERRED_SURFACE_FORMAT)
}

pub fn choose_present_mode(modes: &[vk::PresentModeKHR], force_fifo: bool) -> vk::PresentModeKHR {
    if force_fifo {
        return vk::PresentModeKHR::FIFO;
    }
    // FIFO is always supported.
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|m| modes.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        want.min(caps.max_image_count)
    } else {
        want
    }
}

pub fn choose_usage(caps: &vk::SurfaceCapabilitiesKHR) -> vk::ImageUsageFlags {
    let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
    for extra in [
        vk::ImageUsageFlags::TRANSFER_SRC,
        vk::ImageUsageFlags::TRANSFER_DST,
    ] {
        if caps.supported_usage_flags.contains(extra) {
            usage |= extra;
        }
    }
    usage
}

pub fn choose_pre_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

pub fn choose_composite_alpha(caps: &vk::SurfaceCapabilitiesKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&a| caps.supported_composite_alpha.contains(a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Staleness from `vkAcquireNextImageKHR` becomes an outcome; anything
/// else is a driver error.
#[track_caller]
pub fn classify_acquire(res: std::result::Result<(u32, bool), vk::Result>) -> Result<AcquireOutcome> {
    match res {
        Ok((index, false)) => Ok(AcquireOutcome::Acquired(index)),
        Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(index)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(code) => Err(VkError::driver("vkAcquireNextImageKHR", code)),
    }
}

#[track_caller]
pub fn classify_present(res: std::result::Result<bool, vk::Result>) -> Result<PresentOutcome> {
    match res {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(code) => Err(VkError::driver("vkQueuePresentKHR", code)),
    }
}

/// How swapchain images are shared between the graphics and present queues.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharingPlan {
    pub mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
}

pub fn sharing_plan(graphics: u32, present: u32) -> SharingPlan {
    if graphics == present {
        SharingPlan {
            mode: vk::SharingMode::EXCLUSIVE,
            queue_family_indices: Vec::new(),
        }
    } else {
        SharingPlan {
            mode: vk::SharingMode::CONCURRENT,
            queue_family_indices: vec![graphics, present],
        }
    }
}

/// Every decision that goes into one swapchain creation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub sharing: SharingPlan,
}

impl SwapchainPlan {
    pub fn new(
        support: &SurfaceSupport,
        want: RenderSize,
        force_fifo: bool,
        families: &QueueFamilyIndices,
    ) -> Self {
        let caps = &support.capabilities;
        SwapchainPlan {
            format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes, force_fifo),
            extent: choose_extent(caps, want),
            image_count: choose_image_count(caps),
            usage: choose_usage(caps),
            pre_transform: choose_pre_transform(caps),
            composite_alpha: choose_composite_alpha(caps),
            sharing: sharing_plan(families.graphics, families.present),
        }
    }
}

pub struct Swapchain {
    device: Arc<Device>,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    pub fn new(device: Arc<Device>, size: RenderSize, force_fifo: bool) -> Result<Self> {
        let mut swapchain = Swapchain {
            device,
            handle: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            format: PREFERRED_SURFACE_FORMAT,
            present_mode: vk::PresentModeKHR::FIFO,
            extent: vk::Extent2D::default(),
        };
        swapchain.create(size, force_fifo)?;
        Ok(swapchain)
    }

    /// Builds a new chain for `size`, handing the current one to the driver
    /// as `old_swapchain` and destroying it afterwards.
    ///
    /// The caller guarantees the device is idle and nothing references the
    /// current images.
    pub fn create(&mut self, size: RenderSize, force_fifo: bool) -> Result<()> {
        let support = self
            .device
            .instance()
            .surface_support(self.device.physical())?;
        let plan = SwapchainPlan::new(&support, size, force_fifo, &self.device.queue_families());
        let device = Arc::clone(&self.device);

        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: device.instance().surface(),
            min_image_count: plan.image_count,
            image_format: plan.format.format,
            image_color_space: plan.format.color_space,
            image_extent: plan.extent,
            image_array_layers: 1,
            image_usage: plan.usage,
            image_sharing_mode: plan.sharing.mode,
            queue_family_index_count: plan.sharing.queue_family_indices.len() as u32,
            p_queue_family_indices: plan.sharing.queue_family_indices.as_ptr(),
            pre_transform: plan.pre_transform,
            composite_alpha: plan.composite_alpha,
            present_mode: plan.present_mode,
            clipped: vk::TRUE,
            old_swapchain: self.handle,
            ..Default::default()
        };

        let loader = device.swapchain_loader();
        let handle = unsafe { loader.create_swapchain(&info, None) }.check("vkCreateSwapchainKHR")?;

        // The old chain is retired either way; release it before building views.
        self.cleanup();
        self.handle = handle;

        self.images = unsafe { loader.get_swapchain_images(handle) }.check("vkGetSwapchainImagesKHR")?;
        for &image in &self.images {
            let view = unsafe { create_color_view(device.raw(), image, plan.format.format)? };
            self.views.push(view);
        }

        self.format = plan.format;
        self.present_mode = plan.present_mode;
        self.extent = plan.extent;

        info!(
            "swapchain ready: {}x{}, {:?}/{:?}, {:?}, {} images",
            plan.extent.width,
            plan.extent.height,
            plan.format.format,
            plan.format.color_space,
            plan.present_mode,
            self.images.len()
        );
        Ok(())
    }

    /// Destroys the image views, then the swapchain. Safe to call twice.
    pub fn cleanup(&mut self) {
        let device = self.device.raw();
        for view in self.views.drain(..) {
            unsafe { device.destroy_image_view(view, None) };
        }
        self.images.clear();
        if self.handle != vk::SwapchainKHR::null() {
            unsafe {
                self.device
                    .swapchain_loader()
                    .destroy_swapchain(self.handle, None)
            };
            self.handle = vk::SwapchainKHR::null();
        }
    }

    pub fn acquire_next_image(&self, signal: vk::Semaphore) -> Result<AcquireOutcome> {
        let res = unsafe {
            self.device.swapchain_loader().acquire_next_image(
                self.handle,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        };
        classify_acquire(res)
    }

    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> Result<PresentOutcome> {
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &self.handle,
            p_image_indices: &image_index,
            ..Default::default()
        };
        classify_present(unsafe { self.device.swapchain_loader().queue_present(queue, &present) })
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.cleanup();
    }
}

unsafe fn create_color_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        components: vk::ComponentMapping {
            r: vk::ComponentSwizzle::R,
            g: vk::ComponentSwizzle::G,
            b: vk::ComponentSwizzle::B,
            a: vk::ComponentSwizzle::A,
        },
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    unsafe { device.create_image_view(&info, None) }.check("vkCreateImageView")
}
