// SPDX-License-Identifier: CEPL-1.0
//! The real [`FrameBackend`]: device, swapchain, render targets and the
//! technique, wired together.
use std::sync::Arc;

use ash::vk;
use prism_render::{RenderSettings, RenderSize};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{info, warn};

use crate::{
    command::CommandBuffers,
    device::Device,
    error::{Result, VkResultExt},
    frame::{AcquireOutcome, FrameBackend, PresentOutcome},
    framebuffer::FramebufferSet,
    instance::Instance,
    render_pass::RenderPass,
    swapchain::Swapchain,
    technique::{RecordMode, Technique, TechniqueContext},
};

// Field order is drop order: technique objects and command buffers go before
// the targets they reference, and the device Arc (holding the instance) last.
pub struct VkBackend {
    technique: Box<dyn Technique>,
    commands: CommandBuffers,
    framebuffers: FramebufferSet,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<Device>,
    force_fifo: bool,
    samples: vk::SampleCountFlags,
}

impl VkBackend {
    pub fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        settings: &RenderSettings,
        technique: Box<dyn Technique>,
    ) -> Result<Self> {
        // STRICT ORDER:
        // instance + surface -> device -> swapchain -> render pass
        // -> depth + framebuffers -> command buffers -> technique init -> record
        let instance = Arc::new(Instance::new(
            window,
            display,
            &settings.app_name,
            settings.validation,
        )?);
        let device = Device::new(instance)?;
        let samples = device.usable_sample_count(settings.sample_count);

        let swapchain = Swapchain::new(Arc::clone(&device), settings.size, settings.force_fifo)?;
        let render_pass = RenderPass::new(
            Arc::clone(&device),
            swapchain.format().format,
            device.depth_format(),
        )?;
        let framebuffers = FramebufferSet::new(Arc::clone(&device), &render_pass, &swapchain)?;
        let commands = CommandBuffers::allocate(Arc::clone(&device), swapchain.image_count())?;

        let mut backend = VkBackend {
            technique,
            commands,
            framebuffers,
            render_pass,
            swapchain,
            device,
            force_fifo: settings.force_fifo,
            samples,
        };

        let ctx = technique_context(
            &backend.device,
            &backend.render_pass,
            &backend.swapchain,
            backend.samples,
        );
        backend.technique.on_post_init(&ctx)?;
        backend.technique.view_changed(&ctx);
        backend.record_all()?;

        info!(
            "technique '{}' ready ({:?})",
            backend.technique.name(),
            backend.technique.record_mode()
        );
        Ok(backend)
    }

    pub fn update(&mut self, time: f32) {
        self.technique.update(time);
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    fn record_all(&mut self) -> Result<()> {
        for i in 0..self.commands.len() {
            self.record(i)?;
        }
        Ok(())
    }

    fn record(&mut self, image_index: usize) -> Result<()> {
        let cmd = self.commands.get(image_index);
        let d = self.device.raw();

        unsafe { d.reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty()) }
            .check("vkResetCommandBuffer")?;
        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            ..Default::default()
        };
        unsafe { d.begin_command_buffer(cmd, &begin) }.check("vkBeginCommandBuffer")?;

        let clears = self.technique.clear_values();
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: self.render_pass.raw(),
            framebuffer: self.framebuffers.get(image_index),
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.swapchain.extent(),
            },
            clear_value_count: clears.len() as u32,
            p_clear_values: clears.as_ptr(),
            ..Default::default()
        };
        unsafe { d.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE) };

        let ctx = technique_context(&self.device, &self.render_pass, &self.swapchain, self.samples);
        self.technique.record(&ctx, cmd, image_index);

        unsafe {
            d.cmd_end_render_pass(cmd);
            d.end_command_buffer(cmd)
        }
        .check("vkEndCommandBuffer")
    }
}

fn technique_context<'a>(
    device: &'a Arc<Device>,
    render_pass: &RenderPass,
    swapchain: &Swapchain,
    samples: vk::SampleCountFlags,
) -> TechniqueContext<'a> {
    TechniqueContext {
        device,
        render_pass: render_pass.raw(),
        color_format: render_pass.color_format(),
        depth_format: render_pass.depth_format(),
        extent: swapchain.extent(),
        samples,
        image_count: swapchain.image_count(),
    }
}

impl FrameBackend for VkBackend {
    fn create_semaphore(&mut self) -> Result<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        unsafe { self.device.raw().create_semaphore(&info, None) }.check("vkCreateSemaphore")
    }

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence> {
        let info = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: if signaled {
                vk::FenceCreateFlags::SIGNALED
            } else {
                vk::FenceCreateFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.raw().create_fence(&info, None) }.check("vkCreateFence")
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.device.raw().destroy_semaphore(semaphore, None) };
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.device.raw().destroy_fence(fence, None) };
    }

    fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<AcquireOutcome> {
        self.swapchain.acquire_next_image(signal)
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.raw().wait_for_fences(&[fence], true, u64::MAX) }
            .check("vkWaitForFences")
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.raw().reset_fences(&[fence]) }.check("vkResetFences")
    }

    fn prepare_command_buffer(&mut self, image_index: u32) -> Result<vk::CommandBuffer> {
        let i = image_index as usize;
        if self.technique.record_mode() == RecordMode::PerFrame {
            self.record(i)?;
        }
        Ok(self.commands.get(i))
    }

    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            p_wait_dst_stage_mask: &wait_stage,
            command_buffer_count: 1,
            p_command_buffers: &command_buffer,
            signal_semaphore_count: 1,
            p_signal_semaphores: &signal,
            ..Default::default()
        };
        unsafe {
            self.device
                .raw()
                .queue_submit(self.device.graphics_queue(), &[submit], fence)
        }
        .check("vkQueueSubmit")
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> Result<PresentOutcome> {
        self.swapchain
            .present(self.device.present_queue(), image_index, wait)
    }

    fn wait_present_idle(&mut self) -> Result<()> {
        unsafe { self.device.raw().queue_wait_idle(self.device.present_queue()) }
            .check("vkQueueWaitIdle")
    }

    fn wait_device_idle(&mut self) -> Result<()> {
        self.device.wait_idle()
    }

    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<()> {
        let old_format = self.swapchain.format().format;
        self.swapchain.create(size, self.force_fifo)?;

        let new_format = self.swapchain.format().format;
        if new_format != old_format {
            info!("color format changed {:?} -> {:?}", old_format, new_format);
            self.render_pass = RenderPass::new(
                Arc::clone(&self.device),
                new_format,
                self.device.depth_format(),
            )?;
            let ctx =
                technique_context(&self.device, &self.render_pass, &self.swapchain, self.samples);
            self.technique.on_render_pass_changed(&ctx)?;
        }
        Ok(())
    }

    fn rebuild_depth_stencil(&mut self) -> Result<()> {
        self.framebuffers.rebuild_depth(self.swapchain.extent())
    }

    fn rebuild_framebuffers(&mut self) -> Result<()> {
        self.framebuffers
            .rebuild_framebuffers(&self.render_pass, &self.swapchain)
    }

    fn reallocate_command_buffers(&mut self) -> Result<()> {
        self.commands.reallocate(self.swapchain.image_count())
    }

    fn record_command_buffers(&mut self) -> Result<()> {
        self.record_all()
    }

    fn view_changed(&mut self) {
        let ctx = technique_context(&self.device, &self.render_pass, &self.swapchain, self.samples);
        self.technique.view_changed(&ctx);
    }
}

impl Drop for VkBackend {
    fn drop(&mut self) {
        // STRICT TEARDOWN: nothing below may be in use by the GPU when the
        // fields start dropping.
        if let Err(e) = self.device.wait_idle() {
            warn!("device wait idle on teardown: {e}");
        }
    }
}
