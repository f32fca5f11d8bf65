// SPDX-License-Identifier: CEPL-1.0
//! The frame loop: acquire, image fence wait, submit, present, advance.
//!
//! [`FrameDriver`] only talks to the GPU through [`FrameBackend`], so the
//! synchronization protocol and the resize sequence can be driven by a mock
//! in tests.

use ash::vk;
use prism_render::{FrameStatus, RenderSize, WindowSurface};
use tracing::{debug, info, warn};

use crate::{
    error::Result,
    sync::{FrameSlot, FrameSync},
};

/// Frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(u32),
    /// An image was acquired but the surface no longer matches exactly.
    Suboptimal(u32),
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

/// GPU operations the frame loop is built from.
pub trait FrameBackend {
    fn create_semaphore(&mut self) -> Result<vk::Semaphore>;
    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence>;
    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore);
    fn destroy_fence(&mut self, fence: vk::Fence);

    /// Images in the current swapchain.
    fn image_count(&self) -> usize;

    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<AcquireOutcome>;
    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()>;
    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()>;
    /// Command buffer to submit for `image_index`. Re-records it first when
    /// the technique records per frame.
    fn prepare_command_buffer(&mut self, image_index: u32) -> Result<vk::CommandBuffer>;
    fn submit(
        &mut self,
        command_buffer: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()>;
    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> Result<PresentOutcome>;
    fn wait_present_idle(&mut self) -> Result<()>;
    fn wait_device_idle(&mut self) -> Result<()>;

    // Recreation steps, called in this order with the device idle.
    fn recreate_swapchain(&mut self, size: RenderSize) -> Result<()>;
    fn rebuild_depth_stencil(&mut self) -> Result<()>;
    fn rebuild_framebuffers(&mut self) -> Result<()>;
    fn reallocate_command_buffers(&mut self) -> Result<()>;
    fn record_command_buffers(&mut self) -> Result<()>;
    fn view_changed(&mut self);
}

#[derive(Clone, Copy, Debug)]
pub struct DriverOptions {
    pub frames_in_flight: usize,
    /// Wait the present queue idle after every successful present.
    pub present_wait_idle: bool,
}

impl Default for DriverOptions {
    fn default() -> Self {
        DriverOptions {
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            present_wait_idle: false,
        }
    }
}

pub struct FrameDriver<B: FrameBackend> {
    backend: B,
    sync: FrameSync,
    options: DriverOptions,
    /// Slot whose image-available semaphore was left signaled by a
    /// suboptimal acquire that we abandoned.
    stale_semaphore: Option<usize>,
    frames_presented: u64,
    recreations: u64,
}

impl<B: FrameBackend> FrameDriver<B> {
    pub fn new(mut backend: B, options: DriverOptions) -> Result<Self> {
        let count = options.frames_in_flight.max(1);
        let mut slots = Vec::with_capacity(count);
        for _ in 0..count {
            match create_slot(&mut backend) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    for slot in slots {
                        destroy_slot(&mut backend, slot);
                    }
                    return Err(e);
                }
            }
        }
        let sync = FrameSync::new(slots, backend.image_count());
        debug!("frame driver: {} frames in flight", count);
        Ok(FrameDriver {
            backend,
            sync,
            options,
            stale_semaphore: None,
            frames_presented: 0,
            recreations: 0,
        })
    }

    /// Runs one tick of the frame loop.
    pub fn tick(&mut self, window: &mut dyn WindowSurface) -> Result<FrameStatus> {
        let slot = self.sync.current();

        // The slot's previous submission must retire before its semaphores are reused.
        self.backend.wait_for_fence(slot.in_flight)?;

        let image_index = match self.backend.acquire_next_image(slot.image_available)? {
            AcquireOutcome::Acquired(i) => i,
            AcquireOutcome::Suboptimal(_) => {
                debug!("acquire: suboptimal");
                self.stale_semaphore = Some(self.sync.current_index());
                return self.resize(window);
            }
            AcquireOutcome::OutOfDate => {
                debug!("acquire: out of date");
                return self.resize(window);
            }
        };

        // Another slot may still be rendering into this image.
        if let Some(owner) = self.sync.image_owner(image_index) {
            self.backend.wait_for_fence(owner)?;
        }
        self.sync.claim_image(image_index, slot.in_flight);

        let cmd = self.backend.prepare_command_buffer(image_index)?;
        self.backend.reset_fence(slot.in_flight)?;
        self.backend.submit(cmd, slot.image_available, slot.render_finished, slot.in_flight)?;

        let outcome = self.backend.present(image_index, slot.render_finished)?;
        let resized = window.take_resized();
        self.sync.advance();

        if outcome != PresentOutcome::Presented || resized {
            debug!("present: {:?}, resized={}", outcome, resized);
            if outcome == PresentOutcome::OutOfDate {
                return self.resize(window);
            }
            self.frames_presented += 1;
            return Ok(match self.resize(window)? {
                FrameStatus::Recreated { .. } => FrameStatus::Recreated {
                    presented: Some(image_index),
                },
                status => status,
            });
        }
        if self.options.present_wait_idle {
            self.backend.wait_present_idle()?;
        }
        self.frames_presented += 1;
        Ok(FrameStatus::Presented { image_index })
    }

    /// Rebuilds everything that depends on the swapchain.
    ///
    /// STRICT ORDER:
    /// 1) block while the window is zero-sized
    /// 2) device idle
    /// 3) swapchain, 4) depth, 5) framebuffers, 6) command buffers + record
    /// 7) device idle again, 8) view-changed hook
    /// Per-slot sync objects survive; only the image tracker is reset.
    pub fn resize(&mut self, window: &mut dyn WindowSurface) -> Result<FrameStatus> {
        let mut size = window.framebuffer_size();
        while size.is_empty() {
            if window.close_requested() {
                return Ok(FrameStatus::Closed);
            }
            window.wait_events();
            size = window.framebuffer_size();
        }
        info!("recreating swapchain for {}x{}", size.width, size.height);

        self.backend.wait_device_idle()?;

        self.backend.recreate_swapchain(size)?;
        self.backend.rebuild_depth_stencil()?;
        self.backend.rebuild_framebuffers()?;
        self.backend.reallocate_command_buffers()?;
        self.backend.record_command_buffers()?;

        self.backend.wait_device_idle()?;

        if let Some(slot) = self.stale_semaphore.take() {
            let fresh = self.backend.create_semaphore()?;
            let old = self.sync.replace_image_available(slot, fresh);
            self.backend.destroy_semaphore(old);
        }

        self.backend.view_changed();
        self.sync.reset_images(self.backend.image_count());
        // The size we just used is the newest one.
        window.take_resized();
        self.recreations += 1;
        Ok(FrameStatus::Recreated { presented: None })
    }

    pub fn wait_idle(&mut self) -> Result<()> {
        self.backend.wait_device_idle()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn sync(&self) -> &FrameSync {
        &self.sync
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn recreations(&self) -> u64 {
        self.recreations
    }
}

impl<B: FrameBackend> Drop for FrameDriver<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_device_idle() {
            warn!("wait idle before teardown failed: {e}");
        }
        for slot in self.sync.take_slots() {
            destroy_slot(&mut self.backend, slot);
        }
    }
}

fn create_slot<B: FrameBackend>(backend: &mut B) -> Result<FrameSlot> {
    let image_available = backend.create_semaphore()?;
    let render_finished = match backend.create_semaphore() {
        Ok(s) => s,
        Err(e) => {
            backend.destroy_semaphore(image_available);
            return Err(e);
        }
    };
    // Signaled so the first wait on a fresh slot returns immediately.
    let in_flight = match backend.create_fence(true) {
        Ok(f) => f,
        Err(e) => {
            backend.destroy_semaphore(image_available);
            backend.destroy_semaphore(render_finished);
            return Err(e);
        }
    };
    Ok(FrameSlot {
        image_available,
        render_finished,
        in_flight,
    })
}

fn destroy_slot<B: FrameBackend>(backend: &mut B, slot: FrameSlot) {
    backend.destroy_semaphore(slot.image_available);
    backend.destroy_semaphore(slot.render_finished);
    backend.destroy_fence(slot.in_flight);
}
