// SPDX-License-Identifier: CEPL-1.0
//! Frame-in-flight bookkeeping.
//!
//! Slots rotate round-robin per presented frame and are independent of the
//! swapchain's image indices. The per-image table remembers which slot fence
//! last claimed each image, because acquire may return images out of order.

use ash::vk;

/// Sync objects for one frame in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSlot {
    /// Signaled by acquire, waited by submit.
    pub image_available: vk::Semaphore,
    /// Signaled by submit, waited by present.
    pub render_finished: vk::Semaphore,
    /// Signaled when this slot's submission retires. Created signaled.
    pub in_flight: vk::Fence,
}

#[derive(Debug)]
pub struct FrameSync {
    slots: Vec<FrameSlot>,
    images_in_flight: Vec<Option<vk::Fence>>,
    current: usize,
}

impl FrameSync {
    pub fn new(slots: Vec<FrameSlot>, image_count: usize) -> Self {
        assert!(!slots.is_empty(), "at least one frame in flight");
        FrameSync {
            slots,
            images_in_flight: vec![None; image_count],
            current: 0,
        }
    }

    pub fn current(&self) -> FrameSlot {
        self.slots[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[FrameSlot] {
        &self.slots
    }

    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    /// Fence of the frame that last submitted against `image_index`.
    pub fn image_owner(&self, image_index: u32) -> Option<vk::Fence> {
        self.images_in_flight[image_index as usize]
    }

    /// Hands `image_index` to `fence`; the previous owner must have been waited on.
    pub fn claim_image(&mut self, image_index: u32, fence: vk::Fence) {
        self.images_in_flight[image_index as usize] = Some(fence);
    }

    /// Resizes the tracker for a new swapchain, every image unowned.
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }

    /// Swaps in a new image-available semaphore for `slot`, returning the old one.
    pub fn replace_image_available(&mut self, slot: usize, semaphore: vk::Semaphore) -> vk::Semaphore {
        std::mem::replace(&mut self.slots[slot].image_available, semaphore)
    }

    /// Removes every slot for destruction.
    pub fn take_slots(&mut self) -> Vec<FrameSlot> {
        self.images_in_flight.clear();
        self.current = 0;
        std::mem::take(&mut self.slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn slot(n: u64) -> FrameSlot {
        FrameSlot {
            image_available: vk::Semaphore::from_raw(n * 10 + 1),
            render_finished: vk::Semaphore::from_raw(n * 10 + 2),
            in_flight: vk::Fence::from_raw(n * 10 + 3),
        }
    }

    #[test]
    fn slots_rotate_round_robin() {
        let mut sync = FrameSync::new(vec![slot(0), slot(1)], 3);
        assert_eq!(sync.current(), slot(0));
        sync.advance();
        assert_eq!(sync.current(), slot(1));
        sync.advance();
        assert_eq!(sync.current_index(), 0);
    }

    #[test]
    fn images_start_unowned_and_track_claims() {
        let mut sync = FrameSync::new(vec![slot(0), slot(1)], 3);
        assert!((0..3).all(|i| sync.image_owner(i).is_none()));

        sync.claim_image(2, slot(1).in_flight);
        assert_eq!(sync.image_owner(2), Some(slot(1).in_flight));

        sync.claim_image(2, slot(0).in_flight);
        assert_eq!(sync.image_owner(2), Some(slot(0).in_flight));
    }

    #[test]
    fn reset_resizes_and_clears_owners() {
        let mut sync = FrameSync::new(vec![slot(0), slot(1)], 3);
        sync.claim_image(0, slot(0).in_flight);
        sync.reset_images(4);
        assert_eq!(sync.image_count(), 4);
        assert!((0..4).all(|i| sync.image_owner(i).is_none()));
        assert_eq!(sync.slot_count(), 2);
    }

    #[test]
    fn replacing_semaphore_keeps_other_objects() {
        let mut sync = FrameSync::new(vec![slot(0), slot(1)], 2);
        let fresh = vk::Semaphore::from_raw(999);
        let old = sync.replace_image_available(1, fresh);
        assert_eq!(old, slot(1).image_available);
        assert_eq!(sync.slots()[1].image_available, fresh);
        assert_eq!(sync.slots()[1].in_flight, slot(1).in_flight);
    }

    #[test]
    fn take_slots_empties() {
        let mut sync = FrameSync::new(vec![slot(0), slot(1)], 2);
        assert_eq!(sync.take_slots().len(), 2);
        assert_eq!(sync.slot_count(), 0);
        assert_eq!(sync.image_count(), 0);
    }
}
