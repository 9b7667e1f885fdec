//! Fences and semaphores coordinating the graphics and compute queues.
//!
//! A frame and a physics tick interlock as follows:
//!
//! ```text
//! physics: wait compute_step_1 ─ submit step 1 ─signal─▶ compute_step_1_done
//!          wait draw + transfer ─ submit step 2 (waits compute_step_1_done) ─▶ transfer
//! frame:   wait transfer ─ acquire ─▶ present_acquired
//!          post-present (waits present_acquired) ─▶ post_present_done
//!          graph (waits post_present_done) ─▶ draw_done, draw
//!          pre-present (waits draw_done) ─▶ pre_present_done ─ present
//! ```
//!
//! Step two copies into the draw buffer, so it may only run once the previous frame has
//! finished reading it (`draw`); a frame only reads it once the copy has finished
//! (`transfer`).

use ash::vk;
use nbody_gpu::sync::{create_fence, create_semaphore, reset_fence, wait_if_not_ready};
use nbody_gpu::{FenceTracker, Result};

/// Index of the fence guarding the graph submission.
pub const DRAW: usize = 0;
/// Index of the fence guarding integrator step two and the copy.
pub const TRANSFER: usize = 1;
/// Index of the fence guarding integrator step one.
pub const COMPUTE_STEP_1: usize = 2;

const FENCE_NAMES: [&str; 3] = ["draw", "transfer", "compute_step_1"];

/// Every fence and semaphore of the engine.
pub struct SyncObjects {
    fences: [vk::Fence; 3],
    tracker: FenceTracker,
    pub present_acquired: vk::Semaphore,
    pub post_present_done: vk::Semaphore,
    pub compute_step_1_done: vk::Semaphore,
    pub draw_done: vk::Semaphore,
    pub pre_present_done: vk::Semaphore,
}

impl SyncObjects {
    /// Create the fences signaled and the semaphores unsignaled.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device) -> Result<Self> {
        let fences = [
            create_fence(device, true)?,
            create_fence(device, true)?,
            create_fence(device, true)?,
        ];
        Ok(Self {
            fences,
            tracker: FenceTracker::new(&FENCE_NAMES),
            present_acquired: create_semaphore(device)?,
            post_present_done: create_semaphore(device)?,
            compute_step_1_done: create_semaphore(device)?,
            draw_done: create_semaphore(device)?,
            pre_present_done: create_semaphore(device)?,
        })
    }

    /// Block until fence `index` is signaled.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn wait(&mut self, device: &ash::Device, index: usize) -> Result<()> {
        wait_if_not_ready(device, self.fences[index], FENCE_NAMES[index])?;
        self.tracker.observe_signaled(index);
        Ok(())
    }

    /// Reset fence `index` and mark it as guarding the next submission.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn reset(&mut self, device: &ash::Device, index: usize) -> Result<vk::Fence> {
        self.tracker.reset(index)?;
        reset_fence(device, self.fences[index])?;
        self.tracker.submit(index)?;
        Ok(self.fences[index])
    }

    /// Every fence is signaled after a device-wide idle wait.
    pub fn observe_idle(&mut self) {
        self.tracker.observe_idle();
    }

    /// # Safety
    /// No submission may use the objects.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        for &fence in &self.fences {
            device.destroy_fence(fence, None);
        }
        for semaphore in [
            self.present_acquired,
            self.post_present_done,
            self.compute_step_1_done,
            self.draw_done,
            self.pre_present_done,
        ] {
            device.destroy_semaphore(semaphore, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nbody_gpu::FenceState;

    #[test]
    fn fence_indices_match_names() {
        assert_eq!(FENCE_NAMES[DRAW], "draw");
        assert_eq!(FENCE_NAMES[TRANSFER], "transfer");
        assert_eq!(FENCE_NAMES[COMPUTE_STEP_1], "compute_step_1");
    }

    /// Replays one physics tick and one frame on the host-side tracker.
    #[test]
    fn tick_and_frame_never_reset_a_pending_fence() {
        let mut tracker = FenceTracker::new(&FENCE_NAMES);

        // physics tick
        tracker.observe_signaled(COMPUTE_STEP_1);
        tracker.reset(COMPUTE_STEP_1).unwrap();
        tracker.submit(COMPUTE_STEP_1).unwrap();
        tracker.observe_signaled(DRAW);
        tracker.observe_signaled(TRANSFER);
        tracker.reset(TRANSFER).unwrap();
        tracker.submit(TRANSFER).unwrap();

        // frame: the draw fence is reset only after the transfer was observed
        assert_eq!(tracker.state(TRANSFER), FenceState::Pending);
        tracker.observe_signaled(TRANSFER);
        tracker.observe_signaled(DRAW);
        tracker.reset(DRAW).unwrap();
        tracker.submit(DRAW).unwrap();

        // the next tick must wait for the frame before resetting transfer again
        assert!(tracker.reset(DRAW).is_err());
        tracker.observe_idle();
        assert!((0..3).all(|i| tracker.state(i) == FenceState::Signaled));
    }
}
