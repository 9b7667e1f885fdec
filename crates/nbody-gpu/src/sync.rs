//! Synchronization primitives.

use crate::error::{GpuError, Result, VkCheck};
use ash::vk;
use nbody_core::constants::FENCE_TIMEOUT_NS;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    device
        .create_semaphore(&create_info, None)
        .checked("vkCreateSemaphore")
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    device
        .create_fence(&create_info, None)
        .checked("vkCreateFence")
}

/// Wait for a fence unless it is already signaled.
///
/// The wait is bounded by [`FENCE_TIMEOUT_NS`]; running into the timeout is an error.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn wait_if_not_ready(
    device: &ash::Device,
    fence: vk::Fence,
    name: &'static str,
) -> Result<()> {
    if device.get_fence_status(fence).checked("vkGetFenceStatus")? {
        return Ok(());
    }

    match device.wait_for_fences(&[fence], true, FENCE_TIMEOUT_NS) {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(GpuError::FenceTimeout {
            name,
            timeout_ms: FENCE_TIMEOUT_NS / 1_000_000,
        }),
        Err(result) => Err(result).checked("vkWaitForFences"),
    }
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(&[fence]).checked("vkResetFences")
}

/// Host-side view of one fence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceState {
    /// Signaled and observed by the host; may be reset.
    Signaled,
    /// Reset and not yet handed to a submission.
    Unsignaled,
    /// A submission that will signal the fence is outstanding.
    Pending,
}

/// Tracks what the host knows about a set of fences.
///
/// A fence may only be reset after the host saw it signaled, and may only guard one
/// submission at a time.
#[derive(Clone, Debug)]
pub struct FenceTracker {
    names: Vec<&'static str>,
    states: Vec<FenceState>,
}

impl FenceTracker {
    /// Track fences that were all created signaled.
    pub fn new(names: &[&'static str]) -> Self {
        Self {
            names: names.to_vec(),
            states: vec![FenceState::Signaled; names.len()],
        }
    }

    /// Current state of fence `index`.
    pub fn state(&self, index: usize) -> FenceState {
        self.states[index]
    }

    fn name(&self, index: usize) -> &'static str {
        self.names[index]
    }

    /// The host waited on the fence, or its status read as signaled.
    pub fn observe_signaled(&mut self, index: usize) {
        self.states[index] = FenceState::Signaled;
    }

    /// Record a reset; fails if the host has not seen the fence signaled.
    pub fn reset(&mut self, index: usize) -> Result<()> {
        match self.states[index] {
            FenceState::Signaled => {
                self.states[index] = FenceState::Unsignaled;
                Ok(())
            }
            state => Err(GpuError::InvalidState(format!(
                "fence {} reset while {state:?}",
                self.name(index)
            ))),
        }
    }

    /// Record a submission guarded by the fence; fails unless the fence was reset.
    pub fn submit(&mut self, index: usize) -> Result<()> {
        match self.states[index] {
            FenceState::Unsignaled => {
                self.states[index] = FenceState::Pending;
                Ok(())
            }
            state => Err(GpuError::InvalidState(format!(
                "fence {} guards a submission while {state:?}",
                self.name(index)
            ))),
        }
    }

    /// Every fence is known to be signaled, e.g. after a device idle wait.
    pub fn observe_idle(&mut self) {
        for state in &mut self.states {
            if *state == FenceState::Pending {
                *state = FenceState::Signaled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DRAW: usize = 0;
    const TRANSFER: usize = 1;

    #[test]
    fn fences_start_signaled() {
        let tracker = FenceTracker::new(&["draw", "transfer"]);
        assert_eq!(tracker.state(DRAW), FenceState::Signaled);
        assert_eq!(tracker.state(TRANSFER), FenceState::Signaled);
    }

    #[test]
    fn wait_reset_submit_cycle() {
        let mut tracker = FenceTracker::new(&["draw"]);
        for _ in 0..3 {
            tracker.reset(DRAW).unwrap();
            tracker.submit(DRAW).unwrap();
            assert_eq!(tracker.state(DRAW), FenceState::Pending);
            tracker.observe_signaled(DRAW);
        }
    }

    #[test]
    fn reset_while_pending_is_refused() {
        let mut tracker = FenceTracker::new(&["transfer"]);
        tracker.reset(0).unwrap();
        tracker.submit(0).unwrap();
        let err = tracker.reset(0).unwrap_err();
        assert!(err.to_string().contains("transfer"));
    }

    #[test]
    fn submit_without_reset_is_refused() {
        let mut tracker = FenceTracker::new(&["draw"]);
        assert!(tracker.submit(DRAW).is_err());
    }

    #[test]
    fn idle_releases_pending_fences() {
        let mut tracker = FenceTracker::new(&["draw", "transfer"]);
        tracker.reset(DRAW).unwrap();
        tracker.submit(DRAW).unwrap();
        tracker.reset(TRANSFER).unwrap();
        tracker.observe_idle();
        assert_eq!(tracker.state(DRAW), FenceState::Signaled);
        // reset but never submitted stays unsignaled
        assert_eq!(tracker.state(TRANSFER), FenceState::Unsignaled);
    }
}
