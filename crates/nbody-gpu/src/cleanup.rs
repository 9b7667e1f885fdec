//! Scope guards for multi-step resource creation.

/// RAII guard that undoes partially completed work on drop.
///
/// Cleanup actions run in reverse order of registration unless the guard is committed.
///
/// ```ignore
/// let mut rollback = Rollback::new();
/// let buffer = create_buffer()?;
/// rollback.push(move || destroy_buffer(buffer));
/// bind_memory(buffer)?; // an early return destroys the buffer
/// rollback.commit();
/// ```
#[must_use]
pub struct Rollback<'a> {
    actions: Vec<Box<dyn FnOnce() + 'a>>,
}

impl<'a> Rollback<'a> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Register an action to run if the guard is dropped uncommitted.
    pub fn push(&mut self, action: impl FnOnce() + 'a) {
        self.actions.push(Box::new(action));
    }

    /// Keep everything created so far.
    pub fn commit(mut self) {
        self.actions.clear();
    }
}

impl Default for Rollback<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        while let Some(action) = self.actions.pop() {
            action();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GpuError, Result};
    use crate::memory::find_memory_type_index;
    use ash::vk;
    use std::cell::RefCell;

    #[test]
    fn actions_run_in_reverse_order() {
        let log = RefCell::new(Vec::new());
        {
            let mut rollback = Rollback::new();
            rollback.push(|| log.borrow_mut().push("image"));
            rollback.push(|| log.borrow_mut().push("view"));
        }
        assert_eq!(*log.borrow(), ["view", "image"]);
    }

    #[test]
    fn commit_keeps_resources() {
        let log = RefCell::new(Vec::new());
        let mut rollback = Rollback::new();
        rollback.push(|| log.borrow_mut().push("buffer"));
        rollback.commit();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn missing_memory_type_destroys_the_handle() {
        let destroyed = RefCell::new(Vec::new());
        let memory = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 1,
            ..Default::default()
        };

        let create = || -> Result<u64> {
            let handle = 42;
            let mut rollback = Rollback::new();
            rollback.push(|| destroyed.borrow_mut().push(handle));

            find_memory_type_index(0b1, vk::MemoryPropertyFlags::HOST_VISIBLE, &memory).ok_or(
                GpuError::NoCompatibleMemoryType {
                    type_bits: 0b1,
                    properties: vk::MemoryPropertyFlags::HOST_VISIBLE,
                },
            )?;

            rollback.commit();
            Ok(handle)
        };

        assert!(matches!(
            create(),
            Err(GpuError::NoCompatibleMemoryType { .. })
        ));
        assert_eq!(*destroyed.borrow(), [42]);
    }
}
