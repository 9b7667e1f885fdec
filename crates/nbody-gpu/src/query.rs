//! Timestamp query pools.

use crate::error::{Result, VkCheck};
use ash::vk;

/// A pool of timestamp queries.
pub struct TimestampPool {
    pool: vk::QueryPool,
    count: u32,
}

impl TimestampPool {
    /// Create a pool with `count` timestamp queries.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(device: &ash::Device, count: u32) -> Result<Self> {
        let info = vk::QueryPoolCreateInfo::default()
            .query_type(vk::QueryType::TIMESTAMP)
            .query_count(count);
        let pool = device
            .create_query_pool(&info, None)
            .checked("vkCreateQueryPool")?;
        Ok(Self { pool, count })
    }

    /// Number of queries in the pool.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Record a reset of the queries `first..first + count`.
    ///
    /// # Safety
    /// The command buffer must be recording outside a render pass.
    pub unsafe fn cmd_reset(&self, device: &ash::Device, cmd: vk::CommandBuffer, first: u32, count: u32) {
        device.cmd_reset_query_pool(cmd, self.pool, first, count);
    }

    /// Record a timestamp write into query `index`.
    ///
    /// # Safety
    /// The command buffer must be recording.
    pub unsafe fn cmd_write(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        stage: vk::PipelineStageFlags,
        index: u32,
    ) {
        device.cmd_write_timestamp(cmd, stage, self.pool, index);
    }

    /// Read `out.len()` results starting at `first` without waiting.
    ///
    /// Returns `false` when any of the results is not available yet.
    ///
    /// # Safety
    /// The device must be valid.
    pub unsafe fn read(&self, device: &ash::Device, first: u32, out: &mut [u64]) -> Result<bool> {
        match device.get_query_pool_results(self.pool, first, out, vk::QueryResultFlags::TYPE_64) {
            Ok(()) => Ok(true),
            Err(vk::Result::NOT_READY) => Ok(false),
            Err(e) => Err(e).checked("vkGetQueryPoolResults"),
        }
    }

    /// Destroy the pool.
    ///
    /// # Safety
    /// No submitted command buffer may reference the pool.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_query_pool(self.pool, None);
    }
}
