// Command pool and buffers on the compute queue family

use ash::vk;
use std::sync::Arc;
use super::handle::Scoped;
use super::VulkanDevice;
use crate::error::ResourceError;

pub struct CommandPool {
    pool: Scoped<vk::CommandPool>,
    device: Arc<VulkanDevice>,
}

impl CommandPool {
    /// Pool whose buffers can be reset and re-recorded individually
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self, ResourceError> {
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(device.queue_families.compute)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.device.create_command_pool(&pool_info, None) }
            .map_err(|result| ResourceError::CommandAllocation {
                what: "command pool",
                result,
            })?;

        Ok(Self {
            pool: Scoped::new(device, pool),
            device: device.clone(),
        })
    }

    /// Primary buffers, freed together with the pool
    pub fn allocate(&self, count: u32) -> Result<Vec<vk::CommandBuffer>, ResourceError> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.pool.raw())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe { self.device.device.allocate_command_buffers(&alloc_info) }.map_err(|result| {
            ResourceError::CommandAllocation {
                what: "command buffers",
                result,
            }
        })
    }
}
