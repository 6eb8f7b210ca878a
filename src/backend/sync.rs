// Synchronization primitives
//
// One set per frame in flight: the acquire semaphore, the compute-done
// semaphore the presentation engine waits on, and the CPU-side fence.

use ash::vk;
use std::sync::Arc;
use super::handle::Scoped;
use super::VulkanDevice;
use crate::error::{RenderError, RenderResult};

/// Frame synchronization - one per frame in flight
pub struct FrameSync {
    pub image_available: Scoped<vk::Semaphore>,
    pub render_finished: Scoped<vk::Semaphore>,
    pub in_flight: Scoped<vk::Fence>,
}

impl FrameSync {
    pub fn new(device: &Arc<VulkanDevice>) -> RenderResult<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Signaled so the first wait returns immediately
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let create_semaphore = |what| {
            unsafe { device.device.create_semaphore(&semaphore_info, None) }
                .map(|raw| Scoped::new(device, raw))
                .map_err(RenderError::sync_primitive(what))
        };

        let image_available = create_semaphore("image-available semaphore")?;
        let render_finished = create_semaphore("render-finished semaphore")?;
        let in_flight = unsafe { device.device.create_fence(&fence_info, None) }
            .map(|raw| Scoped::new(device, raw))
            .map_err(RenderError::sync_primitive("in-flight fence"))?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}
