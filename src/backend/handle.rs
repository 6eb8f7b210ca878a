// Scoped ownership of Vulkan handles
//
// Each `Scoped<T>` keeps the device alive and destroys its handle on drop.
// Owners declare their `Scoped` fields in reverse creation order so Rust's
// field drop order tears resources down before the things they depend on.

use ash::vk;
use std::sync::Arc;
use super::VulkanDevice;

/// A device-owned Vulkan object that knows how to destroy itself.
pub trait DeviceObject: Copy {
    /// # Safety
    /// The handle must have been created from `device` and must no longer be in use by the GPU.
    unsafe fn destroy(self, device: &ash::Device);
}

macro_rules! device_object {
    ($($ty:ty => $destroy:ident),* $(,)?) => {
        $(
            impl DeviceObject for $ty {
                unsafe fn destroy(self, device: &ash::Device) {
                    device.$destroy(self, None);
                }
            }
        )*
    };
}

device_object! {
    vk::Buffer => destroy_buffer,
    vk::Image => destroy_image,
    vk::ImageView => destroy_image_view,
    vk::DeviceMemory => free_memory,
    vk::ShaderModule => destroy_shader_module,
    vk::DescriptorSetLayout => destroy_descriptor_set_layout,
    vk::DescriptorPool => destroy_descriptor_pool,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::Pipeline => destroy_pipeline,
    vk::CommandPool => destroy_command_pool,
    vk::Fence => destroy_fence,
    vk::Semaphore => destroy_semaphore,
}

/// Owning wrapper around a raw handle, released when dropped.
pub struct Scoped<T: DeviceObject> {
    raw: T,
    device: Arc<VulkanDevice>,
}

impl<T: DeviceObject> Scoped<T> {
    /// Take ownership of `raw`, which must have been created from `device`.
    pub fn new(device: &Arc<VulkanDevice>, raw: T) -> Self {
        Self {
            raw,
            device: device.clone(),
        }
    }

    pub fn raw(&self) -> T {
        self.raw
    }
}

impl<T: DeviceObject> Drop for Scoped<T> {
    fn drop(&mut self) {
        log::trace!("Destroying {}", std::any::type_name::<T>());
        unsafe { self.raw.destroy(&self.device.device) };
    }
}
