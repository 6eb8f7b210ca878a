// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Selection, negotiation and frame ordering are
// plain functions over snapshots so they can be tested without a driver.

pub mod buffer;
pub mod command;
pub mod device;
pub mod frame;
pub mod handle;
pub mod pipeline;
pub mod selector;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use swapchain::Swapchain;
