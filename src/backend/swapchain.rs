// Swapchain - Window presentation
//
// Negotiates image count, format, present mode and extent from the surface's
// capabilities, then creates the image chain the compute output is copied into.

use ash::extensions::khr;
use ash::vk;
use std::sync::Arc;
use super::VulkanDevice;
use crate::error::{InitError, RenderResult, ResourceError};

/// Format requested when the surface leaves the choice to us
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Surface capability query results
#[derive(Debug, Clone, Default)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(device: &VulkanDevice) -> Result<Self, InitError> {
        let loader = &device.surface_loader;
        let (physical_device, surface) = (device.physical_device, device.surface);

        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(InitError::vulkan("query surface capabilities"))?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(InitError::vulkan("query surface formats"))?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(InitError::vulkan("query present modes"))?,
            })
        }
    }
}

/// Parameters negotiated for a swapchain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainConfig {
    /// Derive every swapchain parameter from the surface's reported support
    pub fn negotiate(support: &SwapchainSupport, window_extent: vk::Extent2D) -> Result<Self, InitError> {
        let capabilities = &support.capabilities;

        // Compute output is copied into the images; storage usage is required by the pipeline contract
        if !capabilities
            .supported_usage_flags
            .contains(vk::ImageUsageFlags::STORAGE)
        {
            return Err(InitError::UnsupportedSwapchainUsage(
                capabilities.supported_usage_flags,
            ));
        }

        Ok(Self {
            surface_format: choose_surface_format(&support.formats).ok_or(InitError::NoSurfaceFormat)?,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(capabilities, window_extent),
            image_count: choose_image_count(capabilities),
            pre_transform: capabilities.current_transform,
        })
    }
}

/// Preferred BGRA/sRGB-nonlinear pair if available, otherwise the first listed format.
/// A single `UNDEFINED` entry means the surface accepts any format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return Some(PREFERRED_FORMAT);
        }
    }

    formats
        .iter()
        .find(|f| f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space)
        .or_else(|| formats.first())
        .copied()
}

// MAILBOX: No vsync, no tearing, triple buffered
// FIFO: Vsync enabled, guaranteed available
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: window.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: window.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One image more than the minimum, capped by the maximum (0 = no maximum)
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        image_count.min(capabilities.max_image_count)
    } else {
        image_count
    }
}

pub struct Swapchain {
    pub image_views: Vec<vk::ImageView>,
    pub images: Vec<vk::Image>,
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: khr::Swapchain,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    /// Create the image chain.
    ///
    /// `old_swapchain` may name a previous swapchain for the same surface, which
    /// lets the driver recycle its images; pass `vk::SwapchainKHR::null()` otherwise.
    pub fn new(
        device: Arc<VulkanDevice>,
        config: &SwapchainConfig,
        old_swapchain: vk::SwapchainKHR,
    ) -> RenderResult<Self> {
        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}, {:?}",
            config.extent.width,
            config.extent.height,
            config.image_count,
            config.surface_format.format,
            config.present_mode
        );

        let swapchain_loader = khr::Swapchain::new(&device.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(device.surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(config.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(InitError::vulkan("create swapchain"))?;

        // Get swapchain images
        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(result) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(InitError::vulkan("get swapchain images")(result).into());
            }
        };

        log::info!("Created swapchain with {} images", images.len());

        let mut swapchain = Self {
            image_views: Vec::with_capacity(images.len()),
            images,
            swapchain,
            swapchain_loader,
            format: config.surface_format.format,
            extent: config.extent,
            device,
        };

        // Views are pushed one by one so Drop cleans up a partially built chain
        for index in 0..swapchain.images.len() {
            let view = create_color_view(&swapchain.device, swapchain.images[index], swapchain.format)
                .map_err(|result| ResourceError::ImageCreation {
                    what: "swapchain image view",
                    result,
                })?;
            swapchain.image_views.push(view);
        }

        Ok(swapchain)
    }

    /// Acquire next image for rendering, blocking until one is available
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queue an image for presentation. `Ok(true)` means the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// 2D color view over the whole of a single-level image
pub fn create_color_view(
    device: &VulkanDevice,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView, vk::Result> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::R,
            g: vk::ComponentSwizzle::G,
            b: vk::ComponentSwizzle::B,
            a: vk::ComponentSwizzle::A,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.device.create_image_view(&create_info, None) }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            supported_usage_flags: vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    fn window(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn image_count_stays_within_bounds() {
        for (min, max) in [(1, 0), (2, 0), (2, 3), (2, 2), (3, 8), (1, 1)] {
            let count = choose_image_count(&capabilities(min, max));
            assert!(count >= min, "min={min} max={max} count={count}");
            if max > 0 {
                assert!(count <= max, "min={min} max={max} count={count}");
            }
        }
    }

    #[test]
    fn image_count_is_one_above_minimum_when_unbounded() {
        assert_eq!(choose_image_count(&capabilities(2, 0)), 3);
        assert_eq!(choose_image_count(&capabilities(2, 2)), 2);
    }

    #[test]
    fn mailbox_is_preferred() {
        let modes = [
            vk::PresentModeKHR::IMMEDIATE,
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn fifo_only_surface_gets_fifo() {
        assert_eq!(choose_present_mode(&[vk::PresentModeKHR::FIFO]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn present_mode_is_never_anything_but_mailbox_or_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn undefined_format_means_any_format() {
        let formats = [format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(choose_surface_format(&formats), Some(PREFERRED_FORMAT));
    }

    #[test]
    fn preferred_format_is_found_in_list() {
        let formats = [
            format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            PREFERRED_FORMAT,
        ];
        assert_eq!(choose_surface_format(&formats), Some(PREFERRED_FORMAT));
    }

    #[test]
    fn first_format_is_the_fallback() {
        let first = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        let formats = [
            first,
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];
        assert_eq!(choose_surface_format(&formats), Some(first));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn defined_current_extent_wins() {
        let mut caps = capabilities(2, 0);
        caps.current_extent = window(800, 600);
        assert_eq!(choose_extent(&caps, window(1000, 1000)), window(800, 600));
    }

    #[test]
    fn requested_extent_is_clamped() {
        let mut caps = capabilities(2, 0);
        caps.min_image_extent = window(100, 100);
        caps.max_image_extent = window(900, 2000);
        assert_eq!(choose_extent(&caps, window(1000, 50)), window(900, 100));
        assert_eq!(choose_extent(&caps, window(1000, 1000)), window(900, 1000));
    }

    #[test]
    fn negotiation_requires_storage_usage() {
        let mut support = SwapchainSupport {
            capabilities: capabilities(2, 3),
            formats: vec![PREFERRED_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        support.capabilities.supported_usage_flags = vk::ImageUsageFlags::COLOR_ATTACHMENT;

        let err = SwapchainConfig::negotiate(&support, window(1000, 1000)).unwrap_err();
        assert!(matches!(err, InitError::UnsupportedSwapchainUsage(_)));
    }

    #[test]
    fn negotiation_combines_all_choices() {
        let support = SwapchainSupport {
            capabilities: capabilities(2, 3),
            formats: vec![PREFERRED_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };

        let config = SwapchainConfig::negotiate(&support, window(1000, 1000)).unwrap();
        assert_eq!(config.surface_format, PREFERRED_FORMAT);
        assert_eq!(config.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.extent, window(1000, 1000));
        assert_eq!(config.image_count, 3);
    }

    #[test]
    fn negotiation_fails_without_formats() {
        let support = SwapchainSupport {
            capabilities: capabilities(2, 3),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let err = SwapchainConfig::negotiate(&support, window(1000, 1000)).unwrap_err();
        assert!(matches!(err, InitError::NoSurfaceFormat));
    }
}
