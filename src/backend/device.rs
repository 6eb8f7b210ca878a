// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with optional validation layers
// - Window surface creation
// - Physical device selection (compute + present + VK_KHR_swapchain)
// - Logical device + present/compute queue creation

use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;
use super::selector::{self, DeviceCandidate, QueueFamilyIndices, QueueFamilyInfo};
use crate::error::{InitError, RenderResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Device extensions every candidate must expose
pub fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Vulkan device wrapper with automatic cleanup.
///
/// Owns the instance, the surface and the logical device. Everything created
/// from it holds an `Arc<VulkanDevice>` and is released first.
pub struct VulkanDevice {
    // Vulkan handles
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    _entry: Entry,

    // Presentation target
    pub surface: vk::SurfaceKHR,
    pub surface_loader: khr::Surface,

    // Queue handles (may refer to the same queue)
    pub queue_families: QueueFamilyIndices,
    pub present_queue: vk::Queue,
    pub compute_queue: vk::Queue,

    // Debug utils (if validation enabled)
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    // Memory heaps and types, scanned by the allocator
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    /// Create the Vulkan device for a window
    ///
    /// # Arguments
    /// * `window` - Window to present into
    /// * `app_name` - Application name for debugging
    /// * `enable_validation` - Enable Vulkan validation layers
    pub fn new<W>(window: &W, app_name: &str, enable_validation: bool) -> RenderResult<Arc<Self>>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        log::info!("Creating Vulkan device: {}", app_name);

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }.map_err(InitError::from)?;

        // Step 2: Create instance
        let instance = Self::create_instance(&entry, window, app_name, enable_validation)?;

        // Step 3: Setup debug messenger if validation enabled
        let debug_utils = if enable_validation {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        // Step 4: Create surface
        let surface_loader = khr::Surface::new(&entry, &instance);
        let surface = unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        };

        let surface = match surface {
            Ok(surface) => surface,
            Err(result) => {
                Self::destroy_instance(&instance, debug_utils.as_ref());
                return Err(InitError::vulkan("create window surface")(result).into());
            }
        };

        // Steps 5-6: Pick the GPU, then create the logical device and queues
        let picked = Self::pick_physical_device(&instance, &surface_loader, surface).and_then(
            |(physical_device, queue_families)| {
                let (device, present_queue, compute_queue) = Self::create_logical_device(
                    &instance,
                    physical_device,
                    queue_families,
                )?;
                Ok((physical_device, queue_families, device, present_queue, compute_queue))
            },
        );

        let (physical_device, queue_families, device, present_queue, compute_queue) = match picked {
            Ok(picked) => picked,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                Self::destroy_instance(&instance, debug_utils.as_ref());
                return Err(e.into());
            }
        };

        // Step 7: Report the GPU and cache its memory layout
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        log::info!("Selected GPU: {}", device_name(&properties));
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "Queue families: present={}, compute={}",
            queue_families.present,
            queue_families.compute
        );

        Ok(Arc::new(Self {
            device,
            physical_device,
            instance,
            _entry: entry,
            surface,
            surface_loader,
            queue_families,
            present_queue,
            compute_queue,
            debug_utils,
            memory_properties,
        }))
    }

    fn create_instance<W: HasRawDisplayHandle>(
        entry: &Entry,
        window: &W,
        app_name: &str,
        enable_validation: bool,
    ) -> Result<ash::Instance, InitError> {
        let app_name_cstr = CString::new(app_name).unwrap_or_else(|_| c"raytracer".to_owned());
        let engine_name = c"Compute Ray Tracer";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        // Platform-specific surface extensions
        let mut extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())
            .map_err(InitError::vulkan("enumerate surface extensions"))?
            .to_vec();

        // Validation layers
        let layer_names = if enable_validation {
            Self::check_validation_layer(entry)?;
            extensions.push(DebugUtils::name().as_ptr());
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(InitError::vulkan("create Vulkan instance"))?;

        Ok(instance)
    }

    fn check_validation_layer(entry: &Entry) -> Result<(), InitError> {
        #[allow(unused_unsafe)]
        let layers = unsafe { entry.enumerate_instance_layer_properties() }
            .map_err(InitError::vulkan("enumerate instance layers"))?;

        let found = layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);

        if found {
            Ok(())
        } else {
            Err(InitError::MissingValidationLayer(
                VALIDATION_LAYER.to_string_lossy().into_owned(),
            ))
        }
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT), InitError> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(InitError::vulkan("create debug messenger"))?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices), InitError> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(InitError::vulkan("enumerate physical devices"))?;

        let candidates = devices
            .iter()
            .map(|&device| Self::describe_device(instance, surface_loader, surface, device))
            .collect::<Result<Vec<_>, _>>()?;

        let (index, families) =
            selector::select_device(&candidates, &required_device_extensions())?;

        Ok((devices[index], families))
    }

    /// Snapshot the capabilities the selector cares about
    fn describe_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> Result<DeviceCandidate, InitError> {
        let properties = unsafe { instance.get_physical_device_properties(device) };

        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) }
            .iter()
            .enumerate()
            .map(|(index, family)| {
                let present_support = unsafe {
                    surface_loader.get_physical_device_surface_support(device, index as u32, surface)
                }
                .unwrap_or(false);

                QueueFamilyInfo {
                    flags: family.queue_flags,
                    queue_count: family.queue_count,
                    present_support,
                }
            })
            .collect();

        let name = device_name(&properties);
        let extensions = extension_names(
            &name,
            unsafe { instance.enumerate_device_extension_properties(device) },
        );

        let surface_format_count =
            unsafe { surface_loader.get_physical_device_surface_formats(device, surface) }
                .map(|formats| formats.len())
                .unwrap_or(0);

        let present_mode_count =
            unsafe { surface_loader.get_physical_device_surface_present_modes(device, surface) }
                .map(|modes| modes.len())
                .unwrap_or(0);

        Ok(DeviceCandidate {
            name,
            queue_families,
            extensions,
            surface_format_count,
            present_mode_count,
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilyIndices,
    ) -> Result<(ash::Device, vk::Queue, vk::Queue), InitError> {
        // One queue per unique family
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<_> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        // Enable everything the device supports
        let features = unsafe { instance.get_physical_device_features(physical_device) };

        let extensions: Vec<_> = required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect();

        // Validation is enabled on the instance; device layers are ignored by the loader
        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .map_err(InitError::vulkan("create logical device"))?;

        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };
        let compute_queue = unsafe { device.get_device_queue(queue_families.compute, 0) };

        Ok((device, present_queue, compute_queue))
    }

    fn destroy_instance(
        instance: &ash::Instance,
        debug_utils: Option<&(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    ) {
        unsafe {
            if let Some((debug_utils, messenger)) = debug_utils {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }
            instance.destroy_instance(None);
        }
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }
            .map_err(crate::error::RenderError::submission("wait for device idle"))
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        // Wait for device to finish
        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
        Self::destroy_instance(&self.instance, self.debug_utils.as_ref());
    }
}

/// Extension names a device advertises. A device whose list cannot be read
/// advertises nothing, so the selector passes over it.
fn extension_names(
    device: &str,
    properties: Result<Vec<vk::ExtensionProperties>, vk::Result>,
) -> Vec<CString> {
    match properties {
        Ok(properties) => properties
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_owned())
            .collect(),
        Err(result) => {
            log::warn!("{}: failed to enumerate device extensions: {}", device, result);
            Vec::new()
        }
    }
}

fn device_name(properties: &vk::PhysicalDeviceProperties) -> String {
    unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extension(name: &CStr) -> vk::ExtensionProperties {
        let mut properties = vk::ExtensionProperties::default();
        for (dst, &src) in properties.extension_name.iter_mut().zip(name.to_bytes()) {
            *dst = src as std::ffi::c_char;
        }
        properties
    }

    #[test]
    fn reads_advertised_extension_names() {
        let advertised = vec![extension(c"VK_KHR_swapchain"), extension(c"VK_KHR_maintenance1")];
        let names = extension_names("gpu", Ok(advertised));
        assert_eq!(
            names,
            vec![c"VK_KHR_swapchain".to_owned(), c"VK_KHR_maintenance1".to_owned()]
        );
    }

    #[test]
    fn unreadable_extension_list_disqualifies_only_that_device() {
        let broken = DeviceCandidate {
            name: "broken".to_string(),
            queue_families: vec![QueueFamilyInfo {
                flags: vk::QueueFlags::COMPUTE,
                queue_count: 1,
                present_support: true,
            }],
            extensions: extension_names("broken", Err(vk::Result::ERROR_INITIALIZATION_FAILED)),
            surface_format_count: 1,
            present_mode_count: 1,
        };
        assert!(broken.extensions.is_empty());

        let healthy = DeviceCandidate {
            name: "healthy".to_string(),
            extensions: extension_names("healthy", Ok(vec![extension(c"VK_KHR_swapchain")])),
            ..broken.clone()
        };

        let required = required_device_extensions();
        let (index, _) = selector::select_device(&[broken, healthy], &required).unwrap();
        assert_eq!(index, 1);
    }
}
