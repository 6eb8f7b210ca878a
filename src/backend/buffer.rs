// Buffer and image allocation for the compute pass
//
// Scene and uniform data live in host-visible buffers written through mapped
// memory; the compute target is a device-local storage image.

use ash::vk;
use std::sync::Arc;
use super::handle::Scoped;
use super::swapchain::create_color_view;
use super::VulkanDevice;
use crate::error::ResourceError;

/// Lowest-index memory type allowed by `type_bits` whose flags contain `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = memory_properties.memory_type_count as usize;

    memory_properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(i, memory_type)| {
            let has_type = (type_bits & (1 << i)) != 0;
            has_type && memory_type.property_flags.contains(properties)
        })
        .map(|(i, _)| i as u32)
}

/// Copy `data` to the start of a mapped region
pub fn upload(mapped: &mut [u8], data: &[u8]) -> Result<(), ResourceError> {
    let capacity = mapped.len();
    let region = mapped
        .get_mut(..data.len())
        .ok_or(ResourceError::WriteOutOfBounds {
            len: data.len(),
            capacity,
        })?;

    region.copy_from_slice(data);
    Ok(())
}

fn allocate_memory(
    device: &Arc<VulkanDevice>,
    requirements: vk::MemoryRequirements,
    properties: vk::MemoryPropertyFlags,
    what: &'static str,
) -> Result<Scoped<vk::DeviceMemory>, ResourceError> {
    let memory_type_index = find_memory_type(
        &device.memory_properties,
        requirements.memory_type_bits,
        properties,
    )
    .ok_or(ResourceError::NoCompatibleMemoryType {
        type_bits: requirements.memory_type_bits,
        flags: properties,
    })?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe { device.device.allocate_memory(&alloc_info, None) }
        .map_err(|result| ResourceError::MemoryAllocation { what, result })?;

    log::debug!(
        "Allocated {} bytes for {} from memory type {}",
        requirements.size,
        what,
        memory_type_index
    );

    Ok(Scoped::new(device, memory))
}

/// A buffer and its dedicated memory allocation
pub struct GpuBuffer {
    buffer: Scoped<vk::Buffer>,
    memory: Scoped<vk::DeviceMemory>,
    size: vk::DeviceSize,
    allocation_size: vk::DeviceSize,
    device: Arc<VulkanDevice>,
}

impl GpuBuffer {
    /// Create a buffer, back it with memory of the requested properties and
    /// optionally fill it with `data` (which requires host-visible memory).
    pub fn new(
        device: &Arc<VulkanDevice>,
        what: &'static str,
        data: Option<&[u8]>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self, ResourceError> {
        if size == 0 {
            return Err(ResourceError::EmptyBuffer(what));
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
            .map_err(|result| ResourceError::BufferCreation { what, result })?;
        let buffer = Scoped::new(device, buffer);

        let requirements = unsafe { device.device.get_buffer_memory_requirements(buffer.raw()) };
        let memory = allocate_memory(device, requirements, properties, what)?;

        let gpu_buffer = Self {
            buffer,
            memory,
            size,
            allocation_size: requirements.size,
            device: device.clone(),
        };

        if let Some(data) = data {
            gpu_buffer.write(&data[..data.len().min(size as usize)])?;
        }

        unsafe {
            device
                .device
                .bind_buffer_memory(gpu_buffer.buffer.raw(), gpu_buffer.memory.raw(), 0)
        }
        .map_err(|result| ResourceError::MemoryBind { what, result })?;

        log::info!("Created {} buffer ({} bytes)", what, size);
        Ok(gpu_buffer)
    }

    /// Host-visible, coherent buffer initialised with `data`
    pub fn with_data(
        device: &Arc<VulkanDevice>,
        what: &'static str,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> Result<Self, ResourceError> {
        Self::new(
            device,
            what,
            Some(data),
            data.len() as vk::DeviceSize,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Map the whole allocation, copy `data` to its start, unmap
    pub fn write(&self, data: &[u8]) -> Result<(), ResourceError> {
        if data.len() as vk::DeviceSize > self.size {
            return Err(ResourceError::WriteOutOfBounds {
                len: data.len(),
                capacity: self.size as usize,
            });
        }

        let memory = self.memory.raw();
        unsafe {
            let ptr = self
                .device
                .device
                .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
                .map_err(ResourceError::MemoryMap)?;

            let mapped = std::slice::from_raw_parts_mut(ptr.cast::<u8>(), self.allocation_size as usize);
            let result = upload(mapped, data);

            self.device.device.unmap_memory(memory);
            result
        }
    }

    pub fn raw(&self) -> vk::Buffer {
        self.buffer.raw()
    }
}

/// Device-local storage image the compute shader renders into
pub struct ComputeTarget {
    view: Scoped<vk::ImageView>,
    image: Scoped<vk::Image>,
    _memory: Scoped<vk::DeviceMemory>,
}

impl ComputeTarget {
    pub fn new(
        device: &Arc<VulkanDevice>,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self, ResourceError> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::TRANSFER_SRC)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .map_err(|result| ResourceError::ImageCreation {
                what: "compute image",
                result,
            })?;
        let image = Scoped::new(device, image);

        let requirements = unsafe { device.device.get_image_memory_requirements(image.raw()) };
        let memory = allocate_memory(
            device,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            "compute image",
        )?;

        unsafe { device.device.bind_image_memory(image.raw(), memory.raw(), 0) }
            .map_err(|result| ResourceError::MemoryBind {
                what: "compute image",
                result,
            })?;

        let view = create_color_view(device, image.raw(), format).map_err(|result| {
            ResourceError::ImageCreation {
                what: "compute image view",
                result,
            }
        })?;

        log::info!(
            "Created compute target: {}x{} {:?}",
            extent.width,
            extent.height,
            format
        );

        Ok(Self {
            view: Scoped::new(device, view),
            image,
            _memory: memory,
        })
    }

    pub fn image(&self) -> vk::Image {
        self.image.raw()
    }

    pub fn view(&self) -> vk::ImageView {
        self.view.raw()
    }
}
