// Compute pipeline and descriptor set
//
// Binding layout shared with shaders/raytrace.comp:
//   0: storage image   - render target
//   1: storage buffer  - spheres
//   2: storage buffer  - planes
//   3: uniform buffer  - per-frame parameters

use ash::vk;
use std::sync::Arc;
use super::handle::Scoped;
use super::shader::create_shader_module;
use super::VulkanDevice;
use crate::error::ResourceError;

pub const OUTPUT_IMAGE_BINDING: u32 = 0;
pub const SPHERE_BUFFER_BINDING: u32 = 1;
pub const PLANE_BUFFER_BINDING: u32 = 2;
pub const UNIFORM_BUFFER_BINDING: u32 = 3;

const ENTRY_POINT: &std::ffi::CStr = c"main";

fn compute_binding(binding: u32, descriptor_type: vk::DescriptorType) -> vk::DescriptorSetLayoutBinding {
    vk::DescriptorSetLayoutBinding::builder()
        .binding(binding)
        .descriptor_type(descriptor_type)
        .descriptor_count(1)
        .stage_flags(vk::ShaderStageFlags::COMPUTE)
        .build()
}

/// Layout bindings for the single descriptor set, visible to the compute stage only
pub fn descriptor_bindings() -> [vk::DescriptorSetLayoutBinding; 4] {
    [
        compute_binding(OUTPUT_IMAGE_BINDING, vk::DescriptorType::STORAGE_IMAGE),
        compute_binding(SPHERE_BUFFER_BINDING, vk::DescriptorType::STORAGE_BUFFER),
        compute_binding(PLANE_BUFFER_BINDING, vk::DescriptorType::STORAGE_BUFFER),
        compute_binding(UNIFORM_BUFFER_BINDING, vk::DescriptorType::UNIFORM_BUFFER),
    ]
}

/// Pool capacity. One set is ever allocated; the storage image count leaves headroom.
pub fn descriptor_pool_sizes() -> [vk::DescriptorPoolSize; 3] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_IMAGE,
            descriptor_count: 3,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_BUFFER,
            descriptor_count: 2,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
        },
    ]
}

/// Resources bound into the descriptor set
#[derive(Debug, Clone, Copy)]
pub struct DescriptorResources {
    pub output_view: vk::ImageView,
    pub spheres: vk::Buffer,
    pub planes: vk::Buffer,
    pub uniform: vk::Buffer,
}

/// The ray tracing pipeline with its layout and bound descriptor set.
pub struct ComputePipeline {
    pipeline: Scoped<vk::Pipeline>,
    layout: Scoped<vk::PipelineLayout>,
    // Freeing the pool releases the set
    _descriptor_pool: Scoped<vk::DescriptorPool>,
    _set_layout: Scoped<vk::DescriptorSetLayout>,
    descriptor_set: vk::DescriptorSet,
}

impl ComputePipeline {
    pub fn new(
        device: &Arc<VulkanDevice>,
        shader_code: &[u32],
        resources: &DescriptorResources,
    ) -> Result<Self, ResourceError> {
        let bindings = descriptor_bindings();
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        let set_layout = unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(ResourceError::pipeline("descriptor set layout"))?;
        let set_layout = Scoped::new(device, set_layout);

        let set_layouts = [set_layout.raw()];
        let pipeline_layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe { device.device.create_pipeline_layout(&pipeline_layout_info, None) }
            .map_err(ResourceError::pipeline("pipeline layout"))?;
        let layout = Scoped::new(device, layout);

        // Dropped at the end of this function, once the pipeline exists
        let shader = create_shader_module(device, shader_code)?;

        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader.raw())
            .name(ENTRY_POINT)
            .build();

        let pipeline_info = vk::ComputePipelineCreateInfo::builder()
            .stage(stage)
            .layout(layout.raw())
            .build();

        let pipelines = unsafe {
            device
                .device
                .create_compute_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        }
        .map_err(|(_, result)| ResourceError::PipelineCreation {
            what: "compute pipeline",
            result,
        })?;
        let pipeline = Scoped::new(device, pipelines[0]);

        let pool_sizes = descriptor_pool_sizes();
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let descriptor_pool = unsafe { device.device.create_descriptor_pool(&pool_info, None) }
            .map_err(ResourceError::pipeline("descriptor pool"))?;
        let descriptor_pool = Scoped::new(device, descriptor_pool);

        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(descriptor_pool.raw())
            .set_layouts(&set_layouts);
        let descriptor_set = unsafe { device.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(ResourceError::pipeline("descriptor set"))?[0];

        write_descriptors(device, descriptor_set, resources);
        log::info!("Compute pipeline created");

        Ok(Self {
            pipeline,
            layout,
            _descriptor_pool: descriptor_pool,
            _set_layout: set_layout,
            descriptor_set,
        })
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.raw()
    }

    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.raw()
    }

    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}

fn write_descriptors(device: &VulkanDevice, set: vk::DescriptorSet, resources: &DescriptorResources) {
    let image_info = [vk::DescriptorImageInfo {
        sampler: vk::Sampler::null(),
        image_view: resources.output_view,
        image_layout: vk::ImageLayout::GENERAL,
    }];
    let whole = |buffer| {
        [vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range: vk::WHOLE_SIZE,
        }]
    };
    let sphere_info = whole(resources.spheres);
    let plane_info = whole(resources.planes);
    let uniform_info = whole(resources.uniform);

    let write = |binding, ty| {
        vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(ty)
    };

    let writes = [
        write(OUTPUT_IMAGE_BINDING, vk::DescriptorType::STORAGE_IMAGE)
            .image_info(&image_info)
            .build(),
        write(SPHERE_BUFFER_BINDING, vk::DescriptorType::STORAGE_BUFFER)
            .buffer_info(&sphere_info)
            .build(),
        write(PLANE_BUFFER_BINDING, vk::DescriptorType::STORAGE_BUFFER)
            .buffer_info(&plane_info)
            .build(),
        write(UNIFORM_BUFFER_BINDING, vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&uniform_info)
            .build(),
    ];

    unsafe { device.device.update_descriptor_sets(&writes, &[]) };
}
