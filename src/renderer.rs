// Ray tracer session
//
// Builds every GPU resource in dependency order and drives the frame loop.
// Fields are declared in reverse creation order so they drop safely.

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::backend::buffer::{ComputeTarget, GpuBuffer};
use crate::backend::command::CommandPool;
use crate::backend::frame::{
    FrameDevice, FrameLoop, FrameSlot, FrameTargets, PresentStatus, FRAMES_IN_FLIGHT,
};
use crate::backend::pipeline::{ComputePipeline, DescriptorResources};
use crate::backend::shader::load_spirv;
use crate::backend::swapchain::{SwapchainConfig, SwapchainSupport};
use crate::backend::sync::FrameSync;
use crate::backend::{Swapchain, VulkanDevice};
use crate::config::Config;
use crate::error::{RenderError, RenderResult};
use crate::scene::{FrameUniform, Scene};

pub struct RayTracer {
    frame_loop: FrameLoop,
    _frame_sync: Vec<FrameSync>,
    _command_pool: CommandPool,
    _pipeline: ComputePipeline,
    uniform: GpuBuffer,
    _planes: GpuBuffer,
    _spheres: GpuBuffer,
    _target: ComputeTarget,
    swapchain: Swapchain,
    device: Arc<VulkanDevice>,
    targets: FrameTargets,
    started: Instant,
}

impl RayTracer {
    /// Initialise Vulkan for `window` and upload `scene`.
    ///
    /// `window_extent` is the window's inner size in pixels; the surface may
    /// dictate a different extent.
    pub fn new<W>(
        window: &W,
        window_extent: vk::Extent2D,
        config: &Config,
        scene: &Scene,
    ) -> RenderResult<Self>
    where
        W: HasRawDisplayHandle + HasRawWindowHandle,
    {
        let device = VulkanDevice::new(window, &config.window.title, config.validation_enabled())?;

        let support = SwapchainSupport::query(&device)?;
        let swapchain_config = SwapchainConfig::negotiate(&support, window_extent)?;
        let swapchain = Swapchain::new(device.clone(), &swapchain_config, vk::SwapchainKHR::null())?;

        let target = ComputeTarget::new(&device, swapchain.format, swapchain.extent)?;

        let spheres = GpuBuffer::with_data(
            &device,
            "sphere",
            vk::BufferUsageFlags::STORAGE_BUFFER,
            scene.sphere_bytes(),
        )?;
        let planes = GpuBuffer::with_data(
            &device,
            "plane",
            vk::BufferUsageFlags::STORAGE_BUFFER,
            scene.plane_bytes(),
        )?;
        let uniform = GpuBuffer::with_data(
            &device,
            "uniform",
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            bytemuck::bytes_of(&FrameUniform::default()),
        )?;
        log::info!(
            "Scene uploaded: {} spheres, {} planes",
            scene.spheres.len(),
            scene.planes.len()
        );

        let shader_code = load_spirv(&config.shader.path)?;
        let pipeline = ComputePipeline::new(
            &device,
            &shader_code,
            &DescriptorResources {
                output_view: target.view(),
                spheres: spheres.raw(),
                planes: planes.raw(),
                uniform: uniform.raw(),
            },
        )?;

        let command_pool = CommandPool::new(&device)?;
        let command_buffers = command_pool.allocate(FRAMES_IN_FLIGHT as u32)?;

        let frame_sync = (0..FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(&device))
            .collect::<RenderResult<Vec<_>>>()?;

        let slots = command_buffers
            .iter()
            .zip(&frame_sync)
            .map(|(&command_buffer, sync)| FrameSlot {
                command_buffer,
                in_flight: sync.in_flight.raw(),
                image_available: sync.image_available.raw(),
                render_finished: sync.render_finished.raw(),
            })
            .collect();

        let targets = FrameTargets {
            compute_image: target.image(),
            swapchain_images: swapchain.images.clone(),
            extent: swapchain.extent,
            pipeline: pipeline.pipeline(),
            pipeline_layout: pipeline.layout(),
            descriptor_set: pipeline.descriptor_set(),
        };

        log::info!("Ray tracer ready");

        Ok(Self {
            frame_loop: FrameLoop::new(slots),
            _frame_sync: frame_sync,
            _command_pool: command_pool,
            _pipeline: pipeline,
            uniform,
            _planes: planes,
            _spheres: spheres,
            _target: target,
            swapchain,
            device,
            targets,
            started: Instant::now(),
        })
    }

    pub fn render_frame(&mut self) -> RenderResult<PresentStatus> {
        let uniform = FrameUniform {
            time: self.started.elapsed().as_secs_f32(),
        };

        let mut gpu = VulkanFrame {
            device: &self.device,
            swapchain: &self.swapchain,
            uniform: &self.uniform,
        };
        let result = self.frame_loop.draw(&mut gpu, &self.targets, &uniform);
        if let Err(ref e) = result {
            log::debug!("Frame abandoned in {:?} state: {}", self.frame_loop.state(), e);
        }
        result
    }

    /// Wait for the last frame and then for the whole device
    pub fn shutdown(&mut self) -> RenderResult<()> {
        let mut gpu = VulkanFrame {
            device: &self.device,
            swapchain: &self.swapchain,
            uniform: &self.uniform,
        };
        self.frame_loop.drain(&mut gpu)?;
        self.device.wait_idle()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.targets.extent
    }
}

impl Drop for RayTracer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device did not go idle before teardown: {}", e);
        }
    }
}

/// `FrameDevice` over the real device, swapchain and uniform buffer
struct VulkanFrame<'a> {
    device: &'a VulkanDevice,
    swapchain: &'a Swapchain,
    uniform: &'a GpuBuffer,
}

impl FrameDevice for VulkanFrame<'_> {
    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        self.swapchain.acquire_next_image(signal)
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<(), vk::Result> {
        unsafe { self.device.device.wait_for_fences(&[fence], true, u64::MAX) }
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<(), vk::Result> {
        unsafe { self.device.device.reset_fences(&[fence]) }
    }

    fn write_uniform(&mut self, uniform: &FrameUniform) -> RenderResult<()> {
        self.uniform
            .write(bytemuck::bytes_of(uniform))
            .map_err(RenderError::from)
    }

    fn begin_commands(
        &mut self,
        cmd: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> Result<(), vk::Result> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(usage);
        unsafe { self.device.device.begin_command_buffer(cmd, &begin_info) }
    }

    fn bind_compute(
        &mut self,
        cmd: vk::CommandBuffer,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        let device = &self.device.device;
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline);
            device.cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::COMPUTE, layout, 0, &[set], &[]);
        }
    }

    fn dispatch(&mut self, cmd: vk::CommandBuffer, x: u32, y: u32, z: u32) {
        unsafe { self.device.device.cmd_dispatch(cmd, x, y, z) };
    }

    fn pipeline_barrier(
        &mut self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.device.device.cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                barriers,
            )
        };
    }

    fn copy_image(&mut self, cmd: vk::CommandBuffer, src: vk::Image, dst: vk::Image, extent: vk::Extent3D) {
        let layers = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        };
        let region = vk::ImageCopy {
            src_subresource: layers,
            src_offset: vk::Offset3D::default(),
            dst_subresource: layers,
            dst_offset: vk::Offset3D::default(),
            extent,
        };

        unsafe {
            self.device.device.cmd_copy_image(
                cmd,
                src,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }

    fn end_commands(&mut self, cmd: vk::CommandBuffer) -> Result<(), vk::Result> {
        unsafe { self.device.device.end_command_buffer(cmd) }
    }

    fn submit(
        &mut self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<(), vk::Result> {
        let wait_semaphores = [wait];
        let wait_stages = [wait_stage];
        let signal_semaphores = [signal];
        let command_buffers = [cmd];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .device
                .queue_submit(self.device.compute_queue, &[submit_info.build()], fence)
        }
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> Result<bool, vk::Result> {
        self.swapchain
            .present(self.device.present_queue, image_index, &[wait])
    }
}
