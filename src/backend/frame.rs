// Frame orchestration
//
// acquire -> wait/reset fence -> uniform update -> record -> submit -> present
//
// The loop only talks to the GPU through `FrameDevice`, so the ordering and
// the one-frame-in-flight rule can be checked against a simulated device.
// The command buffer, uniform buffer and descriptor set are shared between
// frames; that is only sound while FRAMES_IN_FLIGHT is 1.

use ash::vk;
use crate::error::{RenderError, RenderResult};
use crate::scene::FrameUniform;

pub const FRAMES_IN_FLIGHT: usize = 1;

/// Where the orchestrator is within the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Recording,
    Submitted,
    Presenting,
}

/// Outcome of presenting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// The image was shown but the swapchain no longer matches the surface exactly
    Suboptimal,
    /// The surface changed and the swapchain can no longer present to it
    OutOfDate,
}

/// Per-frame command buffer and synchronization handles
#[derive(Debug, Clone, Copy)]
pub struct FrameSlot {
    pub command_buffer: vk::CommandBuffer,
    pub in_flight: vk::Fence,
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
}

/// Everything recorded into a frame that does not change between frames
#[derive(Debug, Clone)]
pub struct FrameTargets {
    pub compute_image: vk::Image,
    pub swapchain_images: Vec<vk::Image>,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub descriptor_set: vk::DescriptorSet,
}

/// GPU operations the frame loop needs, in the order it issues them.
pub trait FrameDevice {
    fn acquire_next_image(&mut self, signal: vk::Semaphore) -> Result<(u32, bool), vk::Result>;
    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<(), vk::Result>;
    fn reset_fence(&mut self, fence: vk::Fence) -> Result<(), vk::Result>;
    fn write_uniform(&mut self, uniform: &FrameUniform) -> RenderResult<()>;

    fn begin_commands(
        &mut self,
        cmd: vk::CommandBuffer,
        usage: vk::CommandBufferUsageFlags,
    ) -> Result<(), vk::Result>;
    fn bind_compute(
        &mut self,
        cmd: vk::CommandBuffer,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );
    fn dispatch(&mut self, cmd: vk::CommandBuffer, x: u32, y: u32, z: u32);
    fn pipeline_barrier(
        &mut self,
        cmd: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barriers: &[vk::ImageMemoryBarrier],
    );
    fn copy_image(&mut self, cmd: vk::CommandBuffer, src: vk::Image, dst: vk::Image, extent: vk::Extent3D);
    fn end_commands(&mut self, cmd: vk::CommandBuffer) -> Result<(), vk::Result>;

    fn submit(
        &mut self,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        wait_stage: vk::PipelineStageFlags,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<(), vk::Result>;
    /// `Ok(true)` when the presentation was suboptimal
    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> Result<bool, vk::Result>;
}

fn color_transition(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier {
    vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .build()
}

/// Transitions batched after the dispatch: compute target to transfer source,
/// swapchain image to transfer destination.
pub fn copy_barriers(compute_image: vk::Image, swapchain_image: vk::Image) -> [vk::ImageMemoryBarrier; 3] {
    [
        color_transition(
            compute_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::GENERAL,
            vk::AccessFlags::empty(),
            vk::AccessFlags::SHADER_WRITE,
        ),
        color_transition(
            compute_image,
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::AccessFlags::SHADER_WRITE,
            vk::AccessFlags::TRANSFER_READ,
        ),
        color_transition(
            swapchain_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
        ),
    ]
}

pub fn present_barrier(swapchain_image: vk::Image) -> vk::ImageMemoryBarrier {
    color_transition(
        swapchain_image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::PRESENT_SRC_KHR,
        vk::AccessFlags::TRANSFER_WRITE,
        vk::AccessFlags::MEMORY_READ,
    )
}

/// Drives one frame at a time through its states.
pub struct FrameLoop {
    slots: Vec<FrameSlot>,
    current: usize,
    state: FrameState,
    stale_reported: bool,
}

impl FrameLoop {
    pub fn new(slots: Vec<FrameSlot>) -> Self {
        debug_assert_eq!(slots.len(), FRAMES_IN_FLIGHT);
        Self {
            slots,
            current: 0,
            state: FrameState::Idle,
            stale_reported: false,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    fn enter(&mut self, state: FrameState) {
        log::trace!("Frame {}: {:?} -> {:?}", self.current, self.state, state);
        self.state = state;
    }

    fn report_stale(&mut self, status: PresentStatus) {
        if status != PresentStatus::Presented && !self.stale_reported {
            log::debug!("Surface reported {:?}; swapchain is not recreated", status);
            self.stale_reported = true;
        }
    }

    /// Render and present one frame.
    ///
    /// An out-of-date surface at acquire or present is returned as
    /// `PresentStatus::OutOfDate`; the frame is skipped and the loop can continue.
    pub fn draw<D: FrameDevice>(
        &mut self,
        gpu: &mut D,
        targets: &FrameTargets,
        uniform: &FrameUniform,
    ) -> RenderResult<PresentStatus> {
        let slot = self.slots[self.current];

        // A failed acquire signals nothing and the fence is untouched, so the
        // frame can be skipped without breaking the sync chain
        let (image_index, acquire_suboptimal) = match gpu.acquire_next_image(slot.image_available) {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.report_stale(PresentStatus::OutOfDate);
                return Ok(PresentStatus::OutOfDate);
            }
            Err(result) => {
                return Err(RenderError::Submission {
                    operation: "acquire next image",
                    result,
                })
            }
        };
        if acquire_suboptimal {
            log::debug!("Acquired image {} from a suboptimal swapchain", image_index);
        }
        let swapchain_image = targets
            .swapchain_images
            .get(image_index as usize)
            .copied()
            .ok_or(RenderError::Submission {
                operation: "acquire next image",
                result: vk::Result::ERROR_UNKNOWN,
            })?;

        // The previous frame must be finished before its command buffer and
        // uniform buffer are touched again
        gpu.wait_for_fence(slot.in_flight)
            .map_err(RenderError::submission("wait for fence"))?;
        gpu.reset_fence(slot.in_flight)
            .map_err(RenderError::submission("reset fence"))?;

        gpu.write_uniform(uniform)?;

        self.enter(FrameState::Recording);
        self.record(gpu, slot.command_buffer, targets, swapchain_image)?;

        gpu.submit(
            slot.command_buffer,
            slot.image_available,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            slot.render_finished,
            slot.in_flight,
        )
        .map_err(RenderError::submission("queue submit"))?;
        self.enter(FrameState::Submitted);

        self.enter(FrameState::Presenting);
        let status = match gpu.present(image_index, slot.render_finished) {
            Ok(false) => PresentStatus::Presented,
            Ok(true) => PresentStatus::Suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentStatus::OutOfDate,
            Err(result) => return Err(RenderError::Submission { operation: "present", result }),
        };

        self.report_stale(status);

        self.current = (self.current + 1) % self.slots.len();
        self.enter(FrameState::Idle);
        Ok(status)
    }

    fn record<D: FrameDevice>(
        &self,
        gpu: &mut D,
        cmd: vk::CommandBuffer,
        targets: &FrameTargets,
        swapchain_image: vk::Image,
    ) -> RenderResult<()> {
        let extent = targets.extent;

        gpu.begin_commands(cmd, vk::CommandBufferUsageFlags::SIMULTANEOUS_USE)
            .map_err(RenderError::submission("begin command buffer"))?;

        gpu.bind_compute(cmd, targets.pipeline, targets.pipeline_layout, targets.descriptor_set);
        gpu.dispatch(cmd, extent.width, extent.height, 1);

        gpu.pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::ALL_COMMANDS,
            &copy_barriers(targets.compute_image, swapchain_image),
        );

        gpu.copy_image(
            cmd,
            targets.compute_image,
            swapchain_image,
            vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        );

        gpu.pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            &[present_barrier(swapchain_image)],
        );

        gpu.end_commands(cmd)
            .map_err(RenderError::submission("end command buffer"))
    }

    /// Block until every frame slot's GPU work has finished
    pub fn drain<D: FrameDevice>(&mut self, gpu: &mut D) -> RenderResult<()> {
        for slot in &self.slots {
            gpu.wait_for_fence(slot.in_flight)
                .map_err(RenderError::submission("wait for fence"))?;
        }
        self.enter(FrameState::Idle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Acquire,
        WaitFence,
        ResetFence,
        WriteUniform(f32),
        Begin(vk::CommandBufferUsageFlags),
        Bind,
        Dispatch(u32, u32, u32),
        Barrier {
            src: vk::PipelineStageFlags,
            dst: vk::PipelineStageFlags,
            transitions: Vec<(vk::Image, vk::ImageLayout, vk::ImageLayout)>,
        },
        Copy(vk::Image, vk::Image, (u32, u32, u32)),
        End,
        Submit(vk::PipelineStageFlags),
        Present(u32),
    }

    /// Records every call and models a single binary fence
    struct SimulatedDevice {
        calls: Vec<Call>,
        image_count: u32,
        next_image: u32,
        fence_signaled: bool,
        gpu_busy: bool,
        submissions: usize,
        present_result: Result<bool, vk::Result>,
        acquire_result: Option<vk::Result>,
        stale_acquire: bool,
    }

    impl SimulatedDevice {
        fn new(image_count: u32) -> Self {
            Self {
                calls: Vec::new(),
                image_count,
                next_image: 0,
                fence_signaled: true,
                gpu_busy: false,
                submissions: 0,
                present_result: Ok(false),
                acquire_result: None,
                stale_acquire: false,
            }
        }
    }

    impl FrameDevice for SimulatedDevice {
        fn acquire_next_image(&mut self, _signal: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
            self.calls.push(Call::Acquire);
            if let Some(err) = self.acquire_result {
                return Err(err);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok((index, false))
        }

        fn wait_for_fence(&mut self, _fence: vk::Fence) -> Result<(), vk::Result> {
            self.calls.push(Call::WaitFence);
            // Waiting completes the outstanding submission
            self.gpu_busy = false;
            self.fence_signaled = true;
            Ok(())
        }

        fn reset_fence(&mut self, _fence: vk::Fence) -> Result<(), vk::Result> {
            self.calls.push(Call::ResetFence);
            assert!(!self.gpu_busy, "fence reset while work is pending");
            self.fence_signaled = false;
            Ok(())
        }

        fn write_uniform(&mut self, uniform: &FrameUniform) -> RenderResult<()> {
            assert!(!self.gpu_busy, "uniform written while the GPU may read it");
            self.calls.push(Call::WriteUniform(uniform.time));
            Ok(())
        }

        fn begin_commands(
            &mut self,
            _cmd: vk::CommandBuffer,
            usage: vk::CommandBufferUsageFlags,
        ) -> Result<(), vk::Result> {
            assert!(!self.gpu_busy, "command buffer re-recorded while executing");
            self.calls.push(Call::Begin(usage));
            Ok(())
        }

        fn bind_compute(
            &mut self,
            _cmd: vk::CommandBuffer,
            _pipeline: vk::Pipeline,
            _layout: vk::PipelineLayout,
            _set: vk::DescriptorSet,
        ) {
            self.calls.push(Call::Bind);
        }

        fn dispatch(&mut self, _cmd: vk::CommandBuffer, x: u32, y: u32, z: u32) {
            self.calls.push(Call::Dispatch(x, y, z));
        }

        fn pipeline_barrier(
            &mut self,
            _cmd: vk::CommandBuffer,
            src_stage: vk::PipelineStageFlags,
            dst_stage: vk::PipelineStageFlags,
            barriers: &[vk::ImageMemoryBarrier],
        ) {
            self.calls.push(Call::Barrier {
                src: src_stage,
                dst: dst_stage,
                transitions: barriers
                    .iter()
                    .map(|b| (b.image, b.old_layout, b.new_layout))
                    .collect(),
            });
        }

        fn copy_image(&mut self, _cmd: vk::CommandBuffer, src: vk::Image, dst: vk::Image, extent: vk::Extent3D) {
            self.calls.push(Call::Copy(src, dst, (extent.width, extent.height, extent.depth)));
        }

        fn end_commands(&mut self, _cmd: vk::CommandBuffer) -> Result<(), vk::Result> {
            self.calls.push(Call::End);
            Ok(())
        }

        fn submit(
            &mut self,
            _cmd: vk::CommandBuffer,
            _wait: vk::Semaphore,
            wait_stage: vk::PipelineStageFlags,
            _signal: vk::Semaphore,
            _fence: vk::Fence,
        ) -> Result<(), vk::Result> {
            assert!(!self.gpu_busy, "second submission without a fence wait");
            assert!(!self.fence_signaled, "submitted with a signaled fence");
            self.calls.push(Call::Submit(wait_stage));
            self.gpu_busy = true;
            self.submissions += 1;
            Ok(())
        }

        fn present(&mut self, image_index: u32, _wait: vk::Semaphore) -> Result<bool, vk::Result> {
            self.calls.push(Call::Present(image_index));
            if self.present_result == Err(vk::Result::ERROR_OUT_OF_DATE_KHR) && self.stale_acquire {
                // The surface stays stale for later acquires too
                self.acquire_result = Some(vk::Result::ERROR_OUT_OF_DATE_KHR);
            }
            self.present_result
        }
    }

    fn slot() -> FrameSlot {
        FrameSlot {
            command_buffer: vk::CommandBuffer::from_raw(1),
            in_flight: vk::Fence::from_raw(2),
            image_available: vk::Semaphore::from_raw(3),
            render_finished: vk::Semaphore::from_raw(4),
        }
    }

    const COMPUTE_IMAGE: u64 = 100;

    fn targets(width: u32, height: u32, image_count: u64) -> FrameTargets {
        FrameTargets {
            compute_image: vk::Image::from_raw(COMPUTE_IMAGE),
            swapchain_images: (0..image_count).map(|i| vk::Image::from_raw(200 + i)).collect(),
            extent: vk::Extent2D { width, height },
            pipeline: vk::Pipeline::from_raw(5),
            pipeline_layout: vk::PipelineLayout::from_raw(6),
            descriptor_set: vk::DescriptorSet::from_raw(7),
        }
    }

    fn uniform(time: f32) -> FrameUniform {
        FrameUniform { time }
    }

    #[test]
    fn records_one_frame_in_order() {
        let mut gpu = SimulatedDevice::new(3);
        let targets = targets(1000, 1000, 3);
        let mut frames = FrameLoop::new(vec![slot()]);

        let status = frames.draw(&mut gpu, &targets, &uniform(0.5)).unwrap();

        let compute = vk::Image::from_raw(COMPUTE_IMAGE);
        let swap = vk::Image::from_raw(200);
        assert_eq!(status, PresentStatus::Presented);
        assert_eq!(
            gpu.calls,
            vec![
                Call::Acquire,
                Call::WaitFence,
                Call::ResetFence,
                Call::WriteUniform(0.5),
                Call::Begin(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE),
                Call::Bind,
                Call::Dispatch(1000, 1000, 1),
                Call::Barrier {
                    src: vk::PipelineStageFlags::COMPUTE_SHADER,
                    dst: vk::PipelineStageFlags::ALL_COMMANDS,
                    transitions: vec![
                        (compute, vk::ImageLayout::UNDEFINED, vk::ImageLayout::GENERAL),
                        (compute, vk::ImageLayout::GENERAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
                        (swap, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                    ],
                },
                Call::Copy(compute, swap, (1000, 1000, 1)),
                Call::Barrier {
                    src: vk::PipelineStageFlags::ALL_COMMANDS,
                    dst: vk::PipelineStageFlags::TOP_OF_PIPE,
                    transitions: vec![(
                        swap,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        vk::ImageLayout::PRESENT_SRC_KHR
                    )],
                },
                Call::End,
                Call::Submit(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT),
                Call::Present(0),
            ]
        );
        assert_eq!(frames.state(), FrameState::Idle);
    }

    #[test]
    fn never_more_than_one_frame_in_flight() {
        let mut gpu = SimulatedDevice::new(2);
        let targets = targets(64, 48, 2);
        let mut frames = FrameLoop::new(vec![slot()]);

        for i in 0..5 {
            frames.draw(&mut gpu, &targets, &uniform(i as f32)).unwrap();
        }

        assert_eq!(gpu.submissions, 5);
        let mut waited = false;
        for call in &gpu.calls {
            match call {
                Call::WaitFence => waited = true,
                Call::Submit(_) => {
                    assert!(waited, "submit without a preceding fence wait");
                    waited = false;
                }
                _ => {}
            }
        }
    }

    #[test]
    fn presents_acquired_images_in_turn() {
        let mut gpu = SimulatedDevice::new(2);
        let targets = targets(8, 8, 2);
        let mut frames = FrameLoop::new(vec![slot()]);

        for _ in 0..3 {
            frames.draw(&mut gpu, &targets, &uniform(0.0)).unwrap();
        }

        let presented: Vec<u32> = gpu
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Present(i) => Some(*i),
                _ => None,
            })
            .collect();
        assert_eq!(presented, vec![0, 1, 0]);
    }

    #[test]
    fn uniform_is_written_after_fence_wait() {
        let mut gpu = SimulatedDevice::new(1);
        let targets = targets(8, 8, 1);
        let mut frames = FrameLoop::new(vec![slot()]);

        frames.draw(&mut gpu, &targets, &uniform(1.0)).unwrap();
        frames.draw(&mut gpu, &targets, &uniform(2.0)).unwrap();

        let position = |wanted: &Call| gpu.calls.iter().rposition(|c| c == wanted).unwrap();
        let last_wait = position(&Call::WaitFence);
        let last_write = position(&Call::WriteUniform(2.0));
        assert!(last_write > last_wait);
    }

    #[test]
    fn out_of_date_present_is_reported_not_raised() {
        let mut gpu = SimulatedDevice::new(2);
        gpu.present_result = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        let targets = targets(8, 8, 2);
        let mut frames = FrameLoop::new(vec![slot()]);

        let status = frames.draw(&mut gpu, &targets, &uniform(0.0)).unwrap();
        assert_eq!(status, PresentStatus::OutOfDate);
        assert_eq!(frames.state(), FrameState::Idle);

        // The loop keeps going on the next frame
        let status = frames.draw(&mut gpu, &targets, &uniform(0.0)).unwrap();
        assert_eq!(status, PresentStatus::OutOfDate);
    }

    #[test]
    fn suboptimal_present_is_reported() {
        let mut gpu = SimulatedDevice::new(2);
        gpu.present_result = Ok(true);
        let targets = targets(8, 8, 2);
        let mut frames = FrameLoop::new(vec![slot()]);

        let status = frames.draw(&mut gpu, &targets, &uniform(0.0)).unwrap();
        assert_eq!(status, PresentStatus::Suboptimal);
    }

    #[test]
    fn device_lost_on_present_is_a_submission_error() {
        let mut gpu = SimulatedDevice::new(2);
        gpu.present_result = Err(vk::Result::ERROR_DEVICE_LOST);
        let targets = targets(8, 8, 2);
        let mut frames = FrameLoop::new(vec![slot()]);

        let err = frames.draw(&mut gpu, &targets, &uniform(0.0)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Submission {
                operation: "present",
                result: vk::Result::ERROR_DEVICE_LOST
            }
        ));
        assert_eq!(frames.state(), FrameState::Presenting);
    }

    #[test]
    fn stale_surface_keeps_reporting_out_of_date() {
        let mut gpu = SimulatedDevice::new(2);
        gpu.present_result = Err(vk::Result::ERROR_OUT_OF_DATE_KHR);
        gpu.stale_acquire = true;
        let targets = targets(8, 8, 2);
        let mut frames = FrameLoop::new(vec![slot()]);

        let first = frames.draw(&mut gpu, &targets, &uniform(0.0)).unwrap();
        let calls_after_first = gpu.calls.len();
        let second = frames.draw(&mut gpu, &targets, &uniform(0.0)).unwrap();
        let third = frames.draw(&mut gpu, &targets, &uniform(0.0)).unwrap();

        assert_eq!(first, PresentStatus::OutOfDate);
        assert_eq!(second, PresentStatus::OutOfDate);
        assert_eq!(third, PresentStatus::OutOfDate);
        // Skipped frames only attempt the acquire
        assert_eq!(&gpu.calls[calls_after_first..], &[Call::Acquire, Call::Acquire]);
        assert_eq!(gpu.submissions, 1);
        assert_eq!(frames.state(), FrameState::Idle);

        // The previous submission can still be drained
        frames.drain(&mut gpu).unwrap();
        assert!(!gpu.gpu_busy);
    }

    #[test]
    fn out_of_date_acquire_skips_the_frame() {
        let mut gpu = SimulatedDevice::new(2);
        gpu.acquire_result = Some(vk::Result::ERROR_OUT_OF_DATE_KHR);
        let targets = targets(8, 8, 2);
        let mut frames = FrameLoop::new(vec![slot()]);

        let status = frames.draw(&mut gpu, &targets, &uniform(0.0)).unwrap();
        assert_eq!(status, PresentStatus::OutOfDate);
        assert_eq!(gpu.calls, vec![Call::Acquire]);
    }

    #[test]
    fn acquire_failure_stops_before_any_work() {
        let mut gpu = SimulatedDevice::new(2);
        gpu.acquire_result = Some(vk::Result::ERROR_DEVICE_LOST);
        let targets = targets(8, 8, 2);
        let mut frames = FrameLoop::new(vec![slot()]);

        let err = frames.draw(&mut gpu, &targets, &uniform(0.0)).unwrap_err();
        assert!(matches!(err, RenderError::Submission { operation: "acquire next image", .. }));
        assert_eq!(gpu.calls, vec![Call::Acquire]);
        assert_eq!(gpu.submissions, 0);
    }

    #[test]
    fn drain_waits_on_outstanding_work() {
        let mut gpu = SimulatedDevice::new(2);
        let targets = targets(8, 8, 2);
        let mut frames = FrameLoop::new(vec![slot()]);

        frames.draw(&mut gpu, &targets, &uniform(0.0)).unwrap();
        assert!(gpu.gpu_busy);

        frames.drain(&mut gpu).unwrap();
        assert!(!gpu.gpu_busy);
        assert_eq!(gpu.calls.last(), Some(&Call::WaitFence));
        assert_eq!(frames.state(), FrameState::Idle);
    }
}
