// SPDX-License-Identifier: CEPL-1.0
//! Acquire, submit, present. One frame in flight: the queue is drained
//! before returning, so the semaphores can be created and destroyed per call.

use ash::vk;

use crate::device::DeviceContext;
use crate::error::{ApiResultExt, VkResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Presented, but the swapchain no longer matches the surface exactly.
    Suboptimal,
    /// Nothing was presented; the swapchain must be rebuilt.
    OutOfDate,
}

impl FrameStatus {
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, FrameStatus::Presented)
    }
}

/// Maps a present result onto a status; other errors stay errors.
pub fn present_status(result: Result<bool, vk::Result>) -> Result<FrameStatus, vk::Result> {
    match result {
        Ok(false) => Ok(FrameStatus::Presented),
        Ok(true) => Ok(FrameStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(FrameStatus::OutOfDate),
        Err(e) => Err(e),
    }
}

struct FrameSemaphores<'a> {
    device: &'a ash::Device,
    image_acquired: vk::Semaphore,
    render_complete: vk::Semaphore,
}

impl<'a> FrameSemaphores<'a> {
    unsafe fn new(device: &'a ash::Device) -> VkResult<Self> {
        let ci = vk::SemaphoreCreateInfo {
            s_type: vk::StructureType::SEMAPHORE_CREATE_INFO,
            ..Default::default()
        };
        let mut sems = Self {
            device,
            image_acquired: vk::Semaphore::null(),
            render_complete: vk::Semaphore::null(),
        };
        sems.image_acquired = device
            .create_semaphore(&ci, None)
            .during("create_semaphore")?;
        sems.render_complete = device
            .create_semaphore(&ci, None)
            .during("create_semaphore")?;
        Ok(sems)
    }
}

impl Drop for FrameSemaphores<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.render_complete, None);
            self.device.destroy_semaphore(self.image_acquired, None);
        }
    }
}

/// Draws one frame with the pre-recorded buffer for whichever image the
/// presentation engine hands out.
///
/// # Safety
/// `swapchain` must be live and `command_buffers[i]` must target image `i`.
pub unsafe fn draw_frame(
    ctx: &DeviceContext,
    swapchain: vk::SwapchainKHR,
    command_buffers: &[vk::CommandBuffer],
) -> VkResult<FrameStatus> {
    let d = &ctx.device;
    let sems = FrameSemaphores::new(d)?;

    let acquired = ctx.swapchain_loader.acquire_next_image(
        swapchain,
        u64::MAX,
        sems.image_acquired,
        vk::Fence::null(),
    );
    let (image_index, acquire_suboptimal) = match acquired {
        Ok(v) => v,
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Ok(FrameStatus::OutOfDate),
        Err(e) => return Err(e).during("acquire_next_image"),
    };

    // More images than recorded buffers: the chain changed under us.
    let Some(&cmd) = command_buffers.get(image_index as usize) else {
        return Ok(FrameStatus::OutOfDate);
    };

    let wait_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let submit = vk::SubmitInfo {
        s_type: vk::StructureType::SUBMIT_INFO,
        wait_semaphore_count: 1,
        p_wait_semaphores: &sems.image_acquired,
        p_wait_dst_stage_mask: &wait_stage,
        command_buffer_count: 1,
        p_command_buffers: &cmd,
        signal_semaphore_count: 1,
        p_signal_semaphores: &sems.render_complete,
        ..Default::default()
    };
    d.queue_submit(ctx.queue, std::slice::from_ref(&submit), vk::Fence::null())
        .during("queue_submit")?;

    let present = vk::PresentInfoKHR {
        s_type: vk::StructureType::PRESENT_INFO_KHR,
        wait_semaphore_count: 1,
        p_wait_semaphores: &sems.render_complete,
        swapchain_count: 1,
        p_swapchains: &swapchain,
        p_image_indices: &image_index,
        ..Default::default()
    };
    let presented = present_status(ctx.swapchain_loader.queue_present(ctx.queue, &present));

    d.queue_wait_idle(ctx.queue).during("queue_wait_idle")?;

    let status = presented.during("queue_present")?;
    Ok(match status {
        FrameStatus::Presented if acquire_suboptimal => FrameStatus::Suboptimal,
        s => s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_status_mapping() {
        assert_eq!(present_status(Ok(false)), Ok(FrameStatus::Presented));
        assert_eq!(present_status(Ok(true)), Ok(FrameStatus::Suboptimal));
        assert_eq!(
            present_status(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            Ok(FrameStatus::OutOfDate)
        );
        assert_eq!(
            present_status(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(vk::Result::ERROR_DEVICE_LOST)
        );
    }

    #[test]
    fn test_needs_rebuild() {
        assert!(!FrameStatus::Presented.needs_rebuild());
        assert!(FrameStatus::Suboptimal.needs_rebuild());
        assert!(FrameStatus::OutOfDate.needs_rebuild());
    }
}
