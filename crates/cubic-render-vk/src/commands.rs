// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::device::DeviceContext;
use crate::error::{ApiResultExt, VkError, VkResult};

/// Index data bound for the draw, if the mesh has any.
#[derive(Clone, Copy, Debug)]
pub struct IndexBinding {
    pub buffer: vk::Buffer,
    pub count: u32,
}

/// Everything a recorded command buffer refers to.
#[derive(Clone, Copy, Debug)]
pub struct RecordInfo<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffers: &'a [vk::Framebuffer],
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    pub descriptor_set: Option<vk::DescriptorSet>,
    pub vertex_buffer: vk::Buffer,
    pub vertex_count: u32,
    pub index: Option<IndexBinding>,
    pub clear_color: [f32; 4],
    pub has_depth: bool,
}

/// Color clear first, then depth 1.0 / stencil 0 when a depth attachment exists.
pub fn clear_values(rgba: [f32; 4], has_depth: bool) -> Vec<vk::ClearValue> {
    let mut values = vec![vk::ClearValue {
        color: vk::ClearColorValue { float32: rgba },
    }];
    if has_depth {
        values.push(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        });
    }
    values
}

pub unsafe fn allocate_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: usize,
) -> VkResult<Vec<vk::CommandBuffer>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let alloc_info = vk::CommandBufferAllocateInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
        command_pool: pool,
        level: vk::CommandBufferLevel::PRIMARY,
        command_buffer_count: count as u32,
        ..Default::default()
    };
    device
        .allocate_command_buffers(&alloc_info)
        .during("allocate_command_buffers")
}

pub unsafe fn free_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    buffers: &mut Vec<vk::CommandBuffer>,
) {
    if !buffers.is_empty() {
        device.free_command_buffers(pool, buffers);
        buffers.clear();
    }
}

/// Records one full render pass per framebuffer into the matching buffer.
///
/// Buffers are recorded once with `SIMULTANEOUS_USE` and replayed every
/// frame until the next rebuild.
pub unsafe fn record_command_buffers(
    device: &ash::Device,
    buffers: &[vk::CommandBuffer],
    info: &RecordInfo<'_>,
) -> VkResult<()> {
    check_counts(buffers.len(), info.framebuffers.len())?;
    let clears = clear_values(info.clear_color, info.has_depth);
    for (&cmd, &framebuffer) in buffers.iter().zip(info.framebuffers) {
        record_one(device, cmd, framebuffer, info, &clears)?;
    }
    Ok(())
}

fn check_counts(buffers: usize, framebuffers: usize) -> VkResult<()> {
    if buffers != framebuffers {
        return Err(VkError::CountMismatch {
            buffers,
            framebuffers,
        });
    }
    Ok(())
}

unsafe fn record_one(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    framebuffer: vk::Framebuffer,
    info: &RecordInfo<'_>,
    clears: &[vk::ClearValue],
) -> VkResult<()> {
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::SIMULTANEOUS_USE,
        ..Default::default()
    };
    device
        .begin_command_buffer(cmd, &begin)
        .during("begin_command_buffer")?;

    let rp_begin = vk::RenderPassBeginInfo {
        s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
        render_pass: info.render_pass,
        framebuffer,
        render_area: vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: info.extent,
        },
        clear_value_count: clears.len() as u32,
        p_clear_values: clears.as_ptr(),
        ..Default::default()
    };
    device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
    device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, info.pipeline);

    let offsets = [0_u64];
    device.cmd_bind_vertex_buffers(cmd, 0, std::slice::from_ref(&info.vertex_buffer), &offsets);
    if let Some(set) = info.descriptor_set {
        device.cmd_bind_descriptor_sets(
            cmd,
            vk::PipelineBindPoint::GRAPHICS,
            info.pipeline_layout,
            0,
            std::slice::from_ref(&set),
            &[],
        );
    }
    match info.index {
        Some(index) => {
            device.cmd_bind_index_buffer(cmd, index.buffer, 0, vk::IndexType::UINT16);
            device.cmd_draw_indexed(cmd, index.count, 1, 0, 0, 0);
        }
        None => device.cmd_draw(cmd, info.vertex_count, 1, 0, 0),
    }

    device.cmd_end_render_pass(cmd);
    device
        .end_command_buffer(cmd)
        .during("end_command_buffer")
}

/// Allocates and begins a throwaway command buffer for setup work.
pub unsafe fn begin_one_time(ctx: &DeviceContext) -> VkResult<vk::CommandBuffer> {
    let cmd = allocate_command_buffers(&ctx.device, ctx.command_pool, 1)?[0];
    let begin = vk::CommandBufferBeginInfo {
        s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
        ..Default::default()
    };
    if let Err(e) = ctx.device.begin_command_buffer(cmd, &begin) {
        ctx.device
            .free_command_buffers(ctx.command_pool, std::slice::from_ref(&cmd));
        return Err(e).during("begin_command_buffer");
    }
    Ok(cmd)
}

/// Ends, submits and waits for `cmd`, then frees it.
pub unsafe fn submit_one_time(ctx: &DeviceContext, cmd: vk::CommandBuffer) -> VkResult<()> {
    let d = &ctx.device;
    let result = (|| -> VkResult<()> {
        d.end_command_buffer(cmd).during("end_command_buffer")?;
        let si = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            ..Default::default()
        };
        d.queue_submit(ctx.queue, std::slice::from_ref(&si), vk::Fence::null())
            .during("queue_submit")?;
        d.queue_wait_idle(ctx.queue).during("queue_wait_idle")
    })();
    d.free_command_buffers(ctx.command_pool, std::slice::from_ref(&cmd));
    result
}
