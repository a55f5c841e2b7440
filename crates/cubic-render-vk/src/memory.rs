// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use bytemuck::Pod;

use crate::commands::{begin_one_time, submit_one_time};
use crate::device::DeviceContext;
use crate::error::{ApiResultExt, VkResult};

/// A buffer with its own dedicated allocation.
#[derive(Clone, Copy, Debug)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
}

impl GpuBuffer {
    /// # Safety
    /// `ctx` must outlive the returned buffer.
    pub unsafe fn new(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        props: vk::MemoryPropertyFlags,
    ) -> VkResult<Self> {
        let d = &ctx.device;
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = d.create_buffer(&bci, None).during("create_buffer")?;
        let req = d.get_buffer_memory_requirements(buffer);
        let memory_type_index = match ctx.memory_type(req.memory_type_bits, props) {
            Ok(i) => i,
            Err(e) => {
                d.destroy_buffer(buffer, None);
                return Err(e);
            }
        };
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = match d.allocate_memory(&mai, None) {
            Ok(m) => m,
            Err(e) => {
                d.destroy_buffer(buffer, None);
                return Err(e).during("allocate_memory");
            }
        };
        if let Err(e) = d.bind_buffer_memory(buffer, memory, 0) {
            d.destroy_buffer(buffer, None);
            d.free_memory(memory, None);
            return Err(e).during("bind_buffer_memory");
        }
        Ok(Self {
            buffer,
            memory,
            size,
        })
    }

    /// Host-visible, coherent buffer for data rewritten from the CPU.
    pub unsafe fn host_visible(
        ctx: &DeviceContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> VkResult<Self> {
        Self::new(
            ctx,
            size,
            usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
    }

    /// Copies `data` into a host-visible buffer. Writes past `size` are cut off.
    pub unsafe fn write<T: Pod>(&self, device: &ash::Device, data: &[T]) -> VkResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let len = bytes.len().min(self.size as usize);
        if len == 0 {
            return Ok(());
        }
        let ptr = device
            .map_memory(self.memory, 0, len as vk::DeviceSize, vk::MemoryMapFlags::empty())
            .during("map_memory")?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), len);
        device.unmap_memory(self.memory);
        Ok(())
    }

    /// Device-local buffer filled through a temporary staging buffer.
    pub unsafe fn device_local_with<T: Pod>(
        ctx: &DeviceContext,
        usage: vk::BufferUsageFlags,
        data: &[T],
    ) -> VkResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = bytes.len().max(1) as vk::DeviceSize;

        let mut staging = Self::host_visible(ctx, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
        if let Err(e) = staging.write(&ctx.device, bytes) {
            staging.destroy(&ctx.device);
            return Err(e);
        }
        let mut dst = match Self::new(
            ctx,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) {
            Ok(b) => b,
            Err(e) => {
                staging.destroy(&ctx.device);
                return Err(e);
            }
        };
        let copied = copy_buffer(ctx, staging.buffer, dst.buffer, size);
        staging.destroy(&ctx.device);
        if let Err(e) = copied {
            dst.destroy(&ctx.device);
            return Err(e);
        }
        Ok(dst)
    }

    /// # Safety
    /// The GPU must be done with the buffer.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.buffer != vk::Buffer::null() {
            device.destroy_buffer(self.buffer, None);
            self.buffer = vk::Buffer::null();
        }
        if self.memory != vk::DeviceMemory::null() {
            device.free_memory(self.memory, None);
            self.memory = vk::DeviceMemory::null();
        }
    }
}

unsafe fn copy_buffer(
    ctx: &DeviceContext,
    src: vk::Buffer,
    dst: vk::Buffer,
    size: vk::DeviceSize,
) -> VkResult<()> {
    let cmd = begin_one_time(ctx)?;
    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size,
    };
    ctx.device
        .cmd_copy_buffer(cmd, src, dst, std::slice::from_ref(&region));
    submit_one_time(ctx, cmd)
}
