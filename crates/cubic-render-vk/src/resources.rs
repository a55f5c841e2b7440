// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use cubic_math::UniformBufferObject;
use cubic_render::Scene;
use std::mem::size_of;
use tracing::debug;

use crate::commands::IndexBinding;
use crate::descriptor;
use crate::device::DeviceContext;
use crate::error::VkResult;
use crate::image::{create_sampler, upload_texture, GpuImage};
use crate::memory::GpuBuffer;

/// GPU copies of the scene. Created once; they outlive every swapchain.
pub struct SceneResources {
    pub vertex_buffer: GpuBuffer,
    pub vertex_count: u32,
    pub index_buffer: Option<GpuBuffer>,
    pub index_count: u32,
    pub uniform_buffer: GpuBuffer,
    pub texture: GpuImage,
    pub sampler: vk::Sampler,
    pub set_layout: vk::DescriptorSetLayout,
    pub descriptor_pool: vk::DescriptorPool,
    pub descriptor_set: vk::DescriptorSet,
}

impl SceneResources {
    pub unsafe fn new(ctx: &DeviceContext, scene: &Scene) -> VkResult<Self> {
        let mut res = Self {
            vertex_buffer: null_buffer(),
            vertex_count: scene.mesh.vertices.len() as u32,
            index_buffer: None,
            index_count: scene.mesh.indices.len() as u32,
            uniform_buffer: null_buffer(),
            texture: GpuImage {
                image: vk::Image::null(),
                memory: vk::DeviceMemory::null(),
                view: vk::ImageView::null(),
                format: vk::Format::UNDEFINED,
                extent: vk::Extent2D::default(),
            },
            sampler: vk::Sampler::null(),
            set_layout: vk::DescriptorSetLayout::null(),
            descriptor_pool: vk::DescriptorPool::null(),
            descriptor_set: vk::DescriptorSet::null(),
        };
        if let Err(e) = res.fill(ctx, scene) {
            res.destroy(&ctx.device);
            return Err(e);
        }
        debug!(
            "scene uploaded: {} vertices, {} indices, texture {}x{}",
            res.vertex_count, res.index_count, scene.texture.width, scene.texture.height
        );
        Ok(res)
    }

    unsafe fn fill(&mut self, ctx: &DeviceContext, scene: &Scene) -> VkResult<()> {
        self.vertex_buffer = GpuBuffer::device_local_with(
            ctx,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            &scene.mesh.vertices,
        )?;
        if scene.mesh.is_indexed() {
            self.index_buffer = Some(GpuBuffer::device_local_with(
                ctx,
                vk::BufferUsageFlags::INDEX_BUFFER,
                &scene.mesh.indices,
            )?);
        }

        let ubo_size = size_of::<UniformBufferObject>() as vk::DeviceSize;
        self.uniform_buffer =
            GpuBuffer::host_visible(ctx, ubo_size, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
        self.uniform_buffer
            .write(&ctx.device, &[UniformBufferObject::identity()])?;

        self.texture = upload_texture(ctx, &scene.texture)?;
        self.sampler = create_sampler(ctx)?;

        self.set_layout = descriptor::create_set_layout(&ctx.device)?;
        self.descriptor_pool = descriptor::create_pool(&ctx.device)?;
        self.descriptor_set = descriptor::allocate_and_write_set(
            &ctx.device,
            self.descriptor_pool,
            self.set_layout,
            self.uniform_buffer.buffer,
            ubo_size,
            self.texture.view,
            self.sampler,
        )?;
        Ok(())
    }

    pub fn index_binding(&self) -> Option<IndexBinding> {
        self.index_buffer.map(|b| IndexBinding {
            buffer: b.buffer,
            count: self.index_count,
        })
    }

    pub unsafe fn update_uniforms(
        &self,
        device: &ash::Device,
        ubo: &UniformBufferObject,
    ) -> VkResult<()> {
        self.uniform_buffer.write(device, std::slice::from_ref(ubo))
    }

    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.descriptor_pool != vk::DescriptorPool::null() {
            // frees the set with it
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            self.descriptor_pool = vk::DescriptorPool::null();
            self.descriptor_set = vk::DescriptorSet::null();
        }
        if self.set_layout != vk::DescriptorSetLayout::null() {
            device.destroy_descriptor_set_layout(self.set_layout, None);
            self.set_layout = vk::DescriptorSetLayout::null();
        }
        if self.sampler != vk::Sampler::null() {
            device.destroy_sampler(self.sampler, None);
            self.sampler = vk::Sampler::null();
        }
        self.texture.destroy(device);
        self.uniform_buffer.destroy(device);
        if let Some(mut ib) = self.index_buffer.take() {
            ib.destroy(device);
        }
        self.vertex_buffer.destroy(device);
    }
}

fn null_buffer() -> GpuBuffer {
    GpuBuffer {
        buffer: vk::Buffer::null(),
        memory: vk::DeviceMemory::null(),
        size: 0,
    }
}
