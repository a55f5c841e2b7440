// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use cubic_render::Texture;
use tracing::debug;

use crate::commands::{begin_one_time, submit_one_time};
use crate::device::DeviceContext;
use crate::error::{ApiResultExt, VkError, VkResult};
use crate::memory::GpuBuffer;

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Access masks and stages for one supported layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// The three transitions the renderer performs. Anything else is refused.
pub fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> VkResult<TransitionMasks> {
    use vk::ImageLayout as L;
    let masks = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        },
        _ => return Err(VkError::UnsupportedTransition(old, new)),
    };
    Ok(masks)
}

pub fn aspect_for(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT | vk::Format::D16_UNORM => vk::ImageAspectFlags::DEPTH,
        vk::Format::D32_SFLOAT_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D16_UNORM_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

fn full_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> VkResult<vk::ImageView> {
    let view_ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format,
        subresource_range: full_range(aspect_for(format)),
        ..Default::default()
    };
    device
        .create_image_view(&view_ci, None)
        .during("create_image_view")
}

/// A device-local 2D image with its allocation and a view.
#[derive(Clone, Copy, Debug)]
pub struct GpuImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl GpuImage {
    pub unsafe fn new(
        ctx: &DeviceContext,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VkResult<Self> {
        let d = &ctx.device;
        let img_ci = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format,
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let image = d.create_image(&img_ci, None).during("create_image")?;
        let mut out = Self {
            image,
            memory: vk::DeviceMemory::null(),
            view: vk::ImageView::null(),
            format,
            extent,
        };

        let req = d.get_image_memory_requirements(image);
        let memory_type_index =
            match ctx.memory_type(req.memory_type_bits, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
                Ok(i) => i,
                Err(e) => {
                    out.destroy(d);
                    return Err(e);
                }
            };
        let alloc = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index,
            ..Default::default()
        };
        out.memory = match d.allocate_memory(&alloc, None) {
            Ok(m) => m,
            Err(e) => {
                out.destroy(d);
                return Err(e).during("allocate_memory");
            }
        };
        if let Err(e) = d.bind_image_memory(image, out.memory, 0) {
            out.destroy(d);
            return Err(e).during("bind_image_memory");
        }
        out.view = match create_image_view(d, image, format) {
            Ok(v) => v,
            Err(e) => {
                out.destroy(d);
                return Err(e);
            }
        };
        Ok(out)
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.view != vk::ImageView::null() {
            device.destroy_image_view(self.view, None);
            self.view = vk::ImageView::null();
        }
        if self.image != vk::Image::null() {
            device.destroy_image(self.image, None);
            self.image = vk::Image::null();
        }
        if self.memory != vk::DeviceMemory::null() {
            device.free_memory(self.memory, None);
            self.memory = vk::DeviceMemory::null();
        }
    }
}

/// Records and submits a single layout transition barrier.
pub unsafe fn transition_image_layout(
    ctx: &DeviceContext,
    image: vk::Image,
    format: vk::Format,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> VkResult<()> {
    let masks = transition_masks(old, new)?;
    let cmd = begin_one_time(ctx)?;
    let barrier = vk::ImageMemoryBarrier {
        s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
        src_access_mask: masks.src_access,
        dst_access_mask: masks.dst_access,
        old_layout: old,
        new_layout: new,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: full_range(aspect_for(format)),
        ..Default::default()
    };
    ctx.device.cmd_pipeline_barrier(
        cmd,
        masks.src_stage,
        masks.dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        std::slice::from_ref(&barrier),
    );
    submit_one_time(ctx, cmd)
}

/// Depth attachment sized to the swapchain, ready for the first render pass.
pub unsafe fn create_depth_buffer(ctx: &DeviceContext, extent: vk::Extent2D) -> VkResult<GpuImage> {
    let mut depth = GpuImage::new(
        ctx,
        extent,
        DEPTH_FORMAT,
        vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
    )?;
    if let Err(e) = transition_image_layout(
        ctx,
        depth.image,
        DEPTH_FORMAT,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    ) {
        depth.destroy(&ctx.device);
        return Err(e);
    }
    Ok(depth)
}

/// Uploads RGBA8 pixels into a sampled image left in `SHADER_READ_ONLY_OPTIMAL`.
pub unsafe fn upload_texture(ctx: &DeviceContext, texture: &Texture) -> VkResult<GpuImage> {
    let extent = vk::Extent2D {
        width: texture.width,
        height: texture.height,
    };
    let size: vk::DeviceSize = texture.byte_size();
    let mut staging = GpuBuffer::host_visible(ctx, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
    let result = (|| -> VkResult<GpuImage> {
        staging.write(&ctx.device, &texture.pixels)?;
        let mut image = GpuImage::new(
            ctx,
            extent,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;
        if let Err(e) = fill_texture(ctx, &image, staging.buffer) {
            image.destroy(&ctx.device);
            return Err(e);
        }
        Ok(image)
    })();
    staging.destroy(&ctx.device);
    if result.is_ok() {
        debug!("texture uploaded ({}x{})", extent.width, extent.height);
    }
    result
}

unsafe fn fill_texture(ctx: &DeviceContext, image: &GpuImage, staging: vk::Buffer) -> VkResult<()> {
    transition_image_layout(
        ctx,
        image.image,
        image.format,
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?;

    let cmd = begin_one_time(ctx)?;
    let region = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: image.extent.width,
            height: image.extent.height,
            depth: 1,
        },
    };
    ctx.device.cmd_copy_buffer_to_image(
        cmd,
        staging,
        image.image,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        std::slice::from_ref(&region),
    );
    submit_one_time(ctx, cmd)?;

    transition_image_layout(
        ctx,
        image.image,
        image.format,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )
}

/// Linear, repeating sampler. Anisotropy is used when the device enabled it.
pub unsafe fn create_sampler(ctx: &DeviceContext) -> VkResult<vk::Sampler> {
    let (anisotropy_enable, max_anisotropy) = if ctx.anisotropy {
        (vk::TRUE, ctx.max_anisotropy.clamp(1.0, 16.0))
    } else {
        (vk::FALSE, 1.0)
    };
    let ci = vk::SamplerCreateInfo {
        s_type: vk::StructureType::SAMPLER_CREATE_INFO,
        mag_filter: vk::Filter::LINEAR,
        min_filter: vk::Filter::LINEAR,
        mipmap_mode: vk::SamplerMipmapMode::LINEAR,
        address_mode_u: vk::SamplerAddressMode::REPEAT,
        address_mode_v: vk::SamplerAddressMode::REPEAT,
        address_mode_w: vk::SamplerAddressMode::REPEAT,
        anisotropy_enable,
        max_anisotropy,
        compare_enable: vk::FALSE,
        compare_op: vk::CompareOp::ALWAYS,
        min_lod: 0.0,
        max_lod: 0.0,
        border_color: vk::BorderColor::INT_OPAQUE_BLACK,
        unnormalized_coordinates: vk::FALSE,
        ..Default::default()
    };
    ctx.device
        .create_sampler(&ci, None)
        .during("create_sampler")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_to_transfer_dst() {
        let m = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(m.src_access, vk::AccessFlags::empty());
        assert_eq!(m.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(m.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(m.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_transition_to_shader_read() {
        let m = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(m.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(m.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_transition_to_depth_attachment() {
        let m = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )
        .unwrap();
        assert!(m
            .dst_access
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert_eq!(m.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn test_unsupported_transition() {
        let err = transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::UNDEFINED,
        )
        .unwrap_err();
        assert!(matches!(err, VkError::UnsupportedTransition(..)));
    }

    #[test]
    fn test_aspect_for_formats() {
        assert_eq!(aspect_for(DEPTH_FORMAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(aspect_for(TEXTURE_FORMAT), vk::ImageAspectFlags::COLOR);
        assert!(aspect_for(vk::Format::D24_UNORM_S8_UINT).contains(vk::ImageAspectFlags::STENCIL));
    }
}
