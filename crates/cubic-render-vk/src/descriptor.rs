// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{ApiResultExt, VkResult};

pub const UNIFORM_BINDING: u32 = 0;
pub const SAMPLER_BINDING: u32 = 1;

/// Layout bindings for the single descriptor set the pipeline uses.
pub fn set_layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        vk::DescriptorSetLayoutBinding {
            binding: UNIFORM_BINDING,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
            ..Default::default()
        },
        vk::DescriptorSetLayoutBinding {
            binding: SAMPLER_BINDING,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            ..Default::default()
        },
    ]
}

pub unsafe fn create_set_layout(device: &ash::Device) -> VkResult<vk::DescriptorSetLayout> {
    let bindings = set_layout_bindings();
    let ci = vk::DescriptorSetLayoutCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
        binding_count: bindings.len() as u32,
        p_bindings: bindings.as_ptr(),
        ..Default::default()
    };
    device
        .create_descriptor_set_layout(&ci, None)
        .during("create_descriptor_set_layout")
}

/// Pool sized for exactly one set of the layout above.
pub unsafe fn create_pool(device: &ash::Device) -> VkResult<vk::DescriptorPool> {
    let sizes = [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
        },
    ];
    let ci = vk::DescriptorPoolCreateInfo {
        s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
        max_sets: 1,
        pool_size_count: sizes.len() as u32,
        p_pool_sizes: sizes.as_ptr(),
        ..Default::default()
    };
    device
        .create_descriptor_pool(&ci, None)
        .during("create_descriptor_pool")
}

/// Allocates the set and points it at the uniform buffer and texture.
pub unsafe fn allocate_and_write_set(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
    uniform: vk::Buffer,
    uniform_size: vk::DeviceSize,
    texture_view: vk::ImageView,
    sampler: vk::Sampler,
) -> VkResult<vk::DescriptorSet> {
    let ai = vk::DescriptorSetAllocateInfo {
        s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
        descriptor_pool: pool,
        descriptor_set_count: 1,
        p_set_layouts: &layout,
        ..Default::default()
    };
    let set = device
        .allocate_descriptor_sets(&ai)
        .during("allocate_descriptor_sets")?[0];

    let buffer_info = vk::DescriptorBufferInfo {
        buffer: uniform,
        offset: 0,
        range: uniform_size,
    };
    let image_info = vk::DescriptorImageInfo {
        sampler,
        image_view: texture_view,
        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    };
    let writes = [
        vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: set,
            dst_binding: UNIFORM_BINDING,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            p_buffer_info: &buffer_info,
            ..Default::default()
        },
        vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: set,
            dst_binding: SAMPLER_BINDING,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            p_image_info: &image_info,
            ..Default::default()
        },
    ];
    device.update_descriptor_sets(&writes, &[]);
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_match_shader_interface() {
        let [ubo, sampler] = set_layout_bindings();
        assert_eq!(ubo.binding, 0);
        assert_eq!(ubo.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(ubo.stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(sampler.binding, 1);
        assert_eq!(
            sampler.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(sampler.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }
}
