// SPDX-License-Identifier: CEPL-1.0
//! Physical device and queue family selection, plus the logical device that
//! owns every other GPU object in this crate.

use ash::khr::{surface, swapchain};
use ash::vk;
use std::ffi::c_char;
use tracing::{debug, info, warn};

use crate::error::{ApiResultExt, VkError, VkResult};
use crate::instance::VkInstance;

/// Returned by the selection helpers when nothing qualifies.
pub const NOT_FOUND: u32 = u32::MAX;

/// First enumerated device, or a null handle when there is none.
pub fn select_physical_device(devices: &[vk::PhysicalDevice]) -> vk::PhysicalDevice {
    devices
        .first()
        .copied()
        .unwrap_or_else(vk::PhysicalDevice::null)
}

pub fn find_graphics_queue_family_index(props: &[vk::QueueFamilyProperties]) -> u32 {
    props
        .iter()
        .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map_or(NOT_FOUND, |i| i as u32)
}

/// Smallest family index that can both draw and present.
///
/// `support[i]` is the surface support of family `i`; a length mismatch
/// yields [`NOT_FOUND`].
pub fn find_graphics_and_presentation_queue_family_index(
    props: &[vk::QueueFamilyProperties],
    support: &[bool],
) -> u32 {
    if props.len() != support.len() {
        return NOT_FOUND;
    }
    props
        .iter()
        .zip(support)
        .position(|(p, &present)| present && p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map_or(NOT_FOUND, |i| i as u32)
}

/// Per-family surface support. A failed query counts as unsupported.
///
/// # Safety
/// `phys` and `surface` must belong to the instance behind `loader`.
pub unsafe fn presentation_support(
    loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    family_count: usize,
) -> Vec<bool> {
    (0..family_count as u32)
        .map(|i| {
            loader
                .get_physical_device_surface_support(phys, i, surface)
                .unwrap_or(false)
        })
        .collect()
}

pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> u32 {
    let count = props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .unwrap_or(NOT_FOUND)
}

/// Everything created once per run: the chosen adapter, the logical device,
/// its single queue and the command pool all command buffers come from.
pub struct DeviceContext {
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub queue_family: u32,
    pub queue: vk::Queue,
    pub command_pool: vk::CommandPool,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub swapchain_loader: swapchain::Device,
    pub anisotropy: bool,
    pub max_anisotropy: f32,
}

impl DeviceContext {
    /// # Safety
    /// `surface` must be a live surface of `instance`.
    pub unsafe fn new(instance: &VkInstance, surface: vk::SurfaceKHR) -> VkResult<Self> {
        let inst = &instance.instance;
        let devices = inst
            .enumerate_physical_devices()
            .during("enumerate_physical_devices")?;
        let phys = select_physical_device(&devices);
        if phys == vk::PhysicalDevice::null() {
            return Err(VkError::NoSuitableDevice);
        }

        let families = inst.get_physical_device_queue_family_properties(phys);
        let support = presentation_support(&instance.surface_loader, phys, surface, families.len());
        let queue_family = find_graphics_and_presentation_queue_family_index(&families, &support);
        if queue_family == NOT_FOUND {
            if find_graphics_queue_family_index(&families) != NOT_FOUND {
                warn!("device has graphics queues but none can present to this surface");
            }
            return Err(VkError::NoSuitableDevice);
        }

        let props = inst.get_physical_device_properties(phys);
        let features = inst.get_physical_device_features(phys);
        let anisotropy = features.sampler_anisotropy == vk::TRUE;

        let priorities = [1.0_f32];
        let qinfo = vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: queue_family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        };
        let enabled = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: features.sampler_anisotropy,
            ..Default::default()
        };
        let device_exts: [*const c_char; 1] = [swapchain::NAME.as_ptr()];
        let dinfo = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: 1,
            p_queue_create_infos: &qinfo,
            enabled_extension_count: device_exts.len() as u32,
            pp_enabled_extension_names: device_exts.as_ptr(),
            p_enabled_features: &enabled,
            ..Default::default()
        };
        let device = inst
            .create_device(phys, &dinfo, None)
            .during("create_device")?;
        let queue = device.get_device_queue(queue_family, 0);

        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let command_pool = match device.create_command_pool(&pool_info, None) {
            Ok(pool) => pool,
            Err(e) => {
                device.destroy_device(None);
                return Err(VkError::Api {
                    what: "create_command_pool",
                    result: e,
                });
            }
        };

        let swapchain_loader = swapchain::Device::new(inst, &device);
        let memory_properties = inst.get_physical_device_memory_properties(phys);

        let name = props
            .device_name_as_c_str()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(
            "Vulkan device: {} (queue family {}, anisotropy={})",
            name, queue_family, anisotropy
        );
        debug!("{} memory types", memory_properties.memory_type_count);

        Ok(Self {
            physical_device: phys,
            device,
            queue_family,
            queue,
            command_pool,
            memory_properties,
            swapchain_loader,
            anisotropy,
            max_anisotropy: props.limits.max_sampler_anisotropy,
        })
    }

    pub fn memory_type(&self, type_bits: u32, required: vk::MemoryPropertyFlags) -> VkResult<u32> {
        match find_memory_type(&self.memory_properties, type_bits, required) {
            NOT_FOUND => Err(VkError::NoMemoryType(required)),
            i => Ok(i),
        }
    }

    pub fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }.during("device_wait_idle")
    }

    /// # Safety
    /// The device must be idle and every child object already destroyed.
    pub unsafe fn destroy(&mut self) {
        self.device.destroy_command_pool(self.command_pool, None);
        self.command_pool = vk::CommandPool::null();
        self.device.destroy_device(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn memory(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    #[test]
    fn test_present_and_graphics_picks_smallest_qualifying() {
        let props = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let support = [false, true, false, true];
        assert_eq!(
            find_graphics_and_presentation_queue_family_index(&props, &support),
            3
        );
        assert_eq!(
            find_graphics_and_presentation_queue_family_index(&props, &[true; 4]),
            2
        );
    }

    #[test]
    fn test_present_and_graphics_length_mismatch() {
        let props = [family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(
            find_graphics_and_presentation_queue_family_index(&props, &[true, true]),
            NOT_FOUND
        );
        assert_eq!(
            find_graphics_and_presentation_queue_family_index(&props, &[]),
            NOT_FOUND
        );
    }

    #[test]
    fn test_present_and_graphics_none_qualifies() {
        let props = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        assert_eq!(
            find_graphics_and_presentation_queue_family_index(&props, &[false, true]),
            NOT_FOUND
        );
        assert_eq!(
            find_graphics_and_presentation_queue_family_index(&[], &[]),
            NOT_FOUND
        );
    }

    #[test]
    fn test_graphics_only_selection() {
        let props = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        assert_eq!(find_graphics_queue_family_index(&props), 1);
        assert_eq!(
            find_graphics_queue_family_index(&[family(vk::QueueFlags::COMPUTE)]),
            NOT_FOUND
        );
    }

    #[test]
    fn test_select_physical_device() {
        assert_eq!(select_physical_device(&[]), vk::PhysicalDevice::null());
        let a = vk::PhysicalDevice::from_raw(0x10);
        let b = vk::PhysicalDevice::from_raw(0x20);
        assert_eq!(select_physical_device(&[a, b]), a);
    }

    #[test]
    fn test_find_memory_type() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host,
            vk::MemoryPropertyFlags::DEVICE_LOCAL | host,
        ]);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            0
        );
        assert_eq!(find_memory_type(&props, 0b111, host), 1);
        // bit 1 masked out, so the combined type is the first host-visible match
        assert_eq!(find_memory_type(&props, 0b101, host), 2);
        assert_eq!(
            find_memory_type(&props, 0b001, vk::MemoryPropertyFlags::HOST_VISIBLE),
            NOT_FOUND
        );
        assert_eq!(
            find_memory_type(&props, 0, vk::MemoryPropertyFlags::empty()),
            NOT_FOUND
        );
    }

    #[test]
    fn test_find_memory_type_ignores_bits_past_count() {
        let props = memory(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        assert_eq!(
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::empty()),
            NOT_FOUND
        );
        assert_eq!(
            find_memory_type(&memory(&[]), u32::MAX, vk::MemoryPropertyFlags::empty()),
            NOT_FOUND
        );
    }
}
