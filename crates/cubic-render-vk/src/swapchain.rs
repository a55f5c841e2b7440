// SPDX-License-Identifier: CEPL-1.0
//! Swapchain plus everything sized or formatted by it: image views, the
//! optional depth buffer, the render pass and one framebuffer per image.

use ash::khr::surface;
use ash::vk;
use tracing::{debug, info};

use crate::device::DeviceContext;
use crate::error::{ApiResultExt, VkError, VkResult};
use crate::image::{create_depth_buffer, create_image_view, GpuImage, DEPTH_FORMAT};
use crate::pipeline::create_render_pass;

/// Picks the swapchain extent.
///
/// When the surface reports a definite `current_extent`, that wins and the
/// proposed `width`/`height` are overwritten with it. An undefined extent
/// (`u32::MAX`) leaves the proposal untouched and returns it as-is.
pub fn select_swapchain_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    width: &mut u32,
    height: &mut u32,
) -> vk::Extent2D {
    if caps.current_extent.width == u32::MAX {
        return vk::Extent2D {
            width: *width,
            height: *height,
        };
    }
    *width = caps.current_extent.width;
    *height = caps.current_extent.height;
    caps.current_extent
}

/// The extent a swapchain would get, or `None` while the surface is 0x0
/// (minimised). A swapchain must never be created with an empty extent.
pub fn usable_extent(
    caps: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> Option<vk::Extent2D> {
    let (mut w, mut h) = (width, height);
    let extent = select_swapchain_extent(caps, &mut w, &mut h);
    (extent.width != 0 && extent.height != 0).then_some(extent)
}

/// A lone `UNDEFINED` entry means the surface has no preference.
pub fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    match formats {
        [] => None,
        [only] if only.format == vk::Format::UNDEFINED => Some(vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }),
        [first, ..] => Some(*first),
    }
}

/// One more than the minimum, capped by the maximum (0 == no maximum).
pub fn select_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    if caps.max_image_count == 0 {
        caps.min_image_count + 1
    } else {
        (caps.min_image_count + 1).min(caps.max_image_count)
    }
}

fn select_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::INHERIT,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ]
    .into_iter()
    .find(|&a| supported.contains(a))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

pub struct SwapchainState {
    pub swapchain: vk::SwapchainKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    /// Owned by the swapchain, never destroyed directly.
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub depth: Option<GpuImage>,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainState {
    /// Builds the whole chain for `width` x `height`.
    ///
    /// `old_swapchain` is handed to the driver as a recycling hint; the caller
    /// still owns it and releases it once this returns.
    ///
    /// # Safety
    /// `surface` must be live and `ctx` must have been created for it.
    pub unsafe fn new(
        ctx: &DeviceContext,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        with_depth: bool,
        old_swapchain: vk::SwapchainKHR,
    ) -> VkResult<Self> {
        let phys = ctx.physical_device;
        let caps = surface_loader
            .get_physical_device_surface_capabilities(phys, surface)
            .during("get_physical_device_surface_capabilities")?;
        let formats = surface_loader
            .get_physical_device_surface_formats(phys, surface)
            .during("get_physical_device_surface_formats")?;

        let surface_format = select_surface_format(&formats).ok_or(VkError::NoSurfaceFormat)?;
        let extent = usable_extent(&caps, width, height).ok_or(VkError::EmptyExtent)?;
        let min_image_count = select_image_count(&caps);

        let pre_transform = if caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            caps.current_transform
        };

        let swap_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface,
            min_image_count,
            image_format: surface_format.format,
            image_color_space: surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: vk::SharingMode::EXCLUSIVE,
            pre_transform,
            composite_alpha: select_composite_alpha(caps.supported_composite_alpha),
            present_mode: vk::PresentModeKHR::FIFO,
            clipped: vk::TRUE,
            old_swapchain,
            ..Default::default()
        };

        let loader = &ctx.swapchain_loader;
        let swapchain = loader
            .create_swapchain(&swap_info, None)
            .during("create_swapchain")?;

        let mut state = Self {
            swapchain,
            surface_format,
            extent,
            images: Vec::new(),
            image_views: Vec::new(),
            depth: None,
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
        };
        if let Err(e) = state.build_attachments(ctx, with_depth) {
            state.destroy(ctx);
            return Err(e);
        }

        info!(
            "swapchain: {:?} / {:?}, extent {}x{}, images {} (min {}), depth={}",
            surface_format.format,
            surface_format.color_space,
            extent.width,
            extent.height,
            state.images.len(),
            caps.min_image_count,
            with_depth
        );
        Ok(state)
    }

    unsafe fn build_attachments(&mut self, ctx: &DeviceContext, with_depth: bool) -> VkResult<()> {
        let d = &ctx.device;
        self.images = ctx
            .swapchain_loader
            .get_swapchain_images(self.swapchain)
            .during("get_swapchain_images")?;

        self.image_views.reserve(self.images.len());
        for &image in &self.images {
            self.image_views
                .push(create_image_view(d, image, self.surface_format.format)?);
        }

        if with_depth {
            self.depth = Some(create_depth_buffer(ctx, self.extent)?);
        }

        self.render_pass = create_render_pass(
            d,
            self.surface_format.format,
            self.depth.map(|_| DEPTH_FORMAT),
        )?;

        self.framebuffers.reserve(self.image_views.len());
        for &view in &self.image_views {
            let mut attachments = vec![view];
            if let Some(depth) = &self.depth {
                attachments.push(depth.view);
            }
            let fb_info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass: self.render_pass,
                attachment_count: attachments.len() as u32,
                p_attachments: attachments.as_ptr(),
                width: self.extent.width,
                height: self.extent.height,
                layers: 1,
                ..Default::default()
            };
            self.framebuffers
                .push(d.create_framebuffer(&fb_info, None).during("create_framebuffer")?);
        }
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub unsafe fn destroy_framebuffers(&mut self, device: &ash::Device) {
        for fb in self.framebuffers.drain(..) {
            device.destroy_framebuffer(fb, None);
        }
    }

    /// Render pass, depth buffer and image views. The swapchain itself stays.
    pub unsafe fn destroy_attachments(&mut self, device: &ash::Device) {
        if self.render_pass != vk::RenderPass::null() {
            device.destroy_render_pass(self.render_pass, None);
            self.render_pass = vk::RenderPass::null();
        }
        if let Some(mut depth) = self.depth.take() {
            depth.destroy(device);
        }
        for view in self.image_views.drain(..) {
            device.destroy_image_view(view, None);
        }
        self.images.clear();
    }

    /// Hands out the swapchain handle so it can serve as `old_swapchain`.
    pub fn retire(&mut self) -> vk::SwapchainKHR {
        std::mem::replace(&mut self.swapchain, vk::SwapchainKHR::null())
    }

    /// # Safety
    /// The device must be idle.
    pub unsafe fn destroy(&mut self, ctx: &DeviceContext) {
        self.destroy_framebuffers(&ctx.device);
        self.destroy_attachments(&ctx.device);
        let old = self.retire();
        if old != vk::SwapchainKHR::null() {
            ctx.swapchain_loader.destroy_swapchain(old, None);
            debug!("swapchain destroyed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_adopts_current() {
        let (mut w, mut h) = (0, 0);
        let extent = select_swapchain_extent(&caps((1, 2)), &mut w, &mut h);
        assert_eq!((extent.width, extent.height), (1, 2));
        assert_eq!((w, h), (1, 2));
    }

    #[test]
    fn test_extent_undefined_keeps_proposal() {
        let (mut w, mut h) = (1, 2);
        let extent = select_swapchain_extent(&caps((u32::MAX, u32::MAX)), &mut w, &mut h);
        assert_eq!((extent.width, extent.height), (1, 2));
        assert_eq!((w, h), (1, 2));
    }

    #[test]
    fn test_extent_is_not_clamped() {
        let mut c = caps((u32::MAX, u32::MAX));
        c.max_image_extent = vk::Extent2D {
            width: 100,
            height: 100,
        };
        let (mut w, mut h) = (640, 480);
        let extent = select_swapchain_extent(&c, &mut w, &mut h);
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    #[test]
    fn test_usable_extent_rejects_zero_sized_surface() {
        assert!(usable_extent(&caps((0, 0)), 640, 480).is_none());
        assert!(usable_extent(&caps((0, 480)), 640, 480).is_none());
    }

    #[test]
    fn test_usable_extent_rejects_zero_proposal_on_undefined_surface() {
        assert!(usable_extent(&caps((u32::MAX, u32::MAX)), 0, 480).is_none());
    }

    #[test]
    fn test_usable_extent_passes_real_sizes() {
        let e = usable_extent(&caps((800, 600)), 640, 480).unwrap();
        assert_eq!((e.width, e.height), (800, 600));
        let e = usable_extent(&caps((u32::MAX, u32::MAX)), 640, 480).unwrap();
        assert_eq!((e.width, e.height), (640, 480));
    }

    #[test]
    fn test_surface_format_undefined_means_any() {
        let f = select_surface_format(&[vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }])
        .unwrap();
        assert_eq!(f.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(f.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_surface_format_takes_first() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let f = select_surface_format(&formats).unwrap();
        assert_eq!(f.format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn test_surface_format_empty() {
        assert!(select_surface_format(&[]).is_none());
    }

    #[test]
    fn test_image_count_policy() {
        let mut c = caps((1, 1));
        assert_eq!(select_image_count(&c), 3);
        c.max_image_count = 2;
        assert_eq!(select_image_count(&c), 2);
        c.max_image_count = 8;
        assert_eq!(select_image_count(&c), 3);
    }

    #[test]
    fn test_composite_alpha_prefers_opaque() {
        assert_eq!(
            select_composite_alpha(
                vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT
            ),
            vk::CompositeAlphaFlagsKHR::OPAQUE
        );
        assert_eq!(
            select_composite_alpha(vk::CompositeAlphaFlagsKHR::INHERIT),
            vk::CompositeAlphaFlagsKHR::INHERIT
        );
    }
}
