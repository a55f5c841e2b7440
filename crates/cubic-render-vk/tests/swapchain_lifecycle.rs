// SPDX-License-Identifier: CEPL-1.0
//! Swapchain lifecycle scenarios against a real Vulkan implementation.
//!
//! A headless surface stands in for a window. Every scenario shares one
//! renderer built up front. The run is skipped when the machine has no
//! Vulkan loader, no headless surface support or no suitable device.
//! Shaders are compiled by the build script, so failing to load them is a
//! test failure, not a skip.

use ash::ext::headless_surface;
use ash::khr::surface;
use ash::vk;
use cubic_render::{RenderSettings, RenderSize, Scene};
use cubic_render_vk::{default_shader_dir, AppInfo, ShaderPair, VkError, VkInstance, VkRenderer};

struct GpuContext {
    renderer: VkRenderer,
}

impl GpuContext {
    fn new(size: RenderSize) -> Option<Self> {
        if let Err(e) = ShaderPair::load(&default_shader_dir()) {
            panic!("build script did not produce loadable shaders: {e}");
        }

        let extensions = [surface::NAME.as_ptr(), headless_surface::NAME.as_ptr()];
        let mut instance = match VkInstance::new(&AppInfo::default(), &extensions) {
            Ok(i) => i,
            Err(e) => {
                println!("Skipping GPU tests: {e}");
                return None;
            }
        };

        let ci = vk::HeadlessSurfaceCreateInfoEXT {
            s_type: vk::StructureType::HEADLESS_SURFACE_CREATE_INFO_EXT,
            ..Default::default()
        };
        let loader = headless_surface::Instance::new(instance.entry(), instance.handle());
        let surface = match unsafe { loader.create_headless_surface(&ci, None) } {
            Ok(s) => s,
            Err(e) => {
                println!("Skipping GPU tests: create_headless_surface: {e}");
                unsafe { instance.destroy() };
                return None;
            }
        };

        let settings = RenderSettings::default();
        match unsafe {
            VkRenderer::from_surface(instance, surface, size, &settings, &Scene::default())
        } {
            Ok(renderer) => Some(Self { renderer }),
            Err(VkError::Shader(e)) => panic!("shader load failed: {e}"),
            Err(e) => {
                println!("Skipping GPU tests: {e}");
                None
            }
        }
    }

    fn teardown(self) {
        drop(self.renderer);
    }
}

fn size(width: u32, height: u32) -> RenderSize {
    RenderSize { width, height }
}

fn assert_consistent(r: &VkRenderer) {
    let images = r.image_count();
    assert!(images > 0, "swapchain has no images");
    assert_eq!(r.image_view_count(), images);
    assert_eq!(r.framebuffer_count(), images);
    assert_eq!(r.command_buffer_count(), images);
}

fn smoke(ctx: &mut GpuContext) {
    let r = &ctx.renderer;
    assert!(!r.is_paused());
    assert_consistent(r);
    let extent = r.extent().expect("swapchain after startup");
    assert_eq!((extent.width, extent.height), (500, 500));
}

fn recreate_is_stable(ctx: &mut GpuContext) {
    let r = &mut ctx.renderer;
    r.recreate_swapchain(size(640, 480)).expect("first recreate");
    let first = (
        r.image_count(),
        r.image_view_count(),
        r.framebuffer_count(),
        r.command_buffer_count(),
    );
    r.recreate_swapchain(size(640, 480)).expect("second recreate");
    let second = (
        r.image_count(),
        r.image_view_count(),
        r.framebuffer_count(),
        r.command_buffer_count(),
    );
    assert_eq!(first, second);
    assert_consistent(r);
    let extent = r.extent().expect("extent");
    assert_eq!((extent.width, extent.height), (640, 480));
}

fn renders_frames(ctx: &mut GpuContext) {
    let r = &mut ctx.renderer;
    for _ in 0..5 {
        r.draw().expect("draw frame");
    }
    assert_consistent(r);
}

fn zero_size_pauses(ctx: &mut GpuContext) {
    let r = &mut ctx.renderer;
    r.recreate_swapchain(size(0, 300)).expect("pause");
    assert!(r.is_paused());
    r.draw().expect("draw while paused is a no-op");

    r.recreate_swapchain(size(320, 240)).expect("resume");
    assert!(!r.is_paused());
    assert_consistent(r);
    r.draw().expect("draw after resume");
}

fn clear_color_rerecords(ctx: &mut GpuContext) {
    use cubic_render::Renderer;
    let r = &mut ctx.renderer;
    let before = r.command_buffer_count();
    r.set_clear_color([0.2, 0.3, 0.4, 1.0]);
    assert_eq!(r.command_buffer_count(), before);
    r.draw().expect("draw with new clear color");
}

#[test]
fn test_swapchain_lifecycle() {
    let Some(mut ctx) = GpuContext::new(size(500, 500)) else {
        return;
    };

    smoke(&mut ctx);
    recreate_is_stable(&mut ctx);
    renders_frames(&mut ctx);
    zero_size_pauses(&mut ctx);
    clear_color_rerecords(&mut ctx);

    ctx.teardown();
}
