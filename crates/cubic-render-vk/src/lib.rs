// SPDX-License-Identifier: CEPL-1.0
//! Vulkan backend: device context, swapchain manager, pipeline builder,
//! command recorder and frame presenter, tied together by [`VkRenderer`].

use anyhow::{Context, Result};
use ash::vk;
use cubic_core::time::FrameClock;
use cubic_math::{aspect_ratio, UniformBufferObject};
use cubic_render::{RenderSettings, RenderSize, Renderer, Scene};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::{debug, info, warn};

pub mod commands;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod frame;
pub mod image;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod resources;
pub mod shader;
pub mod swapchain;

pub use device::{DeviceContext, NOT_FOUND};
pub use error::{ErrorKind, VkError, VkResult};
pub use frame::FrameStatus;
pub use instance::{AppInfo, VkInstance};
pub use shader::{default_shader_dir, resolve_shader_dir, ShaderError, ShaderPair};

use commands::{allocate_command_buffers, free_command_buffers, record_command_buffers, RecordInfo};
use error::ApiResultExt;
use pipeline::PipelineState;
use resources::SceneResources;
use swapchain::{usable_extent, SwapchainState};

pub struct VkRenderer {
    instance: VkInstance,
    surface: vk::SurfaceKHR,
    ctx: DeviceContext,

    scene: Option<SceneResources>,
    shaders: ShaderPair,

    chain: Option<SwapchainState>,
    pipeline: Option<PipelineState>,
    cmd_bufs: Vec<vk::CommandBuffer>,

    size: RenderSize,
    clear_color: [f32; 4],
    depth: bool,
    paused: bool,
    clock: FrameClock,
}

// STRICT TEARDOWN ORDER:
// - device_wait_idle()
// - framebuffers, command buffers, pipeline + layout, render pass,
//   depth + image views, swapchain
// - descriptors, sampler, texture, uniform/index/vertex buffers
// - command pool, device
// - surface, debug messenger, instance
impl Drop for VkRenderer {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.ctx.wait_idle() {
                warn!("device_wait_idle during teardown: {e}");
            }
            self.destroy_swapchain_scoped(true);
            if let Some(mut scene) = self.scene.take() {
                scene.destroy(&self.ctx.device);
            }
            self.ctx.destroy();
            self.instance.destroy_surface(self.surface);
            self.instance.destroy();
        }
        debug!("Vulkan renderer destroyed");
    }
}

impl VkRenderer {
    /// Builds the renderer on an existing surface, taking ownership of both
    /// `instance` and `surface`. They are released on failure too.
    ///
    /// A zero-sized `size` starts the renderer paused; the first non-empty
    /// [`VkRenderer::recreate_swapchain`] brings up the swapchain.
    ///
    /// # Safety
    /// `surface` must have been created from `instance` and its window must
    /// outlive the renderer.
    pub unsafe fn from_surface(
        mut instance: VkInstance,
        surface: vk::SurfaceKHR,
        size: RenderSize,
        settings: &RenderSettings,
        scene: &Scene,
    ) -> VkResult<Self> {
        let prepared = ShaderPair::load(&resolve_shader_dir(settings.shader_dir.as_deref()))
            .map_err(VkError::from)
            .and_then(|shaders| DeviceContext::new(&instance, surface).map(|ctx| (shaders, ctx)));
        let (shaders, ctx) = match prepared {
            Ok(v) => v,
            Err(e) => {
                instance.destroy_surface(surface);
                instance.destroy();
                return Err(e);
            }
        };

        let mut r = VkRenderer {
            instance,
            surface,
            ctx,
            scene: None,
            shaders,
            chain: None,
            pipeline: None,
            cmd_bufs: Vec::new(),
            size,
            clear_color: settings.clear_color,
            depth: settings.depth,
            paused: true,
            clock: FrameClock::start(),
        };
        r.scene = Some(SceneResources::new(&r.ctx, scene)?);
        r.recreate_swapchain(size)?;
        Ok(r)
    }

    /// Tears down everything sized by the swapchain and builds it again for
    /// `size`, passing the old swapchain as a recycling hint.
    ///
    /// An empty size, or a surface that currently reports 0x0, pauses
    /// rendering and keeps the current chain.
    pub fn recreate_swapchain(&mut self, size: RenderSize) -> VkResult<()> {
        self.size = size;
        if size.is_empty() {
            self.pause("zero-sized window");
            return Ok(());
        }
        let caps = unsafe {
            self.instance
                .surface_loader
                .get_physical_device_surface_capabilities(self.ctx.physical_device, self.surface)
        }
        .during("get_physical_device_surface_capabilities")?;
        if usable_extent(&caps, size.width, size.height).is_none() {
            self.pause("zero-sized surface");
            return Ok(());
        }

        self.ctx.wait_idle()?;
        unsafe {
            let old = self.destroy_swapchain_scoped(false);
            let built = self.build_swapchain_scoped(size, old);
            if old != vk::SwapchainKHR::null() {
                self.ctx.swapchain_loader.destroy_swapchain(old, None);
            }
            match built {
                Ok(()) => {}
                // surface shrank to 0x0 between the query and the build
                Err(VkError::EmptyExtent) => {
                    self.destroy_swapchain_scoped(true);
                    self.pause("zero-sized surface");
                    return Ok(());
                }
                Err(e) => {
                    self.destroy_swapchain_scoped(true);
                    return Err(e);
                }
            }
        }
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self, reason: &str) {
        if !self.paused {
            debug!("{reason}, pausing");
        }
        self.paused = true;
    }

    /// Destroys swapchain-scoped objects in dependency order. The swapchain
    /// handle itself is destroyed only with `release`; otherwise it is
    /// returned for reuse as `old_swapchain`.
    unsafe fn destroy_swapchain_scoped(&mut self, release: bool) -> vk::SwapchainKHR {
        let d = &self.ctx.device;
        if let Some(chain) = self.chain.as_mut() {
            chain.destroy_framebuffers(d);
        }
        free_command_buffers(d, self.ctx.command_pool, &mut self.cmd_bufs);
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.destroy(d);
        }
        let Some(mut chain) = self.chain.take() else {
            return vk::SwapchainKHR::null();
        };
        chain.destroy_attachments(d);
        if release {
            chain.destroy(&self.ctx);
            vk::SwapchainKHR::null()
        } else {
            chain.retire()
        }
    }

    unsafe fn build_swapchain_scoped(
        &mut self,
        size: RenderSize,
        old: vk::SwapchainKHR,
    ) -> VkResult<()> {
        let chain = SwapchainState::new(
            &self.ctx,
            &self.instance.surface_loader,
            self.surface,
            size.width,
            size.height,
            self.depth,
            old,
        )?;
        let render_pass = chain.render_pass;
        let extent = chain.extent;
        let framebuffer_count = chain.framebuffers.len();
        self.chain = Some(chain);

        let set_layout = self
            .scene
            .as_ref()
            .map_or(vk::DescriptorSetLayout::null(), |s| s.set_layout);
        self.pipeline = Some(PipelineState::new(
            &self.ctx.device,
            &self.shaders,
            render_pass,
            extent,
            set_layout,
            self.depth,
        )?);

        self.cmd_bufs =
            allocate_command_buffers(&self.ctx.device, self.ctx.command_pool, framebuffer_count)?;
        self.record_commands()
    }

    fn record_commands(&self) -> VkResult<()> {
        let (Some(chain), Some(pipeline), Some(scene)) =
            (self.chain.as_ref(), self.pipeline.as_ref(), self.scene.as_ref())
        else {
            return Ok(());
        };
        let info = RecordInfo {
            render_pass: chain.render_pass,
            framebuffers: &chain.framebuffers,
            extent: chain.extent,
            pipeline: pipeline.pipeline,
            pipeline_layout: pipeline.layout,
            descriptor_set: Some(scene.descriptor_set),
            vertex_buffer: scene.vertex_buffer.buffer,
            vertex_count: scene.vertex_count,
            index: scene.index_binding(),
            clear_color: self.clear_color,
            has_depth: chain.depth.is_some(),
        };
        unsafe { record_command_buffers(&self.ctx.device, &self.cmd_bufs, &info) }
    }

    /// Updates the uniforms, draws one frame and rebuilds the swapchain when
    /// the presentation engine reports it stale.
    pub fn draw(&mut self) -> VkResult<FrameStatus> {
        // paused by the surface rather than the window: retry until it has a size
        if self.paused && !self.size.is_empty() {
            self.recreate_swapchain(self.size)?;
        }
        let Some(chain) = self.chain.as_ref().filter(|_| !self.paused) else {
            return Ok(FrameStatus::Presented);
        };
        let swapchain = chain.swapchain;
        let aspect = aspect_ratio(chain.extent.width, chain.extent.height);

        let status = unsafe {
            if let Some(scene) = &self.scene {
                let ubo = UniformBufferObject::spinning(self.clock.elapsed_seconds(), aspect);
                scene.update_uniforms(&self.ctx.device, &ubo)?;
            }
            frame::draw_frame(&self.ctx, swapchain, &self.cmd_bufs)?
        };

        if status.needs_rebuild() {
            debug!("frame status {:?}, rebuilding swapchain", status);
            self.recreate_swapchain(self.size)?;
        }
        Ok(status)
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.chain.as_ref().map(|c| c.extent)
    }

    pub fn image_count(&self) -> usize {
        self.chain.as_ref().map_or(0, |c| c.image_count())
    }

    pub fn image_view_count(&self) -> usize {
        self.chain.as_ref().map_or(0, |c| c.image_views.len())
    }

    pub fn framebuffer_count(&self) -> usize {
        self.chain.as_ref().map_or(0, |c| c.framebuffers.len())
    }

    pub fn command_buffer_count(&self) -> usize {
        self.cmd_bufs.len()
    }

    pub fn device_context(&self) -> &DeviceContext {
        &self.ctx
    }
}

impl Renderer for VkRenderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        scene: &Scene,
    ) -> Result<Self> {
        let dh = display.display_handle()?.as_raw();
        let wh = window.window_handle()?.as_raw();

        let mut instance = VkInstance::for_display(&AppInfo::default(), dh)
            .context("create Vulkan instance")?;
        let r = unsafe {
            let surface = match instance.create_surface(dh, wh) {
                Ok(s) => s,
                Err(e) => {
                    instance.destroy();
                    return Err(e).context("create window surface");
                }
            };
            VkRenderer::from_surface(instance, surface, size, settings, scene)
                .context("initialise Vulkan renderer")?
        };

        match r.extent() {
            Some(extent) => info!(
                "Vulkan swapchain ready ({}x{}, {} images)",
                extent.width,
                extent.height,
                r.image_count()
            ),
            None => info!("Vulkan renderer ready, waiting for a non-zero surface"),
        }
        Ok(r)
    }

    fn resize(&mut self, size: RenderSize) -> Result<()> {
        self.recreate_swapchain(size)
            .with_context(|| format!("recreate swapchain at {}x{}", size.width, size.height))
    }

    fn render(&mut self) -> Result<()> {
        self.draw().context("draw frame")?;
        Ok(())
    }

    fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.clear_color = rgba;
        if self.cmd_bufs.is_empty() {
            return;
        }
        let rerecorded = self.ctx.wait_idle().and_then(|_| self.record_commands());
        if let Err(e) = rerecorded {
            warn!("re-recording after clear color change failed: {e}");
        }
    }
}
