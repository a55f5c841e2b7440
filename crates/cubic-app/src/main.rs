// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use cubic_core::init_tracing;
use cubic_platform::{is_degenerate, surface_size, window_attributes};
use cubic_render::{RenderSettings, RenderSize, Renderer, Scene, Texture};
use cubic_render_vk::{ErrorKind, VkError, VkRenderer};
use std::path::PathBuf;
use tracing::{error, info};

use cubic_platform::winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

mod config;

use config::{load_cfg, AppCfg};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to read
    #[arg(long, default_value = "cubic.toml")]
    config: PathBuf,

    /// Directory holding vert.spv and frag.spv
    #[arg(long)]
    shaders: Option<PathBuf>,
}

struct App {
    cfg: AppCfg,
    shader_dir: Option<PathBuf>,
    // Declared before `window` so the surface goes before its window.
    renderer: Option<VkRenderer>,
    window: Option<Window>,
    render_size: RenderSize,

    exiting: bool,
    failure: Option<anyhow::Error>,
    frames: u32,
    last_fps_instant: std::time::Instant,
}

impl App {
    fn settings(&self) -> RenderSettings {
        RenderSettings {
            clear_color: self.cfg.render.clear_color,
            depth: self.cfg.render.depth,
            shader_dir: self.shader_dir.clone(),
        }
    }

    fn scene(&self) -> Result<Scene> {
        let mut scene = Scene::default();
        if let Some(path) = &self.cfg.render.texture {
            scene.texture = Texture::from_file(path)?;
        }
        Ok(scene)
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let w = &self.cfg.window;
        let window = event_loop
            .create_window(window_attributes(&w.title, w.width, w.height))
            .context("create_window")?;

        let (width, height) = surface_size(&window);
        self.render_size = RenderSize { width, height };

        let scene = self.scene()?;
        let renderer = VkRenderer::new(
            &window,
            &window,
            self.render_size,
            &self.settings(),
            &scene,
        )?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    /// Drops the renderer before the window and leaves the loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        match error_kind(&err) {
            Some(kind) => error!("{err:#} [{kind:?}]"),
            None => error!("{err:#}"),
        }
        self.failure = Some(err);
        self.shutdown(event_loop);
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        self.renderer = None;
        self.window = None;
        event_loop.exit();
    }
}

/// Classification of the first Vulkan error in the context chain.
fn error_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|e| e.downcast_ref::<VkError>())
        .map(VkError::kind)
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() && !self.exiting {
            if let Err(e) = self.start(event_loop) {
                self.fail(event_loop, e.context("renderer startup"));
                return;
            }
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                self.render_size = RenderSize {
                    width: new_size.width,
                    height: new_size.height,
                };
                info!(
                    "Resized → {}x{} (paused={})",
                    new_size.width,
                    new_size.height,
                    is_degenerate(new_size.width, new_size.height)
                );
                let resized = match &mut self.renderer {
                    Some(r) => r.resize(self.render_size),
                    None => Ok(()),
                };
                if let Err(e) = resized {
                    self.fail(event_loop, e);
                    return;
                }
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }

            WindowEvent::RedrawRequested => {
                if self.exiting {
                    return;
                }
                let rendered = match &mut self.renderer {
                    Some(r) => r.render(),
                    None => return,
                };
                match rendered {
                    Ok(()) => self.frames = self.frames.saturating_add(1),
                    Err(e) => self.fail(event_loop, e.context("render")),
                }
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        if is_degenerate(self.render_size.width, self.render_size.height) {
            // minimised: sleep until the next resize
            event_loop.set_control_flow(ControlFlow::Wait);
            self.frames = 0;
            return;
        }
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(w) = &self.window {
            w.request_redraw();
        }

        let now = std::time::Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            info!("fps ~ {}", self.frames);
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let cfg = load_cfg(&args.config);
    let shader_dir = args.shaders.or_else(|| cfg.render.shader_dir.clone());
    info!(
        "shaders from {}",
        cubic_render_vk::resolve_shader_dir(shader_dir.as_deref()).display()
    );

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let mut app = App {
        cfg,
        shader_dir,
        renderer: None,
        window: None,
        render_size: RenderSize {
            width: 1,
            height: 1,
        },
        exiting: false,
        failure: None,
        frames: 0,
        last_fps_instant: std::time::Instant::now(),
    };

    event_loop.run_app(&mut app)?;
    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_error_kind_through_context() {
        let err = anyhow::Error::from(VkError::NoSuitableDevice)
            .context("initialise Vulkan renderer")
            .context("renderer startup");
        assert_eq!(error_kind(&err), Some(ErrorKind::UnsupportedFeature));
    }

    #[test]
    fn test_error_kind_of_plain_error() {
        let err = anyhow!("decode texture").context("renderer startup");
        assert_eq!(error_kind(&err), None);
    }
}
