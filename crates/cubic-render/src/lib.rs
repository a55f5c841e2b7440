// SPDX-License-Identifier: CEPL-1.0
use anyhow::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::path::PathBuf;

pub mod scene;

pub use scene::{Mesh, Scene, Texture, Vertex};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Backend knobs fixed at creation time.
#[derive(Clone, Debug)]
pub struct RenderSettings {
    pub clear_color: [f32; 4],
    /// Attach a depth buffer and enable depth testing.
    pub depth: bool,
    /// Directory holding `vert.spv` and `frag.spv`. `None` means the
    /// backend's built-in shaders.
    pub shader_dir: Option<PathBuf>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            depth: true,
            shader_dir: None,
        }
    }
}

pub trait Renderer {
    fn new(
        window: &dyn HasWindowHandle,
        display: &dyn HasDisplayHandle,
        size: RenderSize,
        settings: &RenderSettings,
        scene: &Scene,
    ) -> Result<Self>
    where
        Self: Sized;

    fn resize(&mut self, size: RenderSize) -> Result<()>;
    fn render(&mut self) -> Result<()>;
    fn set_clear_color(&mut self, rgba: [f32; 4]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_size_is_empty() {
        assert!(RenderSize { width: 0, height: 5 }.is_empty());
        assert!(!RenderSize { width: 5, height: 5 }.is_empty());
    }

    #[test]
    fn test_default_settings_clear_to_opaque_black() {
        let s = RenderSettings::default();
        assert_eq!(s.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert!(s.depth);
        assert!(s.shader_dir.is_none());
    }
}
