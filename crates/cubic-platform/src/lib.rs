// SPDX-License-Identifier: CEPL-1.0
//! Windowing collaborator. The app talks to winit through this crate.

pub use winit;

use winit::dpi::{LogicalSize, PhysicalSize};
use winit::window::{Window, WindowAttributes};

/// Attributes for the single render window.
pub fn window_attributes(title: &str, width: u32, height: u32) -> WindowAttributes {
    Window::default_attributes()
        .with_title(title)
        .with_inner_size(LogicalSize::new(width.max(1), height.max(1)))
        .with_resizable(true)
}

/// Current drawable size of the window in physical pixels.
pub fn surface_size(window: &Window) -> (u32, u32) {
    let PhysicalSize { width, height } = window.inner_size();
    tracing::trace!("surface size {}x{}", width, height);
    (width, height)
}

/// True when the size cannot back a swapchain (minimised window).
pub fn is_degenerate(width: u32, height: u32) -> bool {
    width == 0 || height == 0
}
