// SPDX-License-Identifier: CEPL-1.0
//! Geometry and texture data handed to a backend at creation time.

use anyhow::{ensure, Context, Result};
use bytemuck::{Pod, Zeroable};
use std::path::Path;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl Vertex {
    pub const fn new(pos: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            pos,
            color,
            tex_coord,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl Mesh {
    /// Two stacked unit quads, the upper one half a unit above the other,
    /// so the depth test has something to resolve.
    pub fn textured_quads() -> Self {
        let mut vertices = Vec::with_capacity(8);
        for z in [0.0, -0.5] {
            vertices.extend_from_slice(&[
                Vertex::new([-0.5, -0.5, z], [1.0, 0.0, 0.0], [1.0, 0.0]),
                Vertex::new([0.5, -0.5, z], [0.0, 1.0, 0.0], [0.0, 0.0]),
                Vertex::new([0.5, 0.5, z], [0.0, 0.0, 1.0], [0.0, 1.0]),
                Vertex::new([-0.5, 0.5, z], [1.0, 1.0, 1.0], [1.0, 1.0]),
            ]);
        }
        let indices = vec![0, 1, 2, 2, 3, 0, 4, 5, 6, 6, 7, 4];
        Self { vertices, indices }
    }

    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Number of elements a single draw must cover.
    pub fn draw_count(&self) -> u32 {
        if self.is_indexed() {
            self.indices.len() as u32
        } else {
            self.vertices.len() as u32
        }
    }
}

/// Decoded image, tightly packed RGBA8.
#[derive(Clone, Debug)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Texture {
    pub fn from_file(path: &Path) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("decode texture {}", path.display()))?
            .into_rgba8();
        let (width, height) = img.dimensions();
        Self::from_rgba8(width, height, img.into_raw())
    }

    pub fn from_rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        ensure!(width > 0 && height > 0, "texture has zero extent");
        ensure!(
            pixels.len() as u64 == u64::from(width) * u64::from(height) * 4,
            "texture is {}x{} but holds {} bytes",
            width,
            height,
            pixels.len()
        );
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Black/white checkerboard used when no texture file is configured.
    pub fn checkerboard(size: u32, cells: u32) -> Self {
        let size = size.max(1);
        let cell = (size / cells.max(1)).max(1);
        let mut pixels = Vec::with_capacity((size * size * 4) as usize);
        for y in 0..size {
            for x in 0..size {
                let v = if ((x / cell) + (y / cell)) % 2 == 0 { 255 } else { 32 };
                pixels.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Self {
            width: size,
            height: size,
            pixels,
        }
    }

    pub fn byte_size(&self) -> u64 {
        self.pixels.len() as u64
    }
}

/// Everything a backend uploads once at startup.
#[derive(Clone, Debug)]
pub struct Scene {
    pub mesh: Mesh,
    pub texture: Texture,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            mesh: Mesh::textured_quads(),
            texture: Texture::checkerboard(256, 8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 8 * 4);
    }

    #[test]
    fn test_textured_quads_indices_in_range() {
        let mesh = Mesh::textured_quads();
        assert_eq!(mesh.vertices.len(), 8);
        assert_eq!(mesh.draw_count(), 12);
        assert!(mesh
            .indices
            .iter()
            .all(|&i| (i as usize) < mesh.vertices.len()));
    }

    #[test]
    fn test_unindexed_mesh_draws_vertices() {
        let mesh = Mesh {
            vertices: vec![Vertex::new([0.0; 3], [1.0; 3], [0.0; 2]); 3],
            indices: Vec::new(),
        };
        assert!(!mesh.is_indexed());
        assert_eq!(mesh.draw_count(), 3);
    }

    #[test]
    fn test_checkerboard_size_and_pattern() {
        let tex = Texture::checkerboard(4, 2);
        assert_eq!(tex.byte_size(), 4 * 4 * 4);
        // (0,0) and (2,0) fall in different cells
        assert_eq!(tex.pixels[0], 255);
        assert_eq!(tex.pixels[2 * 4], 32);
        assert!(tex.pixels.chunks(4).all(|p| p[3] == 255));
    }

    #[test]
    fn test_from_rgba8_rejects_wrong_length() {
        assert!(Texture::from_rgba8(2, 2, vec![0; 15]).is_err());
        assert!(Texture::from_rgba8(0, 2, vec![]).is_err());
        assert!(Texture::from_rgba8(2, 2, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_from_file_missing_is_error() {
        let err = Texture::from_file(Path::new("does/not/exist.png")).unwrap_err();
        assert!(format!("{err:#}").contains("decode texture"));
    }
}
