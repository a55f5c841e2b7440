// SPDX-License-Identifier: CEPL-1.0
//! Transform math for the uniform buffer consumed by the vertex shader.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Degrees per second the model spins around +Z.
pub const SPIN_DEGREES_PER_SECOND: f32 = 90.0;

/// Layout shared with `layout(binding = 0) uniform UniformBufferObject` in the vertex shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl UniformBufferObject {
    pub fn identity() -> Self {
        let id = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            model: id,
            view: id,
            projection: id,
        }
    }

    /// Model rotating about Z, camera at (2,2,2) looking at the origin with Z up,
    /// 45° vertical FOV. Y is flipped for Vulkan clip space.
    pub fn spinning(elapsed_seconds: f32, aspect: f32) -> Self {
        let model = Mat4::from_rotation_z(elapsed_seconds * SPIN_DEGREES_PER_SECOND.to_radians());
        let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Z);
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };
        let mut projection = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
        projection.y_axis.y *= -1.0;

        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
        }
    }
}

/// Width / height, guarding against a zero height.
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ubo_layout_is_three_mat4() {
        assert_eq!(std::mem::size_of::<UniformBufferObject>(), 3 * 64);
    }

    #[test]
    fn test_spinning_at_zero_has_identity_model() {
        let ubo = UniformBufferObject::spinning(0.0, 1.0);
        assert_eq!(ubo.model, Mat4::IDENTITY.to_cols_array_2d());
    }

    #[test]
    fn test_spinning_quarter_turn_after_one_second() {
        let ubo = UniformBufferObject::spinning(1.0, 1.0);
        let model = Mat4::from_cols_array_2d(&ubo.model);
        let x = model.transform_vector3(Vec3::X);
        assert!((x - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_projection_flips_y() {
        let ubo = UniformBufferObject::spinning(0.0, 1.0);
        let reference = Mat4::perspective_rh(45f32.to_radians(), 1.0, 0.1, 10.0);
        assert_eq!(ubo.projection[1][1], -reference.y_axis.y);
    }

    #[test]
    fn test_degenerate_aspect_falls_back() {
        let a = UniformBufferObject::spinning(0.0, 0.0);
        let b = UniformBufferObject::spinning(0.0, 1.0);
        assert_eq!(a.projection, b.projection);
    }

    #[test]
    fn test_aspect_ratio() {
        assert_eq!(aspect_ratio(800, 400), 2.0);
        assert_eq!(aspect_ratio(800, 0), 1.0);
    }
}
