// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

use crate::shader::ShaderError;

/// Coarse classification of a failure, logged by the app when it exits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    DeviceLost,
    OutOfMemory,
    SurfaceLost,
    InitializationFailed,
    UnsupportedFeature,
}

#[derive(Debug, Error)]
pub enum VkError {
    #[error("{what}: {result}")]
    Api {
        what: &'static str,
        result: vk::Result,
    },

    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("window handle unavailable: {0}")]
    Handle(#[from] raw_window_handle::HandleError),

    #[error("no physical device with a graphics + present queue family")]
    NoSuitableDevice,

    #[error("surface reports no formats")]
    NoSurfaceFormat,

    #[error("surface extent is 0x0")]
    EmptyExtent,

    #[error("no memory type with {0:?}")]
    NoMemoryType(vk::MemoryPropertyFlags),

    #[error("unsupported layout transition {0:?} -> {1:?}")]
    UnsupportedTransition(vk::ImageLayout, vk::ImageLayout),

    #[error("{buffers} command buffers for {framebuffers} framebuffers")]
    CountMismatch { buffers: usize, framebuffers: usize },

    #[error(transparent)]
    Shader(#[from] ShaderError),
}

impl VkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VkError::Api { result, .. } => kind_of(*result),
            VkError::EmptyExtent => ErrorKind::SurfaceLost,
            VkError::NoMemoryType(_) => ErrorKind::OutOfMemory,
            VkError::NoSuitableDevice
            | VkError::NoSurfaceFormat
            | VkError::UnsupportedTransition(..) => ErrorKind::UnsupportedFeature,
            VkError::Loading(_)
            | VkError::Handle(_)
            | VkError::CountMismatch { .. }
            | VkError::Shader(_) => ErrorKind::InitializationFailed,
        }
    }
}

pub fn kind_of(result: vk::Result) -> ErrorKind {
    match result {
        vk::Result::ERROR_DEVICE_LOST => ErrorKind::DeviceLost,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_OUT_OF_POOL_MEMORY
        | vk::Result::ERROR_FRAGMENTED_POOL
        | vk::Result::ERROR_TOO_MANY_OBJECTS => ErrorKind::OutOfMemory,
        vk::Result::ERROR_SURFACE_LOST_KHR
        | vk::Result::ERROR_NATIVE_WINDOW_IN_USE_KHR
        | vk::Result::ERROR_OUT_OF_DATE_KHR => ErrorKind::SurfaceLost,
        vk::Result::ERROR_LAYER_NOT_PRESENT
        | vk::Result::ERROR_EXTENSION_NOT_PRESENT
        | vk::Result::ERROR_FEATURE_NOT_PRESENT
        | vk::Result::ERROR_FORMAT_NOT_SUPPORTED
        | vk::Result::ERROR_INCOMPATIBLE_DRIVER => ErrorKind::UnsupportedFeature,
        _ => ErrorKind::InitializationFailed,
    }
}

pub type VkResult<T> = Result<T, VkError>;

/// Labels a raw `ash` result with the call that produced it.
pub(crate) trait ApiResultExt<T> {
    fn during(self, what: &'static str) -> VkResult<T>;
}

impl<T> ApiResultExt<T> for Result<T, vk::Result> {
    fn during(self, what: &'static str) -> VkResult<T> {
        self.map_err(|result| VkError::Api { what, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_of_maps_result_codes() {
        assert_eq!(kind_of(vk::Result::ERROR_DEVICE_LOST), ErrorKind::DeviceLost);
        assert_eq!(
            kind_of(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            ErrorKind::OutOfMemory
        );
        assert_eq!(
            kind_of(vk::Result::ERROR_SURFACE_LOST_KHR),
            ErrorKind::SurfaceLost
        );
        assert_eq!(
            kind_of(vk::Result::ERROR_EXTENSION_NOT_PRESENT),
            ErrorKind::UnsupportedFeature
        );
        assert_eq!(
            kind_of(vk::Result::ERROR_INITIALIZATION_FAILED),
            ErrorKind::InitializationFailed
        );
    }

    #[test]
    fn test_during_labels_the_call() {
        let r: Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        let err = r.during("queue_submit").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceLost);
        assert!(err.to_string().starts_with("queue_submit: "));
    }

    #[test]
    fn test_selection_failure_is_unsupported() {
        assert_eq!(
            VkError::NoSuitableDevice.kind(),
            ErrorKind::UnsupportedFeature
        );
    }

    #[test]
    fn test_window_handle_error_converts() {
        let err = VkError::from(raw_window_handle::HandleError::Unavailable);
        assert_eq!(err.kind(), ErrorKind::InitializationFailed);
        assert!(err.to_string().starts_with("window handle unavailable"));

        let wrapped = anyhow::Error::from(raw_window_handle::HandleError::Unavailable);
        assert!(wrapped
            .downcast_ref::<raw_window_handle::HandleError>()
            .is_some());
    }

    #[test]
    fn test_shader_error_is_initialization_failure() {
        let err = VkError::from(ShaderError::Empty {
            path: "vert.spv".into(),
        });
        assert_eq!(err.kind(), ErrorKind::InitializationFailed);
    }
}
