// SPDX-License-Identifier: CEPL-1.0
use std::{io, panic::Location, path::PathBuf};

use ash::vk;
use thiserror::Error;

/// Everything the Vulkan layer can fail with.
///
/// Surface staleness is not in here: acquire and present report it through
/// their outcome enums and the frame driver recovers from it.
#[derive(Debug, Error)]
pub enum VkError {
    #[error("failed to load the Vulkan library: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),

    #[error("no Vulkan adapters found")]
    NoAdapters,

    #[error("no suitable Vulkan adapter (best score {best})")]
    NoSuitableAdapter { best: f32 },

    #[error("no supported depth format")]
    NoDepthFormat,

    #[error("no memory type in bits {type_bits:#x} with {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("failed to load {}: {source}", path.display())]
    Asset {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Fatal: VkResult is \"{code:?}\" from {call} at {location}")]
    Driver {
        call: &'static str,
        code: vk::Result,
        location: &'static Location<'static>,
    },
}

pub type Result<T> = std::result::Result<T, VkError>;

impl VkError {
    #[track_caller]
    pub fn driver(call: &'static str, code: vk::Result) -> Self {
        VkError::Driver {
            call,
            code,
            location: Location::caller(),
        }
    }

    /// The raw status code, if this came from the driver.
    pub fn code(&self) -> Option<vk::Result> {
        match self {
            VkError::Driver { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Attaches the call name and the caller's file/line to a driver status.
pub trait VkResultExt<T> {
    fn check(self, call: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    #[track_caller]
    fn check(self, call: &'static str) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(code) => Err(VkError::driver(call, code)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_records_call_site() {
        let line = line!() + 1;
        let err = Err::<(), _>(vk::Result::ERROR_DEVICE_LOST).check("vkQueueSubmit").unwrap_err();
        match &err {
            VkError::Driver {
                call,
                code,
                location,
            } => {
                assert_eq!(*call, "vkQueueSubmit");
                assert_eq!(*code, vk::Result::ERROR_DEVICE_LOST);
                assert!(location.file().ends_with("error.rs"));
                assert_eq!(location.line(), line);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.code(), Some(vk::Result::ERROR_DEVICE_LOST));
        let msg = err.to_string();
        assert!(msg.contains("ERROR_DEVICE_LOST"), "{msg}");
        assert!(msg.contains("vkQueueSubmit"), "{msg}");
    }

    #[test]
    fn check_passes_values_through() {
        assert_eq!(Ok::<_, vk::Result>(7u32).check("noop").unwrap(), 7);
    }
}
