//! Error handling for Bluetooth device operations

#![allow(missing_docs)]

use std::fmt;
use thiserror::Error;

use bluedsp_codec_core::CodecError;
use bluedsp_codec_core::error::errno;

use crate::types::DeviceId;

/// Result type alias for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;

/// Error type for device, pipeline and feedback operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// Codec plugin or codec metadata failure
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Malformed parameter, empty payload or wrong device for the call
    #[error("Invalid parameter: {details}")]
    InvalidParam { details: String },

    /// No stream is bound to the device
    #[error("No active stream on {device}")]
    NoActiveStream { device: DeviceId },

    /// Front-end or other allocation failed
    #[error("Resource exhausted: {details}")]
    ResourceExhausted { details: String },

    /// The module tag is not present in the active graph
    #[error("Module {tag:#010x} not found on backend {backend}")]
    ModuleNotFound { backend: String, tag: u32 },

    /// A vendor stack control library is not available
    #[error("Bluetooth stack {role} control unavailable")]
    StackUnavailable { role: &'static str },

    /// A vendor stack control call failed
    #[error("Bluetooth stack {operation} failed: status {status}")]
    Stack { operation: &'static str, status: i32 },

    /// A platform collaborator failed
    #[error("Platform {operation} failed: status {status}")]
    Platform { operation: &'static str, status: i32 },

    /// A mixer control could not be found or set
    #[error("Mixer control '{control}': {reason}")]
    MixerControl { control: String, reason: String },

    /// The sink did not complete session setup in time
    #[error("Bluetooth sink session setup timed out")]
    SetupTimeout,
}

impl DeviceError {
    /// Create a new invalid parameter error
    pub fn invalid_param(details: impl Into<String>) -> Self {
        Self::InvalidParam {
            details: details.into(),
        }
    }

    pub fn resource_exhausted(details: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            details: details.into(),
        }
    }

    pub fn module_not_found(backend: impl Into<String>, tag: u32) -> Self {
        Self::ModuleNotFound {
            backend: backend.into(),
            tag,
        }
    }

    pub fn stack(operation: &'static str, status: i32) -> Self {
        Self::Stack { operation, status }
    }

    pub fn platform(operation: &'static str, status: i32) -> Self {
        Self::Platform { operation, status }
    }

    pub fn mixer(control: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MixerControl {
            control: control.into(),
            reason: reason.into(),
        }
    }

    /// Negative errno-style status for status-code callers
    pub fn status(&self) -> i32 {
        match self {
            Self::Codec(err) => err.status(),
            Self::InvalidParam { .. }
            | Self::NoActiveStream { .. }
            | Self::ModuleNotFound { .. }
            | Self::MixerControl { .. } => -errno::EINVAL,
            Self::ResourceExhausted { .. } | Self::StackUnavailable { .. } => -errno::ENOSYS,
            Self::Stack { status, .. } | Self::Platform { status, .. } => {
                if *status < 0 { *status } else { -errno::EINVAL }
            }
            Self::SetupTimeout => -errno::ETIMEDOUT,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Codec(_) => ErrorCategory::Codec,
            Self::InvalidParam { .. } => ErrorCategory::Configuration,
            Self::NoActiveStream { .. } | Self::ModuleNotFound { .. } => ErrorCategory::Routing,
            Self::ResourceExhausted { .. } => ErrorCategory::Resource,
            Self::StackUnavailable { .. } | Self::Stack { .. } | Self::SetupTimeout => {
                ErrorCategory::Stack
            }
            Self::Platform { .. } | Self::MixerControl { .. } => ErrorCategory::Platform,
        }
    }
}

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Codec,
    Configuration,
    Routing,
    Resource,
    Stack,
    Platform,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec => write!(f, "Codec"),
            Self::Configuration => write!(f, "Configuration"),
            Self::Routing => write!(f, "Routing"),
            Self::Resource => write!(f, "Resource"),
            Self::Stack => write!(f, "Stack"),
            Self::Platform => write!(f, "Platform"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluedsp_codec_core::{CodecDirection, CodecFormat};

    #[test]
    fn test_codec_error_is_transparent() {
        let err: DeviceError =
            CodecError::not_supported(CodecFormat::Ldac, CodecDirection::Encoder).into();
        assert_eq!(err.category(), ErrorCategory::Codec);
        assert_eq!(err.status(), -errno::ENOSYS);
        assert!(err.to_string().contains("LDAC"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(DeviceError::invalid_param("x").status(), -errno::EINVAL);
        assert_eq!(DeviceError::resource_exhausted("fe").status(), -errno::ENOSYS);
        assert_eq!(DeviceError::stack("start", -5).status(), -5);
        assert_eq!(DeviceError::SetupTimeout.status(), -errno::ETIMEDOUT);
        assert_eq!(
            DeviceError::NoActiveStream { device: DeviceId::A2dpOut }.status(),
            -errno::EINVAL
        );
    }

    #[test]
    fn test_module_not_found_display() {
        let err = DeviceError::module_not_found("SLIMBUS_7_RX", 0xC000_0017);
        assert!(err.to_string().contains("0xc0000017"));
    }
}
