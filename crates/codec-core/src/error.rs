//! Error handling for the codec library
//!
//! Errors raised while resolving, loading and querying codec plugins, and
//! while decoding codec metadata handed over by the Bluetooth stack.

#![allow(missing_docs)]

use std::fmt;
use thiserror::Error;

use crate::types::{CodecDirection, CodecFormat};

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// errno values used when an error has to cross a status-code boundary
pub mod errno {
    pub const EINVAL: i32 = 22;
    pub const ENOMEM: i32 = 12;
    pub const ETIMEDOUT: i32 = 110;
    pub const ENOSYS: i32 = 38;
}

/// Error type for codec plugin and metadata operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// No plugin library is registered for this codec and direction
    #[error("No codec plugin registered for {format} ({direction})")]
    NotSupported {
        format: CodecFormat,
        direction: CodecDirection,
    },

    /// The plugin library or its entry point could not be loaded
    #[error("Failed to load codec plugin {library}: {reason}")]
    LoadError { library: String, reason: String },

    /// The plugin refused to open a codec instance
    #[error("Codec plugin open failed for {format}: status {status}")]
    PluginOpenError { format: CodecFormat, status: i32 },

    /// The plugin failed to populate a configuration package
    #[error("Codec plugin payload failed for {format}: status {status}")]
    PayloadError { format: CodecFormat, status: i32 },

    /// Codec metadata is malformed or incomplete
    #[error("Invalid codec configuration: {details}")]
    InvalidConfig { details: String },
}

impl CodecError {
    /// Create a new not supported error
    pub fn not_supported(format: CodecFormat, direction: CodecDirection) -> Self {
        Self::NotSupported { format, direction }
    }

    /// Create a new load error
    pub fn load_error(library: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LoadError {
            library: library.into(),
            reason: reason.into(),
        }
    }

    /// Create a new plugin open error
    pub fn plugin_open(format: CodecFormat, status: i32) -> Self {
        Self::PluginOpenError { format, status }
    }

    /// Create a new payload error
    pub fn payload(format: CodecFormat, status: i32) -> Self {
        Self::PayloadError { format, status }
    }

    /// Create a new invalid configuration error
    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig {
            details: details.into(),
        }
    }

    /// Negative errno-style status for callers that speak status codes.
    ///
    /// Plugin failures carry the plugin's own status when it is already
    /// negative.
    pub fn status(&self) -> i32 {
        match self {
            Self::NotSupported { .. } => -errno::ENOSYS,
            Self::LoadError { .. } | Self::InvalidConfig { .. } => -errno::EINVAL,
            Self::PluginOpenError { status, .. } | Self::PayloadError { status, .. } => {
                if *status < 0 { *status } else { -errno::EINVAL }
            }
        }
    }

    /// Check if retrying the same operation later could succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NotSupported { .. } | Self::LoadError { .. } | Self::InvalidConfig { .. } => false,
            Self::PluginOpenError { .. } | Self::PayloadError { .. } => true,
        }
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotSupported { .. } => ErrorCategory::Configuration,
            Self::LoadError { .. } => ErrorCategory::Loading,
            Self::PluginOpenError { .. } | Self::PayloadError { .. } => ErrorCategory::Plugin,
            Self::InvalidConfig { .. } => ErrorCategory::Metadata,
        }
    }
}

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing registry mapping
    Configuration,
    /// Library or entry point resolution
    Loading,
    /// Failures reported by the plugin itself
    Plugin,
    /// Malformed codec metadata
    Metadata,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Loading => write!(f, "Loading"),
            Self::Plugin => write!(f, "Plugin"),
            Self::Metadata => write!(f, "Metadata"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CodecError::invalid_config("empty stream map");
        assert!(matches!(err, CodecError::InvalidConfig { .. }));
        assert_eq!(err.category(), ErrorCategory::Metadata);
    }

    #[test]
    fn test_error_status() {
        assert_eq!(
            CodecError::not_supported(CodecFormat::Ldac, CodecDirection::Encoder).status(),
            -errno::ENOSYS
        );
        assert_eq!(CodecError::load_error("libx.so", "missing").status(), -errno::EINVAL);
        assert_eq!(CodecError::plugin_open(CodecFormat::Aac, -5).status(), -5);
        assert_eq!(CodecError::payload(CodecFormat::Aac, 3).status(), -errno::EINVAL);
    }

    #[test]
    fn test_error_recoverability() {
        assert!(CodecError::payload(CodecFormat::Sbc, -1).is_recoverable());
        assert!(!CodecError::load_error("libx.so", "missing").is_recoverable());
    }

    #[test]
    fn test_error_display() {
        let err = CodecError::not_supported(CodecFormat::Lc3, CodecDirection::Decoder);
        let display = format!("{}", err);
        assert!(display.contains("LC3"));
        assert!(display.contains("dec"));
    }
}
