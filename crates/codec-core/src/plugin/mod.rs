//! Codec plugin gateway
//!
//! Codec plugins are separate modules keyed by (codec format, direction).
//! The gateway resolves the library for a codec, opens a codec instance
//! through the library's entry point, and asks it for the configuration
//! package of one configuration pass.
//!
//! How a library is brought into the process is a [`PluginLoader`]
//! concern. [`memory::StaticPluginLoader`] serves libraries linked into the
//! binary and the in-memory plugins used by tests.

pub mod memory;
pub mod registry;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{CodecError, Result};
use crate::types::{CodecConfigPackage, CodecDirection, CodecFormat, CodecMetadata};

pub use memory::{InMemoryLibrary, PluginCounters, StaticPluginLoader};
pub use registry::{PluginMapping, PluginRegistry};

/// An opened codec instance inside a plugin
pub trait CodecBackend: Send {
    /// Produce the configuration package for the given codec metadata.
    /// Failures carry the plugin's status code.
    fn populate_payload(
        &mut self,
        metadata: &CodecMetadata,
    ) -> std::result::Result<CodecConfigPackage, i32>;

    /// Codec latency in milliseconds on top of the stack's base latency
    fn codec_latency(&self, base_latency: u32) -> u32;

    /// Release the codec instance
    fn close(&mut self);
}

/// The `open` entry point a plugin library exports
pub trait PluginEntry: Send + Sync {
    /// Open a codec instance; a non-zero status is a refusal
    fn open(
        &self,
        format: CodecFormat,
        direction: CodecDirection,
    ) -> std::result::Result<Box<dyn CodecBackend>, i32>;
}

/// A loaded plugin library
pub trait PluginLibrary: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve the open entry point, `None` when the library lacks it
    fn entry_point(&self) -> Option<Arc<dyn PluginEntry>>;
}

/// Brings plugin libraries into the process
pub trait PluginLoader: Send + Sync {
    fn load(&self, path: &Path) -> std::result::Result<Arc<dyn PluginLibrary>, String>;
}

/// An open codec instance together with the library that provides it.
///
/// The codec instance is closed when this value is dropped, before the
/// library reference is released.
pub struct PluginCodec {
    format: CodecFormat,
    direction: CodecDirection,
    backend: Option<Box<dyn CodecBackend>>,
    library: Arc<dyn PluginLibrary>,
}

impl PluginCodec {
    fn new(
        format: CodecFormat,
        direction: CodecDirection,
        backend: Box<dyn CodecBackend>,
        library: Arc<dyn PluginLibrary>,
    ) -> Self {
        Self {
            format,
            direction,
            backend: Some(backend),
            library,
        }
    }

    pub fn format(&self) -> CodecFormat {
        self.format
    }

    pub fn direction(&self) -> CodecDirection {
        self.direction
    }

    pub fn library_name(&self) -> &str {
        self.library.name()
    }

    /// Latency reported by the codec for the given base latency
    pub fn codec_latency(&self, base_latency: u32) -> u32 {
        self.backend
            .as_ref()
            .map_or(0, |backend| backend.codec_latency(base_latency))
    }

    fn populate(&mut self, metadata: &CodecMetadata) -> Result<CodecConfigPackage> {
        let backend = self
            .backend
            .as_mut()
            .ok_or_else(|| CodecError::payload(self.format, -crate::error::errno::EINVAL))?;
        backend
            .populate_payload(metadata)
            .map_err(|status| CodecError::payload(self.format, status))
    }
}

impl Drop for PluginCodec {
    fn drop(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.close();
            debug!(
                codec = %self.format,
                direction = %self.direction,
                library = self.library.name(),
                "Closed codec plugin"
            );
        }
    }
}

impl fmt::Debug for PluginCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCodec")
            .field("format", &self.format)
            .field("direction", &self.direction)
            .field("library", &self.library.name())
            .finish()
    }
}

/// Result of a successful plugin payload request
#[derive(Debug)]
pub struct LoadedCodec {
    pub codec: PluginCodec,
    pub package: CodecConfigPackage,
}

impl LoadedCodec {
    pub fn into_parts(self) -> (PluginCodec, CodecConfigPackage) {
        (self.codec, self.package)
    }
}

/// Resolves, loads and queries codec plugins
pub struct CodecPluginGateway {
    registry: PluginRegistry,
    loader: Arc<dyn PluginLoader>,
}

impl CodecPluginGateway {
    pub fn new(registry: PluginRegistry, loader: Arc<dyn PluginLoader>) -> Self {
        Self { registry, loader }
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Load the plugin for `format`/`direction` and produce its
    /// configuration package.
    ///
    /// On any failure every handle acquired so far is released before the
    /// error is returned.
    pub fn load_codec_payload(
        &self,
        format: CodecFormat,
        direction: CodecDirection,
        metadata: &CodecMetadata,
    ) -> Result<LoadedCodec> {
        let path = self.registry.library_for(format, direction).ok_or_else(|| {
            error!(codec = %format, %direction, "No codec plugin registered");
            CodecError::not_supported(format, direction)
        })?;
        let library_name = path.display().to_string();

        let library = self.loader.load(&path).map_err(|reason| {
            error!(library = %library_name, %reason, "Failed to load codec plugin");
            CodecError::load_error(&library_name, reason)
        })?;

        let entry = library.entry_point().ok_or_else(|| {
            error!(library = %library_name, "Codec plugin has no open entry point");
            CodecError::load_error(&library_name, "missing open entry point")
        })?;

        let backend = entry.open(format, direction).map_err(|status| {
            error!(codec = %format, %direction, status, "Codec plugin open failed");
            CodecError::plugin_open(format, status)
        })?;

        let mut codec = PluginCodec::new(format, direction, backend, library);
        let package = codec.populate(metadata).map_err(|err| {
            error!(codec = %format, %direction, error = %err, "Codec plugin payload failed");
            err
        })?;

        debug!(
            codec = %format,
            %direction,
            sample_rate = package.sample_rate,
            blocks = package.blocks.len(),
            abr = package.abr_enabled,
            "Loaded codec plugin payload"
        );

        Ok(LoadedCodec { codec, package })
    }
}

impl fmt::Debug for CodecPluginGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecPluginGateway")
            .field("registry", &self.registry)
            .finish()
    }
}
