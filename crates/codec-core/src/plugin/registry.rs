//! Codec plugin registry

use std::fmt;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::types::{CodecDirection, CodecFormat};

/// One (format, direction) to library mapping, as found in configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMapping {
    pub format: CodecFormat,
    pub direction: CodecDirection,
    pub library: PathBuf,
}

/// Maps codec format and direction to a plugin library
pub struct PluginRegistry {
    libraries: DashMap<(CodecFormat, CodecDirection), PathBuf>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            libraries: DashMap::new(),
        }
    }

    pub fn from_mappings<'a>(mappings: impl IntoIterator<Item = &'a PluginMapping>) -> Self {
        let registry = Self::new();
        for mapping in mappings {
            registry.register(mapping.format, mapping.direction, &mapping.library);
        }
        registry
    }

    /// Register (or replace) the library for a codec and direction
    pub fn register(&self, format: CodecFormat, direction: CodecDirection, library: impl AsRef<Path>) {
        self.libraries
            .insert((format, direction), library.as_ref().to_path_buf());
    }

    pub fn unregister(&self, format: CodecFormat, direction: CodecDirection) -> Option<PathBuf> {
        self.libraries
            .remove(&(format, direction))
            .map(|(_, path)| path)
    }

    /// Library path for a codec and direction
    pub fn library_for(&self, format: CodecFormat, direction: CodecDirection) -> Option<PathBuf> {
        self.libraries
            .get(&(format, direction))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("mappings", &self.libraries.len())
            .finish()
    }
}
