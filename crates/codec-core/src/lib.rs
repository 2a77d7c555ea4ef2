//! # Codec-Core: Bluetooth codec identities and plugins
//!
//! This library holds everything about a Bluetooth audio codec that does
//! not depend on a particular DSP graph:
//!
//! - **Codec identities**: [`CodecFormat`] and [`CodecDirection`]
//! - **Configuration packages**: what a codec plugin produces for one
//!   configuration pass ([`CodecConfigPackage`])
//! - **LC3 metadata**: LC3 frame configuration and stream-map parsing
//! - **Plugin gateway**: resolving, opening and querying codec plugins
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use bluedsp_codec_core::plugin::{CodecPluginGateway, InMemoryLibrary, PluginRegistry, StaticPluginLoader};
//! use bluedsp_codec_core::{CodecConfigPackage, CodecDirection, CodecFormat, CodecMetadata};
//!
//! let loader = Arc::new(StaticPluginLoader::new());
//! loader.register(
//!     "libsbc_enc.so",
//!     Arc::new(InMemoryLibrary::with_package("sbc", CodecConfigPackage::new(44100, 16, 2))),
//! );
//!
//! let registry = PluginRegistry::new();
//! registry.register(CodecFormat::Sbc, CodecDirection::Encoder, "libsbc_enc.so");
//!
//! let gateway = CodecPluginGateway::new(registry, loader);
//! let loaded = gateway.load_codec_payload(CodecFormat::Sbc, CodecDirection::Encoder, &CodecMetadata::None)?;
//! assert_eq!(loaded.package.sample_rate, 44100);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod lc3;
pub mod plugin;
pub mod types;

// Re-export commonly used types
pub use error::{CodecError, ErrorCategory, Result};
pub use lc3::{Lc3CodecConfig, Lc3ScoParams, Lc3StreamMapEntry, parse_stream_map};
pub use plugin::{CodecPluginGateway, LoadedCodec, PluginCodec};
pub use types::{CodecConfigPackage, CodecDirection, CodecFormat, CodecMetadata, ConfigBlock};

/// Version information for the codec library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
