//! Device configuration
//!
//! Loaded from TOML. Every field has a default, so an empty document is a
//! valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use bluedsp_codec_core::plugin::{PluginMapping, PluginRegistry};

use crate::error::{DeviceError, Result};
use crate::logging::LoggingConfig;

/// Hostless feedback PCM parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub sample_rate: u32,
    pub period_size: u32,
    pub period_count: u32,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            sample_rate: 8000,
            period_size: 240,
            period_count: 2,
        }
    }
}

/// Configuration shared by all Bluetooth devices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Platform supports A2DP offload
    pub a2dp_offload_supported: bool,
    /// A2DP offload disabled by the user
    pub a2dp_offload_disabled: bool,
    /// System latency reported to the sink on session setup
    pub sink_setup_latency_ms: u32,
    /// Settle delay between stack pre-init and source open
    pub stack_pre_init_delay_ms: u64,
    pub feedback: FeedbackConfig,
    pub logging: LoggingConfig,
    pub codec_plugins: Vec<PluginMapping>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            a2dp_offload_supported: true,
            a2dp_offload_disabled: false,
            sink_setup_latency_ms: 200,
            stack_pre_init_delay_ms: 20,
            feedback: FeedbackConfig::default(),
            logging: LoggingConfig::default(),
            codec_plugins: Vec::new(),
        }
    }
}

impl DeviceConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| DeviceError::invalid_param(format!("device config: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            DeviceError::invalid_param(format!("device config {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Offload is usable only when supported and not disabled
    pub fn a2dp_offload_enabled(&self) -> bool {
        self.a2dp_offload_supported && !self.a2dp_offload_disabled
    }

    /// Plugin registry populated from `codec_plugins`
    pub fn plugin_registry(&self) -> PluginRegistry {
        PluginRegistry::from_mappings(&self.codec_plugins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluedsp_codec_core::{CodecDirection, CodecFormat};

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = DeviceConfig::from_toml_str("").unwrap();
        assert_eq!(config, DeviceConfig::default());
        assert!(config.a2dp_offload_enabled());
        assert_eq!(config.feedback.period_size, 240);
    }

    #[test]
    fn test_full_document() {
        let config = DeviceConfig::from_toml_str(
            r#"
            a2dp_offload_disabled = true
            sink_setup_latency_ms = 150

            [feedback]
            period_count = 4

            [logging]
            level = "debug"

            [[codec_plugins]]
            format = "lc3"
            direction = "dec"
            library = "/vendor/lib/liblc3_dec.so"
            "#,
        )
        .unwrap();

        assert!(!config.a2dp_offload_enabled());
        assert_eq!(config.sink_setup_latency_ms, 150);
        assert_eq!(config.feedback.period_count, 4);
        assert_eq!(config.feedback.sample_rate, 8000);
        assert_eq!(config.logging.level, "debug");

        let registry = config.plugin_registry();
        assert!(registry
            .library_for(CodecFormat::Lc3, CodecDirection::Decoder)
            .is_some());
    }

    #[test]
    fn test_malformed_document() {
        let err = DeviceConfig::from_toml_str("sink_setup_latency_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, DeviceError::InvalidParam { .. }));
    }
}
