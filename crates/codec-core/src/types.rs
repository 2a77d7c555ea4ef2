//! Core types for the codec library
//!
//! Codec identities, directions and the configuration package a codec
//! plugin produces for one configuration pass.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lc3::Lc3CodecConfig;

/// Bluetooth codec negotiated for a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecFormat {
    /// SBC (mandatory A2DP codec)
    Sbc,
    /// MPEG-2/4 AAC
    Aac,
    /// aptX
    Aptx,
    /// aptX HD
    AptxHd,
    /// aptX dual-mono (true wireless stereo)
    AptxDualMono,
    /// aptX Adaptive
    AptxAdaptive,
    /// aptX Adaptive speech profile carried over SCO
    AptxAdaptiveSpeech,
    /// LDAC
    Ldac,
    /// LC3
    Lc3,
    /// CELT
    Celt,
    /// Unspecified compressed format
    Generic,
    /// No codec negotiated
    Invalid,
}

impl CodecFormat {
    /// Every format the stack may negotiate
    pub const ALL: [CodecFormat; 12] = [
        Self::Sbc,
        Self::Aac,
        Self::Aptx,
        Self::AptxHd,
        Self::AptxDualMono,
        Self::AptxAdaptive,
        Self::AptxAdaptiveSpeech,
        Self::Ldac,
        Self::Lc3,
        Self::Celt,
        Self::Generic,
        Self::Invalid,
    ];

    /// Get the codec name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sbc => "SBC",
            Self::Aac => "AAC",
            Self::Aptx => "aptX",
            Self::AptxHd => "aptX-HD",
            Self::AptxDualMono => "aptX-DualMono",
            Self::AptxAdaptive => "aptX-Adaptive",
            Self::AptxAdaptiveSpeech => "aptX-Adaptive-Speech",
            Self::Ldac => "LDAC",
            Self::Lc3 => "LC3",
            Self::Celt => "CELT",
            Self::Generic => "generic",
            Self::Invalid => "invalid",
        }
    }

    /// Wire identifier carried inside module payloads
    pub fn raw(&self) -> u32 {
        match self {
            Self::Sbc => 0x1F00_0000,
            Self::Aac => 0x0400_0000,
            Self::Aptx => 0x2000_0000,
            Self::AptxHd => 0x2100_0000,
            Self::AptxDualMono => 0x2200_0000,
            Self::Ldac => 0x2300_0000,
            Self::AptxAdaptiveSpeech => 0x2500_0000,
            Self::Celt => 0x2600_0000,
            Self::AptxAdaptive => 0x2700_0000,
            Self::Lc3 => 0x2B00_0000,
            Self::Generic => 0x0100_0000,
            Self::Invalid => 0xFFFF_FFFF,
        }
    }

    /// Map a wire identifier back to a format; unknown ids are `Invalid`
    pub fn from_raw(raw: u32) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|format| format.raw() == raw)
            .unwrap_or(Self::Invalid)
    }

    /// Whether a codec has been negotiated
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Codecs whose DSP graph carries a dedicated encoder/decoder module
    /// instead of the generic placeholder slot.
    pub fn has_native_pipeline(&self, abr_enabled: bool) -> bool {
        match self {
            Self::Ldac | Self::AptxAdaptive | Self::AptxAdaptiveSpeech | Self::Lc3 => true,
            Self::Aac => abr_enabled,
            _ => false,
        }
    }

    /// Dual-mono capable codecs accept a TWS mono/stereo toggle
    pub fn is_dual_mono(&self) -> bool {
        matches!(self, Self::AptxDualMono | Self::AptxAdaptive)
    }

    /// Speech-class codecs run at a fixed high rate with a compressed tag
    pub fn is_speech_class(&self) -> bool {
        matches!(self, Self::AptxAdaptiveSpeech | Self::Lc3)
    }
}

impl fmt::Display for CodecFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Direction a codec instance runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodecDirection {
    /// Device renders outbound audio (profile acts as source)
    #[serde(rename = "enc")]
    Encoder,
    /// Device captures inbound audio (profile acts as sink)
    #[serde(rename = "dec")]
    Decoder,
}

impl CodecDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Encoder => "enc",
            Self::Decoder => "dec",
        }
    }

    /// The opposite direction, used by feedback paths
    pub fn inverse(&self) -> Self {
        match self {
            Self::Encoder => Self::Decoder,
            Self::Decoder => Self::Encoder,
        }
    }
}

impl fmt::Display for CodecDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque configuration block addressed to one module parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBlock {
    /// Target parameter identifier
    pub param_id: u32,
    /// Parameter data, forwarded untouched
    pub payload: Bytes,
}

impl ConfigBlock {
    pub fn new(param_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            param_id,
            payload: payload.into(),
        }
    }
}

/// Configuration produced by a codec plugin for one configuration pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecConfigPackage {
    /// Negotiated sample rate in Hz
    pub sample_rate: u32,
    /// Bit width of the decoded PCM
    pub bit_width: u16,
    /// Number of channels
    pub channel_count: u16,
    /// Blocks pushed to the placeholder module, in order
    pub blocks: Vec<ConfigBlock>,
    /// Whether the codec runs with adaptive bitrate feedback
    pub abr_enabled: bool,
}

impl CodecConfigPackage {
    pub fn new(sample_rate: u32, bit_width: u16, channel_count: u16) -> Self {
        Self {
            sample_rate,
            bit_width,
            channel_count,
            blocks: Vec::new(),
            abr_enabled: false,
        }
    }

    /// Append a configuration block
    pub fn with_block(mut self, block: ConfigBlock) -> Self {
        self.blocks.push(block);
        self
    }

    /// Enable adaptive bitrate feedback
    pub fn with_abr(mut self) -> Self {
        self.abr_enabled = true;
        self
    }
}

/// Codec metadata handed to a plugin's populate routine
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CodecMetadata {
    /// No metadata available
    #[default]
    None,
    /// Vendor stack blob, passed through as-is
    Opaque(Bytes),
    /// SCO super-wideband speech mode
    SpeechMode(u32),
    /// LC3 encoder/decoder configuration
    Lc3(Lc3CodecConfig),
}

impl CodecMetadata {
    /// LC3 configuration, if this metadata carries one
    pub fn lc3(&self) -> Option<&Lc3CodecConfig> {
        match self {
            Self::Lc3(config) => Some(config),
            _ => None,
        }
    }
}
