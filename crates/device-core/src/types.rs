//! Device identities, media configurations and device parameters

use serde::{Deserialize, Serialize};
use std::fmt;

use bluedsp_codec_core::{CodecDirection, Lc3ScoParams};

/// Channel map position: front left
pub const CHANNEL_FL: u8 = 1;
/// Channel map position: front right
pub const CHANNEL_FR: u8 = 2;

/// Logical Bluetooth audio devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceId {
    /// A2DP stream rendered to a remote sink
    A2dpOut,
    /// A2DP stream captured from a remote source
    A2dpIn,
    /// SCO speech rendered to a headset
    ScoOut,
    /// SCO speech captured from a headset
    ScoInHeadset,
}

impl DeviceId {
    pub fn profile(&self) -> BtProfile {
        match self {
            Self::A2dpOut | Self::A2dpIn => BtProfile::A2dp,
            Self::ScoOut | Self::ScoInHeadset => BtProfile::Sco,
        }
    }

    /// Output devices encode, input devices decode
    pub fn codec_direction(&self) -> CodecDirection {
        if self.is_output() {
            CodecDirection::Encoder
        } else {
            CodecDirection::Decoder
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, Self::A2dpOut | Self::ScoOut)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::A2dpOut => "bt-a2dp-out",
            Self::A2dpIn => "bt-a2dp-in",
            Self::ScoOut => "bt-sco-out",
            Self::ScoInHeadset => "bt-sco-in-headset",
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bluetooth audio profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BtProfile {
    A2dp,
    Sco,
}

impl fmt::Display for BtProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A2dp => write!(f, "A2DP"),
            Self::Sco => write!(f, "SCO"),
        }
    }
}

/// Sample format presented by a hardware endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioFormat {
    /// Linear PCM
    Pcm,
    /// Compressed frames passed through the backend untouched
    DefaultCompressed,
}

impl AudioFormat {
    pub fn raw(&self) -> u32 {
        match self {
            Self::Pcm => 0x1,
            Self::DefaultCompressed => 0x1B00_0000,
        }
    }
}

/// Channel count and channel map
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channels: u16,
    pub ch_map: Vec<u8>,
}

impl ChannelInfo {
    pub fn mono() -> Self {
        Self {
            channels: 1,
            ch_map: vec![CHANNEL_FL],
        }
    }

    pub fn stereo() -> Self {
        Self {
            channels: 2,
            ch_map: vec![CHANNEL_FL, CHANNEL_FR],
        }
    }

    pub fn with_channels(channels: u16) -> Self {
        match channels {
            1 => Self::mono(),
            2 => Self::stereo(),
            n => Self {
                channels: n,
                ch_map: (1..=n).map(|c| c as u8).collect(),
            },
        }
    }
}

/// Media shape of a stream: device attributes and codec configuration
/// snapshots share this representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaConfig {
    pub sample_rate: u32,
    pub bit_width: u16,
    pub channel_info: ChannelInfo,
    pub audio_format: AudioFormat,
}

/// Physical stream attributes of a hardware endpoint
pub type DeviceAttributes = MediaConfig;

impl MediaConfig {
    pub fn pcm(sample_rate: u32, bit_width: u16, channel_info: ChannelInfo) -> Self {
        Self {
            sample_rate,
            bit_width,
            channel_info,
            audio_format: AudioFormat::Pcm,
        }
    }

    /// Attributes a device starts with before any codec is negotiated
    pub fn default_for(device: DeviceId) -> Self {
        match device.profile() {
            BtProfile::A2dp => Self::pcm(48000, 16, ChannelInfo::stereo()),
            BtProfile::Sco => Self::pcm(8000, 16, ChannelInfo::mono()),
        }
    }

    pub fn channels(&self) -> u16 {
        self.channel_info.channels
    }
}

/// Sample format of a hostless PCM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmFormat {
    S16Le,
}

/// Hostless PCM open parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmConfig {
    pub rate: u32,
    pub channels: u16,
    pub format: PcmFormat,
    pub period_size: u32,
    pub period_count: u32,
    pub start_threshold: u32,
    pub stop_threshold: u32,
    pub silence_threshold: u32,
}

/// Direction of a hostless front-end path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostlessDirection {
    /// Playback path, opened as a PCM output
    RxHostless,
    /// Capture path, opened as a PCM input
    TxHostless,
}

/// Stream description used for front-end allocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamAttributes {
    pub low_latency: bool,
    pub direction: HostlessDirection,
    pub media: MediaConfig,
}

/// Connection state reported by the Bluetooth stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Parameter writes accepted by Bluetooth devices
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceParam {
    /// A2DP link connected or disconnected
    Connection(ConnectionState),
    /// A2DP codec reconfiguration pending
    A2dpReconfig(bool),
    /// A2DP suspend (true) or resume (false)
    A2dpSuspended(bool),
    /// True-wireless-stereo mono mode
    TwsMonoMode(bool),
    /// LC3 mono mode
    Lc3MonoMode(bool),
    /// SCO link on/off
    ScoOn(bool),
    /// SCO wideband speech
    ScoWideband(bool),
    /// SCO super-wideband speech with its speech mode
    ScoSuperWideband { enabled: bool, speech_mode: u32 },
    /// SCO LC3 speech with its codec parameters
    ScoLc3 {
        enabled: bool,
        params: Option<Lc3ScoParams>,
    },
}

/// Parameter reads supported by Bluetooth devices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamId {
    A2dpReconfig,
    A2dpReconfigSupported,
    A2dpSuspended,
    A2dpEncoderLatency,
    A2dpDecoderLatency,
    A2dpForceSwitch,
}

/// A2DP parameter block returned by parameter reads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct A2dpParams {
    pub reconfig: bool,
    pub reconfig_supported: bool,
    pub suspended: bool,
    pub force_switch: bool,
    pub latency: u32,
}

/// Parameter read result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    A2dp(A2dpParams),
}

impl ParamValue {
    pub fn a2dp(&self) -> &A2dpParams {
        match self {
            Self::A2dp(params) => params,
        }
    }
}
