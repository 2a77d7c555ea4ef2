//! External collaborators
//!
//! Everything the Bluetooth devices depend on but do not own: the audio
//! platform (routing, module resolution, front ends, mixer, generic
//! device lifecycle), the session bound to a device, and the vendor
//! Bluetooth stack control surface. All calls are synchronous.

use std::fmt;
use std::sync::Arc;

use bluedsp_codec_core::{CodecFormat, CodecMetadata};

use crate::error::Result;
use crate::metadata::RoutingKeySet;
use crate::payload::ModuleTag;
use crate::types::{DeviceAttributes, DeviceId, HostlessDirection, MediaConfig, PcmConfig, StreamAttributes};

/// Mixer control that tells the Bluetooth driver a feedback path is active
pub const MIXER_SET_FEEDBACK_CHANNEL: &str = "BT set feedback channel";

/// Mixer control binding a front end to a backend
pub fn front_end_connect_control(front_end: u32) -> String {
    format!("PCM{} connect", front_end)
}

/// Parameter pushed to a live session module
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionParam {
    TwsMonoMode { mono_on: bool, format: CodecFormat },
    Lc3MonoMode { mono_on: bool },
}

/// Session bound to the first active stream of a device
pub trait ModuleSession: Send + Sync {
    /// Module instance id of `tag` in this session's graph on `backend`
    fn module_instance_id(&self, backend: &str, tag: ModuleTag) -> Result<u32>;

    /// Push a parameter to a live module
    fn set_parameters(&self, tag: ModuleTag, param: &SessionParam) -> Result<()>;
}

/// Hardware mixer
pub trait Mixer: Send + Sync {
    fn set_enum_by_name(&self, control: &str, value: &str) -> Result<()>;

    fn set_value(&self, control: &str, index: u32, value: i64) -> Result<()>;
}

/// Open hostless PCM; dropping it closes the PCM
pub trait HostlessPcm: Send {
    fn is_ready(&self) -> bool;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;
}

/// Audio platform services
pub trait AudioPlatform: Send + Sync {
    /// Physical backend carrying a logical device
    fn backend_name(&self, device: DeviceId) -> Result<String>;

    /// Push routing metadata for a backend
    fn set_device_metadata(&self, backend: &str, keys: &RoutingKeySet) -> Result<()>;

    /// Push the media configuration of a backend
    fn set_device_media_config(&self, backend: &str, config: &MediaConfig) -> Result<()>;

    /// Session of the first active stream on `device`
    fn active_session(&self, device: DeviceId) -> Result<Arc<dyn ModuleSession>>;

    /// Allocate hostless front ends; empty when none are free
    fn allocate_front_end_ids(&self, attributes: &StreamAttributes) -> Vec<u32>;

    fn free_front_end_ids(&self, ids: &[u32], attributes: &StreamAttributes);

    fn mixer(&self) -> Result<Arc<dyn Mixer>>;

    /// Module instance id of `tag` in the graph behind a front end
    fn front_end_module_instance_id(&self, front_end: u32, backend: &str, tag: ModuleTag) -> Result<u32>;

    /// Apply a module payload directly on a backend
    fn set_device_custom_payload(&self, backend: &str, payload: &[u8]) -> Result<()>;

    fn open_hostless_pcm(
        &self,
        front_end: u32,
        direction: HostlessDirection,
        config: &PcmConfig,
    ) -> Result<Box<dyn HostlessPcm>>;

    /// Generic device start with the accumulated custom payload
    fn start_device(&self, device: DeviceId, attributes: &DeviceAttributes, custom_payload: &[u8]) -> Result<()>;

    fn stop_device(&self, device: DeviceId) -> Result<()>;

    /// A2DP suspend notification for routing
    fn a2dp_suspend(&self);

    fn a2dp_resume(&self);
}

/// Codec negotiated by the vendor stack
#[derive(Debug, Clone, PartialEq)]
pub struct StackCodecConfig {
    pub format: CodecFormat,
    pub metadata: CodecMetadata,
}

/// Vendor A2DP source control
pub trait A2dpSourceControl: Send + Sync {
    fn pre_init(&self) {}

    fn open(&self) -> Result<()>;

    fn close(&self) -> Result<()>;

    fn start(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    fn suspend(&self) -> Result<()>;

    fn clear_suspend_flag(&self) {}

    /// Negotiated encoder; `None` when the stack has no valid codec
    fn encoder_config(&self) -> Option<StackCodecConfig>;

    fn is_ready(&self) -> bool;

    /// Base latency of the remote sink, in milliseconds
    fn sink_latency(&self) -> Option<u32> {
        None
    }

    /// Mono mode hint for dual-mono codecs
    fn tws_mono_mode_enabled(&self) -> Option<bool> {
        None
    }
}

/// Vendor A2DP sink control
pub trait A2dpSinkControl: Send + Sync {
    fn start_capture(&self) -> Result<()>;

    fn stop_capture(&self) -> Result<()>;

    /// Negotiated decoder; `None` when the stack has no valid codec
    fn decoder_config(&self) -> Option<StackCodecConfig>;

    fn is_ready(&self) -> bool;

    /// Report the system latency once the capture session is set up
    fn session_setup_complete(&self, latency_ms: u32) -> Result<()>;
}

/// Vendor stack control libraries available in the process
#[derive(Clone, Default)]
pub struct BtStack {
    pub source: Option<Arc<dyn A2dpSourceControl>>,
    pub sink: Option<Arc<dyn A2dpSinkControl>>,
}

impl BtStack {
    pub fn new(
        source: Option<Arc<dyn A2dpSourceControl>>,
        sink: Option<Arc<dyn A2dpSinkControl>>,
    ) -> Self {
        Self { source, sink }
    }

    /// Sink role falls back to the source library when no sink exists
    pub fn uses_dummy_sink(&self) -> bool {
        self.sink.is_none() && self.source.is_some()
    }
}

impl fmt::Debug for BtStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BtStack")
            .field("source", &self.source.is_some())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}
