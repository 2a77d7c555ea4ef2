//! Per-device codec state
//!
//! Shared by the A2DP and SCO devices: the negotiated codec, the plugin
//! instance held between configure and stop, the accumulated custom
//! payload and the configured flag. Always accessed under the owning
//! device's lock.

use bytes::{Bytes, BytesMut};
use tracing::{debug, info};

use bluedsp_codec_core::{CodecDirection, CodecFormat, CodecMetadata, PluginCodec};

use crate::device::DeviceContext;
use crate::error::Result;
use crate::metadata::{compute_routing_keys, derive_device_attributes};
use crate::pipeline::{DspPipelineConfigurator, PipelineRequest};
use crate::types::{AudioFormat, ChannelInfo, DeviceAttributes, DeviceId, MediaConfig};

/// Snapshot handed to the feedback channel when a session starts
#[derive(Debug, Clone, PartialEq)]
pub struct AbrRequest {
    pub owner: DeviceId,
    pub format: CodecFormat,
    pub metadata: CodecMetadata,
    /// [`AbrChannel::epoch`](crate::feedback::AbrChannel::epoch) seen while the session was registered
    pub epoch: u64,
}

#[derive(Debug)]
pub struct CodecState {
    device: DeviceId,
    pub format: CodecFormat,
    /// Metadata handed to the plugin on the next configuration pass
    pub metadata: CodecMetadata,
    pub plugin: Option<PluginCodec>,
    pub codec_config: MediaConfig,
    pub attributes: DeviceAttributes,
    pub is_configured: bool,
    pub abr_enabled: bool,
    pub tws_mono: bool,
    pub lc3_mono: bool,
    custom_payload: BytesMut,
}

impl CodecState {
    pub fn new(device: DeviceId) -> Self {
        let attributes = MediaConfig::default_for(device);
        Self {
            device,
            format: CodecFormat::Invalid,
            metadata: CodecMetadata::None,
            plugin: None,
            codec_config: attributes.clone(),
            attributes,
            is_configured: false,
            abr_enabled: false,
            tws_mono: false,
            lc3_mono: false,
            custom_payload: BytesMut::new(),
        }
    }

    pub fn direction(&self) -> CodecDirection {
        self.device.codec_direction()
    }

    pub fn custom_payload(&self) -> Bytes {
        Bytes::copy_from_slice(&self.custom_payload)
    }

    pub fn clear_custom_payload(&mut self) {
        self.custom_payload.clear();
    }

    /// Configured codec snapshot
    pub fn configured_codec(&self) -> Option<MediaConfig> {
        self.is_configured.then(|| self.codec_config.clone())
    }

    /// Push routing keys for the current codec to the device backend
    pub fn update_device_metadata(&self, ctx: &DeviceContext) -> Result<()> {
        let backend = ctx.platform.backend_name(self.device)?;
        let keys = compute_routing_keys(
            self.device.profile(),
            self.direction(),
            self.format,
            self.abr_enabled,
        );
        debug!(device = %self.device, backend = %backend, keys = keys.len(), "Updating device metadata");
        ctx.platform.set_device_metadata(&backend, &keys)
    }

    /// Run a full configuration pass for the current codec.
    ///
    /// Nothing is committed unless every stage succeeds; on failure the
    /// plugin is closed and `is_configured` stays false.
    pub fn configure_encoder_decoder(&mut self, ctx: &DeviceContext) -> Result<()> {
        self.is_configured = false;

        let backend = ctx.platform.backend_name(self.device)?;
        let session = ctx.platform.active_session(self.device)?;
        info!(device = %self.device, codec = %self.format, "Choosing BT codec format");

        let (plugin, package) = ctx
            .gateway
            .load_codec_payload(self.format, self.direction(), &self.metadata)?
            .into_parts();

        let codec_config = MediaConfig::pcm(
            package.sample_rate,
            package.bit_width,
            ChannelInfo::with_channels(package.channel_count),
        );
        let attributes = derive_device_attributes(
            self.format,
            self.direction(),
            package.sample_rate,
            &self.attributes,
        );

        let request = PipelineRequest {
            format: self.format,
            direction: self.direction(),
            package: &package,
            device_attributes: &attributes,
            codec_config: &codec_config,
            lc3: self.metadata.lc3(),
            tws_mono: self.tws_mono,
            lc3_mono: self.lc3_mono,
        };
        let staged = DspPipelineConfigurator::new().configure(session.as_ref(), &backend, &request)?;

        self.custom_payload.extend_from_slice(&staged.to_bytes());
        self.plugin = Some(plugin);
        self.codec_config = codec_config;
        self.attributes = attributes;
        self.abr_enabled = package.abr_enabled;
        self.is_configured = true;

        debug!(
            device = %self.device,
            records = staged.len(),
            abr = self.abr_enabled,
            "Codec pipeline configured"
        );
        Ok(())
    }

    /// Mirror the device attributes into the codec configuration
    pub fn configure_passthrough(&mut self) {
        let mut config = self.attributes.clone();
        config.audio_format = AudioFormat::Pcm;
        self.codec_config = config;
        self.is_configured = true;
    }

    /// Close the plugin instance, if one is held
    pub fn release_plugin(&mut self) {
        if let Some(plugin) = self.plugin.take() {
            debug!(device = %self.device, library = plugin.library_name(), "Releasing codec plugin");
        }
    }

    pub fn abr_request(&self, epoch: u64) -> Option<AbrRequest> {
        self.abr_enabled.then(|| AbrRequest {
            owner: self.device,
            format: self.format,
            metadata: self.metadata.clone(),
            epoch,
        })
    }

    /// Latency through the loaded plugin; 0 without one
    pub fn codec_latency(&self, base_latency: u32) -> u32 {
        self.plugin
            .as_ref()
            .map_or(0, |plugin| plugin.codec_latency(base_latency))
    }
}
