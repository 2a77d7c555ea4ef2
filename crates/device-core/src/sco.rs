//! SCO profile device
//!
//! Narrowband and wideband speech run without a codec pipeline: the codec
//! configuration mirrors the device attributes. Super-wideband speech and
//! LC3 load a codec plugin and configure the DSP graph, unless a paired
//! feedback path already configured it.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use bluedsp_codec_core::{CodecFormat, CodecMetadata, Lc3CodecConfig};

use crate::codec_state::CodecState;
use crate::device::{BluetoothDevice, DeviceContext};
use crate::error::{DeviceError, Result};
use crate::feedback::{AbrChannel, AbrRelease, FeedbackLink};
use crate::metadata::SPEECH_CODEC_SAMPLE_RATE;
use crate::types::{BtProfile, DeviceAttributes, DeviceId, DeviceParam, MediaConfig, ParamId, ParamValue};

const WIDEBAND_SAMPLE_RATE: u32 = 16000;

#[derive(Debug)]
struct ScoState {
    codec: CodecState,
    sco_on: bool,
    wideband: bool,
    swb_speech_mode: Option<u32>,
    lc3_enabled: bool,
}

pub struct BtSco {
    id: DeviceId,
    ctx: Arc<DeviceContext>,
    state: Mutex<ScoState>,
    abr: AbrChannel,
}

impl BtSco {
    pub fn new(id: DeviceId, ctx: Arc<DeviceContext>) -> Result<Self> {
        if id.profile() != BtProfile::Sco {
            return Err(DeviceError::invalid_param(format!("{} is not a SCO device", id)));
        }
        Ok(Self {
            id,
            ctx,
            state: Mutex::new(ScoState {
                codec: CodecState::new(id),
                sco_on: false,
                wideband: false,
                swb_speech_mode: None,
                lc3_enabled: false,
            }),
            abr: AbrChannel::new(id),
        })
    }

    /// Sample rate the device should open with for the enabled speech mode
    pub fn preferred_sample_rate(&self) -> u32 {
        let state = self.state.lock();
        if state.wideband {
            WIDEBAND_SAMPLE_RATE
        } else if state.swb_speech_mode.is_some() || state.lc3_enabled {
            SPEECH_CODEC_SAMPLE_RATE
        } else {
            state.codec.attributes.sample_rate
        }
    }

    pub fn codec_format(&self) -> CodecFormat {
        self.state.lock().codec.format
    }

    /// LC3 configuration from the last LC3 enable
    pub fn lc3_config(&self) -> Option<Lc3CodecConfig> {
        self.state.lock().codec.metadata.lc3().cloned()
    }

    /// Custom payload handed to the last device start
    pub fn custom_payload(&self) -> bytes::Bytes {
        self.state.lock().codec.custom_payload()
    }

    pub fn abr(&self) -> &AbrChannel {
        &self.abr
    }

    // Feedback state of this device, shared with primaries using it as
    // their feedback path
    fn link(&self) -> Option<Arc<FeedbackLink>> {
        self.ctx.feedback_links.get(self.id)
    }

    fn is_configured(&self, state: &ScoState) -> bool {
        state.codec.is_configured || self.link().is_some_and(|link| link.is_configured())
    }
}

impl BluetoothDevice for BtSco {
    fn id(&self) -> DeviceId {
        self.id
    }

    fn start(&self) -> Result<()> {
        let abr_request = {
            let mut state = self.state.lock();
            state.codec.clear_custom_payload();

            if state.swb_speech_mode.is_some() {
                state.codec.format = CodecFormat::AptxAdaptiveSpeech;
            } else if state.lc3_enabled {
                state.codec.format = CodecFormat::Lc3;
            }
            info!(device = %self.id, codec = %state.codec.format, "Starting SCO");

            state.codec.update_device_metadata(&self.ctx)?;

            if state.codec.format.is_speech_class() {
                if self.is_configured(&state) {
                    debug!(device = %self.id, "Speech codec already configured");
                } else {
                    state.codec.configure_encoder_decoder(&self.ctx).inspect_err(|e| {
                        error!(device = %self.id, error = %e, "Unable to configure speech codec")
                    })?;
                }
            } else {
                state.codec.configure_passthrough();
                let config = &state.codec.codec_config;
                debug!(
                    bit_width = config.bit_width,
                    sample_rate = config.sample_rate,
                    channels = config.channels(),
                    "SCO NB/WB codec config mirrors device attributes"
                );
            }

            let attributes = state.codec.attributes.clone();
            let payload = state.codec.custom_payload();
            self.ctx.platform.start_device(self.id, &attributes, &payload)?;
            state.codec.abr_request(self.abr.epoch())
        };

        if let Some(request) = abr_request {
            if let Err(e) = self.abr.start(&self.ctx, &request) {
                error!(device = %self.id, error = %e, "Feedback path unavailable, continuing without ABR");
            }
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let abr_enabled = self.state.lock().codec.abr_enabled;
        if abr_enabled && self.abr.stop(&self.ctx) == AbrRelease::TornDown {
            self.state.lock().codec.abr_enabled = false;
        }

        let mut state = self.state.lock();
        state.codec.release_plugin();
        if let Err(e) = self.ctx.platform.stop_device(self.id) {
            error!(device = %self.id, error = %e, "Device stop failed");
        }
        if !state.codec.abr_enabled {
            state.codec.format = CodecFormat::Invalid;
        }
        // Keep the configuration while a paired primary still uses it
        if self.link().is_none_or(|link| link.owner_count() == 0) {
            state.codec.is_configured = false;
        }
        Ok(())
    }

    fn is_device_ready(&self) -> bool {
        self.state.lock().sco_on
    }

    fn set_device_parameter(&self, param: &DeviceParam) -> Result<()> {
        let mut state = self.state.lock();
        match param {
            DeviceParam::ScoOn(on) => state.sco_on = *on,
            DeviceParam::ScoWideband(enabled) => {
                state.wideband = *enabled;
                debug!(wideband = enabled, "SCO wideband speech");
            }
            DeviceParam::ScoSuperWideband {
                enabled,
                speech_mode,
            } => {
                if *enabled {
                    state.swb_speech_mode = Some(*speech_mode);
                    state.codec.metadata = CodecMetadata::SpeechMode(*speech_mode);
                } else {
                    state.swb_speech_mode = None;
                }
                debug!(speech_mode = ?state.swb_speech_mode, "SCO super-wideband speech");
            }
            DeviceParam::ScoLc3 { enabled, params } => {
                if let Some(params) = params {
                    let config = Lc3CodecConfig::from_sco_params(params)?;
                    state.codec.metadata = CodecMetadata::Lc3(config);
                } else if *enabled {
                    return Err(DeviceError::invalid_param("LC3 enabled without codec parameters"));
                }
                state.lc3_enabled = *enabled;
                debug!(lc3 = enabled, "SCO LC3 speech");
            }
            other => {
                return Err(DeviceError::invalid_param(format!(
                    "{:?} is not a SCO parameter",
                    other
                )));
            }
        }
        Ok(())
    }

    fn get_device_parameter(&self, id: ParamId) -> Result<ParamValue> {
        Err(DeviceError::invalid_param(format!(
            "{:?} is not readable on {}",
            id, self.id
        )))
    }

    fn codec_config(&self) -> Option<MediaConfig> {
        let state = self.state.lock();
        state
            .codec
            .configured_codec()
            .or_else(|| self.link().and_then(|link| link.codec_config()))
    }

    fn device_attributes(&self) -> DeviceAttributes {
        self.state.lock().codec.attributes.clone()
    }

    fn set_device_attributes(&self, attributes: DeviceAttributes) {
        self.state.lock().codec.attributes = attributes;
    }
}

impl fmt::Debug for BtSco {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BtSco")
            .field("id", &self.id)
            .field("sco_on", &state.sco_on)
            .field("codec", &state.codec.format)
            .field("configured", &state.codec.is_configured)
            .finish()
    }
}
