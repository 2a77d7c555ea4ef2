//! DSP pipeline configurator
//!
//! Turns a negotiated codec package into the ordered module payloads the
//! DSP graph needs. Records are staged; the caller commits them to the
//! device custom payload only when the whole pass succeeded.

use bytes::{Bytes, BytesMut};
use tracing::{debug, error};

use bluedsp_codec_core::{CodecConfigPackage, CodecDirection, CodecFormat, Lc3CodecConfig};

use crate::collaborators::ModuleSession;
use crate::error::{DeviceError, Result};
use crate::payload::{ModulePayload, ModuleTag, PayloadBuilder};
use crate::types::{DeviceAttributes, MediaConfig};

/// One payload and the module it targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedRecord {
    pub tag: ModuleTag,
    pub payload: ModulePayload,
}

/// Payload records of one configuration pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagedPayload {
    records: Vec<StagedRecord>,
}

impl StagedPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, tag: ModuleTag, payload: ModulePayload) {
        debug!(
            module = %tag,
            miid = payload.module_instance_id,
            param_id = format_args!("{:#010x}", payload.param_id),
            "Staged module payload"
        );
        self.records.push(StagedRecord { tag, payload });
    }

    pub fn records(&self) -> &[StagedRecord] {
        &self.records
    }

    /// Module tags in push order
    pub fn tags(&self) -> Vec<ModuleTag> {
        self.records.iter().map(|r| r.tag).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Serialized records, concatenated in push order
    pub fn to_bytes(&self) -> Bytes {
        let size = self.records.iter().map(|r| r.payload.encoded_len()).sum();
        let mut buf = BytesMut::with_capacity(size);
        for record in &self.records {
            record.payload.serialize(&mut buf);
        }
        buf.freeze()
    }
}

/// Inputs of one configuration pass
#[derive(Debug, Clone)]
pub struct PipelineRequest<'a> {
    pub format: CodecFormat,
    pub direction: CodecDirection,
    pub package: &'a CodecConfigPackage,
    /// Device attributes after codec overrides
    pub device_attributes: &'a DeviceAttributes,
    /// Codec configuration reported by the plugin
    pub codec_config: &'a MediaConfig,
    pub lc3: Option<&'a Lc3CodecConfig>,
    pub tws_mono: bool,
    pub lc3_mono: bool,
}

/// Builds the module payload chain for a codec
#[derive(Debug, Default, Clone, Copy)]
pub struct DspPipelineConfigurator {
    builder: PayloadBuilder,
}

impl DspPipelineConfigurator {
    pub fn new() -> Self {
        Self {
            builder: PayloadBuilder::new(),
        }
    }

    /// Run one configuration pass against the modules of `session` on
    /// `backend`. Any resolution or build failure aborts the pass and
    /// nothing is returned for the caller to commit.
    pub fn configure(
        &self,
        session: &dyn ModuleSession,
        backend: &str,
        request: &PipelineRequest<'_>,
    ) -> Result<StagedPayload> {
        let mut staged = StagedPayload::new();
        let format = request.format;
        let direction = request.direction;
        let abr_enabled = request.package.abr_enabled;

        let placeholder = ModuleTag::placeholder(direction);
        let miid = resolve(session, backend, placeholder)?;

        if !format.has_native_pipeline(abr_enabled) {
            debug!(codec = %format, "Resetting placeholder module");
            staged.push(placeholder, self.builder.placeholder_reset(miid));
        }

        for block in &request.package.blocks {
            staged.push(
                placeholder,
                self.builder
                    .custom_param(miid, block.param_id, block.payload.clone()),
            );
        }

        if format == CodecFormat::AptxAdaptiveSpeech {
            debug!("Speech codec, remaining stages come from the profile database");
            return Ok(staged);
        }

        if format.is_dual_mono() {
            let payload = self
                .builder
                .tws_config(miid, request.tws_mono, format)
                .inspect_err(|e| error!(error = %e, "Invalid TWS payload"))?;
            staged.push(placeholder, payload);
        }

        if format == CodecFormat::Lc3 {
            staged.push(placeholder, self.builder.lc3_config(miid, request.lc3_mono));

            if direction == CodecDirection::Decoder {
                let tag = ModuleTag::CopDepacketizerV2;
                let cop_miid = resolve(session, backend, tag)?;
                for stream_map_in in [false, true] {
                    let payload = self
                        .builder
                        .cop_v2_depack_config(cop_miid, request.lc3, stream_map_in)
                        .inspect_err(|e| error!(error = %e, "Invalid COPv2 depacketizer payload"))?;
                    staged.push(tag, payload);
                }
                return Ok(staged);
            }

            let tag = ModuleTag::CopPacketizerV2;
            let cop_miid = resolve(session, backend, tag)?;
            let payload = self
                .builder
                .cop_v2_pack_config(cop_miid, request.lc3)
                .inspect_err(|e| error!(error = %e, "Invalid COPv2 stream info"))?;
            staged.push(tag, payload);
            let payload = self
                .builder
                .cop_pack_config(cop_miid, request.device_attributes)
                .inspect_err(|e| error!(error = %e, "Invalid COP output format"))?;
            staged.push(tag, payload);
        } else {
            // No depacketizer on the capture path
            if direction == CodecDirection::Decoder {
                return Ok(staged);
            }

            let tag = ModuleTag::CopPacketizerV0;
            let cop_miid = resolve(session, backend, tag)?;
            let payload = self
                .builder
                .cop_pack_config(cop_miid, request.device_attributes)
                .inspect_err(|e| error!(error = %e, "Invalid COP output format"))?;
            staged.push(tag, payload);
        }

        let rat_miid = resolve(session, backend, ModuleTag::RatRender)?;
        let payload = self
            .builder
            .rat_config(rat_miid, request.codec_config)
            .inspect_err(|e| error!(error = %e, "Invalid RAT payload"))?;
        staged.push(ModuleTag::RatRender, payload);

        let cnv_miid = resolve(session, backend, ModuleTag::BtPcmConverter)?;
        let payload = self
            .builder
            .pcm_cnv_config(cnv_miid, request.codec_config)
            .inspect_err(|e| error!(error = %e, "Invalid PCM converter payload"))?;
        staged.push(ModuleTag::BtPcmConverter, payload);

        Ok(staged)
    }
}

fn resolve(session: &dyn ModuleSession, backend: &str, tag: ModuleTag) -> Result<u32> {
    session.module_instance_id(backend, tag).map_err(|e| {
        error!(backend, module = %tag, error = %e, "Failed to resolve module instance");
        match e {
            DeviceError::ModuleNotFound { .. } => e,
            _ => DeviceError::module_not_found(backend, tag.raw()),
        }
    })
}
