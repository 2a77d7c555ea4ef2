//! Module parameter payloads
//!
//! Every payload addressed to a DSP module is a little-endian record:
//!
//! ```text
//! +------------------+----------+------------+------------+---------------+
//! | module inst. id  | param id | param size | error code | data + pad(8) |
//! +------------------+----------+------------+------------+---------------+
//! ```
//!
//! Builders validate their input and never produce a record without the
//! data its module requires.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use bluedsp_codec_core::lc3::{Lc3CodecConfig, Lc3StreamMapEntry};
use bluedsp_codec_core::CodecFormat;

use crate::error::{DeviceError, Result};
use crate::types::MediaConfig;

/// Reset the placeholder encoder/decoder to a neutral state
pub const PARAM_ID_RESET_PLACEHOLDER_MODULE: u32 = 0x0800_1173;
/// aptX classic dual-mono channel mode
pub const PARAM_ID_APTX_CLASSIC_SET_MONO_MODE: u32 = 0x0800_123A;
/// aptX Adaptive mono switch
pub const PARAM_ID_APTX_ADAPTIVE_ENC_SWITCH_TO_MONO: u32 = 0x0800_123B;
/// LC3 encoder downmix to mono
pub const PARAM_ID_LC3_ENC_DOWNMIX_2_MONO: u32 = 0x0800_123C;
/// COPv2 packetizer stream info
pub const PARAM_ID_COP_V2_STREAM_INFO: u32 = 0x0800_13AB;
/// COPv2 depacketizer to-air stream map
pub const PARAM_ID_COP_V2_DEPACKETIZER_STREAM_MAP_OUT: u32 = 0x0800_13AC;
/// COPv2 depacketizer from-air stream map
pub const PARAM_ID_COP_V2_DEPACKETIZER_STREAM_MAP_IN: u32 = 0x0800_13AD;
/// COP packetizer output media format
pub const PARAM_ID_COP_PACKETIZER_OUTPUT_MEDIA_FORMAT: u32 = 0x0800_114A;
/// Rate adaptation media format
pub const PARAM_ID_RAT_MEDIA_FORMAT: u32 = 0x0800_1188;
/// PCM converter output format
pub const PARAM_ID_PCM_OUTPUT_FORMAT_CFG: u32 = 0x0800_1008;

const DATA_FORMAT_FIXED_POINT: u32 = 1;
const MEDIA_FMT_ID_PCM: u32 = 0x0000_0001;
const PCM_LITTLE_ENDIAN: u16 = 1;
const PCM_INTERLEAVED: u16 = 1;
const COP_OUTPUT_BIT_WIDTH: u16 = 16;
const COP_OUTPUT_CHANNELS: u16 = 1;

/// DSP module tags resolved on the Bluetooth backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleTag {
    PlaceholderEncoder,
    PlaceholderDecoder,
    CopPacketizerV0,
    CopPacketizerV2,
    CopDepacketizerV2,
    RatRender,
    BtPcmConverter,
}

impl ModuleTag {
    pub fn raw(&self) -> u32 {
        match self {
            Self::RatRender => 0xC000_000F,
            Self::PlaceholderEncoder => 0xC000_0017,
            Self::PlaceholderDecoder => 0xC000_0018,
            Self::CopPacketizerV0 => 0xC000_0019,
            Self::CopPacketizerV2 => 0xC000_001A,
            Self::CopDepacketizerV2 => 0xC000_001B,
            Self::BtPcmConverter => 0xC000_001C,
        }
    }

    /// Placeholder slot for a codec direction
    pub fn placeholder(direction: bluedsp_codec_core::CodecDirection) -> Self {
        match direction {
            bluedsp_codec_core::CodecDirection::Encoder => Self::PlaceholderEncoder,
            bluedsp_codec_core::CodecDirection::Decoder => Self::PlaceholderDecoder,
        }
    }
}

impl fmt::Display for ModuleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#010x})", self, self.raw())
    }
}

/// One parameter record for one module instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePayload {
    pub module_instance_id: u32,
    pub param_id: u32,
    pub data: Bytes,
}

impl ModulePayload {
    /// Size of the record header in bytes
    pub const HEADER_SIZE: usize = 16;

    pub fn new(module_instance_id: u32, param_id: u32, data: impl Into<Bytes>) -> Self {
        Self {
            module_instance_id,
            param_id,
            data: data.into(),
        }
    }

    fn padded_len(len: usize) -> usize {
        (len + 7) & !7
    }

    /// Encoded size including header and padding
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_SIZE + Self::padded_len(self.data.len())
    }

    /// Serialize the record
    pub fn serialize(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u32_le(self.module_instance_id);
        buf.put_u32_le(self.param_id);
        buf.put_u32_le(self.data.len() as u32);
        buf.put_u32_le(0);
        buf.put_slice(&self.data);
        buf.put_bytes(0, Self::padded_len(self.data.len()) - self.data.len());
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.serialize(&mut buf);
        buf.freeze()
    }

    /// Parse one record, consuming its padding
    pub fn parse(buf: &mut impl Buf) -> Result<Self> {
        if buf.remaining() < Self::HEADER_SIZE {
            return Err(DeviceError::invalid_param(format!(
                "payload header needs {} bytes, {} available",
                Self::HEADER_SIZE,
                buf.remaining()
            )));
        }
        let module_instance_id = buf.get_u32_le();
        let param_id = buf.get_u32_le();
        let size = buf.get_u32_le() as usize;
        let _error_code = buf.get_u32_le();

        let padded = Self::padded_len(size);
        if buf.remaining() < padded {
            return Err(DeviceError::invalid_param(format!(
                "payload data needs {} bytes, {} available",
                padded,
                buf.remaining()
            )));
        }
        let data = buf.copy_to_bytes(size);
        buf.advance(padded - size);

        Ok(Self {
            module_instance_id,
            param_id,
            data,
        })
    }

    /// Parse every record in a buffer
    pub fn parse_all(mut bytes: Bytes) -> Result<Vec<Self>> {
        let mut records = Vec::new();
        while bytes.has_remaining() {
            records.push(Self::parse(&mut bytes)?);
        }
        Ok(records)
    }
}

fn require_media(config: &MediaConfig, what: &str) -> Result<()> {
    if config.sample_rate == 0 || config.channels() == 0 || config.bit_width == 0 {
        return Err(DeviceError::invalid_param(format!(
            "{}: incomplete media config {}Hz/{}bit/{}ch",
            what,
            config.sample_rate,
            config.bit_width,
            config.channels()
        )));
    }
    Ok(())
}

fn put_stream_map(buf: &mut BytesMut, entries: &[Lc3StreamMapEntry]) {
    buf.put_u32_le(entries.len() as u32);
    for entry in entries {
        buf.put_u32_le(entry.stream_id as u32);
        buf.put_u32_le(entry.direction as u32);
        buf.put_u32_le(entry.audio_location.raw());
    }
}

fn require_stream_map<'a>(entries: &'a [Lc3StreamMapEntry], what: &str) -> Result<&'a [Lc3StreamMapEntry]> {
    if entries.is_empty() {
        return Err(DeviceError::invalid_param(format!("{}: empty stream map", what)));
    }
    Ok(entries)
}

/// Builds module payloads
#[derive(Debug, Default, Clone, Copy)]
pub struct PayloadBuilder;

impl PayloadBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Raw parameter, as supplied by a codec plugin
    pub fn custom_param(&self, miid: u32, param_id: u32, data: impl Into<Bytes>) -> ModulePayload {
        ModulePayload::new(miid, param_id, data)
    }

    /// Placeholder reset record
    pub fn placeholder_reset(&self, miid: u32) -> ModulePayload {
        ModulePayload::new(miid, PARAM_ID_RESET_PLACEHOLDER_MODULE, Bytes::new())
    }

    /// Dual-mono toggle; only defined for dual-mono codecs
    pub fn tws_config(&self, miid: u32, mono_on: bool, format: CodecFormat) -> Result<ModulePayload> {
        let param_id = match format {
            CodecFormat::AptxDualMono => PARAM_ID_APTX_CLASSIC_SET_MONO_MODE,
            CodecFormat::AptxAdaptive => PARAM_ID_APTX_ADAPTIVE_ENC_SWITCH_TO_MONO,
            other => {
                return Err(DeviceError::invalid_param(format!(
                    "TWS config not defined for {}",
                    other
                )));
            }
        };
        let mut data = BytesMut::with_capacity(4);
        data.put_u32_le(u32::from(mono_on));
        Ok(ModulePayload::new(miid, param_id, data.freeze()))
    }

    /// LC3 mono toggle
    pub fn lc3_config(&self, miid: u32, mono_on: bool) -> ModulePayload {
        let mut data = BytesMut::with_capacity(4);
        data.put_u32_le(u32::from(mono_on));
        ModulePayload::new(miid, PARAM_ID_LC3_ENC_DOWNMIX_2_MONO, data.freeze())
    }

    /// COPv2 stream info, built from the to-air configuration
    pub fn cop_v2_pack_config(&self, miid: u32, lc3: Option<&Lc3CodecConfig>) -> Result<ModulePayload> {
        let lc3 = lc3.ok_or_else(|| DeviceError::invalid_param("COPv2 stream info: no LC3 config"))?;
        let entries = require_stream_map(&lc3.encoder.stream_map_out, "COPv2 stream info")?;

        let mut data = BytesMut::new();
        put_stream_map(&mut data, entries);
        data.put_u32_le(lc3.encoder.to_air.frame_duration);
        data.put_u32_le(lc3.encoder.to_air.max_octets_per_frame as u32);
        Ok(ModulePayload::new(miid, PARAM_ID_COP_V2_STREAM_INFO, data.freeze()))
    }

    /// COPv2 depacketizer stream map, out or in variant
    pub fn cop_v2_depack_config(
        &self,
        miid: u32,
        lc3: Option<&Lc3CodecConfig>,
        stream_map_in: bool,
    ) -> Result<ModulePayload> {
        let lc3 = lc3.ok_or_else(|| DeviceError::invalid_param("COPv2 depacketizer: no LC3 config"))?;
        let (param_id, entries) = if stream_map_in {
            (PARAM_ID_COP_V2_DEPACKETIZER_STREAM_MAP_IN, &lc3.decoder.stream_map_in)
        } else {
            (PARAM_ID_COP_V2_DEPACKETIZER_STREAM_MAP_OUT, &lc3.encoder.stream_map_out)
        };
        let entries = require_stream_map(entries, "COPv2 depacketizer")?;

        let mut data = BytesMut::new();
        put_stream_map(&mut data, entries);
        Ok(ModulePayload::new(miid, param_id, data.freeze()))
    }

    /// Packetizer output media format: device rate, 16 bit, mono
    pub fn cop_pack_config(&self, miid: u32, device: &MediaConfig) -> Result<ModulePayload> {
        if device.sample_rate == 0 {
            return Err(DeviceError::invalid_param("COP output format: zero sample rate"));
        }
        let mut data = BytesMut::with_capacity(8);
        data.put_u32_le(device.sample_rate);
        data.put_u16_le(COP_OUTPUT_BIT_WIDTH);
        data.put_u16_le(COP_OUTPUT_CHANNELS);
        Ok(ModulePayload::new(
            miid,
            PARAM_ID_COP_PACKETIZER_OUTPUT_MEDIA_FORMAT,
            data.freeze(),
        ))
    }

    /// Rate adaptation media format from the codec configuration
    pub fn rat_config(&self, miid: u32, codec: &MediaConfig) -> Result<ModulePayload> {
        require_media(codec, "RAT media format")?;
        let mut data = BytesMut::new();
        data.put_u32_le(codec.sample_rate);
        data.put_u32_le(codec.bit_width as u32);
        data.put_u32_le(codec.channels() as u32);
        data.put_slice(&codec.channel_info.ch_map);
        Ok(ModulePayload::new(miid, PARAM_ID_RAT_MEDIA_FORMAT, data.freeze()))
    }

    /// PCM converter output format from the codec configuration
    pub fn pcm_cnv_config(&self, miid: u32, codec: &MediaConfig) -> Result<ModulePayload> {
        require_media(codec, "PCM converter format")?;
        let mut data = BytesMut::new();
        data.put_u32_le(DATA_FORMAT_FIXED_POINT);
        data.put_u32_le(MEDIA_FMT_ID_PCM);
        data.put_u32_le(codec.channels() as u32);
        data.put_u16_le(codec.bit_width);
        data.put_u16_le(codec.bit_width.saturating_sub(1));
        data.put_u16_le(PCM_LITTLE_ENDIAN);
        data.put_u16_le(PCM_INTERLEAVED);
        data.put_slice(&codec.channel_info.ch_map);
        Ok(ModulePayload::new(miid, PARAM_ID_PCM_OUTPUT_FORMAT_CFG, data.freeze()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelInfo, DeviceId};

    #[test]
    fn test_record_layout() {
        let payload = ModulePayload::new(0x4001, 0x0800_0001, vec![1u8, 2, 3]);
        let bytes = payload.to_bytes();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[0..4], &0x4001u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &3u32.to_le_bytes());
        assert_eq!(&bytes[16..19], &[1, 2, 3]);
        assert!(bytes[19..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_parse_all() {
        let builder = PayloadBuilder::new();
        let mut buf = BytesMut::new();
        builder.placeholder_reset(7).serialize(&mut buf);
        builder.lc3_config(8, true).serialize(&mut buf);

        let records = ModulePayload::parse_all(buf.freeze()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].param_id, PARAM_ID_RESET_PLACEHOLDER_MODULE);
        assert!(records[0].data.is_empty());
        assert_eq!(records[1].module_instance_id, 8);
        assert_eq!(&records[1].data[..], &1u32.to_le_bytes());
    }

    #[test]
    fn test_truncated_record() {
        let bytes = ModulePayload::new(1, 2, vec![0u8; 9]).to_bytes();
        assert!(ModulePayload::parse(&mut bytes.slice(..20)).is_err());
    }

    #[test]
    fn test_tws_only_for_dual_mono() {
        let builder = PayloadBuilder::new();
        assert!(builder.tws_config(1, true, CodecFormat::AptxAdaptive).is_ok());
        assert_eq!(
            builder.tws_config(1, false, CodecFormat::AptxDualMono).unwrap().param_id,
            PARAM_ID_APTX_CLASSIC_SET_MONO_MODE
        );
        assert!(builder.tws_config(1, true, CodecFormat::Sbc).is_err());
    }

    #[test]
    fn test_lc3_builders_need_config() {
        let builder = PayloadBuilder::new();
        assert!(builder.cop_v2_pack_config(1, None).is_err());
        assert!(builder.cop_v2_depack_config(1, None, true).is_err());
    }

    #[test]
    fn test_media_builders_validate() {
        let builder = PayloadBuilder::new();
        let good = MediaConfig::default_for(DeviceId::A2dpOut);
        assert!(builder.rat_config(1, &good).is_ok());
        assert!(builder.pcm_cnv_config(1, &good).is_ok());

        let empty = MediaConfig::pcm(0, 16, ChannelInfo::stereo());
        assert!(builder.rat_config(1, &empty).is_err());
        assert!(builder.pcm_cnv_config(1, &empty).is_err());
        assert!(builder.cop_pack_config(1, &empty).is_err());

        let cop = builder.cop_pack_config(3, &good).unwrap();
        assert_eq!(&cop.data[0..4], &48000u32.to_le_bytes());
        assert_eq!(&cop.data[4..8], &[16, 0, 1, 0]);
    }
}
